//! Song length and loop point detection without playing anything.
//!
//! Follows the same position rules as [`Sequencer::next_row`](crate::Sequencer::next_row):
//! speed effects, order jumps (first one on a row wins) and `FFxx`. Note
//! delays are treated as if their row effects applied immediately.

use pc_ir::{CompatFlags, Song, Subsong};

use crate::error::{EngineError, Result};

/// Where a song starts repeating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopPoint {
    pub order: usize,
    pub row: usize,
    /// Tick at which the loop target was first reached
    pub tick: u64,
}

/// Result of walking a subsong once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SongWalk {
    /// Rows played before the song repeats or stops
    pub rows: u64,
    /// Ticks played before the song repeats or stops
    pub ticks: u64,
    /// `None` when the song stops itself with `FFxx`
    pub loop_point: Option<LoopPoint>,
}

impl SongWalk {
    pub fn stops(&self) -> bool {
        self.loop_point.is_none()
    }

    /// Ticks in the repeating section.
    pub fn loop_ticks(&self) -> u64 {
        self.loop_point.map_or(0, |lp| self.ticks - lp.tick)
    }
}

#[derive(Default)]
struct RowEffects {
    speed1: Option<u8>,
    speed2: Option<u8>,
    jump: Option<(Option<usize>, usize)>,
    stop: bool,
}

fn row_effects(sub: &Subsong, compat: &CompatFlags, order: usize, row: usize) -> RowEffects {
    let mut fx = RowEffects::default();
    let last_order = order + 1 >= sub.orders.len().max(1);
    for ch in 0..sub.channel_count() {
        let cell = sub.pattern_at(ch, order).row(row);
        for effect in cell.effects_in(sub.effect_columns(ch)) {
            let value = effect.value_or_zero();
            match effect.code {
                0x09 if value > 0 => fx.speed1 = Some(value),
                0x0f if value > 0 => fx.speed2 = Some(value),
                0x0b if fx.jump.is_none() => fx.jump = Some((Some(value as usize), 0)),
                0x0d if fx.jump.is_none() && !(last_order && compat.ignore_jump_at_end) => {
                    fx.jump = Some((None, value as usize));
                }
                0xff => fx.stop = true,
                _ => {}
            }
        }
    }
    fx
}

/// Walk `subsong` of `song` until it repeats a row or stops.
pub fn walk(song: &Song, subsong: usize) -> Result<SongWalk> {
    let sub = song.subsong(subsong).ok_or(EngineError::UnknownSubsong(subsong))?;
    let compat = &song.compat;
    let rows = sub.rows();
    let orders = sub.orders.len().max(1);

    // start tick of every visited (order, row)
    let mut visited: Vec<Option<u64>> = vec![None; orders * rows];
    let (mut order, mut row) = (0usize, 0usize);
    let (mut speed1, mut speed2) = (sub.speed1 as i32, sub.speed2 as i32);
    let mut speed_ab = false;
    let mut walk = SongWalk { rows: 0, ticks: 0, loop_point: None };

    loop {
        if let Some(tick) = visited[order * rows + row] {
            walk.loop_point = Some(LoopPoint { order, row, tick });
            return Ok(walk);
        }
        visited[order * rows + row] = Some(walk.ticks);
        walk.rows += 1;

        let fx = row_effects(sub, compat, order, row);
        if fx.stop {
            walk.ticks += 1;
            log::debug!("walk: song stops at {order:02x}:{row:02x}");
            return Ok(walk);
        }
        if let Some(s) = fx.speed1 {
            speed1 = s as i32;
        }
        if let Some(s) = fx.speed2 {
            speed2 = s as i32;
        }

        match fx.jump {
            Some((target, jump_row)) => {
                row = if jump_row < rows { jump_row } else { 0 };
                order = target.unwrap_or(order + 1);
                if order >= orders {
                    order = 0;
                }
            }
            None => {
                row += 1;
                if row >= rows {
                    row = 0;
                    order += 1;
                    if order >= orders {
                        order = 0;
                    }
                }
            }
        }

        let speed = if compat.broken_speed_sel {
            let odd_row = row & 1 == 1;
            if rows & 1 == 1 && order & 1 == 1 {
                if odd_row { speed2 } else { speed1 }
            } else if odd_row {
                speed1
            } else {
                speed2
            }
        } else {
            let speed = if speed_ab { speed2 } else { speed1 };
            speed_ab = !speed_ab;
            speed
        };
        walk.ticks += (speed * (sub.time_base as i32 + 1)).max(1) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendRegistry, Engine};
    use pc_ir::ChipFamily;
    use test_log::test;

    fn song(rows: usize) -> Song {
        let mut song = Song::with_systems("walk", &[ChipFamily::Sms]);
        song.subsongs[0].pattern_length = rows;
        song
    }

    fn effect(song: &mut Song, order: usize, row: usize, code: u8, value: u8) {
        let pattern = song.subsongs[0].pattern_at_mut(0, order).unwrap();
        let mut cell = *pattern.row(row);
        cell.set_effect(0, code, value);
        pattern.set_row(row, cell);
    }

    #[test]
    fn plain_song_loops_to_start() {
        let walk = walk(&song(4), 0).unwrap();
        assert_eq!(walk.rows, 4);
        assert_eq!(walk.ticks, 24);
        assert_eq!(walk.loop_point, Some(LoopPoint { order: 0, row: 0, tick: 0 }));
        assert_eq!(walk.loop_ticks(), 24);
    }

    #[test]
    fn alternating_speeds() {
        let mut song = song(4);
        song.subsongs[0].speed1 = 2;
        song.subsongs[0].speed2 = 4;
        assert_eq!(walk(&song, 0).unwrap().ticks, 12);
    }

    #[test]
    fn speed_effect_applies_to_its_own_row() {
        let mut song = song(2);
        effect(&mut song, 0, 0, 0x09, 3);
        effect(&mut song, 0, 0, 0x0f, 3);
        assert_eq!(walk(&song, 0).unwrap().ticks, 6);
    }

    #[test]
    fn jump_back_sets_loop_point() {
        let mut song = song(4);
        song.subsongs[0].orders.push(&[1]);
        effect(&mut song, 1, 1, 0x0b, 1);
        let walk = walk(&song, 0).unwrap();
        assert_eq!(walk.rows, 6);
        assert_eq!(walk.ticks, 36);
        assert_eq!(walk.loop_point, Some(LoopPoint { order: 1, row: 0, tick: 24 }));
        assert_eq!(walk.loop_ticks(), 12);
    }

    #[test]
    fn next_order_skips_rows() {
        let mut song = song(4);
        song.subsongs[0].orders.push(&[1]);
        effect(&mut song, 0, 1, 0x0d, 2);
        let walk = walk(&song, 0).unwrap();
        assert_eq!(walk.rows, 4);
        assert_eq!(walk.loop_point.map(|lp| lp.tick), Some(0));
    }

    #[test]
    fn stop_effect_ends_walk() {
        let mut song = song(8);
        effect(&mut song, 0, 2, 0xff, 0);
        let walk = walk(&song, 0).unwrap();
        assert!(walk.stops());
        assert_eq!(walk.rows, 3);
        assert_eq!(walk.ticks, 13);
    }

    /// Ticks the engine plays before it reports the song wrapping.
    fn engine_ticks_to_wrap(song: &Song) -> u64 {
        let mut engine = Engine::new(song.clone(), 0, 44100, &BackendRegistry::with_builtin()).unwrap();
        engine.play();
        let mut ticks = 0;
        while !engine.step_tick().0 {
            ticks += 1;
            assert!(ticks < 10_000, "song never wrapped");
        }
        ticks
    }

    #[test]
    fn broken_speed_sel_with_time_base() {
        let mut song = song(5);
        song.compat.broken_speed_sel = true;
        song.subsongs[0].speed1 = 2;
        song.subsongs[0].speed2 = 4;
        song.subsongs[0].time_base = 1;
        song.subsongs[0].orders.push(&[1]);
        let walk = walk(&song, 0).unwrap();
        assert_eq!(walk.rows, 10);
        assert_eq!(walk.ticks, 60);
        assert_eq!(engine_ticks_to_wrap(&song), walk.ticks);
    }

    #[test]
    fn time_base_matches_engine() {
        let mut song = song(4);
        song.subsongs[0].time_base = 2;
        let walk = walk(&song, 0).unwrap();
        assert_eq!(walk.ticks, 72);
        assert_eq!(engine_ticks_to_wrap(&song), walk.ticks);
    }

    #[test]
    fn unknown_subsong() {
        assert!(matches!(walk(&song(4), 2), Err(EngineError::UnknownSubsong(2))));
    }
}
