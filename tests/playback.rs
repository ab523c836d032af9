//! Integration test: whole-song playback properties on the bundled demo and
//! a few constructed songs.

use std::path::PathBuf;

use pc_engine::{walk, BackendRegistry, Engine, CAPTURE_CAPACITY};
use pc_formats::{export_register_log, load_song, ExportOptions};
use pc_ir::{Cell, ChipFamily, Note, Song};
use pc_master::{Config, Controller, Frame};
use test_log::test;

fn demo() -> Song {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("songs/demo.toml");
    load_song(path).unwrap()
}

fn engine(song: Song) -> Engine {
    Engine::new(song, 0, 44100, &BackendRegistry::with_builtin()).unwrap()
}

/// Step ticks until the song wraps, returning how many calls that took.
fn ticks_until_wrap(song: Song, limit: u64) -> u64 {
    let mut engine = engine(song);
    engine.play();
    for call in 1..=limit {
        if engine.step_tick().0 {
            return call;
        }
    }
    panic!("song did not wrap within {limit} ticks");
}

fn speed_song() -> Song {
    let mut song = Song::with_systems("speeds", &[ChipFamily::Sms, ChipFamily::Ay8910]);
    let sub = &mut song.subsongs[0];
    sub.pattern_length = 8;
    sub.speed1 = 3;
    sub.speed2 = 5;
    sub.orders.push(&[1; 7]);
    let pat = sub.pattern_at_mut(0, 0).unwrap();
    pat.set_row(0, Cell::with_note(Note::new(0, 4)));
    let mut faster = Cell::EMPTY;
    faster.set_effect(0, 0x09, 2);
    pat.set_row(4, faster);
    let pat = sub.pattern_at_mut(4, 1).unwrap();
    let mut skip = Cell::with_note(Note::new(7, 3));
    skip.set_effect(0, 0x0d, 0x02);
    pat.set_row(5, skip);
    song
}

#[test]
fn walk_length_matches_engine_ticks() {
    for song in [demo(), speed_song()] {
        let walk = walk(&song, 0).unwrap();
        assert!(walk.loop_point.is_some());
        assert_eq!(ticks_until_wrap(song, 10_000), walk.ticks + 1);
    }
}

#[test]
fn export_is_deterministic() {
    let song = demo();
    let registry = BackendRegistry::with_builtin();
    let options = ExportOptions::default();
    let a = export_register_log(&song, 0, &registry, &options).unwrap().to_bytes().unwrap();
    let b = export_register_log(&song, 0, &registry, &options).unwrap().to_bytes().unwrap();
    assert_eq!(a, b);
}

#[test]
fn export_length_follows_walk() {
    let song = speed_song();
    let walk = walk(&song, 0).unwrap();
    let log = export_register_log(&song, 0, &BackendRegistry::with_builtin(), &ExportOptions::default()).unwrap();
    // 44100 / 60 = 735 samples per tick
    assert_eq!(log.header.total_samples as u64, walk.ticks * 735);
}

#[test]
fn render_is_deterministic() {
    let config = Config { loops: Some(1), ..Config::default() };
    let mut ctrl = Controller::new(config);
    ctrl.set_song(demo());
    let a = ctrl.render_frames(0, 44100 * 2).unwrap();
    let b = ctrl.render_frames(0, 44100 * 2).unwrap();
    assert_eq!(a.len(), 44100 * 2);
    assert_eq!(a, b);
    assert!(a.iter().any(|f| *f != Frame::silence()));
}

#[test]
fn offline_render_ends_with_the_song() {
    let song = demo();
    let ticks = walk(&song, 0).unwrap().ticks as usize;
    let config = Config { loops: Some(1), block_size: 256, ..Config::default() };
    let mut ctrl = Controller::new(config);
    ctrl.set_song(song);
    let frames = ctrl.render_frames(0, 44100 * 60).unwrap();
    assert!(frames.len() >= ticks * 735);
    assert!(frames.len() < ticks * 735 + 256);
}

#[test]
fn stop_is_idempotent() {
    let mut engine = engine(demo());
    engine.play();
    let mut l = vec![0.0f32; 4096];
    let mut r = vec![0.0f32; 4096];
    engine.render_block(&mut l, &mut r);
    engine.stop();
    let transport = engine.transport().clone();
    let channels: Vec<_> = (0..7).map(|ch| engine.channel(ch).cloned()).collect();
    engine.stop();
    assert_eq!(engine.transport(), &transport);
    let again: Vec<_> = (0..7).map(|ch| engine.channel(ch).cloned()).collect();
    assert_eq!(channels, again);

    // a stopped engine keeps its position until played again
    let position = engine.position();
    engine.render_block(&mut l, &mut r);
    assert_eq!(engine.position(), position);
    assert!(l.iter().chain(&r).all(|&s| s == 0.0));
}

#[test]
fn controller_stop_without_play() {
    let mut ctrl = Controller::default();
    ctrl.stop();
    ctrl.stop();
    assert!(!ctrl.is_playing());
    assert!(ctrl.engine().is_none());
}

#[test]
fn capture_holds_at_most_its_capacity() {
    let mut engine = engine(demo());
    engine.dispatcher_mut().set_capture(true);
    engine.play();
    for _ in 0..2000 {
        engine.step_tick();
    }
    let dispatcher = engine.dispatcher();
    assert_eq!(dispatcher.captured().len(), CAPTURE_CAPACITY);
    assert!(dispatcher.dropped_captures() > 0);
    assert!(dispatcher.total_commands() >= CAPTURE_CAPACITY as u64 + dispatcher.dropped_captures());
    // the earliest commands are the ones kept
    assert_eq!(dispatcher.captured()[0].tick, 0);
}
