//! Integration test: core sequencing behaviours driven through the public engine API.

use pc_engine::{BackendRegistry, CapturedCommand, Engine, EngineError, PlaybackState, SharedEngine, HANG_LIMIT};
use pc_formats::compile;
use pc_ir::{Cell, ChipFamily, Note, Opcode, Pattern, Song};

fn sms_song(rows: usize) -> Song {
    let mut song = Song::with_systems("scenario", &[ChipFamily::Sms]);
    song.subsongs[0].pattern_length = rows;
    song
}

fn set(song: &mut Song, row: usize, cell: Cell) {
    song.subsongs[0].pattern_at_mut(0, 0).unwrap().set_row(row, cell);
}

fn engine(song: Song) -> Engine {
    let mut engine = Engine::new(song, 0, 44100, &BackendRegistry::with_builtin()).unwrap();
    engine.dispatcher_mut().set_capture(true);
    engine.play();
    engine
}

fn captured(engine: &Engine, opcode: Opcode) -> Vec<CapturedCommand> {
    engine
        .dispatcher()
        .captured()
        .iter()
        .filter(|c| c.command.opcode == opcode && c.command.channel == 0)
        .copied()
        .collect()
}

#[test]
fn single_note_then_off_over_four_rows() {
    let mut song = sms_song(4);
    let mut on = Cell::with_note(Note::new(0, 4));
    on.volume = Some(0x40);
    set(&mut song, 0, on);
    set(&mut song, 3, Cell::with_note(Note::Off));
    let mut engine = engine(song);

    for tick in 0..24 {
        let (ended, _) = engine.step_tick();
        assert!(!ended, "wrapped early on tick {tick}");
    }
    assert_eq!(engine.elapsed().ticks, 24);

    let ons: Vec<u64> = captured(&engine, Opcode::NoteOn).iter().map(|c| c.tick).collect();
    let offs: Vec<u64> = captured(&engine, Opcode::NoteOff).iter().map(|c| c.tick).collect();
    assert_eq!(ons, [0]);
    assert_eq!(offs, [18]);
    let rows_1_2 = engine
        .dispatcher()
        .captured()
        .iter()
        .filter(|c| c.command.channel == 0 && (6..18).contains(&c.tick))
        .count();
    assert_eq!(rows_1_2, 0);

    // the 25th tick starts the song over
    assert!(engine.step_tick().0);
}

fn porta_song() -> Song {
    let mut song = sms_song(64);
    let mut first = Cell::with_note(Note::from_pitch(48));
    first.volume = Some(0x0f);
    set(&mut song, 0, first);
    let mut glide = Cell::with_note(Note::from_pitch(60));
    glide.set_effect(0, 0x03, 0x04);
    set(&mut song, 1, glide);
    song
}

#[test]
fn portamento_lands_once_and_snaps() {
    let mut engine = engine(porta_song());
    let mut landed = 0;
    let mut was_sliding = false;
    for _ in 0..120 {
        engine.step_tick();
        let in_porta = engine.channel(0).unwrap().in_porta;
        if was_sliding && !in_porta {
            landed += 1;
        }
        was_sliding = in_porta;
    }
    assert_eq!(landed, 1);
    assert!(captured(&engine, Opcode::NotePorta).len() > 1);
    let legato: Vec<i32> = captured(&engine, Opcode::Legato).iter().map(|c| c.command.value).collect();
    assert_eq!(legato, [60]);
    assert_eq!(engine.channel(0).unwrap().note, 60);
}

#[test]
fn portamento_without_target_reset_keeps_gliding_state() {
    let mut song = porta_song();
    song.compat.target_resets_slides = false;
    let mut engine = engine(song);
    for _ in 0..120 {
        engine.step_tick();
    }
    assert!(captured(&engine, Opcode::Legato).is_empty());
    assert!(engine.channel(0).unwrap().in_porta);
}

#[test]
fn silent_pattern_compiles_to_one_run() {
    let silent = Pattern::new();
    let short = compile(&silent, 16, 1);
    let long = compile(&silent, 256, 4);
    assert_eq!(short.len(), 3);
    assert_eq!(long.len(), 3);
}

fn hanging_song() -> Song {
    let mut song = sms_song(4);
    set(&mut song, 0, Cell::with_note(Note::new(9, 4)));
    // ticks shorter than one output sample never make clock progress
    song.subsongs[0].hz = 1e12;
    song
}

#[test]
fn hang_stops_playback_and_returns() {
    let mut engine = engine(hanging_song());
    let mut l = vec![0.0f32; 512];
    let mut r = vec![0.0f32; 512];
    engine.render_block(&mut l, &mut r);
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(engine.last_error(), Some(&EngineError::Hang { iterations: HANG_LIMIT }));

    // later blocks come back straight away
    for _ in 0..10 {
        engine.render_block(&mut l, &mut r);
    }
    assert_eq!(engine.state(), PlaybackState::Stopped);
}

#[test]
fn hang_through_shared_engine_releases_lock() {
    let shared = SharedEngine::new(engine(hanging_song()));
    let mut l = vec![0.0f32; 256];
    let mut r = vec![0.0f32; 256];
    shared.render(&mut l, &mut r);
    let state = shared.with(|e| e.state());
    assert_eq!(state, PlaybackState::Stopped);
    assert!(shared.with(|e| e.take_error()).is_some());
    shared.render(&mut l, &mut r);
}
