//! Loading the bundled song files end to end.

use std::path::PathBuf;

use pc_engine::{walk, BackendRegistry};
use pc_formats::export::NO_LOOP;
use pc_formats::{compile, decompile, effective, export_register_log, load_song, parse_song, song_to_toml, ExportOptions, RegisterLog};
use pc_ir::{ChipFamily, Song};

fn songs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../songs")
}

fn demo() -> Song {
    load_song(songs_dir().join("demo.toml")).unwrap()
}

#[test]
fn demo_loads() {
    let song = demo();
    assert_eq!(song.title.as_str(), "polychip demo");
    let families: Vec<_> = song.systems.iter().map(|s| s.family).collect();
    assert_eq!(families, [ChipFamily::Sms, ChipFamily::Ay8910]);
    assert_eq!(song.channel_count(), 7);

    let sub = &song.subsongs[0];
    assert_eq!(sub.orders.len(), 2);
    assert_eq!(sub.pattern_length, 16);
    assert_eq!(sub.effect_columns(0), 2);
    assert_eq!(sub.effect_columns(1), 1);
    assert_eq!(sub.orders.get(2, 1), 0);
}

#[test]
fn demo_walks_two_orders_and_loops_to_start() {
    let song = demo();
    let walk = walk(&song, 0).unwrap();
    assert_eq!(walk.rows, 32);
    assert_eq!(walk.ticks, 32 * 6);
    let lp = walk.loop_point.unwrap();
    assert_eq!((lp.order, lp.row, lp.tick), (0, 0, 0));
}

#[test]
fn demo_survives_save_and_reload() {
    let song = demo();
    let text = song_to_toml(&song).unwrap();
    let again = parse_song(&text).unwrap();
    assert_eq!(song_to_toml(&again).unwrap(), text);
    assert_eq!(walk(&again, 0).unwrap(), walk(&song, 0).unwrap());
}

#[test]
fn demo_patterns_compile_round_trip() {
    let song = demo();
    let sub = &song.subsongs[0];
    let rows = sub.pattern_length;
    for (ch, data) in sub.channels.iter().enumerate() {
        let columns = sub.effect_columns(ch);
        for (index, pattern) in data.patterns.allocated() {
            let bytes = compile(pattern, rows, columns);
            let back = decompile(&bytes, rows, columns).unwrap();
            assert_eq!(
                back.rows(rows),
                effective(pattern, rows, columns).rows(rows),
                "channel {ch} pattern {index}"
            );
        }
    }
}

#[test]
fn demo_exports_a_looping_log() {
    let song = demo();
    let registry = BackendRegistry::with_builtin();
    let log = export_register_log(&song, 0, &registry, &ExportOptions::default()).unwrap();
    assert_eq!(log.header.systems.len(), 2);
    assert_eq!(log.header.total_samples, 32 * 6 * 735);
    assert_eq!(log.header.loop_samples, log.header.total_samples);
    assert_ne!(log.header.loop_offset, NO_LOOP);
    assert!(log.writes().any(|(system, _)| system == 0));
    assert!(log.writes().any(|(system, _)| system == 1));

    let bytes = log.to_bytes().unwrap();
    assert_eq!(RegisterLog::from_bytes(&bytes).unwrap(), log);
}
