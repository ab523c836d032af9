//! Block rendering benchmarks
//!
//! Run with: cargo bench --bench engine_bench -p pc-engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pc_engine::{BackendRegistry, Engine};
use pc_ir::{Cell, ChipFamily, Note, Song};
use std::hint::black_box;

/// Two chips, an arpeggio and a vibrato running on every pattern row.
fn busy_song() -> Song {
    let mut song = Song::with_systems("bench", &[ChipFamily::Sms, ChipFamily::Ay8910]);
    let sub = &mut song.subsongs[0];
    sub.pattern_length = 16;
    for ch in 0..sub.channel_count() {
        let pattern = sub.pattern_at_mut(ch, 0).unwrap();
        for row in (0..16).step_by(4) {
            let mut cell = Cell::with_note(Note::from_pitch(48 + ch as i32 + row as i32));
            cell.instrument = Some(0);
            cell.set_effect(0, 0x00, 0x37);
            pattern.set_row(row, cell);
        }
        let mut vib = Cell::EMPTY;
        vib.set_effect(0, 0x04, 0x44);
        pattern.set_row(2, vib);
    }
    song
}

fn bench_render_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");
    let registry = BackendRegistry::with_builtin();

    for size in [256usize, 1024, 4096].iter() {
        let mut engine = Engine::new(busy_song(), 0, 44100, &registry).unwrap();
        engine.play();
        let mut l = vec![0.0f32; *size];
        let mut r = vec![0.0f32; *size];
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                engine.render_block(&mut l, &mut r);
                black_box(l[0]);
            });
        });
    }

    group.finish();
}

fn bench_step_tick(c: &mut Criterion) {
    let registry = BackendRegistry::with_builtin();
    let mut engine = Engine::new(busy_song(), 0, 44100, &registry).unwrap();
    engine.play();

    c.bench_function("step_tick", |b| {
        b.iter(|| black_box(engine.step_tick()));
    });
}

criterion_group!(benches, bench_render_block, bench_step_tick);
criterion_main!(benches);
