//! Benchmarks for the render-thread mixer.
//!
//! Run:
//! - cargo bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use cosmophone::audio::VoiceParams;
use cosmophone::audio::mixer::{Mixer, MixerCommand};
use cosmophone::audio::NoteTrigger;
use cosmophone::melody::Instrument;

const FS: f32 = 48_000.0;
const BLOCK_FRAMES: [usize; 3] = [64, 256, 1024];
const VOICE_COUNTS: [usize; 4] = [1, 4, 16, 64];

fn mixer_with_voices(voices: usize) -> Mixer {
    let mut mixer = Mixer::new(FS, 5.0);
    for i in 0..voices {
        let idx = i as f32;
        mixer.apply(MixerCommand::StartVoice {
            id: i as u64,
            params: VoiceParams {
                freq_hz: 110.0 + idx * 7.3,
                pan: (idx / voices as f32) * 2.0 - 1.0,
                gain: 0.5 / voices as f32,
            },
        });
    }
    mixer
}

fn bench_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_voices");
    group.sample_size(50);

    for &voices in &VOICE_COUNTS {
        for &frames in &BLOCK_FRAMES {
            let mut mixer = mixer_with_voices(voices);
            let mut out = vec![0.0f32; frames * 2];
            let id = BenchmarkId::new("case", format!("v{voices}_b{frames}"));
            group.bench_function(id, |b| {
                b.iter(|| {
                    mixer.render(black_box(&mut out));
                    black_box(&out);
                })
            });
        }
    }
    group.finish();
}

fn bench_notes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_notes");
    group.sample_size(50);

    for instrument in Instrument::ALL {
        let mut out = vec![0.0f32; 512];
        let id = BenchmarkId::new("instrument", format!("{instrument:?}"));
        group.bench_function(id, |b| {
            b.iter_batched(
                || {
                    let mut mixer = Mixer::new(FS, 5.0);
                    for k in 0..8 {
                        mixer.apply(MixerCommand::Note(NoteTrigger {
                            instrument,
                            freq_hz: 220.0 * (1.0 + k as f32 * 0.25),
                            duration_sec: 0.5,
                            pan: 0.0,
                            velocity: 0.5,
                        }));
                    }
                    mixer
                },
                |mut mixer| {
                    mixer.render(black_box(&mut out));
                    black_box(mixer.note_count())
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_voices, bench_notes);
criterion_main!(benches);
