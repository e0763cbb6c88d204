use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flipnote::{parse_bytes, FlipnoteDecoder, KwzDecoder, PpmDecoder};
use std::hint::black_box;
use std::time::Duration;

#[path = "../tests/common/mod.rs"]
mod common;

use common::*;

/// A diagonal stroke that moves a little every frame
fn stroke(frame: usize, length: usize) -> Vec<(usize, usize)> {
    (0..length).map(|i| ((i * 3 + frame) % 256, (i * 2 + frame) % 192)).collect()
}

fn ppm_note(frame_count: usize) -> Vec<u8> {
    let mut builder = PpmBuilder::new();
    builder.frames = (0..frame_count)
        .map(|f| {
            let layers = [ppm_layer(&stroke(f, 120)), ppm_layer(&stroke(f + 40, 60))];
            if f % 8 == 0 {
                PpmFrame::key(layers)
            } else {
                PpmFrame::diff(layers)
            }
        })
        .collect();
    builder.tracks[0] = (0..frame_count * 256).map(|i| (i * 37 % 256) as u8).collect();
    builder.build()
}

fn kwz_note(frame_count: usize) -> Vec<u8> {
    let mut builder = KwzBuilder::new();
    builder.frames = (0..frame_count)
        .map(|f| {
            let points = |offset: usize, value: u8| -> Vec<(usize, usize, u8)> {
                stroke(f + offset, 150).into_iter().map(|(x, y)| (x, y, value)).collect()
            };
            KwzFrame::full([
                kwz_layer(&points(0, 1)),
                kwz_layer(&points(30, 2)),
                kwz_layer(&points(60, 1)),
            ])
        })
        .collect();
    builder.build()
}

fn frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    group.measurement_time(Duration::from_secs(10));

    for frames in [8usize, 32, 128] {
        group.throughput(Throughput::Elements(frames as u64));

        let ppm = ppm_note(frames);
        group.bench_with_input(BenchmarkId::new("ppm_sequential", frames), &ppm, |b, bytes| {
            b.iter(|| {
                let mut note = PpmDecoder::new(bytes.clone()).unwrap();
                for i in 0..frames {
                    black_box(note.decode_frame(i).unwrap());
                }
            })
        });

        let kwz = kwz_note(frames);
        group.bench_with_input(BenchmarkId::new("kwz_sequential", frames), &kwz, |b, bytes| {
            b.iter(|| {
                let mut note = KwzDecoder::new(bytes.clone()).unwrap();
                for i in 0..frames {
                    black_box(note.decode_frame(i).unwrap());
                }
            })
        });
    }

    group.finish();
}

fn random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_access");

    // Reverse order forces a replay back to the nearest keyframe for every frame
    let ppm = ppm_note(64);
    group.bench_function("ppm_reverse", |b| {
        b.iter(|| {
            let mut note = PpmDecoder::new(ppm.clone()).unwrap();
            for i in (0..64).rev() {
                black_box(note.decode_frame(i).unwrap());
            }
        })
    });

    group.finish();
}

fn compositing(c: &mut Criterion) {
    let mut group = c.benchmark_group("compositing");

    for (name, bytes) in [("ppm", ppm_note(4)), ("kwz", kwz_note(4))] {
        group.bench_function(name, |b| {
            let mut note = parse_bytes(bytes.clone()).unwrap();
            b.iter(|| black_box(note.frame_pixels_rgba(black_box(3)).unwrap()))
        });
    }

    group.finish();
}

fn audio_mixing(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_mixing");

    let note = PpmDecoder::new(ppm_note(128)).unwrap();
    for rate in [8192u32, 32768, 44100] {
        group.bench_with_input(BenchmarkId::new("ppm_master", rate), &rate, |b, &rate| {
            b.iter(|| black_box(note.audio_master_pcm(rate).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    frame_decoding,
    random_access,
    compositing,
    audio_mixing
);
criterion_main!(benches);
