//! Criterion benchmarks for the fiff-stream binary codec.
//!
//! Measures encoding and decoding latency for command frames, the info
//! header, and measurement blocks of realistic sizes.  The measurement-block
//! path runs once per produced block per streaming client, so it dominates
//! the server's per-block cost.
//!
//! Run with:
//! ```bash
//! cargo bench --package fiff-stream --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fiff_stream::{
    decode_command, decode_frame, encode_command, encode_frame, ChannelInfo, ChannelKind, Command,
    CommandCode, Frame, InfoHeader, MeasurementBlock,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_info_header(channel_count: u32) -> Frame {
    Frame::InfoHeader(InfoHeader {
        channel_count,
        sampling_rate: 600.614_8,
        buffer_size: 500,
        measurement_id: "bench-measurement".to_string(),
        channels: (0..channel_count)
            .map(|i| ChannelInfo {
                name: format!("MEG {i:04}"),
                kind: ChannelKind::Meg,
            })
            .collect(),
    })
}

/// A block of `samples` samples for `channels` float32 channels.
fn make_block(channels: usize, samples: usize) -> Frame {
    Frame::MeasurementBlock(MeasurementBlock::new(
        42,
        samples as u32,
        vec![0x3F; channels * samples * 4],
    ))
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_command_codec(c: &mut Criterion) {
    let cmd = Command::new(CommandCode::SetBufferSize, 500);
    let bytes = encode_command(&cmd);

    c.bench_function("encode_command", |b| {
        b.iter(|| encode_command(black_box(&cmd)))
    });
    c.bench_function("decode_command", |b| {
        b.iter(|| decode_command(black_box(&bytes)).unwrap())
    });
}

fn bench_info_header_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("info_header");
    for channel_count in [32u32, 306] {
        let frame = make_info_header(channel_count);
        let bytes = encode_frame(&frame);

        group.bench_with_input(
            BenchmarkId::new("encode", channel_count),
            &frame,
            |b, frame| b.iter(|| encode_frame(black_box(frame))),
        );
        group.bench_with_input(
            BenchmarkId::new("decode", channel_count),
            &bytes,
            |b, bytes| b.iter(|| decode_frame(black_box(bytes)).unwrap()),
        );
    }
    group.finish();
}

fn bench_measurement_block_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("measurement_block");
    // 306-channel MEG at 100 and 500 samples per block.
    for samples in [100usize, 500] {
        let frame = make_block(306, samples);
        let bytes = encode_frame(&frame);

        group.bench_with_input(BenchmarkId::new("encode", samples), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)))
        });
        group.bench_with_input(BenchmarkId::new("decode", samples), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_command_codec,
    bench_info_header_codec,
    bench_measurement_block_codec
);
criterion_main!(benches);
