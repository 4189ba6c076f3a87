//! Performance benchmarks for the crabdvr muxer and index
//!
//! Run with: cargo bench
//!
//! Measures how fast frames are staged through the ring buffer and how
//! long finalizing a clip takes, independent of storage speed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crabdvr::avi::{AviHeaderInfo, AviIndex, HeaderScratch, StreamKind};
use crabdvr::recording::AviWriter;
use crabdvr::testing::synthetic_jpeg;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Duration;

/// Storage file that throws everything away
struct Sink;

impl Read for Sink {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Sink {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Ok(0)
    }
}

fn bench_append_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("AVI Append");
    group.measurement_time(Duration::from_secs(5));

    let sizes = [(8 * 1024, "8KB"), (30 * 1024, "30KB"), (90 * 1024, "90KB")];

    for (len, name) in sizes {
        let frame = synthetic_jpeg(1, len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("append_frame", name), &frame, |b, frame| {
            let mut writer = AviWriter::new(128 * 1024);
            writer.begin(Box::new(Sink), &AviHeaderInfo::placeholder(10, 800, 600));
            b.iter(|| {
                // keep the index from growing without bound across iterations
                if writer.frames() >= 50_000 {
                    writer.abandon();
                    writer.begin(Box::new(Sink), &AviHeaderInfo::placeholder(10, 800, 600));
                }
                writer.append_frame(black_box(frame))
            });
        });
    }

    group.finish();
}

fn bench_finish_clip(c: &mut Criterion) {
    let mut group = c.benchmark_group("AVI Finish");
    group.sample_size(20);

    let frame = synthetic_jpeg(1, 20 * 1024);
    let scratch = HeaderScratch::new();

    for frames in [100u32, 3000] {
        group.bench_with_input(BenchmarkId::new("finish", frames), &frames, |b, &frames| {
            b.iter(|| {
                let mut writer = AviWriter::new(64 * 1024);
                let mut info = AviHeaderInfo::placeholder(10, 800, 600);
                writer.begin(Box::new(Sink), &info);
                for _ in 0..frames {
                    writer.append_frame(&frame);
                }
                info.frame_count = frames;
                black_box(writer.finish(&scratch, info).ok())
            });
        });
    }

    group.finish();
}

fn bench_index_encode(c: &mut Criterion) {
    let mut index = AviIndex::with_capacity(20_000);
    for i in 0..20_000u32 {
        index.push(StreamKind::Video, 4 + i * 20_488, 20_480);
    }
    let mut out = vec![0u8; 32 * 1024];

    c.bench_function("idx1 encode 20000 entries", |b| {
        b.iter(|| {
            let mut done = 0;
            while done < index.len() {
                done += index.encode_entries(done, &mut out);
            }
            black_box(done)
        });
    });
}

criterion_group!(benches, bench_append_frames, bench_finish_clip, bench_index_encode);
criterion_main!(benches);
