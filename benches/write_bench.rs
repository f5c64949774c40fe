use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crashring::{
    AnimationInvocation, AnimationInvocationType, ChannelReader, ChannelWriter,
    ModdedFileResolution,
};
use std::{sync::Arc, thread};
use tempfile::TempDir;

fn animation_writer(dir: &TempDir, lines: u32) -> ChannelWriter<AnimationInvocation> {
    let config = ChannelWriter::<AnimationInvocation>::segment_config(Some(dir.path()), "bench", lines, 256);
    ChannelWriter::open(config).unwrap()
}

fn benchmark_single_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Channel_SingleWriter");
    group.throughput(Throughput::Elements(1));

    let dir = TempDir::new().unwrap();
    let writer = animation_writer(&dir, 128);
    group.bench_function("animation_write_line", |b| {
        b.iter(|| {
            writer.write_line(
                0x7FF6_0000_1000,
                b"Benchmark Actor",
                "Default",
                AnimationInvocationType::ActionLoad,
            )
        });
    });

    let config = ChannelWriter::<ModdedFileResolution>::segment_config(Some(dir.path()), "bench_files", 64, 1024);
    let files = ChannelWriter::<ModdedFileResolution>::open(config).unwrap();
    group.bench_function("modded_file_write_line", |b| {
        b.iter(|| {
            files.write_line(
                0x7FF6_0000_1000,
                b"Benchmark Actor",
                "Default",
                b"chara/equipment/e0001/model/c0101e0001_top.mdl",
                b"/mods/collection/e0001/c0101e0001_top.mdl",
            )
        });
    });

    group.finish();
}

fn benchmark_contended_writers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Channel_ContendedWriters");
    let writes_per_thread = 1_000;

    for threads in [2usize, 4, 8].iter() {
        group.throughput(Throughput::Elements((threads * writes_per_thread) as u64));
        group.bench_with_input(BenchmarkId::new("threads", threads), threads, |b, &threads| {
            let dir = TempDir::new().unwrap();
            let writer = Arc::new(animation_writer(&dir, 128));

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let writer = writer.clone();
                        thread::spawn(move || {
                            for i in 0..writes_per_thread {
                                writer.write_line(
                                    i as u64,
                                    b"Contended",
                                    "Default",
                                    AnimationInvocationType::PapLoad,
                                );
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn benchmark_dump(c: &mut Criterion) {
    let mut group = c.benchmark_group("Channel_Dump");

    for lines in [64u32, 128, 1024].iter() {
        let dir = TempDir::new().unwrap();
        let writer = animation_writer(&dir, *lines);
        for i in 0..*lines as u64 * 2 {
            writer.write_line(i, b"Dumped", "Default", AnimationInvocationType::LoadCharacterVfx);
        }
        let reader = ChannelReader::<AnimationInvocation>::open(Some(dir.path()), "bench").unwrap();

        group.throughput(Throughput::Elements(*lines as u64));
        group.bench_with_input(BenchmarkId::new("read_all_descending", lines), lines, |b, _| {
            b.iter(|| reader.read_all_descending(0));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_single_writer,
    benchmark_contended_writers,
    benchmark_dump
);
criterion_main!(benches);
