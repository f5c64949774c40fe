//! Concurrent stress tests for high-contention scenarios
//! Many writer threads on one segment, with and without a concurrent reader.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use crashring::{
    AnimationInvocation, AnimationInvocationType, ChannelReader, ChannelWriter, SegmentReader,
};
use tempfile::TempDir;

fn open_writer(dir: &TempDir, lines: u32) -> Arc<ChannelWriter<AnimationInvocation>> {
    let config = ChannelWriter::<AnimationInvocation>::segment_config(Some(dir.path()), "stress", lines, 256);
    Arc::new(ChannelWriter::open(config).unwrap())
}

#[cfg(test)]
mod concurrent_stress_tests {
    use super::*;

    /// 100 threads each write one line into 64 slots
    #[test]
    fn stress_more_writers_than_lines() {
        let dir = TempDir::new().unwrap();
        let writer = open_writer(&dir, 64);
        let thread_count = 100;
        let barrier = Arc::new(Barrier::new(thread_count));

        let handles: Vec<_> = (0..thread_count)
            .map(|i| {
                let writer = writer.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let name = format!("Writer {}", i);
                    writer.write_line(i as u64, name.as_bytes(), "Default", AnimationInvocationType::PapLoad);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(writer.total_written(), 100);

        let segment = SegmentReader::open_read_only(Some(dir.path()), "stress", 1).unwrap();
        let lines = segment.read_all_descending();
        assert_eq!(lines.len(), 64);
        for (position, line) in lines.iter().enumerate() {
            assert!(line.consistent);
            // Every slot holds the newest write that mapped onto it
            assert!(line.is_current(), "slot {} is stale", position);
            assert_eq!(line.expected_ticket, 100 - position as u64);
        }

        let reader = ChannelReader::<AnimationInvocation>::open(Some(dir.path()), "stress").unwrap();
        let names: HashSet<_> = reader
            .read_all_descending(0)
            .into_iter()
            .map(|record| record.character_name)
            .collect();
        assert_eq!(names.len(), 64);
        assert!(names.iter().all(|name| name.starts_with("Writer ")));
    }

    /// Writers hammer a small segment while a reader dumps continuously
    #[test]
    fn stress_reader_during_writes() {
        let dir = TempDir::new().unwrap();
        let writer = open_writer(&dir, 16);
        let writer_count = 4;
        let writes_per_thread = 2_000;
        let done = Arc::new(AtomicBool::new(false));
        let dumps = Arc::new(AtomicUsize::new(0));

        let reader_handle = {
            let done = done.clone();
            let dumps = dumps.clone();
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let reader = ChannelReader::<AnimationInvocation>::open(Some(&path), "stress").unwrap();
                while !done.load(Ordering::Acquire) {
                    let records = reader.read_all_descending(0);
                    assert!(records.len() <= 16);
                    dumps.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let handles: Vec<_> = (0..writer_count)
            .map(|t| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for i in 0..writes_per_thread {
                        let name = format!("T{} #{}", t, i);
                        writer.write_line(i as u64, name.as_bytes(), "Stress", AnimationInvocationType::LoadAreaVfx);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::Release);
        reader_handle.join().unwrap();

        assert!(dumps.load(Ordering::Relaxed) > 0);
        assert_eq!(writer.total_written(), (writer_count * writes_per_thread) as u64);

        // Quiescent: every line is committed and readable
        let segment = SegmentReader::open_read_only(Some(dir.path()), "stress", 1).unwrap();
        let lines = segment.read_all_descending();
        assert_eq!(lines.len(), 16);
        assert!(lines.iter().all(|line| line.consistent && line.is_current()));
    }

    /// Each thread's own records appear in the order it wrote them
    #[test]
    fn stress_per_thread_order_preserved() {
        let dir = TempDir::new().unwrap();
        let writer = open_writer(&dir, 256);
        let writer_count = 4;
        let writes_per_thread = 50;

        let handles: Vec<_> = (0..writer_count)
            .map(|t| {
                let writer = writer.clone();
                thread::spawn(move || {
                    for i in 0..writes_per_thread {
                        let name = format!("{}:{}", t, i);
                        writer.write_line(0, name.as_bytes(), "Order", AnimationInvocationType::PapLoad);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reader = ChannelReader::<AnimationInvocation>::open(Some(dir.path()), "stress").unwrap();
        let records = reader.read_all_descending(0);
        assert_eq!(records.len(), writer_count * writes_per_thread);

        let mut last_seen = vec![usize::MAX; writer_count];
        for record in &records {
            let (t, i) = record.character_name.split_once(':').unwrap();
            let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
            // Newest first, so sequence numbers only go down
            assert!(i < last_seen[t]);
            last_seen[t] = i;
        }
    }
}
