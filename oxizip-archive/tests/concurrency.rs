use oxizip_archive::io::{MemorySource, VecSink};
use oxizip_archive::zip::{
    EntryOptions, PoolConfig, ReaderOptions, WorkerPool, WriterOptions, ZipReader, ZipWriter,
};
use std::sync::Arc;
use std::thread;

fn payload(i: usize) -> Vec<u8> {
    format!("entry number {i} ").repeat(200 + i * 37).into_bytes()
}

#[test]
fn test_keep_order_follows_prepare_order() {
    let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_max_workers(3)));
    let writer = ZipWriter::new(
        VecSink::new(),
        WriterOptions::default().with_keep_order(true),
        Some(pool),
    );

    let pending: Vec<_> = (0..6)
        .map(|i| writer.prepare(&format!("ordered/{i}.txt"), EntryOptions::default()).unwrap())
        .collect();
    thread::scope(|scope| {
        // Later entries start first and must wait for their turn
        for (i, entry) in pending.into_iter().enumerate().rev() {
            scope.spawn(move || {
                let data = payload(i);
                entry.write(&data[..]).unwrap();
            });
        }
    });

    let (entries, sink) = writer.close().unwrap();
    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    let expected: Vec<String> = (0..6).map(|i| format!("ordered/{i}.txt")).collect();
    assert_eq!(names, expected);
    assert!(entries.windows(2).all(|pair| pair[0].offset < pair[1].offset));

    let reader =
        ZipReader::open(MemorySource::new(sink.into_inner()), ReaderOptions::default(), None).unwrap();
    let listed: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(listed, expected);
    for (i, entry) in reader.entries().iter().enumerate() {
        assert_eq!(reader.read(entry).unwrap(), payload(i));
    }
}

#[test]
fn test_unordered_parallel_adds() {
    let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_max_workers(2)));
    let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), Some(Arc::clone(&pool)));

    thread::scope(|scope| {
        for i in 0..8 {
            let writer = &writer;
            scope.spawn(move || {
                let data = payload(i);
                writer
                    .add_bytes(&format!("loose/{i}.txt"), &data, EntryOptions::default())
                    .unwrap();
            });
        }
    });
    assert!(pool.live_workers() <= 2);

    let (entries, sink) = writer.close().unwrap();
    assert_eq!(entries.len(), 8);
    let reader = ZipReader::open(
        MemorySource::new(sink.into_inner()),
        ReaderOptions::default(),
        Some(pool),
    )
    .unwrap();
    for i in 0..8 {
        assert_eq!(reader.read_by_name(&format!("loose/{i}.txt")).unwrap(), payload(i));
    }
}

#[test]
fn test_parallel_reads_share_one_reader() {
    let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
    for i in 0..4 {
        writer.add_bytes(&format!("{i}.txt"), &payload(i), EntryOptions::default()).unwrap();
    }
    let (_, sink) = writer.close().unwrap();
    let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_max_workers(2)));
    let reader = ZipReader::open(
        MemorySource::new(sink.into_inner()),
        ReaderOptions::default(),
        Some(pool),
    )
    .unwrap();

    thread::scope(|scope| {
        for entry in reader.entries() {
            let reader = &reader;
            scope.spawn(move || {
                let index: usize = entry.name.trim_end_matches(".txt").parse().unwrap();
                assert_eq!(reader.read(entry).unwrap(), payload(index));
            });
        }
    });
}
