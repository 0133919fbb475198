use oxizip_archive::io::{
    MemorySource, MemoryVolumes, MultiVolumeSource, SPLIT_MARKER, Source, SplitSink,
};
use oxizip_archive::zip::{EntryOptions, ReaderOptions, WriterOptions, ZipReader, ZipWriter};
use oxizip_core::error::OxiZipError;
use oxizip_core::traits::CompressionLevel;

const VOLUME: u64 = 64 * 1024;

fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        })
        .collect()
}

fn files() -> Vec<(String, Vec<u8>)> {
    (0..6)
        .map(|i| (format!("part{i}.bin"), noise(50_000, i as u32 + 1)))
        .collect()
}

fn write_split(volumes: MemoryVolumes) -> Vec<Vec<u8>> {
    let sink = SplitSink::new(volumes.clone(), VOLUME).unwrap();
    let writer = ZipWriter::new(
        sink,
        WriterOptions::default().with_level(CompressionLevel::NONE),
        None,
    );
    for (name, data) in files() {
        writer.add_bytes(&name, &data, EntryOptions::default()).unwrap();
    }
    let (_, sink) = writer.close().unwrap();
    assert!(sink.volume_count() >= 4);
    volumes.volumes()
}

fn join(volumes: &[Vec<u8>]) -> MultiVolumeSource {
    MultiVolumeSource::new(
        volumes
            .iter()
            .map(|v| Box::new(MemorySource::new(v.clone())) as Box<dyn Source>)
            .collect(),
    )
    .unwrap()
}

#[test]
fn test_split_round_trip() {
    let volumes = write_split(MemoryVolumes::new());
    assert_eq!(&volumes[0][..4], &SPLIT_MARKER);
    for volume in &volumes {
        assert!(volume.len() as u64 <= VOLUME);
    }

    let reader = ZipReader::open(join(&volumes), ReaderOptions::default(), None).unwrap();
    assert_eq!(reader.entries().len(), 6);
    assert!(reader.entries().iter().any(|e| e.disk > 0));
    for (name, data) in files() {
        assert_eq!(reader.read_by_name(&name).unwrap(), data);
    }
}

#[test]
fn test_entry_offsets_resolve_to_their_disk() {
    let volumes = write_split(MemoryVolumes::new());
    let source = join(&volumes);
    let reader = ZipReader::open(source, ReaderOptions::default(), None).unwrap();
    for entry in reader.entries() {
        let global = reader.local_header_offset(entry).unwrap();
        assert_eq!(reader.source().locate(global), (entry.disk, entry.offset));
        let volume = &volumes[entry.disk as usize];
        assert_eq!(&volume[entry.offset as usize..entry.offset as usize + 4], b"PK\x03\x04");
    }
}

#[test]
fn test_last_volume_alone_is_a_split_archive() {
    let volumes = write_split(MemoryVolumes::new());
    let last = volumes.last().unwrap().clone();
    let err = ZipReader::open(MemorySource::new(last), ReaderOptions::default(), None).unwrap_err();
    assert!(matches!(err, OxiZipError::SplitArchive));

    let first = volumes[0].clone();
    let err = ZipReader::open(MemorySource::new(first), ReaderOptions::default(), None).unwrap_err();
    assert!(matches!(err, OxiZipError::SplitArchive));
}

#[test]
fn test_split_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.zip");
    let writer = ZipWriter::create(
        &path,
        WriterOptions::default()
            .with_level(CompressionLevel::NONE)
            .with_split_size(VOLUME),
        None,
    )
    .unwrap();
    for (name, data) in files() {
        writer.add_bytes(&name, &data, EntryOptions::default()).unwrap();
    }
    writer.close().unwrap();

    assert!(dir.path().join("bundle.z01").exists());
    assert!(path.exists());
    let source = MultiVolumeSource::open_split(&path).unwrap();
    assert!(source.volumes().len() >= 4);
    let reader = ZipReader::open(source, ReaderOptions::default(), None).unwrap();
    for (name, data) in files() {
        assert_eq!(reader.read_by_name(&name).unwrap(), data);
    }
}

#[test]
fn test_single_volume_split_is_readable() {
    let volumes = MemoryVolumes::new();
    let sink = SplitSink::new(volumes.clone(), VOLUME).unwrap();
    let writer = ZipWriter::new(sink, WriterOptions::default(), None);
    writer.add_bytes("tiny.txt", b"fits on one disk", EntryOptions::default()).unwrap();
    writer.close().unwrap();

    let volumes = volumes.volumes();
    assert_eq!(volumes.len(), 1);
    let reader = ZipReader::open(MemorySource::new(volumes[0].clone()), ReaderOptions::default(), None)
        .unwrap();
    assert_eq!(reader.read_by_name("tiny.txt").unwrap(), b"fits on one disk");
    assert_eq!(reader.prepended_data_len(), SPLIT_MARKER.len() as u64);
}
