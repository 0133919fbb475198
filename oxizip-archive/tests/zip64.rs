use oxizip_archive::io::{MemorySource, Sink, Source, VecSink};
use oxizip_archive::zip::extra::{ExtraField, Zip64Extra};
use oxizip_archive::zip::header::{
    CentralDirectoryHeader, DATA_DESCRIPTOR_SIG, DataDescriptor, EndOfCentralDirectory,
    LocalFileHeader, ZIP64_MARKER_32, Zip64EndOfCentralDirectory, Zip64Locator,
};
use oxizip_archive::zip::{EntryOptions, ReaderOptions, WriterOptions, ZipReader, ZipWriter};
use oxizip_core::entry::Zip64Fields;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::CompressionLevel;
use std::io::Read;

const FOUR_GIB: u64 = 1 << 32;

/// An archive whose single entry claims a 4 GiB payload.
///
/// Only the records are real; the payload itself is absent.
fn four_gib_archive() -> Vec<u8> {
    let sizes = Zip64Extra {
        uncompressed_size: Some(FOUR_GIB),
        compressed_size: Some(FOUR_GIB),
        offset: None,
        disk: None,
    };
    let local = LocalFileHeader {
        version_needed: 45,
        flags: 0,
        method: 0,
        time: 0,
        date: 0x21,
        crc32: 0,
        compressed_size: ZIP64_MARKER_32,
        uncompressed_size: ZIP64_MARKER_32,
        name: b"huge.bin".to_vec(),
        extra: ExtraField::serialize(&[ExtraField::Zip64(sizes.clone())]).unwrap(),
    };
    let mut out = local.to_bytes().unwrap();
    let cd_offset = out.len() as u64;
    let central = CentralDirectoryHeader {
        version_made_by: 0x031E,
        version_needed: 45,
        date: 0x21,
        compressed_size: ZIP64_MARKER_32,
        uncompressed_size: ZIP64_MARKER_32,
        name: b"huge.bin".to_vec(),
        extra: ExtraField::serialize(&[ExtraField::Zip64(sizes)]).unwrap(),
        ..Default::default()
    };
    let cd = central.to_bytes().unwrap();
    out.extend_from_slice(&cd);
    let record_offset = out.len() as u64;
    let record = Zip64EndOfCentralDirectory {
        version_made_by: 0x031E,
        version_needed: 45,
        disk: 0,
        cd_disk: 0,
        entries_on_disk: 1,
        total_entries: 1,
        cd_size: cd.len() as u64,
        cd_offset,
    };
    out.extend_from_slice(&record.to_bytes());
    let locator = Zip64Locator {
        cd64_disk: 0,
        cd64_offset: record_offset,
        total_disks: 1,
    };
    out.extend_from_slice(&locator.to_bytes());
    let eocd = EndOfCentralDirectory {
        disk: 0,
        cd_disk: 0,
        entries_on_disk: 1,
        total_entries: 1,
        cd_size: cd.len() as u32,
        cd_offset: ZIP64_MARKER_32,
        comment: Vec::new(),
    };
    out.extend_from_slice(&eocd.to_bytes().unwrap());
    out
}

#[test]
fn test_four_gib_sizes_promoted() {
    let bytes = four_gib_archive();

    let local = LocalFileHeader::parse(&bytes).unwrap();
    assert_eq!(local.uncompressed_size, ZIP64_MARKER_32);
    assert_eq!(local.compressed_size, ZIP64_MARKER_32);
    let mask = Zip64Fields {
        uncompressed_size: true,
        compressed_size: true,
        ..Default::default()
    };
    let fields = ExtraField::parse_all(&local.extra, mask).unwrap();
    assert!(matches!(
        &fields[0],
        ExtraField::Zip64(Zip64Extra { uncompressed_size: Some(FOUR_GIB), .. })
    ));

    let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
    let entry = reader.entry("huge.bin").unwrap();
    assert_eq!(entry.size, FOUR_GIB);
    assert_eq!(entry.compressed_size, FOUR_GIB);
    assert!(entry.zip64.uncompressed_size);
    assert!(!entry.zip64.offset);
    // The payload is not actually there
    assert!(reader.read(entry).is_err());
}

#[test]
fn test_size_hint_promotes_streamed_header() {
    let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), None);
    let entry = writer
        .add(
            "announced.bin",
            &b"short in practice"[..],
            EntryOptions::default().with_uncompressed_size(FOUR_GIB + 1),
        )
        .unwrap();
    assert!(entry.has_data_descriptor());
    let (_, sink) = writer.close().unwrap();
    let bytes = sink.into_inner();

    let local = LocalFileHeader::parse(&bytes).unwrap();
    assert_eq!(local.uncompressed_size, ZIP64_MARKER_32);
    assert_eq!(local.version_needed, 45);

    let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
    assert_eq!(reader.read_by_name("announced.bin").unwrap(), b"short in practice");
}

#[test]
fn test_forced_zip64_round_trip() {
    let writer = ZipWriter::new(
        VecSink::new(),
        WriterOptions::default().with_zip64(Some(true)),
        None,
    );
    for i in 0..3 {
        writer
            .add_bytes(&format!("f{i}.txt"), format!("file {i}").as_bytes(), EntryOptions::default())
            .unwrap();
    }
    let (_, sink) = writer.close().unwrap();
    let bytes = sink.into_inner();

    let tail = &bytes[bytes.len() - EndOfCentralDirectory::FIXED_SIZE..];
    let eocd = EndOfCentralDirectory::parse(tail).unwrap();
    assert_eq!(eocd.total_entries, 0xFFFF);
    let locator_at = bytes.len() - EndOfCentralDirectory::FIXED_SIZE - Zip64Locator::SIZE;
    let locator = Zip64Locator::parse(&bytes[locator_at..]).unwrap();
    let record = Zip64EndOfCentralDirectory::parse(&bytes[locator.cd64_offset as usize..]).unwrap();
    assert_eq!(record.total_entries, 3);

    let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
    for i in 0..3 {
        let data = reader.read_by_name(&format!("f{i}.txt")).unwrap();
        assert_eq!(data, format!("file {i}").as_bytes());
    }
}

#[test]
fn test_zip64_required_when_forbidden() {
    let writer = ZipWriter::new(
        VecSink::new(),
        WriterOptions::default()
            .with_zip64(Some(false))
            .with_data_descriptor(false),
        None,
    );
    writer.add_bytes("small", b"fits", EntryOptions::default()).unwrap();
    let err = writer
        .add(
            "announced",
            std::io::empty(),
            EntryOptions::default()
                .with_uncompressed_size(FOUR_GIB)
                .with_data_descriptor(true),
        )
        .unwrap_err();
    assert!(matches!(err, OxiZipError::Zip64Required { .. }));
    assert_eq!(writer.corrupted_entries(), ["announced"]);
    let (entries, _) = writer.close().unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_missing_locator_reported() {
    let mut bytes = four_gib_archive();
    let locator_at = bytes.len() - EndOfCentralDirectory::FIXED_SIZE - Zip64Locator::SIZE;
    bytes[locator_at] = 0;
    let err = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap_err();
    assert!(matches!(err, OxiZipError::Zip64LocatorNotFound));
}

/// Keeps only writes with non-zero bytes; zero runs are counted and read back as zeros.
#[derive(Default)]
struct SparseSink {
    len: u64,
    records: Vec<(u64, Vec<u8>)>,
}

impl Sink for SparseSink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.iter().any(|&b| b != 0) {
            self.records.push((self.len, bytes.to_vec()));
        }
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.len
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Source for SparseSink {
    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.len {
            return Err(OxiZipError::unexpected_eof(buf.len()));
        }
        buf.fill(0);
        for (start, data) in &self.records {
            let lo = offset.max(*start);
            let hi = end.min(start + data.len() as u64);
            if lo < hi {
                buf[(lo - offset) as usize..(hi - offset) as usize]
                    .copy_from_slice(&data[(lo - start) as usize..(hi - start) as usize]);
            }
        }
        Ok(())
    }
}

#[test]
fn test_writer_streams_four_gib_entry() {
    let writer = ZipWriter::new(
        SparseSink::default(),
        WriterOptions::default()
            .with_level(CompressionLevel::NONE)
            .with_chunk_size(4 << 20),
        None,
    );
    let written = writer
        .add(
            "zeros.bin",
            std::io::repeat(0).take(FOUR_GIB),
            EntryOptions::default().with_uncompressed_size(FOUR_GIB),
        )
        .unwrap();
    assert_eq!(written.size, FOUR_GIB);
    assert!(written.zip64.uncompressed_size && written.zip64.compressed_size);
    assert!(!written.zip64.offset);
    let (_, sink) = writer.close().unwrap();

    let (at, header) = &sink.records[0];
    assert_eq!(*at, 0);
    let local = LocalFileHeader::parse(header).unwrap();
    assert_eq!(local.uncompressed_size, ZIP64_MARKER_32);
    assert_eq!(local.compressed_size, ZIP64_MARKER_32);
    assert_eq!(local.version_needed, 45);
    let mask = Zip64Fields {
        uncompressed_size: true,
        compressed_size: true,
        ..Default::default()
    };
    let local_fields = ExtraField::parse_all(&local.extra, mask).unwrap();
    assert!(local_fields.iter().any(|f| matches!(
        f,
        ExtraField::Zip64(Zip64Extra {
            uncompressed_size: Some(_),
            compressed_size: Some(_),
            offset: None,
            disk: None,
        })
    )));

    let descriptor_at = header.len() as u64 + FOUR_GIB;
    let (_, raw) = sink
        .records
        .iter()
        .find(|(at, _)| *at == descriptor_at)
        .unwrap();
    assert_eq!(raw[..4], DATA_DESCRIPTOR_SIG.to_le_bytes());
    let descriptor = DataDescriptor::parse(raw, true).unwrap();
    assert_eq!(descriptor.uncompressed_size, FOUR_GIB);
    assert_eq!(descriptor.compressed_size, FOUR_GIB);
    assert_eq!(descriptor.crc32, written.crc32);

    let reader = ZipReader::open(
        sink,
        ReaderOptions::default().with_chunk_size(4 << 20),
        None,
    )
    .unwrap();
    let entry = reader.entry("zeros.bin").unwrap();
    assert_eq!(entry.size, FOUR_GIB);
    assert_eq!(entry.crc32, written.crc32);
    let central_fields = ExtraField::parse_all(&entry.extra, entry.zip64).unwrap();
    assert!(central_fields.contains(&ExtraField::Zip64(Zip64Extra {
        uncompressed_size: Some(FOUR_GIB),
        compressed_size: Some(FOUR_GIB),
        offset: None,
        disk: None,
    })));
    let extracted = reader.extract(entry, &mut std::io::sink()).unwrap();
    assert_eq!(extracted, FOUR_GIB);
}
