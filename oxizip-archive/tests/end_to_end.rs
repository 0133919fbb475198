use oxizip_archive::io::{MemorySource, VecSink};
use oxizip_archive::zip::{
    EncryptionMethod, EntryOptions, PoolConfig, ReaderOptions, WorkerPool, WriterOptions,
    ZipReader, ZipWriter,
};
use oxizip_core::entry::{AesStrength, CompressionMethod, EncryptionInfo};
use oxizip_core::error::OxiZipError;
use oxizip_core::traits::CompressionLevel;
use std::sync::Arc;

fn text_10k() -> Vec<u8> {
    let line = b"The quick brown fox jumps over the lazy dog. 0123456789\n";
    line.iter().copied().cycle().take(10 * 1024).collect()
}

fn noise(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 24) as u8
        })
        .collect()
}

fn build_archive(pool: Option<Arc<WorkerPool>>) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    let text = text_10k();
    let secret = noise(1024 * 1024, 7);
    let writer = ZipWriter::new(VecSink::new(), WriterOptions::default(), pool);
    writer.add_directory("docs/", EntryOptions::default()).unwrap();
    writer
        .add_bytes(
            "docs/readme.txt",
            &text,
            EntryOptions::default().with_level(CompressionLevel::DEFAULT),
        )
        .unwrap();
    writer
        .add(
            "docs/secret.bin",
            &secret[..],
            EntryOptions::default()
                .with_password("correct horse")
                .with_encryption(EncryptionMethod::Aes(AesStrength::Aes256)),
        )
        .unwrap();
    let (entries, sink) = writer.close().unwrap();
    assert_eq!(entries.len(), 3);
    (sink.into_inner(), text, secret)
}

#[test]
fn test_three_entry_scenario() {
    let pool = Arc::new(WorkerPool::new(PoolConfig::default().with_max_workers(2)));
    let (bytes, text, secret) = build_archive(Some(Arc::clone(&pool)));

    let reader = ZipReader::open(
        MemorySource::new(bytes),
        ReaderOptions::default().with_password("correct horse"),
        Some(pool),
    )
    .unwrap();
    let names: Vec<&str> = reader.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["docs/", "docs/readme.txt", "docs/secret.bin"]);

    let dir = reader.entry("docs/").unwrap();
    assert!(dir.is_dir());
    assert_eq!(dir.size, 0);
    assert_eq!(reader.read(dir).unwrap(), b"");

    let readme = reader.entry("docs/readme.txt").unwrap();
    assert_eq!(readme.method, CompressionMethod::Deflate);
    assert_eq!(readme.size, text.len() as u64);
    assert_eq!(readme.crc32, oxizip_core::crc::Crc32::compute(&text));
    assert_eq!(reader.read(readme).unwrap(), text);

    let encrypted = reader.entry("docs/secret.bin").unwrap();
    assert_eq!(encrypted.size, secret.len() as u64);
    assert!(matches!(
        encrypted.encryption,
        Some(EncryptionInfo::Aes {
            strength: AesStrength::Aes256,
            ..
        })
    ));
    assert_eq!(encrypted.crc32, oxizip_core::crc::Crc32::compute(&secret));
    assert_eq!(reader.read(encrypted).unwrap(), secret);
    reader.check_password(encrypted).unwrap();
}

#[test]
fn test_wrong_password_rejected() {
    let (bytes, _, _) = build_archive(None);
    let reader = ZipReader::open(
        MemorySource::new(bytes),
        ReaderOptions::default().with_password("wrong horse"),
        None,
    )
    .unwrap();
    let encrypted = reader.entry("docs/secret.bin").unwrap();
    let err = reader.read(encrypted).unwrap_err();
    // The 16-bit verifier lets one wrong password in 65536 through to the MAC
    assert!(
        matches!(err, OxiZipError::WrongPassword | OxiZipError::AuthenticationFailed),
        "unexpected error: {err}"
    );

    // Unencrypted entries are unaffected by the password
    assert!(reader.read_by_name("docs/readme.txt").is_ok());
}

#[test]
fn test_missing_password() {
    let (bytes, _, _) = build_archive(None);
    let reader = ZipReader::open(MemorySource::new(bytes), ReaderOptions::default(), None).unwrap();
    let err = reader.read_by_name("docs/secret.bin").unwrap_err();
    assert!(err.is_password_error());
}

#[test]
fn test_prepended_stub_is_tolerated() {
    let (bytes, text, _) = build_archive(None);
    let mut prefixed = b"MZ fake executable stub".to_vec();
    let stub_len = prefixed.len() as u64;
    prefixed.extend_from_slice(&bytes);
    prefixed.extend_from_slice(b"appended");

    let reader = ZipReader::open(
        MemorySource::new(prefixed),
        ReaderOptions::default().with_password("correct horse"),
        None,
    )
    .unwrap();
    assert_eq!(reader.prepended_data_len(), stub_len);
    assert_eq!(reader.appended_data_len(), 8);
    assert_eq!(reader.read_by_name("docs/readme.txt").unwrap(), text);
}

#[test]
fn test_aes_tamper_detected() {
    let payload = noise(4096, 99);
    let writer = ZipWriter::new(
        VecSink::new(),
        WriterOptions::default()
            .with_password("pw")
            .with_level(CompressionLevel::NONE),
        None,
    );
    writer.add_bytes("blob", &payload, EntryOptions::default()).unwrap();
    let (_, sink) = writer.close().unwrap();
    let mut bytes = sink.into_inner();

    let data_offset = {
        let reader =
            ZipReader::open(MemorySource::new(bytes.clone()), ReaderOptions::default(), None)
                .unwrap();
        let entry = reader.entry("blob").unwrap();
        reader.local_data_offset(entry).unwrap()
    };
    // Past the 18-byte AES-256 salt and verifier
    bytes[data_offset as usize + 18 + 1000] ^= 0x01;

    let reader = ZipReader::open(
        MemorySource::new(bytes),
        ReaderOptions::default().with_password("pw"),
        None,
    )
    .unwrap();
    let err = reader.read_by_name("blob").unwrap_err();
    assert!(matches!(err, OxiZipError::AuthenticationFailed), "got {err}");
}

#[test]
fn test_zipcrypto_password_check() {
    let writer = ZipWriter::new(
        VecSink::new(),
        WriterOptions::default()
            .with_password("legacy")
            .with_encryption(EncryptionMethod::ZipCrypto),
        None,
    );
    writer
        .add_bytes("old.txt", b"legacy encrypted text", EntryOptions::default())
        .unwrap();
    let (_, sink) = writer.close().unwrap();
    let bytes = sink.into_inner();

    let reader = ZipReader::open(
        MemorySource::new(bytes.clone()),
        ReaderOptions::default().with_password("legacy"),
        None,
    )
    .unwrap();
    let entry = reader.entry("old.txt").unwrap();
    assert_eq!(entry.encryption, Some(EncryptionInfo::ZipCrypto));
    reader.check_password(entry).unwrap();
    assert_eq!(reader.read(entry).unwrap(), b"legacy encrypted text");

    // One check byte: a wrong password slips through 1 time in 256
    let rejected = ["a", "b", "c", "d"].iter().any(|password| {
        let mut reader =
            ZipReader::open(MemorySource::new(bytes.clone()), ReaderOptions::default(), None)
                .unwrap();
        reader.set_password(password);
        let entry = reader.entry("old.txt").unwrap().clone();
        matches!(reader.check_password(&entry), Err(OxiZipError::WrongPassword))
    });
    assert!(rejected);
}

#[rstest::rstest]
#[case::stored_plain(0, None)]
#[case::deflate_plain(6, None)]
#[case::deflate_zipcrypto(1, Some(EncryptionMethod::ZipCrypto))]
#[case::stored_aes128(0, Some(EncryptionMethod::Aes(AesStrength::Aes128)))]
#[case::deflate_aes192(9, Some(EncryptionMethod::Aes(AesStrength::Aes192)))]
fn test_level_and_cipher_grid(#[case] level: u8, #[case] cipher: Option<EncryptionMethod>) {
    let data = noise(3000, u32::from(level) + 11)
        .into_iter()
        .chain(text_10k())
        .collect::<Vec<u8>>();
    let mut options = WriterOptions::default().with_level(level);
    if let Some(cipher) = cipher {
        options = options.with_password("grid").with_encryption(cipher);
    }
    let writer = ZipWriter::new(VecSink::new(), options, None);
    writer.add("streamed", &data[..], EntryOptions::default()).unwrap();
    writer.add_bytes("buffered", &data, EntryOptions::default()).unwrap();
    let (_, sink) = writer.close().unwrap();

    let reader = ZipReader::open(
        MemorySource::new(sink.into_inner()),
        ReaderOptions::default().with_password("grid"),
        None,
    )
    .unwrap();
    for entry in reader.entries() {
        assert_eq!(entry.is_encrypted(), cipher.is_some());
        assert_eq!(reader.read(entry).unwrap(), data, "{}", entry.name);
    }
}
