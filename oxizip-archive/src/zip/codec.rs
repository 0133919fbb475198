//! Entry codec pipeline.
//!
//! An entry's bytes flow through an ordered chain of [`Stage`]s. Each stage
//! takes whatever input it is given, emits whatever output it can, and keeps
//! the rest as state, so chunks of any size can be pushed without blocking.
//!
//! Write side: `CRC -> deflate/store -> encrypt`.
//! Read side: `decrypt -> inflate/store -> CRC check`.

use super::crypto::{ENCRYPTION_HEADER_SIZE, ZipCrypto, random_header_bytes};
use super::encryption::{AUTH_CODE_LEN, AesDecryptor, AesEncryptor, header_len};
use oxizip_core::crc::Crc32;
use oxizip_core::entry::{AesStrength, CompressionMethod};
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::{CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode};
use oxizip_deflate::{Deflater, Inflater};
use tracing::trace;
use zeroize::Zeroizing;

/// Output growth step for codec stages.
const OUTPUT_STEP: usize = 32 * 1024;

/// One transform in an entry pipeline.
pub trait Stage: Send {
    /// Process `input`, appending produced bytes to `out`.
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Flush everything still held; no more input follows.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()>;

    /// True once the stage wants no more input (password-only checks).
    fn stopped(&self) -> bool {
        false
    }

    /// CRC-32 seen by this stage, if it computes one.
    fn crc32(&self) -> Option<u32> {
        None
    }
}

/// Running CRC over the plaintext, optionally checked at the end.
#[derive(Debug, Default)]
pub struct CrcStage {
    crc: Crc32,
    expected: Option<u32>,
}

impl CrcStage {
    /// Compute only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute and compare with `expected` at finish.
    pub fn checking(expected: u32) -> Self {
        Self {
            crc: Crc32::new(),
            expected: Some(expected),
        }
    }
}

impl Stage for CrcStage {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.crc.update(input);
        out.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        match self.expected {
            Some(expected) if expected != self.crc.value() => {
                Err(OxiZipError::crc_mismatch(expected, self.crc.value()))
            }
            _ => Ok(()),
        }
    }

    fn crc32(&self) -> Option<u32> {
        Some(self.crc.value())
    }
}

/// Pass-through for stored entries.
#[derive(Debug, Default)]
pub struct StoreStage;

impl Stage for StoreStage {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Raw DEFLATE compression.
#[derive(Debug)]
pub struct DeflateStage {
    deflater: Deflater,
}

impl DeflateStage {
    /// Compress at `level` (1-9).
    pub fn new(level: u8) -> Self {
        Self {
            deflater: Deflater::new(level),
        }
    }

    fn run(&mut self, mut input: &[u8], out: &mut Vec<u8>, flush: FlushMode) -> Result<()> {
        loop {
            let start = out.len();
            out.resize(start + OUTPUT_STEP, 0);
            let (consumed, produced, status) =
                self.deflater.compress(input, &mut out[start..], flush)?;
            out.truncate(start + produced);
            input = &input[consumed..];
            match status {
                CompressStatus::NeedsOutput => continue,
                CompressStatus::Done => return Ok(()),
                CompressStatus::NeedsInput if input.is_empty() => return Ok(()),
                CompressStatus::NeedsInput => continue,
            }
        }
    }
}

impl Stage for DeflateStage {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.run(input, out, FlushMode::None)
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.run(&[], out, FlushMode::Finish)
    }
}

/// Raw DEFLATE decompression.
#[derive(Debug, Default)]
pub struct InflateStage {
    inflater: Inflater,
}

impl InflateStage {
    /// Fresh decoder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for InflateStage {
    fn push(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        while !self.inflater.is_finished() {
            let start = out.len();
            out.resize(start + OUTPUT_STEP, 0);
            let (consumed, produced, status) = self.inflater.decompress(input, &mut out[start..])?;
            out.truncate(start + produced);
            input = &input[consumed..];
            match status {
                DecompressStatus::NeedsOutput => continue,
                DecompressStatus::Done => break,
                DecompressStatus::NeedsInput if input.is_empty() => break,
                DecompressStatus::NeedsInput if consumed == 0 && produced == 0 => break,
                DecompressStatus::NeedsInput => continue,
            }
        }
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.push(&[], out)?;
        if !self.inflater.is_finished() {
            return Err(OxiZipError::unexpected_eof(1));
        }
        Ok(())
    }
}

/// ZipCrypto encryption; emits the 12-byte header first.
pub struct ZipCryptoEncryptStage {
    cipher: ZipCrypto,
    header: Option<[u8; ENCRYPTION_HEADER_SIZE]>,
}

impl ZipCryptoEncryptStage {
    /// Encrypt with `password`; the header ends in `check_byte`.
    pub fn new(password: &[u8], check_byte: u8) -> Result<Self> {
        let mut cipher = ZipCrypto::new(password);
        let header = cipher.encryption_header(check_byte, random_header_bytes()?);
        Ok(Self {
            cipher,
            header: Some(header),
        })
    }
}

impl Stage for ZipCryptoEncryptStage {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if let Some(header) = self.header.take() {
            out.extend_from_slice(&header);
        }
        let start = out.len();
        out.extend_from_slice(input);
        self.cipher.encrypt_buffer(&mut out[start..]);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.push(&[], out)
    }
}

/// ZipCrypto decryption; verifies the header before releasing any byte.
pub struct ZipCryptoDecryptStage {
    cipher: ZipCrypto,
    check_byte: u8,
    header: Vec<u8>,
    verified: bool,
    password_only: bool,
}

impl ZipCryptoDecryptStage {
    /// Decrypt with `password`, expecting `check_byte` in the header.
    pub fn new(password: &[u8], check_byte: u8, password_only: bool) -> Self {
        Self {
            cipher: ZipCrypto::new(password),
            check_byte,
            header: Vec::with_capacity(ENCRYPTION_HEADER_SIZE),
            verified: false,
            password_only,
        }
    }
}

impl Stage for ZipCryptoDecryptStage {
    fn push(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if !self.verified {
            let take = (ENCRYPTION_HEADER_SIZE - self.header.len()).min(input.len());
            self.header.extend_from_slice(&input[..take]);
            input = &input[take..];
            let Ok(header) = <[u8; ENCRYPTION_HEADER_SIZE]>::try_from(self.header.as_slice()) else {
                return Ok(());
            };
            self.cipher.verify_header(&header, self.check_byte)?;
            self.verified = true;
        }
        if self.password_only {
            return Ok(());
        }
        let start = out.len();
        out.extend_from_slice(input);
        self.cipher.decrypt_buffer(&mut out[start..]);
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        if !self.verified {
            return Err(OxiZipError::unexpected_eof(
                ENCRYPTION_HEADER_SIZE - self.header.len(),
            ));
        }
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.password_only && self.verified
    }
}

/// AE-x encryption; emits `salt | verifier` first and the auth code last.
pub struct AesEncryptStage {
    encryptor: Option<AesEncryptor>,
    header: Option<Vec<u8>>,
}

impl AesEncryptStage {
    /// Derive keys from a fresh salt.
    pub fn new(password: &[u8], strength: AesStrength) -> Result<Self> {
        let (encryptor, header) = AesEncryptor::new(password, strength)?;
        Ok(Self {
            encryptor: Some(encryptor),
            header: Some(header),
        })
    }
}

impl Stage for AesEncryptStage {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if let Some(header) = self.header.take() {
            out.extend_from_slice(&header);
        }
        let encryptor = self.encryptor.as_mut().ok_or(OxiZipError::ArchiveClosed)?;
        let start = out.len();
        out.extend_from_slice(input);
        encryptor.encrypt(&mut out[start..]);
        Ok(())
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.push(&[], out)?;
        let encryptor = self.encryptor.take().ok_or(OxiZipError::ArchiveClosed)?;
        out.extend_from_slice(&encryptor.finish());
        Ok(())
    }
}

/// AE-x decryption. The last 10 bytes are held back as the auth code.
pub struct AesDecryptStage {
    password: Zeroizing<Vec<u8>>,
    strength: AesStrength,
    header: Vec<u8>,
    decryptor: Option<AesDecryptor>,
    tail: Vec<u8>,
    password_only: bool,
}

impl AesDecryptStage {
    /// Decrypt with `password`.
    pub fn new(password: &[u8], strength: AesStrength, password_only: bool) -> Self {
        Self {
            password: Zeroizing::new(password.to_vec()),
            strength,
            header: Vec::with_capacity(header_len(strength)),
            decryptor: None,
            tail: Vec::new(),
            password_only,
        }
    }
}

impl Stage for AesDecryptStage {
    fn push(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.decryptor.is_none() {
            let want = header_len(self.strength);
            let take = (want - self.header.len()).min(input.len());
            self.header.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.header.len() < want {
                return Ok(());
            }
            self.decryptor = Some(AesDecryptor::new(&self.password, self.strength, &self.header)?);
        }
        if self.password_only {
            return Ok(());
        }
        self.tail.extend_from_slice(input);
        if self.tail.len() > AUTH_CODE_LEN {
            let ready = self.tail.len() - AUTH_CODE_LEN;
            let start = out.len();
            out.extend(self.tail.drain(..ready));
            if let Some(decryptor) = self.decryptor.as_mut() {
                decryptor.decrypt(&mut out[start..]);
            }
        }
        Ok(())
    }

    fn finish(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        let Some(decryptor) = self.decryptor.take() else {
            return Err(OxiZipError::unexpected_eof(header_len(self.strength) - self.header.len()));
        };
        if self.password_only {
            return Ok(());
        }
        if self.tail.len() < AUTH_CODE_LEN {
            return Err(OxiZipError::unexpected_eof(AUTH_CODE_LEN - self.tail.len()));
        }
        decryptor.verify(&self.tail)
    }

    fn stopped(&self) -> bool {
        self.password_only && self.decryptor.is_some()
    }
}

/// Encryption applied by a pipeline.
#[derive(Clone)]
pub enum CodecEncryption {
    /// ZipCrypto with the check byte the header must carry.
    ZipCrypto {
        /// Password bytes.
        password: Zeroizing<Vec<u8>>,
        /// Last plaintext header byte.
        check_byte: u8,
    },
    /// AE-x.
    Aes {
        /// Password bytes.
        password: Zeroizing<Vec<u8>>,
        /// Key strength.
        strength: AesStrength,
    },
}

impl std::fmt::Debug for CodecEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZipCrypto { check_byte, .. } => f
                .debug_struct("ZipCrypto")
                .field("check_byte", check_byte)
                .finish_non_exhaustive(),
            Self::Aes { strength, .. } => f
                .debug_struct("Aes")
                .field("strength", strength)
                .finish_non_exhaustive(),
        }
    }
}

/// Parameters of one entry's pipeline.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    /// Stored or Deflate (the method under any encryption).
    pub method: CompressionMethod,
    /// Deflate level 1-9.
    pub level: u8,
    /// Encryption, if any.
    pub encryption: Option<CodecEncryption>,
    /// Verify the CRC on read.
    pub check_signature: bool,
    /// CRC the plaintext must hash to.
    pub expected_crc: Option<u32>,
    /// Stop after the password check.
    pub password_only: bool,
}

/// Totals of a completed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    /// Bytes pushed in.
    pub bytes_in: u64,
    /// Bytes produced.
    pub bytes_out: u64,
    /// CRC-32 of the plaintext side.
    pub crc32: u32,
}

/// How a pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All data processed.
    Completed(PipelineStats),
    /// Password-only run stopped after a successful check.
    PasswordVerified,
}

/// Ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    bytes_in: u64,
    bytes_out: u64,
    stopped: bool,
}

impl Pipeline {
    /// Chain arbitrary stages.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            bytes_in: 0,
            bytes_out: 0,
            stopped: false,
        }
    }

    /// `CRC -> compress -> encrypt`.
    pub fn for_write(options: &CodecOptions) -> Result<Self> {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(CrcStage::new())];
        stages.push(match options.method {
            CompressionMethod::Stored => Box::new(StoreStage),
            CompressionMethod::Deflate => Box::new(DeflateStage::new(options.level.max(1))),
            other => return Err(OxiZipError::unsupported_method(other.to_string())),
        });
        match &options.encryption {
            Some(CodecEncryption::ZipCrypto {
                password,
                check_byte,
            }) => stages.push(Box::new(ZipCryptoEncryptStage::new(password, *check_byte)?)),
            Some(CodecEncryption::Aes { password, strength }) => {
                stages.push(Box::new(AesEncryptStage::new(password, *strength)?))
            }
            None => {}
        }
        Ok(Self::new(stages))
    }

    /// `decrypt -> decompress -> CRC`.
    pub fn for_read(options: &CodecOptions) -> Result<Self> {
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(3);
        match &options.encryption {
            Some(CodecEncryption::ZipCrypto {
                password,
                check_byte,
            }) => stages.push(Box::new(ZipCryptoDecryptStage::new(
                password,
                *check_byte,
                options.password_only,
            ))),
            Some(CodecEncryption::Aes { password, strength }) => stages.push(Box::new(
                AesDecryptStage::new(password, *strength, options.password_only),
            )),
            None => {}
        }
        stages.push(match options.method {
            CompressionMethod::Stored => Box::new(StoreStage),
            CompressionMethod::Deflate => Box::new(InflateStage::new()),
            other => return Err(OxiZipError::unsupported_method(other.to_string())),
        });
        stages.push(match options.expected_crc {
            Some(crc) if options.check_signature => Box::new(CrcStage::checking(crc)),
            _ => Box::new(CrcStage::new()),
        });
        Ok(Self::new(stages))
    }

    /// Feed one chunk; returns what came out of the last stage.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.bytes_in += chunk.len() as u64;
        let mut data = chunk.to_vec();
        for stage in &mut self.stages {
            let mut out = Vec::with_capacity(data.len());
            stage.push(&data, &mut out)?;
            if stage.stopped() {
                self.stopped = true;
                return Ok(Vec::new());
            }
            data = out;
        }
        self.bytes_out += data.len() as u64;
        trace!(input = chunk.len(), output = data.len(), "pipeline chunk");
        Ok(data)
    }

    /// Flush every stage in order.
    pub fn finish(&mut self) -> Result<(Vec<u8>, PipelineOutcome)> {
        if self.stopped {
            return Ok((Vec::new(), PipelineOutcome::PasswordVerified));
        }
        let mut data = Vec::new();
        for stage in &mut self.stages {
            let mut out = Vec::new();
            stage.push(&data, &mut out)?;
            stage.finish(&mut out)?;
            if stage.stopped() {
                return Ok((Vec::new(), PipelineOutcome::PasswordVerified));
            }
            data = out;
        }
        self.bytes_out += data.len() as u64;
        let crc32 = self.stages.iter().find_map(|s| s.crc32()).unwrap_or(0);
        Ok((
            data,
            PipelineOutcome::Completed(PipelineStats {
                bytes_in: self.bytes_in,
                bytes_out: self.bytes_out,
                crc32,
            }),
        ))
    }

    /// Run a whole buffer through.
    pub fn run(mut self, data: &[u8]) -> Result<(Vec<u8>, PipelineOutcome)> {
        let mut out = self.push(data)?;
        let (tail, outcome) = self.finish()?;
        out.extend_from_slice(&tail);
        Ok((out, outcome))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("bytes_in", &self.bytes_in)
            .field("bytes_out", &self.bytes_out)
            .finish()
    }
}
