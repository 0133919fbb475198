//! Traditional PKWARE encryption ("ZipCrypto").
//!
//! Three 32-bit key registers are seeded from the password and advanced
//! with every plaintext byte. A 12-byte header of random bytes precedes the
//! payload; its last plaintext byte must equal a check byte known to the
//! reader (the CRC high byte, or the DOS time high byte when the CRC is
//! deferred to a data descriptor). A mismatch means a wrong password.
//!
//! **Security warning**: this cipher is broken by known-plaintext attacks.
//! It exists for compatibility; prefer AE-x.
//!
//! ```
//! use oxizip_archive::zip::crypto::ZipCrypto;
//!
//! let mut cipher = ZipCrypto::new(b"pw");
//! let header = cipher.encryption_header(0x5A, [1; 11]);
//! let mut data = b"Hello".to_vec();
//! cipher.encrypt_buffer(&mut data);
//!
//! let mut cipher = ZipCrypto::new(b"pw");
//! cipher.verify_header(&header, 0x5A).unwrap();
//! cipher.decrypt_buffer(&mut data);
//! assert_eq!(data, b"Hello");
//! ```

use oxizip_core::crc::crc32_update_byte;
use oxizip_core::error::{OxiZipError, Result};
use zeroize::Zeroize;

const INITIAL_KEYS: [u32; 3] = [0x12345678, 0x23456789, 0x34567890];

/// Size of the encryption header in bytes.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// ZipCrypto key state.
#[derive(Clone)]
pub struct ZipCrypto {
    keys: [u32; 3],
}

impl ZipCrypto {
    /// Seed the keys from `password`.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self { keys: INITIAL_KEYS };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn update_keys(&mut self, byte: u8) {
        let [k0, k1, k2] = &mut self.keys;
        *k0 = crc32_update_byte(*k0, byte);
        *k1 = k1
            .wrapping_add(*k0 & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        *k2 = crc32_update_byte(*k2, (*k1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypt one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let out = byte ^ self.stream_byte();
        self.update_keys(byte);
        out
    }

    /// Decrypt one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain = byte ^ self.stream_byte();
        self.update_keys(plain);
        plain
    }

    /// Encrypt in place.
    pub fn encrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypt in place.
    pub fn decrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Encrypt the 12-byte header: 11 random bytes then `check_byte`.
    pub fn encryption_header(
        &mut self,
        check_byte: u8,
        random: [u8; ENCRYPTION_HEADER_SIZE - 1],
    ) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        header[..11].copy_from_slice(&random);
        header[11] = check_byte;
        self.encrypt_buffer(&mut header);
        header
    }

    /// Decrypt a header and compare its last byte with `check_byte`.
    ///
    /// On success the key state is positioned at the start of the payload.
    pub fn verify_header(&mut self, header: &[u8; ENCRYPTION_HEADER_SIZE], check_byte: u8) -> Result<()> {
        let mut plain = *header;
        self.decrypt_buffer(&mut plain);
        if plain[11] != check_byte {
            return Err(OxiZipError::WrongPassword);
        }
        Ok(())
    }
}

impl Drop for ZipCrypto {
    fn drop(&mut self) {
        self.keys.zeroize();
    }
}

impl std::fmt::Debug for ZipCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipCrypto").finish_non_exhaustive()
    }
}

/// 11 random bytes for a new header.
pub fn random_header_bytes() -> Result<[u8; ENCRYPTION_HEADER_SIZE - 1]> {
    let mut bytes = [0u8; ENCRYPTION_HEADER_SIZE - 1];
    getrandom::fill(&mut bytes)
        .map_err(|e| OxiZipError::unsupported_encryption(format!("no randomness: {}", e)))?;
    Ok(bytes)
}
