//! WinZip AE-x encryption.
//!
//! The password and a random salt go through PBKDF2-HMAC-SHA1 (1000
//! iterations) to derive an AES key, an HMAC-SHA1 key and a 2-byte password
//! verifier. The payload is encrypted with AES in CTR mode and authenticated
//! by an HMAC over the ciphertext, truncated to 10 bytes.
//!
//! On disk an AE-x payload is `salt | verifier | ciphertext | auth code`.
//!
//! ```
//! use oxizip_archive::zip::encryption::{AesDecryptor, AesEncryptor};
//! use oxizip_core::AesStrength;
//!
//! let (mut enc, header) = AesEncryptor::new(b"secret", AesStrength::Aes256).unwrap();
//! let mut data = b"attack at dawn".to_vec();
//! enc.encrypt(&mut data);
//! let tag = enc.finish();
//!
//! let mut dec = AesDecryptor::new(b"secret", AesStrength::Aes256, &header).unwrap();
//! dec.decrypt(&mut data);
//! dec.verify(&tag).unwrap();
//! assert_eq!(data, b"attack at dawn");
//! ```

use aes::{Aes128, Aes192, Aes256};
use constant_time_eq::constant_time_eq;
use ctr::Ctr128LE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use oxizip_core::entry::{AesStrength, AesVendorVersion, CompressionMethod};
use oxizip_core::error::{OxiZipError, Result};
use sha1::Sha1;
use zeroize::Zeroizing;

/// Extra field id carrying the AE-x parameters.
pub const AES_EXTRA_ID: u16 = 0x9901;

/// Length of the truncated HMAC trailer.
pub const AUTH_CODE_LEN: usize = 10;

/// Length of the password verifier after the salt.
pub const PASSWORD_VERIFIER_LEN: usize = 2;

/// PBKDF2 iteration count fixed by the format.
pub const KEY_ITERATIONS: u32 = 1000;

/// Payloads shorter than this are written as AE-2; the CRC would leak
/// too much about tiny plaintexts.
pub const AE2_THRESHOLD: u64 = 20;

type HmacSha1 = Hmac<Sha1>;

/// Bytes an AE-x payload adds around the ciphertext.
pub fn overhead(strength: AesStrength) -> u64 {
    (strength.salt_len() + PASSWORD_VERIFIER_LEN + AUTH_CODE_LEN) as u64
}

/// Length of the `salt | verifier` header.
pub fn header_len(strength: AesStrength) -> usize {
    strength.salt_len() + PASSWORD_VERIFIER_LEN
}

/// Vendor version the writer uses for a payload of `size` bytes.
pub fn vendor_version_for(size: u64) -> AesVendorVersion {
    if size < AE2_THRESHOLD {
        AesVendorVersion::Ae2
    } else {
        AesVendorVersion::Ae1
    }
}

/// Payload of the 0x9901 extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtraField {
    /// AE-1 or AE-2.
    pub vendor_version: AesVendorVersion,
    /// Key strength.
    pub strength: AesStrength,
    /// Method applied before encryption.
    pub actual_method: CompressionMethod,
}

impl AesExtraField {
    /// Payload length (without the 4-byte field header).
    pub const PAYLOAD_LEN: usize = 7;

    /// Parse the 7-byte payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::PAYLOAD_LEN {
            return Err(OxiZipError::unsupported_encryption(format!(
                "AES extra field is {} bytes, expected {}",
                data.len(),
                Self::PAYLOAD_LEN
            )));
        }
        let version = u16::from_le_bytes([data[0], data[1]]);
        let vendor_version = AesVendorVersion::from_u16(version).ok_or_else(|| {
            OxiZipError::unsupported_encryption(format!("AES vendor version {}", version))
        })?;
        if &data[2..4] != b"AE" {
            return Err(OxiZipError::unsupported_encryption(format!(
                "AES vendor id {:02x?}",
                &data[2..4]
            )));
        }
        let strength = AesStrength::from_u8(data[4]).ok_or_else(|| {
            OxiZipError::unsupported_encryption(format!("AES strength {}", data[4]))
        })?;
        let actual_method = CompressionMethod::from_u16(u16::from_le_bytes([data[5], data[6]]));
        Ok(Self {
            vendor_version,
            strength,
            actual_method,
        })
    }

    /// Serialize the payload.
    pub fn to_payload(&self) -> [u8; Self::PAYLOAD_LEN] {
        let version = self.vendor_version.to_u16().to_le_bytes();
        let method = self.actual_method.to_u16().to_le_bytes();
        [
            version[0],
            version[1],
            b'A',
            b'E',
            self.strength as u8,
            method[0],
            method[1],
        ]
    }
}

enum CtrCipher {
    Aes128(Box<Ctr128LE<Aes128>>),
    Aes192(Box<Ctr128LE<Aes192>>),
    Aes256(Box<Ctr128LE<Aes256>>),
}

impl CtrCipher {
    fn new(strength: AesStrength, key: &[u8]) -> Result<Self> {
        // Little-endian block counter starting at 1
        let mut iv = [0u8; 16];
        iv[0] = 1;
        let invalid = |_| OxiZipError::unsupported_encryption("AES key length mismatch");
        Ok(match strength {
            AesStrength::Aes128 => Self::Aes128(Box::new(
                Ctr128LE::<Aes128>::new_from_slices(key, &iv).map_err(invalid)?,
            )),
            AesStrength::Aes192 => Self::Aes192(Box::new(
                Ctr128LE::<Aes192>::new_from_slices(key, &iv).map_err(invalid)?,
            )),
            AesStrength::Aes256 => Self::Aes256(Box::new(
                Ctr128LE::<Aes256>::new_from_slices(key, &iv).map_err(invalid)?,
            )),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(c) => c.apply_keystream(data),
            Self::Aes192(c) => c.apply_keystream(data),
            Self::Aes256(c) => c.apply_keystream(data),
        }
    }
}

struct DerivedKeys {
    cipher: CtrCipher,
    mac: HmacSha1,
    verifier: [u8; PASSWORD_VERIFIER_LEN],
}

fn derive(password: &[u8], salt: &[u8], strength: AesStrength) -> Result<DerivedKeys> {
    if salt.len() != strength.salt_len() {
        return Err(OxiZipError::invalid_header(format!(
            "AES salt is {} bytes, expected {}",
            salt.len(),
            strength.salt_len()
        )));
    }
    let key_len = strength.key_len();
    let mut derived = Zeroizing::new(vec![0u8; strength.derived_key_len()]);
    pbkdf2::pbkdf2::<HmacSha1>(password, salt, KEY_ITERATIONS, &mut derived)
        .map_err(|_| OxiZipError::unsupported_encryption("PBKDF2 output length"))?;

    let cipher = CtrCipher::new(strength, &derived[..key_len])?;
    let mac = <HmacSha1 as Mac>::new_from_slice(&derived[key_len..key_len * 2])
        .map_err(|_| OxiZipError::unsupported_encryption("HMAC key length"))?;
    let verifier = [derived[key_len * 2], derived[key_len * 2 + 1]];
    Ok(DerivedKeys {
        cipher,
        mac,
        verifier,
    })
}

/// Fresh random salt for `strength`.
pub fn random_salt(strength: AesStrength) -> Result<Vec<u8>> {
    let mut salt = vec![0u8; strength.salt_len()];
    getrandom::fill(&mut salt)
        .map_err(|e| OxiZipError::unsupported_encryption(format!("no randomness: {}", e)))?;
    Ok(salt)
}

/// Encrypting half of AE-x.
pub struct AesEncryptor {
    cipher: CtrCipher,
    mac: HmacSha1,
}

impl AesEncryptor {
    /// Derive keys from a fresh random salt.
    ///
    /// Returns the encryptor and the `salt | verifier` header to write first.
    pub fn new(password: &[u8], strength: AesStrength) -> Result<(Self, Vec<u8>)> {
        let salt = random_salt(strength)?;
        Self::with_salt(password, strength, &salt)
    }

    /// Derive keys from a caller-chosen salt.
    pub fn with_salt(password: &[u8], strength: AesStrength, salt: &[u8]) -> Result<(Self, Vec<u8>)> {
        let keys = derive(password, salt, strength)?;
        let mut header = Vec::with_capacity(header_len(strength));
        header.extend_from_slice(salt);
        header.extend_from_slice(&keys.verifier);
        Ok((
            Self {
                cipher: keys.cipher,
                mac: keys.mac,
            },
            header,
        ))
    }

    /// Encrypt in place.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.cipher.apply(data);
        self.mac.update(data);
    }

    /// Authentication code over all ciphertext.
    pub fn finish(self) -> [u8; AUTH_CODE_LEN] {
        let full = self.mac.finalize().into_bytes();
        let mut code = [0u8; AUTH_CODE_LEN];
        code.copy_from_slice(&full[..AUTH_CODE_LEN]);
        code
    }
}

/// Decrypting half of AE-x.
pub struct AesDecryptor {
    cipher: CtrCipher,
    mac: HmacSha1,
}

impl AesDecryptor {
    /// Derive keys from the `salt | verifier` header and check the verifier.
    ///
    /// A mismatch is [`OxiZipError::WrongPassword`].
    pub fn new(password: &[u8], strength: AesStrength, header: &[u8]) -> Result<Self> {
        if header.len() != header_len(strength) {
            return Err(OxiZipError::unexpected_eof(header_len(strength)));
        }
        let (salt, verifier) = header.split_at(strength.salt_len());
        let keys = derive(password, salt, strength)?;
        if !constant_time_eq(&keys.verifier, verifier) {
            return Err(OxiZipError::WrongPassword);
        }
        Ok(Self {
            cipher: keys.cipher,
            mac: keys.mac,
        })
    }

    /// Decrypt in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.mac.update(data);
        self.cipher.apply(data);
    }

    /// Compare the trailer against the HMAC of everything decrypted.
    pub fn verify(self, code: &[u8]) -> Result<()> {
        let full = self.mac.finalize().into_bytes();
        if code.len() == AUTH_CODE_LEN && constant_time_eq(&full[..AUTH_CODE_LEN], code) {
            Ok(())
        } else {
            Err(OxiZipError::AuthenticationFailed)
        }
    }
}
