//! CRC-32 (ISO 3309) as used by ZIP.
//!
//! Long inputs go through a slicing-by-8 loop (eight derived tables, eight
//! bytes per step); short tails fall back to the single 256-entry table.
//! The same single-byte step drives the ZipCrypto key schedule.

/// Reflected CRC-32 polynomial.
const POLYNOMIAL: u32 = 0xEDB88320;

/// Threshold below which the byte-at-a-time loop is used.
const SLICE_THRESHOLD: usize = 16;

/// Slicing-by-8 tables; `TABLES[0]` is the classic byte table.
const TABLES: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            j += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    let mut t = 1;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = tables[0][(prev & 0xFF) as usize] ^ (prev >> 8);
            i += 1;
        }
        t += 1;
    }

    tables
};

/// Advance a raw (non-complemented) CRC register by one byte.
///
/// ZipCrypto feeds its key registers through this directly.
#[inline(always)]
pub fn crc32_update_byte(crc: u32, byte: u8) -> u32 {
    TABLES[0][((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

/// Running CRC-32 over byte chunks.
///
/// - Polynomial: 0x04C11DB7 (reflected: 0xEDB88320)
/// - Initial value / final XOR: 0xFFFFFFFF
///
/// # Example
///
/// ```
/// use oxizip_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, ");
/// crc.update(b"World!");
/// assert_eq!(crc.value(), 0xEC4AC3D0);
/// ```
#[derive(Debug, Clone)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC-32 calculator.
    pub fn new() -> Self {
        Self { crc: 0xFFFFFFFF }
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
    }

    /// Append bytes to the running checksum.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        if data.len() >= SLICE_THRESHOLD {
            self.crc = slice8(self.crc, data);
        } else {
            self.crc = bytewise(self.crc, data);
        }
    }

    /// Current checksum, without consuming the calculator.
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Finalize and return the checksum.
    #[inline(always)]
    pub fn finalize(self) -> u32 {
        self.value()
    }

    /// Compute CRC-32 for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn bytewise(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = crc32_update_byte(crc, byte);
    }
    crc
}

#[inline]
fn slice8(mut crc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let lo = crc ^ u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        crc = TABLES[7][(lo & 0xFF) as usize]
            ^ TABLES[6][((lo >> 8) & 0xFF) as usize]
            ^ TABLES[5][((lo >> 16) & 0xFF) as usize]
            ^ TABLES[4][(lo >> 24) as usize]
            ^ TABLES[3][chunk[4] as usize]
            ^ TABLES[2][chunk[5] as usize]
            ^ TABLES[1][chunk[6] as usize]
            ^ TABLES[0][chunk[7] as usize];
    }
    bytewise(crc, chunks.remainder())
}
