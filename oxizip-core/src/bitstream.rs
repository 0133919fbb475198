//! Push-fed bit buffers for resumable codecs.
//!
//! DEFLATE packs codes LSB-first within bytes. Unlike a reader wrapped
//! around `Read`, [`BitInput`] never blocks: the caller hands it the current
//! input slice and it pulls only the bytes needed for the next request. When
//! the slice runs dry it reports "not yet" and keeps its partial state, so a
//! decoder can suspend in the middle of any symbol and resume on the next
//! chunk.
//!
//! # Example
//!
//! ```
//! use oxizip_core::bitstream::{BitInput, BitOutput};
//!
//! let mut out = BitOutput::new();
//! out.write_bits(0b101, 3);
//! out.write_bits(0b1100, 4);
//! out.align_to_byte();
//! let bytes = out.take();
//!
//! let mut input = BitInput::new();
//! let mut pos = 0;
//! assert_eq!(input.try_bits(3, &bytes, &mut pos), Some(0b101));
//! assert_eq!(input.try_bits(4, &bytes, &mut pos), Some(0b1100));
//! assert_eq!(input.try_bits(8, &bytes, &mut pos), None);
//! ```

/// LSB-first bit accumulator refilled from caller-owned slices.
#[derive(Debug, Clone, Default)]
pub struct BitInput {
    /// Buffered bits, next bit at position 0.
    buffer: u64,
    /// Number of valid bits in `buffer`.
    bits: u8,
    /// Total bits consumed (for error reporting).
    consumed_bits: u64,
}

impl BitInput {
    /// Create an empty bit accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bits.
    #[inline]
    pub fn available(&self) -> u8 {
        self.bits
    }

    /// Total bits consumed so far.
    #[inline]
    pub fn bit_position(&self) -> u64 {
        self.consumed_bits
    }

    /// Pull bytes from `input[*pos..]` until at least `count` bits are buffered.
    ///
    /// Returns `true` when the request can be satisfied.
    #[inline]
    pub fn need(&mut self, count: u8, input: &[u8], pos: &mut usize) -> bool {
        debug_assert!(count <= 32);
        while self.bits < count {
            let Some(&byte) = input.get(*pos) else {
                return false;
            };
            *pos += 1;
            self.buffer |= (byte as u64) << self.bits;
            self.bits += 8;
        }
        true
    }

    /// Pull as many whole bytes as fit, up to `limit` buffered bits.
    #[inline]
    pub fn fill(&mut self, limit: u8, input: &[u8], pos: &mut usize) {
        while self.bits + 8 <= limit.min(56) {
            let Some(&byte) = input.get(*pos) else {
                return;
            };
            *pos += 1;
            self.buffer |= (byte as u64) << self.bits;
            self.bits += 8;
        }
    }

    /// Look at the buffered bits without consuming them.
    ///
    /// Bits beyond [`available`](Self::available) read as zero.
    #[inline]
    pub fn peek(&self) -> u32 {
        self.buffer as u32
    }

    /// All buffered bits, for decoding several fields before committing.
    #[inline]
    pub fn peek_u64(&self) -> u64 {
        self.buffer
    }

    /// Drop `count` buffered bits.
    #[inline]
    pub fn consume(&mut self, count: u8) {
        debug_assert!(count <= self.bits);
        self.buffer >>= count;
        self.bits -= count;
        self.consumed_bits += count as u64;
    }

    /// Read `count` bits (0-32), or `None` if the input slice is exhausted.
    ///
    /// On `None` nothing is consumed; bytes already pulled stay buffered.
    #[inline]
    pub fn try_bits(&mut self, count: u8, input: &[u8], pos: &mut usize) -> Option<u32> {
        if count == 0 {
            return Some(0);
        }
        if !self.need(count, input, pos) {
            return None;
        }
        let value = if count == 32 {
            self.buffer as u32
        } else {
            (self.buffer & ((1u64 << count) - 1)) as u32
        };
        self.consume(count);
        Some(value)
    }

    /// Discard bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let skip = self.bits % 8;
        self.consume(skip);
    }

    /// Align and hand back whole buffered bytes that belong to the caller.
    ///
    /// Returns how many bytes were dropped; they are not counted as consumed.
    pub fn release_bytes(&mut self) -> usize {
        self.align_to_byte();
        let bytes = (self.bits / 8) as usize;
        self.buffer = 0;
        self.bits = 0;
        bytes
    }

    /// Move whole buffered bytes into `out` after alignment.
    ///
    /// Returns the number of bytes moved.
    pub fn take_aligned_bytes(&mut self, out: &mut [u8]) -> usize {
        debug_assert!(self.bits % 8 == 0);
        let mut moved = 0;
        while self.bits >= 8 && moved < out.len() {
            out[moved] = self.buffer as u8;
            self.consume(8);
            moved += 1;
        }
        moved
    }

    /// Whole bytes buffered but not yet consumed.
    ///
    /// Used to give unread lookahead back to the caller at end of stream.
    pub fn buffered_bytes(&self) -> usize {
        (self.bits / 8) as usize
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// LSB-first bit packer into a growable byte buffer.
#[derive(Debug, Clone, Default)]
pub struct BitOutput {
    bytes: Vec<u8>,
    buffer: u64,
    bits: u8,
}

impl BitOutput {
    /// Create an empty bit packer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` low bits of `value` (count <= 32).
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let masked = (value as u64) & ((1u64 << count) - 1);
        self.buffer |= masked << self.bits;
        self.bits += count;
        while self.bits >= 8 {
            self.bytes.push(self.buffer as u8);
            self.buffer >>= 8;
            self.bits -= 8;
        }
    }

    /// Pad with zero bits to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.bits > 0 {
            self.bytes.push(self.buffer as u8);
            self.buffer = 0;
            self.bits = 0;
        }
    }

    /// Append raw bytes. The stream must be byte-aligned.
    pub fn write_bytes(&mut self, data: &[u8]) {
        debug_assert_eq!(self.bits, 0, "write_bytes requires alignment");
        self.bytes.extend_from_slice(data);
    }

    /// Number of complete bytes ready to be taken.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if no complete bytes are pending.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bits waiting for a byte boundary.
    pub fn pending_bits(&self) -> u8 {
        self.bits
    }

    /// Take the complete bytes written so far; partial bits stay buffered.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }

    /// Move up to `out.len()` complete bytes into `out`.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes.len());
        out[..n].copy_from_slice(&self.bytes[..n]);
        self.bytes.drain(..n);
        n
    }
}
