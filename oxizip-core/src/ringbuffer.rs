//! Sliding history window for LZ77 back-references.
//!
//! The window remembers the last `capacity` bytes produced by a decoder.
//! Copies are resumable: [`Window::copy_match`] writes at most as many bytes
//! as the caller's output slice can hold and reports how many it wrote, so a
//! long match can be split across output buffers.

use crate::error::{OxiZipError, Result};

/// DEFLATE history size (32 KiB).
pub const DEFLATE_WINDOW: usize = 32768;

/// Circular history buffer with a power-of-two capacity.
#[derive(Debug, Clone)]
pub struct Window {
    buffer: Vec<u8>,
    /// Next write index.
    position: usize,
    /// Bytes of valid history (saturates at capacity).
    filled: usize,
    mask: usize,
}

impl Window {
    /// Create a window with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is not a non-zero power of 2.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "Capacity must be a power of 2, got {}",
            capacity
        );
        Self {
            buffer: vec![0; capacity],
            position: 0,
            filled: 0,
            mask: capacity - 1,
        }
    }

    /// Create a 32 KiB DEFLATE window.
    pub fn deflate() -> Self {
        Self::new(DEFLATE_WINDOW)
    }

    /// Window capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of history currently available.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Forget all history.
    pub fn clear(&mut self) {
        self.position = 0;
        self.filled = 0;
    }

    /// Record one produced byte.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.buffer[self.position] = byte;
        self.position = (self.position + 1) & self.mask;
        if self.filled < self.buffer.len() {
            self.filled += 1;
        }
    }

    /// Record a run of produced bytes.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        let cap = self.buffer.len();
        let bytes = if bytes.len() > cap {
            &bytes[bytes.len() - cap..]
        } else {
            bytes
        };
        let first = (cap - self.position).min(bytes.len());
        self.buffer[self.position..self.position + first].copy_from_slice(&bytes[..first]);
        let rest = bytes.len() - first;
        self.buffer[..rest].copy_from_slice(&bytes[first..]);
        self.position = (self.position + bytes.len()) & self.mask;
        self.filled = (self.filled + bytes.len()).min(cap);
    }

    /// Copy up to `length` bytes from `distance` back into `out`, recording
    /// them as new history.
    ///
    /// Overlapping copies (length > distance) repeat the pattern, as LZ77
    /// requires. Returns the number of bytes written, which is less than
    /// `length` only when `out` is full.
    pub fn copy_match(&mut self, distance: usize, length: usize, out: &mut [u8]) -> Result<usize> {
        if distance == 0 || distance > self.filled {
            return Err(OxiZipError::invalid_distance(distance, self.filled));
        }
        let count = length.min(out.len());
        let mut src = self.position.wrapping_sub(distance) & self.mask;
        for slot in out.iter_mut().take(count) {
            let byte = self.buffer[src];
            *slot = byte;
            self.buffer[self.position] = byte;
            self.position = (self.position + 1) & self.mask;
            src = (src + 1) & self.mask;
        }
        self.filled = (self.filled + count).min(self.buffer.len());
        Ok(count)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::deflate()
    }
}
