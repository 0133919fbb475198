//! Huffman coding for DEFLATE.
//!
//! DEFLATE transmits canonical codes as bit lengths only (RFC 1951 3.2.2).
//! This module builds decode tables from those lengths, decodes symbols from
//! whatever bits are currently buffered (reporting "incomplete" instead of
//! blocking), and on the encoder side derives length-limited code lengths
//! from symbol frequencies.
//!
//! # Alphabets
//!
//! - **Literal/Length**: 0-285 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-29
//! - **Code Length**: 0-18 (for transmitting dynamic trees)

use oxizip_core::error::{OxiZipError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Maximum code length for the code-length alphabet.
pub const MAX_CODELEN_CODE_LENGTH: usize = 7;

/// Size of the literal/length alphabet that may carry codes (0-285).
pub const LITLEN_ALPHABET_SIZE: usize = 286;

/// Size of the distance alphabet (0-29).
pub const DISTANCE_ALPHABET_SIZE: usize = 30;

/// Size of the code length alphabet (0-18).
pub const CODELEN_ALPHABET_SIZE: usize = 19;

/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;

/// Result of decoding against the currently buffered bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A complete code: (symbol, code length in bits).
    Symbol(u16, u8),
    /// The buffered bits are a valid prefix; more input is needed.
    Incomplete,
    /// No code matches these bits.
    Invalid,
}

/// A canonical Huffman decoding table.
///
/// Codes up to [`HuffmanTree::FAST_BITS`] bits resolve with one table
/// lookup; longer codes walk the canonical code space one bit at a time.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    /// Indexed by the next `fast_bits` input bits: (symbol, length), length 0 = slow path.
    fast_table: Vec<(u16, u8)>,
    fast_bits: u8,
    max_code_length: u8,
    /// Number of codes of each length.
    counts: [u16; MAX_CODE_LENGTH + 1],
    /// Symbols sorted by (length, symbol).
    symbols: Vec<u16>,
    /// Unused code space left after assignment (0 = complete).
    left: i32,
}

impl HuffmanTree {
    /// Number of bits for fast lookup table.
    pub const FAST_BITS: u8 = 9;

    /// Build a decoding table from code lengths.
    ///
    /// `code_lengths[i]` is the bit length of symbol `i`; 0 means unused.
    /// Over-subscribed length sets are rejected. Incomplete sets are
    /// accepted here; callers decide via [`HuffmanTree::is_complete`].
    pub fn from_code_lengths(code_lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in code_lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(OxiZipError::invalid_header(format!(
                    "Code length {} exceeds maximum {}",
                    len, MAX_CODE_LENGTH
                )));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        // Check the Kraft sum one length at a time
        let mut left: i32 = 1;
        for &count in counts.iter().skip(1) {
            left <<= 1;
            left -= count as i32;
            if left < 0 {
                return Err(OxiZipError::invalid_header("Over-subscribed Huffman code"));
            }
        }

        let max_code_length = (1..=MAX_CODE_LENGTH)
            .rev()
            .find(|&len| counts[len] > 0)
            .unwrap_or(0) as u8;

        let mut offsets = [0u16; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; offsets[MAX_CODE_LENGTH + 1] as usize];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len > 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        let fast_bits = Self::FAST_BITS;
        let mut fast_table = vec![(0u16, 0u8); 1 << fast_bits];
        let mut next_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            code = (code + counts[len - 1] as u32) << 1;
            next_code[len] = code;
        }
        // counts[0] was zeroed, so next_code[1] == 0
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let assigned = next_code[len as usize];
            next_code[len as usize] += 1;
            if len > fast_bits {
                continue;
            }
            let reversed = reverse_bits(assigned, len) as usize;
            let step = 1usize << len;
            let mut index = reversed;
            while index < fast_table.len() {
                fast_table[index] = (symbol as u16, len);
                index += step;
            }
        }

        Ok(Self {
            fast_table,
            fast_bits,
            max_code_length,
            counts,
            symbols,
            left,
        })
    }

    /// True when the lengths use the whole code space.
    pub fn is_complete(&self) -> bool {
        self.left == 0
    }

    /// Number of symbols with a code.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Longest code length present.
    pub fn max_code_length(&self) -> u8 {
        self.max_code_length
    }

    /// Decode one symbol from `bits` (LSB = next bit), of which `available` are valid.
    #[inline]
    pub fn decode(&self, bits: u32, available: u8) -> Decoded {
        if self.max_code_length == 0 {
            return Decoded::Invalid;
        }
        let (symbol, len) = self.fast_table[(bits & ((1 << self.fast_bits) - 1)) as usize];
        if len > 0 {
            return if len <= available {
                Decoded::Symbol(symbol, len)
            } else {
                Decoded::Incomplete
            };
        }
        self.decode_slow(bits, available)
    }

    /// Bit-at-a-time canonical decode.
    fn decode_slow(&self, bits: u32, available: u8) -> Decoded {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=self.max_code_length {
            if len > available {
                return Decoded::Incomplete;
            }
            code |= ((bits >> (len - 1)) & 1) as i32;
            let count = self.counts[len as usize] as i32;
            if code - first < count {
                return Decoded::Symbol(self.symbols[(index + code - first) as usize], len);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Decoded::Invalid
    }
}

/// Reverse the low `length` bits of `code`.
#[inline]
pub fn reverse_bits(code: u32, length: u8) -> u32 {
    if length == 0 {
        return 0;
    }
    code.reverse_bits() >> (32 - length as u32)
}

/// Canonical codes for encoding, bit-reversed for LSB-first output.
///
/// Returns `(code, length)` per symbol; unused symbols get `(0, 0)`.
pub fn canonical_codes(lengths: &[u8]) -> Vec<(u16, u8)> {
    let mut bl_count = [0u32; MAX_CODE_LENGTH + 1];
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
        }
    }
    let mut next_code = [0u32; MAX_CODE_LENGTH + 1];
    let mut code = 0u32;
    for bits in 1..=MAX_CODE_LENGTH {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return (0, 0);
            }
            let assigned = next_code[len as usize];
            next_code[len as usize] += 1;
            (reverse_bits(assigned, len) as u16, len)
        })
        .collect()
}

/// Build length-limited Huffman code lengths from symbol frequencies.
///
/// Classic heap construction: repeatedly merge the two lightest nodes, then
/// read leaf depths. Depths over `max_length` are clamped and the Kraft sum
/// is repaired by lengthening the shortest affordable codes, then any slack
/// is returned by shortening the longest ones, so the result is always a
/// complete prefix code. At least two symbols always receive a code, which
/// keeps single-symbol blocks decodable by strict inflaters.
pub fn build_lengths(frequencies: &[u32], max_length: u8) -> Vec<u8> {
    let n = frequencies.len();
    let mut lengths = vec![0u8; n];

    let used: Vec<usize> = (0..n).filter(|&i| frequencies[i] > 0).collect();
    match used.len() {
        0 => {
            if n >= 2 {
                lengths[0] = 1;
                lengths[1] = 1;
            }
            return lengths;
        }
        1 => {
            let only = used[0];
            let partner = if only == 0 { 1 } else { 0 };
            lengths[only] = 1;
            if partner < n {
                lengths[partner] = 1;
            }
            return lengths;
        }
        _ => {}
    }

    // Nodes 0..used.len() are leaves; internal nodes are appended
    let leaves = used.len();
    let mut parent: Vec<usize> = vec![usize::MAX; leaves * 2 - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = used
        .iter()
        .enumerate()
        .map(|(node, &symbol)| Reverse((frequencies[symbol] as u64, node)))
        .collect();
    let mut next_node = leaves;
    while heap.len() > 1 {
        let Some(Reverse((w1, a))) = heap.pop() else {
            break;
        };
        let Some(Reverse((w2, b))) = heap.pop() else {
            break;
        };
        parent[a] = next_node;
        parent[b] = next_node;
        heap.push(Reverse((w1 + w2, next_node)));
        next_node += 1;
    }

    // Parents are always created after children, so walk from the root down
    let mut depth = vec![0u32; next_node];
    for node in (0..next_node.saturating_sub(1)).rev() {
        depth[node] = depth[parent[node]] + 1;
    }

    let limit = max_length as u32;
    let mut leaf_lengths: Vec<u32> = (0..leaves).map(|leaf| depth[leaf].min(limit)).collect();

    let capacity: u64 = 1 << limit;
    let kraft = |lens: &[u32]| -> u64 { lens.iter().map(|&l| 1u64 << (limit - l)).sum() };
    let mut sum = kraft(&leaf_lengths);

    if sum > capacity {
        while sum > capacity {
            // Lengthen the rarest leaf among the longest codes that can still grow
            let pick = (0..leaves)
                .filter(|&leaf| leaf_lengths[leaf] < limit)
                .max_by_key(|&leaf| (leaf_lengths[leaf], Reverse(frequencies[used[leaf]])));
            let Some(leaf) = pick else {
                break;
            };
            sum -= 1u64 << (limit - leaf_lengths[leaf] - 1);
            leaf_lengths[leaf] += 1;
        }
        while sum < capacity {
            // Return slack: shorten the most frequent leaf among the longest codes
            let longest = leaf_lengths.iter().copied().max().unwrap_or(1);
            let pick = (0..leaves)
                .filter(|&leaf| leaf_lengths[leaf] == longest && longest > 1)
                .max_by_key(|&leaf| frequencies[used[leaf]]);
            let Some(leaf) = pick else {
                break;
            };
            let gain = 1u64 << (limit - leaf_lengths[leaf]);
            if sum + gain > capacity {
                break;
            }
            sum += gain;
            leaf_lengths[leaf] -= 1;
        }
    }

    for (leaf, &len) in leaf_lengths.iter().enumerate() {
        lengths[used[leaf]] = len as u8;
    }
    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8], limit: u8) -> u64 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u64 << (limit - l))
            .sum()
    }

    #[test]
    fn test_decode_simple() {
        // A=0, B=10, C=11 -> LSB-first A=0, B=01, C=11
        let tree = HuffmanTree::from_code_lengths(&[1, 2, 2]).unwrap();
        assert!(tree.is_complete());
        // bits (LSB first): 0 | 1 0 | 1 1 | 0
        let bits = 0b0_11_01_0u32;
        assert_eq!(tree.decode(bits, 6), Decoded::Symbol(0, 1));
        assert_eq!(tree.decode(bits >> 1, 5), Decoded::Symbol(1, 2));
        assert_eq!(tree.decode(bits >> 3, 3), Decoded::Symbol(2, 2));
    }

    #[test]
    fn test_decode_incomplete_bits() {
        let tree = HuffmanTree::from_code_lengths(&[1, 2, 2]).unwrap();
        // B needs two bits but only one is buffered
        assert_eq!(tree.decode(0b1, 1), Decoded::Incomplete);
        assert_eq!(tree.decode(0b0, 0), Decoded::Incomplete);
    }

    #[test]
    fn test_long_codes_use_slow_path() {
        // Lengths 1..=14 plus two of 15: complete code with codes longer than FAST_BITS
        let mut lengths: Vec<u8> = (1..=15).collect();
        lengths.push(15);
        let tree = HuffmanTree::from_code_lengths(&lengths).unwrap();
        assert!(tree.is_complete());
        let codes = canonical_codes(&lengths);
        for (symbol, &(code, len)) in codes.iter().enumerate() {
            assert_eq!(
                tree.decode(code as u32, len),
                Decoded::Symbol(symbol as u16, len),
                "symbol {}",
                symbol
            );
        }
    }

    #[test]
    fn test_oversubscribed_rejected() {
        assert!(HuffmanTree::from_code_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn test_incomplete_detected() {
        let tree = HuffmanTree::from_code_lengths(&[1, 0, 0]).unwrap();
        assert!(!tree.is_complete());
        assert_eq!(tree.decode(0b1, 1), Decoded::Invalid);
    }

    #[test]
    fn test_empty_tree_is_invalid() {
        let tree = HuffmanTree::from_code_lengths(&[0, 0, 0, 0]).unwrap();
        assert_eq!(tree.decode(0, 15), Decoded::Invalid);
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b101, 3), 0b101);
        assert_eq!(reverse_bits(0b1100, 4), 0b0011);
        assert_eq!(reverse_bits(0b10101010, 8), 0b01010101);
    }

    #[test]
    fn test_build_lengths_prefers_frequent_symbols() {
        let lengths = build_lengths(&[100, 50, 25, 25], 15);
        assert!(lengths[0] <= lengths[1]);
        assert!(lengths[1] <= lengths[2]);
        assert_eq!(kraft_sum(&lengths, 15), 1 << 15);
    }

    #[test]
    fn test_build_lengths_respects_limit() {
        // Fibonacci weights force a degenerate, very deep tree
        let mut freqs = vec![1u32, 1];
        while freqs.len() < 30 {
            let n = freqs.len();
            freqs.push(freqs[n - 1] + freqs[n - 2]);
        }
        for limit in [7u8, 15] {
            let lengths = build_lengths(&freqs, limit);
            assert!(lengths.iter().all(|&l| l >= 1 && l <= limit));
            assert_eq!(kraft_sum(&lengths, limit), 1 << limit);
            assert!(HuffmanTree::from_code_lengths(&lengths).unwrap().is_complete());
        }
    }

    #[test]
    fn test_build_lengths_single_symbol_gets_partner() {
        let mut freqs = vec![0u32; 30];
        freqs[5] = 10;
        let lengths = build_lengths(&freqs, 15);
        assert_eq!(lengths[5], 1);
        assert_eq!(lengths[0], 1);
        assert!(HuffmanTree::from_code_lengths(&lengths).unwrap().is_complete());
    }
}
