//! Static DEFLATE tables (RFC 1951 section 3.2.5 and 3.2.6).

use crate::huffman::HuffmanTree;
use oxizip_core::error::{OxiZipError, Result};
use std::sync::OnceLock;

/// Shortest match DEFLATE can express.
pub const MIN_MATCH: usize = 3;

/// Longest match DEFLATE can express.
pub const MAX_MATCH: usize = 258;

/// Farthest back-reference distance.
pub const MAX_DISTANCE: usize = 32768;

/// Base lengths for symbols 257-285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for symbols 257-285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distances for distance codes 0-29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of code-length code lengths in a dynamic header.
pub const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Length (3..=258) to length-code index (0..29), built at compile time.
static LENGTH_CODE: [u8; MAX_MATCH + 1] = {
    let mut table = [0u8; MAX_MATCH + 1];
    let mut code = 0;
    while code < 29 {
        let start = LENGTH_BASE[code] as usize;
        let end = if code == 28 {
            MAX_MATCH + 1
        } else {
            LENGTH_BASE[code + 1] as usize
        };
        let mut len = start;
        while len < end {
            table[len] = code as u8;
            len += 1;
        }
        code += 1;
    }
    // 258 has its own code even though 227 + 31 also reaches it
    table[MAX_MATCH] = 28;
    table
};

/// Map a match length (3..=258) to `(symbol, extra_bits, extra_value)`.
#[inline]
pub fn length_to_code(length: usize) -> (u16, u8, u16) {
    debug_assert!((MIN_MATCH..=MAX_MATCH).contains(&length));
    let index = LENGTH_CODE[length] as usize;
    (
        257 + index as u16,
        LENGTH_EXTRA_BITS[index],
        (length - LENGTH_BASE[index] as usize) as u16,
    )
}

/// Map a distance (1..=32768) to `(code, extra_bits, extra_value)`.
#[inline]
pub fn distance_to_code(distance: usize) -> (u16, u8, u16) {
    debug_assert!((1..=MAX_DISTANCE).contains(&distance));
    // Codes come in pairs per power of two once past the first four
    let index = if distance <= 4 {
        distance - 1
    } else {
        let d = distance - 1;
        let high = usize::BITS - 1 - d.leading_zeros();
        let second = (d >> (high - 1)) & 1;
        (2 * high as usize) + second
    };
    (
        index as u16,
        DISTANCE_EXTRA_BITS[index],
        (distance - DISTANCE_BASE[index] as usize) as u16,
    )
}

/// Fixed literal/length code lengths.
pub fn fixed_litlen_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths
}

/// Fixed distance code lengths: thirty 5-bit codes.
pub fn fixed_distance_lengths() -> [u8; 30] {
    [5u8; 30]
}

/// Decoding tables for fixed-Huffman blocks, built once.
pub fn fixed_trees() -> Result<&'static (HuffmanTree, HuffmanTree)> {
    static TREES: OnceLock<Option<(HuffmanTree, HuffmanTree)>> = OnceLock::new();
    TREES
        .get_or_init(|| {
            let litlen = HuffmanTree::from_code_lengths(&fixed_litlen_lengths()).ok()?;
            let distance = HuffmanTree::from_code_lengths(&fixed_distance_lengths()).ok()?;
            Some((litlen, distance))
        })
        .as_ref()
        .ok_or_else(|| OxiZipError::invalid_header("Fixed Huffman tables failed to build"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_codes() {
        assert_eq!(length_to_code(3), (257, 0, 0));
        assert_eq!(length_to_code(10), (264, 0, 0));
        assert_eq!(length_to_code(11), (265, 1, 0));
        assert_eq!(length_to_code(12), (265, 1, 1));
        assert_eq!(length_to_code(227), (284, 5, 0));
        assert_eq!(length_to_code(257), (284, 5, 30));
        assert_eq!(length_to_code(258), (285, 0, 0));
    }

    #[test]
    fn test_distance_codes() {
        assert_eq!(distance_to_code(1), (0, 0, 0));
        assert_eq!(distance_to_code(4), (3, 0, 0));
        assert_eq!(distance_to_code(5), (4, 1, 0));
        assert_eq!(distance_to_code(6), (4, 1, 1));
        assert_eq!(distance_to_code(7), (5, 1, 0));
        assert_eq!(distance_to_code(24577), (29, 13, 0));
        assert_eq!(distance_to_code(32768), (29, 13, 8191));
    }

    #[test]
    fn test_every_length_and_distance_inverts() {
        for length in MIN_MATCH..=MAX_MATCH {
            let (symbol, extra, value) = length_to_code(length);
            let index = (symbol - 257) as usize;
            assert!(value < (1 << extra) || extra == 0 && value == 0);
            assert_eq!(LENGTH_BASE[index] as usize + value as usize, length);
        }
        for distance in 1..=MAX_DISTANCE {
            let (code, extra, value) = distance_to_code(distance);
            assert!(extra == 0 && value == 0 || value < (1 << extra));
            assert_eq!(DISTANCE_BASE[code as usize] as usize + value as usize, distance);
        }
    }

    #[test]
    fn test_fixed_trees_build() {
        let (litlen, distance) = fixed_trees().unwrap();
        assert!(litlen.is_complete());
        // 30 of 32 five-bit codes are assigned
        assert!(!distance.is_complete());
        assert_eq!(distance.symbol_count(), 30);
    }
}
