//! DEFLATE decompression (inflate).
//!
//! [`Inflater`] is an explicit state machine: all progress lives in the
//! struct, so decoding may stop whenever the current input chunk is used up
//! or the output slice is full, and resume on the next call with the same
//! result as a single-shot decode. Stored, fixed-Huffman and dynamic-Huffman
//! blocks are supported.

use crate::huffman::{Decoded, END_OF_BLOCK, HuffmanTree};
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, LENGTH_BASE, LENGTH_EXTRA_BITS,
    fixed_trees,
};
use oxizip_core::bitstream::BitInput;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::ringbuffer::Window;
use oxizip_core::traits::{DecompressStatus, Decompressor};

/// Bits a single length/distance pair can need: 15 + 5 + 15 + 13.
const REFILL_BITS: u8 = 56;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting the 3-bit block header.
    BlockHeader,
    /// Expecting LEN/NLEN of a stored block.
    StoredLength,
    /// Copying raw bytes of a stored block.
    Stored { remaining: usize },
    /// Expecting HLIT/HDIST/HCLEN.
    DynamicCounts,
    /// Reading 3-bit code-length code lengths.
    CodeLengthCodes { index: usize },
    /// Reading literal/length and distance code lengths.
    CodeLengths,
    /// Decoding literal/length symbols.
    Symbols,
    /// Emitting a back-reference.
    Copy { length: usize, distance: usize },
    /// Final block finished.
    Done,
}

/// Huffman tables for the block in progress.
#[derive(Debug)]
enum Tables {
    None,
    Fixed,
    Dynamic(Box<(HuffmanTree, HuffmanTree)>),
}

impl Tables {
    fn get(&self) -> Result<&(HuffmanTree, HuffmanTree)> {
        match self {
            Tables::Fixed => fixed_trees(),
            Tables::Dynamic(trees) => Ok(trees),
            Tables::None => Err(OxiZipError::corrupted(0, "symbol data before block header")),
        }
    }
}

/// Streaming DEFLATE decompressor.
#[derive(Debug)]
pub struct Inflater {
    state: State,
    bits: BitInput,
    window: Window,
    final_block: bool,
    tables: Tables,
    hlit: usize,
    hdist: usize,
    hclen: usize,
    codelen_lengths: [u8; 19],
    codelen_tree: Option<HuffmanTree>,
    lengths: Vec<u8>,
    total_in: u64,
    total_out: u64,
}

impl Inflater {
    /// Create a new decompressor.
    pub fn new() -> Self {
        Self {
            state: State::BlockHeader,
            bits: BitInput::new(),
            window: Window::deflate(),
            final_block: false,
            tables: Tables::None,
            hlit: 0,
            hdist: 0,
            hclen: 0,
            codelen_lengths: [0; 19],
            codelen_tree: None,
            lengths: Vec::with_capacity(320),
            total_in: 0,
            total_out: 0,
        }
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    fn end_of_block(&mut self) {
        self.state = if self.final_block {
            State::Done
        } else {
            State::BlockHeader
        };
    }

    fn huffman_error(&self) -> OxiZipError {
        OxiZipError::invalid_huffman(self.bits.bit_position())
    }

    /// Build literal/length and distance tables from the collected lengths.
    fn install_dynamic_tables(&mut self) -> Result<()> {
        let (litlen_lengths, distance_lengths) = self.lengths.split_at(self.hlit);
        if litlen_lengths[END_OF_BLOCK as usize] == 0 {
            return Err(OxiZipError::corrupted(
                self.bits.bit_position() / 8,
                "dynamic block has no end-of-block code",
            ));
        }

        let litlen = HuffmanTree::from_code_lengths(litlen_lengths)
            .map_err(|_| self.huffman_error())?;
        let distance = HuffmanTree::from_code_lengths(distance_lengths)
            .map_err(|_| self.huffman_error())?;

        // Only a lone code (or no distance codes at all) may leave space unused
        if !litlen.is_complete() && litlen.symbol_count() != 1 {
            return Err(self.huffman_error());
        }
        if !distance.is_complete() && distance.symbol_count() > 1 {
            return Err(self.huffman_error());
        }

        self.tables = Tables::Dynamic(Box::new((litlen, distance)));
        Ok(())
    }

    /// Decode code lengths for the dynamic tables. Returns `false` on input starvation.
    fn read_code_lengths(&mut self, input: &[u8], pos: &mut usize) -> Result<bool> {
        let total = self.hlit + self.hdist;
        let Some(tree) = self.codelen_tree.as_ref() else {
            return Err(OxiZipError::corrupted(0, "code lengths without code-length table"));
        };
        while self.lengths.len() < total {
            self.bits.fill(REFILL_BITS, input, pos);
            let available = self.bits.available();
            let buffered = self.bits.peek_u64();
            let (symbol, len) = match tree.decode(buffered as u32, available) {
                Decoded::Symbol(symbol, len) => (symbol, len),
                Decoded::Incomplete => return Ok(false),
                Decoded::Invalid => return Err(OxiZipError::invalid_huffman(self.bits.bit_position())),
            };
            let (extra, base) = match symbol {
                0..=15 => (0u8, 1usize),
                16 => (2, 3),
                17 => (3, 3),
                18 => (7, 11),
                _ => return Err(OxiZipError::invalid_huffman(self.bits.bit_position())),
            };
            if len + extra > available {
                return Ok(false);
            }
            let repeat = base + ((buffered >> len) & ((1u64 << extra) - 1)) as usize;
            let position = self.bits.bit_position();
            self.bits.consume(len + extra);

            let value = match symbol {
                0..=15 => symbol as u8,
                16 => match self.lengths.last() {
                    Some(&previous) => previous,
                    None => {
                        return Err(OxiZipError::corrupted(
                            position / 8,
                            "repeat code with no previous length",
                        ));
                    }
                },
                _ => 0,
            };
            if self.lengths.len() + repeat > total {
                return Err(OxiZipError::corrupted(
                    position / 8,
                    "code length repeat overflows table",
                ));
            }
            self.lengths.extend(std::iter::repeat_n(value, repeat));
        }
        Ok(true)
    }

    /// Decode symbols of a Huffman block until the block ends, output fills
    /// or input runs out.
    fn decode_symbols(
        &mut self,
        input: &[u8],
        pos: &mut usize,
        output: &mut [u8],
        written: &mut usize,
    ) -> Result<Option<DecompressStatus>> {
        let Self {
            bits,
            window,
            tables,
            state,
            ..
        } = self;
        let (litlen, distance) = tables.get()?;

        loop {
            bits.fill(REFILL_BITS, input, pos);
            let available = bits.available();
            let buffered = bits.peek_u64();

            let (symbol, len) = match litlen.decode(buffered as u32, available) {
                Decoded::Symbol(symbol, len) => (symbol, len),
                Decoded::Incomplete => return Ok(Some(DecompressStatus::NeedsInput)),
                Decoded::Invalid => return Err(OxiZipError::invalid_huffman(bits.bit_position())),
            };

            if symbol < END_OF_BLOCK {
                if *written == output.len() {
                    return Ok(Some(DecompressStatus::NeedsOutput));
                }
                bits.consume(len);
                output[*written] = symbol as u8;
                window.push(symbol as u8);
                *written += 1;
                continue;
            }
            if symbol == END_OF_BLOCK {
                bits.consume(len);
                return Ok(None);
            }

            let index = (symbol - 257) as usize;
            if index >= LENGTH_BASE.len() {
                return Err(OxiZipError::corrupted(
                    bits.bit_position() / 8,
                    format!("invalid length symbol {}", symbol),
                ));
            }
            let length_extra = LENGTH_EXTRA_BITS[index];
            let mut shift = len + length_extra;
            if shift > available {
                return Ok(Some(DecompressStatus::NeedsInput));
            }
            let length = LENGTH_BASE[index] as usize
                + ((buffered >> len) & ((1u64 << length_extra) - 1)) as usize;

            let (code, code_len) = match distance.decode((buffered >> shift) as u32, available - shift)
            {
                Decoded::Symbol(code, code_len) => (code as usize, code_len),
                Decoded::Incomplete => return Ok(Some(DecompressStatus::NeedsInput)),
                Decoded::Invalid => return Err(OxiZipError::invalid_huffman(bits.bit_position())),
            };
            if code >= DISTANCE_BASE.len() {
                return Err(OxiZipError::corrupted(
                    bits.bit_position() / 8,
                    format!("invalid distance code {}", code),
                ));
            }
            let distance_extra = DISTANCE_EXTRA_BITS[code];
            if shift + code_len + distance_extra > available {
                return Ok(Some(DecompressStatus::NeedsInput));
            }
            shift += code_len;
            let dist = DISTANCE_BASE[code] as usize
                + ((buffered >> shift) & ((1u64 << distance_extra) - 1)) as usize;
            bits.consume(shift + distance_extra);

            *state = State::Copy {
                length,
                distance: dist,
            };
            return Ok(None);
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for Inflater {
    fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, DecompressStatus)> {
        let mut pos = 0;
        let mut written = 0;

        let status = loop {
            match self.state {
                State::BlockHeader => {
                    let Some(header) = self.bits.try_bits(3, input, &mut pos) else {
                        break DecompressStatus::NeedsInput;
                    };
                    self.final_block = header & 1 != 0;
                    self.state = match header >> 1 {
                        0 => State::StoredLength,
                        1 => {
                            self.tables = Tables::Fixed;
                            State::Symbols
                        }
                        2 => State::DynamicCounts,
                        _ => {
                            return Err(OxiZipError::corrupted(
                                self.bits.bit_position() / 8,
                                "invalid block type 3",
                            ));
                        }
                    };
                }
                State::StoredLength => {
                    self.bits.align_to_byte();
                    if !self.bits.need(32, input, &mut pos) {
                        break DecompressStatus::NeedsInput;
                    }
                    let word = self.bits.peek();
                    let len = word & 0xFFFF;
                    let nlen = word >> 16;
                    if len != !nlen & 0xFFFF {
                        return Err(OxiZipError::corrupted(
                            self.bits.bit_position() / 8,
                            format!("stored block length {:#06x} does not match complement {:#06x}", len, nlen),
                        ));
                    }
                    self.bits.consume(32);
                    self.state = State::Stored {
                        remaining: len as usize,
                    };
                }
                State::Stored { remaining } => {
                    if remaining == 0 {
                        self.end_of_block();
                        continue;
                    }
                    if written == output.len() {
                        break DecompressStatus::NeedsOutput;
                    }
                    let room = remaining.min(output.len() - written);
                    let n = if self.bits.available() >= 8 {
                        self.bits
                            .take_aligned_bytes(&mut output[written..written + room])
                    } else {
                        if pos == input.len() {
                            break DecompressStatus::NeedsInput;
                        }
                        let n = room.min(input.len() - pos);
                        output[written..written + n].copy_from_slice(&input[pos..pos + n]);
                        pos += n;
                        n
                    };
                    self.window.push_slice(&output[written..written + n]);
                    written += n;
                    self.state = State::Stored {
                        remaining: remaining - n,
                    };
                }
                State::DynamicCounts => {
                    if !self.bits.need(14, input, &mut pos) {
                        break DecompressStatus::NeedsInput;
                    }
                    let word = self.bits.peek();
                    self.hlit = (word & 0x1F) as usize + 257;
                    self.hdist = ((word >> 5) & 0x1F) as usize + 1;
                    self.hclen = ((word >> 10) & 0x0F) as usize + 4;
                    if self.hlit > 286 || self.hdist > 30 {
                        return Err(OxiZipError::corrupted(
                            self.bits.bit_position() / 8,
                            format!("too many codes: hlit={} hdist={}", self.hlit, self.hdist),
                        ));
                    }
                    self.bits.consume(14);
                    self.codelen_lengths = [0; 19];
                    self.state = State::CodeLengthCodes { index: 0 };
                }
                State::CodeLengthCodes { index } => {
                    let mut next = index;
                    while next < self.hclen {
                        let Some(len) = self.bits.try_bits(3, input, &mut pos) else {
                            break;
                        };
                        self.codelen_lengths[CODE_LENGTH_ORDER[next]] = len as u8;
                        next += 1;
                    }
                    if next < self.hclen {
                        self.state = State::CodeLengthCodes { index: next };
                        break DecompressStatus::NeedsInput;
                    }
                    let tree = HuffmanTree::from_code_lengths(&self.codelen_lengths)
                        .map_err(|_| self.huffman_error())?;
                    if !tree.is_complete() {
                        return Err(self.huffman_error());
                    }
                    self.codelen_tree = Some(tree);
                    self.lengths.clear();
                    self.state = State::CodeLengths;
                }
                State::CodeLengths => {
                    if !self.read_code_lengths(input, &mut pos)? {
                        break DecompressStatus::NeedsInput;
                    }
                    self.install_dynamic_tables()?;
                    self.codelen_tree = None;
                    self.state = State::Symbols;
                }
                State::Symbols => {
                    match self.decode_symbols(input, &mut pos, output, &mut written)? {
                        Some(status) => break status,
                        None => {
                            // Either end of block or a pending copy
                            if self.state == State::Symbols {
                                self.end_of_block();
                            }
                        }
                    }
                }
                State::Copy { length, distance } => {
                    if written == output.len() {
                        break DecompressStatus::NeedsOutput;
                    }
                    let n = self
                        .window
                        .copy_match(distance, length, &mut output[written..])?;
                    written += n;
                    self.state = if n == length {
                        State::Symbols
                    } else {
                        State::Copy {
                            length: length - n,
                            distance,
                        }
                    };
                }
                State::Done => {
                    // Whole bytes pulled past the end belong to the caller
                    let unread = self.bits.release_bytes().min(pos);
                    pos -= unread;
                    break DecompressStatus::Done;
                }
            }
        };

        self.total_in += pos as u64;
        self.total_out += written as u64;
        Ok((pos, written, status))
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn is_finished(&self) -> bool {
        self.state == State::Done
    }
}

/// Decompress a complete DEFLATE stream.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    Inflater::new().decompress_all(data)
}
