//! DEFLATE compression.
//!
//! [`Deflater`] accepts input in any number of pieces and writes into
//! caller-provided output slices. Tokens from the LZ77 stage are collected
//! into blocks of up to 64 KiB of input; each block is emitted as whichever
//! of stored, fixed-Huffman or dynamic-Huffman encoding is smallest.

use crate::huffman::{
    CODELEN_ALPHABET_SIZE, DISTANCE_ALPHABET_SIZE, END_OF_BLOCK, LITLEN_ALPHABET_SIZE,
    MAX_CODE_LENGTH, MAX_CODELEN_CODE_LENGTH, build_lengths, canonical_codes,
};
use crate::lz77::{Lz77Encoder, Lz77Token};
use crate::tables::{
    CODE_LENGTH_ORDER, distance_to_code, fixed_distance_lengths, fixed_litlen_lengths,
    length_to_code,
};
use oxizip_core::bitstream::BitOutput;
use oxizip_core::error::Result;
use oxizip_core::traits::{CompressStatus, Compressor, FlushMode};

/// Input bytes per block.
const BLOCK_BYTES: usize = 65536;

/// Token count that also closes a block.
const BLOCK_TOKENS: usize = 32768;

/// Largest stored block payload.
const STORED_MAX: usize = 65535;

/// A code-length symbol with its repeat argument.
#[derive(Debug, Clone, Copy)]
struct CodeLengthOp {
    symbol: u8,
    extra_bits: u8,
    extra: u8,
}

/// Run-length encode literal/length and distance code lengths (RFC 1951 3.2.7).
fn encode_code_lengths(lengths: &[u8]) -> Vec<CodeLengthOp> {
    let op = |symbol, extra_bits, extra| CodeLengthOp {
        symbol,
        extra_bits,
        extra,
    };
    let mut ops = Vec::new();
    let mut i = 0;
    while i < lengths.len() {
        let value = lengths[i];
        let run = lengths[i..].iter().take_while(|&&l| l == value).count();
        let mut left = run;
        if value == 0 {
            while left >= 11 {
                let n = left.min(138);
                ops.push(op(18, 7, (n - 11) as u8));
                left -= n;
            }
            if left >= 3 {
                ops.push(op(17, 3, (left - 3) as u8));
                left = 0;
            }
        } else {
            ops.push(op(value, 0, 0));
            left -= 1;
            while left >= 3 {
                let n = left.min(6);
                ops.push(op(16, 2, (n - 3) as u8));
                left -= n;
            }
        }
        for _ in 0..left {
            ops.push(op(value, 0, 0));
        }
        i += run;
    }
    ops
}

/// Everything needed to emit one dynamic block.
struct DynamicPlan {
    litlen_lengths: Vec<u8>,
    distance_lengths: Vec<u8>,
    codelen_lengths: Vec<u8>,
    ops: Vec<CodeLengthOp>,
    hlit: usize,
    hdist: usize,
    hclen: usize,
}

impl DynamicPlan {
    fn new(litlen_freq: &[u32], distance_freq: &[u32]) -> Self {
        let litlen_lengths = build_lengths(litlen_freq, MAX_CODE_LENGTH as u8);
        let distance_lengths = build_lengths(distance_freq, MAX_CODE_LENGTH as u8);

        let hlit = litlen_lengths
            .iter()
            .rposition(|&l| l > 0)
            .map_or(257, |last| (last + 1).max(257));
        let hdist = distance_lengths
            .iter()
            .rposition(|&l| l > 0)
            .map_or(1, |last| last + 1);

        let mut combined = Vec::with_capacity(hlit + hdist);
        combined.extend_from_slice(&litlen_lengths[..hlit]);
        combined.extend_from_slice(&distance_lengths[..hdist]);
        let ops = encode_code_lengths(&combined);

        let mut codelen_freq = [0u32; CODELEN_ALPHABET_SIZE];
        for op in &ops {
            codelen_freq[op.symbol as usize] += 1;
        }
        let codelen_lengths = build_lengths(&codelen_freq, MAX_CODELEN_CODE_LENGTH as u8);
        let hclen = CODE_LENGTH_ORDER
            .iter()
            .rposition(|&symbol| codelen_lengths[symbol] > 0)
            .map_or(4, |last| (last + 1).max(4));

        Self {
            litlen_lengths,
            distance_lengths,
            codelen_lengths,
            ops,
            hlit,
            hdist,
            hclen,
        }
    }

    /// Header size in bits, excluding the 3-bit block header.
    fn header_bits(&self) -> u64 {
        let ops: u64 = self
            .ops
            .iter()
            .map(|op| (self.codelen_lengths[op.symbol as usize] + op.extra_bits) as u64)
            .sum();
        14 + 3 * self.hclen as u64 + ops
    }
}

/// Bits needed to encode `tokens` plus end-of-block with the given lengths.
fn data_bits(tokens: &[Lz77Token], litlen: &[u8], distance: &[u8]) -> u64 {
    let mut bits = litlen[END_OF_BLOCK as usize] as u64;
    for token in tokens {
        bits += match *token {
            Lz77Token::Literal(byte) => litlen[byte as usize] as u64,
            Lz77Token::Match { length, distance: dist } => {
                let (symbol, length_extra, _) = length_to_code(length as usize);
                let (code, distance_extra, _) = distance_to_code(dist as usize);
                (litlen[symbol as usize] + length_extra + distance[code as usize] + distance_extra)
                    as u64
            }
        };
    }
    bits
}

/// Streaming DEFLATE compressor.
#[derive(Debug)]
pub struct Deflater {
    level: u8,
    lz77: Lz77Encoder,
    tokens: Vec<Lz77Token>,
    /// Input accepted but not yet emitted in a block.
    raw: Vec<u8>,
    /// Leading bytes of `raw` covered by `tokens`.
    covered: usize,
    out: BitOutput,
    finished: bool,
    total_in: u64,
    total_out: u64,
}

impl Deflater {
    /// Create a compressor for `level` (0 = store, 9 = best).
    pub fn new(level: u8) -> Self {
        let level = level.min(9);
        Self {
            level,
            lz77: Lz77Encoder::new(level.max(1)),
            tokens: Vec::new(),
            raw: Vec::new(),
            covered: 0,
            out: BitOutput::new(),
            finished: false,
            total_in: 0,
            total_out: 0,
        }
    }

    /// Compression level.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Uncompressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    fn write_stored(&mut self, len: usize, final_block: bool) {
        let chunks: Vec<(usize, usize)> = if len == 0 {
            vec![(0, 0)]
        } else {
            (0..len)
                .step_by(STORED_MAX)
                .map(|start| (start, (start + STORED_MAX).min(len)))
                .collect()
        };
        let last = chunks.len() - 1;
        for (i, (start, end)) in chunks.into_iter().enumerate() {
            self.out.write_bits(u32::from(final_block && i == last), 1);
            self.out.write_bits(0, 2);
            self.out.align_to_byte();
            let size = (end - start) as u32;
            self.out.write_bits(size, 16);
            self.out.write_bits(!size & 0xFFFF, 16);
            self.out.write_bytes(&self.raw[start..end]);
        }
    }

    fn stored_bits(&self, len: usize) -> u64 {
        let chunks = len.div_ceil(STORED_MAX).max(1) as u64;
        let first_pad = (8 - (self.out.pending_bits() as u64 + 3) % 8) % 8;
        chunks * (3 + 32) + first_pad + (chunks - 1) * 5 + 8 * len as u64
    }

    fn write_tokens(&mut self, litlen: &[(u16, u8)], distance: &[(u16, u8)]) {
        for token in &self.tokens {
            match *token {
                Lz77Token::Literal(byte) => {
                    let (code, len) = litlen[byte as usize];
                    self.out.write_bits(code as u32, len);
                }
                Lz77Token::Match { length, distance: dist } => {
                    let (symbol, length_extra, length_value) = length_to_code(length as usize);
                    let (code, len) = litlen[symbol as usize];
                    self.out.write_bits(code as u32, len);
                    self.out.write_bits(length_value as u32, length_extra);

                    let (dcode, distance_extra, distance_value) = distance_to_code(dist as usize);
                    let (code, len) = distance[dcode as usize];
                    self.out.write_bits(code as u32, len);
                    self.out.write_bits(distance_value as u32, distance_extra);
                }
            }
        }
        let (code, len) = litlen[END_OF_BLOCK as usize];
        self.out.write_bits(code as u32, len);
    }

    /// Emit the tokens gathered so far as one block (or stored run).
    fn emit_block(&mut self, final_block: bool) {
        let len = self.covered;
        if self.level == 0 {
            self.write_stored(len, final_block);
            self.finish_block(len);
            return;
        }

        let mut litlen_freq = [0u32; LITLEN_ALPHABET_SIZE];
        let mut distance_freq = [0u32; DISTANCE_ALPHABET_SIZE];
        litlen_freq[END_OF_BLOCK as usize] = 1;
        for token in &self.tokens {
            match *token {
                Lz77Token::Literal(byte) => litlen_freq[byte as usize] += 1,
                Lz77Token::Match { length, distance } => {
                    litlen_freq[length_to_code(length as usize).0 as usize] += 1;
                    distance_freq[distance_to_code(distance as usize).0 as usize] += 1;
                }
            }
        }

        let plan = DynamicPlan::new(&litlen_freq, &distance_freq);
        let fixed_litlen = fixed_litlen_lengths();
        let fixed_distance = fixed_distance_lengths();

        let dynamic_cost = 3
            + plan.header_bits()
            + data_bits(&self.tokens, &plan.litlen_lengths, &plan.distance_lengths);
        let fixed_cost = 3 + data_bits(&self.tokens, &fixed_litlen, &fixed_distance);
        let stored_cost = self.stored_bits(len);

        if stored_cost <= fixed_cost.min(dynamic_cost) {
            self.write_stored(len, final_block);
        } else if fixed_cost <= dynamic_cost {
            self.out.write_bits(u32::from(final_block), 1);
            self.out.write_bits(1, 2);
            let litlen = canonical_codes(&fixed_litlen);
            let distance = canonical_codes(&fixed_distance);
            self.write_tokens(&litlen, &distance);
        } else {
            self.out.write_bits(u32::from(final_block), 1);
            self.out.write_bits(2, 2);
            self.out.write_bits((plan.hlit - 257) as u32, 5);
            self.out.write_bits((plan.hdist - 1) as u32, 5);
            self.out.write_bits((plan.hclen - 4) as u32, 4);
            for &symbol in CODE_LENGTH_ORDER.iter().take(plan.hclen) {
                self.out.write_bits(plan.codelen_lengths[symbol] as u32, 3);
            }
            let codelen = canonical_codes(&plan.codelen_lengths);
            for op in &plan.ops {
                let (code, len) = codelen[op.symbol as usize];
                self.out.write_bits(code as u32, len);
                self.out.write_bits(op.extra as u32, op.extra_bits);
            }
            let litlen = canonical_codes(&plan.litlen_lengths);
            let distance = canonical_codes(&plan.distance_lengths);
            self.write_tokens(&litlen, &distance);
        }
        self.finish_block(len);
    }

    fn finish_block(&mut self, len: usize) {
        self.raw.drain(..len);
        self.covered = 0;
        self.tokens.clear();
    }

    fn block_full(&self) -> bool {
        self.covered >= BLOCK_BYTES || self.tokens.len() >= BLOCK_TOKENS
    }

    /// Move finished bytes into `output`.
    fn drain(&mut self, output: &mut [u8]) -> usize {
        let n = self.out.drain_into(output);
        self.total_out += n as u64;
        n
    }

    /// Accept some input. Returns the number of bytes taken.
    fn accept(&mut self, input: &[u8]) -> usize {
        if self.level == 0 {
            let n = input.len().min(STORED_MAX - self.covered);
            self.raw.extend_from_slice(&input[..n]);
            self.covered += n;
            if self.covered == STORED_MAX {
                self.emit_block(false);
            }
            return n;
        }
        let n = self.lz77.push(input);
        self.raw.extend_from_slice(&input[..n]);
        self.covered += self.lz77.tokenize(false, &mut self.tokens);
        if self.block_full() {
            self.emit_block(false);
        }
        n
    }

    /// Tokenize everything still buffered.
    fn drain_lookahead(&mut self) {
        if self.level > 0 {
            self.covered += self.lz77.tokenize(true, &mut self.tokens);
        }
    }
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Compressor for Deflater {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        let mut written = self.drain(output);
        let mut consumed = 0;

        if !self.finished {
            while consumed < input.len() && self.out.is_empty() {
                consumed += self.accept(&input[consumed..]);
                written += self.drain(&mut output[written..]);
            }

            if consumed == input.len() && self.out.is_empty() {
                match flush {
                    FlushMode::None => {}
                    FlushMode::Sync => {
                        self.drain_lookahead();
                        if self.covered > 0 {
                            self.emit_block(false);
                        }
                        // Empty stored block byte-aligns the stream
                        self.out.write_bits(0, 3);
                        self.out.align_to_byte();
                        self.out.write_bits(0x0000, 16);
                        self.out.write_bits(0xFFFF, 16);
                    }
                    FlushMode::Finish => {
                        self.drain_lookahead();
                        self.emit_block(true);
                        self.out.align_to_byte();
                        self.finished = true;
                    }
                }
                written += self.drain(&mut output[written..]);
            }
        }
        self.total_in += consumed as u64;

        let status = if !self.out.is_empty() {
            CompressStatus::NeedsOutput
        } else if self.finished {
            CompressStatus::Done
        } else {
            CompressStatus::NeedsInput
        };
        Ok((consumed, written, status))
    }

    fn reset(&mut self) {
        *self = Self::new(self.level);
    }

    fn is_finished(&self) -> bool {
        self.finished && self.out.is_empty()
    }
}

/// Compress a complete buffer at `level`.
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    Deflater::new(level).compress_all(data)
}
