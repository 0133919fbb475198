//! LZ77 match finding over a sliding window.
//!
//! Input is pushed in arbitrary pieces into a buffer of twice the DEFLATE
//! window. Positions are hashed on their first three bytes and chained, and
//! the encoder walks the chain for the longest earlier occurrence. Higher
//! levels search longer chains and use lazy matching (defer a match by one
//! byte if the next position matches longer).

use crate::tables::{MAX_DISTANCE, MAX_MATCH, MIN_MATCH};

const WINDOW_SIZE: usize = MAX_DISTANCE;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;
const BUFFER_SIZE: usize = WINDOW_SIZE * 2;
const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const NIL: u32 = u32::MAX;

/// Three-byte matches farther than this rarely pay for themselves.
const TOO_FAR: usize = 4096;

/// Bytes that must follow a position before it is searched (unless flushing).
const LOOKAHEAD: usize = MAX_MATCH + 1;

/// An LZ77 token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference.
    Match {
        /// Match length (3-258).
        length: u16,
        /// Distance back (1-32768).
        distance: u16,
    },
}

impl Lz77Token {
    /// Number of input bytes this token covers.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Lz77Token::Literal(_) => 1,
            Lz77Token::Match { length, .. } => *length as usize,
        }
    }

    /// Always false; tokens cover at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Search parameters for one compression level.
#[derive(Debug, Clone, Copy)]
struct LevelConfig {
    max_chain: usize,
    nice_length: usize,
    lazy: bool,
}

impl LevelConfig {
    fn for_level(level: u8) -> Self {
        let (max_chain, nice_length, lazy) = match level {
            0 | 1 => (4, 8, false),
            2 => (8, 16, false),
            3 => (16, 32, false),
            4 => (16, 16, true),
            5 => (32, 32, true),
            6 => (128, 128, true),
            7 => (256, 128, true),
            8 => (1024, MAX_MATCH, true),
            _ => (4096, MAX_MATCH, true),
        };
        Self {
            max_chain,
            nice_length,
            lazy,
        }
    }
}

/// Incremental LZ77 tokenizer.
#[derive(Debug, Clone)]
pub struct Lz77Encoder {
    config: LevelConfig,
    buffer: Vec<u8>,
    /// Next position to tokenize.
    cursor: usize,
    /// End of valid data in `buffer`.
    end: usize,
    head: Vec<u32>,
    prev: Vec<u32>,
    /// Lazy matching: a match found at `cursor - 1` waiting for comparison.
    pending: Option<(usize, usize)>,
    /// Lazy matching: the byte at `cursor - 1` has not been emitted yet.
    literal_pending: bool,
}

impl Lz77Encoder {
    /// Create an encoder for compression `level` (1-9).
    pub fn new(level: u8) -> Self {
        Self {
            config: LevelConfig::for_level(level),
            buffer: vec![0; BUFFER_SIZE],
            cursor: 0,
            end: 0,
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; WINDOW_SIZE],
            pending: None,
            literal_pending: false,
        }
    }

    /// Forget all input and history.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.end = 0;
        self.head.fill(NIL);
        self.prev.fill(NIL);
        self.pending = None;
        self.literal_pending = false;
    }

    /// Bytes pushed but not yet tokenized.
    pub fn buffered(&self) -> usize {
        self.end - self.cursor + usize::from(self.literal_pending)
    }

    /// Copy as much of `input` as fits. Returns the number of bytes taken.
    pub fn push(&mut self, input: &[u8]) -> usize {
        if self.end == BUFFER_SIZE {
            self.slide();
        }
        let n = input.len().min(BUFFER_SIZE - self.end);
        self.buffer[self.end..self.end + n].copy_from_slice(&input[..n]);
        self.end += n;
        n
    }

    /// Drop the oldest window of data once the cursor is far enough along.
    fn slide(&mut self) {
        // A pending literal still needs the byte just before the cursor
        if self.cursor <= WINDOW_SIZE + 1 {
            return;
        }
        self.buffer.copy_within(WINDOW_SIZE..self.end, 0);
        self.cursor -= WINDOW_SIZE;
        self.end -= WINDOW_SIZE;
        let rebase = |slot: &mut u32| {
            *slot = if *slot == NIL || (*slot as usize) < WINDOW_SIZE {
                NIL
            } else {
                *slot - WINDOW_SIZE as u32
            };
        };
        self.head.iter_mut().for_each(rebase);
        self.prev.iter_mut().for_each(rebase);
    }

    #[inline]
    fn hash(&self, pos: usize) -> usize {
        let b = &self.buffer[pos..pos + 3];
        let v = (b[0] as u32) | ((b[1] as u32) << 8) | ((b[2] as u32) << 16);
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    /// Enter `pos` into the hash chains.
    #[inline]
    fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH > self.end {
            return;
        }
        let h = self.hash(pos);
        self.prev[pos & WINDOW_MASK] = self.head[h];
        self.head[h] = pos as u32;
    }

    /// Longest match for `pos` among earlier positions. Returns (length, distance).
    fn longest_match(&self, pos: usize, min_length: usize) -> Option<(usize, usize)> {
        let max_length = MAX_MATCH.min(self.end - pos);
        if max_length < MIN_MATCH {
            return None;
        }
        let limit = pos.saturating_sub(WINDOW_SIZE);
        let mut best_length = min_length.max(MIN_MATCH - 1);
        let mut best_distance = 0;
        let mut candidate = self.prev[pos & WINDOW_MASK];
        let mut chain = self.config.max_chain;
        let current = &self.buffer[pos..pos + max_length];

        while candidate != NIL && chain > 0 {
            let cand = candidate as usize;
            if cand >= pos || cand < limit {
                break;
            }
            let earlier = &self.buffer[cand..cand + max_length];
            // Cheap reject on the byte that would extend the best match
            if earlier[best_length.min(max_length - 1)] == current[best_length.min(max_length - 1)]
            {
                let length = earlier
                    .iter()
                    .zip(current)
                    .take_while(|(a, b)| a == b)
                    .count();
                let distance = pos - cand;
                if length > best_length && !(length == MIN_MATCH && distance > TOO_FAR) {
                    best_length = length;
                    best_distance = distance;
                    if length >= self.config.nice_length || length == max_length {
                        break;
                    }
                }
            }
            let next = self.prev[cand & WINDOW_MASK];
            if next == NIL || next as usize >= cand {
                break;
            }
            candidate = next;
            chain -= 1;
        }

        (best_distance > 0).then_some((best_length, best_distance))
    }

    /// Tokenize buffered input into `tokens`.
    ///
    /// Without `flush`, stops while fewer than a full match of lookahead
    /// remains. With `flush`, everything is tokenized. Returns the number of
    /// input bytes covered by the new tokens.
    pub fn tokenize(&mut self, flush: bool, tokens: &mut Vec<Lz77Token>) -> usize {
        let stop = if flush {
            self.end
        } else {
            self.end.saturating_sub(LOOKAHEAD)
        };
        let before = tokens.len();
        let mut covered = 0;

        if self.config.lazy {
            covered += self.tokenize_lazy(stop, tokens);
        } else {
            covered += self.tokenize_greedy(stop, tokens);
        }
        if flush && self.literal_pending {
            tokens.push(Lz77Token::Literal(self.buffer[self.cursor - 1]));
            self.literal_pending = false;
            self.pending = None;
            covered += 1;
        }
        debug_assert_eq!(
            covered,
            tokens[before..].iter().map(Lz77Token::len).sum::<usize>()
        );
        covered
    }

    fn tokenize_greedy(&mut self, stop: usize, tokens: &mut Vec<Lz77Token>) -> usize {
        let mut covered = 0;
        while self.cursor < stop {
            let pos = self.cursor;
            self.insert(pos);
            match self.longest_match(pos, 0) {
                Some((length, distance)) => {
                    tokens.push(Lz77Token::Match {
                        length: length as u16,
                        distance: distance as u16,
                    });
                    for p in pos + 1..pos + length {
                        self.insert(p);
                    }
                    self.cursor += length;
                    covered += length;
                }
                None => {
                    tokens.push(Lz77Token::Literal(self.buffer[pos]));
                    self.cursor += 1;
                    covered += 1;
                }
            }
        }
        covered
    }

    fn tokenize_lazy(&mut self, stop: usize, tokens: &mut Vec<Lz77Token>) -> usize {
        let mut covered = 0;
        while self.cursor < stop {
            let pos = self.cursor;
            self.insert(pos);
            let previous = self.pending.take();
            let search_floor = previous.map_or(0, |(length, _)| length);
            let current = if search_floor < self.config.nice_length {
                self.longest_match(pos, search_floor)
            } else {
                None
            };

            match (previous, current) {
                (Some((length, distance)), None) => {
                    // The match starting one byte back wins
                    tokens.push(Lz77Token::Match {
                        length: length as u16,
                        distance: distance as u16,
                    });
                    let start = pos - 1;
                    for p in pos + 1..start + length {
                        self.insert(p);
                    }
                    self.cursor = start + length;
                    self.literal_pending = false;
                    covered += length;
                }
                (_, Some(found)) => {
                    if self.literal_pending {
                        tokens.push(Lz77Token::Literal(self.buffer[pos - 1]));
                        covered += 1;
                    }
                    self.pending = Some(found);
                    self.literal_pending = true;
                    self.cursor += 1;
                }
                (None, None) => {
                    if self.literal_pending {
                        tokens.push(Lz77Token::Literal(self.buffer[pos - 1]));
                        covered += 1;
                    }
                    self.literal_pending = true;
                    self.cursor += 1;
                }
            }
        }
        covered
    }
}

/// Tokenize a complete buffer at `level`.
pub fn tokenize_all(data: &[u8], level: u8) -> Vec<Lz77Token> {
    let mut encoder = Lz77Encoder::new(level);
    let mut tokens = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        offset += encoder.push(&data[offset..]);
        encoder.tokenize(false, &mut tokens);
    }
    encoder.tokenize(true, &mut tokens);
    tokens
}
