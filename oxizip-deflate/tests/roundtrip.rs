//! Round trips through the streaming DEFLATE codecs.

use oxizip_core::traits::{
    CompressStatus, Compressor, DecompressStatus, Decompressor, FlushMode,
};
use oxizip_deflate::{Deflater, Inflater, deflate, inflate};
use quickcheck_macros::quickcheck;
use rstest::rstest;

fn mixed_corpus() -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..4000u32 {
        data.extend_from_slice(format!("line {} value {}\n", i, i * 31 % 97).as_bytes());
        if i % 100 == 0 {
            data.extend((0..200).map(|j| ((i + j).wrapping_mul(2654435761) >> 24) as u8));
        }
    }
    data
}

/// Compress with `Deflater` feeding `in_chunk` bytes and draining `out_chunk` bytes per call.
fn compress_chunked(data: &[u8], level: u8, in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let mut deflater = Deflater::new(level);
    let mut compressed = Vec::new();
    let mut buffer = vec![0u8; out_chunk];
    let mut offset = 0;
    loop {
        let end = (offset + in_chunk).min(data.len());
        let flush = if end == data.len() {
            FlushMode::Finish
        } else {
            FlushMode::None
        };
        let (consumed, written, status) =
            deflater.compress(&data[offset..end], &mut buffer, flush).unwrap();
        offset += consumed;
        compressed.extend_from_slice(&buffer[..written]);
        if status == CompressStatus::Done {
            return compressed;
        }
    }
}

fn decompress_chunked(data: &[u8], in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let mut inflater = Inflater::new();
    let mut result = Vec::new();
    let mut buffer = vec![0u8; out_chunk];
    let mut offset = 0;
    loop {
        let end = (offset + in_chunk).min(data.len());
        let (consumed, produced, status) =
            inflater.decompress(&data[offset..end], &mut buffer).unwrap();
        offset += consumed;
        result.extend_from_slice(&buffer[..produced]);
        match status {
            DecompressStatus::Done => return result,
            DecompressStatus::NeedsInput => assert!(offset < data.len(), "stream ended early"),
            DecompressStatus::NeedsOutput => {}
        }
    }
}

#[rstest]
fn test_every_level_round_trips(#[values(0, 1, 2, 3, 4, 5, 6, 7, 8, 9)] level: u8) {
    let data = mixed_corpus();
    let compressed = deflate(&data, level).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), data);
    if level > 0 {
        assert!(compressed.len() < data.len() / 2, "level {} too weak", level);
    }
}

#[rstest]
#[case(1, 1)]
#[case(7, 3)]
#[case(4096, 17)]
#[case(100_000, 65536)]
fn test_chunking_does_not_change_result(#[case] in_chunk: usize, #[case] out_chunk: usize) {
    let data = mixed_corpus();
    let reference = deflate(&data, 6).unwrap();
    let compressed = compress_chunked(&data, 6, in_chunk.max(512), out_chunk);
    assert_eq!(inflate(&compressed).unwrap(), data);
    assert_eq!(decompress_chunked(&reference, in_chunk, out_chunk), data);
}

#[test]
fn test_higher_levels_not_worse_on_text() {
    let data = mixed_corpus();
    let fast = deflate(&data, 1).unwrap().len();
    let best = deflate(&data, 9).unwrap().len();
    assert!(best <= fast);
}

#[test]
fn test_reset_allows_reuse() {
    let mut inflater = Inflater::new();
    let compressed = deflate(b"first stream", 6).unwrap();
    assert_eq!(inflater.decompress_all(&compressed).unwrap(), b"first stream");
    inflater.reset();
    let compressed = deflate(b"second stream", 1).unwrap();
    assert_eq!(inflater.decompress_all(&compressed).unwrap(), b"second stream");
}

#[quickcheck]
fn prop_round_trip(data: Vec<u8>, level: u8) -> bool {
    let level = level % 10;
    match deflate(&data, level) {
        Ok(compressed) => inflate(&compressed).map(|out| out == data).unwrap_or(false),
        Err(_) => false,
    }
}

#[quickcheck]
fn prop_split_input_matches(data: Vec<u8>, split: usize) -> bool {
    let compressed = deflate(&data, 6).unwrap_or_default();
    if compressed.is_empty() {
        return false;
    }
    let at = split % (compressed.len() + 1);
    let mut inflater = Inflater::new();
    let mut out = vec![0u8; data.len() + 16];
    let (first_in, first_out, _) = match inflater.decompress(&compressed[..at], &mut out) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let mut rest = compressed[first_in..].to_vec();
    let mut produced = first_out;
    loop {
        match inflater.decompress(&rest, &mut out[produced..]) {
            Ok((consumed, written, status)) => {
                produced += written;
                rest.drain(..consumed);
                if status == DecompressStatus::Done {
                    break;
                }
                if consumed == 0 && written == 0 {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
    out[..produced] == data[..]
}
