//! Name and comment decoding.
//!
//! Entries without the UTF-8 flag carry names in whatever code page the
//! creating tool used. IBM PC code page 437 is the format's nominal default
//! and is not part of the WHATWG set `encoding_rs` implements, so it is
//! decoded from the table below; any other label goes through `encoding_rs`.

use encoding_rs::Encoding;
use oxizip_core::error::{OxiZipError, Result};

/// CP437 code points for bytes 0x80..=0xFF.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

/// Legacy text encoding for names and comments lacking the UTF-8 flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// IBM PC code page 437.
    #[default]
    Cp437,
    /// UTF-8, lossily decoded.
    Utf8,
    /// Any WHATWG encoding.
    Other(&'static Encoding),
}

impl Charset {
    /// Resolve a label such as `"cp437"`, `"shift_jis"` or `"windows-1252"`.
    pub fn for_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cp437" | "ibm437" | "437" | "ibm-437" => Ok(Self::Cp437),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            _ => Encoding::for_label(normalized.as_bytes())
                .map(Self::Other)
                .ok_or_else(|| OxiZipError::encoding_error(format!("unknown encoding '{}'", label))),
        }
    }

    /// Decode raw header bytes.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Cp437 => decode_cp437(bytes),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Other(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}

/// Decode CP437; the low half is ASCII.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Decode a name or comment, honouring the UTF-8 flag.
pub(crate) fn decode_field(bytes: &[u8], utf8: bool, charset: Charset) -> String {
    if utf8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        charset.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cp437_high_half() {
        assert_eq!(decode_cp437(b"abc"), "abc");
        assert_eq!(decode_cp437(&[0x80, 0x81, 0xE1, 0xFF]), "Çüß\u{A0}");
        assert_eq!(decode_cp437(&[b'n', 0xA4, b'o']), "nño");
    }

    #[test]
    fn test_labels() {
        assert_eq!(Charset::for_label("CP437").unwrap(), Charset::Cp437);
        assert_eq!(Charset::for_label("utf8").unwrap(), Charset::Utf8);
        let sjis = Charset::for_label("shift_jis").unwrap();
        // "日本" in Shift_JIS
        assert_eq!(sjis.decode(&[0x93, 0xFA, 0x96, 0x7B]), "日本");
        assert!(Charset::for_label("no-such-charset").is_err());
    }

    #[test]
    fn test_utf8_flag_wins() {
        let raw = "größe".as_bytes();
        assert_eq!(decode_field(raw, true, Charset::Cp437), "größe");
        assert_ne!(decode_field(raw, false, Charset::Cp437), "größe");
    }
}
