//! Error types for OxiZip operations.
//!
//! A single error enum covers the whole engine. Variants fall into the
//! families callers need to tell apart: format damage, codec failures,
//! password problems (wrong password vs. tampered data), unsupported
//! features, split archives opened without their volumes, and cancellation.

use std::io;
use thiserror::Error;

/// The main error type for OxiZip operations.
#[derive(Debug, Error)]
pub enum OxiZipError {
    /// I/O error from underlying source/sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record did not start with its expected signature.
    #[error("Invalid signature: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected signature bytes.
        expected: Vec<u8>,
        /// Actual bytes found.
        found: Vec<u8>,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// Unsupported or unknown encryption parameters.
    #[error("Unsupported encryption: {message}")]
    UnsupportedEncryption {
        /// What was not understood.
        message: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from archive.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// Invalid Huffman code table or symbol.
    #[error("Invalid Huffman code at bit position {bit_position}")]
    InvalidHuffmanCode {
        /// Bit position where the invalid code was found.
        bit_position: u64,
    },

    /// Corrupted data in a stream or record.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of file: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Back-reference reaching outside the decoded window.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: usize,
        /// Bytes of history available.
        history_size: usize,
    },

    /// No End-Of-Central-Directory record in the trailing window.
    #[error("End of central directory not found")]
    EocdNotFound,

    /// The EOCD carries Zip64 sentinels but no locator precedes it.
    #[error("Zip64 end of central directory locator not found")]
    Zip64LocatorNotFound,

    /// The central directory is not at the computed offset.
    #[error("Central directory not found at offset {offset}")]
    CentralDirectoryNotFound {
        /// Offset that was probed.
        offset: u64,
    },

    /// The archive is split across volumes and no multi-volume source was given.
    #[error("Split archive detected: open it with all of its volumes")]
    SplitArchive,

    /// A size, offset, or count overflowed 32 bits while Zip64 was disabled.
    #[error("Zip64 required for {field} but disabled")]
    Zip64Required {
        /// The field that overflowed.
        field: String,
    },

    /// Entry is encrypted and no password was supplied.
    #[error("Password required for entry: {name}")]
    PasswordRequired {
        /// Entry name.
        name: String,
    },

    /// Password verification byte/value did not match.
    #[error("Wrong password")]
    WrongPassword,

    /// The AE-x authentication code did not match the ciphertext.
    #[error("Authentication failed: HMAC mismatch, data may have been tampered with")]
    AuthenticationFailed,

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// An entry with the same name is already in the archive.
    #[error("Duplicate entry name: {name}")]
    DuplicateEntry {
        /// The duplicated name.
        name: String,
    },

    /// Entry name is empty or too long.
    #[error("Invalid entry name: {message}")]
    InvalidEntryName {
        /// Description of the problem.
        message: String,
    },

    /// Comment exceeds 65535 bytes.
    #[error("Comment too long: {len} bytes (max 65535)")]
    CommentTooLong {
        /// Encoded length of the comment.
        len: usize,
    },

    /// Writer was already closed.
    #[error("Archive already closed")]
    ArchiveClosed,

    /// An earlier failure left this entry partially written.
    #[error("Entry {name} is corrupted: {message}")]
    CorruptedEntry {
        /// Entry name.
        name: String,
        /// Cause.
        message: String,
    },

    /// Path traversal attack detected (e.g., "../" in filename).
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The suspicious path.
        path: String,
    },

    /// Encoding error while decoding names or comments.
    #[error("Encoding error: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Operation cancelled through an abort signal.
    #[error("Operation aborted")]
    Aborted,

    /// A worker thread failed mid-task.
    #[error("Worker failed: {message}")]
    WorkerFailed {
        /// Description of the failure.
        message: String,
    },

    /// HTTP range request failure.
    #[error("HTTP error: {message}")]
    Http {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for OxiZip operations.
pub type Result<T> = std::result::Result<T, OxiZipError>;

impl OxiZipError {
    /// Create an invalid signature error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create an unsupported encryption error.
    pub fn unsupported_encryption(message: impl Into<String>) -> Self {
        Self::UnsupportedEncryption {
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create an invalid Huffman code error.
    pub fn invalid_huffman(bit_position: u64) -> Self {
        Self::InvalidHuffmanCode { bit_position }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: usize, history_size: usize) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }

    /// Create a Zip64-required error.
    pub fn zip64_required(field: impl Into<String>) -> Self {
        Self::Zip64Required {
            field: field.into(),
        }
    }

    /// Create a password-required error.
    pub fn password_required(name: impl Into<String>) -> Self {
        Self::PasswordRequired { name: name.into() }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create a duplicate entry error.
    pub fn duplicate_entry(name: impl Into<String>) -> Self {
        Self::DuplicateEntry { name: name.into() }
    }

    /// Create an invalid entry name error.
    pub fn invalid_entry_name(message: impl Into<String>) -> Self {
        Self::InvalidEntryName {
            message: message.into(),
        }
    }

    /// Create a corrupted entry error.
    pub fn corrupted_entry(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptedEntry {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Create an encoding error.
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Create a worker failure error.
    pub fn worker_failed(message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            message: message.into(),
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// True for errors a caller may answer by asking for another password.
    pub fn is_password_error(&self) -> bool {
        matches!(self, Self::WrongPassword | Self::PasswordRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OxiZipError::invalid_magic(vec![0x50, 0x4B], vec![0x1F, 0x8B]);
        assert!(err.to_string().contains("Invalid signature"));

        let err = OxiZipError::crc_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC mismatch"));

        let err = OxiZipError::unsupported_method("method 14");
        assert!(err.to_string().contains("method 14"));

        let err = OxiZipError::zip64_required("uncompressed size");
        assert!(err.to_string().contains("uncompressed size"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OxiZipError = io_err.into();
        assert!(matches!(err, OxiZipError::Io(_)));
    }

    #[test]
    fn test_password_errors_are_distinct_from_tampering() {
        assert!(OxiZipError::WrongPassword.is_password_error());
        assert!(OxiZipError::password_required("a.txt").is_password_error());
        assert!(!OxiZipError::AuthenticationFailed.is_password_error());
    }
}
