//! Error types and handling infrastructure for igzread.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. Every variant corresponds to one failure domain of the
//! open/read lifecycle, so callers can tell "could not open" from "could not seek"
//! from "the compressed data is broken".
//!
//! ## Design Principles
//!
//! - **User-friendly messages**: Errors should provide actionable feedback
//! - **Context preservation**: Include the path or offset involved
//! - **Numeric contract**: Every error maps to a distinct negative sentinel
//! - **Consistency**: Standardized Result type across all modules

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for igzread operations.
#[derive(Error, Debug)]
pub enum IgzError {
    /// The path could not be opened for reading at open time
    #[error("Failed to open file: {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Format detection could not complete (I/O failure or file shorter than the magic)
    #[error("Format detection failed for {path}: {message}")]
    Detect {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Building the decompression index failed for a file detected as gzip
    #[error("Index initialization failed: {message}")]
    IndexInit { message: String },

    /// Requested length is not representable as a signed 64-bit count
    #[error("Invalid read length: {length}")]
    InvalidLength { length: u64 },

    /// The path could not be reopened at read time
    #[error("Failed to reopen file for reading: {path}")]
    ReadOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested offset could not be satisfied
    #[error("Seek to offset {offset} failed: {message}")]
    Seek { offset: u64, message: String },

    /// Reading from the file or the decompression index failed
    #[error("Read failed: {message}")]
    DecompressRead { message: String },

    /// Configuration is invalid or could not be parsed
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Standard Result type for igzread operations.
pub type Result<T> = std::result::Result<T, IgzError>;

impl IgzError {
    /// Create a Detect error for a source that could not be inspected
    pub fn detect(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Detect {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an IndexInit error with a descriptive message
    pub fn index_init(message: impl Into<String>) -> Self {
        Self::IndexInit {
            message: message.into(),
        }
    }

    /// Create a Seek error for the given offset
    pub fn seek(offset: u64, message: impl Into<String>) -> Self {
        Self::Seek {
            offset,
            message: message.into(),
        }
    }

    /// Create a DecompressRead error with a descriptive message
    pub fn decompress_read(message: impl Into<String>) -> Self {
        Self::DecompressRead {
            message: message.into(),
        }
    }

    /// Create a Config error with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Negative sentinel for callers that work with the numeric read contract.
    ///
    /// Every variant has its own code, and all codes are strictly negative so
    /// they can never be confused with a byte count.
    pub fn sentinel(&self) -> i64 {
        match self {
            Self::Open { .. } => -1,
            Self::Detect { .. } => -2,
            Self::IndexInit { .. } => -3,
            Self::InvalidLength { .. } => -4,
            Self::ReadOpen { .. } => -5,
            Self::Seek { .. } => -6,
            Self::DecompressRead { .. } => -7,
            Self::Config { .. } => -8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_error_display_messages() {
        let path = PathBuf::from("/test/file.gz");

        let open = IgzError::Open {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(open.to_string(), "Failed to open file: /test/file.gz");

        let detect = IgzError::detect(&path, "file shorter than 2 bytes");
        assert_eq!(
            detect.to_string(),
            "Format detection failed for /test/file.gz: file shorter than 2 bytes"
        );

        let length = IgzError::InvalidLength { length: u64::MAX };
        assert_eq!(
            length.to_string(),
            format!("Invalid read length: {}", u64::MAX)
        );

        let seek = IgzError::seek(42, "offset not covered by index");
        assert_eq!(
            seek.to_string(),
            "Seek to offset 42 failed: offset not covered by index"
        );
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(
            IgzError::index_init("bad header"),
            IgzError::IndexInit { .. }
        ));
        assert!(matches!(
            IgzError::decompress_read("corrupt"),
            IgzError::DecompressRead { .. }
        ));
        assert!(matches!(IgzError::config("nope"), IgzError::Config { .. }));
    }

    #[test]
    fn test_sentinels_are_negative_and_distinct() {
        let io = || std::io::Error::new(std::io::ErrorKind::Other, "x");
        let errors = vec![
            IgzError::Open {
                path: PathBuf::from("a"),
                source: io(),
            },
            IgzError::detect("a", "short"),
            IgzError::index_init("x"),
            IgzError::InvalidLength { length: 0 },
            IgzError::ReadOpen {
                path: PathBuf::from("a"),
                source: io(),
            },
            IgzError::seek(0, "x"),
            IgzError::decompress_read("x"),
            IgzError::config("x"),
        ];

        let codes: HashSet<i64> = errors.iter().map(IgzError::sentinel).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&code| code < 0));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<usize> {
            Ok(7)
        }

        assert_eq!(returns_result().unwrap(), 7);
    }
}
