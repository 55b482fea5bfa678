//! Format detection by magic number.
//!
//! Only the first two bytes matter: a gzip member always starts with
//! `1f 8b` (RFC 1952 §2.3.1). Anything else is treated as plain data.

use crate::error::{IgzError, Result};
use crate::index::GZIP_MAGIC;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// How the bytes of a file are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Gzip stream, read through a seek index
    Gzip,
    /// Raw bytes, read directly
    Plain,
}

impl Format {
    /// Get human-readable name for the format
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Plain => "plain",
        }
    }

    /// Check if this format needs decompression
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Gzip)
    }

    fn from_magic(magic: [u8; 2]) -> Self {
        if magic == GZIP_MAGIC {
            Self::Gzip
        } else {
            Self::Plain
        }
    }
}

/// Classify `src` by its first two bytes.
///
/// The source is rewound before and after inspection, so a successful
/// detection always leaves it at offset 0. `path` only labels errors.
///
/// # Errors
///
/// [`IgzError::Detect`] when the source holds fewer than two bytes or a seek
/// or read fails.
pub fn detect_format<R: Read + Seek>(src: &mut R, path: &Path) -> Result<Format> {
    let io_failure = |what: &str, source: std::io::Error| IgzError::Detect {
        path: path.to_path_buf(),
        message: format!("{} failed", what),
        source: Some(source),
    };

    src.seek(SeekFrom::Start(0))
        .map_err(|e| io_failure("seek to start", e))?;

    let mut magic = [0u8; 2];
    if let Err(e) = src.read_exact(&mut magic) {
        return Err(if e.kind() == ErrorKind::UnexpectedEof {
            IgzError::detect(path, "file shorter than 2 bytes")
        } else {
            io_failure("reading magic bytes", e)
        });
    }

    src.seek(SeekFrom::Start(0))
        .map_err(|e| io_failure("rewind", e))?;

    Ok(Format::from_magic(magic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn detect(bytes: &[u8]) -> Result<Format> {
        detect_format(&mut Cursor::new(bytes.to_vec()), Path::new("test"))
    }

    #[test]
    fn test_detects_gzip_magic() {
        assert_eq!(detect(&[0x1f, 0x8b, 0x08, 0x00]).unwrap(), Format::Gzip);
        assert_eq!(detect(&[0x1f, 0x8b]).unwrap(), Format::Gzip);
    }

    #[test]
    fn test_other_bytes_are_plain() {
        assert_eq!(detect(b"plain text").unwrap(), Format::Plain);
        assert_eq!(detect(&[0x8b, 0x1f]).unwrap(), Format::Plain);
        // bzip2 and friends are not special
        assert_eq!(detect(b"BZh91AY").unwrap(), Format::Plain);
    }

    #[test]
    fn test_short_input_is_an_error() {
        for bytes in [&b""[..], &b"x"[..]] {
            match detect(bytes).unwrap_err() {
                IgzError::Detect { message, .. } => {
                    assert!(message.contains("shorter than 2 bytes"))
                }
                other => panic!("Expected Detect error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_position_is_restored() {
        let mut src = Cursor::new(b"some plain content".to_vec());
        src.set_position(7);
        detect_format(&mut src, Path::new("test")).unwrap();
        assert_eq!(src.position(), 0);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut src = Cursor::new(vec![0x1f, 0x8b, 8, 0]);
        let first = detect_format(&mut src, Path::new("test")).unwrap();
        let second = detect_format(&mut src, Path::new("test")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(Format::Gzip.name(), "gzip");
        assert_eq!(Format::Plain.name(), "plain");
        assert!(Format::Gzip.is_compressed());
        assert!(!Format::Plain.is_compressed());
    }
}
