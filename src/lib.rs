//! # igzread - Random-Access Reads over Plain and Gzip Files
//!
//! Read any byte range of a file without caring whether it is gzip-compressed.
//! Gzip files are served through an on-demand seek index, so a read deep into
//! a large archive restarts decoding from a nearby checkpoint instead of from
//! the first byte.
//!
//! ## Features
//!
//! - **Format Detection**: Files are classified once at open by their magic bytes
//! - **Seek Index**: Checkpoints at DEFLATE block boundaries, recorded as decoding proceeds
//! - **No Held Descriptors**: Every call opens the path and closes it before returning
//! - **Integrity Checks**: CRC-32 and length trailers are verified for members read from the start
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and the numeric sentinel contract
//! - [`config`] - Index parameters with documented defaults
//! - [`file_handler`] - Format detection and the [`IndexedFile`] handle
//! - [`index`] - The gzip seek index and its resumable decoder
//!
//! ```no_run
//! use igzread::IndexedFile;
//!
//! # fn main() -> igzread::Result<()> {
//! let mut file = IndexedFile::open("data.bin.gz")?;
//! let mut buf = [0u8; 8];
//! let n = file.read(&mut buf, 7996)?;
//! assert!(n <= 8);
//! file.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod file_handler;
pub mod index;

// Re-export commonly used types for convenience
pub use config::{BuildMode, IndexConfig};
pub use error::{IgzError, Result};
pub use file_handler::{Format, IndexedFile, SharedIndexedFile};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
