//! Uniform random-access reads over plain and gzip files.
//!
//! [`IndexedFile`] is the handle callers work with. Opening it classifies the
//! file once by its magic bytes; gzip files get a [`GzipIndex`](crate::index::GzipIndex)
//! and plain files are read with ordinary seeks. No descriptor outlives a
//! single call: open and every read acquire their own and drop it on return.

pub mod detection;
pub mod indexed;
pub mod shared;
pub mod validation;

pub use detection::{detect_format, Format};
pub use indexed::IndexedFile;
pub use shared::SharedIndexedFile;
pub use validation::open_regular_file;
