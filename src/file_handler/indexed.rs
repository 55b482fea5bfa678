//! The indexed file handle.
//!
//! An [`IndexedFile`] remembers only its path, its format and, for gzip
//! files, the seek index. Each read opens the path afresh, hands the
//! descriptor to the index (or reads it directly for plain files) and drops
//! it before returning, so a handle holds no descriptor between calls.

use crate::config::IndexConfig;
use crate::error::{IgzError, Result};
use crate::file_handler::detection::{detect_format, Format};
use crate::file_handler::validation::open_regular_file;
use crate::index::{GzipIndex, ReadOutcome, SeekOutcome};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Largest offset or length a read accepts
const MAX_SIGNED: u64 = i64::MAX as u64;

/// Buffer growth step for [`IndexedFile::read_vec`]
const READ_VEC_CHUNK: u64 = 1024 * 1024;

#[derive(Debug)]
enum Source {
    /// Plain file and its size at open time
    Plain { size: u64 },
    /// Gzip file and the index over its compressed stream
    Gzip(GzipIndex),
}

/// Random-access handle over a plain or gzip file.
///
/// ```no_run
/// use igzread::IndexedFile;
///
/// # fn main() -> igzread::Result<()> {
/// let mut file = IndexedFile::open("access.log.gz")?;
/// let bytes = file.read_vec(100, 7_000_000)?;
/// println!("{}", String::from_utf8_lossy(&bytes));
/// file.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct IndexedFile {
    path: PathBuf,
    source: Source,
    compressed_size: u64,
}

impl IndexedFile {
    /// Open `path` with the default index configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, IndexConfig::default())
    }

    /// Open `path`, using `config` for the index if the file is gzip.
    ///
    /// The descriptor used for detection and index setup is released before
    /// this returns, whether it succeeds or not.
    ///
    /// # Errors
    /// - [`IgzError::Config`] if `config` is invalid, whatever the file format
    /// - [`IgzError::Open`] if the path cannot be opened or is not a regular file
    /// - [`IgzError::Detect`] if the first two bytes cannot be read
    /// - [`IgzError::IndexInit`] if the gzip index cannot be set up
    pub fn open_with_config(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;

        let open_error = |source: std::io::Error| IgzError::Open {
            path: path.to_path_buf(),
            source,
        };

        let mut file = open_regular_file(path).map_err(open_error)?;
        let size = file.metadata().map_err(open_error)?.len();

        let source = match detect_format(&mut file, path)? {
            Format::Gzip => {
                let index = GzipIndex::new(&mut file, &config)
                    .map_err(|e| IgzError::index_init(e.to_string()))?;
                Source::Gzip(index)
            }
            Format::Plain => Source::Plain { size },
        };

        let handle = Self {
            path: path.to_path_buf(),
            source,
            compressed_size: size,
        };
        log::debug!(
            "opened {} as {} ({} bytes on disk)",
            path.display(),
            handle.format().name(),
            size
        );
        Ok(handle)
    }

    /// Read up to `buf.len()` bytes starting at logical offset `off`.
    ///
    /// Keeps reading until `buf` is full or the data ends, so a short count
    /// always means end of data. Returns 0 at or past the end.
    ///
    /// # Errors
    /// - [`IgzError::Seek`] if `off` exceeds `i64::MAX` or cannot be reached
    /// - [`IgzError::ReadOpen`] if the path cannot be reopened; the handle stays usable
    /// - [`IgzError::DecompressRead`] if reading or decompressing fails
    pub fn read(&mut self, buf: &mut [u8], off: u64) -> Result<usize> {
        check_request(buf.len() as u64, off)?;
        let mut file = self.reopen()?;
        if buf.is_empty() {
            return Ok(0);
        }

        match &mut self.source {
            Source::Plain { .. } => read_plain(&mut file, buf, off),
            Source::Gzip(index) => read_gzip(index, &mut file, buf, off),
        }
    }

    /// Read up to `len` bytes at `off` into a new buffer.
    ///
    /// The buffer grows as data arrives, so a large `len` near the end of
    /// the data does not allocate more than what is actually read.
    ///
    /// # Errors
    /// [`IgzError::InvalidLength`] if `len` exceeds `i64::MAX`, otherwise as
    /// for [`read`](Self::read).
    pub fn read_vec(&mut self, len: u64, off: u64) -> Result<Vec<u8>> {
        check_request(len, off)?;

        let mut out = Vec::new();
        loop {
            let remaining = len - out.len() as u64;
            if remaining == 0 {
                break;
            }
            let start = out.len();
            let want = remaining.min(READ_VEC_CHUNK) as usize;
            out.resize(start + want, 0);

            let n = self.read(&mut out[start..], off + start as u64)?;
            out.truncate(start + n);
            if n < want {
                break;
            }
        }
        Ok(out)
    }

    /// Numeric form of a read: bytes copied, 0 at end of data, or the
    /// negative [`IgzError::sentinel`] of the failure.
    ///
    /// At most `len` bytes are read, and never more than `buf` holds.
    pub fn read_sentinel(&mut self, buf: &mut [u8], len: u64, off: u64) -> i64 {
        if len > MAX_SIGNED {
            return IgzError::InvalidLength { length: len }.sentinel();
        }
        let take = len.min(buf.len() as u64) as usize;
        match self.read(&mut buf[..take], off) {
            Ok(n) => n as i64,
            Err(e) => {
                log::debug!("read of {} bytes at {} failed: {}", len, off, e);
                e.sentinel()
            }
        }
    }

    /// Decode the whole gzip stream once, placing checkpoints throughout.
    ///
    /// Afterwards every offset is reachable from a nearby checkpoint and
    /// [`logical_size`](Self::logical_size) is known. Does nothing for plain
    /// files.
    pub fn build_full_index(&mut self) -> Result<()> {
        if matches!(self.source, Source::Plain { .. }) {
            return Ok(());
        }

        let mut file = self.reopen()?;
        if let Source::Gzip(index) = &mut self.source {
            index
                .build_full(&mut file)
                .map_err(|e| IgzError::decompress_read(e.to_string()))?;
        }
        Ok(())
    }

    /// Release the handle and its index.
    ///
    /// Dropping the handle has the same effect; this only makes the end of
    /// its life explicit and logs it.
    pub fn close(self) {
        log::debug!(
            "closing {} ({} checkpoints)",
            self.path.display(),
            self.checkpoint_count()
        );
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        match self.source {
            Source::Plain { .. } => Format::Plain,
            Source::Gzip(_) => Format::Gzip,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.format().is_compressed()
    }

    /// Size of the file on disk when it was opened
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Size of the logical (decompressed) content, if known.
    ///
    /// Always known for plain files. For gzip files it becomes known once
    /// decoding has reached the end of the stream.
    pub fn logical_size(&self) -> Option<u64> {
        match &self.source {
            Source::Plain { size } => Some(*size),
            Source::Gzip(index) => index.uncompressed_size(),
        }
    }

    /// Number of seek checkpoints recorded so far (0 for plain files)
    pub fn checkpoint_count(&self) -> usize {
        match &self.source {
            Source::Plain { .. } => 0,
            Source::Gzip(index) => index.checkpoint_count(),
        }
    }

    /// Bytes held by stored checkpoint windows (0 for plain files)
    pub fn index_memory(&self) -> usize {
        match &self.source {
            Source::Plain { .. } => 0,
            Source::Gzip(index) => index.memory_usage(),
        }
    }

    fn reopen(&self) -> Result<File> {
        File::open(&self.path).map_err(|source| IgzError::ReadOpen {
            path: self.path.clone(),
            source,
        })
    }
}

fn check_request(len: u64, off: u64) -> Result<()> {
    if len > MAX_SIGNED {
        return Err(IgzError::InvalidLength { length: len });
    }
    if off > MAX_SIGNED {
        return Err(IgzError::seek(off, "offset exceeds i64::MAX"));
    }
    Ok(())
}

fn read_plain(file: &mut File, buf: &mut [u8], off: u64) -> Result<usize> {
    file.seek(SeekFrom::Start(off))
        .map_err(|e| IgzError::seek(off, e.to_string()))?;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IgzError::decompress_read(e.to_string())),
        }
    }
    Ok(filled)
}

fn read_gzip(index: &mut GzipIndex, file: &mut File, buf: &mut [u8], off: u64) -> Result<usize> {
    match index.seek(file, off) {
        Ok(SeekOutcome::Positioned) => {}
        Ok(SeekOutcome::PastEnd) => return Ok(0),
        Err(e) => return Err(IgzError::seek(off, e.to_string())),
    }

    let mut filled = 0;
    while filled < buf.len() {
        let outcome = index
            .read(file, &mut buf[filled..])
            .map_err(|e| IgzError::decompress_read(e.to_string()))?;
        match outcome {
            ReadOutcome::Read(n) => filled += n,
            ReadOutcome::Eof => break,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    fn gzip_file(content: &[u8]) -> NamedTempFile {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        temp_file(&encoder.finish().unwrap())
    }

    #[test]
    fn test_plain_handle_queries() {
        let file = temp_file(b"0123456789");
        let handle = IndexedFile::open(file.path()).unwrap();

        assert_eq!(handle.path(), file.path());
        assert_eq!(handle.format(), Format::Plain);
        assert!(!handle.is_compressed());
        assert_eq!(handle.compressed_size(), 10);
        assert_eq!(handle.logical_size(), Some(10));
        assert_eq!(handle.checkpoint_count(), 0);
        assert_eq!(handle.index_memory(), 0);
        handle.close();
    }

    #[test]
    fn test_gzip_logical_size_known_after_build() {
        let file = gzip_file(&b"0123456789".repeat(1000));
        let mut handle = IndexedFile::open(file.path()).unwrap();

        assert!(handle.is_compressed());
        assert_eq!(handle.logical_size(), None);
        handle.build_full_index().unwrap();
        assert_eq!(handle.logical_size(), Some(10_000));
    }

    #[test]
    fn test_plain_read_truncates_at_eof() {
        let file = temp_file(b"hello world");
        let mut handle = IndexedFile::open(file.path()).unwrap();

        let mut buf = [0u8; 20];
        assert_eq!(handle.read(&mut buf, 6).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");
        assert_eq!(handle.read(&mut buf, 11).unwrap(), 0);
        assert_eq!(handle.read(&mut buf, 500).unwrap(), 0);
    }

    #[test]
    fn test_read_vec_large_len_is_bounded_by_data() {
        let file = gzip_file(b"short content");
        let mut handle = IndexedFile::open(file.path()).unwrap();
        let out = handle.read_vec(1 << 40, 6).unwrap();
        assert_eq!(out, b"content");
    }

    #[test]
    fn test_read_vec_spans_chunks() {
        let content: Vec<u8> = (0..3 * READ_VEC_CHUNK as usize).map(|i| i as u8).collect();
        let file = temp_file(&content);
        let mut handle = IndexedFile::open(file.path()).unwrap();

        let out = handle.read_vec(2 * READ_VEC_CHUNK + 17, 5).unwrap();
        assert_eq!(out.len(), 2 * READ_VEC_CHUNK as usize + 17);
        assert_eq!(&out[..], &content[5..5 + out.len()]);
    }

    #[test]
    fn test_request_limits() {
        let file = temp_file(b"abc");
        let mut handle = IndexedFile::open(file.path()).unwrap();

        assert!(matches!(
            handle.read_vec(u64::MAX, 0),
            Err(IgzError::InvalidLength { length: u64::MAX })
        ));
        assert!(matches!(
            handle.read_vec(1, i64::MAX as u64 + 1),
            Err(IgzError::Seek { .. })
        ));
        assert_eq!(handle.read_vec(0, 1).unwrap(), Vec::<u8>::new());
        assert_eq!(handle.read_vec(4, 1_000_000).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_read_sentinel() {
        let file = temp_file(b"abcdef");
        let mut handle = IndexedFile::open(file.path()).unwrap();
        let mut buf = [0u8; 4];

        assert_eq!(handle.read_sentinel(&mut buf, 3, 1), 3);
        assert_eq!(&buf[..3], b"bcd");
        assert_eq!(handle.read_sentinel(&mut buf, 100, 4), 2);
        assert_eq!(handle.read_sentinel(&mut buf, 4, 6), 0);
        assert_eq!(handle.read_sentinel(&mut buf, u64::MAX, 0), -4);
        assert_eq!(handle.read_sentinel(&mut buf, 1, u64::MAX), -6);
    }

    #[test]
    fn test_invalid_config_rejected_for_both_formats() {
        let plain = temp_file(b"plain content");
        let gzip = gzip_file(b"gzip content");
        let config = IndexConfig::default().with_spacing(1024);

        for file in [&plain, &gzip] {
            assert!(matches!(
                IndexedFile::open_with_config(file.path(), config.clone()),
                Err(IgzError::Config { .. })
            ));
        }
    }

    #[test]
    fn test_build_full_index_on_plain_is_noop() {
        let file = temp_file(b"plain");
        let mut handle = IndexedFile::open(file.path()).unwrap();
        handle.build_full_index().unwrap();
        assert_eq!(handle.checkpoint_count(), 0);
    }
}
