//! On-demand seek index over a gzip stream.
//!
//! [`GzipIndex`] gives random access into the decompressed content of a gzip
//! file. It records checkpoints at DEFLATE block boundaries as decoding moves
//! through the stream; a seek restarts decoding from the nearest checkpoint at
//! or before the target instead of from the start of the file.
//!
//! The index never holds a file descriptor. Every operation that touches the
//! compressed data takes the source as an explicit `&mut R`, so callers are
//! free to open a descriptor per call and drop it afterwards.
//!
//! ```no_run
//! use igzread::index::{GzipIndex, ReadOutcome};
//! use igzread::IndexConfig;
//! use std::fs::File;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut index = GzipIndex::new(&mut File::open("data.gz")?, &IndexConfig::default())?;
//!
//! let mut src = File::open("data.gz")?;
//! index.seek(&mut src, 1_000_000)?;
//! let mut buf = [0u8; 4096];
//! if let ReadOutcome::Read(n) = index.read(&mut src, &mut buf)? {
//!     println!("{} bytes", n);
//! }
//! # Ok(())
//! # }
//! ```

mod checkpoint;
mod inflate;

use crate::config::{BuildMode, IndexConfig};
use checkpoint::CheckpointList;
use inflate::Decoder;
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

/// First two bytes of every gzip member
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors reported by the seek index
#[derive(Error, Debug)]
pub enum IndexError {
    /// Reading or seeking the compressed source failed
    #[error("I/O error on compressed source: {0}")]
    Io(#[from] std::io::Error),

    /// The compressed data is malformed or truncated
    #[error("Corrupt gzip data: {0}")]
    Corrupt(String),

    /// Manual build mode and the offset lies beyond what has been indexed
    #[error("Offset {offset} is beyond the indexed range (0..={covered})")]
    NotCovered { offset: u64, covered: u64 },

    /// Index parameters were rejected
    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),
}

/// Result of positioning the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The cursor is at the requested offset
    Positioned,
    /// The offset is at or beyond the end of the stream; reads report `Eof`
    PastEnd,
}

/// Result of reading from the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes copied into the buffer; zero only for an empty buffer
    Read(usize),
    /// The cursor is at the end of the stream
    Eof,
}

/// Seek index over one gzip file
#[derive(Debug)]
pub struct GzipIndex {
    config: IndexConfig,
    points: CheckpointList,
    /// Parked decoder from the previous operation, if it ended cleanly
    decoder: Option<Decoder>,
    /// Logical cursor in the uncompressed stream
    position: u64,
    past_end: bool,
    compressed_size: u64,
    uncompressed_size: Option<u64>,
}

impl GzipIndex {
    /// Prepare an index over `src`.
    ///
    /// Validates the configuration and the first member header. No data is
    /// decompressed and no checkpoints are created yet. The source is left
    /// positioned at its start.
    pub fn new<R: Read + Seek>(src: &mut R, config: &IndexConfig) -> Result<Self, IndexError> {
        config
            .validate()
            .map_err(|e| IndexError::InvalidConfig(e.to_string()))?;

        let compressed_size = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;

        let mut decoder = Decoder::at_start(config);
        decoder.read_header(src)?;
        src.seek(SeekFrom::Start(0))?;

        log::debug!(
            "gzip index ready: {} compressed bytes, spacing {}, window {}, {:?} build",
            compressed_size,
            config.spacing,
            config.window_size,
            config.build_mode
        );

        Ok(Self {
            config: config.clone(),
            points: CheckpointList::new(config),
            decoder: Some(decoder),
            position: 0,
            past_end: false,
            compressed_size,
            uncompressed_size: None,
        })
    }

    /// Move the cursor to `offset` in the uncompressed stream
    pub fn seek<R: Read + Seek>(
        &mut self,
        src: &mut R,
        offset: u64,
    ) -> Result<SeekOutcome, IndexError> {
        self.position = offset;
        self.past_end = false;

        match self.position_decoder(src, offset)? {
            Some(decoder) => {
                self.decoder = Some(decoder);
                Ok(SeekOutcome::Positioned)
            }
            None => {
                self.past_end = true;
                Ok(SeekOutcome::PastEnd)
            }
        }
    }

    /// Read up to `buf.len()` bytes from the cursor
    pub fn read<R: Read + Seek>(
        &mut self,
        src: &mut R,
        buf: &mut [u8],
    ) -> Result<ReadOutcome, IndexError> {
        if self.past_end {
            return Ok(ReadOutcome::Eof);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Read(0));
        }

        let mut decoder = match self.position_decoder(src, self.position)? {
            Some(decoder) => decoder,
            None => {
                self.past_end = true;
                return Ok(ReadOutcome::Eof);
            }
        };

        let mut copied = 0;
        while copied < buf.len() {
            let pending = decoder.pending();
            if !pending.is_empty() {
                let n = pending.len().min(buf.len() - copied);
                buf[copied..copied + n].copy_from_slice(&pending[..n]);
                decoder.consume(n);
                copied += n;
                continue;
            }
            if decoder.is_finished() {
                break;
            }
            decoder.fill(src, &mut self.points)?;
            self.observe(&decoder);
        }

        self.position += copied as u64;
        self.decoder = Some(decoder);

        if copied == 0 {
            self.past_end = true;
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Read(copied))
        }
    }

    /// Decode the rest of the stream, recording checkpoints throughout.
    ///
    /// Continues from the furthest checkpoint already recorded. Afterwards the
    /// whole stream is covered and its uncompressed size is known.
    pub fn build_full<R: Read + Seek>(&mut self, src: &mut R) -> Result<(), IndexError> {
        if self.points.is_complete() {
            return Ok(());
        }

        self.points.set_recording(true);
        let result = self.decode_to_end(src);
        self.points.set_recording(self.config.build_mode == BuildMode::Auto);
        result?;

        log::debug!(
            "gzip index complete: {} checkpoints over {} uncompressed bytes ({} bytes of windows)",
            self.points.len(),
            self.uncompressed_size.unwrap_or(0),
            self.points.memory_usage()
        );
        Ok(())
    }

    /// Current logical cursor
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of checkpoints recorded so far
    pub fn checkpoint_count(&self) -> usize {
        self.points.len()
    }

    /// Uncompressed offset up to which checkpoints have been recorded
    pub fn covered(&self) -> u64 {
        self.points.covered()
    }

    /// True once the whole stream has been decoded while recording
    pub fn is_complete(&self) -> bool {
        self.points.is_complete()
    }

    /// Size of the compressed file when the index was created
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Size of the decompressed stream, once decoding has reached its end
    pub fn uncompressed_size(&self) -> Option<u64> {
        self.uncompressed_size
    }

    /// Bytes held by stored checkpoint windows
    pub fn memory_usage(&self) -> usize {
        self.points.memory_usage()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn decode_to_end<R: Read + Seek>(&mut self, src: &mut R) -> Result<(), IndexError> {
        let mut decoder = self.resume(src, u64::MAX)?;
        while !decoder.is_finished() {
            let pending = decoder.pending().len();
            decoder.consume(pending);
            decoder.fill(src, &mut self.points)?;
        }
        self.observe(&decoder);
        self.decoder = Some(decoder);
        Ok(())
    }

    /// Produce a decoder whose next byte is `target`, or `None` when `target`
    /// lies at or beyond the end of the stream.
    ///
    /// Reuses the parked decoder when it sits between the best checkpoint and
    /// the target; otherwise restarts from that checkpoint.
    fn position_decoder<R: Read + Seek>(
        &mut self,
        src: &mut R,
        target: u64,
    ) -> Result<Option<Decoder>, IndexError> {
        if let Some(size) = self.uncompressed_size {
            if target >= size {
                return Ok(None);
            }
        }

        if self.config.build_mode == BuildMode::Manual
            && !self.points.is_complete()
            && target > self.points.covered()
        {
            return Err(IndexError::NotCovered {
                offset: target,
                covered: self.points.covered(),
            });
        }

        let restart_at = self.points.before(target).map_or(0, |p| p.out_offset);
        let mut decoder = match self.decoder.take() {
            Some(parked) if (restart_at..=target).contains(&parked.position()) => {
                parked.attach(src)?;
                parked
            }
            _ => self.resume(src, target)?,
        };

        while decoder.position() < target {
            let remaining = target - decoder.position();
            let pending = decoder.pending().len() as u64;
            if pending > 0 {
                decoder.consume(pending.min(remaining) as usize);
                continue;
            }
            if decoder.is_finished() {
                self.decoder = Some(decoder);
                return Ok(None);
            }
            decoder.fill(src, &mut self.points)?;
            self.observe(&decoder);
        }

        // Landing exactly on the end is only visible after decoding one more step
        if decoder.pending().is_empty() {
            decoder.fill(src, &mut self.points)?;
            self.observe(&decoder);
            if decoder.pending().is_empty() {
                self.decoder = Some(decoder);
                return Ok(None);
            }
        }

        Ok(Some(decoder))
    }

    /// Fresh decoder at the last checkpoint at or before `target`
    fn resume<R: Read + Seek>(&self, src: &mut R, target: u64) -> Result<Decoder, IndexError> {
        match self.points.before(target) {
            Some(point) => {
                log::trace!(
                    "resuming at checkpoint uncompressed {} for target {}",
                    point.out_offset,
                    target
                );
                Decoder::at_checkpoint(src, point, point.window()?, &self.config)
            }
            None => {
                let decoder = Decoder::at_start(&self.config);
                decoder.attach(src)?;
                Ok(decoder)
            }
        }
    }

    fn observe(&mut self, decoder: &Decoder) {
        if decoder.is_finished() && self.uncompressed_size.is_none() {
            self.uncompressed_size = Some(decoder.total_out());
            log::debug!(
                "gzip stream ends at {} uncompressed bytes",
                decoder.total_out()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn letters(len: usize, seed: u32) -> Vec<u8> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                b'a' + (state % 26) as u8
            })
            .collect()
    }

    fn small_config() -> IndexConfig {
        IndexConfig {
            spacing: 48 * 1024,
            readbuf_size: 4096,
            ..IndexConfig::default()
        }
    }

    fn read_at(
        index: &mut GzipIndex,
        src: &mut Cursor<Vec<u8>>,
        offset: u64,
        len: usize,
    ) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let mut filled = 0;
        if index.seek(src, offset).unwrap() == SeekOutcome::PastEnd {
            return Vec::new();
        }
        while filled < len {
            match index.read(src, &mut out[filled..]).unwrap() {
                ReadOutcome::Read(n) => filled += n,
                ReadOutcome::Eof => break,
            }
        }
        out.truncate(filled);
        out
    }

    #[test]
    fn test_new_rejects_plain_data() {
        let mut src = Cursor::new(b"not gzip at all".to_vec());
        let err = GzipIndex::new(&mut src, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut src = Cursor::new(gzip(b"x"));
        let config = IndexConfig {
            window_size: 100,
            ..IndexConfig::default()
        };
        let err = GzipIndex::new(&mut src, &config).unwrap_err();
        assert!(matches!(err, IndexError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_leaves_source_at_start() {
        let compressed = gzip(b"hello");
        let len = compressed.len() as u64;
        let mut src = Cursor::new(compressed);
        let index = GzipIndex::new(&mut src, &IndexConfig::default()).unwrap();
        assert_eq!(src.position(), 0);
        assert_eq!(index.compressed_size(), len);
        assert_eq!(index.checkpoint_count(), 0);
    }

    #[test]
    fn test_sequential_read_matches_source() {
        let data = letters(300_000, 7);
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &small_config()).unwrap();

        let mut out = Vec::new();
        let mut buf = vec![0u8; 10_000];
        loop {
            match index.read(&mut src, &mut buf).unwrap() {
                ReadOutcome::Read(n) => out.extend_from_slice(&buf[..n]),
                ReadOutcome::Eof => break,
            }
        }
        assert_eq!(out, data);
        assert_eq!(index.uncompressed_size(), Some(300_000));
        assert!(index.checkpoint_count() > 0);
        assert!(index.is_complete());
    }

    #[test]
    fn test_random_seeks_match_source() {
        let data = letters(500_000, 11);
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &small_config()).unwrap();

        // Forward first so later seeks can use checkpoints
        let offsets = [0u64, 450_000, 10, 200_000, 199_990, 499_999, 123_456, 300_000];
        for &offset in &offsets {
            let got = read_at(&mut index, &mut src, offset, 5000);
            let start = offset as usize;
            let end = (start + 5000).min(data.len());
            assert_eq!(got, &data[start..end], "offset {}", offset);
        }
        assert!(index.checkpoint_count() > 2);
    }

    #[test]
    fn test_seek_past_end() {
        let data = letters(1000, 3);
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &small_config()).unwrap();

        assert_eq!(index.seek(&mut src, 1000).unwrap(), SeekOutcome::PastEnd);
        let mut buf = [0u8; 10];
        assert_eq!(index.read(&mut src, &mut buf).unwrap(), ReadOutcome::Eof);

        // Size is now known, so a later seek past the end is answered directly
        assert_eq!(index.seek(&mut src, 5000).unwrap(), SeekOutcome::PastEnd);
        assert_eq!(index.seek(&mut src, 999).unwrap(), SeekOutcome::Positioned);
        assert_eq!(index.read(&mut src, &mut buf).unwrap(), ReadOutcome::Read(1));
        assert_eq!(buf[0], data[999]);
        assert_eq!(index.read(&mut src, &mut buf).unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn test_empty_buffer_reads_zero() {
        let mut src = Cursor::new(gzip(b"abc"));
        let mut index = GzipIndex::new(&mut src, &small_config()).unwrap();
        assert_eq!(index.read(&mut src, &mut []).unwrap(), ReadOutcome::Read(0));
    }

    #[test]
    fn test_manual_mode_requires_build() {
        let data = letters(400_000, 5);
        let config = small_config().with_build_mode(BuildMode::Manual);
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &config).unwrap();

        assert!(matches!(
            index.seek(&mut src, 100_000),
            Err(IndexError::NotCovered { offset: 100_000, .. })
        ));
        assert_eq!(read_at(&mut index, &mut src, 0, 4), &data[..4]);
        assert_eq!(index.checkpoint_count(), 0);

        index.build_full(&mut src).unwrap();
        assert!(index.is_complete());
        assert!(index.checkpoint_count() > 2);
        assert_eq!(index.uncompressed_size(), Some(400_000));

        assert_eq!(
            read_at(&mut index, &mut src, 350_000, 100),
            &data[350_000..350_100]
        );
    }

    #[test]
    fn test_build_full_is_idempotent() {
        let data = letters(200_000, 9);
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &small_config()).unwrap();

        index.build_full(&mut src).unwrap();
        let points = index.checkpoint_count();
        index.build_full(&mut src).unwrap();
        assert_eq!(index.checkpoint_count(), points);
        assert_eq!(index.covered(), 200_000);
    }

    #[test]
    fn test_uncompressed_windows_work_too() {
        let data = letters(300_000, 13);
        let config = IndexConfig {
            compress_windows: false,
            ..small_config()
        };
        let mut src = Cursor::new(gzip(&data));
        let mut index = GzipIndex::new(&mut src, &config).unwrap();
        index.build_full(&mut src).unwrap();

        assert!(index.memory_usage() >= index.checkpoint_count() * 32 * 1024);
        assert_eq!(
            read_at(&mut index, &mut src, 250_001, 777),
            &data[250_001..250_778]
        );
    }
}
