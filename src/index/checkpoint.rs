//! Seek checkpoints and the list that records them.
//!
//! A checkpoint is a DEFLATE block boundary from which decoding can restart:
//! the compressed position (byte plus unread bits), the uncompressed offset,
//! and the output window that later back-references may point into.

use super::IndexError;
use crate::config::{BuildMode, IndexConfig};
use miniz_oxide::deflate::{compress_to_vec, CompressionLevel};
use miniz_oxide::inflate::decompress_to_vec_with_limit;

/// Stored copy of the output preceding a checkpoint
#[derive(Debug)]
enum Window {
    Raw(Box<[u8]>),
    Deflated { data: Box<[u8]>, len: usize },
}

#[derive(Debug)]
pub(crate) struct Checkpoint {
    /// Offset in the uncompressed stream
    pub out_offset: u64,
    /// Byte of the compressed file holding the first bit of the next block
    pub in_offset: u64,
    /// High bits of `in_offset` not yet consumed by the previous block (0-7)
    pub bits: u8,
    window: Window,
}

impl Checkpoint {
    fn capture(out_offset: u64, in_offset: u64, bits: u8, window: &[u8], compress: bool) -> Self {
        let window = if compress {
            Window::Deflated {
                data: compress_to_vec(window, CompressionLevel::BestSpeed as u8).into_boxed_slice(),
                len: window.len(),
            }
        } else {
            Window::Raw(window.into())
        };

        Self {
            out_offset,
            in_offset,
            bits,
            window,
        }
    }

    /// Output bytes immediately preceding `out_offset`
    pub fn window(&self) -> Result<Vec<u8>, IndexError> {
        match &self.window {
            Window::Raw(bytes) => Ok(bytes.to_vec()),
            Window::Deflated { data, len } => {
                let window = decompress_to_vec_with_limit(data, *len).map_err(|e| {
                    IndexError::Corrupt(format!(
                        "checkpoint window at {} failed to inflate: {:?}",
                        self.out_offset, e.status
                    ))
                })?;
                if window.len() != *len {
                    return Err(IndexError::Corrupt(format!(
                        "checkpoint window at {} restored {} of {} bytes",
                        self.out_offset,
                        window.len(),
                        len
                    )));
                }
                Ok(window)
            }
        }
    }

    /// Memory held by the stored window
    fn stored_size(&self) -> usize {
        match &self.window {
            Window::Raw(bytes) => bytes.len(),
            Window::Deflated { data, .. } => data.len(),
        }
    }
}

/// Ordered checkpoints plus the coverage bookkeeping of index construction
#[derive(Debug)]
pub(crate) struct CheckpointList {
    points: Vec<Checkpoint>,
    spacing: u64,
    window_size: usize,
    compress: bool,
    recording: bool,
    /// Furthest uncompressed offset decoded while recording
    covered: u64,
    /// The whole stream has been decoded while recording
    complete: bool,
}

impl CheckpointList {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            points: Vec::new(),
            spacing: config.spacing,
            window_size: config.window_size,
            compress: config.compress_windows,
            recording: config.build_mode == BuildMode::Auto,
            covered: 0,
            complete: false,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    pub fn covered(&self) -> u64 {
        self.covered
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Total bytes held by stored windows
    pub fn memory_usage(&self) -> usize {
        self.points.iter().map(Checkpoint::stored_size).sum()
    }

    /// Last checkpoint at or before `offset`
    pub fn before(&self, offset: u64) -> Option<&Checkpoint> {
        let idx = self.points.partition_point(|p| p.out_offset <= offset);
        idx.checked_sub(1).map(|i| &self.points[i])
    }

    /// Note that decoding reached `out_pos`
    pub fn advance(&mut self, out_pos: u64) {
        if self.recording && out_pos > self.covered {
            self.covered = out_pos;
        }
    }

    /// Note that decoding reached the end of the stream
    pub fn finish(&mut self, out_pos: u64) {
        if self.recording {
            self.advance(out_pos);
            self.complete = true;
        }
    }

    /// True when a block boundary at `out_pos` would become a checkpoint
    pub fn due(&self, out_pos: u64) -> bool {
        let last = self.points.last().map_or(0, |p| p.out_offset);
        self.recording && out_pos >= last + self.spacing
    }

    /// Record a block boundary as a checkpoint if it is due.
    ///
    /// `window` is the decoded output ending at `out_pos`; only its last
    /// `window_size` bytes are stored.
    pub fn offer(
        &mut self,
        out_pos: u64,
        in_offset: u64,
        bits: u8,
        window: &[u8],
    ) {
        if !self.due(out_pos) {
            return;
        }
        self.advance(out_pos);

        let start = window.len().saturating_sub(self.window_size);
        let point = Checkpoint::capture(out_pos, in_offset, bits, &window[start..], self.compress);
        log::trace!(
            "checkpoint {} at uncompressed {} / compressed {}:{}",
            self.points.len(),
            point.out_offset,
            point.in_offset,
            point.bits
        );
        self.points.push(point);
    }
}
