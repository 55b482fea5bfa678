//! Resumable gzip decoding on top of miniz_oxide's inflater.
//!
//! The decoder keeps all of its state as owned data: read-ahead input with
//! the file offset it ends at, the inflater, and a ring of recent output that
//! back-references resolve against. It can therefore be parked between reads
//! and re-attached to a freshly opened descriptor.
//!
//! Inflating stops at every DEFLATE block boundary, which is where
//! checkpoints are taken. Decoding can start either at the beginning of the
//! file or at a [`Checkpoint`].

use super::checkpoint::{Checkpoint, CheckpointList};
use super::{IndexError, GZIP_MAGIC};
use crate::config::IndexConfig;
use miniz_oxide::inflate::core::{decompress, inflate_flags, BlockBoundaryState, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

/// Smallest output ring; must be a power of two
const MIN_RING_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Blocks,
    End,
}

/// Compressed bytes read ahead of the inflater
struct Input {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    /// File offset of `buf[end]`, the next byte the source yields
    next_read: u64,
}

impl Input {
    fn new(capacity: usize, file_pos: u64) -> Self {
        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            next_read: file_pos,
        }
    }

    /// File offset of the next unconsumed byte
    fn file_pos(&self) -> u64 {
        self.next_read - (self.end - self.start) as u64
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn consume(&mut self, n: usize) {
        self.start += n;
    }

    /// Move unconsumed bytes to the front and read more; returns bytes read
    fn refill<R: Read>(&mut self, src: &mut R) -> io::Result<usize> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        loop {
            match src.read(&mut self.buf[self.end..]) {
                Ok(n) => {
                    self.end += n;
                    self.next_read += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Up to `n` buffered bytes, reading more if fewer are available
    fn peek<R: Read>(&mut self, src: &mut R, n: usize) -> io::Result<&[u8]> {
        while self.end - self.start < n {
            if self.refill(src)? == 0 {
                break;
            }
        }
        let len = n.min(self.end - self.start);
        Ok(&self.buf[self.start..self.start + len])
    }
}

/// Byte reader over the read-ahead buffer, continuing into the source
struct Buffered<'a, R> {
    input: &'a mut Input,
    src: &'a mut R,
}

impl<R: Read> Read for Buffered<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.input.start == self.input.end && self.input.refill(self.src)? == 0 {
            return Ok(0);
        }
        let available = self.input.available();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.input.consume(n);
        Ok(n)
    }
}

/// Running CRC of a member decoded from its first byte
struct MemberCheck {
    crc: crc32fast::Hasher,
    start_out: u64,
}

pub(crate) struct Decoder {
    inflater: Box<DecompressorOxide>,
    input: Input,
    stage: Stage,
    first_member: bool,
    verify: bool,
    member: Option<MemberCheck>,

    /// Recent output; position `p` of the stream lives at `p % ring.len()`
    ring: Box<[u8]>,
    /// Uncompressed offset of the next byte the inflater produces
    out_pos: u64,
    /// Uncompressed offset of the next byte handed out
    out_ret: u64,
    window_size: usize,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("stage", &self.stage)
            .field("file_pos", &self.input.file_pos())
            .field("out_pos", &self.out_pos)
            .field("out_ret", &self.out_ret)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    /// Decoder positioned at the very start of the file
    pub fn at_start(config: &IndexConfig) -> Self {
        Self {
            inflater: Box::default(),
            input: Input::new(config.readbuf_size, 0),
            stage: Stage::Header,
            first_member: true,
            verify: config.verify_checksums,
            member: None,
            ring: vec![0; ring_size(config.window_size)].into_boxed_slice(),
            out_pos: 0,
            out_ret: 0,
            window_size: config.window_size,
        }
    }

    /// Decoder positioned at a checkpoint, reading from `src`.
    ///
    /// `window` is the output preceding the checkpoint. When the next block
    /// starts mid-byte, that byte is read back to recover its unread bits.
    pub fn at_checkpoint<R: Read + Seek>(
        src: &mut R,
        point: &Checkpoint,
        window: Vec<u8>,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        src.seek(SeekFrom::Start(point.in_offset))?;
        let mut in_offset = point.in_offset;
        let bit_buf = if point.bits != 0 {
            let mut byte = [0u8; 1];
            src.read_exact(&mut byte).map_err(|e| match e.kind() {
                ErrorKind::UnexpectedEof => truncated(),
                _ => IndexError::Io(e),
            })?;
            in_offset += 1;
            byte[0] >> (8 - point.bits)
        } else {
            0
        };
        let state = BlockBoundaryState {
            num_bits: point.bits,
            bit_buf,
            ..Default::default()
        };

        let mut decoder = Self {
            inflater: Box::new(DecompressorOxide::from_block_boundary_state(&state)),
            input: Input::new(config.readbuf_size, in_offset),
            stage: Stage::Blocks,
            first_member: false,
            verify: config.verify_checksums,
            member: None,
            ring: vec![0; ring_size(config.window_size)].into_boxed_slice(),
            out_pos: point.out_offset,
            out_ret: point.out_offset,
            window_size: config.window_size,
        };

        // The window ends right before `out_offset` in the ring
        let ring_len = decoder.ring.len() as u64;
        for (i, &byte) in window.iter().rev().enumerate() {
            let pos = (point.out_offset + ring_len - 1 - i as u64) % ring_len;
            decoder.ring[pos as usize] = byte;
        }
        Ok(decoder)
    }

    /// Position a source where this decoder continues reading
    pub fn attach<R: Seek>(&self, src: &mut R) -> Result<(), IndexError> {
        src.seek(SeekFrom::Start(self.input.next_read))?;
        Ok(())
    }

    /// Uncompressed offset of the next byte handed out
    pub fn position(&self) -> u64 {
        self.out_ret
    }

    /// Uncompressed bytes decoded so far
    pub fn total_out(&self) -> u64 {
        self.out_pos
    }

    /// Decoded bytes not yet handed out
    pub fn pending(&self) -> &[u8] {
        let start = (self.out_ret % self.ring.len() as u64) as usize;
        &self.ring[start..start + (self.out_pos - self.out_ret) as usize]
    }

    pub fn consume(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.out_pos - self.out_ret);
        self.out_ret += n as u64;
    }

    /// The end of the gzip stream has been decoded
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::End
    }

    /// Parse the pending member header, if the decoder is waiting on one
    pub fn read_header<R: Read>(&mut self, src: &mut R) -> Result<(), IndexError> {
        if self.stage == Stage::Header {
            self.step_header(src)?;
        }
        Ok(())
    }

    /// Decode until some output is pending or the stream ends.
    ///
    /// Pending output must have been consumed first, since the inflater
    /// writes over it.
    pub fn fill<R: Read>(
        &mut self,
        src: &mut R,
        points: &mut CheckpointList,
    ) -> Result<(), IndexError> {
        debug_assert!(self.pending().is_empty());
        while self.out_pos == self.out_ret && self.stage != Stage::End {
            match self.stage {
                Stage::Header => self.step_header(src)?,
                Stage::Blocks => self.step_blocks(src, points)?,
                Stage::End => {}
            }
        }

        points.advance(self.out_pos);
        if self.stage == Stage::End {
            points.finish(self.out_pos);
        }
        Ok(())
    }

    fn step_header<R: Read>(&mut self, src: &mut R) -> Result<(), IndexError> {
        let magic = self.input.peek(src, GZIP_MAGIC.len())?;
        if magic != GZIP_MAGIC {
            if self.first_member {
                return Err(IndexError::Corrupt("missing gzip magic".to_string()));
            }
            if !magic.is_empty() {
                log::warn!(
                    "ignoring trailing data after gzip member ending at uncompressed {}",
                    self.out_pos
                );
            }
            self.stage = Stage::End;
            return Ok(());
        }

        let header = gzip_header::read_gz_header(&mut Buffered {
            input: &mut self.input,
            src,
        })
        .map_err(header_error)?;
        log::trace!(
            "gzip member at uncompressed {} (mtime {}, name {:?})",
            self.out_pos,
            header.mtime(),
            header.filename().map(String::from_utf8_lossy)
        );

        self.first_member = false;
        self.inflater = Box::default();
        self.member = self.verify.then(|| MemberCheck {
            crc: crc32fast::Hasher::new(),
            start_out: self.out_pos,
        });
        self.stage = Stage::Blocks;
        Ok(())
    }

    fn step_blocks<R: Read>(
        &mut self,
        src: &mut R,
        points: &mut CheckpointList,
    ) -> Result<(), IndexError> {
        if self.input.available().is_empty() {
            self.input.refill(src)?;
        }
        let mut flags = inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY;
        if !self.input.available().is_empty() {
            flags |= inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        }

        let ring_pos = (self.out_pos % self.ring.len() as u64) as usize;
        let (status, consumed, produced) = decompress(
            &mut self.inflater,
            self.input.available(),
            &mut self.ring,
            ring_pos,
            flags,
        );
        self.input.consume(consumed);
        if let Some(check) = self.member.as_mut() {
            check.crc.update(&self.ring[ring_pos..ring_pos + produced]);
        }
        self.out_pos += produced as u64;

        match status {
            TINFLStatus::HasMoreOutput => Ok(()),
            TINFLStatus::NeedsMoreInput => {
                self.input.refill(src)?;
                Ok(())
            }
            TINFLStatus::BlockBoundary => self.offer_checkpoint(points),
            TINFLStatus::Done => self.finish_member(src),
            TINFLStatus::FailedCannotMakeProgress => Err(truncated()),
            status => Err(IndexError::Corrupt(format!(
                "invalid deflate data ({:?}) near compressed offset {}",
                status,
                self.input.file_pos()
            ))),
        }
    }

    fn offer_checkpoint(&mut self, points: &mut CheckpointList) -> Result<(), IndexError> {
        points.advance(self.out_pos);
        if !points.due(self.out_pos) {
            return Ok(());
        }

        let bits = self
            .inflater
            .block_boundary_state()
            .map_or(0, |state| state.num_bits);
        // Unread bits live in the byte before the input cursor
        let in_offset = self.input.file_pos() - u64::from(bits != 0);
        points.offer(self.out_pos, in_offset, bits, &self.window());
        Ok(())
    }

    /// Last `window_size` bytes of output, fewer near the start of the stream
    fn window(&self) -> Vec<u8> {
        let ring_len = self.ring.len() as u64;
        let len = self.out_pos.min(self.window_size as u64);
        let start = ((self.out_pos - len) % ring_len) as usize;
        let end = start + len as usize;
        if end <= self.ring.len() {
            self.ring[start..end].to_vec()
        } else {
            let mut window = Vec::with_capacity(len as usize);
            window.extend_from_slice(&self.ring[start..]);
            window.extend_from_slice(&self.ring[..end - self.ring.len()]);
            window
        }
    }

    /// Check the member trailer and look for another member
    fn finish_member<R: Read>(&mut self, src: &mut R) -> Result<(), IndexError> {
        let mut trailer = [0u8; 8];
        Buffered {
            input: &mut self.input,
            src,
        }
        .read_exact(&mut trailer)
        .map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => truncated(),
            _ => IndexError::Io(e),
        })?;
        let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let expected_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

        if let Some(check) = self.member.take() {
            let crc = check.crc.finalize();
            if crc != expected_crc {
                return Err(IndexError::Corrupt(format!(
                    "CRC mismatch: trailer {:08x}, computed {:08x}",
                    expected_crc, crc
                )));
            }
            // ISIZE holds the member length modulo 2^32
            let size = (self.out_pos - check.start_out) as u32;
            if size != expected_size {
                return Err(IndexError::Corrupt(format!(
                    "length mismatch: trailer {}, decoded {}",
                    expected_size, size
                )));
            }
        }

        self.stage = Stage::Header;
        Ok(())
    }
}

/// Ring size for a window: a power of two holding at least two windows
fn ring_size(window_size: usize) -> usize {
    (window_size * 2).next_power_of_two().max(MIN_RING_SIZE)
}

fn truncated() -> IndexError {
    IndexError::Corrupt("unexpected end of compressed data".to_string())
}

fn header_error(e: io::Error) -> IndexError {
    match e.kind() {
        ErrorKind::UnexpectedEof => IndexError::Corrupt("truncated gzip header".to_string()),
        ErrorKind::InvalidInput | ErrorKind::InvalidData => {
            IndexError::Corrupt(format!("bad gzip header: {}", e))
        }
        _ => IndexError::Io(e),
    }
}
