//! Ring-buffer AVI writer.
//!
//! Chunks are staged in a RAM buffer of twice the flush size. Whenever the
//! write cursor (`high_point`) reaches `ram_size`, exactly `ram_size` bytes
//! are written to storage and the overflow is moved back to the start, so
//! storage only ever sees full blocks until the tail is flushed on close.
//! The buffer is allocated once and reused for every clip.

use std::io::Write;
use std::time::Instant;

use crate::avi::index::INDEX_ENTRY_LEN;
use crate::avi::{
    pad4, AudioTrack, AviHeaderInfo, AviIndex, ChunkHeader, HeaderScratch, StreamKind,
    AVI_HEADER_LEN, CHUNK_HDR, FIRST_CHUNK_OFFSET,
};
use crate::check_invariant;
use crate::collaborators::AncillaryStream;
use crate::errors::DvrError;
use crate::storage::StorageFile;

use super::config::WriterStats;

const ZEROS: [u8; 4] = [0; 4];

pub struct AviWriter {
    ram_size: usize,
    buf: Vec<u8>,
    high_point: usize,
    file: Option<Box<dyn StorageFile>>,
    index: AviIndex,
    /// Offset of the next chunk, relative to the `movi` fourcc
    movi_pos: u32,
    frames: u32,
    stats: WriterStats,
}

impl AviWriter {
    /// `ram_size` is the storage block size; it must exceed the header and
    /// be at least the largest frame plus a chunk header.
    pub fn new(ram_size: usize) -> Self {
        Self {
            ram_size,
            buf: vec![0u8; ram_size * 2],
            high_point: 0,
            file: None,
            index: AviIndex::new(),
            movi_pos: FIRST_CHUNK_OFFSET,
            frames: 0,
            stats: WriterStats::default(),
        }
    }

    pub fn ram_size(&self) -> usize {
        self.ram_size
    }

    /// Largest frame that fits the single-flush-boundary rule
    pub fn max_frame_len(&self) -> usize {
        self.ram_size - CHUNK_HDR
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn high_point(&self) -> usize {
        self.high_point
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn index(&self) -> &AviIndex {
        &self.index
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Bytes of chunks written into the movie list so far
    pub fn movi_len(&self) -> u32 {
        self.movi_pos - FIRST_CHUNK_OFFSET
    }

    /// Start a new clip on `file`, reserving the header with a placeholder
    pub fn begin(&mut self, file: Box<dyn StorageFile>, placeholder: &AviHeaderInfo) {
        placeholder.encode_into(&mut self.buf[..AVI_HEADER_LEN]);
        self.high_point = AVI_HEADER_LEN;
        self.file = Some(file);
        self.index.clear();
        self.movi_pos = FIRST_CHUNK_OFFSET;
        self.frames = 0;
        self.stats = WriterStats::default();
    }

    /// Append one video frame. Returns false if the frame was rejected.
    pub fn append_frame(&mut self, jpeg: &[u8]) -> bool {
        if !self.is_open() {
            return false;
        }
        if jpeg.is_empty() || jpeg.len() > self.max_frame_len() {
            log::warn!(
                "Frame of {} bytes does not fit a {} byte block, dropped",
                jpeg.len(),
                self.ram_size
            );
            self.stats.rejected_frames += 1;
            return false;
        }

        let started = Instant::now();
        let len = jpeg.len();
        self.put_small(&ChunkHeader::video(len as u32).encode());
        self.put_payload(jpeg);
        self.put_small(&ZEROS[..pad4(len) - len]);
        self.index.push(StreamKind::Video, self.movi_pos, len as u32);
        self.movi_pos += (CHUNK_HDR + pad4(len)) as u32;
        self.frames += 1;
        self.stats.video_bytes += len as u64;
        self.stats.buffer_ms += started.elapsed().as_millis() as u64;
        true
    }

    /// Drain an ancillary stream into one trailing chunk after the frames.
    ///
    /// Returns the payload length, 0 when the stream had nothing.
    pub fn append_ancillary(&mut self, stream: &dyn AncillaryStream) -> u32 {
        if !self.is_open() {
            return 0;
        }
        let announced = stream.finish() as usize;
        if announced == 0 {
            return 0;
        }

        self.put_small(&ChunkHeader::audio(announced as u32).encode());
        let mut remaining = announced;
        while remaining > 0 {
            let room = (self.ram_size - self.high_point).min(remaining);
            let hp = self.high_point;
            let n = stream.drain_into(&mut self.buf[hp..hp + room]).min(room);
            if n == 0 {
                break;
            }
            self.advance(n);
            remaining -= n;
        }
        if remaining > 0 {
            log::warn!("Ancillary stream short by {} bytes, zero filled", remaining);
            while remaining > 0 {
                let room = (self.ram_size - self.high_point).min(remaining);
                let hp = self.high_point;
                self.buf[hp..hp + room].fill(0);
                self.advance(room);
                remaining -= room;
            }
        }
        self.put_small(&ZEROS[..pad4(announced) - announced]);
        self.index.push(StreamKind::Audio, self.movi_pos, announced as u32);
        self.movi_pos += (CHUNK_HDR + pad4(announced)) as u32;
        announced as u32
    }

    /// Flush the tail, write the index and the final header, and close the
    /// file. `info` supplies rate, size and audio; lengths are filled in here.
    pub fn finish(
        &mut self,
        scratch: &HeaderScratch,
        mut info: AviHeaderInfo,
    ) -> Result<WriterStats, DvrError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| DvrError::MuxingError("no clip open".to_string()))?;

        let started = Instant::now();
        if self.high_point > 0 {
            file.write_all(&self.buf[..self.high_point])?;
            self.stats.tail_bytes = self.high_point as u64;
            self.high_point = 0;
        }

        file.write_all(&self.index.chunk_header())?;
        let mut done = 0;
        while done < self.index.len() {
            let n = self.index.encode_entries(done, &mut self.buf[..self.ram_size]);
            file.write_all(&self.buf[..n * INDEX_ENTRY_LEN])?;
            done += n;
        }

        info.movi_len = self.movi_len();
        info.index_len = self.index.chunk_len() as u32;
        if let Some(AudioTrack { data_len, .. }) = info.audio {
            if data_len == 0 {
                info.audio = None;
            }
        }
        scratch.emit(&mut *file, &info)?;
        self.stats.write_ms += started.elapsed().as_millis() as u64;
        self.stats.file_bytes = info.file_len();
        Ok(self.stats.clone())
    }

    /// Drop the open clip without finalizing it
    pub fn abandon(&mut self) {
        self.file = None;
        self.high_point = 0;
    }

    /// Write up to 8 bytes at the cursor, which always fits the overflow half
    fn put_small(&mut self, bytes: &[u8]) {
        let hp = self.high_point;
        self.buf[hp..hp + bytes.len()].copy_from_slice(bytes);
        self.high_point += bytes.len();
        check_invariant!(
            self.high_point < 2 * self.ram_size,
            "Ring cursor stays below twice the block size",
            "AviWriter::put_small"
        );
        if self.high_point >= self.ram_size {
            self.flush_block();
            let overflow = self.high_point - self.ram_size;
            self.buf.copy_within(self.ram_size..self.high_point, 0);
            self.high_point = overflow;
        }
    }

    fn put_payload(&mut self, mut data: &[u8]) {
        while data.len() >= self.ram_size - self.high_point {
            let n = self.ram_size - self.high_point;
            let hp = self.high_point;
            self.buf[hp..self.ram_size].copy_from_slice(&data[..n]);
            self.high_point = self.ram_size;
            self.flush_block();
            self.high_point = 0;
            data = &data[n..];
        }
        let hp = self.high_point;
        self.buf[hp..hp + data.len()].copy_from_slice(data);
        self.high_point += data.len();
        check_invariant!(
            self.high_point < self.ram_size,
            "Ring cursor collapses below the block size",
            "AviWriter::put_payload"
        );
    }

    /// Move the cursor past `n` bytes already placed in the buffer
    fn advance(&mut self, n: usize) {
        self.high_point += n;
        if self.high_point == self.ram_size {
            self.flush_block();
            self.high_point = 0;
        }
    }

    /// Write the first `ram_size` bytes of the buffer to storage.
    ///
    /// A failed write is logged and counted; the cursor moves on regardless.
    fn flush_block(&mut self) {
        let started = Instant::now();
        let Some(file) = self.file.as_mut() else {
            return;
        };
        match file.write_all(&self.buf[..self.ram_size]) {
            Ok(()) => {
                self.stats.block_flushes += 1;
                self.stats.block_bytes += self.ram_size as u64;
            }
            Err(e) => {
                self.stats.write_errors += 1;
                log::warn!("Storage write of {} bytes failed: {}", self.ram_size, e);
            }
        }
        let ms = started.elapsed().as_millis() as u64;
        self.stats.write_ms += ms;
        log::trace!("Block write took {} ms", ms);
    }
}
