//! `idx1` frame index.
//!
//! One 16-byte entry per chunk in the movie list: chunk id, flags, offset
//! relative to the `movi` fourcc, and the unpadded payload size.

use serde::{Deserialize, Serialize};

use super::format::{FourCC, AUDIO_MARKER, CHUNK_HDR, VIDEO_MARKER};
use crate::check_invariant;
use crate::errors::DvrError;

pub const INDEX_ENTRY_LEN: usize = 16;

const AVIIF_KEYFRAME: u32 = 0x10;

/// Offset of the first chunk, counted from the `movi` fourcc
pub const FIRST_CHUNK_OFFSET: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn marker(&self) -> FourCC {
        match self {
            StreamKind::Video => VIDEO_MARKER,
            StreamKind::Audio => AUDIO_MARKER,
        }
    }

    fn from_marker(marker: &[u8]) -> Option<Self> {
        if marker == VIDEO_MARKER {
            Some(StreamKind::Video)
        } else if marker == AUDIO_MARKER {
            Some(StreamKind::Audio)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: StreamKind,
    pub offset: u32,
    pub size: u32,
}

impl IndexEntry {
    pub fn encode(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut out = [0u8; INDEX_ENTRY_LEN];
        out[..4].copy_from_slice(&self.kind.marker());
        let flags = match self.kind {
            StreamKind::Video => AVIIF_KEYFRAME,
            StreamKind::Audio => 0,
        };
        out[4..8].copy_from_slice(&flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.offset.to_le_bytes());
        out[12..16].copy_from_slice(&self.size.to_le_bytes());
        out
    }
}

/// Append-only index built while a clip is open
#[derive(Debug, Default)]
pub struct AviIndex {
    entries: Vec<IndexEntry>,
}

impl AviIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(frames: usize) -> Self {
        Self {
            entries: Vec::with_capacity(frames),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push(&mut self, kind: StreamKind, offset: u32, size: u32) {
        if let Some(last) = self.entries.last() {
            check_invariant!(
                offset > last.offset,
                "Index offsets are strictly increasing",
                "AviIndex::push"
            );
        }
        self.entries.push(IndexEntry { kind, offset, size });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn video_frames(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == StreamKind::Video)
            .count()
    }

    /// Length of the whole `idx1` chunk including its header
    pub fn chunk_len(&self) -> usize {
        CHUNK_HDR + self.entries.len() * INDEX_ENTRY_LEN
    }

    /// The `idx1` chunk header
    pub fn chunk_header(&self) -> [u8; CHUNK_HDR] {
        let mut out = [0u8; CHUNK_HDR];
        out[..4].copy_from_slice(b"idx1");
        out[4..].copy_from_slice(&((self.entries.len() * INDEX_ENTRY_LEN) as u32).to_le_bytes());
        out
    }

    /// Encode entries starting at `from` into `out`, as many as fit.
    ///
    /// Returns the number of entries written.
    pub fn encode_entries(&self, from: usize, out: &mut [u8]) -> usize {
        let room = out.len() / INDEX_ENTRY_LEN;
        let batch = &self.entries[from.min(self.entries.len())..];
        let n = batch.len().min(room);
        for (slot, entry) in out.chunks_exact_mut(INDEX_ENTRY_LEN).zip(&batch[..n]) {
            slot.copy_from_slice(&entry.encode());
        }
        n
    }

    /// Parse the body of an `idx1` chunk (without its 8-byte header)
    pub fn parse(body: &[u8]) -> Result<Vec<IndexEntry>, DvrError> {
        if body.len() % INDEX_ENTRY_LEN != 0 {
            return Err(DvrError::MuxingError(format!(
                "index length {} is not a multiple of {}",
                body.len(),
                INDEX_ENTRY_LEN
            )));
        }
        body.chunks_exact(INDEX_ENTRY_LEN)
            .map(|raw| {
                let kind = StreamKind::from_marker(&raw[..4]).ok_or_else(|| {
                    DvrError::MuxingError(format!("unknown index chunk id {:?}", &raw[..4]))
                })?;
                Ok(IndexEntry {
                    kind,
                    offset: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
                    size: u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_encode_and_parse() {
        let mut index = AviIndex::new();
        index.push(StreamKind::Video, FIRST_CHUNK_OFFSET, 1021);
        index.push(StreamKind::Video, FIRST_CHUNK_OFFSET + 8 + 1024, 2000);
        index.push(StreamKind::Audio, FIRST_CHUNK_OFFSET + 8 + 1024 + 8 + 2000, 640);

        let mut body = vec![0u8; index.len() * INDEX_ENTRY_LEN];
        assert_eq!(index.encode_entries(0, &mut body), 3);
        assert_eq!(&body[..4], b"00dc");
        assert_eq!(&body[4..8], &0x10u32.to_le_bytes());
        assert_eq!(&body[32..36], b"01wb");

        let parsed = AviIndex::parse(&body).unwrap();
        assert_eq!(parsed, index.entries());
        assert_eq!(index.video_frames(), 2);
    }

    #[test]
    fn test_encode_entries_in_batches() {
        let mut index = AviIndex::new();
        for i in 0..10u32 {
            index.push(StreamKind::Video, 4 + i * 100, 90);
        }
        let mut small = [0u8; INDEX_ENTRY_LEN * 4];
        let mut done = 0;
        let mut batches = 0;
        while done < index.len() {
            done += index.encode_entries(done, &mut small);
            batches += 1;
        }
        assert_eq!(batches, 3);
        assert_eq!(index.chunk_len(), 8 + 160);
        assert_eq!(&index.chunk_header()[4..], &160u32.to_le_bytes());
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_non_monotonic_offset_is_rejected() {
        let mut index = AviIndex::new();
        index.push(StreamKind::Video, 100, 10);
        index.push(StreamKind::Video, 100, 10);
    }

    #[test]
    fn test_parse_rejects_unknown_ids() {
        let mut raw = [0u8; INDEX_ENTRY_LEN];
        raw[..4].copy_from_slice(b"JUNK");
        assert!(AviIndex::parse(&raw).is_err());
        assert!(AviIndex::parse(&raw[..10]).is_err());
    }
}
