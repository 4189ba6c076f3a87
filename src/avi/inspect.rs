//! Read-side summary of a stored clip: parsed name, header values and index.

use std::io::{Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

use super::format::CHUNK_HDR;
use super::header::{AviHeaderInfo, AVI_HEADER_LEN};
use super::index::{AviIndex, IndexEntry, StreamKind};
use super::naming::ClipName;
use crate::errors::DvrError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipSummary {
    pub path: String,
    /// `None` when the file name does not follow the clip naming scheme
    pub name: Option<ClipName>,
    pub header: AviHeaderInfo,
    pub index: Vec<IndexEntry>,
}

impl ClipSummary {
    pub fn video_frames(&self) -> usize {
        self.index
            .iter()
            .filter(|e| e.kind == StreamKind::Video)
            .count()
    }

    pub fn video_bytes(&self) -> u64 {
        self.index
            .iter()
            .filter(|e| e.kind == StreamKind::Video)
            .map(|e| e.size as u64)
            .sum()
    }

    pub fn audio_bytes(&self) -> u64 {
        self.index
            .iter()
            .filter(|e| e.kind == StreamKind::Audio)
            .map(|e| e.size as u64)
            .sum()
    }

    pub fn frame_sizes(&self) -> Vec<u32> {
        self.index
            .iter()
            .filter(|e| e.kind == StreamKind::Video)
            .map(|e| e.size)
            .collect()
    }
}

/// Read the header and `idx1` index of a finalized clip
pub fn inspect<R: Read + Seek + ?Sized>(reader: &mut R, path: &str) -> Result<ClipSummary, DvrError> {
    let mut head = [0u8; AVI_HEADER_LEN];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut head)?;
    let header = AviHeaderInfo::parse(&head)?;

    let index = if header.index_len as usize >= CHUNK_HDR {
        reader.seek(SeekFrom::Start(AVI_HEADER_LEN as u64 + header.movi_len as u64))?;
        let mut chunk = [0u8; CHUNK_HDR];
        reader.read_exact(&mut chunk)?;
        if &chunk[..4] != b"idx1" {
            return Err(DvrError::MuxingError(format!(
                "{}: expected idx1 after movie list",
                path
            )));
        }
        let len = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        let body_start = reader.stream_position()?;
        let remaining = reader.seek(SeekFrom::End(0))?.saturating_sub(body_start);
        let declared = header.index_len as u64 - CHUNK_HDR as u64;
        if len > remaining || len > declared {
            return Err(DvrError::MuxingError(format!(
                "{}: index of {} bytes exceeds file ({} left, {} declared)",
                path, len, remaining, declared
            )));
        }
        reader.seek(SeekFrom::Start(body_start))?;
        let mut body = vec![0u8; len as usize];
        reader.read_exact(&mut body)?;
        AviIndex::parse(&body)?
    } else {
        Vec::new()
    };

    Ok(ClipSummary {
        path: path.to_string(),
        name: ClipName::parse(path).ok(),
        header,
        index,
    })
}
