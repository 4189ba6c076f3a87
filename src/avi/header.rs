//! Fixed-size AVI header.
//!
//! The header occupies the first [`AVI_HEADER_LEN`] bytes of every clip. It
//! is written twice: as a placeholder when the clip is opened and with the
//! real counts when it is closed. The audio stream list is always reserved;
//! when a clip has no audio it is overwritten by a `JUNK` chunk of the same
//! size so the header length never changes.

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::format::FourCC;
use crate::errors::DvrError;

/// Total bytes reserved for the header, ending with the `movi` list header
pub const AVI_HEADER_LEN: usize = 324;

const HDRL_LEN: u32 = 292;
const VIDEO_STRL_LEN: u32 = 116;
const AUDIO_STRL_LEN: u32 = 92;
const AUDIO_STRL_AT: usize = 212;
const MOVI_LIST_AT: usize = 312;

const AVIF_HASINDEX: u32 = 0x10;

/// PCM format of an audio track carried in a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn bytes_per_sec(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Audio track description: its format and byte length inside the movie list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub format: AudioFormat,
    pub data_len: u32,
}

/// Values stored in (or recovered from) the clip header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AviHeaderInfo {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    /// Bytes of chunks inside the movie list, excluding the `movi` fourcc
    pub movi_len: u32,
    /// Bytes of the `idx1` chunk including its own header
    pub index_len: u32,
    pub audio: Option<AudioTrack>,
}

impl AviHeaderInfo {
    /// Header written as filler when a clip is opened
    pub fn placeholder(fps: u32, width: u32, height: u32) -> Self {
        Self {
            fps,
            width,
            height,
            frame_count: 0,
            movi_len: 0,
            index_len: 0,
            audio: None,
        }
    }

    /// Total file length this header describes
    pub fn file_len(&self) -> u64 {
        AVI_HEADER_LEN as u64 + self.movi_len as u64 + self.index_len as u64
    }

    /// Encode into the first [`AVI_HEADER_LEN`] bytes of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        let mut w = HeaderCursor::new(&mut buf[..AVI_HEADER_LEN]);
        let fps = self.fps.max(1);
        let riff_len = 4 + (8 + HDRL_LEN) + 12 + self.movi_len + self.index_len;

        w.fourcc(b"RIFF");
        w.u32(riff_len);
        w.fourcc(b"AVI ");

        w.fourcc(b"LIST");
        w.u32(HDRL_LEN);
        w.fourcc(b"hdrl");

        w.fourcc(b"avih");
        w.u32(56);
        w.u32(1_000_000 / fps);
        let max_bytes_per_sec = if self.frame_count > 0 {
            (self.movi_len as u64 * fps as u64 / self.frame_count as u64) as u32
        } else {
            0
        };
        w.u32(max_bytes_per_sec);
        w.u32(0);
        w.u32(AVIF_HASINDEX);
        w.u32(self.frame_count);
        w.u32(0);
        w.u32(if self.audio.is_some() { 2 } else { 1 });
        w.u32(0);
        w.u32(self.width);
        w.u32(self.height);
        w.zeros(16);

        // video stream list
        w.fourcc(b"LIST");
        w.u32(VIDEO_STRL_LEN);
        w.fourcc(b"strl");
        w.fourcc(b"strh");
        w.u32(56);
        w.fourcc(b"vids");
        w.fourcc(b"MJPG");
        w.u32(0);
        w.u16(0);
        w.u16(0);
        w.u32(0);
        w.u32(1);
        w.u32(fps);
        w.u32(0);
        w.u32(self.frame_count);
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.u16(0);
        w.u16(0);
        w.u16(self.width as u16);
        w.u16(self.height as u16);
        w.fourcc(b"strf");
        w.u32(40);
        w.u32(40);
        w.u32(self.width);
        w.u32(self.height);
        w.u16(1);
        w.u16(24);
        w.fourcc(b"MJPG");
        w.u32(self.width * self.height * 3);
        w.zeros(16);

        debug_assert_eq!(w.pos, AUDIO_STRL_AT);
        match &self.audio {
            Some(track) => {
                let fmt = track.format;
                let align = fmt.block_align().max(1);
                w.fourcc(b"LIST");
                w.u32(AUDIO_STRL_LEN);
                w.fourcc(b"strl");
                w.fourcc(b"strh");
                w.u32(56);
                w.fourcc(b"auds");
                w.u32(0);
                w.u32(0);
                w.u16(0);
                w.u16(0);
                w.u32(0);
                w.u32(1);
                w.u32(fmt.sample_rate);
                w.u32(0);
                w.u32(track.data_len / align as u32);
                w.u32(0);
                w.u32(0);
                w.u32(align as u32);
                w.zeros(8);
                w.fourcc(b"strf");
                w.u32(16);
                w.u16(1);
                w.u16(fmt.channels);
                w.u32(fmt.sample_rate);
                w.u32(fmt.bytes_per_sec());
                w.u16(align);
                w.u16(fmt.bits_per_sample);
            }
            None => {
                w.fourcc(b"JUNK");
                w.u32(AUDIO_STRL_LEN);
                w.zeros(AUDIO_STRL_LEN as usize);
            }
        }

        debug_assert_eq!(w.pos, MOVI_LIST_AT);
        w.fourcc(b"LIST");
        w.u32(4 + self.movi_len);
        w.fourcc(b"movi");
        debug_assert_eq!(w.pos, AVI_HEADER_LEN);
    }

    pub fn encode(&self) -> [u8; AVI_HEADER_LEN] {
        let mut buf = [0u8; AVI_HEADER_LEN];
        self.encode_into(&mut buf);
        buf
    }

    /// Recover header values from the first [`AVI_HEADER_LEN`] bytes of a clip
    pub fn parse(buf: &[u8]) -> Result<Self, DvrError> {
        if buf.len() < AVI_HEADER_LEN {
            return Err(DvrError::MuxingError(format!(
                "header needs {} bytes, got {}",
                AVI_HEADER_LEN,
                buf.len()
            )));
        }
        let fourcc_at = |at: usize| -> &[u8] { &buf[at..at + 4] };
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);

        if fourcc_at(0) != b"RIFF" || fourcc_at(8) != b"AVI " || fourcc_at(20) != b"hdrl" {
            return Err(DvrError::MuxingError("not an AVI header".to_string()));
        }
        if fourcc_at(MOVI_LIST_AT) != b"LIST" || fourcc_at(MOVI_LIST_AT + 8) != b"movi" {
            return Err(DvrError::MuxingError("movie list not found after header".to_string()));
        }

        let riff_len = u32_at(4);
        let frame_count = u32_at(24 + 8 + 16);
        let width = u32_at(24 + 8 + 32);
        let height = u32_at(24 + 8 + 36);
        // video strh: rate sits after type, handler, flags, priority/lang, initial, scale
        let strh = 100 + 8;
        let scale = u32_at(strh + 20).max(1);
        let rate = u32_at(strh + 24);
        let movi_len = u32_at(MOVI_LIST_AT + 4).saturating_sub(4);
        let index_len = riff_len.saturating_sub(4 + (8 + HDRL_LEN) + 12 + movi_len);

        let audio = if fourcc_at(AUDIO_STRL_AT) == b"LIST" {
            let a_strh = AUDIO_STRL_AT + 12 + 8;
            let a_strf = AUDIO_STRL_AT + 12 + 64 + 8;
            let format = AudioFormat {
                sample_rate: u32_at(a_strf + 4),
                channels: u16_at(a_strf + 2),
                bits_per_sample: u16_at(a_strf + 14),
            };
            let length = u32_at(a_strh + 32);
            Some(AudioTrack {
                format,
                data_len: length * format.block_align().max(1) as u32,
            })
        } else {
            None
        };

        Ok(Self {
            fps: rate / scale,
            width,
            height,
            frame_count,
            movi_len,
            index_len,
            audio,
        })
    }
}

struct HeaderCursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn fourcc(&mut self, code: &FourCC) {
        self.put(code);
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn zeros(&mut self, n: usize) {
        self.buf[self.pos..self.pos + n].fill(0);
        self.pos += n;
    }
}

/// Header scratch space shared by every muxing session.
///
/// Building the header into the scratch and writing it out happen under one
/// lock, so a clip and a time-lapse closing at the same moment can never
/// interleave their header bytes.
pub struct HeaderScratch {
    scratch: Mutex<[u8; AVI_HEADER_LEN]>,
}

impl HeaderScratch {
    pub fn new() -> Self {
        Self {
            scratch: Mutex::new([0u8; AVI_HEADER_LEN]),
        }
    }

    /// Build the header for `info` and write it at offset 0 of `out`
    pub fn emit<W: Write + Seek + ?Sized>(&self, out: &mut W, info: &AviHeaderInfo) -> io::Result<()> {
        let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
        info.encode_into(&mut scratch[..]);
        out.seek(SeekFrom::Start(0))?;
        out.write_all(&scratch[..])?;
        out.flush()
    }
}

impl Default for HeaderScratch {
    fn default() -> Self {
        Self::new()
    }
}
