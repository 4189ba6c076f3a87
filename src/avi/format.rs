//! Low-level RIFF/AVI primitives: fourcc codes, chunk headers, padding and
//! the frame-size table that names resolutions in clip file names.

use serde::{Deserialize, Serialize};

/// Size of a chunk header: 4-byte marker plus 4-byte little-endian length
pub const CHUNK_HDR: usize = 8;

/// Four character code as stored on disk
pub type FourCC = [u8; 4];

/// Compressed video frame chunk id (stream 0)
pub const VIDEO_MARKER: FourCC = *b"00dc";
/// Audio chunk id (stream 1)
pub const AUDIO_MARKER: FourCC = *b"01wb";

/// Round a payload length up to the next 4-byte boundary
#[inline]
pub fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Number of filler bytes needed after a payload of `len` bytes
#[inline]
pub fn filler(len: usize) -> usize {
    pad4(len) - len
}

/// Header in front of every chunk in the movie list.
///
/// `len` is the true payload length; the payload that follows is padded to
/// a 4-byte boundary and the padding is not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub marker: FourCC,
    pub len: u32,
}

impl ChunkHeader {
    pub fn video(len: u32) -> Self {
        Self {
            marker: VIDEO_MARKER,
            len,
        }
    }

    pub fn audio(len: u32) -> Self {
        Self {
            marker: AUDIO_MARKER,
            len,
        }
    }

    pub fn encode(&self) -> [u8; CHUNK_HDR] {
        let mut out = [0u8; CHUNK_HDR];
        out[..4].copy_from_slice(&self.marker);
        out[4..].copy_from_slice(&self.len.to_le_bytes());
        out
    }

    /// Decode a header from the first 8 bytes of `bytes`.
    ///
    /// Returns `None` when fewer than 8 bytes are available.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CHUNK_HDR {
            return None;
        }
        let mut marker = [0u8; 4];
        marker.copy_from_slice(&bytes[..4]);
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Some(Self { marker, len })
    }

    pub fn is_video(&self) -> bool {
        self.marker == VIDEO_MARKER
    }

    /// Payload plus filler, i.e. the bytes that follow this header on disk
    pub fn padded_len(&self) -> usize {
        pad4(self.len as usize)
    }
}

/// Named camera resolutions.
///
/// The tag is embedded in clip file names, so none of them may contain
/// the `_` separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameSize {
    #[serde(rename = "96X96")]
    Square96,
    #[serde(rename = "QQVGA")]
    Qqvga,
    #[serde(rename = "QCIF")]
    Qcif,
    #[serde(rename = "HQVGA")]
    Hqvga,
    #[serde(rename = "240X240")]
    Square240,
    #[serde(rename = "QVGA")]
    Qvga,
    #[serde(rename = "CIF")]
    Cif,
    #[serde(rename = "HVGA")]
    Hvga,
    #[serde(rename = "VGA")]
    Vga,
    #[serde(rename = "SVGA")]
    Svga,
    #[serde(rename = "XGA")]
    Xga,
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "SXGA")]
    Sxga,
    #[serde(rename = "UXGA")]
    Uxga,
    #[serde(rename = "FHD")]
    Fhd,
    #[serde(rename = "QXGA")]
    Qxga,
    #[serde(rename = "QHD")]
    Qhd,
    #[serde(rename = "WQXGA")]
    Wqxga,
    #[serde(rename = "QSXGA")]
    Qsxga,
}

impl FrameSize {
    pub const ALL: [FrameSize; 19] = [
        FrameSize::Square96,
        FrameSize::Qqvga,
        FrameSize::Qcif,
        FrameSize::Hqvga,
        FrameSize::Square240,
        FrameSize::Qvga,
        FrameSize::Cif,
        FrameSize::Hvga,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Xga,
        FrameSize::Hd,
        FrameSize::Sxga,
        FrameSize::Uxga,
        FrameSize::Fhd,
        FrameSize::Qxga,
        FrameSize::Qhd,
        FrameSize::Wqxga,
        FrameSize::Qsxga,
    ];

    /// Tag used in file names
    pub fn tag(&self) -> &'static str {
        match self {
            FrameSize::Square96 => "96X96",
            FrameSize::Qqvga => "QQVGA",
            FrameSize::Qcif => "QCIF",
            FrameSize::Hqvga => "HQVGA",
            FrameSize::Square240 => "240X240",
            FrameSize::Qvga => "QVGA",
            FrameSize::Cif => "CIF",
            FrameSize::Hvga => "HVGA",
            FrameSize::Vga => "VGA",
            FrameSize::Svga => "SVGA",
            FrameSize::Xga => "XGA",
            FrameSize::Hd => "HD",
            FrameSize::Sxga => "SXGA",
            FrameSize::Uxga => "UXGA",
            FrameSize::Fhd => "FHD",
            FrameSize::Qxga => "QXGA",
            FrameSize::Qhd => "QHD",
            FrameSize::Wqxga => "WQXGA",
            FrameSize::Qsxga => "QSXGA",
        }
    }

    /// (width, height) in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            FrameSize::Square96 => (96, 96),
            FrameSize::Qqvga => (160, 120),
            FrameSize::Qcif => (176, 144),
            FrameSize::Hqvga => (240, 176),
            FrameSize::Square240 => (240, 240),
            FrameSize::Qvga => (320, 240),
            FrameSize::Cif => (400, 296),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Xga => (1024, 768),
            FrameSize::Hd => (1280, 720),
            FrameSize::Sxga => (1280, 1024),
            FrameSize::Uxga => (1600, 1200),
            FrameSize::Fhd => (1920, 1080),
            FrameSize::Qxga => (2048, 1536),
            FrameSize::Qhd => (2560, 1440),
            FrameSize::Wqxga => (2560, 1600),
            FrameSize::Qsxga => (2560, 1920),
        }
    }

    /// Sensor frame rate that this resolution sustains by default
    pub fn default_fps(&self) -> u32 {
        match self {
            FrameSize::Square96
            | FrameSize::Qqvga
            | FrameSize::Qcif
            | FrameSize::Hqvga
            | FrameSize::Square240
            | FrameSize::Qvga => 25,
            FrameSize::Cif | FrameSize::Hvga | FrameSize::Vga => 20,
            FrameSize::Svga => 10,
            FrameSize::Xga | FrameSize::Hd | FrameSize::Sxga => 5,
            FrameSize::Uxga | FrameSize::Fhd => 3,
            FrameSize::Qxga | FrameSize::Qhd | FrameSize::Wqxga | FrameSize::Qsxga => 2,
        }
    }

    /// Largest JPEG this resolution is expected to produce
    pub fn max_jpeg_bytes(&self) -> usize {
        let (w, h) = self.dimensions();
        (w as usize * h as usize) / 5
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|fs| fs.tag() == tag)
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        FrameSize::Svga
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
