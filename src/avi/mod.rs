//! MJPEG AVI container: chunk codec, fixed-size header, `idx1` index and
//! the clip naming scheme shared by recording and playback.

pub mod format;
pub mod header;
pub mod index;
pub mod inspect;
pub mod naming;

pub use format::{pad4, ChunkHeader, FourCC, FrameSize, AUDIO_MARKER, CHUNK_HDR, VIDEO_MARKER};
pub use header::{AudioFormat, AudioTrack, AviHeaderInfo, HeaderScratch, AVI_HEADER_LEN};
pub use index::{AviIndex, IndexEntry, StreamKind, FIRST_CHUNK_OFFSET};
pub use inspect::{inspect, ClipSummary};
pub use naming::{ClipKind, ClipName, AVI_TEMP, TIMELAPSE_TEMP};
