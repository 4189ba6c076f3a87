//! Double-buffered clip playback.
//!
//! One half of the buffer is consumed by the emission loop while the
//! read-ahead worker fills the other. Frame boundaries are found from the
//! `00dc` chunk headers; the first header with any other marker (audio
//! trailer, `idx1`, or garbage) ends the stream. A header split across
//! two blocks is assembled in a small carry buffer.

use std::io::{Seek, SeekFrom};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};

use super::control::PlaybackControl;
use super::reader::{ReadAhead, ReadEvent};
use crate::avi::format::{filler, ChunkHeader, CHUNK_HDR};
use crate::avi::{ClipName, AVI_HEADER_LEN};
use crate::errors::DvrError;
use crate::storage::Storage;

const WAIT_SLICE: Duration = Duration::from_millis(20);
const BUFFER_RECOVERY: Duration = Duration::from_millis(500);

/// What the emission loop hands to the consumer on each call
#[derive(Debug, PartialEq, Eq)]
pub enum PlaybackChunk<'a> {
    /// First bytes of a frame; `frame_len` is the whole payload length
    FrameStart { frame_len: usize, data: &'a [u8] },
    /// More bytes of the current frame
    Continuation(&'a [u8]),
    /// End of stream, the session is already torn down
    End,
}

impl PlaybackChunk<'_> {
    pub fn is_end(&self) -> bool {
        matches!(self, PlaybackChunk::End)
    }

    pub fn data(&self) -> &[u8] {
        match self {
            PlaybackChunk::FrameStart { data, .. } | PlaybackChunk::Continuation(data) => data,
            PlaybackChunk::End => &[],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackStats {
    pub path: String,
    pub recorded_fps: u32,
    pub recorded_secs: u32,
    pub playback_fps: u32,
    pub frames: u64,
    pub frame_bytes: u64,
    pub blocks: u64,
    pub read_bytes: u64,
    pub read_ms: u64,
    pub wait_ms: u64,
    pub delay_ms: u64,
    pub elapsed_ms: u64,
    /// False when playback was stopped before the end of the clip
    pub completed: bool,
}

impl PlaybackStats {
    pub fn achieved_fps(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.frames as f64 * 1000.0 / self.elapsed_ms as f64
    }

    /// kB/s, counting only time spent inside storage reads
    pub fn read_kbps(&self) -> u64 {
        if self.read_ms == 0 {
            return 0;
        }
        self.read_bytes / self.read_ms
    }

    fn per_frame(&self, ms: u64) -> u64 {
        if self.frames == 0 {
            0
        } else {
            ms / self.frames
        }
    }

    pub fn busy_percent(&self) -> u64 {
        if self.elapsed_ms == 0 {
            return 0;
        }
        self.elapsed_ms.saturating_sub(self.delay_ms) * 100 / self.elapsed_ms
    }

    fn log(&self) {
        let processing = self
            .elapsed_ms
            .saturating_sub(self.delay_ms)
            .saturating_sub(self.wait_ms);
        log::info!(
            "Playback {} {}:\n  recorded {} fps for {}s, played {} frames at {:.1} fps (clock {} fps)\n  read {} blocks, {} kB at {} kB/s, read wait {} ms/frame\n  processing {} ms/frame, frame delay {} ms/frame, busy {}%",
            self.path,
            if self.completed { "finished" } else { "stopped" },
            self.recorded_fps,
            self.recorded_secs,
            self.frames,
            self.achieved_fps(),
            self.playback_fps,
            self.blocks,
            self.read_bytes / 1024,
            self.read_kbps(),
            self.per_frame(self.wait_ms),
            self.per_frame(processing),
            self.per_frame(self.delay_ms),
            self.busy_percent()
        );
    }
}

struct PlaySession {
    buff_len: usize,
    offset: usize,
    frame_len: usize,
    frame_remaining: usize,
    skip: usize,
    carry: [u8; CHUNK_HDR],
    carry_len: usize,
    eof: bool,
    started: Instant,
    stats: PlaybackStats,
}

impl PlaySession {
    fn consume(&mut self, len: usize) {
        self.offset += len;
        self.frame_remaining -= len;
        self.stats.frame_bytes += len as u64;
        if self.frame_remaining == 0 {
            self.skip = filler(self.frame_len);
        }
    }
}

enum Step {
    Frame {
        frame_len: usize,
        start: usize,
        len: usize,
    },
    More {
        start: usize,
        len: usize,
    },
    End,
}

pub struct PlaybackEngine {
    storage: Arc<dyn Storage>,
    control: Arc<PlaybackControl>,
    ram_size: usize,
    fps_override: Option<u32>,
    reader: ReadAhead,
    events: Receiver<ReadEvent>,
    active: Vec<u8>,
    spare: Option<Vec<u8>>,
    generation: u64,
    session: Option<PlaySession>,
    last_stats: Option<PlaybackStats>,
}

impl PlaybackEngine {
    /// Allocate both buffer halves and start the read-ahead worker
    pub fn new(
        storage: Arc<dyn Storage>,
        control: Arc<PlaybackControl>,
        ram_size: usize,
        fps_override: Option<u32>,
    ) -> Result<Self, DvrError> {
        if ram_size < CHUNK_HDR {
            return Err(DvrError::ConfigError(format!(
                "playback block of {} bytes is too small",
                ram_size
            )));
        }
        let (tx, events) = crossbeam_channel::unbounded();
        control.set_read_waker(tx.clone());
        let reader = ReadAhead::spawn(tx, control.clone())?;
        Ok(Self {
            storage,
            control,
            ram_size,
            fps_override,
            reader,
            events,
            active: vec![0u8; ram_size],
            spare: Some(vec![0u8; ram_size]),
            generation: 0,
            session: None,
            last_stats: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn last_stats(&self) -> Option<&PlaybackStats> {
        self.last_stats.as_ref()
    }

    pub fn set_fps_override(&mut self, fps: Option<u32>) {
        self.fps_override = fps.filter(|f| *f > 0);
    }

    /// Open a stored clip and prime the first block.
    ///
    /// Refused while a clip is being recorded.
    pub fn open(&mut self, path: &str) -> Result<(), DvrError> {
        if self.session.is_some() {
            self.teardown(false);
        }
        self.control.begin()?;
        if let Err(e) = self.start_session(path) {
            self.session = None;
            self.reader.detach();
            self.control.finish();
            log::warn!("Playback of {} failed: {}", path, e);
            return Err(e);
        }
        Ok(())
    }

    fn start_session(&mut self, path: &str) -> Result<(), DvrError> {
        let name = ClipName::parse(path)?;
        let mut file = self.storage.open(path)?;
        file.seek(SeekFrom::Start(AVI_HEADER_LEN as u64))?;

        let fps = self.fps_override.unwrap_or(name.fps).max(1);
        self.control.clock().set_fps(fps)?;
        self.control.pacing().activate();

        let spare = self.recover_spare();
        self.generation += 1;
        self.reader.attach(file);
        self.session = Some(PlaySession {
            buff_len: 0,
            offset: 0,
            frame_len: 0,
            frame_remaining: 0,
            skip: 0,
            carry: [0u8; CHUNK_HDR],
            carry_len: 0,
            eof: false,
            started: Instant::now(),
            stats: PlaybackStats {
                path: path.to_string(),
                recorded_fps: name.fps,
                recorded_secs: name.duration,
                playback_fps: fps,
                ..Default::default()
            },
        });

        self.reader.fill(spare, self.generation);
        if !self.swap() {
            return Err(DvrError::PlaybackError(format!(
                "no data could be read from {}",
                path
            )));
        }
        log::info!("Playing {} at {} fps", path, fps);
        Ok(())
    }

    /// Get the inactive half back after a stopped session left it with the
    /// read-ahead worker
    fn recover_spare(&mut self) -> Vec<u8> {
        let deadline = Instant::now() + BUFFER_RECOVERY;
        while self.spare.is_none() && Instant::now() < deadline {
            match self.events.recv_timeout(WAIT_SLICE) {
                Ok(ReadEvent::Block { buf, .. }) => self.spare = Some(buf),
                Ok(ReadEvent::Woken) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        while let Ok(event) = self.events.try_recv() {
            if let ReadEvent::Block { buf, .. } = event {
                self.spare.get_or_insert(buf);
            }
        }
        self.spare.take().unwrap_or_else(|| {
            log::warn!("Playback buffer not returned by read-ahead, reallocating");
            vec![0u8; self.ram_size]
        })
    }

    /// Next piece of the stream, paced once per frame by the frame clock
    pub fn next_chunk(&mut self) -> PlaybackChunk<'_> {
        match self.advance() {
            Step::Frame {
                frame_len,
                start,
                len,
            } => PlaybackChunk::FrameStart {
                frame_len,
                data: &self.active[start..start + len],
            },
            Step::More { start, len } => PlaybackChunk::Continuation(&self.active[start..start + len]),
            Step::End => PlaybackChunk::End,
        }
    }

    /// Next whole frame, or `None` at end of stream
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let (mut frame, frame_len) = loop {
            match self.next_chunk() {
                PlaybackChunk::FrameStart { frame_len, data } => break (data.to_vec(), frame_len),
                PlaybackChunk::Continuation(_) => continue,
                PlaybackChunk::End => return None,
            }
        };
        frame.reserve(frame_len - frame.len());
        while frame.len() < frame_len {
            match self.next_chunk() {
                PlaybackChunk::Continuation(data) => frame.extend_from_slice(data),
                _ => return None,
            }
        }
        Some(frame)
    }

    /// Stop the current session from the consumer side
    pub fn close(&mut self) {
        self.teardown(false);
    }

    fn advance(&mut self) -> Step {
        loop {
            let Some(session) = self.session.as_mut() else {
                return Step::End;
            };
            if self.control.should_stop() {
                self.teardown(false);
                return Step::End;
            }

            if session.offset >= session.buff_len {
                if session.eof {
                    self.teardown(true);
                    return Step::End;
                }
                if !self.swap() {
                    self.teardown(false);
                    return Step::End;
                }
                continue;
            }

            if session.skip > 0 {
                let n = session.skip.min(session.buff_len - session.offset);
                session.offset += n;
                session.skip -= n;
                continue;
            }

            if session.frame_remaining > 0 {
                let start = session.offset;
                let len = session.frame_remaining.min(session.buff_len - start);
                session.consume(len);
                return Step::More { start, len };
            }

            let take = (CHUNK_HDR - session.carry_len).min(session.buff_len - session.offset);
            let (from, to) = (session.offset, session.carry_len);
            session.carry[to..to + take].copy_from_slice(&self.active[from..from + take]);
            session.carry_len += take;
            session.offset += take;
            if session.carry_len < CHUNK_HDR {
                continue;
            }
            session.carry_len = 0;

            let header = ChunkHeader::decode(&session.carry).filter(|h| h.is_video());
            let Some(header) = header else {
                log::debug!("End of frames in {}", session.stats.path);
                self.teardown(true);
                return Step::End;
            };

            let Some(delay_ms) = self.wait_pacing() else {
                self.teardown(false);
                return Step::End;
            };
            let Some(session) = self.session.as_mut() else {
                return Step::End;
            };
            session.stats.delay_ms += delay_ms;
            session.stats.frames += 1;
            session.frame_len = header.len as usize;
            session.frame_remaining = session.frame_len;
            let start = session.offset;
            let len = session.frame_len.min(session.buff_len - start);
            session.consume(len);
            return Step::Frame {
                frame_len: session.frame_len,
                start,
                len,
            };
        }
    }

    /// Wait for the filled half, make it active and send the old one off
    /// to be refilled
    fn swap(&mut self) -> bool {
        let waited = Instant::now();
        loop {
            match self.events.recv_timeout(WAIT_SLICE) {
                Ok(ReadEvent::Block {
                    buf,
                    len,
                    generation,
                    read_ms,
                }) => {
                    if generation != self.generation {
                        self.spare = Some(buf);
                        continue;
                    }
                    let old = std::mem::replace(&mut self.active, buf);
                    let Some(session) = self.session.as_mut() else {
                        self.spare = Some(old);
                        return false;
                    };
                    let wait_ms = waited.elapsed().as_millis() as u64;
                    session.buff_len = len;
                    session.offset = 0;
                    session.eof = len < self.ram_size;
                    session.stats.blocks += 1;
                    session.stats.read_bytes += len as u64;
                    session.stats.read_ms += read_ms;
                    session.stats.wait_ms += wait_ms;
                    log::trace!("Block of {} bytes, read {} ms, waited {} ms", len, read_ms, wait_ms);
                    if session.eof {
                        self.spare = Some(old);
                    } else {
                        self.reader.fill(old, self.generation);
                    }
                    return true;
                }
                Ok(ReadEvent::Woken) | Err(RecvTimeoutError::Timeout) => {
                    if self.control.should_stop() {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Block until the frame clock releases the next frame, in slices so a
    /// stop request is seen promptly
    fn wait_pacing(&self) -> Option<u64> {
        let started = Instant::now();
        loop {
            if self.control.pacing().take_timeout(WAIT_SLICE) {
                return Some(started.elapsed().as_millis() as u64);
            }
            if self.control.should_stop() {
                return None;
            }
        }
    }

    fn teardown(&mut self, completed: bool) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.reader.detach();
        self.control.finish();
        session.stats.completed = completed;
        session.stats.elapsed_ms = session.started.elapsed().as_millis() as u64;
        session.stats.log();
        self.last_stats = Some(session.stats);
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avi::{AviHeaderInfo, HeaderScratch};
    use crate::recording::AviWriter;
    use crate::signal::{PacingToken, TickNotify};
    use crate::testing::{synthetic_jpeg, MemoryStorage};
    use crate::timing::FrameClock;

    const PATH: &str = "/20240315/20240315_142501_QVGA_50_2.avi";

    fn write_clip(storage: &MemoryStorage, ram: usize, sizes: &[usize]) -> Vec<Vec<u8>> {
        let file = storage.create(PATH).unwrap();
        let mut writer = AviWriter::new(ram);
        let mut info = AviHeaderInfo::placeholder(50, 320, 240);
        writer.begin(file, &info);
        let frames: Vec<Vec<u8>> = sizes
            .iter()
            .enumerate()
            .map(|(i, len)| synthetic_jpeg(i as u64, *len))
            .collect();
        for frame in &frames {
            assert!(writer.append_frame(frame));
        }
        info.frame_count = frames.len() as u32;
        writer.finish(&HeaderScratch::new(), info).unwrap();
        frames
    }

    fn engine(storage: Arc<MemoryStorage>, ram: usize) -> (PlaybackEngine, Arc<PlaybackControl>) {
        let pacing = Arc::new(PacingToken::new());
        let clock = Arc::new(FrameClock::new(Arc::new(TickNotify::default()), pacing.clone()));
        let control = Arc::new(PlaybackControl::new(clock, pacing));
        let engine = PlaybackEngine::new(storage, control.clone(), ram, Some(200)).unwrap();
        (engine, control)
    }

    #[test]
    fn test_frames_read_back_across_blocks() {
        let storage = Arc::new(MemoryStorage::new());
        // odd sizes so padding and header straddles land everywhere
        let sizes = [1021, 3, 700, 1, 1500, 998, 13, 1022];
        let frames = write_clip(&storage, 2048, &sizes);

        let (mut engine, control) = engine(storage, 512);
        engine.open(PATH).unwrap();
        let mut played = Vec::new();
        while let Some(frame) = engine.next_frame() {
            played.push(frame);
        }
        assert_eq!(played, frames);
        assert!(!engine.is_open());
        let stats = engine.last_stats().unwrap();
        assert!(stats.completed);
        assert_eq!(stats.frames, sizes.len() as u64);
        assert_eq!(stats.recorded_fps, 50);
        assert!(!control.is_playing());
        assert!(!control.clock().is_running());
    }

    #[test]
    fn test_frame_start_reports_whole_length() {
        let storage = Arc::new(MemoryStorage::new());
        write_clip(&storage, 4096, &[3000]);
        let (mut engine, _control) = engine(storage, 1024);
        engine.open(PATH).unwrap();
        match engine.next_chunk() {
            PlaybackChunk::FrameStart { frame_len, data } => {
                assert_eq!(frame_len, 3000);
                assert_eq!(data.len(), 1024 - 8);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.next_chunk().data().len(), 1024);
        assert_eq!(engine.next_chunk().data().len(), 3000 - 1016 - 1024);
        assert!(engine.next_chunk().is_end());
    }

    #[test]
    fn test_open_refused_while_recording() {
        let storage = Arc::new(MemoryStorage::new());
        write_clip(&storage, 2048, &[100]);
        let (mut engine, control) = engine(storage, 512);
        control.set_recording(true);
        assert!(matches!(engine.open(PATH), Err(DvrError::PlaybackRefused(_))));
        assert!(!control.is_playing());
    }

    #[test]
    fn test_missing_clip_releases_playback() {
        let storage = Arc::new(MemoryStorage::new());
        let (mut engine, control) = engine(storage, 512);
        assert!(engine.open(PATH).is_err());
        assert!(!control.is_playing());
        assert!(engine.open("/20240315/current.avi").is_err());
    }
}
