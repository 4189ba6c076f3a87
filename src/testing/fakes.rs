//! In-memory storage and scripted collaborators for offline tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::synthetic_data::synthetic_jpeg;
use crate::capture::Frame;
use crate::collaborators::{
    AncillaryKind, AncillaryStream, ClipNotifier, FrameSource, MotionDetector, MotionResult,
    Peripherals, TriggerSensor,
};
use crate::errors::DvrError;
use crate::storage::{Storage, StorageFile};
use crate::timing::Clock;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// File whose bytes are shared between clones; each clone has its own
/// position.
#[derive(Clone, Default)]
pub struct SharedFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    fail_writes: Arc<AtomicBool>,
}

impl SharedFile {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(data: Arc<Mutex<Vec<u8>>>, fail_writes: Arc<AtomicBool>) -> Self {
        Self {
            data,
            pos: 0,
            fail_writes,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.data).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.data).clone()
    }

    /// Independent reader over a snapshot of the bytes
    pub fn reader(&self) -> Cursor<Vec<u8>> {
        Cursor::new(self.contents())
    }
}

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = lock(&self.data);
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(data);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        let mut data = lock(&self.data);
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        drop(data);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.len() as i64;
        let next = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => len + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if next < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}

/// Storage held entirely in memory, with a settable free-space report and
/// write failure injection
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
    dirs: Mutex<BTreeSet<String>>,
    free: Mutex<Option<u64>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_free_bytes(free: u64) -> Self {
        let storage = Self::default();
        storage.set_free_bytes(Some(free));
        storage
    }

    pub fn set_free_bytes(&self, free: Option<u64>) {
        *lock(&self.free) = free;
    }

    /// Make every write on every file fail until switched off again
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Storage paths of all files, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = lock(&self.files).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Saved clips, i.e. `.avi` files outside the temporary names
    pub fn clips(&self) -> Vec<String> {
        self.paths()
            .into_iter()
            .filter(|p| p.ends_with(".avi") && p.matches('/').count() > 1)
            .collect()
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(path).map(|d| lock(d).clone())
    }

    pub fn file(&self, path: &str) -> Option<SharedFile> {
        lock(&self.files)
            .get(path)
            .map(|d| SharedFile::with(d.clone(), self.fail_writes.clone()))
    }
}

impl Storage for MemoryStorage {
    fn create(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError> {
        let data = Arc::new(Mutex::new(Vec::new()));
        lock(&self.files).insert(path.to_string(), data.clone());
        Ok(Box::new(SharedFile::with(data, self.fail_writes.clone())))
    }

    fn open(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError> {
        self.file(path)
            .map(|f| Box::new(f) as Box<dyn StorageFile>)
            .ok_or_else(|| DvrError::StorageError(format!("open {}: not found", path)))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), DvrError> {
        let mut files = lock(&self.files);
        let data = files
            .remove(from)
            .ok_or_else(|| DvrError::StorageError(format!("rename {}: not found", from)))?;
        files.insert(to.to_string(), data);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), DvrError> {
        lock(&self.files)
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| DvrError::StorageError(format!("remove {}: not found", path)))
    }

    fn mkdir(&self, path: &str) -> Result<(), DvrError> {
        lock(&self.dirs).insert(path.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        lock(&self.files).contains_key(path) || lock(&self.dirs).contains(path)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, DvrError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names: BTreeSet<String> = BTreeSet::new();
        for path in lock(&self.files).keys().chain(lock(&self.dirs).iter()) {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if let Some(first) = rest.split('/').next().filter(|s| !s.is_empty()) {
                    names.insert(first.to_string());
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    fn free_bytes(&self) -> Option<u64> {
        *lock(&self.free)
    }
}

enum Scripted {
    Fail,
    Size(usize),
}

/// Frame source producing synthetic JPEGs, with scripted failures and
/// sizes, that counts acquisitions and releases
pub struct ScriptedSource {
    frame_len: usize,
    clock: Option<Arc<dyn Clock>>,
    script: Mutex<VecDeque<Scripted>>,
    seq: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl ScriptedSource {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            clock: None,
            script: Mutex::new(VecDeque::new()),
            seq: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Stamp frames with time from `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Next acquisition fails
    pub fn push_failure(&self) {
        lock(&self.script).push_back(Scripted::Fail);
    }

    /// Next frame has exactly `len` bytes
    pub fn push_size(&self, len: usize) {
        lock(&self.script).push_back(Scripted::Size(len));
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames handed out and not yet returned
    pub fn outstanding(&self) -> u64 {
        self.acquired() - self.released()
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&self) -> Option<Frame> {
        let len = match lock(&self.script).pop_front() {
            Some(Scripted::Fail) => return None,
            Some(Scripted::Size(len)) => len,
            None => self.frame_len,
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let ms = self.clock.as_ref().map(|c| c.now_ms()).unwrap_or(0);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Some(Frame::new(synthetic_jpeg(seq, len), seq, ms))
    }

    fn release(&self, _frame: Frame) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Motion detector whose answer is set by the test
#[derive(Default)]
pub struct ScriptedMotion {
    motion: AtomicBool,
    checks: AtomicU64,
}

impl ScriptedMotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, motion: bool) {
        self.motion.store(motion, Ordering::SeqCst);
    }

    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }
}

impl MotionDetector for ScriptedMotion {
    fn check(&self, _frame: &Frame) -> MotionResult {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.motion.load(Ordering::SeqCst) {
            MotionResult::detected("Motion")
        } else {
            MotionResult::default()
        }
    }
}

/// Trigger sensor whose level is set by the test
#[derive(Default)]
pub struct ScriptedSensor {
    level: AtomicBool,
}

impl ScriptedSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
    }
}

impl TriggerSensor for ScriptedSensor {
    fn poll(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    fn label(&self) -> &str {
        "PIR"
    }
}

/// Ancillary stream replaying a fixed payload for every clip
pub struct MemoryAncillary {
    kind: AncillaryKind,
    payload: Vec<u8>,
    cursor: Mutex<usize>,
    sessions: AtomicU32,
}

impl MemoryAncillary {
    pub fn new(kind: AncillaryKind, payload: Vec<u8>) -> Self {
        Self {
            kind,
            payload,
            cursor: Mutex::new(0),
            sessions: AtomicU32::new(0),
        }
    }

    pub fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl AncillaryStream for MemoryAncillary {
    fn kind(&self) -> AncillaryKind {
        self.kind
    }

    fn begin(&self) -> bool {
        *lock(&self.cursor) = 0;
        self.sessions.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn finish(&self) -> u32 {
        (self.payload.len() - *lock(&self.cursor)) as u32
    }

    fn drain_into(&self, buf: &mut [u8]) -> usize {
        let mut cursor = lock(&self.cursor);
        let n = buf.len().min(self.payload.len() - *cursor);
        buf[..n].copy_from_slice(&self.payload[*cursor..*cursor + n]);
        *cursor += n;
        n
    }
}

/// Notifier that remembers every saved path
#[derive(Default)]
pub struct CollectingNotifier {
    saved: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Vec<String> {
        lock(&self.saved).clone()
    }
}

impl ClipNotifier for CollectingNotifier {
    fn clip_saved(&self, path: &str) {
        lock(&self.saved).push(path.to_string());
    }
}

/// Peripherals that count start and stop notifications
#[derive(Default)]
pub struct CountingPeripherals {
    pub started: AtomicU32,
    pub stopped: AtomicU32,
}

impl Peripherals for CountingPeripherals {
    fn recording_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn recording_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}
