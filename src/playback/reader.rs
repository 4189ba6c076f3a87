//! Read-ahead worker.
//!
//! Owns the inactive half of the playback buffer while a fill is in
//! flight: the engine hands a buffer over with [`ReadCommand::Fill`] and
//! gets it back, filled, in a [`ReadEvent::Block`].

use std::io::Read;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use super::control::PlaybackControl;
use crate::errors::DvrError;
use crate::storage::StorageFile;

pub enum ReadCommand {
    Attach(Box<dyn StorageFile>),
    Fill { buf: Vec<u8>, generation: u64 },
    Detach,
    Shutdown,
}

pub enum ReadEvent {
    Block {
        buf: Vec<u8>,
        len: usize,
        generation: u64,
        read_ms: u64,
    },
    /// Sent by a forced stop to release a waiting engine
    Woken,
}

pub struct ReadAhead {
    commands: Sender<ReadCommand>,
    handle: Option<JoinHandle<()>>,
}

impl ReadAhead {
    pub fn spawn(
        events: Sender<ReadEvent>,
        control: Arc<PlaybackControl>,
    ) -> Result<Self, DvrError> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let handle = std::thread::Builder::new()
            .name("crabdvr-read-ahead".to_string())
            .spawn(move || read_loop(rx, events, control))
            .map_err(|e| {
                DvrError::InitializationError(format!("Failed to start read-ahead worker: {}", e))
            })?;
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    pub fn attach(&self, file: Box<dyn StorageFile>) {
        let _ = self.commands.send(ReadCommand::Attach(file));
    }

    pub fn fill(&self, buf: Vec<u8>, generation: u64) {
        let _ = self.commands.send(ReadCommand::Fill { buf, generation });
    }

    pub fn detach(&self) {
        let _ = self.commands.send(ReadCommand::Detach);
    }
}

impl Drop for ReadAhead {
    fn drop(&mut self) {
        let _ = self.commands.send(ReadCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_loop(rx: Receiver<ReadCommand>, events: Sender<ReadEvent>, control: Arc<PlaybackControl>) {
    let mut file: Option<Box<dyn StorageFile>> = None;
    for command in rx.iter() {
        match command {
            ReadCommand::Attach(f) => file = Some(f),
            ReadCommand::Detach => file = None,
            ReadCommand::Shutdown => break,
            ReadCommand::Fill { mut buf, generation } => {
                let started = Instant::now();
                let mut len = 0;
                if !control.stop_requested() {
                    if let Some(f) = file.as_mut() {
                        len = read_block(f.as_mut(), &mut buf);
                    }
                }
                // stop is latched; a block read across a stop is thrown away
                if control.stop_requested() {
                    len = 0;
                }
                let read_ms = started.elapsed().as_millis() as u64;
                if events
                    .send(ReadEvent::Block {
                        buf,
                        len,
                        generation,
                        read_ms,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }
    }
    log::debug!("Read-ahead worker exiting");
}

/// Fill `buf` from the file, stopping early only at end of file or on error
fn read_block(file: &mut dyn StorageFile, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Playback read failed after {} bytes: {}", filled, e);
                break;
            }
        }
    }
    filled
}
