use thiserror::Error;

#[derive(Debug, Error)]
pub enum DvrError {
    #[error("Initialization error: {0}")]
    InitializationError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Muxing error: {0}")]
    MuxingError(String),
    #[error("Playback refused: {0}")]
    PlaybackRefused(String),
    #[error("Playback error: {0}")]
    PlaybackError(String),
    #[error("Invalid clip file name: {0}")]
    InvalidFilename(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DvrError {
    /// Errors that stop the recording subsystem from starting at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DvrError::InitializationError(_) | DvrError::ConfigError(_)
        )
    }
}
