//! Playlist preview for clips stored on a remote camera.
//! The orchestrator keeps exactly one start/stop command in flight and turns
//! stream-buffer and renderer events into playback decisions.

use thiserror::Error;
use timeline::{Millis, TimelineError};

mod command;
pub use command::*;

mod sync;
pub use sync::*;

mod collaborators;
pub use collaborators::*;

mod diagnostics;
pub use diagnostics::*;

mod config;
pub use config::*;

mod orchestrator;
pub use orchestrator::*;

mod runtime;
pub use runtime::*;

#[cfg(test)]
mod testing;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("preview not initialized")]
    NotInitialized,

    #[error("preview already prepared; release it first")]
    AlreadyPrepared,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("position {position_ms}ms outside timeline [0, {total_ms}ms]")]
    OutOfRange { position_ms: Millis, total_ms: Millis },

    #[error("stream server error: {0}")]
    StreamServer(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("preview runtime stopped")]
    RuntimeStopped,
}

impl From<TimelineError> for PreviewError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::OutOfRange { position, total } => PreviewError::OutOfRange {
                position_ms: position,
                total_ms: total,
            },
            other => PreviewError::InvalidInput(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
