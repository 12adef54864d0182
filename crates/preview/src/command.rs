use serde::{Deserialize, Serialize};
use std::fmt;
use timeline::ClipId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Start => write!(f, "start"),
            CommandKind::Stop => write!(f, "stop"),
        }
    }
}

/// What the camera needs to begin or end streaming a clip region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PreviewCommand {
    Start {
        clip_id: ClipId,
        port: u16,
        /// Absolute position inside the recorded file.
        start_offset_secs: f64,
        length_secs: f64,
    },
    Stop {
        clip_id: ClipId,
        port: u16,
    },
}

impl PreviewCommand {
    pub fn start(clip_id: ClipId, port: u16, start_offset_secs: f64, length_secs: f64) -> Self {
        Self::Start {
            clip_id,
            port,
            start_offset_secs,
            length_secs,
        }
    }

    pub fn stop(clip_id: ClipId, port: u16) -> Self {
        Self::Stop { clip_id, port }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start { .. } => CommandKind::Start,
            Self::Stop { .. } => CommandKind::Stop,
        }
    }

    pub fn clip_id(&self) -> &ClipId {
        match self {
            Self::Start { clip_id, .. } | Self::Stop { clip_id, .. } => clip_id,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Start { port, .. } | Self::Stop { port, .. } => *port,
        }
    }

    /// Point the command at a freshly bound stream port.
    pub fn set_port(&mut self, new_port: u16) {
        match self {
            Self::Start { port, .. } | Self::Stop { port, .. } => *port = new_port,
        }
    }
}

impl fmt::Display for PreviewCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start {
                clip_id,
                port,
                start_offset_secs,
                length_secs,
            } => write!(
                f,
                "start {clip_id} @{start_offset_secs:.3}s for {length_secs:.3}s -> :{port}"
            ),
            Self::Stop { clip_id, port } => write!(f, "stop {clip_id} -> :{port}"),
        }
    }
}
