use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::warn;

use crate::{CommandKind, PreviewCommand};

/// Protocol anomalies absorbed by the orchestrator instead of failing a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    CommandDropped {
        command: PreviewCommand,
        in_flight: CommandKind,
    },
    NullCommand,
    MissingCurrentClip,
    RemoteNack {
        kind: CommandKind,
        consecutive: u32,
    },
    AckTimeout {
        command: PreviewCommand,
    },
    StaleAck {
        kind: CommandKind,
    },
    StreamServerFailed {
        message: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CommandDropped { command, in_flight } => {
                write!(f, "dropped '{command}' while {in_flight} in flight")
            }
            Diagnostic::NullCommand => write!(f, "null command sent"),
            Diagnostic::MissingCurrentClip => write!(f, "stop requested without a current clip"),
            Diagnostic::RemoteNack { kind, consecutive } => {
                write!(f, "camera rejected {kind} ({consecutive} in a row)")
            }
            Diagnostic::AckTimeout { command } => write!(f, "no ack for '{command}'"),
            Diagnostic::StaleAck { kind } => write!(f, "{kind} ack with nothing in flight"),
            Diagnostic::StreamServerFailed { message } => {
                write!(f, "stream server failed: {message}")
            }
        }
    }
}

/// Bounded ring of recent diagnostics.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.iter().cloned().collect()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
