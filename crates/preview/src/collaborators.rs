use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::io;
use timeline::Millis;

use crate::{CommandKind, PreviewCommand};

/// Delivers start/stop commands to the camera. Completion is reported later
/// through the orchestrator's ack entry points.
pub trait CommandChannel: Send {
    fn send(&mut self, command: &PreviewCommand);
}

impl CommandChannel for Sender<PreviewCommand> {
    fn send(&mut self, command: &PreviewCommand) {
        if Sender::send(self, command.clone()).is_err() {
            tracing::warn!("command channel closed, dropping {}", command);
        }
    }
}

/// Listening endpoint the camera streams into.
pub trait StreamServer: Send {
    /// Start accepting (idempotent) and return the bound port.
    fn start(&mut self) -> io::Result<u16>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Local frame sink driven by buffer fill state.
pub trait Renderer: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn stop_drawing(&mut self);
    fn set_volume_enabled(&mut self, enabled: bool);
    fn draw_frame(&mut self, data: &[u8], pts_ms: Millis, is_first_frame: bool);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BufferLevel {
    Empty,
    Low,
    Ready,
}

/// Caller-facing notifications.
pub trait PreviewListener: Send {
    fn on_total_length_set(&mut self, total_ms: Millis);
    fn on_preview_started(&mut self, at_ms: Millis);
    fn on_preview_time_progress(&mut self, position_ms: Millis);
    fn on_end_received(&mut self);
    /// Consecutive negative acks reached the configured threshold.
    fn on_command_failed(&mut self, _kind: CommandKind, _consecutive_failures: u32) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreviewNotification {
    TotalLengthSet { total_ms: Millis },
    PreviewStarted { at_ms: Millis },
    TimeProgress { position_ms: Millis },
    EndReceived,
    CommandFailed { kind: CommandKind, consecutive_failures: u32 },
}

impl PreviewListener for Sender<PreviewNotification> {
    fn on_total_length_set(&mut self, total_ms: Millis) {
        let _ = self.send(PreviewNotification::TotalLengthSet { total_ms });
    }

    fn on_preview_started(&mut self, at_ms: Millis) {
        let _ = self.send(PreviewNotification::PreviewStarted { at_ms });
    }

    fn on_preview_time_progress(&mut self, position_ms: Millis) {
        let _ = self.send(PreviewNotification::TimeProgress { position_ms });
    }

    fn on_end_received(&mut self) {
        let _ = self.send(PreviewNotification::EndReceived);
    }

    fn on_command_failed(&mut self, kind: CommandKind, consecutive_failures: u32) {
        let _ = self.send(PreviewNotification::CommandFailed {
            kind,
            consecutive_failures,
        });
    }
}
