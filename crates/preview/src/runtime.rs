use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use timeline::Millis;
use tracing::{debug, info};

use crate::{BufferLevel, CommandKind, PreviewError, PreviewOrchestrator, Result};

/// Asynchronous input from the camera link, stream server and renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PreviewEvent {
    CommandAck { kind: CommandKind, success: bool },
    BufferLevel { level: BufferLevel },
    EndOfStream,
    Frame {
        data: Vec<u8>,
        pts_ms: Millis,
        is_first_frame: bool,
    },
    PlaybackFinished,
    Shutdown,
}

impl PreviewOrchestrator {
    pub fn handle_event(&self, event: PreviewEvent) {
        match event {
            PreviewEvent::CommandAck { kind, success } => self.on_command_ack(kind, success),
            PreviewEvent::BufferLevel { level } => self.on_buffer_level(level),
            PreviewEvent::EndOfStream => self.on_end_of_stream(),
            PreviewEvent::Frame {
                data,
                pts_ms,
                is_first_frame,
            } => self.on_frame(&data, pts_ms, is_first_frame),
            PreviewEvent::PlaybackFinished => self.on_playback_finished(),
            PreviewEvent::Shutdown => {}
        }
    }
}

pub struct PreviewRuntime;

impl PreviewRuntime {
    /// Serialize events into `preview` on a worker thread that also expires
    /// unanswered commands on every tick.
    pub fn start(preview: Arc<PreviewOrchestrator>) -> PreviewHandle {
        let (tx, rx) = unbounded::<PreviewEvent>();
        let tick = preview.config().tick_interval();
        let worker = thread::spawn(move || run(preview, rx, tick));
        PreviewHandle {
            tx,
            worker: Some(worker),
        }
    }
}

fn run(preview: Arc<PreviewOrchestrator>, rx: Receiver<PreviewEvent>, tick: std::time::Duration) {
    debug!("Preview runtime started");
    let ticker = crossbeam_channel::tick(tick);
    loop {
        crossbeam_channel::select! {
            recv(rx) -> msg => {
                match msg {
                    Ok(PreviewEvent::Shutdown) | Err(_) => break,
                    Ok(event) => preview.handle_event(event),
                }
            }
            recv(ticker) -> _ => {
                if let Some(expired) = preview.expire_stale_command(Instant::now()) {
                    info!("Gave up waiting for ack of {}", expired);
                }
            }
        }
    }
    debug!("Preview runtime stopped");
}

pub struct PreviewHandle {
    tx: Sender<PreviewEvent>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewHandle {
    /// Sender for collaborators living on other threads.
    pub fn sender(&self) -> Sender<PreviewEvent> {
        self.tx.clone()
    }

    pub fn post(&self, event: PreviewEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| PreviewError::RuntimeStopped)
    }

    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(PreviewEvent::Shutdown);
            let _ = worker.join();
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.stop_worker();
    }
}
