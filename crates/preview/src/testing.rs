//! In-memory collaborators for orchestrator tests.

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use timeline::Millis;

use crate::{
    Collaborators, PreviewCommand, PreviewConfig, PreviewNotification, PreviewOrchestrator,
    Renderer, StreamServer,
};

pub const TEST_PORT: u16 = 5_400;

#[derive(Debug, Default)]
struct ServerState {
    running: bool,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct FakeServer(Arc<Mutex<ServerState>>);

impl StreamServer for FakeServer {
    fn start(&mut self) -> io::Result<u16> {
        let mut state = self.0.lock();
        if state.fail {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"));
        }
        state.running = true;
        Ok(TEST_PORT)
    }

    fn stop(&mut self) {
        self.0.lock().running = false;
    }

    fn is_running(&self) -> bool {
        self.0.lock().running
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Play,
    Pause,
    Stop,
    StopDrawing,
    Volume(bool),
    Frame { pts_ms: Millis, first: bool },
}

#[derive(Clone, Default)]
pub struct FakeRenderer(Arc<Mutex<Vec<RenderCall>>>);

impl Renderer for FakeRenderer {
    fn play(&mut self) {
        self.0.lock().push(RenderCall::Play);
    }

    fn pause(&mut self) {
        self.0.lock().push(RenderCall::Pause);
    }

    fn stop(&mut self) {
        self.0.lock().push(RenderCall::Stop);
    }

    fn stop_drawing(&mut self) {
        self.0.lock().push(RenderCall::StopDrawing);
    }

    fn set_volume_enabled(&mut self, enabled: bool) {
        self.0.lock().push(RenderCall::Volume(enabled));
    }

    fn draw_frame(&mut self, _data: &[u8], pts_ms: Millis, is_first_frame: bool) {
        self.0.lock().push(RenderCall::Frame {
            pts_ms,
            first: is_first_frame,
        });
    }
}

pub struct Harness {
    pub preview: Arc<PreviewOrchestrator>,
    pub commands: Receiver<PreviewCommand>,
    pub notifications: Receiver<PreviewNotification>,
    server: FakeServer,
    renderer: FakeRenderer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PreviewConfig::default())
    }

    pub fn with_config(config: PreviewConfig) -> Self {
        let (cmd_tx, commands) = unbounded();
        let (note_tx, notifications) = unbounded();
        let server = FakeServer::default();
        let renderer = FakeRenderer::default();
        let collaborators =
            Collaborators::new(cmd_tx, server.clone(), renderer.clone()).with_listener(note_tx);
        Self {
            preview: Arc::new(PreviewOrchestrator::new(collaborators, config)),
            commands,
            notifications,
            server,
            renderer,
        }
    }

    /// Commands sent to the camera since the last call.
    pub fn sent(&self) -> Vec<PreviewCommand> {
        self.commands.try_iter().collect()
    }

    /// Listener notifications since the last call.
    pub fn notes(&self) -> Vec<PreviewNotification> {
        self.notifications.try_iter().collect()
    }

    /// Renderer calls since the last call.
    pub fn renderer_calls(&self) -> Vec<RenderCall> {
        std::mem::take(&mut *self.renderer.0.lock())
    }

    pub fn port(&self) -> u16 {
        TEST_PORT
    }

    pub fn server_running(&self) -> bool {
        self.server.is_running()
    }

    pub fn fail_server(&self, fail: bool) {
        self.server.0.lock().fail = fail;
    }
}
