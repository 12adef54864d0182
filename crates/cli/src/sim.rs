use crossbeam_channel::{bounded, Receiver, Sender};
use preview::{BufferLevel, CommandKind, PreviewCommand, PreviewEvent, Renderer, StreamServer};
use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use timeline::{secs_to_millis, ClipId, Millis};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SimSettings {
    pub fps: f64,
    /// Playback speed multiplier; 2.0 streams twice as fast as real time.
    pub speed: f64,
    pub ack_latency_ms: u64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            fps: 25.0,
            speed: 1.0,
            ack_latency_ms: 30,
        }
    }
}

impl SimSettings {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / (self.fps * self.speed))
    }
}

struct Stream {
    clip_id: ClipId,
    start_secs: f64,
    frame: u64,
    frame_count: u64,
    next_at: Instant,
}

/// Stands in for the camera: acks every command after a fixed latency and
/// streams frames for each started clip.
pub struct SimulatedCamera {
    shutdown: Sender<()>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedCamera {
    pub fn spawn(
        commands: Receiver<PreviewCommand>,
        events: Sender<PreviewEvent>,
        last_clip: ClipId,
        settings: SimSettings,
    ) -> Self {
        let (shutdown, shutdown_rx) = bounded(1);
        let worker = thread::spawn(move || {
            CameraLoop {
                events,
                last_clip,
                settings,
                stream: None,
            }
            .run(commands, shutdown_rx)
        });
        Self {
            shutdown,
            worker: Some(worker),
        }
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.shutdown.send(());
            let _ = worker.join();
        }
    }
}

struct CameraLoop {
    events: Sender<PreviewEvent>,
    last_clip: ClipId,
    settings: SimSettings,
    stream: Option<Stream>,
}

impl CameraLoop {
    fn run(mut self, commands: Receiver<PreviewCommand>, shutdown: Receiver<()>) {
        let idle = Duration::from_millis(20);
        loop {
            let wait = self
                .stream
                .as_ref()
                .map(|s| s.next_at.saturating_duration_since(Instant::now()))
                .unwrap_or(idle);

            crossbeam_channel::select! {
                recv(shutdown) -> _ => break,
                recv(commands) -> msg => match msg {
                    Ok(command) => self.handle(command),
                    Err(_) => break,
                },
                default(wait) => {
                    if !self.advance() {
                        break;
                    }
                }
            }
        }
        debug!("Simulated camera stopped");
    }

    fn handle(&mut self, command: PreviewCommand) {
        info!("camera <- {}", command);
        thread::sleep(Duration::from_millis(self.settings.ack_latency_ms));

        let kind = command.kind();
        match command {
            PreviewCommand::Start {
                clip_id,
                start_offset_secs,
                length_secs,
                ..
            } => {
                let frame_count = (length_secs * self.settings.fps).ceil().max(1.0) as u64;
                self.stream = Some(Stream {
                    clip_id,
                    start_secs: start_offset_secs,
                    frame: 0,
                    frame_count,
                    next_at: Instant::now(),
                });
            }
            PreviewCommand::Stop { clip_id, .. } => {
                if self.stream.as_ref().is_some_and(|s| s.clip_id == clip_id) {
                    self.stream = None;
                }
            }
        }

        let _ = self.events.send(PreviewEvent::CommandAck {
            kind,
            success: true,
        });
        if kind == CommandKind::Start {
            let _ = self.events.send(PreviewEvent::BufferLevel {
                level: BufferLevel::Ready,
            });
        }
    }

    /// Emit the next frame of the active stream. Returns false once the
    /// orchestrator side has gone away.
    fn advance(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return true;
        };

        let pts = stream.start_secs + stream.frame as f64 / self.settings.fps;
        let event = PreviewEvent::Frame {
            data: Vec::new(),
            pts_ms: secs_to_millis(pts),
            is_first_frame: stream.frame == 0,
        };
        if self.events.send(event).is_err() {
            return false;
        }

        stream.frame += 1;
        stream.next_at += self.settings.frame_interval();
        if stream.frame < stream.frame_count {
            return true;
        }

        debug!("End of stream for {}", stream.clip_id);
        let finished_last = stream.clip_id == self.last_clip;
        self.stream = None;
        let _ = self.events.send(PreviewEvent::EndOfStream);
        if finished_last {
            let _ = self.events.send(PreviewEvent::PlaybackFinished);
        }
        true
    }
}

/// Stream endpoint bound to an ephemeral loopback port.
#[derive(Default)]
pub struct LoopbackStreamServer {
    listener: Option<TcpListener>,
}

impl StreamServer for LoopbackStreamServer {
    fn start(&mut self) -> io::Result<u16> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?.port());
        }
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        debug!("Stream server bound to 127.0.0.1:{}", port);
        self.listener = Some(listener);
        Ok(port)
    }

    fn stop(&mut self) {
        if self.listener.take().is_some() {
            debug!("Stream server closed");
        }
    }

    fn is_running(&self) -> bool {
        self.listener.is_some()
    }
}

/// Renderer that only logs what it would do.
#[derive(Default)]
pub struct LogRenderer {
    frames: u64,
    volume: bool,
}

impl Renderer for LogRenderer {
    fn play(&mut self) {
        debug!("renderer: play");
    }

    fn pause(&mut self) {
        debug!("renderer: pause");
    }

    fn stop(&mut self) {
        debug!("renderer: stop after {} frames", self.frames);
    }

    fn stop_drawing(&mut self) {
        debug!("renderer: stop drawing");
    }

    fn set_volume_enabled(&mut self, enabled: bool) {
        if enabled != self.volume {
            debug!("renderer: volume {}", if enabled { "on" } else { "off" });
            self.volume = enabled;
        }
    }

    fn draw_frame(&mut self, _data: &[u8], pts_ms: Millis, is_first_frame: bool) {
        self.frames += 1;
        if is_first_frame {
            debug!("renderer: first frame at pts {}ms", pts_ms);
        }
    }
}

pub fn validate(settings: &SimSettings) -> anyhow::Result<()> {
    if !(settings.fps.is_finite() && settings.fps > 0.0) {
        anyhow::bail!("fps must be positive, got {}", settings.fps);
    }
    if !(settings.speed.is_finite() && settings.speed > 0.0) {
        anyhow::bail!("speed must be positive, got {}", settings.speed);
    }
    if settings.fps * settings.speed > 1_000.0 {
        warn!("Simulated frame rate above 1000 fps; timing will be coarse");
    }
    Ok(())
}
