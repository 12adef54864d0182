use parking_lot::Mutex;
use std::time::Instant;
use timeline::{millis_to_secs, secs_to_millis, Clip, ClipId, Millis, Timeline};
use tracing::{debug, info, warn};

use crate::{
    BufferLevel, CommandChannel, CommandKind, CommandSlots, Diagnostic, Diagnostics, DropReason,
    PreviewCommand, PreviewConfig, PreviewError, PreviewListener, Renderer, Result, StreamServer,
    Submission,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPhase {
    Unprepared,
    Idle,
    Active,
}

/// External parts the orchestrator drives.
pub struct Collaborators {
    pub channel: Box<dyn CommandChannel>,
    pub server: Box<dyn StreamServer>,
    pub renderer: Box<dyn Renderer>,
    pub listener: Option<Box<dyn PreviewListener>>,
}

impl Collaborators {
    pub fn new(
        channel: impl CommandChannel + 'static,
        server: impl StreamServer + 'static,
        renderer: impl Renderer + 'static,
    ) -> Self {
        Self {
            channel: Box::new(channel),
            server: Box::new(server),
            renderer: Box::new(renderer),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl PreviewListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn PreviewListener)) {
        if let Some(listener) = self.listener.as_mut() {
            f(listener.as_mut());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekKind {
    /// Caller scrub; flush whatever is buffered.
    Scrub,
    /// Explicit-length preview; the stream server is rebound right away.
    Bounded,
    /// End of stream moved us onto the next clip; keep residual frames.
    NextClip,
}

/// Per-`prepare` state.
struct Session {
    timeline: Timeline,
    current_clip: Option<Clip>,
    playing_index: Option<usize>,
    buffering_index: usize,
    current_seek_secs: f64,
    just_restarted: bool,
    start_reported: bool,
}

impl Session {
    fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            current_clip: None,
            playing_index: None,
            buffering_index: 0,
            current_seek_secs: 0.0,
            just_restarted: false,
            start_reported: false,
        }
    }

    fn begin_seek(&mut self, seek_secs: f64, index: usize) {
        self.current_seek_secs = seek_secs;
        self.just_restarted = true;
        self.start_reported = false;
        self.buffering_index = index;
        self.playing_index = index.checked_sub(1);
    }
}

struct PreviewState {
    collaborators: Collaborators,
    session: Option<Session>,
    active: bool,
    slots: CommandSlots,
    port: u16,
    should_play_sound: bool,
    consecutive_nacks: u32,
    diagnostics: Diagnostics,
}

/// Drives playlist preview on the camera. Every entry point runs under one
/// lock; collaborators and listeners are called while it is held and must
/// report back asynchronously rather than re-entering.
pub struct PreviewOrchestrator {
    state: Mutex<PreviewState>,
    config: PreviewConfig,
}

impl PreviewOrchestrator {
    pub fn new(collaborators: Collaborators, config: PreviewConfig) -> Self {
        let diagnostics = Diagnostics::new(config.diagnostics_capacity);
        Self {
            state: Mutex::new(PreviewState {
                collaborators,
                session: None,
                active: false,
                slots: CommandSlots::new(),
                port: 0,
                should_play_sound: true,
                consecutive_nacks: 0,
                diagnostics,
            }),
            config,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn set_listener(&self, listener: Option<Box<dyn PreviewListener>>) {
        self.state.lock().collaborators.listener = listener;
    }

    pub fn prepare(&self, clips: &[Clip]) -> Result<()> {
        let mut state = self.state.lock();
        if state.session.is_some() {
            return Err(PreviewError::AlreadyPrepared);
        }
        let timeline = Timeline::build(clips)?;
        let total = timeline.total_millis();
        info!("Prepared preview of {} clips ({}ms)", timeline.len(), total);
        state.session = Some(Session::new(timeline));
        state.collaborators.notify(|l| l.on_total_length_set(total));
        Ok(())
    }

    pub fn start(&self) -> Result<()> {
        self.seek(0)
    }

    pub fn seek(&self, position_ms: Millis) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(PreviewError::NotInitialized)?;
        let location = session.timeline.locate(position_ms)?;
        session.begin_seek(millis_to_secs(position_ms), location.index);

        if location.at_end {
            state.collaborators.notify(|l| l.on_end_received());
            return Ok(());
        }

        let clip = session.timeline.entries()[location.index].clip.clone();
        state.seek_for_clip(clip, location.local_secs, None, SeekKind::Scrub)
    }

    /// Seek and stream only `duration_secs` from there (trimmed previews).
    pub fn seek_bounded(&self, position_secs: f64, duration_secs: f64) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let session = state.session.as_mut().ok_or(PreviewError::NotInitialized)?;
        if !position_secs.is_finite() {
            return Err(PreviewError::InvalidInput(format!(
                "seek position {position_secs}s"
            )));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(PreviewError::InvalidInput(format!(
                "preview duration {duration_secs}s"
            )));
        }

        let location = session.timeline.locate(secs_to_millis(position_secs))?;
        session.begin_seek(position_secs, location.index);

        if location.at_end {
            state.collaborators.notify(|l| l.on_end_received());
            return Ok(());
        }

        let clip = session.timeline.entries()[location.index].clip.clone();
        state.seek_for_clip(
            clip,
            location.local_secs,
            Some(duration_secs),
            SeekKind::Bounded,
        )
    }

    pub fn pause(&self, paused: bool) -> Result<()> {
        if !paused {
            return self.start();
        }
        let mut state = self.state.lock();
        state.stop_preview();
        if state.collaborators.server.is_running() {
            state.collaborators.server.stop();
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.state.lock().stop_preview();
    }

    /// Drop the prepared playlist. Safe from any state.
    pub fn release(&self) {
        let mut state = self.state.lock();
        debug!("Releasing preview...");
        state.session = None;
        if let Some(pending) = state.slots.take_pending() {
            debug!("Discarding pending {}", pending);
        }
        if state.collaborators.server.is_running() {
            state.collaborators.server.stop();
        }
    }

    pub fn on_preview_started(&self, success: bool) {
        self.on_command_ack(CommandKind::Start, success);
    }

    pub fn on_preview_stopped(&self, success: bool) {
        self.on_command_ack(CommandKind::Stop, success);
    }

    pub fn on_command_ack(&self, kind: CommandKind, success: bool) {
        let mut state = self.state.lock();
        match state.slots.acknowledge() {
            Some(command) if command.kind() != kind => {
                warn!("{} ack while '{}' was in flight", kind, command);
            }
            Some(_) => {}
            None => state.diagnostics.record(Diagnostic::StaleAck { kind }),
        }

        if success {
            state.consecutive_nacks = 0;
            state.active = kind == CommandKind::Start;
            info!(
                "PreviewVideo {}",
                if state.active { "started" } else { "stopped" }
            );
            state.send_pending();
            return;
        }

        state.consecutive_nacks += 1;
        let consecutive = state.consecutive_nacks;
        state
            .diagnostics
            .record(Diagnostic::RemoteNack { kind, consecutive });
        let threshold = self.config.nack_escalation_threshold;
        if threshold > 0 && consecutive >= threshold {
            state
                .collaborators
                .notify(|l| l.on_command_failed(kind, consecutive));
        }
    }

    /// Treat an unanswered command as lost once the ack timeout elapses.
    pub fn expire_stale_command(&self, now: Instant) -> Option<PreviewCommand> {
        let timeout = self.config.ack_timeout()?;
        let mut state = self.state.lock();
        let expired = state.slots.expire(now, timeout)?;
        state.diagnostics.record(Diagnostic::AckTimeout {
            command: expired.clone(),
        });
        state.send_pending();
        Some(expired)
    }

    pub fn on_buffer_level(&self, level: BufferLevel) {
        let mut state = self.state.lock();
        match level {
            BufferLevel::Empty => {
                info!("Buffering is empty");
                state.collaborators.renderer.pause();
            }
            BufferLevel::Low => info!("Buffering is low"),
            BufferLevel::Ready => {
                info!("Buffering is ready");
                state.collaborators.renderer.play();
            }
        }
    }

    pub fn on_end_of_stream(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.collaborators.renderer.play();

        let Some(session) = state.session.as_mut() else {
            return;
        };
        let next_index = session.buffering_index + 1;
        if next_index >= session.timeline.len() {
            debug!("End of stream for last clip");
            return;
        }

        let finished = session.timeline.entries()[session.buffering_index]
            .clip
            .duration_secs;
        session.current_seek_secs += finished;
        session.buffering_index = next_index;
        let next = session.timeline.entries()[next_index].clip.clone();
        info!("Advancing preview to clip {} ({})", next_index, next.id);

        if let Err(e) = state.seek_for_clip(next, 0.0, None, SeekKind::NextClip) {
            state.diagnostics.record(Diagnostic::StreamServerFailed {
                message: e.to_string(),
            });
        }
    }

    pub fn on_frame(&self, data: &[u8], pts_ms: Millis, is_first_frame: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(session) = state.session.as_mut() else {
            return;
        };

        if is_first_frame {
            let index = session.playing_index.map_or(0, |i| i + 1);
            session.playing_index = Some(index);
            if !session.start_reported {
                session.start_reported = true;
                let at = secs_to_millis(session.current_seek_secs);
                state.collaborators.notify(|l| l.on_preview_started(at));
            }
        } else if session.just_restarted {
            // Tail frame from the stream that was running before the seek.
            session.just_restarted = false;
            return;
        }

        let Some(index) = session.playing_index else {
            return;
        };
        let Some(entry) = session.timeline.entry(index) else {
            warn!("Frame for clip index {} beyond playlist", index);
            return;
        };

        let volume = state.should_play_sound && !entry.clip.muted;
        let position =
            pts_ms - secs_to_millis(entry.clip.start_offset_secs) + entry.offset_millis;

        let collaborators = &mut state.collaborators;
        collaborators.renderer.set_volume_enabled(volume);
        collaborators.notify(|l| l.on_preview_time_progress(position));
        collaborators
            .renderer
            .draw_frame(data, pts_ms, is_first_frame);
    }

    pub fn on_playback_finished(&self) {
        self.state
            .lock()
            .collaborators
            .notify(|l| l.on_end_received());
    }

    pub fn set_volume_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.should_play_sound = enabled;
        state.collaborators.renderer.set_volume_enabled(enabled);
    }

    pub fn is_volume_enabled(&self) -> bool {
        self.state.lock().should_play_sound
    }

    /// Clip currently on screen, or the one being buffered before the first frame.
    pub fn current_clip(&self) -> Option<Clip> {
        let state = self.state.lock();
        let session = state.session.as_ref()?;
        session
            .playing_index
            .and_then(|i| session.timeline.entry(i))
            .map(|e| e.clip.clone())
            .or_else(|| session.current_clip.clone())
    }

    pub fn clips(&self) -> Option<Vec<Clip>> {
        let state = self.state.lock();
        state.session.as_ref().map(|s| s.timeline.clips())
    }

    pub fn clip_index_at(&self, position_ms: Millis) -> Result<usize> {
        let state = self.state.lock();
        let session = state.session.as_ref().ok_or(PreviewError::NotInitialized)?;
        Ok(session.timeline.locate(position_ms)?.index)
    }

    pub fn clip_id_and_offset(&self, position_ms: Millis) -> Result<(ClipId, f64)> {
        let state = self.state.lock();
        let session = state.session.as_ref().ok_or(PreviewError::NotInitialized)?;
        Ok(session.timeline.id_and_offset(position_ms)?)
    }

    pub fn total_millis(&self) -> Option<Millis> {
        let state = self.state.lock();
        state.session.as_ref().map(|s| s.timeline.total_millis())
    }

    pub fn is_preview_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn phase(&self) -> PreviewPhase {
        let state = self.state.lock();
        match (&state.session, state.active) {
            (None, _) => PreviewPhase::Unprepared,
            (Some(_), false) => PreviewPhase::Idle,
            (Some(_), true) => PreviewPhase::Active,
        }
    }

    pub fn in_flight_command(&self) -> Option<PreviewCommand> {
        self.state.lock().slots.in_flight().cloned()
    }

    pub fn pending_command(&self) -> Option<PreviewCommand> {
        self.state.lock().slots.pending().cloned()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.state.lock().diagnostics.snapshot()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.state.lock().diagnostics.drain()
    }
}

impl PreviewState {
    fn current_clip(&self) -> Option<&Clip> {
        self.session.as_ref().and_then(|s| s.current_clip.as_ref())
    }

    fn set_current_clip(&mut self, clip: Clip) {
        if let Some(session) = self.session.as_mut() {
            session.current_clip = Some(clip);
        }
    }

    fn seek_for_clip(
        &mut self,
        clip: Clip,
        local_secs: f64,
        length_secs: Option<f64>,
        kind: SeekKind,
    ) -> Result<()> {
        let length = length_secs.unwrap_or(clip.duration_secs - local_secs);

        if !self.active {
            self.set_current_clip(clip);
            self.start_stream_server()?;
            info!("Sending seek preview command");
            let start = self.start_command(local_secs, length);
            self.dispatch(start);
            return Ok(());
        }

        // Stop what the camera is streaming; its ack releases the new start.
        let stop = self.stop_command();
        self.set_current_clip(clip);
        if let Some(start) = self.start_command(local_secs, length) {
            info!("Scheduling {}", start);
            if let Some(replaced) = self.slots.schedule(start) {
                debug!("Discarding superseded {}", replaced);
            }
        }

        if kind != SeekKind::NextClip {
            self.stop_stream_server();
        }
        match stop {
            Some(stop) => self.dispatch(Some(stop)),
            None => {
                self.diagnostics.record(Diagnostic::MissingCurrentClip);
                if !self.slots.is_busy() {
                    self.send_pending();
                }
            }
        }
        if kind == SeekKind::Bounded {
            self.start_stream_server()?;
        }
        Ok(())
    }

    fn stop_preview(&mut self) {
        if !self.active || self.current_clip().is_none() {
            self.collaborators.renderer.stop();
            return;
        }
        info!("Stopping preview video");
        self.stop_stream_server();
        match self.stop_command() {
            Some(stop) => {
                info!("Sending stop preview command");
                self.dispatch(Some(stop));
            }
            None => self.diagnostics.record(Diagnostic::MissingCurrentClip),
        }
    }

    fn start_command(&self, local_secs: f64, length_secs: f64) -> Option<PreviewCommand> {
        self.current_clip().map(|clip| {
            PreviewCommand::start(
                clip.id.clone(),
                self.port,
                local_secs + clip.start_offset_secs,
                length_secs,
            )
        })
    }

    fn stop_command(&self) -> Option<PreviewCommand> {
        self.current_clip()
            .map(|clip| PreviewCommand::stop(clip.id.clone(), self.port))
    }

    fn start_stream_server(&mut self) -> Result<()> {
        self.port = self.collaborators.server.start()?;
        debug!("Stream server listening on port {}", self.port);
        Ok(())
    }

    fn stop_stream_server(&mut self) {
        self.collaborators.server.stop();
        self.collaborators.renderer.stop_drawing();
    }

    fn dispatch(&mut self, command: Option<PreviewCommand>) {
        match self.slots.submit(command, Instant::now()) {
            Submission::Sent {
                command,
                superseded,
            } => {
                if let Some(stale) = superseded {
                    debug!("Discarding superseded {}", stale);
                }
                debug!("Executing {}", command);
                self.collaborators.channel.send(&command);
            }
            Submission::Queued { replaced } => {
                info!("Adding next preview start to schedule");
                if let Some(replaced) = replaced {
                    debug!("Discarding superseded {}", replaced);
                }
            }
            Submission::Dropped(DropReason::NullCommand) => {
                self.diagnostics.record(Diagnostic::NullCommand);
            }
            Submission::Dropped(DropReason::StopWhileBusy { command, in_flight }) => {
                self.diagnostics
                    .record(Diagnostic::CommandDropped { command, in_flight });
            }
        }
    }

    fn send_pending(&mut self) {
        let Some(mut command) = self.slots.take_pending() else {
            return;
        };
        if let Err(e) = self.start_stream_server() {
            self.diagnostics.record(Diagnostic::StreamServerFailed {
                message: e.to_string(),
            });
            self.slots.schedule(command);
            return;
        }
        command.set_port(self.port);
        info!("Sending scheduled {}", command);
        self.dispatch(Some(command));
    }
}
