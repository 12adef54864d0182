use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use preview::{
    Collaborators, PreviewCommand, PreviewConfig, PreviewNotification, PreviewOrchestrator,
    PreviewRuntime,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use timeline::{parse_playlist, Clip, Millis, Timecode, Timeline};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod sim;

use sim::{LogRenderer, LoopbackStreamServer, SimSettings, SimulatedCamera};

#[derive(Parser)]
#[command(name = "preview-cli")]
#[command(about = "Inspect camera playlists and rehearse preview playback")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the clips of a playlist laid out on the timeline
    Info {
        /// Playlist JSON file (array of clips)
        #[arg(short, long)]
        playlist: PathBuf,
    },

    /// Resolve a timeline position to a clip and in-file offset
    Locate {
        #[arg(short, long)]
        playlist: PathBuf,

        /// Position as HH:MM:SS.mmm, MM:SS.mmm, SS.mmm or milliseconds
        position: String,
    },

    /// Play a playlist against a simulated camera
    Simulate {
        #[arg(short, long)]
        playlist: PathBuf,

        /// Start position (defaults to the beginning)
        #[arg(long)]
        seek: Option<String>,

        /// Preview config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "25")]
        fps: f64,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Delay before the camera acknowledges a command
        #[arg(long, default_value = "30")]
        latency_ms: u64,

        /// Give up when no notification arrives for this long
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Info { playlist } => info_command(&playlist),
        Commands::Locate { playlist, position } => locate_command(&playlist, &position),
        Commands::Simulate {
            playlist,
            seek,
            config,
            fps,
            speed,
            latency_ms,
            timeout_secs,
        } => simulate_command(
            &playlist,
            seek.as_deref(),
            config.as_deref(),
            SimSettings {
                fps,
                speed,
                ack_latency_ms: latency_ms,
            },
            Duration::from_secs(timeout_secs),
        ),
    }
}

fn load_playlist(path: &Path) -> Result<Vec<Clip>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read playlist {}", path.display()))?;
    let clips = parse_playlist(&json)
        .with_context(|| format!("failed to parse playlist {}", path.display()))?;
    info!("Loaded {} clips from {}", clips.len(), path.display());
    Ok(clips)
}

fn parse_position(position: &str) -> Result<Millis> {
    let timecode =
        Timecode::parse(position).with_context(|| format!("invalid position '{position}'"))?;
    Ok(timecode.to_millis())
}

fn info_command(path: &Path) -> Result<()> {
    let clips = load_playlist(path)?;
    let timeline = Timeline::build(&clips)?;

    println!("{:>3}  {:<24} {:>14} {:>10} {:>9}", "#", "clip", "starts at", "length", "trim");
    for (index, entry) in timeline.entries().iter().enumerate() {
        let clip = &entry.clip;
        println!(
            "{:>3}  {:<24} {:>14} {:>9.3}s {:>8.3}s{}",
            index,
            clip.id.as_str(),
            Timecode::from_millis(entry.offset_millis).to_string(),
            clip.duration_secs,
            clip.start_offset_secs,
            if clip.muted { "  (muted)" } else { "" }
        );
    }
    println!(
        "total: {} ({} ms)",
        Timecode::from_millis(timeline.total_millis()),
        timeline.total_millis()
    );
    Ok(())
}

fn locate_command(path: &Path, position: &str) -> Result<()> {
    let clips = load_playlist(path)?;
    let timeline = Timeline::build(&clips)?;
    let position = parse_position(position)?;

    let location = timeline.locate(position)?;
    let (clip_id, offset) = timeline.id_and_offset(position)?;
    println!("position:  {} ({} ms)", Timecode::from_millis(position), position);
    println!("clip:      #{} {}", location.index, clip_id);
    println!("local:     {:.3}s", location.local_secs);
    println!("in file:   {:.3}s", offset);
    if location.at_end {
        println!("(end of playlist)");
    }
    Ok(())
}

fn simulate_command(
    path: &Path,
    seek: Option<&str>,
    config_path: Option<&Path>,
    settings: SimSettings,
    timeout: Duration,
) -> Result<()> {
    sim::validate(&settings)?;
    let clips = load_playlist(path)?;
    let config = match config_path {
        Some(p) => PreviewConfig::load(p)?,
        None => PreviewConfig::default(),
    };
    let seek_to = seek.map(parse_position).transpose()?;
    let Some(last_clip) = clips.last().map(|c| c.id.clone()) else {
        bail!("playlist {} has no clips", path.display());
    };

    let (cmd_tx, cmd_rx) = unbounded::<PreviewCommand>();
    let (note_tx, note_rx) = unbounded::<PreviewNotification>();
    let collaborators = Collaborators::new(
        cmd_tx,
        LoopbackStreamServer::default(),
        LogRenderer::default(),
    )
    .with_listener(note_tx);

    let preview = Arc::new(PreviewOrchestrator::new(collaborators, config));
    let runtime = PreviewRuntime::start(preview.clone());
    let camera = SimulatedCamera::spawn(cmd_rx, runtime.sender(), last_clip, settings);

    preview.prepare(&clips)?;
    match seek_to {
        Some(position) => preview.seek(position)?,
        None => preview.start()?,
    }

    let outcome = loop {
        match note_rx.recv_timeout(timeout) {
            Ok(note) => {
                print_notification(&note);
                match note {
                    PreviewNotification::EndReceived => break Ok(()),
                    PreviewNotification::CommandFailed {
                        kind,
                        consecutive_failures,
                    } => {
                        break Err(anyhow::anyhow!(
                            "camera rejected {kind} {consecutive_failures} times in a row"
                        ))
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                break Err(anyhow::anyhow!(
                    "no preview progress for {}s",
                    timeout.as_secs()
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                break Err(anyhow::anyhow!("preview shut down unexpectedly"))
            }
        }
    };

    preview.stop();
    preview.release();
    drop(camera);
    runtime.shutdown();

    for diagnostic in preview.take_diagnostics() {
        warn!("diagnostic: {}", diagnostic);
    }
    outcome
}

fn print_notification(note: &PreviewNotification) {
    match note {
        PreviewNotification::TotalLengthSet { total_ms } => {
            println!("length    {}", Timecode::from_millis(*total_ms))
        }
        PreviewNotification::PreviewStarted { at_ms } => {
            println!("started   {}", Timecode::from_millis(*at_ms))
        }
        PreviewNotification::TimeProgress { position_ms } => {
            println!("progress  {}", Timecode::from_millis(*position_ms))
        }
        PreviewNotification::EndReceived => println!("end"),
        PreviewNotification::CommandFailed {
            kind,
            consecutive_failures,
        } => println!("failed    {} x{}", kind, consecutive_failures),
    }
}
