use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use rtsp::engine::DEFAULT_VHOST;
use rtsp::media::nal::{is_vcl, nal_type, split_annex_b};
use rtsp::publisher::{DEFAULT_RTSP_PORT, START_CODE};
use rtsp::runtime::parse_level;
use rtsp::{Publisher, PublisherConfig, RtspEngine, RuntimeConfig, StreamKey, VideoTrackConfig};

#[derive(Parser)]
#[command(
    name = "rtsp-publish",
    about = "Publish an Annex-B H.264 file as a live RTSP stream"
)]
struct Args {
    /// Raw H.264 byte-stream file (`.h264` / `.264`)
    file: PathBuf,

    /// RTSP listen port
    #[arg(long, short, default_value_t = DEFAULT_RTSP_PORT)]
    port: u16,

    /// Frames per second used to pace the file
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// Start over at the end of the file instead of exiting
    #[arg(long = "loop")]
    looping: bool,

    #[arg(long, default_value = "live")]
    app: String,

    #[arg(long, default_value = "live")]
    stream: String,

    /// trace, debug, info, warn or error
    #[arg(long, default_value = "info", value_parser = parse_log_level)]
    log_level: tracing::Level,
}

fn parse_log_level(s: &str) -> Result<tracing::Level, String> {
    parse_level(s).ok_or_else(|| format!("unknown log level: {s}"))
}

/// Group the NAL units of a byte-stream into frames: every coded slice
/// closes a frame and takes the parameter sets and SEI before it along.
fn split_frames(data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    let mut current = Vec::new();
    for nal in split_annex_b(data) {
        current.extend_from_slice(&START_CODE);
        current.extend_from_slice(nal);
        if nal_type(nal).is_some_and(is_vcl) {
            frames.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        frames.push(current);
    }
    frames
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.fps.is_nan() || args.fps <= 0.0 {
        eprintln!("--fps must be positive");
        return ExitCode::FAILURE;
    }

    let data = match std::fs::read(&args.file) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args.file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let frames = split_frames(&data);
    if frames.is_empty() {
        eprintln!("No H.264 NAL units in {}", args.file.display());
        return ExitCode::FAILURE;
    }

    let config = PublisherConfig {
        rtsp_port: args.port,
        stream: StreamKey::new(DEFAULT_VHOST, &args.app, &args.stream),
        video: VideoTrackConfig {
            fps: args.fps,
            ..VideoTrackConfig::default()
        },
        runtime: RuntimeConfig {
            log_level: args.log_level,
            ..RuntimeConfig::default()
        },
    };
    let path = config.stream.mount_path();
    let publisher = Publisher::with_config(RtspEngine::new(), config);

    if let Err(e) = publisher.start() {
        eprintln!("Failed to start publisher: {}", e);
        return ExitCode::FAILURE;
    }
    println!(
        "Publishing {} at rtsp://0.0.0.0:{}{}",
        args.file.display(),
        args.port,
        path
    );

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(args.fps));
    let started = Instant::now();
    let mut sent: u32 = 0;

    loop {
        for frame in &frames {
            let pts_us = i64::try_from((frame_interval * sent).as_micros()).unwrap_or(i64::MAX);
            if let Err(e) = publisher.submit_annex_b(frame, pts_us) {
                eprintln!("Failed to publish frame {}: {}", sent, e);
                return ExitCode::FAILURE;
            }
            sent = sent.wrapping_add(1);

            let due = frame_interval * sent;
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
        }
        if !args.looping {
            break;
        }
        tracing::debug!(frames = sent, "end of file, looping");
    }

    tracing::info!(frames = sent, "end of file");
    if let Err(e) = publisher.stop() {
        eprintln!("Failed to stop publisher: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
