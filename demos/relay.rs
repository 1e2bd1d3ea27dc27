//! MJPEG relay demo: one camera, logged frames, optional snapshots
//!
//! Run with: cargo run --example relay -- CAMERA_URL [SNAPSHOT_DIR]
//!
//! Examples:
//!   cargo run --example relay -- http://192.168.1.42/stream
//!   cargo run --example relay -- http://192.168.1.42:81/stream ./snapshots
//!
//! Connects to the camera the way the real backend does (single upstream
//! session, frame demuxing), logs the frame cadence, and, when a snapshot
//! directory is given, writes every 100th frame to disk as a JPEG. Stop with
//! Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use camhub::{
    CameraHub, CapturedImage, HubConfig, ImageHandle, ImagePipeline, PipelineError, UploadConfig,
};

/// Pipeline that just logs; this demo has no upload transport wired in
struct LogPipeline;

#[async_trait::async_trait]
impl ImagePipeline for LogPipeline {
    async fn resolve_owner(&self, token: &str) -> Result<String, PipelineError> {
        Ok(token.to_string())
    }

    async fn store_image(&self, image: CapturedImage) -> Result<ImageHandle, PipelineError> {
        tracing::info!(
            owner = %image.owner,
            bytes = image.data.len(),
            "Upload stored (demo: discarded)"
        );
        Ok(ImageHandle(format!("demo-{}", image.data.len())))
    }
}

fn print_usage() {
    eprintln!("Usage: relay CAMERA_URL [SNAPSHOT_DIR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  CAMERA_URL    MJPEG endpoint, e.g. http://192.168.1.42/stream");
    eprintln!("  SNAPSHOT_DIR  Optional directory for every 100th frame");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let Some(camera_url) = args.get(1).cloned() else {
        eprintln!("Error: missing CAMERA_URL");
        eprintln!();
        print_usage();
        std::process::exit(1);
    };
    let snapshot_dir = args.get(2).map(PathBuf::from);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camhub=debug".parse()?)
                .add_directive("relay=info".parse()?),
        )
        .init();

    if let Some(dir) = &snapshot_dir {
        std::fs::create_dir_all(dir)?;
    }

    let config = HubConfig::with_source(&camera_url)
        .upload(UploadConfig::default().fallback_owner("local"));
    let hub = CameraHub::new(config, Arc::new(LogPipeline));

    // Log every phase and membership change
    let mut status = hub.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let snapshot = status.borrow().clone();
            tracing::info!(
                phase = ?snapshot.phase,
                raw = snapshot.raw_subscribers,
                frame = snapshot.frame_subscribers,
                error = snapshot.last_error.as_deref().unwrap_or(""),
                "Upstream status"
            );
        }
    });

    println!("Relaying frames from {}", camera_url);
    if let Some(dir) = &snapshot_dir {
        println!("Writing every 100th frame to {}", dir.display());
    }
    println!("Press Ctrl+C to stop");
    println!();

    let mut sub = hub.join_frame_stream().await?;
    let started = Instant::now();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            received = sub.frames.recv() => {
                match received {
                    Ok(frame) => {
                        frames += 1;
                        if frames % 30 == 0 {
                            let fps = frames as f64 / started.elapsed().as_secs_f64();
                            println!(
                                "{} frames, last {} bytes, {:.1} fps",
                                frames,
                                frame.len(),
                                fps
                            );
                        }
                        if frames % 100 == 0 {
                            if let Some(dir) = &snapshot_dir {
                                let path = dir.join(format!("frame-{:06}.jpg", frames));
                                std::fs::write(&path, &frame)?;
                                println!("Snapshot written: {}", path.display());
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Viewer lagged, frames skipped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        eprintln!("Frame channel closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    hub.leave_frame_stream(sub.id).await?;
    println!("{} frames total in {:?}", frames, started.elapsed());

    Ok(())
}
