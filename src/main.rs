// src/main.rs - Command-line front end for the capture pipeline
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, RgbaImage};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mocap_tracker::detector::{DetectorOptions, DetectorSlot, SimulatedDetector};
use mocap_tracker::extract::{ExtractionEngine, ExtractionOutcome, ExtractionPhase};
use mocap_tracker::overlay::OverlayRenderer;
use mocap_tracker::report::AngleReport;
use mocap_tracker::session::Session;
use mocap_tracker::upload::{default_session_name, DirectoryStore, SessionStore, UploadRequest};
use mocap_tracker::video::{SyntheticSource, VideoFileReader};

const USAGE: &str = "\
mocap_tracker <command> [options]

Commands:
  extract <video|synthetic[:SECONDS]> [--fps N] [--no-body] [--no-face] [--out FILE]
      Sample a video file (or a synthetic clip) through the landmark
      detectors and store the sealed session record. Without --out the
      session goes to the session directory under a timestamped name.
  info <session.json>
      Print session metadata and detection statistics.
  angles <session.json> [--out FILE]
      Write the per-frame joint angle table as CSV (stdout by default),
      then print a summary.
  overlay <session.json> <out-dir> [--size WxH]
      Render one skeleton overlay PNG per frame.
  sessions [--dir DIR]
      List stored sessions, newest first.
";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("extract") => cmd_extract(&args[1..]).await,
        Some("info") => cmd_info(&args[1..]),
        Some("angles") => cmd_angles(&args[1..]),
        Some("overlay") => cmd_overlay(&args[1..]),
        Some("sessions") => cmd_sessions(&args[1..]).await,
        _ => {
            eprint!("{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn cmd_extract(args: &[String]) -> Result<()> {
    let mut source_arg: Option<String> = None;
    let mut fps = 10.0_f64;
    let mut track_body = true;
    let mut track_face = true;
    let mut out: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--fps" => {
                fps = iter
                    .next()
                    .context("--fps needs a value")?
                    .parse()
                    .context("invalid --fps value")?;
            }
            "--no-body" => track_body = false,
            "--no-face" => track_face = false,
            "--out" => out = Some(PathBuf::from(iter.next().context("--out needs a value")?)),
            other if !other.starts_with("--") && source_arg.is_none() => {
                source_arg = Some(other.to_string());
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }
    let source_arg = source_arg.context("missing source: a video file or synthetic[:SECONDS]")?;

    let body = if track_body {
        DetectorSlot::enabled(SimulatedDetector::body())
    } else {
        DetectorSlot::Disabled
    };
    let face = if track_face {
        DetectorSlot::enabled(SimulatedDetector::face())
    } else {
        DetectorSlot::Disabled
    };
    let mut engine = ExtractionEngine::new(body, face, DetectorOptions::default());
    let cancel = CancellationToken::new();

    // Ctrl-C requests a cooperative stop; the in-flight frame finishes and
    // the run returns its draft.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress = engine.progress();
    let reporter = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let report = progress.report();
            match report.phase {
                ExtractionPhase::Running => {
                    let pct = (report.progress * 100.0).round() as u32;
                    info!(
                        progress_pct = pct,
                        eta_s = report.eta_seconds,
                        frames = report.frames_done,
                        "extracting"
                    );
                }
                ExtractionPhase::Idle | ExtractionPhase::Initializing => {}
                _ => break,
            }
        }
    });

    let outcome = if let Some(rest) = source_arg.strip_prefix("synthetic") {
        let seconds: f64 = rest
            .strip_prefix(':')
            .map(str::parse)
            .transpose()
            .context("invalid synthetic duration")?
            .unwrap_or(2.0);
        let mut source = SyntheticSource::new(seconds, 640, 480);
        engine.run(&mut source, fps, &cancel).await?
    } else {
        let mut source = VideoFileReader::open(&source_arg).await?;
        engine.run(&mut source, fps, &cancel).await?
    };
    reporter.abort();

    match outcome {
        ExtractionOutcome::Completed(session) => {
            println!(
                "Extracted {} frames ({} with detections) from {}",
                session.frame_count, session.detected_frames, session.source
            );
            match out {
                Some(path) => {
                    session.save(&path)?;
                    println!("Session written to {}", path.display());
                }
                None => {
                    let store = DirectoryStore::new(DirectoryStore::default_root());
                    let receipt = store
                        .upload(UploadRequest {
                            name: default_session_name(),
                            session,
                        })
                        .await?;
                    println!("Session stored as {} ({})", receipt.name, receipt.location);
                }
            }
        }
        ExtractionOutcome::Cancelled(draft) => {
            // Only sealed sessions are stored; a cancelled draft is reported
            // and dropped.
            println!(
                "Cancelled after {} frames; nothing was stored",
                draft.len()
            );
        }
    }
    Ok(())
}

fn cmd_info(args: &[String]) -> Result<()> {
    let path = args.first().context("missing session file")?;
    let session = Session::load(path).with_context(|| format!("could not load {path}"))?;

    println!("Source:    {}", session.source);
    println!("Duration:  {:.2}s", session.duration);
    println!("Rate:      {:.1} fps", session.settings.fps);
    println!(
        "Tracking:  body={} face={}",
        session.settings.track_body, session.settings.track_face
    );
    println!("Frames:    {}", session.frame_count);
    let rate = if session.frame_count > 0 {
        session.detected_frames as f64 / session.frame_count as f64 * 100.0
    } else {
        0.0
    };
    println!("Detected:  {} ({rate:.1}%)", session.detected_frames);
    Ok(())
}

fn cmd_angles(args: &[String]) -> Result<()> {
    let path = args.first().context("missing session file")?;
    let mut out: Option<PathBuf> = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" => out = Some(PathBuf::from(iter.next().context("--out needs a value")?)),
            other => bail!("unrecognized argument: {other}"),
        }
    }

    let session = Session::load(path).with_context(|| format!("could not load {path}"))?;
    let report = AngleReport::from_session(&session);
    match out {
        Some(path) => {
            let written = report.export_csv(&path)?;
            println!("Angle table written to {}", written.display());
        }
        None => report.write_csv(std::io::stdout().lock())?,
    }
    eprint!("{}", report.summary(&session));
    Ok(())
}

fn cmd_overlay(args: &[String]) -> Result<()> {
    let path = args.first().context("missing session file")?;
    let out_dir = PathBuf::from(args.get(1).context("missing output directory")?);
    let mut size = (640u32, 480u32);
    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--size" => {
                let raw = iter.next().context("--size needs a value like 640x480")?;
                let (w, h) = raw
                    .split_once('x')
                    .context("--size must look like 640x480")?;
                size = (
                    w.parse().context("invalid --size width")?,
                    h.parse().context("invalid --size height")?,
                );
            }
            other => bail!("unrecognized argument: {other}"),
        }
    }

    let session = Session::load(path).with_context(|| format!("could not load {path}"))?;
    std::fs::create_dir_all(&out_dir)?;

    let renderer = OverlayRenderer::default();
    let mut surface = RgbaImage::new(size.0, size.1);
    let backdrop = DynamicImage::new_rgba8(size.0, size.1);
    for frame in session.frames() {
        renderer.render(&mut surface, &backdrop, frame.body.as_deref());
        let out_path = out_dir.join(format!("frame_{:05}.png", frame.index));
        surface
            .save(&out_path)
            .with_context(|| format!("could not write {}", out_path.display()))?;
    }
    println!(
        "Rendered {} overlay frames into {}",
        session.frame_count,
        out_dir.display()
    );
    Ok(())
}

async fn cmd_sessions(args: &[String]) -> Result<()> {
    let mut root = DirectoryStore::default_root();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => root = PathBuf::from(iter.next().context("--dir needs a value")?),
            other => bail!("unrecognized argument: {other}"),
        }
    }

    let store = DirectoryStore::new(&root);
    let sessions = store.list().await?;
    if sessions.is_empty() {
        println!("No sessions in {}", root.display());
        return Ok(());
    }
    println!("{} session(s) in {}", sessions.len(), root.display());
    for entry in sessions {
        println!(
            "  {:<28} {:>5} frames  {:>7.2}s  {}",
            entry.name,
            entry.frame_count,
            entry.duration,
            entry.modified.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
