// src/bin/camera_probe.rs - Standalone capture check for the default camera
use std::time::{Duration, Instant};

use anyhow::Result;
use mocap_tracker::video::CameraFeed;

#[tokio::main]
async fn main() -> Result<()> {
    println!("Probing default camera...\n");

    let feed = match CameraFeed::open(0) {
        Ok(feed) => {
            println!("✓ Camera opened");
            feed
        }
        Err(e) => {
            println!("✗ Failed to open camera: {e}");
            println!("\nPossible causes:");
            println!("1. Camera permissions not granted");
            println!("2. Camera in use by another application");
            println!("3. No camera connected");
            return Ok(());
        }
    };

    let (width, height) = feed.dimensions();
    println!("✓ Stream started at {width}x{height} (nominal {} fps)", feed.nominal_fps());

    let mut frames = feed.frames();
    let window = Duration::from_secs(3);
    let started = Instant::now();
    let mut first_id: Option<u64> = None;
    let mut last_id = 0u64;
    let mut observed = 0u32;

    while started.elapsed() < window {
        match tokio::time::timeout(Duration::from_millis(500), frames.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => break, // feed closed
            Err(_) => continue,  // nothing new yet
        }
        if let Some(frame) = frames.borrow_and_update().clone() {
            if first_id.is_none() {
                println!(
                    "✓ First frame captured ({}x{})",
                    frame.image.width(),
                    frame.image.height()
                );
                first_id = Some(frame.id);
            }
            last_id = frame.id;
            observed += 1;
        }
    }

    match first_id {
        Some(first) => {
            let elapsed = started.elapsed().as_secs_f64();
            let captured = last_id - first + 1;
            println!(
                "✓ Observed {observed} frames over {elapsed:.1}s ({:.1} fps, {captured} captured by the feed)",
                observed as f64 / elapsed
            );
        }
        None => println!("✗ No frames arrived within {}s", window.as_secs()),
    }
    Ok(())
}
