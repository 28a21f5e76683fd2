// src/video.rs - Frame sources: decoded video files, synthetic clips, live camera feed
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Rgb, Rgba, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("unsupported video format {0:?} (supported: mp4, mov, avi, mkv, webm)")]
    UnsupportedFormat(String),
    #[error("video file does not exist: {0}")]
    NotFound(PathBuf),
    #[error("ffmpeg/ffprobe is not installed or not in PATH")]
    FfmpegMissing,
    #[error("could not read video metadata: {0}")]
    Probe(String),
    #[error("frame decoding failed: {0}")]
    Decode(String),
    #[error("no decoded frame at index {0}")]
    MissingFrame(usize),
    #[error("camera error: {0}")]
    Camera(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A seekable, finite source of frames. `seek` resolves only once the target
/// frame is current, so `current_frame` right after an awaited seek is the
/// frame at that time.
#[async_trait]
pub trait FrameSource: Send {
    /// Human-readable origin, recorded in session metadata.
    fn describe(&self) -> String;

    fn duration(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    fn current_time(&self) -> f64;

    async fn seek(&mut self, time: f64) -> Result<(), VideoError>;

    fn current_frame(&self) -> Result<DynamicImage, VideoError>;
}

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub duration: f64,
    pub fps: f64,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

/// Video file decoded up front into an in-memory frame cache.
///
/// ffprobe supplies the metadata, ffmpeg dumps every frame as PNG into a
/// temp directory which is deleted after loading. Seeks then become pure
/// index math over the cache.
pub struct VideoFileReader {
    info: VideoInfo,
    frames: Vec<DynamicImage>,
    current_index: usize,
    current_time: f64,
    loaded: bool,
    loading_progress: f32,
    loading_message: String,
}

impl VideoFileReader {
    /// Probes the file without decoding any frames. The extension gate runs
    /// first so unsupported inputs are rejected before ffprobe is involved.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(VideoError::UnsupportedFormat(extension));
        }
        if !path.exists() {
            return Err(VideoError::NotFound(path));
        }

        let info = probe_video(&path).await?;
        info!(
            path = %info.path.display(),
            duration = info.duration,
            fps = info.fps,
            frames = info.frame_count,
            "video opened"
        );
        Ok(Self {
            info,
            frames: Vec::new(),
            current_index: 0,
            current_time: 0.0,
            loaded: false,
            loading_progress: 0.0,
            loading_message: String::new(),
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn loading_progress(&self) -> f32 {
        self.loading_progress
    }

    pub fn loading_message(&self) -> &str {
        &self.loading_message
    }

    /// Decodes every frame into the cache. Idempotent; the first `seek`
    /// calls this implicitly if the caller has not.
    pub async fn load_frames(&mut self) -> Result<(), VideoError> {
        if self.loaded {
            return Ok(());
        }
        info!(frames = self.info.frame_count, "decoding video frames");
        self.loading_message = format!("Extracting {} frames...", self.info.frame_count);
        self.loading_progress = 0.1;

        let temp_dir = std::env::temp_dir().join(format!("mocap_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&temp_dir)?;
        let pattern = temp_dir.join("frame_%05d.png");

        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&self.info.path)
            .arg(&pattern)
            .status()
            .await
            .map_err(|_| VideoError::FfmpegMissing)?;
        if !status.success() {
            let _ = std::fs::remove_dir_all(&temp_dir);
            return Err(VideoError::Decode("ffmpeg frame extraction failed".to_string()));
        }

        self.loading_progress = 0.5;
        self.loading_message = "Loading frames into memory...".to_string();

        self.frames.clear();
        for i in 1..=self.info.frame_count {
            let frame_path = temp_dir.join(format!("frame_{i:05}.png"));
            if !frame_path.exists() {
                warn!(index = i, "decoded frame missing, stopping early");
                break;
            }
            match image::open(&frame_path) {
                Ok(img) => self.frames.push(img),
                Err(e) => warn!(index = i, error = %e, "skipping unreadable frame"),
            }
            self.loading_progress = 0.5 + 0.5 * (i as f32 / self.info.frame_count as f32);
        }
        let _ = std::fs::remove_dir_all(&temp_dir);

        if self.frames.is_empty() {
            return Err(VideoError::Decode(
                "no frames could be loaded from the video".to_string(),
            ));
        }
        if self.frames.len() != self.info.frame_count {
            debug!(
                expected = self.info.frame_count,
                actual = self.frames.len(),
                "frame count adjusted after decode"
            );
            self.info.frame_count = self.frames.len();
        }

        self.loaded = true;
        self.loading_progress = 1.0;
        self.loading_message = format!("Loaded {} frames", self.frames.len());
        Ok(())
    }
}

#[async_trait]
impl FrameSource for VideoFileReader {
    fn describe(&self) -> String {
        self.info
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.info.path.display().to_string())
    }

    fn duration(&self) -> f64 {
        self.info.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    async fn seek(&mut self, time: f64) -> Result<(), VideoError> {
        if !self.loaded {
            self.load_frames().await?;
        }
        let clamped = time.clamp(0.0, self.info.duration);
        let index = ((clamped * self.info.fps).round() as usize)
            .min(self.info.frame_count.saturating_sub(1));
        self.current_index = index;
        self.current_time = clamped;
        Ok(())
    }

    fn current_frame(&self) -> Result<DynamicImage, VideoError> {
        self.frames
            .get(self.current_index)
            .cloned()
            .ok_or(VideoError::MissingFrame(self.current_index))
    }
}

async fn probe_video(path: &Path) -> Result<VideoInfo, VideoError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_frames",
            "-show_entries",
            "stream=width,height,r_frame_rate,nb_read_frames",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|_| VideoError::FfmpegMissing)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::Probe(stderr.trim().to_string()));
    }

    // Two csv lines: "width,height,r_frame_rate,nb_read_frames" then the
    // container duration.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let stream = lines
        .next()
        .ok_or_else(|| VideoError::Probe("empty ffprobe output".to_string()))?
        .trim();
    let parts: Vec<&str> = stream.split(',').collect();
    if parts.len() < 4 {
        return Err(VideoError::Probe(format!("unexpected stream info {stream:?}")));
    }
    let width: u32 = parts[0]
        .parse()
        .map_err(|_| VideoError::Probe(format!("invalid width {:?}", parts[0])))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| VideoError::Probe(format!("invalid height {:?}", parts[1])))?;
    let fps = parse_frame_rate(parts[2])?;
    let frame_count: usize = parts[3]
        .parse()
        .map_err(|_| VideoError::Probe(format!("invalid frame count {:?}", parts[3])))?;
    if frame_count == 0 {
        return Err(VideoError::Probe("video has no frames".to_string()));
    }

    let duration = lines
        .next()
        .and_then(|line| line.trim().parse::<f64>().ok())
        .unwrap_or_else(|| if fps > 0.0 { frame_count as f64 / fps } else { 0.0 });

    Ok(VideoInfo {
        path: path.to_path_buf(),
        duration,
        fps,
        frame_count,
        width,
        height,
    })
}

/// Parses ffprobe's rational frame rate ("30000/1001") or a plain number.
fn parse_frame_rate(raw: &str) -> Result<f64, VideoError> {
    let value = if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num
            .parse()
            .map_err(|_| VideoError::Probe(format!("invalid frame rate {raw:?}")))?;
        let den: f64 = den
            .parse()
            .map_err(|_| VideoError::Probe(format!("invalid frame rate {raw:?}")))?;
        if den == 0.0 {
            return Err(VideoError::Probe(format!("invalid frame rate {raw:?}")));
        }
        num / den
    } else {
        raw.parse()
            .map_err(|_| VideoError::Probe(format!("invalid frame rate {raw:?}")))?
    };
    if value <= 0.0 {
        return Err(VideoError::Probe(format!("invalid frame rate {raw:?}")));
    }
    Ok(value)
}

/// In-memory solid-color source for demos, offline runs and tests.
pub struct SyntheticSource {
    name: String,
    duration: f64,
    width: u32,
    height: u32,
    fill: Rgba<u8>,
    current_time: f64,
}

impl SyntheticSource {
    pub fn new(duration: f64, width: u32, height: u32) -> Self {
        Self {
            name: format!("synthetic_{duration}s"),
            duration,
            width,
            height,
            fill: Rgba([32, 32, 40, 255]),
            current_time: 0.0,
        }
    }

    pub fn with_fill(mut self, fill: Rgba<u8>) -> Self {
        self.fill = fill;
        self
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    async fn seek(&mut self, time: f64) -> Result<(), VideoError> {
        self.current_time = time.clamp(0.0, self.duration);
        Ok(())
    }

    fn current_frame(&self) -> Result<DynamicImage, VideoError> {
        let buffer = ImageBuffer::from_pixel(self.width, self.height, self.fill);
        Ok(DynamicImage::ImageRgba8(buffer))
    }
}

/// Latest decoded camera frame. Pixels are reference-counted so the channel
/// can fan a frame out without copying them.
#[derive(Clone)]
pub struct CameraFrame {
    /// Counts up from 1; gaps tell a consumer how many frames it missed.
    pub id: u64,
    /// Seconds since the feed opened.
    pub elapsed: f64,
    pub image: Arc<DynamicImage>,
}

/// Camera capture on a dedicated thread publishing into a latest-value
/// channel: a slow consumer sees only the newest frame, older ones are
/// overwritten unseen.
pub struct CameraFeed {
    receiver: watch::Receiver<Option<CameraFrame>>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    fps: u32,
}

impl CameraFeed {
    pub fn open(index: u32) -> Result<Self, VideoError> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(
            CameraFormat::new(Resolution::new(640, 480), FrameFormat::MJPEG, 30),
        ));
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| VideoError::Camera(format!("failed to open camera {index}: {e}")))?;
        let resolution = camera.resolution();
        let fps = camera.frame_rate();
        camera
            .open_stream()
            .map_err(|e| VideoError::Camera(format!("failed to start camera stream: {e}")))?;
        info!(index, width = resolution.width(), height = resolution.height(), fps, "camera opened");

        let (sender, receiver) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        thread::spawn(move || capture_loop(camera, sender, thread_running));

        Ok(Self {
            receiver,
            running,
            width: resolution.width(),
            height: resolution.height(),
            fps,
        })
    }

    /// A latest-frame receiver. Each clone observes only frames published
    /// after it last looked; intermediate frames are dropped, not queued.
    pub fn frames(&self) -> watch::Receiver<Option<CameraFrame>> {
        self.receiver.clone()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn nominal_fps(&self) -> u32 {
        self.fps
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

fn capture_loop(
    mut camera: Camera,
    sender: watch::Sender<Option<CameraFrame>>,
    running: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let mut id: u64 = 0;
    while running.load(Ordering::Acquire) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(error = %e, "camera frame capture failed");
                thread::sleep(Duration::from_millis(50));
                continue;
            }
        };
        let decoded = match buffer.decode_image::<RgbFormat>() {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "camera frame decode failed");
                continue;
            }
        };
        let image = match mirrored_rgba(decoded) {
            Some(image) => image,
            None => continue,
        };
        id += 1;
        let frame = CameraFrame {
            id,
            elapsed: started.elapsed().as_secs_f64(),
            image: Arc::new(image),
        };
        if sender.send(Some(frame)).is_err() {
            break; // every receiver is gone
        }
    }
    let _ = camera.stop_stream();
    debug!("camera capture thread stopped");
}

/// RGB camera buffer to RGBA, flipped horizontally so the preview behaves
/// like a mirror.
fn mirrored_rgba(decoded: ImageBuffer<Rgb<u8>, Vec<u8>>) -> Option<DynamicImage> {
    let width = decoded.width();
    let height = decoded.height();
    let rgb = decoded.into_raw();
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for pixel in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
    }
    let buffer: RgbaImage = ImageBuffer::from_raw(width, height, rgba)?;
    Some(DynamicImage::ImageRgba8(image::imageops::flip_horizontal(
        &buffer,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_unknown_extension() {
        let result = VideoFileReader::open("clip.xyz").await;
        assert!(matches!(result, Err(VideoError::UnsupportedFormat(ext)) if ext == "xyz"));
    }

    #[tokio::test]
    async fn test_open_rejects_missing_extension() {
        let result = VideoFileReader::open("clip").await;
        assert!(matches!(result, Err(VideoError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_missing_file() {
        let result = VideoFileReader::open("definitely_not_here.mp4").await;
        assert!(matches!(result, Err(VideoError::NotFound(_))));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/1").unwrap(), 25.0);
        assert_eq!(parse_frame_rate("24").unwrap(), 24.0);
        assert!(parse_frame_rate("25/0").is_err());
        assert!(parse_frame_rate("garbage").is_err());
        assert!(parse_frame_rate("0/1").is_err());
    }

    #[tokio::test]
    async fn test_synthetic_source_basics() {
        let mut source = SyntheticSource::new(2.0, 64, 48);
        assert_eq!(source.describe(), "synthetic_2s");
        assert_eq!(source.duration(), 2.0);
        assert_eq!(source.dimensions(), (64, 48));
        assert_eq!(source.current_time(), 0.0);

        source.seek(1.25).await.unwrap();
        assert_eq!(source.current_time(), 1.25);

        let frame = source.current_frame().unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
    }

    #[tokio::test]
    async fn test_synthetic_seek_clamps() {
        let mut source = SyntheticSource::new(2.0, 8, 8);
        source.seek(99.0).await.unwrap();
        assert_eq!(source.current_time(), 2.0);
        source.seek(-5.0).await.unwrap();
        assert_eq!(source.current_time(), 0.0);
    }

    #[test]
    fn test_mirrored_rgba_flips() {
        let mut rgb: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        let mirrored = mirrored_rgba(rgb).unwrap().to_rgba8();
        assert_eq!(mirrored.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(mirrored.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }
}
