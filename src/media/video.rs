//! Periodic camera snapshots encoded as JPEG.

use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::pcm::encode_base64;
use crate::error::{LiveError, Result};
use crate::live::MediaSender;

pub const VIDEO_WIDTH: u32 = 640;
pub const VIDEO_HEIGHT: u32 = 480;
pub const VIDEO_FRAME_INTERVAL: Duration = Duration::from_secs(1);
pub const VIDEO_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub interval: Duration,
    /// 1-100.
    pub jpeg_quality: u8,
}

impl Default for VideoSpec {
    fn default() -> Self {
        Self {
            width: VIDEO_WIDTH,
            height: VIDEO_HEIGHT,
            interval: VIDEO_FRAME_INTERVAL,
            jpeg_quality: VIDEO_JPEG_QUALITY,
        }
    }
}

/// A platform camera.
pub trait CameraSource {
    fn open(&self, spec: &VideoSpec) -> Result<Box<dyn CameraStream>>;
}

/// An open camera. `grab_frame` runs on the blocking pool once per tick and
/// may block until a frame is ready.
pub trait CameraStream: Send {
    fn grab_frame(&mut self) -> Result<RgbImage>;

    fn close(&mut self) {}
}

/// Latest captured frame, for local preview.
pub type PreviewHandle = watch::Receiver<Option<Arc<RgbImage>>>;

struct CaptureRuntime {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Grabs a frame every `spec.interval` and delivers it as base64 JPEG.
pub struct CameraCapture {
    spec: VideoSpec,
    preview: watch::Sender<Option<Arc<RgbImage>>>,
    runtime: Option<CaptureRuntime>,
}

impl Default for CameraCapture {
    fn default() -> Self {
        Self::new(VideoSpec::default())
    }
}

impl std::fmt::Debug for CameraCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraCapture")
            .field("spec", &self.spec)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CameraCapture {
    pub fn new(spec: VideoSpec) -> Self {
        let (preview, _) = watch::channel(None);
        Self {
            spec,
            preview,
            runtime: None,
        }
    }

    pub fn spec(&self) -> &VideoSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn preview(&self) -> PreviewHandle {
        self.preview.subscribe()
    }

    /// Open `camera` and start the frame timer. The first frame is taken one
    /// interval after start. Must be called within a tokio runtime.
    pub fn start<C, F>(&mut self, camera: &C, deliver: F) -> Result<PreviewHandle>
    where
        C: CameraSource + ?Sized,
        F: FnMut(String) + Send + 'static,
    {
        if self.is_active() {
            return Err(LiveError::InvalidState("Camera capture is already running".into()));
        }
        let stream = camera.open(&self.spec).map_err(|error| match error {
            LiveError::DeviceUnavailable(_) => error,
            other => LiveError::DeviceUnavailable(other.to_string()),
        })?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_capture(
            stream,
            self.spec,
            deliver,
            self.preview.clone(),
            cancel.clone(),
        ));
        tracing::debug!(
            width = self.spec.width,
            height = self.spec.height,
            interval_ms = self.spec.interval.as_millis() as u64,
            "camera capture started"
        );
        self.runtime = Some(CaptureRuntime { cancel, task });
        Ok(self.preview.subscribe())
    }

    pub fn start_streaming<C>(&mut self, camera: &C, sender: MediaSender) -> Result<PreviewHandle>
    where
        C: CameraSource + ?Sized,
    {
        self.start(camera, move |frame| {
            sender.send_video(frame);
        })
    }

    /// Stop the timer and release the camera. No delivery happens after this
    /// returns. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.cancel.cancel();
            if let Err(error) = runtime.task.await {
                tracing::warn!(error = %error, "camera task failed");
            }
            tracing::debug!("camera capture stopped");
        }
        self.preview.send_replace(None);
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.cancel.cancel();
            runtime.task.abort();
        }
    }
}

async fn run_capture<F>(
    mut stream: Box<dyn CameraStream>,
    spec: VideoSpec,
    mut deliver: F,
    preview: watch::Sender<Option<Arc<RgbImage>>>,
    cancel: CancellationToken,
) where
    F: FnMut(String) + Send + 'static,
{
    let mut ticker = time::interval_at(Instant::now() + spec.interval, spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // Grabbing and encoding are synchronous; keep them off the runtime workers.
        let joined = tokio::task::spawn_blocking(move || {
            let shot = snapshot(stream.as_mut(), &spec);
            (stream, shot)
        })
        .await;
        let (returned, shot) = match joined {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(error = %error, "camera task panicked");
                return;
            }
        };
        stream = returned;
        if cancel.is_cancelled() {
            break;
        }
        match shot {
            Ok((frame, jpeg)) => {
                preview.send_replace(Some(Arc::new(frame)));
                deliver(encode_base64(&jpeg));
            }
            Err(error) => tracing::warn!(error = %error, "skipping camera frame"),
        }
    }
    stream.close();
}

fn snapshot(stream: &mut dyn CameraStream, spec: &VideoSpec) -> Result<(RgbImage, Vec<u8>)> {
    let mut frame = stream.grab_frame()?;
    if frame.dimensions() != (spec.width, spec.height) {
        frame = imageops::resize(&frame, spec.width, spec.height, FilterType::Triangle);
    }
    let jpeg = encode_jpeg(&frame, spec.jpeg_quality)?;
    Ok((frame, jpeg))
}

/// Encode an RGB frame as baseline JPEG.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(frame)?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_jpeg_produces_decodable_image() {
        let frame = RgbImage::from_pixel(32, 24, image::Rgb([200, 40, 90]));
        let jpeg = encode_jpeg(&frame, 70).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn default_spec_matches_capture_constraints() {
        let spec = VideoSpec::default();
        assert_eq!((spec.width, spec.height), (640, 480));
        assert_eq!(spec.interval, Duration::from_secs(1));
        assert_eq!(spec.jpeg_quality, 70);
    }
}
