//! Camera capture pipeline on a paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use image::{ImageFormat, Rgb, RgbImage};
use livelink::error::{LiveError, Result};
use livelink::media::pcm::decode_base64;
use livelink::media::{CameraCapture, CameraSource, CameraStream, VideoSpec};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

#[derive(Clone, Default)]
struct FakeCamera {
    grabs: Arc<AtomicUsize>,
    grab_threads: Arc<Mutex<Vec<ThreadId>>>,
    closed: Arc<AtomicBool>,
    fail_first_grab: bool,
    unplugged: bool,
}

struct FakeStream {
    camera: FakeCamera,
}

impl CameraSource for FakeCamera {
    fn open(&self, _spec: &VideoSpec) -> Result<Box<dyn CameraStream>> {
        if self.unplugged {
            return Err(LiveError::DeviceUnavailable("no camera".into()));
        }
        Ok(Box::new(FakeStream {
            camera: self.clone(),
        }))
    }
}

impl CameraStream for FakeStream {
    fn grab_frame(&mut self) -> Result<RgbImage> {
        let grab = self.camera.grabs.fetch_add(1, Ordering::SeqCst);
        self.camera
            .grab_threads
            .lock()
            .unwrap()
            .push(thread::current().id());
        if self.camera.fail_first_grab && grab == 0 {
            return Err(LiveError::DeviceUnavailable("camera busy".into()));
        }
        Ok(RgbImage::from_pixel(320, 240, Rgb([10, 120, 240])))
    }

    fn close(&mut self) {
        self.camera.closed.store(true, Ordering::SeqCst);
    }
}

fn frames() -> (
    mpsc::UnboundedReceiver<String>,
    impl FnMut(String) + Send + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (rx, move |frame| {
        let _ = tx.send(frame);
    })
}

#[tokio::test(start_paused = true)]
async fn first_frame_arrives_one_interval_after_start() {
    let camera = FakeCamera::default();
    let (mut rx, deliver) = frames();
    let mut capture = CameraCapture::default();
    let preview = capture.start(&camera, deliver).unwrap();

    sleep(Duration::from_millis(999)).await;
    assert!(rx.try_recv().is_err());
    assert!(preview.borrow().is_none());

    sleep(Duration::from_millis(2)).await;
    let frame = rx.try_recv().expect("one frame after the first interval");
    let jpeg = decode_base64(&frame).unwrap();
    let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 480));

    let latest = preview.borrow().clone().expect("preview should hold the frame");
    assert_eq!(latest.dimensions(), (640, 480));

    capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn frames_follow_the_interval_until_stopped() {
    let camera = FakeCamera::default();
    let (mut rx, deliver) = frames();
    let mut capture = CameraCapture::default();
    let preview = capture.start(&camera, deliver).unwrap();

    sleep(Duration::from_millis(3_500)).await;
    capture.stop().await;
    let mut delivered = 0;
    while rx.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 3);
    assert!(camera.closed.load(Ordering::SeqCst));
    assert!(preview.borrow().is_none());

    sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(camera.grabs.load(Ordering::SeqCst), 3);

    capture.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_grab_is_skipped() {
    let camera = FakeCamera {
        fail_first_grab: true,
        ..FakeCamera::default()
    };
    let (mut rx, deliver) = frames();
    let mut capture = CameraCapture::default();
    capture.start(&camera, deliver).unwrap();

    sleep(Duration::from_millis(2_500)).await;
    capture.stop().await;

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert_eq!(camera.grabs.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn frames_are_grabbed_off_the_runtime_thread() {
    let camera = FakeCamera::default();
    let (mut rx, deliver) = frames();
    let mut capture = CameraCapture::default();
    capture.start(&camera, deliver).unwrap();

    sleep(Duration::from_millis(1_500)).await;
    capture.stop().await;
    assert!(rx.try_recv().is_ok());

    let runtime_thread = thread::current().id();
    let threads = camera.grab_threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], runtime_thread);
}

#[tokio::test]
async fn missing_camera_reports_unavailable() {
    let camera = FakeCamera {
        unplugged: true,
        ..FakeCamera::default()
    };
    let mut capture = CameraCapture::default();
    let error = capture.start(&camera, |_| {}).unwrap_err();
    assert!(matches!(error, LiveError::DeviceUnavailable(_)));
    assert!(!capture.is_active());
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    let camera = FakeCamera::default();
    let mut capture = CameraCapture::default();
    capture.start(&camera, |_| {}).unwrap();
    assert!(matches!(
        capture.start(&camera, |_| {}),
        Err(LiveError::InvalidState(_))
    ));
    capture.stop().await;
    assert!(!capture.is_active());
}
