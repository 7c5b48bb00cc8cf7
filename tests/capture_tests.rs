//! Microphone capture pipeline against a fake input device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use livelink::config::SessionConfig;
use livelink::error::{LiveError, Result};
use livelink::live::LiveSession;
use livelink::media::pcm::decode_pcm16_base64;
use livelink::media::{AudioInputDevice, BlockCallback, CaptureSpec, InputStream, MicCapture};

/// Keeps the block callback reachable after close so tests can simulate a
/// late device callback.
#[derive(Clone, Default)]
struct FakeMic {
    callback: Arc<Mutex<Option<BlockCallback>>>,
    opened_with: Arc<Mutex<Vec<CaptureSpec>>>,
    closed: Arc<AtomicUsize>,
    denied: bool,
}

impl FakeMic {
    fn push(&self, block: &[f32]) {
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(block);
        }
    }
}

struct FakeStream {
    closed: Arc<AtomicUsize>,
}

impl InputStream for FakeStream {
    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioInputDevice for FakeMic {
    fn open(&self, spec: &CaptureSpec, on_block: BlockCallback) -> Result<Box<dyn InputStream>> {
        if self.denied {
            return Err(LiveError::DeviceUnavailable("permission denied".into()));
        }
        self.opened_with.lock().unwrap().push(*spec);
        *self.callback.lock().unwrap() = Some(on_block);
        Ok(Box::new(FakeStream {
            closed: Arc::clone(&self.closed),
        }))
    }
}

fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(String) + Send + 'static) {
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&chunks);
    (chunks, move |chunk| sink.lock().unwrap().push(chunk))
}

#[test]
fn each_block_becomes_one_pcm16_chunk() {
    let mic = FakeMic::default();
    let (chunks, deliver) = collector();
    let mut capture = MicCapture::default();
    capture.start(&mic, deliver).unwrap();

    let block: Vec<f32> = (0..4096).map(|i| ((i % 64) as f32 - 32.0) / 64.0).collect();
    mic.push(&block);
    mic.push(&block);

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 2);
    let decoded = decode_pcm16_base64(&chunks[0]).unwrap();
    assert_eq!(decoded.len(), 4096);
    for (original, restored) in block.iter().zip(&decoded) {
        assert!((original - restored).abs() <= 1.0 / 32_768.0);
    }
    assert_eq!(capture.delivered_chunks(), 2);
}

#[test]
fn device_is_opened_with_capture_constraints() {
    let mic = FakeMic::default();
    let mut capture = MicCapture::default();
    capture.start(&mic, |_| {}).unwrap();

    let opened = mic.opened_with.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].sample_rate, 16_000);
    assert_eq!(opened[0].block_size, 4096);
    assert!(opened[0].echo_cancellation);
    assert!(opened[0].noise_suppression);
    assert!(opened[0].auto_gain_control);
}

#[test]
fn late_device_callbacks_after_stop_deliver_nothing() {
    let mic = FakeMic::default();
    let (chunks, deliver) = collector();
    let mut capture = MicCapture::default();
    capture.start(&mic, deliver).unwrap();

    mic.push(&[0.0; 4096]);
    capture.stop();
    mic.push(&[0.0; 4096]);
    mic.push(&[0.0; 4096]);

    assert_eq!(chunks.lock().unwrap().len(), 1);
    assert!(!capture.is_active());
}

#[test]
fn stop_racing_the_device_thread_never_delivers_afterwards() {
    let mic = FakeMic::default();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let mut capture = MicCapture::default();
    capture
        .start(&mic, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let device_thread = {
        let mic = mic.clone();
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            let block = vec![0.1_f32; 256];
            while running.load(Ordering::SeqCst) {
                mic.push(&block);
            }
        })
    };

    std::thread::sleep(Duration::from_millis(20));
    capture.stop();
    let at_stop = delivered.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(20));
    running.store(false, Ordering::SeqCst);
    device_thread.join().unwrap();

    assert_eq!(delivered.load(Ordering::SeqCst), at_stop);
}

#[test]
fn stop_is_idempotent() {
    let mic = FakeMic::default();
    let mut capture = MicCapture::default();
    capture.start(&mic, |_| {}).unwrap();
    capture.stop();
    capture.stop();
    assert_eq!(mic.closed.load(Ordering::SeqCst), 1);

    let mut never_started = MicCapture::default();
    never_started.stop();
}

#[test]
fn starting_twice_is_rejected() {
    let mic = FakeMic::default();
    let mut capture = MicCapture::default();
    capture.start(&mic, |_| {}).unwrap();
    assert!(matches!(
        capture.start(&mic, |_| {}),
        Err(LiveError::InvalidState(_))
    ));
    assert_eq!(mic.opened_with.lock().unwrap().len(), 1);
}

#[test]
fn denied_device_reports_unavailable() {
    let mic = FakeMic {
        denied: true,
        ..FakeMic::default()
    };
    let mut capture = MicCapture::default();
    let error = capture.start(&mic, |_| {}).unwrap_err();
    assert!(matches!(error, LiveError::DeviceUnavailable(_)));
    assert!(!capture.is_active());

    // A failed start leaves the pipeline reusable.
    let mic = FakeMic::default();
    capture.start(&mic, |_| {}).unwrap();
    assert!(capture.is_active());
}

#[test]
fn streaming_into_an_idle_session_drops_chunks() {
    let session = LiveSession::new(SessionConfig::default());
    let mic = FakeMic::default();
    let mut capture = MicCapture::default();
    capture
        .start_streaming(&mic, session.media_sender())
        .unwrap();

    mic.push(&[0.0; 4096]);
    mic.push(&[0.0; 4096]);

    assert_eq!(capture.delivered_chunks(), 2);
    assert_eq!(session.dropped_media_chunks(), 2);
}
