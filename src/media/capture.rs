//! Microphone capture pipeline: device blocks → PCM16 → base64 → delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::pcm::encode_pcm16_base64;
use crate::error::{LiveError, Result};
use crate::live::MediaSender;

pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Format requested from the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    /// Samples per block callback.
    pub block_size: usize,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Called on the device's audio thread with one block of mono samples.
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A platform microphone.
pub trait AudioInputDevice {
    /// Open a mono stream at `spec.sample_rate` that invokes `on_block` with
    /// exactly `spec.block_size` samples per call. Processing flags are
    /// applied where the platform supports them.
    fn open(&self, spec: &CaptureSpec, on_block: BlockCallback) -> Result<Box<dyn InputStream>>;
}

/// A running input stream.
pub trait InputStream: Send {
    /// Stop and release the device. No block callback may fire after this
    /// returns.
    fn close(&mut self);
}

type Delivery = Box<dyn FnMut(String) + Send + 'static>;

/// Converts microphone blocks into wire-ready chunks.
///
/// The device callback only ever `try_lock`s the delivery slot, and the slot
/// is contended only while [`MicCapture::stop`] runs, so the audio thread
/// never blocks. Once `stop` has emptied the slot no delivery can fire.
pub struct MicCapture {
    spec: CaptureSpec,
    slot: Arc<Mutex<Option<Delivery>>>,
    stream: Option<Box<dyn InputStream>>,
    delivered: Arc<AtomicU64>,
}

impl Default for MicCapture {
    fn default() -> Self {
        Self::new(CaptureSpec::default())
    }
}

impl std::fmt::Debug for MicCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicCapture")
            .field("spec", &self.spec)
            .field("active", &self.is_active())
            .field("delivered", &self.delivered_chunks())
            .finish()
    }
}

impl MicCapture {
    pub fn new(spec: CaptureSpec) -> Self {
        Self {
            spec,
            slot: Arc::new(Mutex::new(None)),
            stream: None,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn spec(&self) -> &CaptureSpec {
        &self.spec
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    pub fn delivered_chunks(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Open `device` and deliver one base64 PCM16 chunk per block.
    pub fn start<D, F>(&mut self, device: &D, deliver: F) -> Result<()>
    where
        D: AudioInputDevice + ?Sized,
        F: FnMut(String) + Send + 'static,
    {
        if self.is_active() {
            return Err(LiveError::InvalidState(
                "Microphone capture is already running".into(),
            ));
        }

        *lock(&self.slot) = Some(Box::new(deliver));
        let slot = Arc::clone(&self.slot);
        let delivered = Arc::clone(&self.delivered);
        let on_block: BlockCallback = Box::new(move |block: &[f32]| {
            if let Ok(mut slot) = slot.try_lock() {
                if let Some(deliver) = slot.as_mut() {
                    deliver(encode_pcm16_base64(block));
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        match device.open(&self.spec, on_block) {
            Ok(stream) => {
                tracing::debug!(
                    sample_rate = self.spec.sample_rate,
                    block_size = self.spec.block_size,
                    "microphone capture started"
                );
                self.stream = Some(stream);
                Ok(())
            }
            Err(error) => {
                lock(&self.slot).take();
                Err(match error {
                    LiveError::DeviceUnavailable(_) => error,
                    other => LiveError::DeviceUnavailable(other.to_string()),
                })
            }
        }
    }

    /// Stream chunks straight into a session.
    pub fn start_streaming<D>(&mut self, device: &D, sender: MediaSender) -> Result<()>
    where
        D: AudioInputDevice + ?Sized,
    {
        self.start(device, move |chunk| {
            sender.send_audio(chunk);
        })
    }

    /// Stop delivery and release the device. Safe to call repeatedly.
    pub fn stop(&mut self) {
        lock(&self.slot).take();
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            tracing::debug!("microphone capture stopped");
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
