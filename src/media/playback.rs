//! Gapless playback of model audio.
//!
//! Chunks are packed back to back on the output device clock: each one starts
//! at `max(now, end of previous chunk)`. An interrupt tears the device down so
//! anything already queued is silenced, then opens a fresh one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::pcm::decode_pcm16_base64;
use crate::error::{LiveError, Result};

pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_PLAYER_CAPACITY: usize = 512;

/// An output context with its own clock.
pub trait AudioOutputDevice: Send {
    /// Device clock in seconds.
    fn current_time(&self) -> f64;

    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Queue mono samples to begin at `start_at` on the device clock.
    fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Result<()>;

    /// Stop output, discarding everything scheduled.
    fn close(&mut self);
}

/// Opens output devices. Called once on prepare and once per interrupt.
pub trait OutputDeviceFactory: Send {
    type Device: AudioOutputDevice;

    fn create(&mut self, sample_rate: u32) -> Result<Self::Device>;
}

/// Where a chunk landed on the device clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub start: f64,
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler<F: OutputDeviceFactory> {
    factory: F,
    sample_rate: u32,
    device: Option<F::Device>,
    next_start: f64,
    pending: VecDeque<ScheduledSegment>,
}

impl<F: OutputDeviceFactory> std::fmt::Debug for PlaybackScheduler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("sample_rate", &self.sample_rate)
            .field("prepared", &self.is_prepared())
            .field("next_start", &self.next_start)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<F: OutputDeviceFactory> PlaybackScheduler<F> {
    pub fn new(factory: F) -> Self {
        Self::with_sample_rate(factory, PLAYBACK_SAMPLE_RATE)
    }

    pub fn with_sample_rate(factory: F, sample_rate: u32) -> Self {
        Self {
            factory,
            sample_rate,
            device: None,
            next_start: 0.0,
            pending: VecDeque::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_prepared(&self) -> bool {
        self.device.is_some()
    }

    /// Clock position the next chunk will be packed against.
    pub fn next_start_time(&self) -> f64 {
        self.next_start
    }

    /// Segments that had not finished as of the last `play`.
    pub fn pending(&self) -> impl Iterator<Item = &ScheduledSegment> {
        self.pending.iter()
    }

    pub fn device(&self) -> Option<&F::Device> {
        self.device.as_ref()
    }

    /// Open the output device. Repeated calls only resume a suspended device.
    pub fn prepare(&mut self) -> Result<()> {
        if self.device.is_none() {
            let device = self.open_device()?;
            self.next_start = device.current_time();
            self.device = Some(device);
        }
        if let Some(device) = self.device.as_mut() {
            if device.is_suspended() {
                device.resume()?;
            }
        }
        Ok(())
    }

    /// Decode a base64 PCM16 chunk and queue it right after the previous one.
    pub fn play(&mut self, encoded: &str) -> Result<ScheduledSegment> {
        if !self.is_prepared() {
            return Err(not_prepared());
        }
        let samples = decode_pcm16_base64(encoded)?;
        self.play_samples(samples)
    }

    pub fn play_samples(&mut self, samples: Vec<f32>) -> Result<ScheduledSegment> {
        let sample_rate = f64::from(self.sample_rate);
        let device = self.device.as_mut().ok_or_else(not_prepared)?;
        if device.is_suspended() {
            device.resume()?;
        }

        let now = device.current_time();
        let segment = ScheduledSegment {
            start: now.max(self.next_start),
            duration: samples.len() as f64 / sample_rate,
        };
        if !samples.is_empty() {
            device.schedule(samples, segment.start)?;
        }
        self.next_start = segment.end();

        while self
            .pending
            .front()
            .is_some_and(|queued| queued.end() <= now)
        {
            self.pending.pop_front();
        }
        self.pending.push_back(segment);
        Ok(segment)
    }

    /// Silence everything queued and start over on a fresh device.
    pub fn interrupt(&mut self) -> Result<()> {
        self.pending.clear();
        let Some(mut device) = self.device.take() else {
            return Ok(());
        };
        device.close();
        let fresh = self.open_device()?;
        self.next_start = fresh.current_time();
        self.device = Some(fresh);
        tracing::debug!(next_start = self.next_start, "playback interrupted");
        Ok(())
    }

    /// Release the device. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.pending.clear();
        self.next_start = 0.0;
        if let Some(mut device) = self.device.take() {
            device.close();
        }
    }

    fn open_device(&mut self) -> Result<F::Device> {
        self.factory
            .create(self.sample_rate)
            .map_err(|error| match error {
                LiveError::DeviceUnavailable(_) => error,
                other => LiveError::DeviceUnavailable(other.to_string()),
            })
    }
}

impl<F: OutputDeviceFactory> Drop for PlaybackScheduler<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn not_prepared() -> LiveError {
    LiveError::InvalidState("Playback scheduler is not prepared; call prepare() first".into())
}

#[derive(Debug)]
enum PlayerCommand {
    Play { generation: u64, chunk: String },
    Interrupt,
    Shutdown,
}

/// Handle to a scheduler running on its own task.
///
/// `play` and `interrupt` never block, so they can be called straight from
/// an event loop. Chunks queued before an interrupt are discarded even if the
/// task has not reached them yet.
#[derive(Debug)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    generation: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

/// Move a prepared or unprepared scheduler onto a task.
///
/// Opening and closing the device can block, so those steps run on the
/// blocking pool and never stall the runtime workers.
pub fn spawn_player<F>(scheduler: PlaybackScheduler<F>, capacity: usize) -> PlayerHandle
where
    F: OutputDeviceFactory + 'static,
{
    let (commands, mut rx) = mpsc::channel(capacity.max(1));
    let generation = Arc::new(AtomicU64::new(0));
    let current = Arc::clone(&generation);

    let task = tokio::spawn(async move {
        let Some((mut scheduler, prepared)) = off_runtime(scheduler, |s| s.prepare()).await else {
            return;
        };
        if let Err(error) = prepared {
            tracing::warn!(error = %error, "audio output unavailable");
        }
        let mut seen = 0;
        while let Some(command) = rx.recv().await {
            let latest = current.load(Ordering::Acquire);
            if latest != seen {
                seen = latest;
                let Some((reopened, result)) = off_runtime(scheduler, |s| s.interrupt()).await
                else {
                    return;
                };
                scheduler = reopened;
                if let Err(error) = result {
                    tracing::warn!(error = %error, "failed to reopen audio output");
                }
            }
            match command {
                PlayerCommand::Play { generation, chunk } => {
                    if generation < seen {
                        continue;
                    }
                    if !scheduler.is_prepared() {
                        let Some((prepared, result)) =
                            off_runtime(scheduler, |s| s.prepare()).await
                        else {
                            return;
                        };
                        scheduler = prepared;
                        if let Err(error) = result {
                            tracing::warn!(error = %error, "dropping audio chunk");
                            continue;
                        }
                    }
                    if let Err(error) = scheduler.play(&chunk) {
                        tracing::warn!(error = %error, "failed to play audio chunk");
                    }
                }
                PlayerCommand::Interrupt => {}
                PlayerCommand::Shutdown => break,
            }
        }
        let _ = off_runtime(scheduler, |s| s.destroy()).await;
    });

    PlayerHandle {
        commands,
        generation,
        task,
    }
}

/// Run a device operation on the blocking pool and hand the scheduler back.
async fn off_runtime<F, T>(
    mut scheduler: PlaybackScheduler<F>,
    op: impl FnOnce(&mut PlaybackScheduler<F>) -> T + Send + 'static,
) -> Option<(PlaybackScheduler<F>, T)>
where
    F: OutputDeviceFactory + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let output = op(&mut scheduler);
        (scheduler, output)
    })
    .await;
    match joined {
        Ok(pair) => Some(pair),
        Err(error) => {
            tracing::warn!(error = %error, "audio device operation panicked");
            None
        }
    }
}

impl PlayerHandle {
    /// Queue a chunk. Returns false if the queue is full or the task is gone.
    pub fn play(&self, chunk: impl Into<String>) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        self.commands
            .try_send(PlayerCommand::Play {
                generation,
                chunk: chunk.into(),
            })
            .is_ok()
    }

    pub fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        // A full queue still observes the bumped generation on its next command.
        let _ = self.commands.try_send(PlayerCommand::Interrupt);
    }

    /// Drain queued chunks, then release the device.
    pub async fn shutdown(self) {
        let _ = self.commands.send(PlayerCommand::Shutdown).await;
        if let Err(error) = self.task.await {
            tracing::warn!(error = %error, "audio player task failed");
        }
    }
}
