//! Default-host microphone and speaker backed by cpal.
//!
//! cpal streams cannot cross threads on every platform, so each stream lives
//! on a dedicated worker thread that owns it until close.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};

use super::capture::{AudioInputDevice, BlockCallback, CaptureSpec, InputStream};
use super::playback::{AudioOutputDevice, OutputDeviceFactory};
use crate::error::{LiveError, Result};

const SEGMENT_QUEUE: usize = 1024;

fn unavailable(context: &str, error: impl std::fmt::Display) -> LiveError {
    LiveError::DeviceUnavailable(format!("{context}: {error}"))
}

fn pick_device(
    mut devices: impl Iterator<Item = cpal::Device>,
    name: &str,
    kind: &str,
) -> Result<cpal::Device> {
    devices
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| LiveError::DeviceUnavailable(format!("{kind} device '{name}' not found")))
}

fn input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => {
            let devices = host
                .input_devices()
                .map_err(|error| unavailable("no input devices available", error))?;
            pick_device(devices, name, "input")
        }
        None => host
            .default_input_device()
            .ok_or_else(|| LiveError::DeviceUnavailable("no default input device available".into())),
    }
}

fn output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => {
            let devices = host
                .output_devices()
                .map_err(|error| unavailable("no output devices available", error))?;
            pick_device(devices, name, "output")
        }
        None => host
            .default_output_device()
            .ok_or_else(|| LiveError::DeviceUnavailable("no default output device available".into())),
    }
}

fn device_names(devices: impl Iterator<Item = cpal::Device>) -> Vec<String> {
    devices.filter_map(|device| device.name().ok()).collect()
}

/// Streaming linear-interpolation resampler.
#[derive(Debug)]
struct LinearResampler {
    step: f64,
    position: f64,
    previous: Option<f32>,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            step: f64::from(from_rate) / f64::from(to_rate.max(1)),
            position: 0.0,
            previous: None,
        }
    }

    fn push(&mut self, sample: f32, mut emit: impl FnMut(f32)) {
        let Some(previous) = self.previous.replace(sample) else {
            return;
        };
        while self.position <= 1.0 {
            let t = self.position as f32;
            emit(previous + (sample - previous) * t);
            self.position += self.step;
        }
        self.position -= 1.0;
    }
}

/// Linear resample of a whole chunk to exactly `frames` output samples.
fn resample_block(samples: &[f32], frames: usize) -> Vec<f32> {
    if frames == samples.len() {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return Vec::new();
    }
    let step = samples.len() as f64 / frames as f64;
    (0..frames)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(samples.len() - 1);
            let t = (position - index as f64) as f32;
            let a = samples[index];
            let b = *samples.get(index + 1).unwrap_or(&a);
            a + (b - a) * t
        })
        .collect()
}

/// Maps scheduler seconds onto device frames.
///
/// Chunks that start where the previous one ended share one run, and their
/// frame positions are derived from the run's total source length so that
/// rounding never opens or overlaps a frame at a boundary.
#[derive(Debug)]
struct FrameCursor {
    source_rate: u32,
    device_rate: u32,
    run: Option<Run>,
}

#[derive(Debug)]
struct Run {
    origin: u64,
    source_frames: u64,
    end_at: f64,
}

impl FrameCursor {
    fn new(source_rate: u32, device_rate: u32) -> Self {
        Self {
            source_rate: source_rate.max(1),
            device_rate: device_rate.max(1),
            run: None,
        }
    }

    fn to_device(&self, source_frames: u64) -> u64 {
        (source_frames as f64 * f64::from(self.device_rate) / f64::from(self.source_rate)).round()
            as u64
    }

    /// Returns the first device frame and the device length of a chunk.
    fn place(&mut self, start_at: f64, len: usize) -> (u64, usize) {
        let half_frame = 0.5 / f64::from(self.device_rate);
        let contiguous = self
            .run
            .as_ref()
            .is_some_and(|run| (start_at - run.end_at).abs() < half_frame);
        if !contiguous {
            self.run = Some(Run {
                origin: (start_at.max(0.0) * f64::from(self.device_rate)).round() as u64,
                source_frames: 0,
                end_at: start_at,
            });
        }
        let Some(run) = self.run.as_ref() else {
            return (0, 0);
        };
        let (origin, before) = (run.origin, run.source_frames);
        let after = before + len as u64;
        let start = origin + self.to_device(before);
        let end = origin + self.to_device(after);
        self.run = Some(Run {
            origin,
            source_frames: after,
            end_at: start_at + len as f64 / f64::from(self.source_rate),
        });
        (start, (end - start) as usize)
    }
}

/// Downmixes, resamples and cuts device audio into fixed-size blocks.
struct BlockAssembler {
    channels: usize,
    resampler: LinearResampler,
    block: Vec<f32>,
    block_size: usize,
    on_block: BlockCallback,
}

impl BlockAssembler {
    fn push_interleaved<T: Copy>(&mut self, data: &[T], convert: impl Fn(T) -> f32) {
        let Self {
            channels,
            resampler,
            block,
            block_size,
            on_block,
        } = self;
        for frame in data.chunks(*channels) {
            let mixed = frame.iter().map(|&s| convert(s)).sum::<f32>() / frame.len() as f32;
            resampler.push(mixed, |sample| {
                block.push(sample);
                if block.len() == *block_size {
                    on_block(block.as_slice());
                    block.clear();
                }
            });
        }
    }
}

/// Microphone on the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    pub fn list_devices() -> Result<Vec<String>> {
        let devices = cpal::default_host()
            .input_devices()
            .map_err(|error| unavailable("failed to enumerate input devices", error))?;
        Ok(device_names(devices))
    }
}

impl AudioInputDevice for CpalMicrophone {
    fn open(&self, spec: &CaptureSpec, on_block: BlockCallback) -> Result<Box<dyn InputStream>> {
        if spec.echo_cancellation || spec.noise_suppression || spec.auto_gain_control {
            tracing::debug!("cpal exposes no input processing controls; capturing raw input");
        }
        let device_name = self.device_name.clone();
        let spec = *spec;
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = std::thread::Builder::new()
            .name("livelink-mic".into())
            .spawn(move || {
                let stream = match build_input(device_name.as_deref(), spec, on_block) {
                    Ok(stream) => stream,
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };
                if let Err(error) = stream.play() {
                    let _ = ready_tx.send(Err(unavailable("failed to start microphone", error)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(WorkerStream {
                stop: Some(stop_tx),
                worker: Some(worker),
            })),
            Ok(Err(error)) => {
                let _ = worker.join();
                Err(error)
            }
            Err(_) => {
                let _ = worker.join();
                Err(LiveError::DeviceUnavailable("microphone worker exited".into()))
            }
        }
    }
}

fn build_input(name: Option<&str>, spec: CaptureSpec, on_block: BlockCallback) -> Result<cpal::Stream> {
    let device = input_device(name)?;
    let default_config = device
        .default_input_config()
        .map_err(|error| unavailable("no usable input format", error))?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let device_rate = config.sample_rate.0;
    let channels = usize::from(config.channels.max(1));
    tracing::debug!(?format, device_rate, channels, "opening microphone");

    let mut assembler = BlockAssembler {
        channels,
        resampler: LinearResampler::new(device_rate, spec.sample_rate),
        block: Vec::with_capacity(spec.block_size),
        block_size: spec.block_size.max(1),
        on_block,
    };
    let on_error = |error: cpal::StreamError| tracing::warn!(error = %error, "microphone stream error");

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| assembler.push_interleaved(data, |s| s),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| assembler.push_interleaved(data, |s| f32::from(s) / 32_768.0),
            on_error,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| {
                assembler.push_interleaved(data, |s| (f32::from(s) - 32_768.0) / 32_768.0)
            },
            on_error,
            None,
        ),
        other => {
            return Err(LiveError::DeviceUnavailable(format!(
                "unsupported input sample format: {other:?}"
            )))
        }
    };
    stream.map_err(|error| unavailable("failed to open microphone", error))
}

/// Owns a worker thread holding a cpal stream.
struct WorkerStream {
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WorkerStream {
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl InputStream for WorkerStream {
    fn close(&mut self) {
        self.shutdown();
    }
}

impl Drop for WorkerStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Speaker on the default cpal host. Each `create` opens a new stream with
/// its clock starting at zero.
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker {
    device_name: Option<String>,
}

impl CpalSpeaker {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    pub fn list_devices() -> Result<Vec<String>> {
        let devices = cpal::default_host()
            .output_devices()
            .map_err(|error| unavailable("failed to enumerate output devices", error))?;
        Ok(device_names(devices))
    }
}

struct Segment {
    start_frame: u64,
    samples: Vec<f32>,
}

/// An open output stream whose clock counts rendered frames.
pub struct CpalOutput {
    source_rate: u32,
    device_rate: u32,
    cursor: FrameCursor,
    rendered: Arc<AtomicU64>,
    segments: Sender<Segment>,
    worker: WorkerStream,
}

impl std::fmt::Debug for CpalOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalOutput")
            .field("source_rate", &self.source_rate)
            .field("device_rate", &self.device_rate)
            .field("time", &self.current_time())
            .finish()
    }
}

impl OutputDeviceFactory for CpalSpeaker {
    type Device = CpalOutput;

    fn create(&mut self, sample_rate: u32) -> Result<CpalOutput> {
        let device_name = self.device_name.clone();
        let rendered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&rendered);
        let (segments, segment_rx) = bounded::<Segment>(SEGMENT_QUEUE);
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let worker = std::thread::Builder::new()
            .name("livelink-speaker".into())
            .spawn(move || {
                let (stream, device_rate) =
                    match build_output(device_name.as_deref(), segment_rx, counter) {
                        Ok(opened) => opened,
                        Err(error) => {
                            let _ = ready_tx.send(Err(error));
                            return;
                        }
                    };
                if let Err(error) = stream.play() {
                    let _ = ready_tx.send(Err(unavailable("failed to start speaker", error)));
                    return;
                }
                let _ = ready_tx.send(Ok(device_rate));
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        let worker = WorkerStream {
            stop: Some(stop_tx),
            worker: Some(worker),
        };
        match ready_rx.recv() {
            Ok(Ok(device_rate)) => Ok(CpalOutput {
                source_rate: sample_rate,
                device_rate,
                cursor: FrameCursor::new(sample_rate, device_rate),
                rendered,
                segments,
                worker,
            }),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(LiveError::DeviceUnavailable("speaker worker exited".into())),
        }
    }
}

impl AudioOutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.rendered.load(Ordering::Acquire) as f64 / f64::from(self.device_rate)
    }

    fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Result<()> {
        let (start_frame, frames) = self.cursor.place(start_at, samples.len());
        let samples = resample_block(&samples, frames);
        self.segments
            .try_send(Segment {
                start_frame,
                samples,
            })
            .map_err(|_| LiveError::DeviceUnavailable("speaker queue is full".into()))
    }

    fn close(&mut self) {
        self.worker.shutdown();
    }
}

fn build_output(
    name: Option<&str>,
    segments: Receiver<Segment>,
    rendered: Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32)> {
    let device = output_device(name)?;
    let default_config = device
        .default_output_config()
        .map_err(|error| unavailable("no usable output format", error))?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let device_rate = config.sample_rate.0;
    tracing::debug!(?format, device_rate, channels = config.channels, "opening speaker");

    let stream = match format {
        SampleFormat::F32 => build_mixer::<f32>(&device, &config, segments, rendered),
        SampleFormat::I16 => build_mixer::<i16>(&device, &config, segments, rendered),
        SampleFormat::U16 => build_mixer::<u16>(&device, &config, segments, rendered),
        other => {
            return Err(LiveError::DeviceUnavailable(format!(
                "unsupported output sample format: {other:?}"
            )))
        }
    }?;
    Ok((stream, device_rate))
}

fn build_mixer<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    segments: Receiver<Segment>,
    rendered: Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    let mut active: Vec<Segment> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Ok(segment) = segments.try_recv() {
                    active.push(segment);
                }
                let base = rendered.load(Ordering::Acquire);
                let frames = (data.len() / channels) as u64;
                for (offset, frame) in data.chunks_mut(channels).enumerate() {
                    let clock = base + offset as u64;
                    let mixed: f32 = active
                        .iter()
                        .filter(|segment| clock >= segment.start_frame)
                        .filter_map(|segment| {
                            segment.samples.get((clock - segment.start_frame) as usize)
                        })
                        .sum();
                    let value = T::from_sample(mixed.clamp(-1.0, 1.0));
                    frame.fill(value);
                }
                let end = base + frames;
                rendered.store(end, Ordering::Release);
                active.retain(|segment| segment.start_frame + segment.samples.len() as u64 > end);
            },
            |error: cpal::StreamError| tracing::warn!(error = %error, "speaker stream error"),
            None,
        )
        .map_err(|error| unavailable("failed to open speaker", error))
}
