//! Local media: microphone capture, speaker playback, camera snapshots.
//!
//! Devices sit behind small traits so the pipelines can run against any
//! platform backend. The `cpal` feature provides a default-host microphone
//! and speaker.

pub mod capture;
#[cfg(feature = "cpal")]
pub mod cpal;
pub mod pcm;
pub mod playback;
pub mod video;

pub use capture::{
    AudioInputDevice, BlockCallback, CaptureSpec, InputStream, MicCapture, CAPTURE_BLOCK_SIZE,
    CAPTURE_SAMPLE_RATE,
};
#[cfg(feature = "cpal")]
pub use self::cpal::{CpalMicrophone, CpalOutput, CpalSpeaker};
pub use pcm::{decode_pcm16_base64, encode_pcm16_base64};
pub use playback::{
    spawn_player, AudioOutputDevice, OutputDeviceFactory, PlaybackScheduler, PlayerHandle,
    ScheduledSegment, DEFAULT_PLAYER_CAPACITY, PLAYBACK_SAMPLE_RATE,
};
pub use video::{
    encode_jpeg, CameraCapture, CameraSource, CameraStream, PreviewHandle, VideoSpec,
    VIDEO_FRAME_INTERVAL, VIDEO_HEIGHT, VIDEO_JPEG_QUALITY, VIDEO_WIDTH,
};
