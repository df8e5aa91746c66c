//! Local audio playback
//!
//! The playback sink owns the output device; callers hand it interleaved
//! i16 PCM and block until the device has room. A trait seam keeps the
//! relay testable without audio hardware.

pub mod buffer;
pub mod sink;
pub mod wav;

pub use sink::PlaybackSink;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("no default output device")]
    NoDefaultDevice,

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("playback sink is closed")]
    Closed,
}

/// Destination for decoded PCM.
///
/// Samples are interleaved at the sink's configured channel count. Writes
/// block until everything is accepted, which is how device backpressure
/// reaches the producer.
pub trait AudioSink: Send + Sync {
    /// Write PCM, blocking until the sink accepts all of it. Fails with
    /// [`SinkError::Closed`] once the sink is closed.
    fn write_pcm(&self, pcm: &[i16]) -> Result<(), SinkError>;

    /// Terminal and idempotent; wakes any blocked writer.
    fn close(&self);
}
