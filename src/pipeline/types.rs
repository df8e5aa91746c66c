//! Core types for the pipeline system

use bytes::Bytes;
use std::time::Duration;

/// Identifier of a registered pipeline.
///
/// Assigned monotonically at creation and never reused for the lifetime
/// of the registry, so a stale id can only miss, never alias another
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub usize);

impl PipelineId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One encoded payload handed to the outbound transport, together with
/// the number of media samples it spans at the codec's clock rate.
///
/// The payload is the encoded buffer as produced by the engine; local
/// playback decodes its own copy and never alters what is forwarded.
#[derive(Clone)]
pub struct MediaSample {
    pub data: Bytes,
    pub samples: u32,
}

impl std::fmt::Debug for MediaSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSample")
            .field("size", &self.data.len())
            .field("samples", &self.samples)
            .finish()
    }
}

/// Convert a buffer's wall-clock duration into a sample count at the
/// given clock rate.
///
/// A 20 ms buffer at the 48 kHz audio clock is 960 samples; a 10 ms
/// buffer at the 90 kHz video clock is 900.
pub fn sample_count(clock_rate: u32, duration: Duration) -> u32 {
    (clock_rate as f64 * duration.as_secs_f64()) as u32
}
