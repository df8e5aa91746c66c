//! Boundary to the media engine that owns the encoder pipelines.
//!
//! The engine is treated as an external component: it instantiates
//! pipelines from launch descriptions, runs them on threads it manages,
//! and hands every encoded buffer to the handler registered through
//! [`MediaEngine::register_handler`]. The crate talks to it exclusively
//! through this module's traits, so the in-process [`SyntheticEngine`]
//! and a native engine binding are interchangeable.

pub mod synthetic;

pub use synthetic::SyntheticEngine;

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::pipeline::types::PipelineId;

/// Opaque identifier of a pipeline instance inside the engine.
///
/// Issued by [`MediaEngine::create_pipeline`] and owned by exactly one
/// pipeline until it is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub(crate) u64);

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no element matching launch description: {0}")]
    UnknownDescription(String),

    #[error("encoder '{name}' unavailable: {reason}")]
    EncoderUnavailable { name: &'static str, reason: String },

    #[error("unknown engine handle {0}")]
    UnknownHandle(EngineHandle),

    #[error("pipeline handle {0} was already started")]
    AlreadyStarted(EngineHandle),

    #[error("no buffer handler registered")]
    NoHandler,
}

/// One encoded buffer handed over by the engine.
///
/// Ownership transfers to the callback for the duration of a single
/// [`BufferHandler::on_buffer`] invocation. The engine's release hook runs
/// exactly once when the buffer is dropped, on every exit path.
pub struct RawBuffer {
    data: Bytes,
    duration: Duration,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl RawBuffer {
    /// Wrap an encoded payload and the wall-clock duration it covers,
    /// given in engine-native nanoseconds.
    pub fn new(data: impl Into<Bytes>, duration_nanos: u64) -> Self {
        Self {
            data: data.into(),
            duration: Duration::from_nanos(duration_nanos),
            release: None,
        }
    }

    /// Attach the hook the engine uses to reclaim the buffer.
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Wall-clock duration of the media this buffer encodes.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBuffer")
            .field("size", &self.data.len())
            .field("duration", &self.duration)
            .finish()
    }
}

/// Callback interface the engine delivers encoded buffers through.
///
/// Registered once at startup. Invocations happen on engine-managed
/// threads: buffers of one pipeline arrive sequentially in production
/// order, buffers of different pipelines may arrive concurrently.
/// Implementations must not assume delivery stops the instant a pipeline
/// is stopped; an in-flight invocation may still complete afterwards.
pub trait BufferHandler: Send + Sync {
    fn on_buffer(&self, id: PipelineId, buffer: RawBuffer);
}

/// Control surface of the engine.
///
/// `start_pipeline` begins asynchronous delivery to the registered
/// handler; it never invokes the handler synchronously from inside the
/// call. `stop_pipeline` halts delivery and invalidates the handle.
pub trait MediaEngine: Send + Sync {
    fn create_pipeline(&self, launch: &str) -> Result<EngineHandle, EngineError>;

    fn start_pipeline(&self, handle: EngineHandle, id: PipelineId) -> Result<(), EngineError>;

    fn stop_pipeline(&self, handle: EngineHandle) -> Result<(), EngineError>;

    fn register_handler(&self, handler: Arc<dyn BufferHandler>);
}
