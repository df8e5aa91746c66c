//! Pipeline abstraction layer for Playcast
//!
//! This module provides the registry and relay architecture for media
//! pipelines, separating concerns between:
//! - Control/Coordination: Registration, state machine and lifecycle
//! - Data Transport: Per-pipeline outbound channels and backpressure handling
//! - Media Processing: Decode for local playback, encoded forwarding
//!
//! # Architecture
//!
//! Pipelines are created against a media engine and tracked in a shared
//! registry keyed by id:
//! - The registry owns creation, start, stop and removal
//! - The relay receives raw engine buffers and routes them by pipeline id
//! - Audio pipelines are decoded for local playback while the encoded
//!   payload is forwarded untouched
//! - Health monitoring tracks per-pipeline metrics

pub mod health;
pub mod registry;
pub mod relay;
pub mod state;
pub mod types;

pub use health::PipelineHealth;
pub use registry::{Pipeline, PipelineError, PipelineRegistry};
pub use relay::BufferRelay;
pub use state::PipelineState;
pub use types::{MediaSample, PipelineId};
