//! Audio decoding module
//!
//! Provides Opus decoding via FFmpeg for local playback.

pub mod audio;

pub use audio::OpusDecoder;
