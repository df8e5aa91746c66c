use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sizing of the PCM ring between the relay and the audio callback.
///
/// Mirrors the usual device buffer parameters: a total size in frames, or
/// zero to derive it from `period_frames * periods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferParams {
    /// Total buffer size in frames; 0 derives it from the periods
    pub buffer_frames: u32,
    pub period_frames: u32,
    pub periods: u32,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            buffer_frames: 0,
            period_frames: 960,
            periods: 960,
        }
    }
}

impl BufferParams {
    /// Buffer capacity in frames
    pub fn ring_frames(&self) -> usize {
        if self.buffer_frames > 0 {
            self.buffer_frames as usize
        } else {
            self.period_frames as usize * self.periods as usize
        }
    }
}

/// Audio output configuration, S16LE throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name, "default" picks the host default
    pub device: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub buffer: BufferParams,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: String::from("default"),
            channels: 1,
            sample_rate: 48_000,
            buffer: BufferParams::default(),
        }
    }
}

/// Top level configuration, loadable from a JSON file and overridable from
/// the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    /// Codec names, parsed into the codec table at startup
    pub codecs: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            codecs: vec![String::from("opus")],
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.buffer.buffer_frames, 0);
        assert_eq!(config.audio.buffer.period_frames, 960);
        assert_eq!(config.audio.buffer.periods, 960);
        assert_eq!(config.codecs, vec!["opus"]);
    }

    #[test]
    fn test_ring_frames_derivation() {
        let derived = BufferParams::default();
        assert_eq!(derived.ring_frames(), 960 * 960);

        let fixed = BufferParams {
            buffer_frames: 4800,
            ..BufferParams::default()
        };
        assert_eq!(fixed.ring_frames(), 4800);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"audio":{"sample_rate":44100},"codecs":["vp8","opus"]}"#)
                .unwrap();

        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.device, "default");
        assert_eq!(config.audio.buffer.period_frames, 960);
        assert_eq!(config.codecs, vec!["vp8", "opus"]);
    }
}
