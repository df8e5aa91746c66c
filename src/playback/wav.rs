//! One-shot WAV playback through the sink
//!
//! Streams a 16-bit PCM file once at its own channel count and sample rate,
//! in period-sized chunks through the blocking write path, then drains and
//! closes the device.

use crate::config::{AudioConfig, BufferParams};
use crate::playback::sink::PlaybackSink;
use crate::playback::{AudioSink, SinkError};
use hound::{SampleFormat, WavReader};
use log::info;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("failed to read wav file: {0}")]
    Read(#[from] hound::Error),

    #[error("only 16-bit PCM wav files are supported, got {bits} bit {format:?}")]
    UnsupportedFormat { bits: u16, format: SampleFormat },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Play a 16-bit PCM WAV file once on `device` and return when it is done.
pub fn play_file(path: &Path, device: &str, buffer: BufferParams) -> Result<(), WavError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        return Err(WavError::UnsupportedFormat {
            bits: spec.bits_per_sample,
            format: spec.sample_format,
        });
    }

    let config = AudioConfig {
        device: device.to_string(),
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        buffer,
    };
    let sink = PlaybackSink::open(&config)?;

    info!(
        "playing {} ({} ch, {} Hz)",
        path.display(),
        spec.channels,
        spec.sample_rate
    );

    let period = buffer.period_frames as usize * spec.channels as usize;
    let mut chunk = Vec::with_capacity(period.max(1));
    for sample in reader.samples::<i16>() {
        chunk.push(sample?);
        if chunk.len() >= period {
            sink.write_pcm(&chunk)?;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        sink.write_pcm(&chunk)?;
    }

    sink.drain();
    sink.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_wav(name: &str, spec: hound::WavSpec, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.wav", name, std::process::id()));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = play_file(
            Path::new("/definitely/not/here.wav"),
            "default",
            BufferParams::default(),
        );
        assert!(matches!(result, Err(WavError::Read(_))));
    }

    #[test]
    fn test_float_wav_is_rejected() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let path = std::env::temp_dir().join(format!("float-{}.wav", std::process::id()));
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.25f32).unwrap();
        writer.finalize().unwrap();

        // Format is checked before any device is touched
        let result = play_file(&path, "default", BufferParams::default());
        assert!(matches!(
            result,
            Err(WavError::UnsupportedFormat { bits: 32, .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_playback_when_device_available() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..480).map(|i| (i * 16) as i16).collect();
        let path = temp_wav("pcm", spec, &samples);

        match play_file(&path, "default", BufferParams::default()) {
            Ok(()) => {}
            // No output device in this environment
            Err(WavError::Sink(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
        let _ = std::fs::remove_file(&path);
    }
}
