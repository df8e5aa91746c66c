//! cpal-backed playback sink
//!
//! The output stream lives on a dedicated thread for its whole life
//! (cpal streams must not cross threads); the sink itself only owns the
//! PCM ring and a shutdown signal, so it can be shared freely.

use crate::config::AudioConfig;
use crate::playback::buffer::PcmRing;
use crate::playback::{AudioSink, SinkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

pub struct PlaybackSink {
    ring: Arc<PcmRing>,
    shutdown: Mutex<Option<(mpsc::Sender<()>, thread::JoinHandle<()>)>>,
}

impl PlaybackSink {
    /// Open the configured output device and start the stream.
    ///
    /// Blocks until the stream is playing; device resolution, stream build
    /// and play errors are all reported from here.
    pub fn open(config: &AudioConfig) -> Result<Self, SinkError> {
        let device = resolve_device(&config.device)?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: if config.buffer.buffer_frames > 0 {
                cpal::BufferSize::Fixed(config.buffer.buffer_frames)
            } else {
                cpal::BufferSize::Default
            },
        };

        let capacity = config.buffer.ring_frames() * config.channels as usize;
        let ring = Arc::new(PcmRing::new(capacity));

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let callback_ring = ring.clone();
        let stream_thread = thread::spawn(move || {
            let built = device
                .build_output_stream(
                    &stream_config,
                    move |output: &mut [i16], _| {
                        callback_ring.read(output);
                    },
                    |err| error!("Audio output error: {}", err),
                    None,
                )
                .map_err(SinkError::from)
                .and_then(|stream| {
                    stream.play()?;
                    Ok(stream)
                });

            match built {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Park here; the stream must stay alive until close
                    let _ = shutdown_rx.recv();
                    let _ = stream.pause();
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            // The stream thread died without reporting
            Err(_) => return Err(SinkError::Build(cpal::BuildStreamError::DeviceNotAvailable)),
        }

        info!(
            "playback open on '{}' ({} ch, {} Hz, ring {} samples)",
            config.device, config.channels, config.sample_rate, capacity
        );

        Ok(Self {
            ring,
            shutdown: Mutex::new(Some((shutdown_tx, stream_thread))),
        })
    }

    /// Block until the callback has consumed everything buffered, or the
    /// sink is closed underneath us.
    pub fn drain(&self) {
        while self.ring.available() > 0 && !self.ring.is_closed() {
            thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}

impl AudioSink for PlaybackSink {
    fn write_pcm(&self, pcm: &[i16]) -> Result<(), SinkError> {
        self.ring.write_blocking(pcm)
    }

    /// Wakes blocked writers, stops the stream and waits for the device to
    /// be released. Safe to call more than once and from any thread.
    fn close(&self) {
        self.ring.close();
        if let Some((signal, thread)) = self.shutdown.lock().unwrap().take() {
            let _ = signal.send(());
            let _ = thread.join();
            info!("playback sink closed");
        }
    }
}

fn resolve_device(name: &str) -> Result<cpal::Device, SinkError> {
    let host = cpal::default_host();
    if name == "default" {
        return host
            .default_output_device()
            .ok_or(SinkError::NoDefaultDevice);
    }
    for device in host.output_devices()? {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(SinkError::DeviceNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferParams;

    #[test]
    fn test_open_write_close() {
        let config = AudioConfig {
            buffer: BufferParams {
                buffer_frames: 4800,
                ..BufferParams::default()
            },
            ..AudioConfig::default()
        };
        // No output device in this environment, nothing to exercise
        let sink = match PlaybackSink::open(&config) {
            Ok(sink) => sink,
            Err(_) => return,
        };

        sink.write_pcm(&[0i16; 960]).unwrap();
        sink.close();
        sink.close();
        assert!(matches!(sink.write_pcm(&[0]), Err(SinkError::Closed)));
    }

    #[test]
    fn test_unknown_device_is_reported() {
        let config = AudioConfig {
            device: String::from("no-such-device"),
            ..AudioConfig::default()
        };
        match PlaybackSink::open(&config) {
            Err(SinkError::DeviceNotFound(name)) => assert_eq!(name, "no-such-device"),
            // Hosts without an audio subsystem fail earlier, also fine
            Err(_) => {}
            Ok(_) => panic!("open succeeded on a device that does not exist"),
        }
    }
}
