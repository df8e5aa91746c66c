//! In-process media engine built on FFmpeg encoders.
//!
//! Serves the same create/start/stop surface as the native engine but
//! generates its media locally: a 440 Hz tone for audio launches, a
//! moving gradient for video ones. Each started pipeline runs a worker
//! thread that synthesizes raw frames, encodes them and hands the
//! packets to the registered [`BufferHandler`] at the source's own pace.

use crate::engine::{BufferHandler, EngineError, EngineHandle, MediaEngine, RawBuffer};
use crate::pipeline::types::PipelineId;
use ac_ffmpeg::codec::audio::frame::get_sample_format;
use ac_ffmpeg::codec::audio::{AudioEncoder, AudioFrameMut, ChannelLayout};
use ac_ffmpeg::codec::video::{VideoEncoder, VideoFrameMut};
use ac_ffmpeg::codec::{Encoder, video};
use ac_ffmpeg::time::{TimeBase, Timestamp};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 8192.0;

const VIDEO_WIDTH: usize = 320;
const VIDEO_HEIGHT: usize = 240;
const VIDEO_FPS: u32 = 30;

/// Live sources emit one packet per frame; both option sets keep the
/// encoders from buffering frames internally.
const VPX_OPTIONS: &[(&str, &str)] = &[("deadline", "realtime"), ("lag-in-frames", "0")];
const X264_OPTIONS: &[(&str, &str)] = &[
    ("preset", "veryfast"),
    ("tune", "zerolatency"),
    ("bf", "0"),
    ("g", "60"),
];

/// What a launch description asks the engine to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Tone,
    Vp8,
    Vp9,
    H264,
}

impl SourceKind {
    /// Recognizes a description by its encoder stage.
    fn from_launch(launch: &str) -> Option<Self> {
        for stage in launch.split('!') {
            let element = stage.trim().split_whitespace().next().unwrap_or("");
            match element {
                "opusenc" => return Some(SourceKind::Tone),
                "vp8enc" => return Some(SourceKind::Vp8),
                "vp9enc" => return Some(SourceKind::Vp9),
                "x264enc" => return Some(SourceKind::H264),
                _ => {}
            }
        }
        None
    }

    fn encoder_name(self) -> &'static str {
        match self {
            SourceKind::Tone => "libopus",
            SourceKind::Vp8 => "libvpx",
            SourceKind::Vp9 => "libvpx-vp9",
            SourceKind::H264 => "libx264",
        }
    }

    fn is_audio(self) -> bool {
        matches!(self, SourceKind::Tone)
    }
}

/// Encoder built at create time, moved into the worker at start.
enum PreparedSource {
    Tone(AudioEncoder),
    Pattern(VideoEncoder),
}

struct SourceBox(PreparedSource);

unsafe impl Send for SourceBox {}

struct Slot {
    source: Option<SourceBox>,
    cancel: CancellationToken,
    worker: Option<thread::JoinHandle<()>>,
}

/// Stand-in for the native engine.
///
/// Handles are never reused; stopping a pipeline invalidates its handle.
pub struct SyntheticEngine {
    slots: Mutex<HashMap<u64, Slot>>,
    next_handle: AtomicU64,
    handler: Mutex<Option<Arc<dyn BufferHandler>>>,
    outstanding: Arc<AtomicUsize>,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            handler: Mutex::new(None),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Buffers handed to the handler whose release hook has not run yet.
    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for SyntheticEngine {
    fn create_pipeline(&self, launch: &str) -> Result<EngineHandle, EngineError> {
        let kind = SourceKind::from_launch(launch)
            .ok_or_else(|| EngineError::UnknownDescription(launch.to_string()))?;

        // Building the encoder here makes create the availability probe:
        // a missing codec fails the call instead of a worker later on.
        let source = if kind.is_audio() {
            PreparedSource::Tone(build_tone_encoder()?)
        } else {
            PreparedSource::Pattern(build_pattern_encoder(kind)?)
        };

        let handle = EngineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.slots.lock().unwrap().insert(
            handle.0,
            Slot {
                source: Some(SourceBox(source)),
                cancel: CancellationToken::new(),
                worker: None,
            },
        );
        debug!("prepared {:?} source as engine handle {}", kind, handle);
        Ok(handle)
    }

    fn start_pipeline(&self, handle: EngineHandle, id: PipelineId) -> Result<(), EngineError> {
        let handler = match self.handler.lock().unwrap().as_ref() {
            Some(handler) => Arc::clone(handler),
            None => return Err(EngineError::NoHandler),
        };

        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .get_mut(&handle.0)
            .ok_or(EngineError::UnknownHandle(handle))?;
        let source = slot
            .source
            .take()
            .ok_or(EngineError::AlreadyStarted(handle))?;

        let cancel = slot.cancel.clone();
        let outstanding = Arc::clone(&self.outstanding);
        slot.worker = Some(thread::spawn(move || {
            match source.0 {
                PreparedSource::Tone(encoder) => {
                    run_tone_source(encoder, id, handler, cancel, outstanding)
                }
                PreparedSource::Pattern(encoder) => {
                    run_pattern_source(encoder, id, handler, cancel, outstanding)
                }
            }
            debug!("source worker for pipeline {} exited", id);
        }));
        info!("synthetic source running for pipeline {}", id);
        Ok(())
    }

    fn stop_pipeline(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let slot = self
            .slots
            .lock()
            .unwrap()
            .remove(&handle.0)
            .ok_or(EngineError::UnknownHandle(handle))?;
        // The worker sees the cancellation on its next iteration; a buffer
        // already handed over completes on its own.
        slot.cancel.cancel();
        debug!("engine handle {} stopped", handle);
        Ok(())
    }

    fn register_handler(&self, handler: Arc<dyn BufferHandler>) {
        self.handler.lock().unwrap().replace(handler);
    }
}

fn build_tone_encoder() -> Result<AudioEncoder, EngineError> {
    build_opus_encoder("libopus")
        .or_else(|e| {
            warn!("libopus encoder unavailable ({e}), falling back to built-in opus");
            build_opus_encoder("opus")
        })
        .map_err(|e| EngineError::EncoderUnavailable {
            name: "libopus",
            reason: e.to_string(),
        })
}

fn build_opus_encoder(name: &str) -> Result<AudioEncoder, ac_ffmpeg::Error> {
    let mut builder = AudioEncoder::builder(name)?
        .sample_rate(AUDIO_SAMPLE_RATE)
        .channel_layout(ChannelLayout::from_channels(1).unwrap())
        .sample_format(get_sample_format("s16"));
    builder = match name {
        "libopus" => builder.set_option("frame_duration", "20"),
        _ => builder.set_option("strict", "experimental"),
    };
    builder.build()
}

fn build_pattern_encoder(kind: SourceKind) -> Result<VideoEncoder, EngineError> {
    let name = kind.encoder_name();
    let options = match kind {
        SourceKind::H264 => X264_OPTIONS,
        _ => VPX_OPTIONS,
    };

    let build = || -> Result<VideoEncoder, ac_ffmpeg::Error> {
        let mut builder = VideoEncoder::builder(name)?
            .pixel_format(video::frame::get_pixel_format("yuv420p"))
            .width(VIDEO_WIDTH)
            .height(VIDEO_HEIGHT)
            .time_base(TimeBase::new(1, 90_000));
        for (k, v) in options {
            builder = builder.set_option(k, v);
        }
        builder.build()
    };

    build().map_err(|e| EngineError::EncoderUnavailable {
        name,
        reason: e.to_string(),
    })
}

/// Wraps one encoded packet and hands it to the handler. The release
/// hook keeps the outstanding count honest on every drop path.
fn deliver(
    data: &[u8],
    duration: Duration,
    id: PipelineId,
    handler: &Arc<dyn BufferHandler>,
    outstanding: &Arc<AtomicUsize>,
) {
    outstanding.fetch_add(1, Ordering::SeqCst);
    let counter = Arc::clone(outstanding);
    let buffer = RawBuffer::new(Bytes::copy_from_slice(data), duration.as_nanos() as u64)
        .with_release(move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        });
    handler.on_buffer(id, buffer);
}

fn run_tone_source(
    mut encoder: AudioEncoder,
    id: PipelineId,
    handler: Arc<dyn BufferHandler>,
    cancel: CancellationToken,
    outstanding: Arc<AtomicUsize>,
) {
    let frame_samples = encoder.samples_per_frame().unwrap_or(960);
    let frame_duration =
        Duration::from_nanos(frame_samples as u64 * 1_000_000_000 / AUDIO_SAMPLE_RATE as u64);
    let mut phase = 0f32;

    while !cancel.is_cancelled() {
        let mut frame = AudioFrameMut::silence(
            encoder.codec_parameters().channel_layout(),
            encoder.codec_parameters().sample_format(),
            encoder.codec_parameters().sample_rate(),
            frame_samples,
        );
        write_tone(&mut frame, frame_samples, &mut phase);

        if let Err(e) = encoder.push(frame.freeze()) {
            error!("tone encoder rejected a frame: {e}");
            break;
        }
        loop {
            match encoder.take() {
                Ok(Some(packet)) => {
                    deliver(packet.data(), frame_duration, id, &handler, &outstanding)
                }
                Ok(None) => break,
                Err(e) => {
                    error!("tone encoder failed: {e}");
                    return;
                }
            }
        }
        thread::sleep(frame_duration);
    }
}

fn write_tone(frame: &mut AudioFrameMut, frame_samples: usize, phase: &mut f32) {
    let plane = &mut frame.planes_mut()[0];
    let data = plane.data_mut();
    let samples: &mut [i16] = unsafe {
        std::slice::from_raw_parts_mut(
            data.as_mut_ptr() as *mut i16,
            data.len() / std::mem::size_of::<i16>(),
        )
    };

    let step = std::f32::consts::TAU * TONE_HZ / AUDIO_SAMPLE_RATE as f32;
    for sample in samples.iter_mut().take(frame_samples) {
        *sample = (phase.sin() * TONE_AMPLITUDE) as i16;
        *phase = (*phase + step) % std::f32::consts::TAU;
    }
}

fn run_pattern_source(
    mut encoder: VideoEncoder,
    id: PipelineId,
    handler: Arc<dyn BufferHandler>,
    cancel: CancellationToken,
    outstanding: Arc<AtomicUsize>,
) {
    let time_base = TimeBase::new(1, 90_000);
    let pixel_format = video::frame::get_pixel_format("yuv420p");
    let frame_duration = Duration::from_nanos(1_000_000_000 / VIDEO_FPS as u64);
    let pts_step = (90_000 / VIDEO_FPS) as i64;

    let mut index = 0i64;
    while !cancel.is_cancelled() {
        let mut frame = VideoFrameMut::black(pixel_format, VIDEO_WIDTH, VIDEO_HEIGHT)
            .with_time_base(time_base);
        write_pattern(&mut frame, index);
        let frame = frame.with_pts(Timestamp::new(index * pts_step, time_base));

        if let Err(e) = encoder.push(frame.freeze()) {
            error!("pattern encoder rejected a frame: {e}");
            break;
        }
        loop {
            match encoder.take() {
                Ok(Some(packet)) => {
                    deliver(packet.data(), frame_duration, id, &handler, &outstanding)
                }
                Ok(None) => break,
                Err(e) => {
                    error!("pattern encoder failed: {e}");
                    return;
                }
            }
        }
        index += 1;
        thread::sleep(frame_duration);
    }
}

/// Diagonal gradient sliding a few pixels per frame. Chroma keeps the
/// neutral values from the black frame.
fn write_pattern(frame: &mut VideoFrameMut, index: i64) {
    let shift = (index as usize) * 4;
    let mut planes = frame.planes_mut();
    let luma = planes[0].data_mut();
    let line_size = luma.len() / VIDEO_HEIGHT;

    for row in 0..VIDEO_HEIGHT {
        for col in 0..VIDEO_WIDTH {
            luma[row * line_size + col] = ((row + col + shift) & 0xFF) as u8;
        }
    }
}
