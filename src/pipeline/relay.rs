//! Buffer relay between the engine and the consumers
//!
//! Engine callbacks land here on engine-managed threads. The relay resolves
//! the pipeline id, decodes audio for the local sink and forwards the encoded
//! payload on the pipeline's outbound channel. The registry lock is held only
//! for the resolve; decode, playback and the send all run outside it, so one
//! pipeline blocked on the device never stalls the others.

use crate::engine::{BufferHandler, RawBuffer};
use crate::pipeline::registry::PipelineRegistry;
use crate::pipeline::types::{MediaSample, PipelineId, sample_count};
use crate::playback::AudioSink;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

pub struct BufferRelay {
    registry: Arc<PipelineRegistry>,
    sink: Arc<dyn AudioSink>,
}

impl BufferRelay {
    pub fn new(registry: Arc<PipelineRegistry>, sink: Arc<dyn AudioSink>) -> Self {
        Self { registry, sink }
    }
}

impl BufferHandler for BufferRelay {
    fn on_buffer(&self, id: PipelineId, buffer: RawBuffer) {
        let pipeline = match self.registry.lookup(id) {
            Some(pipeline) => pipeline,
            None => {
                warn!("discarding buffer, no pipeline {id}");
                return;
            }
        };

        let samples = sample_count(pipeline.codec().clock_rate(), buffer.duration());

        // Audio pipelines carry a decoder; the decoded copy feeds the local
        // sink while the encoded payload goes out untouched.
        if let Some(decoder) = pipeline.decoder() {
            let decoded = decoder.lock().unwrap().decode(buffer.data());
            match decoded {
                Ok(pcm) => {
                    if let Err(err) = self.sink.write_pcm(&pcm) {
                        debug!("pipeline {id}: playback write skipped: {err}");
                    }
                }
                Err(err) => {
                    pipeline.health().record_decode_failure();
                    warn!("pipeline {id}: dropping undecodable buffer: {err}");
                    return;
                }
            }
        }

        let sample = MediaSample {
            data: buffer.data().clone(),
            samples,
        };
        match pipeline.outbound().try_send(sample) {
            Ok(()) => pipeline.health().record_frame(buffer.len()),
            Err(TrySendError::Full(_)) => {
                pipeline.health().record_frame_drop();
                warn!("pipeline {id}: outbound channel full, dropping buffer");
            }
            Err(TrySendError::Closed(_)) => {
                pipeline.health().record_frame_drop();
                debug!("pipeline {id}: outbound channel closed, dropping buffer");
            }
        }
    }
}
