//! Pipeline registration and lifecycle
//!
//! The registry owns every pipeline for the lifetime of the process. Ids are
//! handed out by a monotonic counter and never reused, so a stale id held by
//! a late engine callback can only miss the map, never hit a different
//! pipeline.

use crate::codec::Codec;
use crate::decoder::OpusDecoder;
use crate::engine::{EngineError, EngineHandle, MediaEngine};
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::state::PipelineState;
use crate::pipeline::types::{MediaSample, PipelineId};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by registry operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("decoder init failed: {0}")]
    Decoder(#[from] ac_ffmpeg::Error),

    #[error("pipeline {id}: invalid state transition {from} -> {to}")]
    InvalidTransition {
        id: PipelineId,
        from: PipelineState,
        to: PipelineState,
    },
}

/// State and engine handle share one lock so "handle present while not
/// stopped" holds at every observation point.
struct Control {
    state: PipelineState,
    handle: Option<EngineHandle>,
}

/// A single encoder pipeline tracked by the registry.
///
/// The codec, launch description and outbound sender are fixed at creation;
/// lifecycle state lives behind interior mutability so the registry can
/// drive transitions while the relay holds its own reference.
pub struct Pipeline {
    id: PipelineId,
    codec: Codec,
    launch: String,
    control: Mutex<Control>,
    outbound: mpsc::Sender<MediaSample>,
    decoder: Option<Mutex<OpusDecoder>>,
    health: PipelineHealth,
}

impl Pipeline {
    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn launch(&self) -> &str {
        &self.launch
    }

    pub fn state(&self) -> PipelineState {
        self.control.lock().unwrap().state
    }

    pub fn health(&self) -> &PipelineHealth {
        &self.health
    }

    /// Sender half of the outbound sample channel.
    pub fn outbound(&self) -> &mpsc::Sender<MediaSample> {
        &self.outbound
    }

    /// Per-stream decoder, present only on audio pipelines.
    pub(crate) fn decoder(&self) -> Option<&Mutex<OpusDecoder>> {
        self.decoder.as_ref()
    }
}

struct RegistryInner {
    pipelines: HashMap<PipelineId, Arc<Pipeline>>,
    next_id: usize,
}

/// Shared map of live pipelines plus the engine they were created against.
///
/// The inner mutex guards only the map and the id counter. Engine calls and
/// decoder construction happen outside it, so a slow engine never blocks
/// concurrent lookups from the relay.
pub struct PipelineRegistry {
    inner: Mutex<RegistryInner>,
    engine: Arc<dyn MediaEngine>,
}

impl PipelineRegistry {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                pipelines: HashMap::new(),
                next_id: 0,
            }),
            engine,
        }
    }

    /// Create a pipeline for `codec`, forwarding its buffers to `outbound`.
    ///
    /// The Opus decoder is built and the engine pipeline instantiated before
    /// the registry is touched, so any failure leaves the map and the id
    /// counter exactly as they were.
    pub fn create(
        &self,
        codec: Codec,
        outbound: mpsc::Sender<MediaSample>,
    ) -> Result<Arc<Pipeline>, PipelineError> {
        let launch = codec.launch_description();

        let decoder = if codec.is_audio() {
            Some(Mutex::new(OpusDecoder::new()?))
        } else {
            None
        };

        let handle = self.engine.create_pipeline(&launch)?;

        let mut inner = self.inner.lock().unwrap();
        let id = PipelineId(inner.next_id);
        inner.next_id += 1;

        let pipeline = Arc::new(Pipeline {
            id,
            codec,
            launch,
            control: Mutex::new(Control {
                state: PipelineState::Created,
                handle: Some(handle),
            }),
            outbound,
            decoder,
            health: PipelineHealth::new(),
        });
        inner.pipelines.insert(id, pipeline.clone());
        drop(inner);

        info!("created pipeline {id} ({codec})");
        Ok(pipeline)
    }

    /// Resolve an id to its pipeline. Unknown ids miss cleanly.
    pub fn lookup(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        self.inner.lock().unwrap().pipelines.get(&id).cloned()
    }

    /// Begin asynchronous buffer delivery for `pipeline`.
    ///
    /// Valid only from `Created`; restarting a stopped pipeline is rejected.
    /// On engine failure the pipeline stays in its previous state.
    pub fn start(&self, pipeline: &Pipeline) -> Result<(), PipelineError> {
        let mut control = pipeline.control.lock().unwrap();
        let target = PipelineState::Started {
            started_at: Instant::now(),
        };
        if !control.state.can_transition_to(&target) {
            return Err(PipelineError::InvalidTransition {
                id: pipeline.id,
                from: control.state,
                to: target,
            });
        }
        let handle = match control.handle {
            Some(handle) => handle,
            // Only stop clears the handle, so this mirrors the state check
            None => {
                return Err(PipelineError::InvalidTransition {
                    id: pipeline.id,
                    from: control.state,
                    to: target,
                });
            }
        };
        self.engine.start_pipeline(handle, pipeline.id)?;
        control.state = target;

        info!("pipeline {} started ({})", pipeline.id, pipeline.codec);
        Ok(())
    }

    /// Halt buffer delivery and release the engine handle.
    ///
    /// Terminal. In-flight callbacks already past the registry may still
    /// complete after this returns.
    pub fn stop(&self, pipeline: &Pipeline) -> Result<(), PipelineError> {
        let mut control = pipeline.control.lock().unwrap();
        if !control.state.can_transition_to(&PipelineState::Stopped) {
            return Err(PipelineError::InvalidTransition {
                id: pipeline.id,
                from: control.state,
                to: PipelineState::Stopped,
            });
        }
        if let Some(handle) = control.handle {
            self.engine.stop_pipeline(handle)?;
        }
        control.handle = None;
        control.state = PipelineState::Stopped;

        info!("pipeline {} stopped", pipeline.id);
        Ok(())
    }

    /// Unregister a pipeline. The caller stops it first; removal alone does
    /// not touch the engine.
    pub fn remove(&self, id: PipelineId) -> Option<Arc<Pipeline>> {
        let removed = self.inner.lock().unwrap().pipelines.remove(&id);
        if removed.is_some() {
            info!("removed pipeline {id}");
        }
        removed
    }

    /// Best-effort stop of every registered pipeline, for shutdown.
    pub fn stop_all(&self) {
        let mut pipelines = self.snapshot();
        pipelines.sort_by_key(|p| p.id());
        for pipeline in pipelines {
            match self.stop(&pipeline) {
                Ok(()) => {}
                // Already stopped is fine on the shutdown path
                Err(PipelineError::InvalidTransition { .. }) => {}
                Err(err) => warn!("failed to stop pipeline {}: {err}", pipeline.id()),
            }
        }
    }

    /// Clone out the current set of pipelines.
    pub fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        self.inner
            .lock()
            .unwrap()
            .pipelines
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
