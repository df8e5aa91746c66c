use crate::codec::Codec;
use crate::config::{AppConfig, app_name, version};
use crate::engine::{MediaEngine, SyntheticEngine};
use crate::pipeline::types::{MediaSample, PipelineId};
use crate::pipeline::{BufferRelay, PipelineRegistry};
use crate::playback::{AudioSink, PlaybackSink};
use crate::utils::sos::SignalOfStop;
use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use log::{debug, error, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{panic, process};
use tokio::sync::mpsc;

pub mod codec;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod pipeline;
pub mod playback;
pub mod utils;

/// Per-pipeline outbound queue depth. The relay drops buffers instead of
/// blocking an engine thread once this fills up.
const OUTBOUND_CAPACITY: usize = 256;

const HEALTH_INTERVAL: Duration = Duration::from_secs(10);

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Read configuration from a JSON file."),
        )
        .arg(
            Arg::new("codecs")
                .long("codecs")
                .value_name("LIST")
                .help("Comma separated codecs to run (vp8, vp9, h264, opus)."),
        )
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .value_name("NAME")
                .help("Audio output device, 'default' picks the host default."),
        )
        .subcommand(
            Command::new("play")
                .about("Play a 16-bit PCM WAV file once on the output device.")
                .arg(Arg::new("file").value_name("FILE").required(true)),
        )
        .get_matches();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // invoke the default handler and exit the process
        orig_hook(panic_info);
        process::exit(105);
    }));

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match AppConfig::load(Path::new(path)) {
            Ok(config) => config,
            Err(err) => {
                error!("failed to load configuration from {path}: {err:#}");
                process::exit(1);
            }
        },
        None => AppConfig::default(),
    };
    if let Some(device) = matches.get_one::<String>("device") {
        config.audio.device = device.clone();
    }

    let sos = SignalOfStop::new();

    // gracefully close the app when receiving SIGINT or SIGTERM; repeated
    // signals are absorbed while the first one drives the teardown
    let cancel = sos.clone();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .expect("Error setting Ctrl-C handler");

    let result = match matches.subcommand() {
        Some(("play", sub)) => play(sub, &config),
        _ => run(&matches, config, &sos),
    };

    if let Err(err) = result {
        error!("{err:#}");
        process::exit(1);
    }
    // Interrupted runs end with the conventional interrupt status, after
    // the playback device is already closed.
    if sos.cancelled() {
        process::exit(130);
    }
}

/// Bridge the engine to the playback device and the outbound drains until
/// a stop signal arrives, then tear down in dependency order.
fn run(matches: &ArgMatches, config: AppConfig, sos: &SignalOfStop) -> anyhow::Result<()> {
    let codecs = requested_codecs(matches, &config)?;

    let sink = Arc::new(
        PlaybackSink::open(&config.audio).context("failed to open the playback device")?,
    );
    let engine: Arc<dyn MediaEngine> = Arc::new(SyntheticEngine::new());
    let registry = Arc::new(PipelineRegistry::new(engine.clone()));
    engine.register_handler(Arc::new(BufferRelay::new(registry.clone(), sink.clone())));

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;

    for codec in codecs {
        let (outbound, drain) = mpsc::channel(OUTBOUND_CAPACITY);
        let pipeline = registry
            .create(codec, outbound)
            .with_context(|| format!("failed to create the {codec} pipeline"))?;
        registry
            .start(&pipeline)
            .with_context(|| format!("failed to start pipeline {}", pipeline.id()))?;
        runtime.spawn(drain_outbound(drain, pipeline.id(), codec));
    }

    let monitored = registry.clone();
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for pipeline in monitored.snapshot() {
                info!(
                    "pipeline {} ({}): {}",
                    pipeline.id(),
                    pipeline.codec(),
                    pipeline.health().summary()
                );
            }
        }
    });

    info!("{} running, Ctrl-C to stop", app_name());
    sos.wait_cancellation();

    info!("shutting down");
    registry.stop_all();
    // Sources are stopped, so the drains run dry on their own
    runtime.shutdown_timeout(Duration::from_millis(500));
    sink.close();
    Ok(())
}

/// Stand-in for the external transport sender: consumes a pipeline's
/// outbound channel and accounts for what a real sender would put on the
/// wire. A real sender owns the receiving side the same way and brings
/// its own bounded drop-oldest policy.
async fn drain_outbound(mut drain: mpsc::Receiver<MediaSample>, id: PipelineId, codec: Codec) {
    let mut sent: u64 = 0;
    let mut bytes: u64 = 0;
    while let Some(sample) = drain.recv().await {
        sent += 1;
        bytes += sample.data.len() as u64;
        if sent % 512 == 0 {
            debug!(
                "pipeline {id} ({codec}): {sent} samples out, last spans {} clock ticks",
                sample.samples
            );
        }
    }
    info!("outbound drain for pipeline {id} ({codec}) done, {sent} samples / {bytes} bytes");
}

fn requested_codecs(matches: &ArgMatches, config: &AppConfig) -> anyhow::Result<Vec<Codec>> {
    let names: Vec<String> = match matches.get_one::<String>("codecs") {
        Some(list) => list
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
        None => config.codecs.clone(),
    };
    if names.is_empty() {
        anyhow::bail!("no codecs requested");
    }
    names
        .iter()
        .map(|name| name.parse::<Codec>().map_err(anyhow::Error::from))
        .collect()
}

fn play(matches: &ArgMatches, config: &AppConfig) -> anyhow::Result<()> {
    let file = matches
        .get_one::<String>("file")
        .context("missing file argument")?;
    playback::wav::play_file(Path::new(file), &config.audio.device, config.audio.buffer)?;
    Ok(())
}
