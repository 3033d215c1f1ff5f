//! Application entry point: the supervisor.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Load [`AppConfig`] (optional first argument overrides the path) and
//!    validate it.
//! 3. Create the shared [`Broker`] and the process-wide [`StopToken`].
//! 4. Start a signal thread that raises the token on Ctrl-C.
//! 5. Spawn the component threads: segmenter, cloud workers, and the
//!    network client / camera when enabled.  Each component id is announced
//!    to the broker before its thread starts, so the barrier reports a
//!    component whose startup failed.
//! 6. Run the readiness barrier; an incomplete setup is logged and the
//!    supervisor carries on degraded.  Threads that already exited are
//!    joined and their errors reported.
//! 7. Run the dispatch loop on the main thread until stopped.
//! 8. Log undelivered messages and join every component thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use voice_robot::{
    audio::{CaptureSettings, EnergyVad, MicrophoneSource, RecordingWriter, SpeakerSink},
    broker::{Broker, ChannelId, ReadinessBarrier},
    camera::{self, CameraWorker, SnapshotFileSource},
    cloud::{
        worker::{REASONING_COMPONENT, TTS_COMPONENT},
        GeminiClient, ReasoningWorker, TtsWorker,
    },
    config::{AppConfig, AppPaths},
    dispatch::{ActuatorRouter, AudioSink, DispatchLoop, MutedSpeaker},
    hardware::{ArmBoard, LoggingBus},
    network::{client as network_client, NetworkClient},
    segmenter::{runner as segmenter_runner, SegmenterSettings, SegmenterWorker},
    worker::{reap_finished, spawn_component, ComponentThread, PollPolicy, StopToken},
};

/// Longest a cloud worker blocks on its request channel per iteration.
const CLOUD_DEQUEUE_WAIT: Duration = Duration::from_millis(200);

/// Backoff after a microphone read timed out without a frame.
const SEGMENTER_POLICY: PollPolicy = PollPolicy {
    idle_sleep: Duration::from_millis(10),
    busy_yield: Duration::ZERO,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let paths = AppPaths::new();
    let settings_file = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.settings_file.clone());
    let config = AppConfig::load_from(&settings_file)?;
    config.validate()?;
    if settings_file.exists() {
        log::info!("supervisor: configuration from {}", settings_file.display());
    } else {
        let path = settings_file.display();
        match config.save_to(&settings_file) {
            Ok(()) => log::info!("supervisor: wrote default configuration to {path}"),
            Err(e) => log::warn!("supervisor: using defaults, cannot write {path}: {e:#}"),
        }
    }

    let broker = Arc::new(Broker::new());
    let stop = StopToken::new();
    spawn_signal_listener(stop.clone())?;

    let mut threads = vec![spawn_segmenter(&broker, &stop, &config, &paths)?];
    if config.cloud.enabled {
        threads.extend(spawn_cloud_workers(&broker, &stop, &config, &paths)?);
    } else {
        log::warn!("supervisor: cloud workers disabled");
    }
    if config.network.enabled {
        threads.push(spawn_network_client(&broker, &stop, &config)?);
    }
    if config.camera.enabled {
        threads.push(spawn_camera(&broker, &stop, &config)?);
    }

    let barrier = ReadinessBarrier::new(
        Duration::from_millis(config.readiness.interval_ms),
        config.readiness.max_attempts,
    );
    let report = barrier.wait(&broker, &stop);
    if !report.is_ready() {
        log::warn!("supervisor: running degraded: {report}");
    }
    for (name, result) in reap_finished(&mut threads) {
        match result {
            Ok(()) => log::warn!("supervisor: {name} exited during startup"),
            Err(e) => log::error!("supervisor: {name} failed to start: {e:#}"),
        }
    }

    run_dispatch(&broker, &stop, &config);

    stop.stop();
    let pending: Vec<String> = broker
        .sizes()
        .into_iter()
        .filter(|&(id, len)| len > 0 && id != ChannelId::RunningComponents)
        .map(|(id, len)| format!("{id}={len}"))
        .collect();
    if !pending.is_empty() {
        log::info!("supervisor: undelivered at shutdown: {}", pending.join(", "));
    }
    for thread in threads {
        let name = thread.name().to_string();
        if let Err(e) = thread.join() {
            log::warn!("supervisor: {name}: {e:#}");
        }
    }
    log::info!("supervisor: shut down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Raise `stop` on Ctrl-C.
fn spawn_signal_listener(stop: StopToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("signal".into())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::info!("supervisor: interrupt received, stopping");
                        stop.stop();
                    }
                    Err(e) => log::error!("supervisor: cannot listen for Ctrl-C: {e}"),
                }
            });
        })?;
    Ok(())
}

/// The microphone is opened inside the thread: a cpal stream stays on the
/// thread that created it.
fn spawn_segmenter(
    broker: &Arc<Broker>,
    stop: &StopToken,
    config: &AppConfig,
    paths: &AppPaths,
) -> std::io::Result<ComponentThread> {
    broker.expect_component(segmenter_runner::COMPONENT_ID.into());
    let broker = Arc::clone(broker);
    let stop = stop.clone();
    let mic = config.microphone.clone();
    let recordings = mic.save_recordings.then(|| config.recordings_dir(paths));

    spawn_component("segmenter", move || {
        let source = MicrophoneSource::open(&CaptureSettings {
            device: mic.device.clone(),
            sample_rate: mic.sample_rate,
            frame_size: mic.chunk_size,
            read_timeout: mic.read_timeout(),
        })?;
        let settings = SegmenterSettings {
            max_silence: mic.max_silence(),
            min_sentence: mic.min_sentence(),
            sample_rate: mic.sample_rate,
        };

        let mut worker =
            SegmenterWorker::new(broker, source, EnergyVad::new(mic.vad_threshold), settings);
        if let Some(dir) = recordings {
            log::info!("segmenter: saving recordings to {}", dir.display());
            worker = worker.with_recorder(RecordingWriter::new(dir));
        }
        worker.run(&stop, SEGMENTER_POLICY);
        Ok(())
    })
}

/// A missing API key disables the cloud workers without stopping the rest;
/// the barrier then reports them missing.
fn spawn_cloud_workers(
    broker: &Arc<Broker>,
    stop: &StopToken,
    config: &AppConfig,
    paths: &AppPaths,
) -> std::io::Result<Vec<ComponentThread>> {
    broker.expect_component(REASONING_COMPONENT.into());
    broker.expect_component(TTS_COMPONENT.into());
    let api_key = match config.cloud.resolve_api_key(paths) {
        Ok(key) => key,
        Err(e) => {
            log::error!("supervisor: cloud workers not started: {e:#}");
            return Ok(Vec::new());
        }
    };
    let client = GeminiClient::from_config(&config.cloud, api_key);

    let reasoning = {
        let broker = Arc::clone(broker);
        let stop = stop.clone();
        let client = client.clone();
        let max_image_age = if config.camera.enabled {
            config.cloud.reasoning.max_image_age()
        } else {
            Duration::ZERO
        };
        spawn_component("reasoning", move || {
            ReasoningWorker::new(broker, client, CLOUD_DEQUEUE_WAIT, max_image_age)?.run(&stop);
            Ok(())
        })?
    };

    let tts = {
        let broker = Arc::clone(broker);
        let stop = stop.clone();
        spawn_component("tts", move || {
            TtsWorker::new(broker, client, CLOUD_DEQUEUE_WAIT)?.run(&stop);
            Ok(())
        })?
    };

    Ok(vec![reasoning, tts])
}

fn spawn_network_client(
    broker: &Arc<Broker>,
    stop: &StopToken,
    config: &AppConfig,
) -> std::io::Result<ComponentThread> {
    broker.expect_component(network_client::COMPONENT_ID.into());
    let client = NetworkClient::new(Arc::clone(broker), &config.network);
    let stop = stop.clone();
    log::info!("supervisor: network link to {}", client.address());
    spawn_component("network", move || {
        client.run(&stop);
        Ok(())
    })
}

fn spawn_camera(
    broker: &Arc<Broker>,
    stop: &StopToken,
    config: &AppConfig,
) -> std::io::Result<ComponentThread> {
    broker.expect_component(camera::COMPONENT_ID.into());
    let worker = CameraWorker::new(
        Arc::clone(broker),
        SnapshotFileSource::from_config(&config.camera),
        config.camera.poll_interval(),
        config.camera.max_reading_errors,
    );
    let stop = stop.clone();
    spawn_component("camera", move || worker.run(&stop))
}

// ---------------------------------------------------------------------------
// Dispatch (main thread)
// ---------------------------------------------------------------------------

fn run_dispatch(broker: &Arc<Broker>, stop: &StopToken, config: &AppConfig) {
    let hardware = &config.hardware;
    let mut board = ArmBoard::new(LoggingBus::new(hardware.bus_number, hardware.bus_address));
    board.reset();
    let router = ActuatorRouter::new(
        Arc::clone(broker),
        board,
        config.network.enabled,
        hardware.led_intensity,
    );

    let speaker: Box<dyn AudioSink> = if config.dispatch.playback {
        match SpeakerSink::open() {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                log::warn!("supervisor: no speech playback: {e}");
                Box::new(MutedSpeaker)
            }
        }
    } else {
        Box::new(MutedSpeaker)
    };

    DispatchLoop::new(Arc::clone(broker), router, speaker, &config.dispatch).run(stop);
}
