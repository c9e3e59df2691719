//! Buffer queue playback demo
//!
//! Builds an engine, an output mix and a buffer-queue audio player, streams a
//! generated tone through the queue while a render thread drains it, and
//! prints a JSON summary.
//!
//! Usage: `sles-demo [config.toml]`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sles_runtime::{
    audio::{
        BufferQueueEvent, BufferQueueState, BufferQueueStats, DataFormat, DataLocator, DataSink, DataSource,
        PcmFormat,
    },
    config::RuntimeConfig,
    engine::create_engine,
    object::{InterfaceId, InterfaceRequest, InterfaceState, Mode, ObjectEvent, ObjectState},
    SlError,
};

const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u32 = 2;
const BUFFER_MS: u32 = 10;
const TONE_HZ: f32 = 440.0;
const BUFFERS_TO_PLAY: u32 = 200;

#[derive(Debug, Serialize)]
struct DemoSummary {
    sample_rate: u32,
    channels: u32,
    queue_capacity: usize,
    buffers_played: u32,
    bytes_rendered: u64,
    queue: BufferQueueStats,
    player_state: ObjectState,
    queue_interface: Option<InterfaceState>,
    full_queue_waits: u32,
    elapsed_ms: u128,
}

/// One buffer of interleaved s16le sine samples starting at `frame`
fn tone_buffer(frame: u64, frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * CHANNELS as usize * 2);
    for i in 0..frames {
        let t = (frame + i as u64) as f32 / SAMPLE_RATE as f32;
        let sample = ((t * TONE_HZ * std::f32::consts::TAU).sin() * 0.25 * i16::MAX as f32) as i16;
        for _ in 0..CHANNELS {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}

fn load_config() -> Result<RuntimeConfig> {
    match std::env::args().nth(1) {
        Some(path) => RuntimeConfig::load(&path).with_context(|| format!("loading {}", path)),
        None => Ok(RuntimeConfig::load_or_default()?),
    }
}

fn main() -> Result<()> {
    let config = load_config()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting buffer queue demo");

    let engine = create_engine(&config, &[])?;
    engine.realize(Mode::Sync)?;
    let factory = engine.get_interface(InterfaceId::Engine)?.as_engine()?;

    let mix = factory.create_output_mix(&[])?;
    mix.realize(Mode::Sync)?;

    let capacity = config.buffer_queue.default_capacity;
    let player = factory.create_audio_player(
        DataSource {
            locator: DataLocator::BufferQueue {
                num_buffers: capacity,
            },
            format: DataFormat::Pcm(PcmFormat::s16le(CHANNELS, SAMPLE_RATE)),
        },
        DataSink {
            locator: DataLocator::OutputMix {
                output_mix: Arc::clone(&mix),
            },
            format: DataFormat::Unspecified,
        },
        &[
            InterfaceRequest::required(InterfaceId::BufferQueue),
            InterfaceRequest::optional(InterfaceId::Volume),
        ],
    )?;

    let (realized_tx, realized_rx) = crossbeam_channel::bounded(1);
    player.register_callback(Some(Arc::new(move |event: ObjectEvent| {
        if let ObjectEvent::AsyncTermination { result, .. } = event {
            realized_tx.try_send(result).ok();
        }
    })))?;
    player.realize(Mode::Async)?;
    realized_rx
        .recv_timeout(Duration::from_secs(5))
        .context("player realization timed out")??;
    tracing::info!("Player #{} realized", player.instance_id());

    let queue = player
        .get_interface(InterfaceId::BufferQueue)?
        .as_buffer_queue()?;

    let (completed_tx, completed_rx) = crossbeam_channel::unbounded();
    queue.register_callback(Some(Arc::new(move |event, state: BufferQueueState| {
        if event == BufferQueueEvent::BufferCompleted {
            completed_tx.send(state.play_index).ok();
        }
    })))?;

    // Render thread drains the queue at roughly real-time pace
    let producing = Arc::new(AtomicBool::new(true));
    let rendered = Arc::new(AtomicU64::new(0));
    let frames_per_buffer = (SAMPLE_RATE * BUFFER_MS / 1000) as usize;
    let buffer_bytes = frames_per_buffer * CHANNELS as usize * 2;
    let render_block = buffer_bytes / 2;
    let renderer = {
        let queue = queue.clone();
        let producing = Arc::clone(&producing);
        let rendered = Arc::clone(&rendered);
        thread::Builder::new()
            .name("sles-render".to_string())
            .spawn(move || -> Result<(), SlError> {
                let mut block = vec![0u8; render_block];
                loop {
                    let written = queue.fill(&mut block)?;
                    rendered.fetch_add(written as u64, Ordering::Relaxed);
                    if written == 0 && !producing.load(Ordering::Acquire) {
                        return Ok(());
                    }
                    thread::sleep(Duration::from_millis((BUFFER_MS / 2) as u64));
                }
            })?
    };

    let start = Instant::now();
    let mut full_queue_waits = 0u32;
    let mut frame = 0u64;
    for _ in 0..BUFFERS_TO_PLAY {
        let buffer = bytes::Bytes::from(tone_buffer(frame, frames_per_buffer));
        frame += frames_per_buffer as u64;
        loop {
            match queue.enqueue(buffer.clone()) {
                Ok(()) => break,
                Err(SlError::BufferInsufficient) => {
                    full_queue_waits += 1;
                    completed_rx.recv_timeout(Duration::from_secs(1)).ok();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    producing.store(false, Ordering::Release);

    match renderer.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("render thread panicked"),
    }

    let summary = DemoSummary {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        queue_capacity: queue.capacity()?,
        buffers_played: BUFFERS_TO_PLAY,
        bytes_rendered: rendered.load(Ordering::Relaxed),
        queue: queue.stats()?,
        player_state: player.state(),
        queue_interface: player.interface_state(InterfaceId::BufferQueue),
        full_queue_waits,
        elapsed_ms: start.elapsed().as_millis(),
    };

    engine.destroy();
    tracing::info!("Engine destroyed");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
