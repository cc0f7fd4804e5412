use std::cell::Cell;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio_api::{AudioCommand, Readback};
use crate::error::{Error, Result};

mod engine;
mod stretcher;
mod transport;

pub use engine::{Engine, MAX_TRACK_CHANNELS};
pub use stretcher::{GrainStretcher, TimeScaler};
pub use transport::Transport;

const COMMAND_CAPACITY: usize = 1024;

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    retired_rx: Receiver<Box<Transport>>,
    readback: Arc<Readback>,
    overflows_reported: Cell<u64>,
    sample_rate: u32,
    channels: usize,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            tracing::warn!("audio command dropped: {:?}", e.into_inner());
        }
    }

    pub fn readback(&self) -> Arc<Readback> {
        Arc::clone(&self.readback)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    // Free transports the engine has swapped out. Call from the UI loop.
    pub fn collect_retired(&self) {
        while let Ok(old) = self.retired_rx.try_recv() {
            tracing::debug!("dropping retired transport ({} frames)", old.track().frames());
        }
        let overflows = self.readback.retire_overflows();
        if overflows > self.overflows_reported.get() {
            tracing::warn!(
                count = overflows - self.overflows_reported.get(),
                "retire channel full, transport freed on the audio thread"
            );
            self.overflows_reported.set(overflows);
        }
    }
}

pub fn start_audio() -> Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(COMMAND_CAPACITY);
    // every queued command could be a load, so every one gets a retire slot
    let (retired_tx, retired_rx) = crossbeam_channel::bounded::<Box<Transport>>(COMMAND_CAPACITY);
    let readback = Arc::new(Readback::new());

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("no default output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("no default output config: {e}")))?;

    let sample_rate: u32 = config.sample_rate();
    let channels = config.channels() as usize;

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let mut engine = Engine::new(channels, Arc::clone(&readback));
            engine.set_retired_tx(retired_tx);
            let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine)?;
            output_stream
                .play()
                .map_err(|e| Error::AudioOutput(format!("failed to play output stream: {e}")))?;
            tracing::info!(sample_rate, channels, "audio output started");

            Ok(AudioHandle {
                tx,
                retired_rx,
                readback,
                overflows_reported: Cell::new(0),
                sample_rate,
                channels,
                _output_stream: output_stream,
            })
        }
        other => Err(Error::AudioOutput(format!(
            "unsupported sample format {other:?} (only f32 supported)"
        ))),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
) -> Result<cpal::Stream> {
    // runs on cpal's error thread, not inside the render callback
    let err_fn = |err| tracing::error!("audio output stream error: {err}");

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info| {
                // apply pending commands between blocks, never mid-render
                while let Ok(cmd) = rx.try_recv() {
                    engine.handle_cmd(cmd);
                }
                engine.render_block(data);
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("could not build output stream: {e}")))?;

    Ok(stream)
}
