// The time/pitch scaling primitive.
//
// The transport only talks to the TimeScaler trait: feed fixed-size planar
// blocks in, ask how much output is ready, pull output. GrainStretcher is
// the implementation the app ships with; anything with the same contract
// (a phase vocoder binding, a test double) can be dropped in instead.

use std::collections::VecDeque;

use crate::shared::{MAX_PROCESS_SIZE, MIN_SPEED_RATIO};

pub trait TimeScaler: Send {
    fn channels(&self) -> usize;

    // Largest block process() will be handed. Called before any audio flows.
    fn set_max_process_size(&mut self, frames: usize);

    /// Output duration / input duration.
    fn set_time_ratio(&mut self, ratio: f64);

    /// Frequency multiplier, 1.0 = unchanged.
    fn set_pitch_scale(&mut self, scale: f64);

    /// Feed `frames` frames of planar input: all of channel 0, then all of
    /// channel 1, and so on.
    fn process(&mut self, input: &[f32], frames: usize);

    // Frames that retrieve() can hand out right now
    fn available(&self) -> usize;

    /// Pull up to `frames` frames into planar `output`. Returns the number of
    /// frames actually written.
    fn retrieve(&mut self, output: &mut [f32], frames: usize) -> usize;

    // Drop all buffered input and output
    fn reset(&mut self);
}

const GRAIN: usize = 1024;
const SYNTH_HOP: usize = GRAIN / 2;
const MAX_PITCH_SCALE: f64 = 4.0;

// Windowed overlap-add scaler. Each grain reads GRAIN * pitch_scale input
// frames (resampled, which moves the pitch) and is laid down SYNTH_HOP output
// frames after the previous one while the input read position advances by
// SYNTH_HOP / time_ratio (which moves the tempo). A periodic Hann window at 50%
// overlap sums to one, so unity settings pass audio through unchanged.
pub struct GrainStretcher {
    channels: usize,
    window: Vec<f32>,
    time_ratio: f64,
    pitch_scale: f64,
    input: Vec<VecDeque<f32>>,
    read_pos: f64, // fractional offset into the front of `input`
    overlap: Vec<Vec<f32>>,
    output: Vec<VecDeque<f32>>,
    output_cap: usize,
}

impl GrainStretcher {
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        let window = (0..GRAIN)
            .map(|i| {
                let phase = std::f32::consts::TAU * i as f32 / GRAIN as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        let mut s = Self {
            channels,
            window,
            time_ratio: 1.0,
            pitch_scale: 1.0,
            input: Vec::new(),
            read_pos: 0.0,
            overlap: vec![vec![0.0; GRAIN]; channels],
            output: Vec::new(),
            output_cap: 0,
        };
        s.set_max_process_size(MAX_PROCESS_SIZE);
        s
    }

    // Input frames a grain needs beyond read_pos
    fn grain_span(&self) -> f64 {
        (GRAIN - 1) as f64 * self.pitch_scale + 2.0
    }

    fn input_len(&self) -> usize {
        self.input.first().map_or(0, |q| q.len())
    }

    fn output_len(&self) -> usize {
        self.output.first().map_or(0, |q| q.len())
    }

    // Turn as much pending input into output as the output queue can hold
    // without growing.
    fn synthesize(&mut self) {
        while (self.input_len() as f64) >= self.read_pos + self.grain_span()
            && self.output_len() + SYNTH_HOP <= self.output_cap
        {
            let step = self.pitch_scale;
            for ch in 0..self.channels {
                let src = &self.input[ch];
                let acc = &mut self.overlap[ch];
                for (i, w) in self.window.iter().enumerate() {
                    let pos = self.read_pos + i as f64 * step;
                    let idx = pos as usize;
                    let frac = (pos - idx as f64) as f32;
                    let a = src[idx];
                    let b = src.get(idx + 1).copied().unwrap_or(a);
                    acc[i] += w * (a + (b - a) * frac);
                }
                let out = &mut self.output[ch];
                out.extend(acc[..SYNTH_HOP].iter().copied());
                acc.copy_within(SYNTH_HOP.., 0);
                acc[GRAIN - SYNTH_HOP..].fill(0.0);
            }

            self.read_pos += SYNTH_HOP as f64 / self.time_ratio;
            let consumed = (self.read_pos as usize).min(self.input_len());
            for q in &mut self.input {
                q.drain(..consumed);
            }
            self.read_pos -= consumed as f64;
        }
    }
}

impl TimeScaler for GrainStretcher {
    fn channels(&self) -> usize {
        self.channels
    }

    fn set_max_process_size(&mut self, frames: usize) {
        let frames = frames.max(1);
        // worst case a single block at minimum speed turns into this much output
        let max_ratio = (1.0 / MIN_SPEED_RATIO).ceil() as usize;
        self.output_cap = frames * max_ratio + GRAIN;
        let input_cap = frames * 4 + (GRAIN as f64 * MAX_PITCH_SCALE) as usize + 4;
        self.input = (0..self.channels).map(|_| VecDeque::with_capacity(input_cap)).collect();
        self.output = (0..self.channels)
            .map(|_| VecDeque::with_capacity(self.output_cap + SYNTH_HOP))
            .collect();
        self.read_pos = 0.0;
    }

    fn set_time_ratio(&mut self, ratio: f64) {
        if ratio.is_finite() && ratio > 0.0 {
            self.time_ratio = ratio.min(1.0 / MIN_SPEED_RATIO);
        }
    }

    fn set_pitch_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.pitch_scale = scale.clamp(1.0 / MAX_PITCH_SCALE, MAX_PITCH_SCALE);
        }
    }

    fn process(&mut self, input: &[f32], frames: usize) {
        for (ch, q) in self.input.iter_mut().enumerate() {
            let start = ch * frames;
            if let Some(block) = input.get(start..start + frames) {
                q.extend(block.iter().copied());
            }
        }
        self.synthesize();
    }

    fn available(&self) -> usize {
        self.output_len()
    }

    fn retrieve(&mut self, output: &mut [f32], frames: usize) -> usize {
        let n = frames.min(self.output_len());
        for (ch, q) in self.output.iter_mut().enumerate() {
            let start = ch * frames;
            if let Some(dst) = output.get_mut(start..start + n) {
                for (d, s) in dst.iter_mut().zip(q.drain(..n)) {
                    *d = s;
                }
            }
        }
        // there may be input waiting on output room
        self.synthesize();
        n
    }

    fn reset(&mut self) {
        for q in &mut self.input {
            q.clear();
        }
        for q in &mut self.output {
            q.clear();
        }
        for acc in &mut self.overlap {
            acc.fill(0.0);
        }
        self.read_pos = 0.0;
    }
}
