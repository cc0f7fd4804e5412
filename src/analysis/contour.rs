// Whole-track pitch contour, one value per hop.
//
// Built once, synchronously, right after a track is decoded and before it is
// handed to the engine. It is not real-time work and is allowed to take a
// while on long tracks.

use crate::pipeline::Track;
use crate::shared::{HOP_SIZE, WINDOW_SIZE};

use super::yin::{PitchEstimator, UNVOICED};

// A hop is suspect when its confidence is below this...
const MIN_CONFIDENCE: f32 = 0.50;
// ...or when it jumps further than this (semitones) from the previous value.
const MAX_JUMP: f32 = 7.0;
// Suspect hops in a row that may be papered over before we believe them.
const MAX_HOLD: u32 = 10;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PitchContour {
    pitches: Vec<f32>,
    hop: usize,
}

impl PitchContour {
    pub fn new(pitches: Vec<f32>, hop: usize) -> Self {
        Self { pitches, hop: hop.max(1) }
    }

    pub fn pitches(&self) -> &[f32] {
        &self.pitches
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    pub fn index_for_frame(&self, frame: u64) -> usize {
        (frame / self.hop as u64) as usize
    }

    pub fn at_frame(&self, frame: u64) -> Option<f32> {
        self.pitches.get(self.index_for_frame(frame)).copied()
    }
}

pub fn is_voiced(pitch: f32) -> bool {
    pitch > UNVOICED
}

/// Smooths single-hop glitches out of a raw pitch track.
///
/// Each suspect hop (low confidence, or a jump of more than seven
/// semitones) repeats the last accepted value, for at most ten hops in a row.
/// After that the raw value is taken even if it still looks suspect, so a
/// real change of register comes through late rather than never.
#[derive(Clone, Debug, Default)]
pub struct SpuriousHold {
    hold: u32,
    previous: Option<f32>,
    total_held: u64,
}

impl SpuriousHold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, raw: f32, confidence: f32) -> f32 {
        let corrected = match self.previous {
            Some(prev)
                if self.hold < MAX_HOLD
                    && (confidence < MIN_CONFIDENCE || (prev - raw).abs() > MAX_JUMP) =>
            {
                self.hold += 1;
                self.total_held += 1;
                prev
            }
            _ => {
                self.hold = 0;
                raw
            }
        };
        self.previous = Some(corrected);
        corrected
    }

    // Suspect hops in the current run
    pub fn hold_count(&self) -> u32 {
        self.hold
    }

    pub fn total_held(&self) -> u64 {
        self.total_held
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct PitchContourBuilder {
    estimator: Box<dyn PitchEstimator>,
    hop: usize,
    window: Vec<f32>,
    filter: SpuriousHold,
}

impl PitchContourBuilder {
    pub fn new(estimator: Box<dyn PitchEstimator>) -> Self {
        Self::with_sizes(estimator, HOP_SIZE, WINDOW_SIZE)
    }

    pub fn with_sizes(estimator: Box<dyn PitchEstimator>, hop: usize, window: usize) -> Self {
        let hop = hop.max(1);
        Self {
            estimator,
            hop,
            window: vec![0.0; window.max(hop)],
            filter: SpuriousHold::new(),
        }
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    pub fn spurious_filter(&self) -> &SpuriousHold {
        &self.filter
    }

    pub fn build(&mut self, track: &Track) -> PitchContour {
        self.filter.reset();
        self.window.fill(0.0);

        let channels = track.channels();
        let samples = track.samples();
        let hops = track.frames() as usize / self.hop;
        let mut pitches = Vec::with_capacity(hops);
        let keep = self.window.len() - self.hop;

        for i in 0..hops {
            // slide the analysis window along by one hop of channel-summed audio
            self.window.copy_within(self.hop.., 0);
            let fresh = &mut self.window[keep..];
            let block = &samples[i * self.hop * channels..(i + 1) * self.hop * channels];
            for (dst, frame) in fresh.iter_mut().zip(block.chunks_exact(channels)) {
                *dst = frame.iter().sum();
            }

            let est = self.estimator.estimate(&self.window);
            pitches.push(self.filter.filter(est.semitones, est.confidence));
        }

        PitchContour::new(pitches, self.hop)
    }
}
