// The pitch estimator primitive: a window of mono samples in, one pitch
// (MIDI-style semitones) and a confidence in [0, 1] out.

pub const UNVOICED: f32 = 0.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchEstimate {
    pub semitones: f32,
    pub confidence: f32,
}

impl PitchEstimate {
    pub const UNVOICED: Self = Self { semitones: UNVOICED, confidence: 0.0 };
}

pub trait PitchEstimator: Send {
    fn estimate(&mut self, window: &[f32]) -> PitchEstimate;
}

// Melodic range we bother looking for, in Hz
const MIN_FREQ: f32 = 60.0;
const MAX_FREQ: f32 = 1600.0;
// Analysis runs at roughly this rate; the window is box-filtered down to it
const ANALYSIS_RATE: u32 = 11_025;
const SILENCE_POWER: f32 = 1e-7;
// d' a dip has to get under before we take it as the period
const THRESHOLD: f32 = 0.15;

/// YIN (de Cheveigné & Kawahara) over a decimated copy of the window.
///
/// Confidence is `1 - d'(τ)` at the chosen lag, so a clean periodic signal
/// scores close to 1 and noise scores low. Silent windows are reported as
/// unvoiced with zero confidence.
pub struct YinEstimator {
    rate: f32, // after decimation
    decimation: usize,
    reduced: Vec<f32>,
    cmnd: Vec<f32>,
}

impl YinEstimator {
    pub fn new(sample_rate: u32) -> Self {
        let decimation = (sample_rate / ANALYSIS_RATE).max(1) as usize;
        Self {
            rate: sample_rate as f32 / decimation as f32,
            decimation,
            reduced: Vec::new(),
            cmnd: Vec::new(),
        }
    }
}

impl PitchEstimator for YinEstimator {
    fn estimate(&mut self, window: &[f32]) -> PitchEstimate {
        self.reduced.clear();
        self.reduced.extend(
            window
                .chunks(self.decimation)
                .map(|c| c.iter().sum::<f32>() / c.len() as f32),
        );
        let x = &self.reduced;
        let n = x.len();
        if n < 8 {
            return PitchEstimate::UNVOICED;
        }
        let power = x.iter().map(|v| v * v).sum::<f32>() / n as f32;
        if power < SILENCE_POWER {
            return PitchEstimate::UNVOICED;
        }

        let half = n / 2;
        let min_tau = ((self.rate / MAX_FREQ) as usize).max(2);
        let max_tau = ((self.rate / MIN_FREQ) as usize).min(half - 1);
        if min_tau + 2 >= max_tau {
            return PitchEstimate::UNVOICED;
        }

        // cumulative mean normalized difference, d'(0) = 1
        self.cmnd.clear();
        self.cmnd.resize(max_tau + 1, 1.0);
        let mut running = 0.0f32;
        for tau in 1..=max_tau {
            let d: f32 = (0..half).map(|j| {
                let diff = x[j] - x[j + tau];
                diff * diff
            }).sum();
            running += d;
            self.cmnd[tau] = if running > 0.0 { d * tau as f32 / running } else { 1.0 };
        }
        let cmnd = &self.cmnd;

        // first dip under the threshold, followed down to its local minimum
        let mut tau = None;
        let mut t = min_tau;
        while t < max_tau {
            if cmnd[t] < THRESHOLD {
                while t + 1 < max_tau && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                tau = Some(t);
                break;
            }
            t += 1;
        }
        // nothing under threshold: best guess, low confidence
        let tau = tau.unwrap_or_else(|| {
            (min_tau..max_tau)
                .min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
                .unwrap_or(min_tau)
        });

        let refined = if tau > 1 && tau + 1 <= max_tau {
            let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
            let denom = a - 2.0 * b + c;
            if denom.abs() > f32::EPSILON {
                tau as f32 + 0.5 * (a - c) / denom
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };

        let freq = self.rate / refined;
        PitchEstimate {
            semitones: 69.0 + 12.0 * (freq / 440.0).log2(),
            confidence: (1.0 - cmnd[tau]).clamp(0.0, 1.0),
        }
    }
}
