// Playhead bookkeeping around a TimeScaler.
//
// The playhead here counts *input* frames: it is the start of the next block
// that will be fed to the scaler, not the frame currently coming out of the
// speakers. The scaler's internal latency sits between the two, which is
// close enough for navigation and display.

use std::fmt;
use std::sync::Arc;

use crate::pipeline::Track;
use crate::shared::{MAX_PROCESS_SIZE, MIN_SPEED_RATIO};

use super::stretcher::{GrainStretcher, TimeScaler};

// Largest retrieve per inner step; bigger requests are split.
const MAX_OUTPUT_CHUNK: usize = 4096;
// Blocks fed in a row without the scaler producing anything before we give
// up on this callback and hand back silence.
const MAX_STALLED_FEEDS: usize = 16;

pub struct Transport {
    track: Arc<Track>,
    scaler: Box<dyn TimeScaler>,
    playhead: u64,
    speed: f64,
    pitch_semitones: f64,
    planar_in: Vec<f32>,  // channels * MAX_PROCESS_SIZE
    planar_out: Vec<f32>, // channels * MAX_OUTPUT_CHUNK
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("frames", &self.track.frames())
            .field("channels", &self.track.channels())
            .field("playhead", &self.playhead)
            .field("speed", &self.speed)
            .field("pitch_semitones", &self.pitch_semitones)
            .finish()
    }
}

impl Transport {
    pub fn new(track: Arc<Track>) -> Self {
        let scaler = Box::new(GrainStretcher::new(track.channels()));
        Self::with_scaler(track, scaler)
    }

    pub fn with_scaler(track: Arc<Track>, mut scaler: Box<dyn TimeScaler>) -> Self {
        let channels = track.channels();
        scaler.set_max_process_size(MAX_PROCESS_SIZE);
        scaler.set_time_ratio(1.0);
        scaler.set_pitch_scale(1.0);
        Self {
            track,
            scaler,
            playhead: 0,
            speed: 1.0,
            pitch_semitones: 0.0,
            planar_in: vec![0.0; channels * MAX_PROCESS_SIZE],
            planar_out: vec![0.0; channels * MAX_OUTPUT_CHUNK],
        }
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn channels(&self) -> usize {
        self.track.channels()
    }

    pub fn position(&self) -> u64 {
        self.playhead
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn pitch(&self) -> f64 {
        self.pitch_semitones
    }

    // Jump the input playhead. Whatever the scaler had buffered belongs to the
    // old position and is thrown away.
    pub fn seek(&mut self, position: u64) {
        self.scaler.reset();
        self.playhead = position;
    }

    pub fn set_speed(&mut self, ratio: f64) {
        let ratio = if ratio.is_finite() { ratio.max(MIN_SPEED_RATIO) } else { 1.0 };
        self.speed = ratio;
        self.scaler.set_time_ratio(1.0 / ratio);
    }

    pub fn set_pitch(&mut self, semitones: f64) {
        let semitones = if semitones.is_finite() { semitones } else { 0.0 };
        self.pitch_semitones = semitones;
        self.scaler.set_pitch_scale(2.0_f64.powf(semitones / 12.0));
    }

    // Deinterleave one block from the playhead into planar_in (zero past the
    // end of the track), hand it to the scaler and advance.
    fn feed_block(&mut self) {
        let channels = self.track.channels();
        let samples = self.track.samples();
        let start = self.playhead as usize;
        for i in 0..MAX_PROCESS_SIZE {
            let base = (start + i).checked_mul(channels);
            for ch in 0..channels {
                let v = base
                    .and_then(|b| samples.get(b + ch))
                    .copied()
                    .unwrap_or(0.0);
                self.planar_in[ch * MAX_PROCESS_SIZE + i] = v;
            }
        }
        self.scaler.process(&self.planar_in, MAX_PROCESS_SIZE);
        self.playhead += MAX_PROCESS_SIZE as u64;
    }

    /// Fill `output` (interleaved, `channels()` samples per frame) with
    /// `frames` frames of scaled audio. Returns the frames the scaler really
    /// produced; anything short of `frames` is left as silence.
    pub fn get_output(&mut self, output: &mut [f32], frames: usize) -> usize {
        let channels = self.track.channels();
        let frames = frames.min(output.len() / channels);
        let mut written = 0;

        while written < frames {
            let chunk = (frames - written).min(MAX_OUTPUT_CHUNK);
            let mut stalled = 0;
            while self.scaler.available() < chunk && stalled < MAX_STALLED_FEEDS {
                let before = self.scaler.available();
                self.feed_block();
                if self.scaler.available() <= before {
                    stalled += 1;
                } else {
                    stalled = 0;
                }
            }

            let got = self.scaler.retrieve(&mut self.planar_out[..channels * chunk], chunk);
            let dst = &mut output[written * channels..(written + chunk) * channels];
            for i in 0..chunk {
                for ch in 0..channels {
                    dst[i * channels + ch] = if i < got {
                        self.planar_out[ch * chunk + i]
                    } else {
                        0.0
                    };
                }
            }
            written += chunk;
            if got < chunk {
                output[written * channels..frames * channels].fill(0.0);
                return written - (chunk - got);
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Passes input straight through, one block of latency
    struct Passthrough {
        channels: usize,
        queue: Vec<f32>, // planar, grows (tests only)
        frames: usize,
        time_ratio: f64,
        pitch_scale: f64,
        resets: usize,
    }

    impl Passthrough {
        fn new(channels: usize) -> Self {
            Self { channels, queue: Vec::new(), frames: 0, time_ratio: 1.0, pitch_scale: 1.0, resets: 0 }
        }
    }

    impl TimeScaler for Passthrough {
        fn channels(&self) -> usize { self.channels }
        fn set_max_process_size(&mut self, _frames: usize) {}
        fn set_time_ratio(&mut self, ratio: f64) { self.time_ratio = ratio; }
        fn set_pitch_scale(&mut self, scale: f64) { self.pitch_scale = scale; }
        fn process(&mut self, input: &[f32], frames: usize) {
            // keep interleaved internally for simplicity
            for i in 0..frames {
                for ch in 0..self.channels {
                    self.queue.push(input[ch * frames + i]);
                }
            }
            self.frames += frames;
        }
        fn available(&self) -> usize { self.frames }
        fn retrieve(&mut self, output: &mut [f32], frames: usize) -> usize {
            let n = frames.min(self.frames);
            let taken: Vec<f32> = self.queue.drain(..n * self.channels).collect();
            for i in 0..n {
                for ch in 0..self.channels {
                    output[ch * frames + i] = taken[i * self.channels + ch];
                }
            }
            self.frames -= n;
            n
        }
        fn reset(&mut self) { self.queue.clear(); self.frames = 0; self.resets += 1; }
    }

    // Never produces anything
    struct Starved;

    impl TimeScaler for Starved {
        fn channels(&self) -> usize { 2 }
        fn set_max_process_size(&mut self, _frames: usize) {}
        fn set_time_ratio(&mut self, _ratio: f64) {}
        fn set_pitch_scale(&mut self, _scale: f64) {}
        fn process(&mut self, _input: &[f32], _frames: usize) {}
        fn available(&self) -> usize { 0 }
        fn retrieve(&mut self, _output: &mut [f32], _frames: usize) -> usize { 0 }
        fn reset(&mut self) {}
    }

    fn ramp_track(frames: usize) -> Arc<Track> {
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            samples.push(i as f32);
            samples.push(-(i as f32));
        }
        Arc::new(Track::new(samples, 44100, 2))
    }

    #[test]
    fn output_follows_playhead_and_interleaves() {
        let mut t = Transport::with_scaler(ramp_track(4096), Box::new(Passthrough::new(2)));
        t.seek(100);
        let mut out = vec![0.0; 64 * 2];
        assert_eq!(t.get_output(&mut out, 64), 64);
        assert_eq!(&out[..4], &[100.0, -100.0, 101.0, -101.0]);
        assert_eq!(t.position(), 100 + MAX_PROCESS_SIZE as u64);
    }

    #[test]
    fn zero_padding_past_end() {
        let mut t = Transport::with_scaler(ramp_track(600), Box::new(Passthrough::new(2)));
        t.seek(590);
        let mut out = vec![9.0; 32 * 2];
        t.get_output(&mut out, 32);
        assert_eq!(out[18], 599.0);
        assert!(out[20..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn seek_resets_scaler() {
        let mut t = Transport::with_scaler(ramp_track(4096), Box::new(Passthrough::new(2)));
        let mut out = vec![0.0; 16 * 2];
        t.get_output(&mut out, 16);
        t.seek(2000);
        t.get_output(&mut out, 16);
        // stale audio from before the seek never shows up
        assert_eq!(out[0], 2000.0);
    }

    #[test]
    fn speed_and_pitch_mapping() {
        let mut t = Transport::new(ramp_track(16));
        t.set_speed(0.5);
        assert_eq!(t.speed(), 0.5);
        t.set_speed(0.0);
        assert_eq!(t.speed(), MIN_SPEED_RATIO);
        t.set_pitch(12.0);
        assert_eq!(t.pitch(), 12.0);
    }

    #[test]
    fn short_retrieve_is_zero_filled() {
        let mut t = Transport::with_scaler(ramp_track(1024), Box::new(Starved));
        let mut out = vec![7.0; 128 * 2];
        let got = t.get_output(&mut out, 128);
        assert_eq!(got, 0);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn large_requests_are_chunked() {
        let mut t = Transport::with_scaler(ramp_track(20_000), Box::new(Passthrough::new(2)));
        let frames = MAX_OUTPUT_CHUNK + 100;
        let mut out = vec![0.0; frames * 2];
        assert_eq!(t.get_output(&mut out, frames), frames);
        assert_eq!(out[(frames - 1) * 2], (frames - 1) as f32);
    }
}
