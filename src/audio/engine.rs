// The render side of playback: play/pause state, pre-roll, selection and
// end-of-track handling, and the per-block render itself.
//
// Everything in here runs on the audio thread. No allocation, no locks, no
// logging past construction; every buffer is sized up front.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::audio_api::{AudioCommand, PlayState, Readback};
use crate::pipeline::Selection;
use crate::shared::PlayMode;

use super::transport::Transport;

pub const MAX_TRACK_CHANNELS: usize = 8;
const SCRATCH_FRAMES: usize = 4096;

pub struct Engine {
    out_channels: usize,
    transport: Option<Box<Transport>>,
    state: PlayState,
    play_mode: PlayMode,
    selection: Selection,
    playback_delay: f32, // seconds
    speed: f64,
    pitch: f64,
    silent_frames: u64, // pre-roll frames output since the last (re)start
    scratch: Vec<f32>,  // track-interleaved audio before channel mapping
    readback: Arc<Readback>,
    retired_tx: Option<Sender<Box<Transport>>>,
}

impl Engine {
    pub fn new(out_channels: usize, readback: Arc<Readback>) -> Self {
        Self {
            out_channels: out_channels.max(1),
            transport: None,
            state: PlayState::Stopped,
            play_mode: PlayMode::default(),
            selection: Selection::default(),
            playback_delay: 0.0,
            speed: 1.0,
            pitch: 0.0,
            silent_frames: 0,
            scratch: vec![0.0; SCRATCH_FRAMES * MAX_TRACK_CHANNELS],
            readback,
            retired_tx: None,
        }
    }

    // Where replaced transports go so they get freed off the audio thread
    pub fn set_retired_tx(&mut self, tx: Sender<Box<Transport>>) {
        self.retired_tx = Some(tx);
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn position(&self) -> u64 {
        self.transport.as_ref().map_or(0, |t| t.position())
    }

    pub fn is_loaded(&self) -> bool {
        self.transport.is_some()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::LoadTrack(mut transport) => {
                transport.set_speed(self.speed);
                transport.set_pitch(self.pitch);
                let old = self.transport.replace(transport);
                self.retire(old);
                self.state = PlayState::Stopped;
                self.selection = Selection::default();
                self.silent_frames = 0;
            }
            AudioCommand::Play => self.play(),
            AudioCommand::Pause => self.state = PlayState::Stopped,
            AudioCommand::TogglePlay => {
                if self.state.is_playing() {
                    self.state = PlayState::Stopped;
                } else {
                    self.play();
                }
            }
            AudioCommand::Seek(position) => self.seek(position),
            AudioCommand::SetSpeed(ratio) => {
                self.speed = ratio;
                if let Some(t) = self.transport.as_mut() {
                    t.set_speed(ratio);
                }
            }
            AudioCommand::SetPitch(semitones) => {
                self.pitch = semitones;
                if let Some(t) = self.transport.as_mut() {
                    t.set_pitch(semitones);
                }
            }
            AudioCommand::SetPlaybackDelay(seconds) => {
                self.playback_delay = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
            }
            AudioCommand::SetPlayMode(mode) => self.play_mode = mode,
            AudioCommand::SetSelection(selection) => self.selection = selection,
        }
        self.publish();
    }

    fn play(&mut self) {
        if self.transport.is_none() || self.state.is_playing() {
            return;
        }
        self.silent_frames = 0;
        self.state = PlayState::PlayingWithPreroll;
    }

    fn seek(&mut self, position: i64) {
        if let Some(t) = self.transport.as_mut() {
            let clamped = t.track().clamp_frame(position);
            t.seek(clamped);
        }
    }

    fn retire(&mut self, old: Option<Box<Transport>>) {
        if let (Some(old), Some(tx)) = (old, self.retired_tx.as_ref()) {
            // a full channel means the old transport gets dropped here after
            // all; count it so the control side can report it
            if tx.try_send(old).is_err() {
                self.readback.note_retire_overflow();
            }
        }
    }

    fn preroll_frames(&self, sample_rate: u32) -> u64 {
        (self.playback_delay as f64 * sample_rate as f64) as u64
    }

    fn publish(&self) {
        self.readback.publish(self.position(), self.state, self.is_loaded());
    }

    /// Render one callback's worth of interleaved output.
    pub fn render_block(&mut self, out: &mut [f32]) {
        let oc = self.out_channels;
        let frames = out.len() / oc;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(SCRATCH_FRAMES);
            self.render_chunk(&mut out[done * oc..(done + n) * oc], n);
            done += n;
        }
        // odd trailing samples that don't make a frame
        out[frames * oc..].fill(0.0);
        self.publish();
    }

    fn render_chunk(&mut self, out: &mut [f32], frames: usize) {
        let Some(sample_rate) = self.transport.as_ref().map(|t| t.track().sample_rate()) else {
            out.fill(0.0);
            return;
        };

        if self.state == PlayState::PlayingWithPreroll {
            let needed = self.preroll_frames(sample_rate);
            if self.silent_frames < needed {
                out.fill(0.0);
                self.silent_frames += frames as u64;
                if self.silent_frames >= needed {
                    self.state = PlayState::Playing;
                }
                return;
            }
            self.state = PlayState::Playing;
        }

        if self.state != PlayState::Playing {
            out.fill(0.0);
            return;
        }

        let Some(transport) = self.transport.as_mut() else {
            out.fill(0.0);
            return;
        };
        let tc = transport.channels().min(MAX_TRACK_CHANNELS);
        let scratch = &mut self.scratch[..frames * tc];
        transport.get_output(scratch, frames);
        map_channels(scratch, tc, out, self.out_channels);

        self.check_boundaries();
    }

    // Runs after every rendered block. End-of-track wins over the selection.
    fn check_boundaries(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let position = transport.position();
        let (frames, last_frame) = (transport.track().frames(), transport.track().last_frame());

        if position >= frames {
            transport.seek(last_frame);
            self.state = PlayState::Stopped;
            return;
        }

        let Some((start, end)) = self.selection.bounds() else {
            return;
        };
        if position <= end {
            return;
        }
        match self.play_mode {
            PlayMode::LoopSelection => {
                transport.seek(start);
                self.silent_frames = 0;
                self.state = PlayState::PlayingWithPreroll;
            }
            PlayMode::PlaySelection => {
                transport.seek(start);
                self.state = PlayState::Stopped;
            }
            PlayMode::PlayToEnd => {}
        }
    }
}

// Copy track-layout frames into device-layout frames. Extra device channels
// repeat the last track channel; a mono device gets the average.
fn map_channels(src: &[f32], src_ch: usize, dst: &mut [f32], dst_ch: usize) {
    let frames = (src.len() / src_ch).min(dst.len() / dst_ch);
    for f in 0..frames {
        let frame = &src[f * src_ch..(f + 1) * src_ch];
        let out = &mut dst[f * dst_ch..(f + 1) * dst_ch];
        if dst_ch == 1 && src_ch > 1 {
            out[0] = frame.iter().sum::<f32>() / src_ch as f32;
            continue;
        }
        for (c, o) in out.iter_mut().enumerate() {
            *o = frame[c.min(src_ch - 1)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stretcher::TimeScaler;
    use crate::pipeline::Track;
    use crate::shared::MAX_PROCESS_SIZE;

    // Unity passthrough so positions in tests are exact input frames
    struct Passthrough {
        channels: usize,
        queue: std::collections::VecDeque<f32>,
    }

    impl TimeScaler for Passthrough {
        fn channels(&self) -> usize { self.channels }
        fn set_max_process_size(&mut self, _frames: usize) {}
        fn set_time_ratio(&mut self, _ratio: f64) {}
        fn set_pitch_scale(&mut self, _scale: f64) {}
        fn process(&mut self, input: &[f32], frames: usize) {
            for i in 0..frames {
                for ch in 0..self.channels {
                    self.queue.push_back(input[ch * frames + i]);
                }
            }
        }
        fn available(&self) -> usize { self.queue.len() / self.channels }
        fn retrieve(&mut self, output: &mut [f32], frames: usize) -> usize {
            let n = frames.min(self.available());
            for i in 0..n {
                for ch in 0..self.channels {
                    output[ch * frames + i] = self.queue.pop_front().unwrap_or(0.0);
                }
            }
            n
        }
        fn reset(&mut self) { self.queue.clear(); }
    }

    const RATE: u32 = 8000;
    const BLOCK: usize = MAX_PROCESS_SIZE;

    fn engine_with_track(frames: usize) -> Engine {
        let samples = vec![0.25; frames * 2];
        let track = Arc::new(Track::new(samples, RATE, 2));
        let scaler = Box::new(Passthrough { channels: 2, queue: Default::default() });
        let mut engine = Engine::new(2, Arc::new(Readback::new()));
        engine.handle_cmd(AudioCommand::LoadTrack(Box::new(Transport::with_scaler(track, scaler))));
        engine
    }

    fn render(engine: &mut Engine) -> Vec<f32> {
        let mut out = vec![9.0; BLOCK * 2];
        engine.render_block(&mut out);
        out
    }

    #[test]
    fn seek_is_clamped() {
        let mut e = engine_with_track(10_000);
        e.handle_cmd(AudioCommand::Seek(-50));
        assert_eq!(e.position(), 0);
        e.handle_cmd(AudioCommand::Seek(20_000));
        assert_eq!(e.position(), 9_999);
        e.handle_cmd(AudioCommand::Seek(4_321));
        assert_eq!(e.position(), 4_321);
    }

    #[test]
    fn nothing_happens_without_a_track() {
        let mut e = Engine::new(2, Arc::new(Readback::new()));
        e.handle_cmd(AudioCommand::Play);
        e.handle_cmd(AudioCommand::Seek(100));
        assert_eq!(e.state(), PlayState::Stopped);
        assert_eq!(e.position(), 0);
        assert!(render(&mut e).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_delay_plays_on_first_block() {
        let mut e = engine_with_track(10_000);
        e.handle_cmd(AudioCommand::Play);
        assert_eq!(e.state(), PlayState::PlayingWithPreroll);
        let out = render(&mut e);
        assert_eq!(e.state(), PlayState::Playing);
        assert!(out.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn preroll_outputs_silence_for_the_delay() {
        let mut e = engine_with_track(100_000);
        // 0.128 s at 8 kHz = 1024 frames = two blocks
        e.handle_cmd(AudioCommand::SetPlaybackDelay(0.128));
        e.handle_cmd(AudioCommand::Play);

        assert!(render(&mut e).iter().all(|&v| v == 0.0));
        assert_eq!(e.state(), PlayState::PlayingWithPreroll);
        assert!(render(&mut e).iter().all(|&v| v == 0.0));
        assert_eq!(e.state(), PlayState::Playing);
        assert_eq!(e.position(), 0);
        assert!(render(&mut e).iter().all(|&v| v == 0.25));
    }

    #[test]
    fn loop_selection_jumps_back_and_reenters_preroll() {
        let mut e = engine_with_track(100_000);
        e.handle_cmd(AudioCommand::SetPlayMode(PlayMode::LoopSelection));
        e.handle_cmd(AudioCommand::SetSelection(Selection::new(1000, 5000)));
        e.handle_cmd(AudioCommand::SetPlaybackDelay(0.064)); // one block
        e.handle_cmd(AudioCommand::Seek(4900));
        e.handle_cmd(AudioCommand::Play);

        render(&mut e); // pre-roll
        render(&mut e); // plays 4900.. and crosses 5000
        assert_eq!(e.position(), 1000);
        assert_eq!(e.state(), PlayState::PlayingWithPreroll);

        assert!(render(&mut e).iter().all(|&v| v == 0.0));
        assert_eq!(e.position(), 1000);
        assert!(render(&mut e).iter().all(|&v| v == 0.25));
    }

    #[test]
    fn play_selection_stops_at_selection_start() {
        let mut e = engine_with_track(100_000);
        e.handle_cmd(AudioCommand::SetPlayMode(PlayMode::PlaySelection));
        e.handle_cmd(AudioCommand::SetSelection(Selection::new(1000, 5000)));
        e.handle_cmd(AudioCommand::Seek(4900));
        e.handle_cmd(AudioCommand::Play);
        render(&mut e);
        assert_eq!(e.state(), PlayState::Stopped);
        assert_eq!(e.position(), 1000);
    }

    #[test]
    fn play_to_end_ignores_selection() {
        let mut e = engine_with_track(100_000);
        e.handle_cmd(AudioCommand::SetPlayMode(PlayMode::PlayToEnd));
        e.handle_cmd(AudioCommand::SetSelection(Selection::new(1000, 5000)));
        e.handle_cmd(AudioCommand::Seek(4900));
        e.handle_cmd(AudioCommand::Play);
        render(&mut e);
        assert_eq!(e.state(), PlayState::Playing);
        assert_eq!(e.position(), 4900 + BLOCK as u64);
    }

    #[test]
    fn end_of_track_stops_in_every_mode() {
        for mode in [PlayMode::PlaySelection, PlayMode::LoopSelection, PlayMode::PlayToEnd] {
            let n = 2000;
            let mut e = engine_with_track(n);
            e.handle_cmd(AudioCommand::SetPlayMode(mode));
            e.handle_cmd(AudioCommand::SetSelection(Selection::new(0, (n - 1) as u64)));
            e.handle_cmd(AudioCommand::Play);
            for _ in 0..8 {
                render(&mut e);
            }
            assert_eq!(e.state(), PlayState::Stopped, "{mode:?}");
            assert_eq!(e.position(), (n - 1) as u64, "{mode:?}");
        }
    }

    #[test]
    fn unset_selection_means_no_boundary() {
        let mut e = engine_with_track(100_000);
        e.handle_cmd(AudioCommand::SetPlayMode(PlayMode::LoopSelection));
        let mut half = Selection::default();
        half.set_end(100);
        e.handle_cmd(AudioCommand::SetSelection(half));
        e.handle_cmd(AudioCommand::Play);
        render(&mut e);
        assert_eq!(e.state(), PlayState::Playing);
        assert_eq!(e.position(), BLOCK as u64);
    }

    #[test]
    fn toggle_and_pause() {
        let mut e = engine_with_track(10_000);
        e.handle_cmd(AudioCommand::TogglePlay);
        assert!(e.state().is_playing());
        e.handle_cmd(AudioCommand::TogglePlay);
        assert_eq!(e.state(), PlayState::Stopped);
        e.handle_cmd(AudioCommand::Play);
        e.handle_cmd(AudioCommand::Pause);
        assert_eq!(e.state(), PlayState::Stopped);
    }

    #[test]
    fn loading_a_track_retires_the_old_one() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut e = engine_with_track(10_000);
        e.set_retired_tx(tx);
        e.handle_cmd(AudioCommand::Play);
        let track = Arc::new(Track::new(vec![0.0; 64], RATE, 2));
        e.handle_cmd(AudioCommand::LoadTrack(Box::new(Transport::new(track))));
        assert_eq!(e.state(), PlayState::Stopped);
        assert_eq!(rx.try_recv().map(|t| t.track().frames()).ok(), Some(10_000));
    }

    #[test]
    fn full_retire_channel_is_counted() {
        let rb = Arc::new(Readback::new());
        let mut e = Engine::new(2, Arc::clone(&rb));
        let (tx, rx) = crossbeam_channel::bounded(1);
        e.set_retired_tx(tx);
        for frames in [100, 200, 300] {
            let track = Arc::new(Track::new(vec![0.0; frames * 2], RATE, 2));
            e.handle_cmd(AudioCommand::LoadTrack(Box::new(Transport::new(track))));
        }
        // first replacement fits, the second finds the channel full
        assert_eq!(rx.try_recv().map(|t| t.track().frames()).ok(), Some(100));
        assert_eq!(rb.retire_overflows(), 1);
    }

    #[test]
    fn readback_follows_engine() {
        let rb = Arc::new(Readback::new());
        let mut e = Engine::new(2, Arc::clone(&rb));
        let track = Arc::new(Track::new(vec![0.0; 20_000], RATE, 2));
        e.handle_cmd(AudioCommand::LoadTrack(Box::new(Transport::new(track))));
        e.handle_cmd(AudioCommand::Seek(777));
        assert!(rb.is_loaded());
        assert_eq!(rb.position(), 777);
        e.handle_cmd(AudioCommand::Play);
        assert_eq!(rb.play_state(), PlayState::PlayingWithPreroll);
    }

    #[test]
    fn mono_track_fills_stereo_device() {
        let src = [0.1, 0.2];
        let mut dst = [0.0; 4];
        map_channels(&src, 1, &mut dst, 2);
        assert_eq!(dst, [0.1, 0.1, 0.2, 0.2]);

        let stereo = [0.2, 0.4];
        let mut mono = [0.0; 1];
        map_channels(&stereo, 2, &mut mono, 1);
        assert!((mono[0] - 0.3).abs() < 1e-6);
    }
}
