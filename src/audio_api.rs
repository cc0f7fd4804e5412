// The boundary between the control thread and the audio callback.
//
// The engine can't decode files, build contours or allocate (that would
// interrupt the audio thread), so the control side prepares everything it
// needs (a fully built Transport for a new track, a whole Selection, ...)
// and sends it over as one command. The engine applies commands between
// blocks, so a seek or a load never lands in the middle of a render.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::audio::Transport;
use crate::pipeline::Selection;
use crate::shared::PlayMode;

#[derive(Debug)]
pub enum AudioCommand {
    // Replace the current track. The previous transport is sent back to the
    // control side to be dropped there.
    LoadTrack(Box<Transport>),

    Play,
    Pause,
    TogglePlay,
    Seek(i64), // clamped to [0, frames) by the engine

    SetSpeed(f64),         // ratio, 1.0 = recorded tempo
    SetPitch(f64),         // semitones
    SetPlaybackDelay(f32), // seconds
    SetPlayMode(PlayMode),
    SetSelection(Selection), // both bounds move together
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    #[default]
    Stopped,
    PlayingWithPreroll,
    Playing,
}

impl PlayState {
    pub fn is_playing(self) -> bool {
        !matches!(self, PlayState::Stopped)
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayState::Stopped => "stopped",
            PlayState::PlayingWithPreroll => "pre-roll",
            PlayState::Playing => "playing",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            PlayState::Stopped => 0,
            PlayState::PlayingWithPreroll => 1,
            PlayState::Playing => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlayState::PlayingWithPreroll,
            2 => PlayState::Playing,
            _ => PlayState::Stopped,
        }
    }
}

// Engine → UI readback. Written once per block by the audio thread, read by
// the UI whenever it likes; plain atomics so neither side ever waits.
#[derive(Debug, Default)]
pub struct Readback {
    position: AtomicU64,
    state: AtomicU8,
    loaded: AtomicBool,
    // old transports the engine had to free itself because the retire
    // channel was full
    retire_overflows: AtomicU64,
}

impl Readback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn retire_overflows(&self) -> u64 {
        self.retire_overflows.load(Ordering::Relaxed)
    }

    pub(crate) fn note_retire_overflow(&self) {
        self.retire_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn publish(&self, position: u64, state: PlayState, loaded: bool) {
        self.position.store(position, Ordering::Release);
        self.state.store(state.to_u8(), Ordering::Release);
        self.loaded.store(loaded, Ordering::Release);
    }
}
