// Things both sides of the app agree on: constants, the play mode, the
// semantic input events the TUI resolves keys into, and the DisplayState the
// TUI draws every frame.
//
// The rendering process mirrors a "dumb view": each frame the TUI asks the
// middle layer for a DisplayState and draws it. It never touches the mark
// store, the session or the engine directly.

use serde::{Deserialize, Serialize};

use crate::audio_api::PlayState;
use crate::pipeline::{MarkId, MetadataField, TrackMetadata};

// Frames fed to the time scaler per process() call
pub const MAX_PROCESS_SIZE: usize = 512;
pub const MIN_SPEED_RATIO: f64 = 0.01;

// Pitch analysis: one estimate every HOP_SIZE frames over a WINDOW_SIZE window
pub const HOP_SIZE: usize = 512;
pub const WINDOW_SIZE: usize = 2048;

// Practice control ranges
pub const SPEED_PERCENT_RANGE: (i32, i32) = (10, 100);
pub const TRANSPOSE_RANGE: (i32, i32) = (-12, 12);
pub const TUNING_CENTS_RANGE: (i32, i32) = (-50, 50);
pub const PLAYBACK_DELAY_RANGE: (f32, f32) = (0.0, 2.0);
pub const ZOOM_RANGE: (f32, f32) = (0.25, 4.0);
pub const PITCH_RANGE_MIN: f32 = 55.0; // G below middle C
pub const PITCH_RANGE_MAX: f32 = 86.0; // high D

// Frames of audio per terminal column at zoom 1.0
pub const DEFAULT_FRAMES_PER_COLUMN: f32 = 2048.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    PlaySelection,
    LoopSelection,
    PlayToEnd,
}

impl PlayMode {
    pub fn next(self) -> Self {
        match self {
            PlayMode::PlaySelection => PlayMode::LoopSelection,
            PlayMode::LoopSelection => PlayMode::PlayToEnd,
            PlayMode::PlayToEnd => PlayMode::PlaySelection,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayMode::PlaySelection => "Play Selection",
            PlayMode::LoopSelection => "Loop Selection",
            PlayMode::PlayToEnd => "Play to End",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    // transport
    TogglePlay,
    Play,
    Pause,
    SeekTo(i64),      // absolute frame, clamped later
    SeekBy(f64),      // seconds relative to the playhead
    SeekToStart,
    SeekToEnd,
    NextMark,
    PrevMark,

    // drag-seek: pause while scrubbing, seek + resume on release
    ScrubStart,
    ScrubEnd(i64),

    // marks
    AddMarkAtPlayhead,
    AddMark { position: i64, label: String },
    DeleteMark(MarkId),
    MoveMark { id: MarkId, position: i64 },
    NudgeMark { id: MarkId, seconds: f64 },
    RelabelMark { id: MarkId, label: String },
    JumpToMark(MarkId),

    // selection
    SelectionStartAtPlayhead,
    SelectionEndAtPlayhead,
    SelectionStartAtMark(MarkId),
    SelectionEndAtMark(MarkId),
    ClearSelection,

    // settings
    CyclePlayMode,
    SetPlayMode(PlayMode),
    AdjustSpeed(i32),      // percent
    AdjustTranspose(i32),  // semitones
    AdjustTuning(i32),     // cents
    AdjustPlaybackDelay(f32),
    AdjustZoom(f32),
    SetPitchRange(f32, f32),

    // header tags
    SetMetadata { field: MetadataField, value: String },

    Quit,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkRow {
    pub id: MarkId,
    pub position: u64,
    pub time: String,
    pub label: String,
    pub selection_start: bool,
    pub selection_end: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DisplayState {
    pub loaded: bool,
    pub metadata: TrackMetadata,
    pub play_state: PlayState,
    pub play_mode: PlayMode,
    pub position: u64,
    pub total_frames: u64,
    pub position_text: String, // "m:ss.cc / m:ss.cc"
    pub selection: Option<(u64, u64)>,
    pub selection_text: String,
    pub speed_percent: i32,
    pub transpose: i32,
    pub tuning_cents: i32,
    pub playback_delay: f32,
    pub zoom: f32,
    pub pitch_range: (f32, f32),
    pub contour_window: Vec<u64>, // sparkline heights above pitch_range.0, 0 = unvoiced
    pub marks: Vec<MarkRow>,
    pub notice: Option<String>,
}

// m:ss.cc, the way the transport line shows times
pub fn format_time(frame: u64, sample_rate: u32) -> String {
    let rate = sample_rate.max(1) as u64;
    let total_centis = frame * 100 / rate;
    let minutes = total_centis / 6000;
    let seconds = (total_centis / 100) % 60;
    let centis = total_centis % 100;
    format!("{minutes}:{seconds:02}.{centis:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_time_minutes_seconds_centis() {
        assert_eq!(format_time(0, 44100), "0:00.00");
        assert_eq!(format_time(44100 * 61 + 22050, 44100), "1:01.50");
        assert_eq!(format_time(48000 * 600, 48000), "10:00.00");
    }

    #[test]
    fn play_mode_cycles() {
        let m = PlayMode::default();
        assert_eq!(m, PlayMode::PlaySelection);
        assert_eq!(m.next().next().next(), m);
    }
}
