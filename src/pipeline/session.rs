// What gets written to disk per track. Everything has a default so older or
// hand-edited files with missing fields still load.

use serde::{Deserialize, Serialize};

use super::marks::{MarkRecord, MarkStore};
use super::selection::Selection;
use super::track::TrackMetadata;
use crate::shared::{
    PlayMode, PITCH_RANGE_MAX, PITCH_RANGE_MIN, PLAYBACK_DELAY_RANGE, SPEED_PERCENT_RANGE,
    TRANSPOSE_RANGE, TUNING_CENTS_RANGE, ZOOM_RANGE,
};

// Practice settings the user dials in per track
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub speed_percent: i32,
    pub transpose: i32,    // semitones
    pub tuning_cents: i32,
    pub zoom: f32,
    pub playback_delay: f32, // seconds of silence before playback starts
    pub play_mode: PlayMode,
    pub pitch_range_min: f32,
    pub pitch_range_max: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed_percent: 100,
            transpose: 0,
            tuning_cents: 0,
            zoom: 1.0,
            playback_delay: 0.0,
            play_mode: PlayMode::default(),
            pitch_range_min: PITCH_RANGE_MIN,
            pitch_range_max: PITCH_RANGE_MAX,
        }
    }
}

impl Settings {
    // Pull every field back into its legal range. Used after loading a file.
    pub fn sanitized(mut self) -> Self {
        let d = Settings::default();
        self.speed_percent = self.speed_percent.clamp(SPEED_PERCENT_RANGE.0, SPEED_PERCENT_RANGE.1);
        self.transpose = self.transpose.clamp(TRANSPOSE_RANGE.0, TRANSPOSE_RANGE.1);
        self.tuning_cents = self.tuning_cents.clamp(TUNING_CENTS_RANGE.0, TUNING_CENTS_RANGE.1);
        self.zoom = finite_or(self.zoom, d.zoom).clamp(ZOOM_RANGE.0, ZOOM_RANGE.1);
        self.playback_delay = finite_or(self.playback_delay, d.playback_delay)
            .clamp(PLAYBACK_DELAY_RANGE.0, PLAYBACK_DELAY_RANGE.1);
        let lo = finite_or(self.pitch_range_min, d.pitch_range_min);
        let hi = finite_or(self.pitch_range_max, d.pitch_range_max);
        if lo < hi {
            self.pitch_range_min = lo;
            self.pitch_range_max = hi;
        } else {
            self.pitch_range_min = d.pitch_range_min;
            self.pitch_range_max = d.pitch_range_max;
        }
        self
    }

    pub fn speed_ratio(&self) -> f64 {
        self.speed_percent as f64 / 100.0
    }

    // transpose + fine tuning, the value handed to the transport
    pub fn pitch_semitones(&self) -> f64 {
        self.transpose as f64 + self.tuning_cents as f64 / 100.0
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub selection: Selection,
    pub marks: Vec<MarkRecord>, // ascending by position
    pub settings: Settings,
    // only written once the user has edited a tag; replaces what the decoder found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TrackMetadata>,
}

impl SessionState {
    pub fn capture(selection: Selection, marks: &MarkStore, settings: &Settings) -> Self {
        Self {
            selection,
            marks: marks.to_records(),
            settings: settings.clone(),
            metadata: None,
        }
    }
}
