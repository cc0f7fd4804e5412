// A decoded recording. Immutable once built; shared between the contour
// builder (control side) and the transport (audio side) through an Arc.

use serde::{Deserialize, Serialize};

// Tags shown in the header. The decoder fills what it can, the rest are
// typed in by the user and saved with the session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub rhythm: String,
    pub key: String,
    pub tempo: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Artist,
    Album,
    Rhythm,
    Key,
    Tempo,
}

impl MetadataField {
    pub const ALL: [MetadataField; 6] = [
        MetadataField::Title,
        MetadataField::Artist,
        MetadataField::Album,
        MetadataField::Rhythm,
        MetadataField::Key,
        MetadataField::Tempo,
    ];

    // wraps from Tempo back to Title
    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            MetadataField::Title => "title",
            MetadataField::Artist => "artist",
            MetadataField::Album => "album",
            MetadataField::Rhythm => "rhythm",
            MetadataField::Key => "key",
            MetadataField::Tempo => "tempo",
        }
    }
}

impl TrackMetadata {
    pub fn get(&self, field: MetadataField) -> &str {
        match field {
            MetadataField::Title => &self.title,
            MetadataField::Artist => &self.artist,
            MetadataField::Album => &self.album,
            MetadataField::Rhythm => &self.rhythm,
            MetadataField::Key => &self.key,
            MetadataField::Tempo => &self.tempo,
        }
    }

    pub fn set(&mut self, field: MetadataField, value: String) {
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Artist => &mut self.artist,
            MetadataField::Album => &mut self.album,
            MetadataField::Rhythm => &mut self.rhythm,
            MetadataField::Key => &mut self.key,
            MetadataField::Tempo => &mut self.tempo,
        };
        *slot = value;
    }
}

#[derive(Clone, Debug)]
pub struct Track {
    samples: Vec<f32>, // interleaved by channel
    sample_rate: u32,
    channels: usize,
    pub metadata: TrackMetadata,
}

impl Track {
    /// `channels` and `sample_rate` must be non-zero. A trailing partial
    /// frame is dropped so every frame is complete.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate: sample_rate.max(1),
            channels,
            metadata: TrackMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> u64 {
        (self.samples.len() / self.channels) as u64
    }

    pub fn last_frame(&self) -> u64 {
        self.frames().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    // Clamp an arbitrary (possibly negative) frame index into [0, frames).
    pub fn clamp_frame(&self, position: i64) -> u64 {
        if position <= 0 {
            0
        } else {
            (position as u64).min(self.last_frame())
        }
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> i64 {
        (seconds * self.sample_rate as f64).round() as i64
    }
}
