// The control side of the player. Owns everything the audio thread doesn't:
// the mark store, the selection, per-track settings, the pitch contour and
// the session file. Turns semantic InputEvents into AudioCommands and builds
// the DisplayState the TUI draws.
//
// The playhead itself lives on the audio thread; we only ever read it back
// through the Readback atomics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::analysis::{is_voiced, PitchContour, PitchContourBuilder, YinEstimator};
use crate::audio::Transport;
use crate::audio_api::{AudioCommand, Readback};
use crate::error::Result;
use crate::loader;
use crate::pipeline::persistence;
use crate::pipeline::{
    MarkId, MarkRecord, MarkStore, Selection, SessionState, Settings, Track, TrackMetadata,
};
use crate::shared::{
    format_time, DisplayState, InputEvent, MarkRow, PlayMode, DEFAULT_FRAMES_PER_COLUMN,
    PLAYBACK_DELAY_RANGE, SPEED_PERCENT_RANGE, TRANSPOSE_RANGE, TUNING_CENTS_RANGE, ZOOM_RANGE,
};

const NO_TRACK: &str = "no track loaded";

struct LoadedTrack {
    path: PathBuf,
    track: Arc<Track>,
    contour: PitchContour,
}

pub struct Middle {
    marks: MarkStore,
    selection: Selection,
    settings: Settings,
    defaults: Settings, // used for tracks with no saved session
    metadata: TrackMetadata, // decoded tags with the user's edits on top
    loaded: Option<LoadedTrack>,
    readback: Arc<Readback>,
    session_dir: PathBuf,
    notice: Option<String>,
    resume_after_scrub: bool,
}

impl Middle {
    pub fn new(readback: Arc<Readback>, session_dir: PathBuf, defaults: Settings) -> Self {
        let defaults = defaults.sanitized();
        Self {
            marks: MarkStore::new(),
            selection: Selection::default(),
            settings: defaults.clone(),
            defaults,
            metadata: TrackMetadata::default(),
            loaded: None,
            readback,
            session_dir,
            notice: None,
            resume_after_scrub: false,
        }
    }

    pub fn marks(&self) -> &MarkStore {
        &self.marks
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn track(&self) -> Option<&Arc<Track>> {
        self.loaded.as_ref().map(|l| &l.track)
    }

    pub fn contour(&self) -> Option<&PitchContour> {
        self.loaded.as_ref().map(|l| &l.contour)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn set_notice(&mut self, msg: impl Into<String>) {
        self.notice = Some(msg.into());
    }

    /// Decode `path` and make it the current track.
    ///
    /// Decoding happens before anything is touched, so a failure leaves the
    /// current track, its marks and its session exactly as they were.
    pub fn load_track(&mut self, path: &Path, sample_rate: u32) -> Result<Vec<AudioCommand>> {
        let track = loader::load_track(path, sample_rate)?;
        Ok(self.open_track(path, track))
    }

    /// Install an already decoded track: save the outgoing session, build the
    /// contour, restore this track's session and hand the engine a fresh
    /// transport.
    pub fn open_track(&mut self, path: &Path, track: Track) -> Vec<AudioCommand> {
        if let Err(e) = self.save_session() {
            tracing::warn!("could not save session before switching tracks: {e}");
        }

        let mut builder = PitchContourBuilder::new(Box::new(YinEstimator::new(track.sample_rate())));
        let contour = builder.build(&track);
        tracing::info!(
            hops = contour.len(),
            held = builder.spurious_filter().total_held(),
            "built pitch contour"
        );

        let track = Arc::new(track);
        let transport = Transport::new(Arc::clone(&track));

        let session = persistence::load_session(&self.session_dir, path).unwrap_or_else(|| SessionState {
            settings: self.defaults.clone(),
            ..SessionState::default()
        });
        self.apply_session(&session, track.frames());
        self.metadata = session.metadata.unwrap_or_else(|| track.metadata.clone());

        if !self.metadata.title.is_empty() {
            self.notice = Some(format!("loaded {}", self.metadata.title));
        }
        self.loaded = Some(LoadedTrack {
            path: path.to_path_buf(),
            track,
            contour,
        });

        vec![
            AudioCommand::Pause,
            AudioCommand::LoadTrack(Box::new(transport)),
            AudioCommand::SetSpeed(self.settings.speed_ratio()),
            AudioCommand::SetPitch(self.settings.pitch_semitones()),
            AudioCommand::SetPlaybackDelay(self.settings.playback_delay),
            AudioCommand::SetPlayMode(self.settings.play_mode),
            AudioCommand::SetSelection(self.selection),
        ]
    }

    fn apply_session(&mut self, session: &SessionState, frames: u64) {
        // marks past the end of this track are dropped, the rest keep their labels
        let in_range: Vec<MarkRecord> = session
            .marks
            .iter()
            .filter(|r| r.position < frames)
            .cloned()
            .collect();
        if in_range.len() != session.marks.len() {
            tracing::warn!(
                dropped = session.marks.len() - in_range.len(),
                "session marks beyond end of track"
            );
        }
        self.marks = MarkStore::from_records(&in_range);
        let sel = session.selection.clamped_to(frames);
        self.selection = Selection::from_bounds(sel.start(), sel.end());
        self.settings = session.settings.clone().sanitized();
        self.resume_after_scrub = false;
    }

    pub fn save_session(&self) -> Result<()> {
        let Some(loaded) = self.loaded.as_ref() else {
            return Ok(());
        };
        let mut state = SessionState::capture(self.selection, &self.marks, &self.settings);
        if self.metadata != loaded.track.metadata {
            state.metadata = Some(self.metadata.clone());
        }
        persistence::save_session(&self.session_dir, &loaded.path, &state)
    }

    // Playhead as last published by the engine, kept inside the track
    fn playhead(&self) -> u64 {
        let pos = self.readback.position();
        match self.track() {
            Some(t) => pos.min(t.last_frame()),
            None => 0,
        }
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Vec<AudioCommand> {
        self.notice = None;
        match event {
            InputEvent::Quit => vec![],

            // settings work with or without a track
            InputEvent::CyclePlayMode => self.set_play_mode(self.settings.play_mode.next()),
            InputEvent::SetPlayMode(mode) => self.set_play_mode(mode),
            InputEvent::AdjustSpeed(delta) => {
                self.settings.speed_percent = (self.settings.speed_percent + delta)
                    .clamp(SPEED_PERCENT_RANGE.0, SPEED_PERCENT_RANGE.1);
                vec![AudioCommand::SetSpeed(self.settings.speed_ratio())]
            }
            InputEvent::AdjustTranspose(delta) => {
                self.settings.transpose =
                    (self.settings.transpose + delta).clamp(TRANSPOSE_RANGE.0, TRANSPOSE_RANGE.1);
                vec![AudioCommand::SetPitch(self.settings.pitch_semitones())]
            }
            InputEvent::AdjustTuning(delta) => {
                self.settings.tuning_cents = (self.settings.tuning_cents + delta)
                    .clamp(TUNING_CENTS_RANGE.0, TUNING_CENTS_RANGE.1);
                vec![AudioCommand::SetPitch(self.settings.pitch_semitones())]
            }
            InputEvent::AdjustPlaybackDelay(delta) => {
                let d = (self.settings.playback_delay + delta)
                    .clamp(PLAYBACK_DELAY_RANGE.0, PLAYBACK_DELAY_RANGE.1);
                self.settings.playback_delay = (d * 10.0).round() / 10.0; // 0.1 s steps
                vec![AudioCommand::SetPlaybackDelay(self.settings.playback_delay)]
            }
            InputEvent::AdjustZoom(delta) => {
                self.settings.zoom = (self.settings.zoom + delta).clamp(ZOOM_RANGE.0, ZOOM_RANGE.1);
                vec![]
            }
            InputEvent::SetPitchRange(lo, hi) => {
                if lo.is_finite() && hi.is_finite() && lo < hi {
                    self.settings.pitch_range_min = lo;
                    self.settings.pitch_range_max = hi;
                } else {
                    self.notice = Some("pitch range must be low < high".into());
                }
                vec![]
            }

            event if self.loaded.is_none() => {
                tracing::debug!(?event, "ignored, no track loaded");
                self.notice = Some(NO_TRACK.into());
                vec![]
            }

            InputEvent::TogglePlay => vec![AudioCommand::TogglePlay],
            InputEvent::Play => vec![AudioCommand::Play],
            InputEvent::Pause => vec![AudioCommand::Pause],
            InputEvent::SeekTo(position) => self.seek(position),
            InputEvent::SeekBy(seconds) => {
                let delta = self.track().map_or(0, |t| t.seconds_to_frames(seconds));
                self.seek(self.playhead() as i64 + delta)
            }
            InputEvent::SeekToStart => self.seek(0),
            InputEvent::SeekToEnd => {
                let last = self.track().map_or(0, |t| t.last_frame());
                self.seek(last as i64)
            }
            InputEvent::NextMark => self.seek_to_next_mark(false),
            InputEvent::PrevMark => self.seek_to_next_mark(true),
            InputEvent::ScrubStart => {
                self.resume_after_scrub = self.readback.play_state().is_playing();
                vec![AudioCommand::Pause]
            }
            InputEvent::ScrubEnd(position) => {
                let mut cmds = self.seek(position);
                if std::mem::take(&mut self.resume_after_scrub) {
                    cmds.push(AudioCommand::Play); // back through pre-roll
                }
                cmds
            }

            InputEvent::AddMarkAtPlayhead => {
                let pos = self.playhead();
                self.add_mark(pos, String::new());
                vec![]
            }
            InputEvent::AddMark { position, label } => {
                let pos = self.clamp(position);
                self.add_mark(pos, label);
                vec![]
            }
            InputEvent::DeleteMark(id) => {
                if self.marks.delete(id).is_none() {
                    self.notice = Some("no such mark".into());
                }
                vec![]
            }
            InputEvent::MoveMark { id, position } => {
                let pos = self.clamp(position);
                self.move_mark(id, pos);
                vec![]
            }
            InputEvent::NudgeMark { id, seconds } => {
                if let Some(mark) = self.marks.get(id) {
                    let delta = self.track().map_or(0, |t| t.seconds_to_frames(seconds));
                    let pos = self.clamp(mark.position as i64 + delta);
                    self.move_mark(id, pos);
                }
                vec![]
            }
            InputEvent::RelabelMark { id, label } => {
                if let Err(e) = self.marks.relabel(id, label) {
                    self.notice = Some(e.to_string());
                }
                vec![]
            }
            InputEvent::JumpToMark(id) => match self.marks.get(id) {
                Some(mark) => vec![AudioCommand::Seek(mark.position as i64)],
                None => vec![],
            },

            InputEvent::SelectionStartAtPlayhead => {
                let pos = self.playhead();
                self.selection.set_start(pos);
                vec![AudioCommand::SetSelection(self.selection)]
            }
            InputEvent::SelectionEndAtPlayhead => {
                let pos = self.playhead();
                self.selection.set_end(pos);
                vec![AudioCommand::SetSelection(self.selection)]
            }
            InputEvent::SelectionStartAtMark(id) => match self.marks.get(id) {
                Some(mark) => {
                    self.selection.set_start(mark.position);
                    vec![AudioCommand::SetSelection(self.selection)]
                }
                None => vec![],
            },
            InputEvent::SelectionEndAtMark(id) => match self.marks.get(id) {
                Some(mark) => {
                    self.selection.set_end(mark.position);
                    vec![AudioCommand::SetSelection(self.selection)]
                }
                None => vec![],
            },
            InputEvent::ClearSelection => {
                self.selection.clear();
                vec![AudioCommand::SetSelection(self.selection)]
            }

            InputEvent::SetMetadata { field, value } => {
                self.metadata.set(field, value.trim().to_string());
                vec![]
            }
        }
    }

    fn set_play_mode(&mut self, mode: PlayMode) -> Vec<AudioCommand> {
        self.settings.play_mode = mode;
        vec![AudioCommand::SetPlayMode(mode)]
    }

    fn clamp(&self, position: i64) -> u64 {
        self.track().map_or(0, |t| t.clamp_frame(position))
    }

    fn seek(&self, position: i64) -> Vec<AudioCommand> {
        vec![AudioCommand::Seek(self.clamp(position) as i64)]
    }

    // Backward lands on the last mark strictly before the playhead (or the
    // start), forward on the first mark strictly after it (or the last frame).
    fn seek_to_next_mark(&self, backward: bool) -> Vec<AudioCommand> {
        let Some(track) = self.track() else {
            return vec![];
        };
        let playhead = self.playhead();
        let target = if backward {
            self.marks.nearest_strictly_before(playhead).map_or(0, |m| m.position)
        } else {
            self.marks
                .nearest_strictly_after(playhead)
                .map_or(track.last_frame(), |m| m.position)
        };
        vec![AudioCommand::Seek(target as i64)]
    }

    fn add_mark(&mut self, position: u64, label: String) -> Option<MarkId> {
        match self.marks.insert(position, label) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!("mark insert rejected: {e}");
                self.notice = Some(e.to_string());
                None
            }
        }
    }

    fn move_mark(&mut self, id: MarkId, position: u64) {
        if let Err(e) = self.marks.reposition(id, position) {
            tracing::debug!("mark move rejected: {e}");
            self.notice = Some(e.to_string());
        }
    }

    /// Snapshot for the TUI. `columns` is how wide the pitch overlay is.
    pub fn display_state(&self, columns: usize) -> DisplayState {
        let s = &self.settings;
        let mut ds = DisplayState {
            play_mode: s.play_mode,
            speed_percent: s.speed_percent,
            transpose: s.transpose,
            tuning_cents: s.tuning_cents,
            playback_delay: s.playback_delay,
            zoom: s.zoom,
            pitch_range: (s.pitch_range_min, s.pitch_range_max),
            notice: self.notice.clone(),
            ..DisplayState::default()
        };
        let Some(loaded) = self.loaded.as_ref() else {
            ds.position_text = format_time(0, 1);
            ds.selection_text = "none".into();
            return ds;
        };

        let track = &loaded.track;
        let rate = track.sample_rate();
        let position = self.playhead();
        ds.loaded = true;
        ds.metadata = self.metadata.clone();
        ds.play_state = self.readback.play_state();
        ds.position = position;
        ds.total_frames = track.frames();
        ds.position_text = format!("{} / {}", format_time(position, rate), format_time(track.frames(), rate));
        ds.selection = self.selection.bounds();
        ds.selection_text = match (self.selection.start(), self.selection.end()) {
            (Some(a), Some(b)) => format!("{} - {}", format_time(a, rate), format_time(b, rate)),
            (Some(a), None) => format!("{} - ?", format_time(a, rate)),
            (None, Some(b)) => format!("? - {}", format_time(b, rate)),
            (None, None) => "none".into(),
        };
        ds.contour_window = self
            .contour()
            .map(|c| self.contour_window(c, position, columns))
            .unwrap_or_default();
        ds.marks = self
            .marks
            .iter()
            .map(|m| MarkRow {
                id: m.id,
                position: m.position,
                time: format_time(m.position, rate),
                label: m.label.clone(),
                selection_start: self.selection.start() == Some(m.position),
                selection_end: self.selection.end() == Some(m.position),
            })
            .collect();
        ds
    }

    // One bar per column centred on the playhead: 0 for unvoiced or out of
    // range, otherwise semitones above the bottom of the pitch range plus one.
    fn contour_window(&self, contour: &PitchContour, playhead: u64, columns: usize) -> Vec<u64> {
        let (lo, hi) = (self.settings.pitch_range_min, self.settings.pitch_range_max);
        let per_col = (DEFAULT_FRAMES_PER_COLUMN / self.settings.zoom).max(1.0) as i64;
        let first = playhead as i64 - (columns as i64 / 2) * per_col;
        (0..columns as i64)
            .map(|c| {
                let frame = first + c * per_col;
                if frame < 0 {
                    return 0;
                }
                match contour.at_frame(frame as u64) {
                    Some(p) if is_voiced(p) && p >= lo && p <= hi => (p - lo).round() as u64 + 1,
                    _ => 0,
                }
            })
            .collect()
    }
}
