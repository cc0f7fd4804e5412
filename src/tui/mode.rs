use crate::pipeline::{MarkId, MetadataField, TrackMetadata};
use crate::shared::DisplayState;

// state local to tui: the mark cursor, label and tag editing, scrubbing.
// marks, playing and the transport position are synced from DisplayState per loop
#[derive(Clone, Debug, Default)]
pub struct TuiState {
    pub cursor: usize,         // row in the marks table
    pub mark_ids: Vec<MarkId>, // synced, in table order
    pub playing: bool,         // synced
    pub position: u64,         // synced
    pub total_frames: u64,     // synced
    pub pitch_range: (f32, f32), // synced
    pub metadata: TrackMetadata, // synced
    // label being typed for a mark; keys go here instead of the keymap
    pub editing: Option<(MarkId, String)>,
    // header tag being typed, Tab moves to the next one
    pub tag_edit: Option<(MetadataField, String)>,
    // scrub target while the playhead is being dragged
    pub scrub: Option<i64>,
}

impl TuiState {
    pub fn sync(&mut self, ds: &DisplayState) {
        self.mark_ids = ds.marks.iter().map(|m| m.id).collect();
        self.cursor = self.cursor.min(self.mark_ids.len().saturating_sub(1));
        self.playing = ds.play_state.is_playing();
        self.position = ds.position;
        self.total_frames = ds.total_frames;
        self.pitch_range = ds.pitch_range;
        self.metadata.clone_from(&ds.metadata);
    }

    pub fn selected_mark(&self) -> Option<MarkId> {
        self.mark_ids.get(self.cursor).copied()
    }
}
