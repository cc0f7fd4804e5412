use std::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crate::pipeline::MetadataField;
use crate::shared::InputEvent;
use super::mode::TuiState;

const SEEK_STEP_SECONDS: f64 = 2.0;
const NUDGE_SECONDS: f64 = 0.05;
const SPEED_STEP: i32 = 5;
const TUNING_STEP: i32 = 5;
const DELAY_STEP: f32 = 0.1;
const ZOOM_STEP: f32 = 0.25;
const PITCH_RANGE_STEP: f32 = 1.0; // semitones
const SCRUB_STEPS: u64 = 100; // Left/Right while scrubbing move 1% of the track

// poll for input from tui, tracks editing/scrub state in tuistate,
// resolves keys to sequences of input events for the backend to handle
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code, ts));
    }
    Ok(vec![])
}

pub fn handle_key(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    if ts.editing.is_some() {
        return edit_label(code, ts);
    }
    if ts.tag_edit.is_some() {
        return edit_tags(code, ts);
    }
    if ts.scrub.is_some() {
        return scrub(code, ts);
    }

    match code {
        KeyCode::Esc | KeyCode::Char('q') => vec![InputEvent::Quit],
        KeyCode::Char(' ') => vec![InputEvent::TogglePlay],

        // transport
        KeyCode::Left => vec![InputEvent::SeekBy(-SEEK_STEP_SECONDS)],
        KeyCode::Right => vec![InputEvent::SeekBy(SEEK_STEP_SECONDS)],
        KeyCode::Home => vec![InputEvent::SeekToStart],
        KeyCode::End => vec![InputEvent::SeekToEnd],
        KeyCode::Char('[') => vec![InputEvent::PrevMark],
        KeyCode::Char(']') => vec![InputEvent::NextMark],
        KeyCode::Char('g') => {
            ts.scrub = Some(ts.position as i64);
            vec![InputEvent::ScrubStart]
        }

        // marks table
        KeyCode::Up => { ts.cursor = ts.cursor.saturating_sub(1); vec![] }
        KeyCode::Down => {
            if ts.cursor + 1 < ts.mark_ids.len() {
                ts.cursor += 1;
            }
            vec![]
        }
        KeyCode::Char('m') => vec![InputEvent::AddMarkAtPlayhead],
        KeyCode::Enter => on_selected(ts, InputEvent::JumpToMark),
        KeyCode::Char('x') => on_selected(ts, InputEvent::DeleteMark),
        KeyCode::Char('<') => on_selected(ts, |id| InputEvent::NudgeMark { id, seconds: -NUDGE_SECONDS }),
        KeyCode::Char('>') => on_selected(ts, |id| InputEvent::NudgeMark { id, seconds: NUDGE_SECONDS }),
        KeyCode::Char('l') => {
            if let Some(id) = ts.selected_mark() {
                ts.editing = Some((id, String::new()));
            }
            vec![]
        }

        KeyCode::Char('i') => {
            let first = MetadataField::Title;
            ts.tag_edit = Some((first, ts.metadata.get(first).to_string()));
            vec![]
        }

        // selection, lowercase = from the playhead and shifted = from the selected mark
        KeyCode::Char('s') => vec![InputEvent::SelectionStartAtPlayhead],
        KeyCode::Char('e') => vec![InputEvent::SelectionEndAtPlayhead],
        KeyCode::Char('S') => on_selected(ts, InputEvent::SelectionStartAtMark),
        KeyCode::Char('E') => on_selected(ts, InputEvent::SelectionEndAtMark),
        KeyCode::Char('c') => vec![InputEvent::ClearSelection],
        KeyCode::Char('p') => vec![InputEvent::CyclePlayMode],

        // knobs
        KeyCode::Char('-') => vec![InputEvent::AdjustSpeed(-SPEED_STEP)],
        KeyCode::Char('=') => vec![InputEvent::AdjustSpeed(SPEED_STEP)],
        KeyCode::Char('9') => vec![InputEvent::AdjustTranspose(-1)],
        KeyCode::Char('0') => vec![InputEvent::AdjustTranspose(1)],
        KeyCode::Char('(') => vec![InputEvent::AdjustTuning(-TUNING_STEP)],
        KeyCode::Char(')') => vec![InputEvent::AdjustTuning(TUNING_STEP)],
        KeyCode::Char('d') => vec![InputEvent::AdjustPlaybackDelay(-DELAY_STEP)],
        KeyCode::Char('D') => vec![InputEvent::AdjustPlaybackDelay(DELAY_STEP)],
        KeyCode::Char('z') => vec![InputEvent::AdjustZoom(-ZOOM_STEP)],
        KeyCode::Char('Z') => vec![InputEvent::AdjustZoom(ZOOM_STEP)],

        // pitch overlay range, b = bottom and t = top, shifted = up
        KeyCode::Char('b') => shift_pitch_range(ts, -PITCH_RANGE_STEP, 0.0),
        KeyCode::Char('B') => shift_pitch_range(ts, PITCH_RANGE_STEP, 0.0),
        KeyCode::Char('t') => shift_pitch_range(ts, 0.0, -PITCH_RANGE_STEP),
        KeyCode::Char('T') => shift_pitch_range(ts, 0.0, PITCH_RANGE_STEP),

        _ => vec![],
    }
}

fn on_selected(ts: &TuiState, f: impl FnOnce(crate::pipeline::MarkId) -> InputEvent) -> Vec<InputEvent> {
    ts.selected_mark().map(f).into_iter().collect()
}

fn shift_pitch_range(ts: &TuiState, low: f32, high: f32) -> Vec<InputEvent> {
    let (lo, hi) = ts.pitch_range;
    vec![InputEvent::SetPitchRange(lo + low, hi + high)]
}

// typing a label: Enter commits, Esc throws it away
fn edit_label(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    let Some((id, buf)) = ts.editing.as_mut() else {
        return vec![];
    };
    match code {
        KeyCode::Char(c) => { buf.push(c); vec![] }
        KeyCode::Backspace => { buf.pop(); vec![] }
        KeyCode::Enter => {
            let event = InputEvent::RelabelMark { id: *id, label: std::mem::take(buf) };
            ts.editing = None;
            vec![event]
        }
        KeyCode::Esc => { ts.editing = None; vec![] }
        _ => vec![],
    }
}

// typing header tags, each starts from the current value:
// Tab commits and moves on, Enter commits and stops, Esc drops the field being typed
fn edit_tags(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    let Some((field, buf)) = ts.tag_edit.as_mut() else {
        return vec![];
    };
    let field = *field;
    match code {
        KeyCode::Char(c) => { buf.push(c); vec![] }
        KeyCode::Backspace => { buf.pop(); vec![] }
        KeyCode::Tab => {
            let event = InputEvent::SetMetadata { field, value: std::mem::take(buf) };
            let next = field.next();
            ts.tag_edit = Some((next, ts.metadata.get(next).to_string()));
            vec![event]
        }
        KeyCode::Enter => {
            let event = InputEvent::SetMetadata { field, value: std::mem::take(buf) };
            ts.tag_edit = None;
            vec![event]
        }
        KeyCode::Esc => { ts.tag_edit = None; vec![] }
        _ => vec![],
    }
}

// dragging the playhead: arrows move the target, Enter or g drops it there,
// Esc drops it back where it started
fn scrub(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    let Some(target) = ts.scrub else {
        return vec![];
    };
    let step = (ts.total_frames / SCRUB_STEPS).max(1) as i64;
    match code {
        KeyCode::Left => { ts.scrub = Some((target - step).max(0)); vec![] }
        KeyCode::Right => { ts.scrub = Some(target + step); vec![] }
        KeyCode::Enter | KeyCode::Char('g') => {
            ts.scrub = None;
            vec![InputEvent::ScrubEnd(target)]
        }
        KeyCode::Esc => {
            ts.scrub = None;
            vec![InputEvent::ScrubEnd(ts.position as i64)]
        }
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MarkId;

    fn with_marks(n: u64) -> TuiState {
        TuiState { mark_ids: (0..n).map(MarkId).collect(), ..TuiState::default() }
    }

    #[test]
    fn cursor_stays_in_table() {
        let mut ts = with_marks(2);
        handle_key(KeyCode::Up, &mut ts);
        assert_eq!(ts.cursor, 0);
        handle_key(KeyCode::Down, &mut ts);
        handle_key(KeyCode::Down, &mut ts);
        assert_eq!(ts.cursor, 1);
        assert_eq!(handle_key(KeyCode::Enter, &mut ts), vec![InputEvent::JumpToMark(MarkId(1))]);
    }

    #[test]
    fn mark_keys_do_nothing_without_marks() {
        let mut ts = TuiState::default();
        assert!(handle_key(KeyCode::Char('x'), &mut ts).is_empty());
        assert!(handle_key(KeyCode::Char('S'), &mut ts).is_empty());
        handle_key(KeyCode::Char('l'), &mut ts);
        assert!(ts.editing.is_none());
    }

    #[test]
    fn pitch_range_keys_move_one_bound() {
        let mut ts = TuiState { pitch_range: (55.0, 86.0), ..TuiState::default() };
        assert_eq!(handle_key(KeyCode::Char('b'), &mut ts), vec![InputEvent::SetPitchRange(54.0, 86.0)]);
        assert_eq!(handle_key(KeyCode::Char('B'), &mut ts), vec![InputEvent::SetPitchRange(56.0, 86.0)]);
        assert_eq!(handle_key(KeyCode::Char('t'), &mut ts), vec![InputEvent::SetPitchRange(55.0, 85.0)]);
        assert_eq!(handle_key(KeyCode::Char('T'), &mut ts), vec![InputEvent::SetPitchRange(55.0, 87.0)]);
    }

    #[test]
    fn label_editing_swallows_keys() {
        let mut ts = with_marks(1);
        handle_key(KeyCode::Char('l'), &mut ts);
        for c in "qverse".chars() {
            assert!(handle_key(KeyCode::Char(c), &mut ts).is_empty());
        }
        handle_key(KeyCode::Backspace, &mut ts);
        let events = handle_key(KeyCode::Enter, &mut ts);
        assert_eq!(events, vec![InputEvent::RelabelMark { id: MarkId(0), label: "qvers".into() }]);
        assert!(ts.editing.is_none());
    }

    #[test]
    fn tag_editing_starts_from_current_values() {
        let mut ts = TuiState::default();
        ts.metadata.title = "etude".into();
        ts.metadata.artist = "Sor".into();

        assert!(handle_key(KeyCode::Char('i'), &mut ts).is_empty());
        assert_eq!(ts.tag_edit, Some((MetadataField::Title, "etude".into())));
        handle_key(KeyCode::Char('s'), &mut ts); // typed, not the selection key
        assert_eq!(
            handle_key(KeyCode::Tab, &mut ts),
            vec![InputEvent::SetMetadata { field: MetadataField::Title, value: "etudes".into() }]
        );
        assert_eq!(ts.tag_edit, Some((MetadataField::Artist, "Sor".into())));

        handle_key(KeyCode::Char('q'), &mut ts);
        assert!(handle_key(KeyCode::Esc, &mut ts).is_empty());
        assert!(ts.tag_edit.is_none());

        handle_key(KeyCode::Char('i'), &mut ts);
        handle_key(KeyCode::Backspace, &mut ts);
        assert_eq!(
            handle_key(KeyCode::Enter, &mut ts),
            vec![InputEvent::SetMetadata { field: MetadataField::Title, value: "etud".into() }]
        );
        assert!(ts.tag_edit.is_none());
    }

    #[test]
    fn scrub_moves_target_then_releases() {
        let mut ts = TuiState { position: 500, total_frames: 10_000, ..TuiState::default() };
        assert_eq!(handle_key(KeyCode::Char('g'), &mut ts), vec![InputEvent::ScrubStart]);
        handle_key(KeyCode::Right, &mut ts);
        handle_key(KeyCode::Right, &mut ts);
        assert_eq!(handle_key(KeyCode::Enter, &mut ts), vec![InputEvent::ScrubEnd(700)]);

        handle_key(KeyCode::Char('g'), &mut ts);
        handle_key(KeyCode::Left, &mut ts);
        assert_eq!(handle_key(KeyCode::Esc, &mut ts), vec![InputEvent::ScrubEnd(500)]);
    }
}
