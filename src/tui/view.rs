use crate::pipeline::MetadataField;
use crate::shared::DisplayState;
use super::mode::TuiState;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Sparkline};
use ratatui::Frame;

const HELP: &str = "space play  ←/→ seek  [ ] marks  g scrub  m mark  x del  l label  i tags  \
s/e sel  S/E sel@mark  c clear  p mode  -/= speed  9/0 transpose  ( ) tune  d/D delay  z/Z zoom  b/B t/T pitch range  q quit";

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title + notice
            Constraint::Length(3), // transport line
            Constraint::Length(3), // position gauge
            Constraint::Length(8), // pitch contour
            Constraint::Min(4),    // marks
            Constraint::Length(1), // key help
        ])
        .split(area);

    draw_header(frame, sections[0], state, ts);
    draw_transport(frame, sections[1], state);
    draw_position(frame, sections[2], state, ts);
    draw_contour(frame, sections[3], state);
    draw_marks(frame, sections[4], state, ts);
    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        sections[5],
    );
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let meta = &state.metadata;
    let title = if let Some((field, buf)) = &ts.tag_edit {
        format!("{}: {buf}_", field.label())
    } else if state.loaded {
        let mut parts = vec![meta.title.as_str()];
        parts.extend([meta.artist.as_str(), meta.album.as_str()].into_iter().filter(|s| !s.is_empty()));
        parts.join(" · ")
    } else {
        "no track (pass a .wav path on the command line)".to_string()
    };
    let mut spans = vec![Span::styled(title, Style::default().add_modifier(Modifier::BOLD))];
    // rhythm, key and tempo
    for (field, value) in MetadataField::ALL[3..].iter().map(|f| (f, meta.get(*f))) {
        if !value.is_empty() {
            spans.push(Span::styled(
                format!("  {} {value}", field.label()),
                Style::default().fg(Color::Gray),
            ));
        }
    }
    if let Some(notice) = &state.notice {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }
    let block = Block::default().borders(Borders::ALL).title("tunetutor");
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_transport(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let state_color = if state.play_state.is_playing() { Color::Green } else { Color::Gray };
    let line = Line::from(vec![
        Span::raw(format!("{}  ", state.position_text)),
        Span::styled(format!("[{}]", state.play_state.label()), Style::default().fg(state_color)),
        Span::raw(format!(
            "  {}  speed {}%  transpose {:+}  tune {:+}c  delay {:.1}s  zoom {:.2}x",
            state.play_mode.label(),
            state.speed_percent,
            state.transpose,
            state.tuning_cents,
            state.playback_delay,
            state.zoom,
        )),
    ]);
    frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
}

fn draw_position(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let total = state.total_frames.max(1) as f64;
    let (ratio, color) = match ts.scrub {
        Some(target) => (target.max(0) as f64 / total, Color::Magenta),
        None => (state.position as f64 / total, Color::Cyan),
    };
    let title = format!("selection {}", state.selection_text);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(color))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(state.position_text.clone());
    frame.render_widget(gauge, area);
}

fn draw_contour(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let (lo, hi) = state.pitch_range;
    let title = format!("pitch {lo:.0}-{hi:.0}  (playhead at centre)");
    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .data(&state.contour_window)
        .max((hi - lo).max(1.0) as u64 + 1)
        .style(Style::default().fg(Color::LightBlue));
    frame.render_widget(sparkline, area);
}

fn draw_marks(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let items: Vec<ListItem> = state
        .marks
        .iter()
        .map(|m| {
            let label = match &ts.editing {
                Some((id, buf)) if *id == m.id => format!("{buf}_"),
                _ => m.label.clone(),
            };
            let sel = match (m.selection_start, m.selection_end) {
                (true, true) => " [start+end]",
                (true, false) => " [start]",
                (false, true) => " [end]",
                (false, false) => "",
            };
            ListItem::new(format!("{:>10}  {label}{sel}", m.time))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!("marks ({})", state.marks.len())))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !state.marks.is_empty() {
        list_state.select(Some(ts.cursor));
    }
    frame.render_stateful_widget(list, area, &mut list_state);
}
