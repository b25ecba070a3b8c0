//! Status bar widget - loop rate, winning source and counters

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use embody::DiagnosticsSnapshot;

pub fn render_status(frame: &mut Frame, area: Rect, snapshot: &DiagnosticsSnapshot) {
    let block = Block::default().title(" embody ").borders(Borders::ALL);

    let on_rate = (snapshot.measured_hz - snapshot.target_hz).abs() <= 5.0;
    let source = snapshot.last_source.map_or("none", |s| s.name());

    let line = Line::from(vec![
        Span::styled(
            format!(" {:.1}/{:.0} Hz  ", snapshot.measured_hz, snapshot.target_hz),
            Style::default().fg(if on_rate { Color::Green } else { Color::Yellow }),
        ),
        Span::styled(
            format!("input: {source:<8}  "),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format!(
                "voices {}/{}  ",
                snapshot.live_voices, snapshot.max_voices
            ),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!(
                "steals {}  stale {}  dropped {}  overruns {}  ",
                snapshot.steal_count,
                snapshot.stale_skip_count,
                snapshot.dropped_deltas,
                snapshot.overrun_ticks
            ),
            Style::default().fg(Color::Magenta),
        ),
        Span::styled(
            format!("tick {}", snapshot.tick_count),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
