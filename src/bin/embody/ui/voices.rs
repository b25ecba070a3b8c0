//! Voice pool widget - one row per member channel

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Row, Table},
    Frame,
};

use super::state::VoiceTable;

const BAR_WIDTH: usize = 10;

fn bar(value: f32) -> String {
    let filled = (value.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
    format!("{}{}", "█".repeat(filled), "·".repeat(BAR_WIDTH - filled))
}

/// Centre-out bar for -1..1
fn bend_bar(value: f32) -> String {
    let half = BAR_WIDTH / 2;
    let cells = (value.clamp(-1.0, 1.0).abs() * half as f32).round() as usize;
    if value < 0.0 {
        format!("{}{}|{}", "·".repeat(half - cells), "█".repeat(cells), "·".repeat(half))
    } else {
        format!("{}|{}{}", "·".repeat(half), "█".repeat(cells), "·".repeat(half - cells))
    }
}

pub fn render_voices(frame: &mut Frame, area: Rect, table: &VoiceTable, max_voices: usize) {
    let rows = table.members(max_voices).map(|(channel, voice)| {
        let style = if voice.live {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let note = if voice.live {
            format!("{:>3}", voice.note)
        } else {
            "  -".to_string()
        };
        Row::new(vec![
            format!("{channel:>2}"),
            note,
            format!("{:>3}", voice.velocity),
            bend_bar(voice.pitch_bend),
            bar(voice.brightness),
            bar(voice.timbre),
        ])
        .style(style)
    });

    let widths = [
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Length(4),
        Constraint::Length(BAR_WIDTH as u16 + 2),
        Constraint::Length(BAR_WIDTH as u16 + 1),
        Constraint::Length(BAR_WIDTH as u16 + 1),
    ];
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["ch", "note", "vel", "bend", "bright", "timbre"])
                .style(Style::default().fg(Color::Cyan)),
        )
        .block(Block::default().title(" Voices ").borders(Borders::ALL));

    frame.render_widget(table, area);
}
