//! Spatial field widget - top-down view of the source layout

use ratatui::{
    layout::Rect,
    style::Color,
    symbols,
    widgets::{
        canvas::{Canvas, Points},
        Block, Borders,
    },
    Frame,
};

use super::state::FieldView;

const EXTENT: f64 = 2.0;

pub fn render_field(frame: &mut Frame, area: Rect, view: &FieldView) {
    let sources: Vec<(f64, f64)> = view
        .points()
        .iter()
        .map(|p| (p[0] as f64, p[1] as f64))
        .collect();
    let occupied: Vec<(f64, f64)> = view
        .occupied()
        .map(|p| (p[0] as f64, p[1] as f64))
        .collect();

    let title = format!(" Field: {} ({} sources) ", view.class.name(), view.count);
    let canvas = Canvas::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .marker(symbols::Marker::Braille)
        .x_bounds([-EXTENT, EXTENT])
        .y_bounds([-EXTENT, EXTENT])
        .paint(|ctx| {
            ctx.draw(&Points {
                coords: &sources,
                color: Color::DarkGray,
            });
            ctx.layer();
            ctx.draw(&Points {
                coords: &occupied,
                color: Color::Cyan,
            });
        });

    frame.render_widget(canvas, area);
}
