//! TUI module for embody
//!
//! Shows loop diagnostics, the voice pool and the spatial field, and plays
//! host notes from the keyboard.

mod field;
pub mod state;
mod status;
mod voices;

use color_eyre::eyre::Result as EyreResult;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::Paragraph,
    DefaultTerminal, Frame,
};
use rtrb::{Consumer, Producer};
use std::time::Duration;
use tracing::warn;

use embody::{
    engine::sink::ExpressionDelta,
    io::{converter::midi_to_note, midi::MidiEvent},
    voice::message::NoteMessage,
    ControlLoopScheduler, DiagnosticsSnapshot, EngineConfig,
};

pub use state::FieldView;

use field::render_field;
use state::VoiceTable;
use status::render_status;
use voices::render_voices;

/// C major from middle C, played by keys 1-8
const KEY_NOTES: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];
const HOST_CHANNEL: u8 = 0;
const CC_ALL_NOTES_OFF: u8 = 123;

pub struct UiApp<'a> {
    scheduler: &'a ControlLoopScheduler,
    config: EngineConfig,
    delta_rx: Consumer<ExpressionDelta>,
    field_rx: Consumer<FieldView>,
    note_tx: Producer<NoteMessage>,
    voices: VoiceTable,
    field: FieldView,
    snapshot: DiagnosticsSnapshot,
    held: [bool; KEY_NOTES.len()],
    notice: String,
    should_quit: bool,
}

impl<'a> UiApp<'a> {
    pub fn new(
        scheduler: &'a ControlLoopScheduler,
        config: EngineConfig,
        delta_rx: Consumer<ExpressionDelta>,
        field_rx: Consumer<FieldView>,
        note_tx: Producer<NoteMessage>,
    ) -> Self {
        Self {
            scheduler,
            config,
            delta_rx,
            field_rx,
            note_tx,
            voices: VoiceTable::default(),
            field: FieldView::default(),
            snapshot: DiagnosticsSnapshot::default(),
            held: [false; KEY_NOTES.len()],
            notice: String::new(),
            should_quit: false,
        }
    }

    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            self.poll();
            terminal.draw(|frame| self.render(frame))?;

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }
        }
        Ok(())
    }

    fn poll(&mut self) {
        while let Ok(delta) = self.delta_rx.pop() {
            self.voices.apply(&delta);
        }
        // Keep only the latest geometry
        while let Ok(view) = self.field_rx.pop() {
            self.field = view;
        }
        self.snapshot = self.scheduler.diagnostics();
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char(c @ '1'..='8') => {
                let index = c as usize - '1' as usize;
                self.toggle_note(index);
            }
            KeyCode::Char(' ') => {
                self.held = [false; KEY_NOTES.len()];
                self.send(MidiEvent::ControlChange {
                    channel: HOST_CHANNEL,
                    controller: CC_ALL_NOTES_OFF,
                    value: 0,
                });
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let voices = (self.config.max_voices + 1).min(embody::MAX_VOICES);
                self.apply(self.config.with_max_voices(voices));
            }
            KeyCode::Char('-') => {
                let voices = self.config.max_voices.saturating_sub(1);
                self.apply(self.config.with_max_voices(voices));
            }
            KeyCode::Char(']') => {
                let rate = self.config.tick_rate_hz + 10.0;
                self.apply(self.config.with_tick_rate(rate));
            }
            KeyCode::Char('[') => {
                let rate = self.config.tick_rate_hz - 10.0;
                self.apply(self.config.with_tick_rate(rate));
            }
            _ => {}
        }
    }

    fn toggle_note(&mut self, index: usize) {
        let held = !self.held[index];
        self.held[index] = held;
        self.send(MidiEvent::NoteOn {
            channel: HOST_CHANNEL,
            key: KEY_NOTES[index],
            velocity: if held { 100 } else { 0 },
        });
    }

    fn send(&mut self, event: MidiEvent) {
        let Some(message) = midi_to_note(event, HOST_CHANNEL) else {
            return;
        };
        if self.note_tx.push(message).is_err() {
            warn!("host note ring full, dropped {message:?}");
        }
    }

    fn apply(&mut self, config: EngineConfig) {
        match self.scheduler.reconfigure(config) {
            Ok(()) => {
                self.config = config;
                self.notice = format!(
                    "applied {:.0} Hz, {} voices",
                    config.tick_rate_hz, config.max_voices
                );
            }
            Err(err) => self.notice = format!("rejected: {err}"),
        }
    }

    fn render(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Status bar
                Constraint::Min(10),   // Voices and field
                Constraint::Length(1), // Help bar
            ])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(52), Constraint::Min(20)])
            .split(rows[1]);

        render_status(frame, rows[0], &self.snapshot);
        render_voices(frame, columns[0], &self.voices, self.config.max_voices);
        render_field(frame, columns[1], &self.field);

        let help = Paragraph::new(format!(
            " [Q] Quit  [1-8] Notes  [Space] All off  [+/-] Voices  [ [ ] ] Rate   {}",
            self.notice
        ))
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, rows[2]);
    }
}
