//! TUI module for voxramp
//!
//! Shows live voice and filter values while ramps run.

mod meters;
pub mod state;

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

pub use state::{ControlMessage, UiStateInit, UiStateUpdate, VoiceMeter, MAX_VOICES};

use meters::{render_filter, render_header, render_voices};

/// UI application state
pub struct UiApp {
    /// Ring buffer receiver for state snapshots
    state_rx: Consumer<UiStateUpdate>,
    /// Ring buffer sender for commands
    control_tx: Producer<ControlMessage>,
    init: UiStateInit,
    /// Latest snapshot received
    current_state: UiStateUpdate,
    should_quit: bool,
}

impl UiApp {
    pub fn new(
        state_rx: Consumer<UiStateUpdate>,
        control_tx: Producer<ControlMessage>,
        init: UiStateInit,
    ) -> Self {
        Self {
            state_rx,
            control_tx,
            init,
            current_state: UiStateUpdate::new(),
            should_quit: false,
        }
    }

    /// Run the UI event loop
    pub fn run(&mut self, terminal: &mut DefaultTerminal) -> EyreResult<()> {
        while !self.should_quit {
            self.poll_state();

            terminal.draw(|frame| self.render(frame))?;

            // ~60fps
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

    /// Keep only the latest snapshot
    fn poll_state(&mut self) {
        while let Ok(state) = self.state_rx.pop() {
            self.current_state = state;
        }
    }

    fn send(&mut self, message: ControlMessage) {
        if self.control_tx.push(message).is_err() {
            warn!(?message, "control queue full, command dropped");
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char(' ') => self.send(ControlMessage::TogglePlayback),
            KeyCode::Char('r') | KeyCode::Char('R') => self.send(ControlMessage::RampLead),
            KeyCode::Char('f') | KeyCode::Char('F') => self.send(ControlMessage::SweepFilter),
            _ => {}
        }
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(4),    // Voices
                Constraint::Length(3), // Filter
                Constraint::Length(1), // Help bar
            ])
            .split(area);

        render_header(frame, chunks[0], &self.init, &self.current_state);
        render_voices(frame, chunks[1], &self.init, &self.current_state);
        render_filter(frame, chunks[2], &self.init, &self.current_state);

        let help = Paragraph::new(" [Q] Quit  [Space] Pause/Play lead  [R] Ramp lead  [F] Sweep filter")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, chunks[3]);
    }
}
