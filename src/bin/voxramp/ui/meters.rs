//! Meter widgets - header line, one row per voice, filter status

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame,
};

use super::{UiStateInit, UiStateUpdate, VoiceMeter};

/// Render the header bar
pub fn render_header(frame: &mut Frame, area: Rect, init: &UiStateInit, state: &UiStateUpdate) {
    let block = Block::default().title(" voxramp ").borders(Borders::ALL);

    let seconds = state.elapsed_ms as f64 / 1000.0;
    let line = Line::from(vec![
        Span::styled(
            format!(" Patch: {}  ", init.patch_name),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(format!("{seconds:>7.2}s  "), Style::default().fg(Color::White)),
        Span::styled(
            format!("Tasks: {}", state.pending_tasks),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}

/// Render one row per voice: status text and an amplitude gauge
pub fn render_voices(frame: &mut Frame, area: Rect, init: &UiStateInit, state: &UiStateUpdate) {
    let block = Block::default().title(" Voices ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let meters = state.meters();
    if meters.is_empty() {
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(meters.iter().map(|_| Constraint::Length(1)))
        .split(inner);

    for ((row, meter), name) in rows.iter().zip(meters).zip(&init.voices) {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(40), Constraint::Length(24)])
            .split(*row);

        let marker = if *name == init.lead { "*" } else { " " };
        frame.render_widget(Paragraph::new(voice_line(marker, name, meter)), cols[0]);

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(if meter.muted {
                Color::DarkGray
            } else {
                Color::Green
            }))
            .ratio(meter.amplitude.clamp(0.0, 1.0))
            .label(format!("{:.0}%", meter.amplitude * 100.0));
        frame.render_widget(gauge, cols[1]);
    }
}

fn voice_line<'a>(marker: &'a str, name: &'a str, meter: &VoiceMeter) -> Line<'a> {
    let (status, color) = match (meter.started, meter.muted) {
        (false, _) => ("idle", Color::DarkGray),
        (true, true) => ("paused", Color::Yellow),
        (true, false) => ("playing", Color::Green),
    };
    let ramp = if meter.remaining_ticks > 0 {
        format!("ramp {:>3}", meter.remaining_ticks)
    } else {
        String::new()
    };

    Line::from(vec![
        Span::raw(format!("{marker}{name:<8} ")),
        Span::styled(format!("{status:<8}"), Style::default().fg(color)),
        Span::styled(
            format!("{:>8.2} Hz ", meter.live_frequency),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("(→{:>8.2}) ", meter.frequency),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("pan {:>+5.2} ", meter.pan), Style::default().fg(Color::Cyan)),
        Span::styled(ramp, Style::default().fg(Color::Magenta)),
    ])
}

/// Render the shared filter status
pub fn render_filter(frame: &mut Frame, area: Rect, init: &UiStateInit, state: &UiStateUpdate) {
    let block = Block::default()
        .title(format!(" Filter: {} ", init.filter))
        .borders(Borders::ALL);

    let line = Line::from(vec![
        Span::styled(
            format!(" Cutoff: {:>8.1} Hz  ", state.cutoff_hz),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("Stages: {}  ", state.filter_stages),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            if state.filter_ramping { "sweeping" } else { "" },
            Style::default().fg(Color::Magenta),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
