//! Debug console: connection state, clock sync, and buffered/predicted
//! entity info, in the same single-screen ratatui style as the server's
//! operator console.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::client::ClientStats;
use crate::network::ClientState;

pub fn render(frame: &mut Frame, stats: &ClientStats, predicted_position: glam::Vec2) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(3), Constraint::Length(6), Constraint::Min(0)])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_clock(frame, chunks[1], stats);
    render_position(frame, chunks[2], stats, predicted_position);
}

fn state_color(state: ClientState) -> Color {
    match state {
        ClientState::Connected => Color::Green,
        ClientState::Disconnected => Color::Red,
        ClientState::Connecting | ClientState::ChallengeResponse => Color::Yellow,
    }
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ClientStats) {
    let block = Block::default()
        .title(" arcnet client ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state_color(stats.state)));
    let text = format!(
        "{:?}  peer={:?}  entity={:?}",
        stats.state, stats.peer_id, stats.entity_id
    );
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_clock(frame: &mut Frame, area: Rect, stats: &ClientStats) {
    let block = Block::default()
        .title(" Clock / Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let net = &stats.network_stats;
    let lines = vec![
        Line::from(vec![
            Span::styled("RTT: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.1} ms", stats.rtt_ms)),
        ]),
        Line::from(vec![
            Span::styled("Clock offset: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.1} ms", stats.clock_offset_ms)),
        ]),
        Line::from(vec![
            Span::styled("Snapshots buffered: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}  (received {})", stats.buffered_snapshots, stats.snapshots_received)),
        ]),
        Line::from(vec![
            Span::styled("Corrections: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}", stats.corrections)),
        ]),
        Line::from(vec![
            Span::styled("Packets: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} sent / {} recv / {} lost", net.packets_sent, net.packets_received, net.packets_lost)),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_position(frame: &mut Frame, area: Rect, _stats: &ClientStats, predicted_position: glam::Vec2) {
    let block = Block::default()
        .title(" Prediction ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let text = format!("predicted position: ({:.1}, {:.1})", predicted_position.x, predicted_position.y);
    frame.render_widget(Paragraph::new(text).block(block), area);
}
