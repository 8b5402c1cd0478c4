//! Operator console: a single-screen ratatui render of tick/client/network
//! stats, grounded on the teacher's `tui::render`.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Row, Table};
use ratatui::Frame;

use crate::server::{ClientInfo, ServerStats};

pub fn render(frame: &mut Frame, stats: &ServerStats, clients: &[ClientInfo], selected: Option<usize>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(7),
            Constraint::Min(0),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_clients(frame, chunks[3], clients, selected);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" arcnet server ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let text = format!(
        "Tick: {}  |  Entities: {}  |  Up/Down select, k kick, q quit",
        stats.tick, stats.entity_count
    );
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Clients ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let ratio = stats.client_count as f64 / stats.max_clients.max(1) as f64;
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{}", stats.client_count, stats.max_clients));
    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let net = &stats.network_stats;
    let lines = vec![
        Line::from(vec![
            Span::styled("Packets: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} sent / {} recv", net.packets_sent, net.packets_received)),
        ]),
        Line::from(vec![
            Span::styled("Bytes: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} sent / {} recv", net.bytes_sent, net.bytes_received)),
        ]),
        Line::from(vec![
            Span::styled("Lost: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{} packets", net.packets_lost)),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_clients(frame: &mut Frame, area: Rect, clients: &[ClientInfo], selected: Option<usize>) {
    let block = Block::default()
        .title(" Connections ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let rows = clients.iter().enumerate().map(|(i, c)| {
        let row = Row::new(vec![
            c.peer_id.to_string(),
            c.addr.clone(),
            c.entity_id.map(|e| e.to_string()).unwrap_or_else(|| "-".into()),
        ]);
        if selected == Some(i) {
            row.style(Style::default().add_modifier(Modifier::REVERSED))
        } else {
            row
        }
    });

    let table = Table::new(
        rows,
        [Constraint::Length(8), Constraint::Length(22), Constraint::Length(10)],
    )
    .header(Row::new(vec!["Peer", "Addr", "Entity"]))
    .block(block);

    frame.render_widget(table, area);
}
