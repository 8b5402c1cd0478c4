mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use arcnet_core::PacketLossSimulation;
use config::ServerConfig;
use events::{DisconnectReason, ServerEvent};
use server::GameServer;

#[derive(Parser)]
#[command(name = "arcnet-server")]
#[command(about = "Authoritative snapshot-interpolation game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = 7777)]
    port: u16,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable global packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let global_packet_loss = if args.simulate_packet_loss {
        Some(PacketLossSimulation {
            enabled: true,
            loss_percent: args.loss_percent,
            min_latency_ms: args.min_latency,
            max_latency_ms: args.max_latency,
            jitter_ms: args.jitter,
            duplicate_percent: 0.0,
        })
    } else {
        None
    };

    let config = ServerConfig {
        max_clients: args.max_clients,
        global_packet_loss,
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)?;

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("server listening on {}", server.local_addr());
        server.run();
        log::info!("server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let running = server.running();
    let mut selected: usize = 0;

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnecting { addr } => log::info!("connection request from {addr}"),
                ServerEvent::ClientConnected { peer_id, addr, entity_id } => {
                    log::info!("peer {peer_id} connected from {addr} (entity {entity_id})");
                }
                ServerEvent::ClientDisconnected { peer_id, reason } => {
                    log::info!("peer {peer_id} {}", reason.as_str());
                }
                ServerEvent::ConnectionDenied { addr, reason } => log::warn!("denied {addr}: {reason}"),
                ServerEvent::Error { message } => log::error!("{message}"),
            }
        }

        let clients = server.client_infos();
        if !clients.is_empty() {
            selected = selected.min(clients.len() - 1);
        } else {
            selected = 0;
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => running.store(false, Ordering::SeqCst),
                        KeyCode::Up => {
                            if !clients.is_empty() {
                                selected = selected.checked_sub(1).unwrap_or(clients.len() - 1);
                            }
                        }
                        KeyCode::Down => {
                            if !clients.is_empty() {
                                selected = (selected + 1) % clients.len();
                            }
                        }
                        KeyCode::Char('k') => {
                            if let Some(client) = clients.get(selected) {
                                server.kick_client(client.peer_id, DisconnectReason::Kicked);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        let clients = server.client_infos();
        let selected_row = if clients.is_empty() { None } else { Some(selected) };
        terminal.draw(|frame| tui::render(frame, &stats, &clients, selected_row))?;
    }

    server.shutdown_connections();
    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}
