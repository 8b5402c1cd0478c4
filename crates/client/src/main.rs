mod buffer;
mod client;
mod clock;
mod config;
mod interpolation;
mod network;
mod prediction;
mod tui;

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use glam::Vec2;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use client::ClientApp;
use config::ClientConfig;

#[derive(Parser)]
#[command(name = "arcnet-client")]
#[command(about = "Snapshot-interpolation game client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:7777")]
    server: String,

    #[arg(long)]
    headless: bool,

    #[arg(long, default_value_t = 5, help = "Seconds to stay connected in headless mode")]
    headless_seconds: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ClientConfig { server_addr: args.server.clone(), ..Default::default() };
    let mut client = ClientApp::new(config)?;
    client.begin_handshake();

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("connecting to {}", args.server);
        run_headless(&mut client, Duration::from_secs(args.headless_seconds));
    } else {
        run_with_tui(&mut client)?;
    }

    Ok(())
}

fn run_headless(client: &mut ClientApp, duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        client.tick(Vec2::ZERO);
        std::thread::sleep(Duration::from_millis(16));
    }
    log::info!("headless run finished, stats: {:?}", client.stats());
}

fn run_with_tui(client: &mut ClientApp) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut running = true;
    while running {
        client.tick(Vec2::ZERO);

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    running = false;
                }
            }
        }

        let stats = client.stats();
        let predicted = client.predicted_position();
        terminal.draw(|frame| tui::render(frame, &stats, predicted))?;

        std::thread::sleep(Duration::from_millis(16));
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}
