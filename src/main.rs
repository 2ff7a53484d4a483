use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;

mod analyzer;
mod app;
mod config;
mod error;
mod player;
mod playlist;
mod source;
mod ui;

use app::{App, Command};
use config::{AnalyzerConfig, TICK_RATE};
use source::RodioBackend;

/// Terminal audio player with a 64-band spectrum analyzer.
#[derive(Parser)]
#[command(name = "bandstand", version)]
struct Args {
    /// Directory scanned for audio files
    #[arg(default_value = "songs")]
    dir: PathBuf,

    /// FFT window size in samples
    #[arg(long, default_value_t = 1024, value_parser = parse_window_size)]
    fft_size: usize,

    /// Bar fall factor per tick, in (0, 1)
    #[arg(long, default_value_t = 0.85)]
    decay: f32,

    /// Peak marker fall per tick
    #[arg(long, default_value_t = 0.02)]
    peak_fall: f32,
}

fn parse_window_size(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if n.is_power_of_two() && n >= 256 {
        Ok(n)
    } else {
        Err("must be a power of two, at least 256".into())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let analyzer_config = AnalyzerConfig {
        window_size: args.fft_size,
        attack_decay: args.decay.clamp(0.01, 0.99),
        peak_fall: args.peak_fall.max(0.0),
    };

    let tracks = playlist::scan_tracks(&args.dir);
    let backend = RodioBackend::new().context("audio output unavailable")?;
    let mut app = App::new(backend, tracks, args.dir, analyzer_config);
    if let Err(e) = app.autoplay() {
        log::info!("{e}");
    }

    let mut terminal = ratatui::init();
    let result = run(&mut terminal, &mut app);
    ratatui::restore();
    result
}

fn run(terminal: &mut DefaultTerminal, app: &mut App<RodioBackend>) -> anyhow::Result<()> {
    let mut last_tick = Instant::now();
    while app.running() {
        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(command) = map_key(key.code) {
                        app.dispatch(command);
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.tick();
            terminal.draw(|f| ui::draw(f, app))?;
            last_tick = Instant::now();
        }
    }
    Ok(())
}

fn map_key(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Char(' ') => Some(Command::PlayPause),
        KeyCode::Char('n') => Some(Command::Next),
        KeyCode::Char('p') => Some(Command::Prev),
        KeyCode::Right => Some(Command::SeekForward),
        KeyCode::Left => Some(Command::SeekBackward),
        KeyCode::Up => Some(Command::VolumeUp),
        KeyCode::Down => Some(Command::VolumeDown),
        KeyCode::Char('r') => Some(Command::ReloadPlaylist),
        _ => None,
    }
}
