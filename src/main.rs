use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use tunetutor::audio;
use tunetutor::config::Args;
use tunetutor::shared::InputEvent;
use tunetutor::tui;
use tunetutor::Middle;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// The terminal belongs to the TUI, so logs go to a file
fn init_logging(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("could not open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file())?;
    tracing::info!(session_dir = %args.session_dir().display(), "starting");

    let audio = audio::start_audio().context("could not start audio output")?;
    let mut middle = Middle::new(audio.readback(), args.session_dir(), args.default_settings());

    // a bad path on the command line still opens the player, with a notice
    if let Some(path) = args.track.as_deref() {
        match middle.load_track(path, audio.sample_rate()) {
            Ok(cmds) => cmds.into_iter().for_each(|cmd| audio.send(cmd)),
            Err(e) => {
                tracing::error!("{e}");
                middle.set_notice(e.to_string());
            }
        }
    }

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let tick_rate = std::time::Duration::from_millis(16); // ~60fps
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        let columns = term.size()?.width.saturating_sub(2) as usize;
        let ds = middle.display_state(columns);
        tui_state.sync(&ds);

        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds, &tui_state);
        })?;

        let events = tui::input::poll_input(tick_rate, &mut tui_state)?;
        for event in events {
            if event == InputEvent::Quit {
                // save before quitting
                if let Err(e) = middle.save_session() {
                    tracing::error!("could not save session: {e}");
                }
                tracing::info!("quit");
                return Ok(());
            }
            for cmd in middle.handle_input(event) {
                audio.send(cmd);
            }
        }

        // transports the engine swapped out get freed here, not in the callback
        audio.collect_retired();
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
