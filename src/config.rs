use std::path::PathBuf;

use clap::Parser;

use crate::pipeline::Settings;
use crate::shared::PLAYBACK_DELAY_RANGE;

const SESSION_DIR_NAME: &str = ".tunetutor";
const LOG_FILE_NAME: &str = "tunetutor.log";

/// Slow down, loop and mark up a recording while you practise along with it
#[derive(Parser, Debug)]
#[command(name = "tunetutor")]
#[command(version)]
pub struct Args {
    /// WAV file to open on startup
    pub track: Option<PathBuf>,

    /// Where per-track sessions are kept [default: ~/.tunetutor]
    #[arg(long, env = "TUNETUTOR_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Log file [default: <session-dir>/tunetutor.log]
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Seconds of silence before playback starts, for tracks with no session
    #[arg(long, default_value_t = 0.0)]
    pub playback_delay: f32,
}

impl Args {
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(SESSION_DIR_NAME)
        })
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.session_dir().join(LOG_FILE_NAME))
    }

    // Starting settings for a track that has never been opened before
    pub fn default_settings(&self) -> Settings {
        let delay = if self.playback_delay.is_finite() { self.playback_delay } else { 0.0 };
        Settings {
            playback_delay: delay.clamp(PLAYBACK_DELAY_RANGE.0, PLAYBACK_DELAY_RANGE.1),
            ..Settings::default()
        }
    }
}
