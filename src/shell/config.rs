use std::{path::PathBuf, time::Duration};

use clap::Parser;

use super::engine::DEFAULT_KILL_GRACE;

const HISTORY_FILE: &str = ".smash_history";

/// Command-line flags of the `smash` binary.
#[derive(Debug, Parser)]
#[command(name = "smash", version, about = "A small job-control shell")]
pub struct Args {
    /// History file (defaults to ~/.smash_history)
    #[arg(long, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Do not load or save line history
    #[arg(long, conflicts_with = "history")]
    pub no_history: bool,

    /// Milliseconds `quit kill` waits after SIGTERM before sending SIGKILL
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_KILL_GRACE.as_millis() as u64)]
    pub kill_grace_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub history_file: Option<PathBuf>,
    pub kill_grace: Duration,
    pub prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_file: Some(default_history_file()),
            kill_grace: DEFAULT_KILL_GRACE,
            prompt: "smash > ".to_string(),
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let history_file = if args.no_history {
            None
        } else {
            Some(args.history.unwrap_or_else(default_history_file))
        };
        Self {
            history_file,
            kill_grace: Duration::from_millis(args.kill_grace_ms),
            ..Self::default()
        }
    }
}

fn default_history_file() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}
