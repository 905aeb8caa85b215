use std::{io, sync::Arc};

use anyhow::Result;
use rustyline::error::ReadlineError;

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;

use config::Config;
use engine::{CmdResult, Dispatcher, Foreground, SignalBridge};

/// Retries a system call interrupted by a signal.
pub(crate) fn syscall<F, T>(f: F) -> Result<T, nix::Error>
where
    F: Fn() -> Result<T, nix::Error>,
{
    loop {
        match f() {
            Err(nix::errno::Errno::EINTR) => continue,
            other => return other,
        }
    }
}

#[derive(Debug)]
pub struct Shell {
    config: Config,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Read-eval loop. Returns once a command reports `Quit` or input ends.
    pub fn run(&self) -> Result<()> {
        let fg = Arc::new(Foreground::new());
        let _bridge = SignalBridge::install(Arc::clone(&fg))?;
        let mut dispatcher =
            Dispatcher::new(fg, io::stdout()).with_kill_grace(self.config.kill_grace);

        let mut rl = rustyline::Editor::<()>::new()?;
        if let Some(history) = &self.config.history_file {
            if let Err(e) = rl.load_history(history) {
                tracing::debug!("unable to load history: {}", e);
            }
        }

        loop {
            match rl.readline(&self.config.prompt) {
                Ok(line) => {
                    let line_trimmed = line.trim();
                    if line_trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line_trimmed);

                    if dispatcher.execute_line(line_trimmed) == CmdResult::Quit {
                        break;
                    }
                }
                // The editor holds the terminal in raw mode, so Ctrl-C/Ctrl-Z at
                // the prompt never reach the bridge
                Err(ReadlineError::Interrupted) => println!("smash: caught CTRL+C"),
                Err(ReadlineError::Eof) => {
                    dispatcher.execute_line("quit");
                    break;
                }
                Err(e) => {
                    eprintln!("smash error: {}", e);
                    break;
                }
            }
        }

        if let Some(history) = &self.config.history_file {
            if let Err(e) = rl.save_history(history) {
                tracing::warn!("unable to save history: {}", e);
            }
        }
        Ok(())
    }
}
