use std::{sync::Arc, thread::JoinHandle};

use anyhow::Result;
use nix::{
    libc::c_int,
    sys::signal::{self, signal, SigHandler, Signal},
    unistd::Pid,
};
use signal_hook::{
    consts::signal::{SIGINT, SIGTSTP},
    iterator::{Handle, Signals},
};

use super::foreground::{Foreground, SignalEvent, SignalKind};

/// What the bridge did with one terminal signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Idle,
    Forwarded(Pid),
    Failed(Pid, nix::Error),
}

/// Catches Ctrl-C / Ctrl-Z on a dedicated thread and forwards them to the
/// foreground process. Registrations stay armed until the bridge is dropped.
pub struct SignalBridge {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalBridge {
    pub fn install(fg: Arc<Foreground>) -> Result<Self> {
        // Ignore SIGTTOU (signal when background process writes to the terminal)
        unsafe { signal(Signal::SIGTTOU, SigHandler::SigIgn) }?;

        let mut signals = Signals::new([SIGINT, SIGTSTP])?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for sig in signals.forever() {
                if let Some(kind) = kind_of(sig) {
                    deliver(&fg, kind);
                }
            }
        });
        tracing::debug!("signal bridge installed");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn kind_of(sig: c_int) -> Option<SignalKind> {
    match sig {
        SIGINT => Some(SignalKind::Interrupt),
        SIGTSTP => Some(SignalKind::Stop),
        _ => None,
    }
}

/// Forwards one terminal signal to the foreground process, if any.
///
/// Touches nothing but the atomic slot, the pending-event cell and `kill(2)`;
/// the job table is updated by the dispatcher once its wait returns.
pub fn deliver(fg: &Foreground, kind: SignalKind) -> Delivery {
    let (key, forward, verb) = match kind {
        SignalKind::Interrupt => ("C", Signal::SIGKILL, "killed"),
        SignalKind::Stop => ("Z", Signal::SIGSTOP, "stopped"),
    };
    println!("smash: caught CTRL+{}", key);

    let Some(pid) = fg.take() else {
        return Delivery::Idle;
    };
    if let Err(e) = signal::kill(pid, forward) {
        eprintln!("smash error: kill failed: {}", e);
        tracing::warn!(%pid, signal = %forward, error = %e, "forwarding failed");
        return Delivery::Failed(pid, e);
    }
    fg.post(SignalEvent { kind, pid });
    println!("smash: process {} was {}", pid, verb);
    Delivery::Forwarded(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::engine::process::{spawn_external, wait_foreground, WaitOutcome};

    #[test]
    fn idle_signal_does_nothing() {
        let fg = Foreground::new();
        assert_eq!(deliver(&fg, SignalKind::Interrupt), Delivery::Idle);
        assert_eq!(deliver(&fg, SignalKind::Stop), Delivery::Idle);
        assert_eq!(fg.take_event(), None);
    }

    #[test]
    fn interrupt_kills_the_foreground_process() {
        let fg = Foreground::new();
        let pid = spawn_external(&["sleep", "30"]).unwrap();
        fg.set(pid);

        assert_eq!(deliver(&fg, SignalKind::Interrupt), Delivery::Forwarded(pid));
        assert_eq!(fg.current(), None);
        assert_eq!(
            fg.take_event(),
            Some(SignalEvent {
                kind: SignalKind::Interrupt,
                pid
            })
        );
        assert_eq!(
            wait_foreground(&fg, pid, "sleep").unwrap(),
            WaitOutcome::Signaled(Signal::SIGKILL)
        );
    }

    #[test]
    fn stop_suspends_the_foreground_process() {
        let fg = Foreground::new();
        let pid = spawn_external(&["sleep", "30"]).unwrap();
        fg.set(pid);

        assert_eq!(deliver(&fg, SignalKind::Stop), Delivery::Forwarded(pid));
        assert_eq!(
            wait_foreground(&fg, pid, "sleep").unwrap(),
            WaitOutcome::Stopped(Signal::SIGSTOP)
        );

        signal::kill(pid, Signal::SIGKILL).unwrap();
        let _ = wait_foreground(&fg, pid, "sleep");
    }

    #[test]
    fn failed_delivery_is_reported() {
        let fg = Foreground::new();
        // Above any pid_max, so no such process
        let pid = Pid::from_raw(i32::MAX);
        fg.set(pid);
        assert!(matches!(
            deliver(&fg, SignalKind::Interrupt),
            Delivery::Failed(p, nix::Error::ESRCH) if p == pid
        ));
        assert_eq!(fg.take_event(), None);
    }
}
