//! The foreground slot shared between the dispatcher and the signal bridge.
//!
//! Both fields are plain atomics so the bridge never takes a lock: the pid
//! slot holds `0` when the shell owns the terminal, and the pending cell
//! packs one [`SignalEvent`] into a `u64` (kind in the high half, pid in the
//! low half, `0` meaning empty).

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use nix::unistd::Pid;

const NO_PROCESS: i32 = 0;
const NO_EVENT: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt, // Ctrl-C
    Stop,      // Ctrl-Z
}

impl SignalKind {
    fn code(self) -> u64 {
        match self {
            SignalKind::Interrupt => 1,
            SignalKind::Stop => 2,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(SignalKind::Interrupt),
            2 => Some(SignalKind::Stop),
            _ => None,
        }
    }
}

/// A terminal signal the bridge forwarded to a foreground process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub pid: Pid,
}

impl SignalEvent {
    fn pack(self) -> u64 {
        (self.kind.code() << 32) | u64::from(self.pid.as_raw() as u32)
    }

    fn unpack(raw: u64) -> Option<Self> {
        let kind = SignalKind::from_code(raw >> 32)?;
        Some(SignalEvent {
            kind,
            pid: Pid::from_raw(raw as u32 as i32),
        })
    }
}

#[derive(Debug, Default)]
pub struct Foreground {
    pid: AtomicI32,
    pending: AtomicU64,
}

impl Foreground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pid: Pid) {
        self.pid.store(pid.as_raw(), Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.pid.store(NO_PROCESS, Ordering::SeqCst);
    }

    pub fn current(&self) -> Option<Pid> {
        match self.pid.load(Ordering::SeqCst) {
            NO_PROCESS => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }

    /// Empties the slot, returning whoever held it.
    pub fn take(&self) -> Option<Pid> {
        match self.pid.swap(NO_PROCESS, Ordering::SeqCst) {
            NO_PROCESS => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }

    /// Records an event, replacing any undrained one.
    pub fn post(&self, event: SignalEvent) {
        self.pending.store(event.pack(), Ordering::SeqCst);
    }

    pub fn take_event(&self) -> Option<SignalEvent> {
        SignalEvent::unpack(self.pending.swap(NO_EVENT, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_set_take_clear() {
        let fg = Foreground::new();
        assert_eq!(fg.current(), None);

        fg.set(Pid::from_raw(1234));
        assert_eq!(fg.current(), Some(Pid::from_raw(1234)));
        assert_eq!(fg.take(), Some(Pid::from_raw(1234)));
        assert_eq!(fg.take(), None);

        fg.set(Pid::from_raw(77));
        fg.clear();
        assert_eq!(fg.current(), None);
    }

    #[test]
    fn events_round_trip_once() {
        let fg = Foreground::new();
        assert_eq!(fg.take_event(), None);

        let event = SignalEvent {
            kind: SignalKind::Stop,
            pid: Pid::from_raw(4_194_303),
        };
        fg.post(event);
        assert_eq!(fg.take_event(), Some(event));
        assert_eq!(fg.take_event(), None);
    }
}
