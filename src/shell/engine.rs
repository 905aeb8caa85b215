mod builtin;
mod dispatcher;
mod foreground;
mod job;
mod process;
mod signal;

pub use builtin::Builtin;
pub use dispatcher::{Dispatcher, DEFAULT_KILL_GRACE};
pub use foreground::{Foreground, SignalEvent, SignalKind};
pub use job::{Job, JobId, JobState, JobTable, CMD_LENGTH_MAX, JOBS_NUM_MAX};
pub use process::{spawn_builtin_background, spawn_external, wait_foreground, WaitOutcome, EXEC_FAILED};
pub use signal::{deliver, Delivery, SignalBridge};

/// Status of one command, handed back to the REPL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdResult {
    Success,
    Fail,
    Quit, // Stop the REPL loop
}

impl CmdResult {
    /// Exit status used when a builtin runs in a background child.
    pub fn exit_code(self) -> i32 {
        match self {
            CmdResult::Success | CmdResult::Quit => 0,
            CmdResult::Fail => 1,
        }
    }
}
