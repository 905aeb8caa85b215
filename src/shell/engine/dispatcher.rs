use std::{
    io::Write,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use nix::{
    sys::{
        signal::{self, Signal},
        wait,
    },
    unistd::Pid,
};

use super::{
    builtin::Builtin,
    foreground::{Foreground, SignalKind},
    job::{JobState, JobTable, JOBS_NUM_MAX},
    process::{self, WaitOutcome},
    CmdResult,
};
use crate::shell::{
    alias::AliasTable,
    error::{ShellError, ShellResult},
    parser::{parse_cmd, split_chain, Cmd},
    syscall,
};

/// How long `quit kill` waits after SIGTERM before sending SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs commands and owns the job table. Builtin output goes to `out`.
#[derive(Debug)]
pub struct Dispatcher<W: Write> {
    pub(super) jobs: JobTable,
    pub(super) fg: Arc<Foreground>,
    pub(super) aliases: AliasTable,
    pub(super) prev_dir: Option<PathBuf>, // For `cd -`
    pub(super) kill_grace: Duration,
    pub(super) out: W,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(fg: Arc<Foreground>, out: W) -> Self {
        Self {
            jobs: JobTable::new(),
            fg,
            aliases: AliasTable::new(),
            prev_dir: None,
            kill_grace: DEFAULT_KILL_GRACE,
            out,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn foreground(&self) -> &Arc<Foreground> {
        &self.fg
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Runs a full input line: aliases, then `&&` chaining. Stops at the
    /// first command that does not succeed and returns its status.
    pub fn execute_line(&mut self, line: &str) -> CmdResult {
        let parts = split_chain(line);
        let chained = parts.len() > 1;
        for part in parts {
            let expanded = self.aliases.expand(part).into_owned();
            let result = match parse_cmd(&expanded) {
                Ok(Some(cmd)) => self.execute(&cmd),
                Ok(None) if chained => self.report(ShellError::parse("&&", "missing command")),
                Ok(None) => CmdResult::Success,
                Err(e) => self.report(e),
            };
            if result != CmdResult::Success {
                return result;
            }
        }
        CmdResult::Success
    }

    /// Runs one parsed command.
    pub fn execute(&mut self, cmd: &Cmd) -> CmdResult {
        self.drain_signal_event();
        self.jobs.reap_finished();

        let result = match cmd.name.parse::<Builtin>() {
            Ok(builtin) if cmd.background => self.spawn_builtin(builtin, cmd),
            Ok(builtin) => self.run_builtin(builtin, cmd),
            Err(()) => self.run_external(cmd),
        };
        result.unwrap_or_else(|e| self.report(e))
    }

    /// Prints a recoverable error and turns it into `Fail`.
    pub(super) fn report(&mut self, err: ShellError) -> CmdResult {
        eprintln!("smash error: {}", err);
        tracing::debug!(error = ?err, "command failed");
        CmdResult::Fail
    }

    fn spawn_builtin(&mut self, builtin: Builtin, cmd: &Cmd) -> ShellResult<CmdResult> {
        self.ensure_capacity(cmd)?;
        let pid = process::spawn_builtin_background(&cmd.name, || {
            match self.run_builtin(builtin, cmd) {
                Ok(result) => result.exit_code(),
                Err(e) => self.report(e).exit_code(),
            }
        })?;
        self.jobs.insert(pid, &cmd.text, JobState::Background)?;
        Ok(CmdResult::Success)
    }

    fn run_external(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        if cmd.background {
            self.ensure_capacity(cmd)?;
        }
        let pid = process::spawn_external(&cmd.argv())?;
        if cmd.background {
            self.jobs.insert(pid, &cmd.text, JobState::Background)?;
            return Ok(CmdResult::Success);
        }
        self.wait_in_foreground(pid, &cmd.text)
    }

    /// Hands the foreground to `pid` until it exits or stops. A stopped
    /// process goes (back) into the job table.
    pub(super) fn wait_in_foreground(&mut self, pid: Pid, command: &str) -> ShellResult<CmdResult> {
        let outcome = process::wait_foreground(&self.fg, pid, command)?;
        // Ctrl-C fails the command even when the process exited on its own
        // before the kill landed
        let interrupted = match self.fg.take_event() {
            Some(event) if event.pid == pid => {
                tracing::debug!(?event, ?outcome, "foreground signal handled");
                event.kind == SignalKind::Interrupt
            }
            Some(event) => {
                tracing::debug!(?event, %pid, "signal event for another process dropped");
                false
            }
            None => false,
        };

        match outcome {
            WaitOutcome::Stopped(_) => self.track_stopped(pid, command),
            _ if interrupted => Ok(CmdResult::Fail),
            outcome if outcome.success() => Ok(CmdResult::Success),
            _ => Ok(CmdResult::Fail),
        }
    }

    /// Puts a stopped process into the job table. If the table is full the
    /// process could never be resumed, so it is killed and reaped instead.
    fn track_stopped(&mut self, pid: Pid, command: &str) -> ShellResult<CmdResult> {
        match self.jobs.insert(pid, command, JobState::Stopped) {
            Ok(id) => {
                tracing::debug!(%id, %pid, "foreground process stopped");
                Ok(CmdResult::Success)
            }
            Err(err) => {
                tracing::warn!(%pid, "job table full, killing stopped process");
                if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
                    tracing::warn!(%pid, error = %e, "failed to kill stopped process");
                }
                let _ = syscall(|| wait::waitpid(pid, None));
                Err(err)
            }
        }
    }

    fn ensure_capacity(&self, cmd: &Cmd) -> ShellResult<()> {
        if self.jobs.len() >= JOBS_NUM_MAX {
            return Err(ShellError::lookup(&cmd.name, "too many jobs"));
        }
        Ok(())
    }

    /// Drops a signal record that no foreground wait claimed.
    fn drain_signal_event(&self) {
        if let Some(event) = self.fg.take_event() {
            tracing::debug!(?event, "stale signal event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::engine::{deliver, Delivery, SignalEvent};

    fn dispatcher() -> Dispatcher<Vec<u8>> {
        Dispatcher::new(Arc::new(Foreground::new()), Vec::new())
    }

    fn stdout(d: &Dispatcher<Vec<u8>>) -> String {
        String::from_utf8_lossy(d.output()).into_owned()
    }

    #[test]
    fn builtins_run_in_process() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("showpid"), CmdResult::Success);
        assert_eq!(
            stdout(&d),
            format!("smash pid is {}\n", std::process::id())
        );
    }

    #[test]
    fn arity_errors_fail() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("showpid now"), CmdResult::Fail);
        assert_eq!(d.execute_line("jobs -l"), CmdResult::Fail);
        assert_eq!(d.execute_line("kill 9"), CmdResult::Fail);
        assert_eq!(d.execute_line("kill x 0"), CmdResult::Fail);
        assert_eq!(d.execute_line("unalias"), CmdResult::Fail);
        assert!(stdout(&d).is_empty());
    }

    #[test]
    fn quit_stops_the_chain() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("quit && showpid"), CmdResult::Quit);
        assert!(stdout(&d).is_empty());
        assert_eq!(d.execute_line("quit now"), CmdResult::Fail);
    }

    #[test]
    fn empty_chain_member_is_a_parse_error() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("showpid &&"), CmdResult::Fail);
        assert_eq!(d.execute_line("   "), CmdResult::Success);
        assert_eq!(d.execute_line("echo 'open"), CmdResult::Fail);
    }

    #[test]
    fn aliases_expand_per_segment() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("alias me='showpid'"), CmdResult::Success);
        assert_eq!(d.execute_line("alias"), CmdResult::Success);
        assert_eq!(d.execute_line("me && me"), CmdResult::Success);
        let pid_line = format!("smash pid is {}\n", std::process::id());
        assert_eq!(stdout(&d), format!("me='showpid'\n{}{}", pid_line, pid_line));

        assert_eq!(d.execute_line("unalias me"), CmdResult::Success);
        assert_eq!(d.execute_line("unalias me"), CmdResult::Fail);
        assert!(d.aliases().get("me").is_none());
    }

    #[test]
    fn stopped_process_is_not_leaked_when_the_table_is_full() {
        let mut d = dispatcher();
        for n in 0..JOBS_NUM_MAX {
            let placeholder = Pid::from_raw(4_000_000 + n as i32);
            d.jobs.insert(placeholder, "placeholder", JobState::Background).unwrap();
        }

        let pid = process::spawn_external(&["sleep", "30"]).unwrap();
        d.fg.set(pid);
        assert_eq!(deliver(&d.fg, SignalKind::Stop), Delivery::Forwarded(pid));

        assert!(matches!(
            d.wait_in_foreground(pid, "sleep 30"),
            Err(ShellError::Lookup { .. })
        ));
        assert!(d.jobs().find_by_pid(pid).is_none());
        assert_eq!(d.jobs().len(), JOBS_NUM_MAX);
        assert_eq!(signal::kill(pid, None), Err(nix::Error::ESRCH));
        assert_eq!(d.foreground().current(), None);
    }

    #[test]
    fn interrupt_event_decides_the_result() {
        let mut d = dispatcher();

        let pid = process::spawn_external(&["true"]).unwrap();
        d.fg.post(SignalEvent { kind: SignalKind::Interrupt, pid });
        assert_eq!(d.wait_in_foreground(pid, "true").unwrap(), CmdResult::Fail);

        // An event recorded for some other process has no say
        let pid = process::spawn_external(&["true"]).unwrap();
        d.fg.post(SignalEvent {
            kind: SignalKind::Interrupt,
            pid: Pid::from_raw(1),
        });
        assert_eq!(d.wait_in_foreground(pid, "true").unwrap(), CmdResult::Success);
        assert_eq!(d.fg.take_event(), None);
    }

    #[test]
    fn fg_and_bg_without_jobs() {
        let mut d = dispatcher();
        assert_eq!(d.execute_line("fg"), CmdResult::Fail);
        assert_eq!(d.execute_line("fg 3"), CmdResult::Fail);
        assert_eq!(d.execute_line("bg"), CmdResult::Fail);
        assert_eq!(d.execute_line("bg x"), CmdResult::Fail);
        assert_eq!(d.execute_line("kill 9 0"), CmdResult::Fail);
        assert_eq!(d.foreground().current(), None);
    }
}
