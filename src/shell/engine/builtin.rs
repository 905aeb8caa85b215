//! Builtin command bodies. Each returns `Ok(status)` or a `ShellError` that
//! the dispatcher reports as `smash error: <command>: <message>`.

use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::{Duration, Instant},
};

use nix::{
    sys::{
        signal::{self, Signal},
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{self, Pid},
};

use super::{
    dispatcher::Dispatcher,
    job::{JobId, JobState},
    CmdResult,
};
use crate::shell::{
    error::{ShellError, ShellResult},
    parser::Cmd,
    syscall,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ShowPid,
    Pwd,
    Cd,
    Jobs,
    Kill,
    Fg,
    Bg,
    Quit,
    Diff,
    Alias,
    Unalias,
}

impl FromStr for Builtin {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "showpid" => Builtin::ShowPid,
            "pwd" => Builtin::Pwd,
            "cd" => Builtin::Cd,
            "jobs" => Builtin::Jobs,
            "kill" => Builtin::Kill,
            "fg" => Builtin::Fg,
            "bg" => Builtin::Bg,
            "quit" => Builtin::Quit,
            "diff" => Builtin::Diff,
            "alias" => Builtin::Alias,
            "unalias" => Builtin::Unalias,
            _ => return Err(()),
        })
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl<W: Write> Dispatcher<W> {
    pub(super) fn run_builtin(&mut self, builtin: Builtin, cmd: &Cmd) -> ShellResult<CmdResult> {
        match builtin {
            Builtin::ShowPid => self.run_showpid(cmd),
            Builtin::Pwd => self.run_pwd(cmd),
            Builtin::Cd => self.run_cd(cmd),
            Builtin::Jobs => self.run_jobs(cmd),
            Builtin::Kill => self.run_kill(cmd),
            Builtin::Fg => self.run_fg(cmd),
            Builtin::Bg => self.run_bg(cmd),
            Builtin::Quit => self.run_quit(cmd),
            Builtin::Diff => self.run_diff(cmd),
            Builtin::Alias => self.run_alias(cmd),
            Builtin::Unalias => self.run_unalias(cmd),
        }
    }

    fn run_showpid(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 0)?;
        self.say(format_args!("smash pid is {}", unistd::getpid()))?;
        Ok(CmdResult::Success)
    }

    fn run_pwd(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 0)?;
        let cwd = env::current_dir().map_err(|e| ShellError::io("pwd", e))?;
        self.say(format_args!("{}", cwd.display()))?;
        Ok(CmdResult::Success)
    }

    fn run_cd(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 1)?;
        let arg = &cmd.args[0];
        let target = if arg == "-" {
            self.prev_dir
                .clone()
                .ok_or_else(|| ShellError::lookup("cd", "old pwd not set"))?
        } else {
            PathBuf::from(arg)
        };

        if !target.exists() {
            return Err(ShellError::lookup("cd", "target directory does not exist"));
        }
        if !target.is_dir() {
            return Err(ShellError::argument("cd", format!("{}: not a directory", arg)));
        }

        let here = env::current_dir().map_err(|e| ShellError::io("cd", e))?;
        env::set_current_dir(&target).map_err(|e| ShellError::io("cd", e))?;
        self.prev_dir = Some(here);
        Ok(CmdResult::Success)
    }

    fn run_jobs(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 0)?;
        for job in self.jobs.list_all() {
            writeln!(self.out, "{}", job).map_err(|e| ShellError::io("jobs", e))?;
        }
        Ok(CmdResult::Success)
    }

    fn run_kill(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        let invalid = || ShellError::argument("kill", "invalid arguments");
        let [signum, job_id] = cmd.args.as_slice() else {
            return Err(invalid());
        };
        let signum = signum.strip_prefix('-').unwrap_or(signum.as_str());
        if !is_number(signum) || !is_number(job_id) {
            return Err(invalid());
        }
        let signum: i32 = signum.parse().map_err(|_| invalid())?;
        let id: JobId = job_id.parse().map_err(|_| invalid())?;

        let pid = self
            .jobs
            .find_by_id(id)
            .map(|job| job.pid)
            .ok_or_else(|| ShellError::lookup("kill", format!("job id {} does not exist", id)))?;
        let sig = Signal::try_from(signum).map_err(|_| invalid())?;

        signal::kill(pid, sig)
            .map_err(|e| ShellError::signal("kill", format!("failed to send signal {}", signum), e))?;
        self.say(format_args!("signal {} was sent to pid {}", signum, pid))?;

        if let Some(job) = self.jobs.get_mut(id) {
            match sig {
                Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                    job.state = JobState::Stopped
                }
                Signal::SIGCONT => job.state = JobState::Background,
                _ => {}
            }
        }
        Ok(CmdResult::Success)
    }

    fn run_fg(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        let job = match cmd.args.as_slice() {
            [] => self
                .jobs
                .find_most_recent(None)
                .ok_or_else(|| ShellError::lookup("fg", "jobs list is empty"))?,
            [arg] => {
                let id = parse_job_id("fg", arg)?;
                self.jobs
                    .find_by_id(id)
                    .ok_or_else(|| ShellError::lookup("fg", format!("job id {} does not exist", id)))?
            }
            _ => return Err(ShellError::argument("fg", "invalid arguments")),
        };
        let (id, pid, state, command) = (job.id, job.pid, job.state, job.command.clone());

        self.say(format_args!("{}: {}", command, pid))?;
        if state == JobState::Stopped {
            signal::kill(pid, Signal::SIGCONT)
                .map_err(|e| ShellError::signal("fg", "failed to continue job", e))?;
        }
        self.jobs.remove(id);
        self.wait_in_foreground(pid, &command)
    }

    fn run_bg(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        let job = match cmd.args.as_slice() {
            [] => self
                .jobs
                .find_most_recent(Some(JobState::Stopped))
                .ok_or_else(|| ShellError::lookup("bg", "there are no stopped jobs to resume"))?,
            [arg] => {
                let id = parse_job_id("bg", arg)?;
                let job = self
                    .jobs
                    .find_by_id(id)
                    .ok_or_else(|| ShellError::lookup("bg", format!("job id {} does not exist", id)))?;
                if job.state != JobState::Stopped {
                    return Err(ShellError::argument(
                        "bg",
                        format!("job id {} is already in background", id),
                    ));
                }
                job
            }
            _ => return Err(ShellError::argument("bg", "invalid arguments")),
        };
        let (id, pid, command) = (job.id, job.pid, job.command.clone());

        self.say(format_args!("{}: {}", command, pid))?;
        signal::kill(pid, Signal::SIGCONT)
            .map_err(|e| ShellError::signal("bg", "failed to continue job", e))?;
        if let Some(job) = self.jobs.get_mut(id) {
            job.state = JobState::Background;
        }
        Ok(CmdResult::Success)
    }

    fn run_quit(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        match cmd.args.as_slice() {
            [] => Ok(CmdResult::Quit),
            [arg] if arg == "kill" => {
                self.kill_all();
                Ok(CmdResult::Quit)
            }
            _ => Err(ShellError::argument("quit", "unexpected arguments")),
        }
    }

    /// SIGTERM every job, escalating to SIGKILL after the grace period.
    /// The table is empty afterwards whatever the individual outcomes.
    fn kill_all(&mut self) {
        for job in self.jobs.drain() {
            let _ = write!(self.out, "[{}] {} - sending SIGTERM... ", job.id, job.command);
            let _ = self.out.flush();

            if let Err(e) = signal::kill(job.pid, Signal::SIGTERM) {
                let _ = writeln!(self.out);
                self.report(ShellError::signal(
                    "quit",
                    format!("failed to terminate pid {}", job.pid),
                    e,
                ));
                continue;
            }
            if job.state == JobState::Stopped {
                // A stopped process only acts on SIGTERM once resumed
                let _ = signal::kill(job.pid, Signal::SIGCONT);
            }

            if !await_exit(job.pid, self.kill_grace) {
                let _ = write!(self.out, "sending SIGKILL... ");
                match signal::kill(job.pid, Signal::SIGKILL) {
                    Ok(()) => {
                        let _ = syscall(|| wait::waitpid(job.pid, None));
                    }
                    Err(e) => {
                        self.report(ShellError::signal(
                            "quit",
                            format!("failed to kill pid {}", job.pid),
                            e,
                        ));
                    }
                }
            }
            let _ = writeln!(self.out, "done");
            tracing::debug!(id = %job.id, pid = %job.pid, "job terminated on quit");
        }
    }

    fn run_diff(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 2)?;
        let (a, b) = (Path::new(&cmd.args[0]), Path::new(&cmd.args[1]));
        if !a.exists() || !b.exists() {
            return Err(ShellError::lookup("diff", "expected valid paths for files"));
        }
        if !a.is_file() || !b.is_file() {
            return Err(ShellError::argument("diff", "paths are not files"));
        }

        let same = same_bytes(a, b).map_err(|e| ShellError::io("diff", e))?;
        self.say(format_args!("{}", if same { 1 } else { 0 }))?;
        Ok(CmdResult::Success)
    }

    fn run_alias(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        if cmd.args.is_empty() {
            for (name, expansion) in self.aliases.iter() {
                writeln!(self.out, "{}='{}'", name, expansion).map_err(|e| ShellError::io("alias", e))?;
            }
            return Ok(CmdResult::Success);
        }
        // `alias ll=ls -l` arrives as two words
        self.aliases.define(&cmd.args.join(" "))?;
        Ok(CmdResult::Success)
    }

    fn run_unalias(&mut self, cmd: &Cmd) -> ShellResult<CmdResult> {
        expect_args(cmd, 1)?;
        self.aliases.remove(&cmd.args[0])?;
        Ok(CmdResult::Success)
    }

    fn say(&mut self, line: std::fmt::Arguments) -> ShellResult<()> {
        writeln!(self.out, "{}", line).map_err(|e| ShellError::io("write", e))
    }
}

fn expect_args(cmd: &Cmd, n: usize) -> ShellResult<()> {
    if cmd.args.len() == n {
        return Ok(());
    }
    let plural = if n == 1 { "argument" } else { "arguments" };
    Err(ShellError::argument(&cmd.name, format!("expected {} {}", n, plural)))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_job_id(cmd: &str, arg: &str) -> ShellResult<JobId> {
    if !is_number(arg) {
        return Err(ShellError::argument(cmd, "invalid arguments"));
    }
    arg.parse()
        .map_err(|_| ShellError::argument(cmd, "invalid arguments"))
}

fn same_bytes(a: &Path, b: &Path) -> std::io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(fs::read(a)? == fs::read(b)?)
}

/// Polls `pid` until it is gone or `grace` elapses. True if it exited.
fn await_exit(pid: Pid, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        match wait::waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return true,
            Err(nix::Error::ECHILD) => return true,
            Err(nix::Error::EINTR) => continue,
            Err(e) => {
                tracing::warn!(%pid, error = %e, "waitpid failed during quit");
                return false;
            }
            Ok(_) => {}
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        assert_eq!("fg".parse::<Builtin>(), Ok(Builtin::Fg));
        assert_eq!("showpid".parse::<Builtin>(), Ok(Builtin::ShowPid));
        assert!("ls".parse::<Builtin>().is_err());
    }

    #[test]
    fn numbers() {
        assert!(is_number("0"));
        assert!(is_number("15"));
        assert!(!is_number(""));
        assert!(!is_number("-1"));
        assert!(!is_number("1a"));
    }
}
