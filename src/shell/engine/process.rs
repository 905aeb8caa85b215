use std::{
    ffi::CString,
    io::{self, Write},
    os::unix::ffi::OsStrExt,
    path::PathBuf,
};

use nix::{
    libc,
    sys::{
        signal::{signal, SigHandler, Signal},
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{self, ForkResult, Pid},
};

use super::foreground::Foreground;
use crate::{
    helper::Defer,
    shell::{
        error::{ShellError, ShellResult},
        syscall,
    },
};

/// Exit status of a child whose `execvp` failed.
pub const EXEC_FAILED: i32 = 127;

/// How a foreground wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    Signaled(Signal),
    Stopped(Signal),
}

impl WaitOutcome {
    /// A stopped child counts as success; it lives on in the job table.
    pub fn success(self) -> bool {
        match self {
            WaitOutcome::Exited(code) => code == 0,
            WaitOutcome::Signaled(_) => false,
            WaitOutcome::Stopped(_) => true,
        }
    }
}

/// Locates the program image: paths are taken as-is, bare names go through `PATH`.
pub fn resolve(program: &str) -> ShellResult<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return if path.exists() {
            Ok(path)
        } else {
            Err(ShellError::launch(program, "command not found"))
        };
    }
    which::which(program).map_err(|_| ShellError::launch(program, "command not found"))
}

/// Forks and execs `argv[0]` in a new process group of its own.
pub fn spawn_external(argv: &[&str]) -> ShellResult<Pid> {
    let name = argv.first().copied().unwrap_or_default();
    let path = resolve(name)?;

    // Everything the child needs is built before fork
    let filename = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ShellError::launch(name, "invalid program path"))?;
    let args = argv
        .iter()
        .map(|s| CString::new(*s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ShellError::launch(name, "argument contains a NUL byte"))?;
    let failure = format!("smash error: {}: execvp failed\n", name);

    flush_stdout();
    match syscall(|| unsafe { unistd::fork() }) {
        Ok(ForkResult::Parent { child }) => {
            // Also done by the child; whichever runs first wins the race
            let _ = unistd::setpgid(child, child);
            tracing::debug!(pid = %child, program = %path.display(), "spawned");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
            restore_child_signals();
            let _ = unistd::execvp(&filename, &args);
            let _ = unistd::write(libc::STDERR_FILENO, failure.as_bytes());
            std::process::exit(EXEC_FAILED);
        }
        Err(e) => Err(ShellError::launch(name, format!("fork failed: {}", e))),
    }
}

/// Forks and runs `f` in the child, which exits with the returned status.
pub fn spawn_builtin_background<F>(name: &str, f: F) -> ShellResult<Pid>
where
    F: FnOnce() -> i32,
{
    flush_stdout();
    // The child keeps running Rust code, so the signal bridge must not own a
    // stdio lock at the instant of the fork. Both locks are reentrant, which
    // lets `f` print while the child still holds them.
    let stdio = (io::stdout().lock(), io::stderr().lock());
    match syscall(|| unsafe { unistd::fork() }) {
        Ok(ForkResult::Parent { child }) => {
            drop(stdio);
            let _ = unistd::setpgid(child, child);
            tracing::debug!(pid = %child, builtin = name, "spawned builtin");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            let _ = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
            restore_child_signals();
            let code = f();
            drop(stdio);
            flush_stdout();
            std::process::exit(code);
        }
        Err(e) => Err(ShellError::launch(name, format!("fork failed: {}", e))),
    }
}

/// Blocks until `pid` exits, is killed or stops. The foreground slot holds
/// `pid` for exactly the duration of the wait.
pub fn wait_foreground(fg: &Foreground, pid: Pid, cmd: &str) -> ShellResult<WaitOutcome> {
    fg.set(pid);
    let _clear = Defer::new(|| fg.clear());

    loop {
        match syscall(|| wait::waitpid(pid, Some(WaitPidFlag::WUNTRACED))) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(WaitOutcome::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(WaitOutcome::Signaled(sig)),
            Ok(WaitStatus::Stopped(_, sig)) => return Ok(WaitOutcome::Stopped(sig)),
            Ok(_) => continue,
            Err(e) => {
                return Err(ShellError::launch(cmd, format!("waitpid failed: {}", e)))
            }
        }
    }
}

/// Undoes the shell's own dispositions so the child reacts to signals normally.
fn restore_child_signals() {
    for sig in [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGTTOU] {
        let _ = unsafe { signal(sig, SigHandler::SigDfl) };
    }
}

fn flush_stdout() {
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_success() {
        assert!(WaitOutcome::Exited(0).success());
        assert!(!WaitOutcome::Exited(3).success());
        assert!(!WaitOutcome::Signaled(Signal::SIGKILL).success());
        assert!(WaitOutcome::Stopped(Signal::SIGSTOP).success());
    }

    #[test]
    fn resolve_rejects_unknown_programs() {
        assert!(resolve("sh").is_ok());
        assert!(matches!(
            resolve("definitely_not_a_real_command_12345"),
            Err(ShellError::Launch { .. })
        ));
        assert!(resolve("/no/such/dir/prog").is_err());
    }

    #[test]
    fn foreground_wait_reports_exit_and_clears_slot() {
        let fg = Foreground::new();
        let pid = spawn_external(&["sh", "-c", "exit 3"]).unwrap();
        assert_eq!(wait_foreground(&fg, pid, "test").unwrap(), WaitOutcome::Exited(3));
        assert_eq!(fg.current(), None);
    }

    #[test]
    fn builtin_child_exit_status() {
        let fg = Foreground::new();
        let pid = spawn_builtin_background("test", || 5).unwrap();
        assert_eq!(wait_foreground(&fg, pid, "test").unwrap(), WaitOutcome::Exited(5));
    }

    #[test]
    fn builtin_child_can_print_while_another_thread_prints() {
        let fg = Foreground::new();
        let chatter = std::thread::spawn(|| {
            for _ in 0..200 {
                let _ = writeln!(io::stdout(), "smash: caught CTRL+Z");
            }
        });
        let pids: Vec<Pid> = (0..20)
            .map(|_| {
                spawn_builtin_background("showpid", || {
                    let _ = writeln!(io::stdout(), "smash pid is {}", unistd::getpid());
                    0
                })
                .unwrap()
            })
            .collect();
        chatter.join().unwrap();

        for pid in pids {
            assert_eq!(wait_foreground(&fg, pid, "showpid").unwrap(), WaitOutcome::Exited(0));
        }
    }
}
