use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    str::FromStr,
    time::Instant,
};

use nix::{
    sys::wait::{self, WaitPidFlag, WaitStatus},
    unistd::Pid,
};

use crate::shell::error::{ShellError, ShellResult};

/// Longest command text kept for a job, in bytes.
pub const CMD_LENGTH_MAX: usize = 120;
/// Most jobs the table will hold at once.
pub const JOBS_NUM_MAX: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(usize);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse()?;
        Ok(JobId(id))
    }
}

impl From<JobId> for usize {
    fn from(id: JobId) -> usize {
        id.0
    }
}

impl From<usize> for JobId {
    fn from(id: usize) -> Self {
        JobId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Background,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub pid: Pid,
    pub command: String,
    pub started_at: Instant,
    pub state: JobState,
}

impl Job {
    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Display for Job {
    /// `[id] command: pid N secs`, plus ` (STOPPED)` for stopped jobs.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} {} secs",
            self.id,
            self.command,
            self.pid,
            self.elapsed_secs()
        )?;
        if self.state == JobState::Stopped {
            write!(f, " (STOPPED)")?;
        }
        Ok(())
    }
}

/// Background and stopped jobs, ordered by id.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest id not currently assigned.
    pub fn next_id(&self) -> JobId {
        (0..)
            .map(JobId)
            .find(|id| !self.jobs.contains_key(id))
            .unwrap_or(JobId(self.jobs.len()))
    }

    pub fn insert(&mut self, pid: Pid, command: &str, state: JobState) -> ShellResult<JobId> {
        if self.jobs.len() >= JOBS_NUM_MAX {
            return Err(ShellError::lookup(command, "too many jobs"));
        }
        let id = self.next_id();
        self.jobs.insert(
            id,
            Job {
                id,
                pid,
                command: truncate(command, CMD_LENGTH_MAX).to_string(),
                started_at: Instant::now(),
                state,
            },
        );
        tracing::debug!(%id, %pid, ?state, "job added");
        Ok(id)
    }

    pub fn find_by_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.values().find(|job| job.pid == pid)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    /// Highest-id job, optionally restricted to one state.
    pub fn find_most_recent(&self, state: Option<JobState>) -> Option<&Job> {
        self.jobs
            .values()
            .rev()
            .find(|job| state.map_or(true, |s| job.state == s))
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn list_all(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Empties the table, yielding jobs in id order.
    pub fn drain(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Polls every job without blocking and drops those whose process is gone.
    /// Returns the removed jobs.
    pub fn reap_finished(&mut self) -> Vec<Job> {
        // WUNTRACED | WCONTINUED: track stops and resumes sent from outside the shell
        let flag = Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED);

        let mut finished = Vec::new();
        for job in self.jobs.values_mut() {
            match wait::waitpid(job.pid, flag) {
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => finished.push(job.id),
                Ok(WaitStatus::Stopped(..)) => job.state = JobState::Stopped,
                Ok(WaitStatus::Continued(_)) => job.state = JobState::Background,
                Ok(_) => {}
                Err(nix::Error::ECHILD) => {
                    tracing::warn!(id = %job.id, pid = %job.pid, "job is no longer a child of the shell");
                    finished.push(job.id);
                }
                Err(e) => {
                    eprintln!("smash error: waitpid: {}", e);
                    tracing::warn!(id = %job.id, pid = %job.pid, error = %e, "reap failed");
                }
            }
        }

        finished
            .into_iter()
            .filter_map(|id| self.jobs.remove(&id))
            .inspect(|job| tracing::debug!(id = %job.id, pid = %job.pid, "job reaped"))
            .collect()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
