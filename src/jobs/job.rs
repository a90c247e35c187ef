use std::{
    collections::VecDeque,
    fmt::Display,
    fs::File,
    io::{LineWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}
impl JobStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Done | Self::Error => 2,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Only forward moves are allowed, and terminal states are final.
    pub const fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}
impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Done => f.write_str("done"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Bounded, append-only log. Readers keep a cursor equal to the number of
/// entries they have already seen.
#[derive(Debug)]
pub struct JobLog {
    entries: VecDeque<String>,
    total: usize,
    capacity: usize,
}
impl JobLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            total: 0,
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line);
        self.total += 1;
    }

    /// Entries appended after the `cursor`-th one, plus the cursor to use next.
    ///
    /// Entries that were already evicted are skipped.
    pub fn since(&self, cursor: usize) -> (Vec<String>, usize) {
        let first_retained = self.total - self.entries.len();
        let start = cursor.max(first_retained) - first_retained;

        let lines = self.entries.iter().skip(start).cloned().collect();

        (lines, self.total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub log: Vec<String>,
    pub next_cursor: usize,
    pub target_folder: String,
    pub public_zip: Option<String>,
    pub public_files: Vec<String>,
    pub ready_titles: Vec<String>,
    pub failure_log: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    log: JobLog,
    public_zip: Option<String>,
    public_files: Vec<String>,
    ready_titles: Vec<String>,
    failure_log: Option<PathBuf>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// One submission: its own status and log, mutated by its runner task and
/// read concurrently by the status API.
#[derive(Debug)]
pub struct Job {
    id: String,
    target_folder: String,
    target_dir: PathBuf,
    log_file: Option<PathBuf>,
    /// Opened on the first line and kept for the life of the job.
    log_mirror: Mutex<Option<LineWriter<File>>>,
    state: Mutex<JobState>,
}
impl Job {
    pub fn new(
        id: String,
        target_folder: String,
        target_dir: PathBuf,
        log_capacity: usize,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            target_folder,
            target_dir,
            log_file,
            log_mirror: Mutex::new(None),
            state: Mutex::new(JobState {
                status: JobStatus::Queued,
                log: JobLog::with_capacity(log_capacity),
                public_zip: None,
                public_files: Vec::new(),
                ready_titles: Vec::new(),
                failure_log: None,
                started_at: None,
                finished_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn target_folder(&self) -> &str {
        &self.target_folder
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a timestamped line to the log (and to the on-disk mirror).
    pub fn log<T: AsRef<str>>(&self, line: T) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), line.as_ref());

        self.mirror_to_disk(&line);
        self.state().log.push(line);
    }

    /// Best-effort append to the on-disk mirror. Lines are short and the
    /// handle stays open for the life of the job.
    fn mirror_to_disk(&self, line: &str) {
        let Some(path) = &self.log_file else {
            return;
        };

        let mut mirror = self.log_mirror.lock().unwrap_or_else(PoisonError::into_inner);

        if mirror.is_none() {
            match std::fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => *mirror = Some(LineWriter::new(f)),
                Err(e) => {
                    trace!(?e, ?path, "Could not open log mirror");
                    return;
                }
            }
        }

        if let Some(writer) = mirror.as_mut() {
            if let Err(e) = writeln!(writer, "{line}") {
                trace!(?e, ?path, "Could not mirror log line to disk, reopening next time");
                *mirror = None;
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// status changed.
    pub fn transition(&self, next: JobStatus) -> bool {
        let mut state = self.state();

        if !state.status.can_transition_to(next) {
            warn!(job = %self.id, from = %state.status, to = %next, "Ignoring backwards status transition");
            return false;
        }

        let now = Utc::now();
        match next {
            JobStatus::Running => state.started_at = Some(now),
            JobStatus::Done | JobStatus::Error => state.finished_at = Some(now),
            JobStatus::Queued => {}
        }
        state.status = next;

        true
    }

    pub fn set_public_zip(&self, reference: String) {
        self.state().public_zip = Some(reference);
    }

    pub fn add_public_file(&self, reference: String) {
        self.state().public_files.push(reference);
    }

    pub fn add_ready_title(&self, title: String) {
        self.state().ready_titles.push(title);
    }

    pub fn ready_titles(&self) -> Vec<String> {
        self.state().ready_titles.clone()
    }

    pub fn set_failure_log(&self, path: PathBuf) {
        self.state().failure_log = Some(path);
    }

    pub fn snapshot(&self, cursor: usize) -> JobSnapshot {
        let state = self.state();
        let (log, next_cursor) = state.log.since(cursor);

        JobSnapshot {
            id: self.id.clone(),
            status: state.status,
            log,
            next_cursor,
            target_folder: self.target_folder.clone(),
            public_zip: state.public_zip.clone(),
            public_files: state.public_files.clone(),
            ready_titles: state.ready_titles.clone(),
            failure_log: state.failure_log.clone(),
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "abc12345".to_string(),
            "folder".to_string(),
            PathBuf::from("/tmp/folder"),
            4,
            None,
        )
    }

    #[test]
    fn cursor_returns_only_newer_entries() {
        let mut log = JobLog::with_capacity(10);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }

        let (lines, next) = log.since(3);
        assert_eq!(lines, vec!["line 3", "line 4"]);
        assert_eq!(next, 5);

        assert_eq!(log.since(5), (vec![], 5));
        assert_eq!(log.since(42), (vec![], 5));
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut log = JobLog::with_capacity(3);
        for i in 0..5 {
            log.push(format!("line {i}"));
        }

        assert_eq!(log.since(0), (vec!["line 2".into(), "line 3".into(), "line 4".into()], 5));
        assert_eq!(log.since(3).0, vec!["line 3", "line 4"]);
        assert_eq!(log.since(0).1, 5);
    }

    #[test]
    fn status_only_moves_forward() {
        let job = job();

        assert!(job.transition(JobStatus::Running));
        assert!(!job.transition(JobStatus::Queued));
        assert!(job.transition(JobStatus::Done));
        assert!(!job.transition(JobStatus::Running));
        assert!(!job.transition(JobStatus::Error));
        assert_eq!(job.status(), JobStatus::Done);

        let snapshot = job.snapshot(0);
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.finished_at.is_some());
    }

    #[test]
    fn queued_job_can_fail_directly() {
        let job = job();

        assert!(job.transition(JobStatus::Error));
        assert_eq!(job.status(), JobStatus::Error);
    }

    #[test]
    fn log_lines_are_timestamped_and_mirrored() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let file = dir.path().join("job.log");
        let job = Job::new("id".into(), "f".into(), dir.path().to_path_buf(), 8, Some(file.clone()));

        job.log("hello");
        job.log("world");

        let snapshot = job.snapshot(1);
        assert_eq!(snapshot.log.len(), 1);
        assert!(snapshot.log[0].starts_with('['));
        assert!(snapshot.log[0].ends_with("] world"));

        let on_disk = std::fs::read_to_string(file).expect("log file should exist");
        assert_eq!(on_disk.lines().count(), 2);
    }

    #[test]
    fn mirror_keeps_lines_evicted_from_memory() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let file = dir.path().join("job.log");
        let job = Job::new("id".into(), "f".into(), dir.path().to_path_buf(), 2, Some(file.clone()));

        for i in 0..5 {
            job.log(format!("line {i}"));
        }

        assert_eq!(job.snapshot(0).log.len(), 2);
        let on_disk = std::fs::read_to_string(file).expect("log file should exist");
        let lines = on_disk.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].ends_with("] line 0"));
        assert!(lines[4].ends_with("] line 4"));
    }
}
