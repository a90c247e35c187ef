use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info};

use super::job::Job;
use crate::helpers::{id::short_id, sanitize::sanitize};

/// Process-wide, in-memory map of job id to job.
///
/// Created at startup and only dropped at process exit. The map lock is held
/// for inserts and lookups; each job guards its own state.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Arc<Job>>>,
    download_root: PathBuf,
    log_dir: PathBuf,
    log_capacity: usize,
}
impl JobRegistry {
    pub fn new(download_root: PathBuf, log_capacity: usize) -> Self {
        let log_dir = download_root.join(".logs");
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            debug!(?e, ?log_dir, "Could not create job log directory");
        }

        Self {
            jobs: Mutex::new(HashMap::new()),
            download_root,
            log_dir,
            log_capacity,
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Arc<Job>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new `queued` job writing into `folder` under the download
    /// root. Leading dots are dropped so the folder is never hidden; an empty
    /// (or fully sanitized away) folder name falls back to the job id.
    pub fn create(&self, folder: Option<&str>) -> Arc<Job> {
        let mut jobs = self.jobs();

        let mut id = short_id();
        while jobs.contains_key(&id) {
            id = short_id();
        }

        let folder = folder
            .map(|f| {
                sanitize(f)
                    .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
                    .to_string()
            })
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| id.clone());

        let job = Arc::new(Job::new(
            id.clone(),
            folder.clone(),
            self.download_root.join(&folder),
            self.log_capacity,
            Some(self.log_file_path(&id)),
        ));

        info!(job = %id, %folder, "Job created");
        jobs.insert(id, Arc::clone(&job));

        job
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn log_file_path(&self, id: &str) -> PathBuf {
        self.log_dir.join(format!("{id}.log"))
    }

    /// Best-effort read of a job's on-disk log mirror, used when the job is
    /// no longer (or never was) in memory.
    pub async fn read_log_file(&self, id: &str) -> Option<Vec<String>> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let contents = tokio::fs::read_to_string(self.log_file_path(id)).await.ok()?;

        Some(contents.lines().map(ToString::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobStatus;

    #[test]
    fn created_jobs_are_queued_and_retrievable() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = JobRegistry::new(root.path().to_path_buf(), 100);

        let job = registry.create(Some("My: Mix"));

        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.target_folder(), "My Mix");
        assert_eq!(job.target_dir(), root.path().join("My Mix"));
        assert!(registry.get(job.id()).is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_or_dotted_folder_falls_back_to_id() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = JobRegistry::new(root.path().to_path_buf(), 100);

        let a = registry.create(Some("  "));
        let b = registry.create(Some(".."));
        let c = registry.create(None);

        assert_eq!(a.target_folder(), a.id());
        assert_eq!(b.target_folder(), b.id());
        assert_eq!(c.target_folder(), c.id());
    }

    #[test]
    fn folders_are_never_hidden() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = JobRegistry::new(root.path().to_path_buf(), 100);

        let mix = registry.create(Some(".mix"));
        let logs = registry.create(Some(".logs"));
        let dots = registry.create(Some("... . "));

        assert_eq!(mix.target_folder(), "mix");
        assert_eq!(logs.target_folder(), "logs");
        assert_ne!(logs.target_dir(), registry.log_dir.as_path());
        assert_eq!(dots.target_folder(), dots.id());
    }

    #[test]
    fn concurrent_creates_get_distinct_ids() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = Arc::new(JobRegistry::new(root.path().to_path_buf(), 100));

        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| registry.create(None).id().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let mut ids = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread should not panic"))
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 200);
        assert_eq!(registry.len(), 200);
    }

    #[tokio::test]
    async fn log_file_fallback() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = JobRegistry::new(root.path().to_path_buf(), 100);

        let job = registry.create(None);
        job.log("first");

        let lines = registry
            .read_log_file(job.id())
            .await
            .expect("log file should be readable");
        assert_eq!(lines.len(), 1);
        assert!(registry.read_log_file("deadbeef").await.is_none());
        assert!(registry.read_log_file("../etc").await.is_none());
    }
}
