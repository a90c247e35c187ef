use std::{any::Any, panic::AssertUnwindSafe, path::Path, sync::Arc};

use anyhow::Context;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{
    job::{Job, JobStatus},
    ledger::FailureLedger,
};
use crate::{
    config::Config,
    downloader::{
        backends::{DownloadTarget, Extractor},
        progress::ProgressAdapter,
        Downloader,
    },
    helpers::{
        publish::{public_url, publish_file},
        temp_dir::TempDir,
    },
    processor::{
        archive::build_zip,
        collect_files, is_audio_file, is_container_file,
        rename::{normalize_dir, RenameOutcome},
    },
};

/// Job log line written when the pipeline dies unexpectedly.
pub const FATAL_MESSAGE: &str = "FATAL: job aborted unexpectedly";

/// What the user asked for in one submission.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub urls: Vec<Url>,
    pub quality: String,
    pub no_playlist: bool,
    pub archive: bool,
}

/// Drives a job through download, rename, archive/publish and finalization.
#[derive(Debug)]
pub struct JobRunner {
    config: Arc<Config>,
    extractor: Arc<dyn Extractor>,
}
impl JobRunner {
    pub fn new(config: Arc<Config>, extractor: Arc<dyn Extractor>) -> Self {
        Self { config, extractor }
    }

    /// Run the job in the background. There is no way to stop it once started.
    pub fn spawn(self: &Arc<Self>, job: Arc<Job>, request: JobRequest) {
        let runner = Arc::clone(self);

        tokio::task::spawn(async move {
            runner.execute(job, request).await;
        });
    }

    /// Run the job to completion. The job is always terminal afterwards.
    #[tracing::instrument(skip_all, fields(job = job.id()))]
    pub async fn execute(&self, job: Arc<Job>, request: JobRequest) {
        let res = AssertUnwindSafe(self.run(&job, &request))
            .catch_unwind()
            .await;

        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(?e, "Job failed");
                job.log(FATAL_MESSAGE);
            }
            Err(panic) => {
                error!(panic = panic_message(panic.as_ref()), "Job panicked");
                job.log(FATAL_MESSAGE);
            }
        }

        if !job.status().is_terminal() {
            job.transition(JobStatus::Error);
        }

        info!(status = %job.status(), "Job finished");
    }

    async fn run(&self, job: &Arc<Job>, request: &JobRequest) -> anyhow::Result<()> {
        job.transition(JobStatus::Running);
        job.log(format!(
            "Started: {} URL(s) into \"{}\"",
            request.urls.len(),
            job.target_folder()
        ));

        if let Err(e) = self.extractor.preflight().await {
            warn!(?e, "Preflight failed");
            Self::fail(job, format!("Required tool is missing: {e:#}"));
            return Ok(());
        }

        let target_dir = job.target_dir();
        tokio::fs::create_dir_all(target_dir)
            .await
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;

        let ledger = FailureLedger::create(target_dir).await?;
        job.set_failure_log(ledger.path().to_path_buf());

        self.download_all(job, request, &ledger).await;

        Self::rename_outputs(job).await;

        let audio = collect_files(target_dir, is_audio_file).await?;
        debug!(files = audio.len(), "Audio files after rename");

        if request.archive {
            if audio.is_empty() {
                Self::fail(job, "No audio files were produced, nothing to archive");
                return Ok(());
            }

            if let Err(e) = self.publish_archive(job).await {
                error!(?e, "Archive failed");
                Self::fail(job, format!("Archive failed: {e:#}"));
                return Ok(());
            }
        } else if audio.is_empty() {
            job.log("Warning: no audio files were produced");
        } else {
            self.publish_files(job, &audio).await;
        }

        let ready = job.ready_titles();
        if !ready.is_empty() {
            job.log(format!("Converted {} track(s): {}", ready.len(), ready.join(", ")));
        }

        job.log("Done");
        job.transition(JobStatus::Done);

        Ok(())
    }

    async fn download_all(&self, job: &Arc<Job>, request: &JobRequest, ledger: &FailureLedger) {
        let adapter = ProgressAdapter::new(Arc::clone(job));
        let total = request.urls.len();
        let mut failed = 0;

        for (i, url) in request.urls.iter().enumerate() {
            job.log(format!("URL {}/{}: {}", i + 1, total, url));

            let target = DownloadTarget {
                url: url.clone(),
                output_dir: job.target_dir().to_path_buf(),
                audio_format: self.config.audio_format.clone(),
                quality: request.quality.clone(),
                no_playlist: request.no_playlist,
            };

            let outcome = Downloader::download_audio(self.extractor.as_ref(), &target, &adapter).await;

            if outcome.success {
                job.log(format!(
                    "Finished {} (client {})",
                    url,
                    outcome.client.as_deref().unwrap_or("?")
                ));
            } else {
                failed += 1;
                let reason = outcome.reason();
                warn!(%url, %reason, exit_code = outcome.exit_code, attempts = outcome.attempts.len(), "All clients failed");
                job.log(format!("Failed {url}: {reason}"));
                ledger.record(url.as_str(), &reason).await;
            }
        }

        if failed > 0 {
            job.log(format!("{failed} of {total} URL(s) failed, see the failure log"));
        }
    }

    async fn rename_outputs(job: &Job) {
        let results = match normalize_dir(job.target_dir()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(?e, "Could not scan output directory for renaming");
                job.log(format!("Warning: could not rename files: {e}"));
                return;
            }
        };

        for (path, outcome) in results {
            match outcome {
                Ok(RenameOutcome::Unchanged | RenameOutcome::Renamed(_)) => {}
                Ok(RenameOutcome::DuplicateRemoved(kept)) => {
                    job.log(format!(
                        "Removed duplicate {} (already have {})",
                        file_name(&path),
                        file_name(&kept)
                    ));
                }
                Err(e) => {
                    warn!(?e, ?path, "Rename failed");
                    job.log(format!("Warning: could not rename {}: {e}", file_name(&path)));
                }
            }
        }
    }

    async fn publish_archive(&self, job: &Job) -> anyhow::Result<()> {
        let include_containers = self.config.archive_include_containers;
        let files = collect_files(job.target_dir(), |p| {
            is_audio_file(p) || (include_containers && is_container_file(p))
        })
        .await?;

        job.log(format!("Archiving {} file(s)", files.len()));

        let zip_name = format!("{}-{}.zip", job.target_folder(), job.id());
        let staging = TempDir::with_prefix("audiograb-zip-")?;

        let zip_path = build_zip(
            job.target_dir().to_path_buf(),
            files,
            staging.path().join(&zip_name),
        )
        .await?;

        publish_file(&zip_path, &self.config.public_dir, &zip_name).await?;

        let reference = public_url(&[&zip_name]);
        job.log(format!("Archive ready: {reference}"));
        job.set_public_zip(reference);

        Ok(())
    }

    async fn publish_files(&self, job: &Job, files: &[std::path::PathBuf]) {
        let public_dir = self.config.public_dir.join(job.id());

        if let Err(e) = tokio::fs::create_dir_all(&public_dir).await {
            warn!(?e, "Could not create public directory");
            job.log(format!("Warning: could not publish files: {e}"));
            return;
        }

        for file in files {
            let name = file_name(file);

            match tokio::fs::copy(file, public_dir.join(&name)).await {
                Ok(_) => job.add_public_file(public_url(&[job.id(), &name])),
                Err(e) => {
                    warn!(?e, ?file, "Could not publish file");
                    job.log(format!("Warning: could not publish {name}: {e}"));
                }
            }
        }
    }

    fn fail<T: AsRef<str>>(job: &Job, message: T) {
        warn!(message = message.as_ref(), "Job error");
        job.log(format!("Error: {}", message.as_ref()));
        job.transition(JobStatus::Error);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
