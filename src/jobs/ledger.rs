use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;

/// File name of the per-folder failure ledger.
pub const FAILURE_LEDGER: &str = "failed.txt";

/// Plain-text record of the URLs of a job that did not succeed, one
/// `url - reason` line each.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
}
impl FailureLedger {
    /// Create (or truncate) the ledger inside `dir`.
    pub async fn create(dir: &Path) -> std::io::Result<Self> {
        let path = dir.join(FAILURE_LEDGER);
        fs::write(&path, b"").await?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Write failures are only traced.
    pub async fn record(&self, url: &str, reason: &str) {
        let line = format!("{url} - {}\n", reason.replace(['\r', '\n'], " "));

        let res = async {
            let mut file = fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = res {
            warn!(?e, path = ?self.path, "Could not write failure ledger");
        }
    }
}
