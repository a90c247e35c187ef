pub mod backends;
pub mod progress;
pub mod strategy;

use backends::{DownloadTarget, Extractor};
use progress::EventSink;
use strategy::{classify, ExtractionAttempt, Verdict, CLIENTS};
use tracing::{debug, info, warn};

/// Result of trying every client identity for one URL.
#[derive(Debug)]
pub struct StrategyOutcome {
    pub success: bool,
    /// Client that produced the successful attempt.
    pub client: Option<String>,
    pub exit_code: i32,
    /// Output of the successful attempt, or of the last one on failure.
    pub output: String,
    pub attempts: Vec<ExtractionAttempt>,
}
impl StrategyOutcome {
    /// Last meaningful line of the output, for ledgers and logs.
    pub fn reason(&self) -> String {
        self.output
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .or_else(|| self.output.lines().rev().find(|l| !l.trim().is_empty()))
            .map_or_else(|| "unknown error".to_string(), |l| l.trim().to_string())
    }
}

pub struct Downloader;
impl Downloader {
    /// Download and extract the audio of `target`, trying each client in
    /// [`CLIENTS`] order until one succeeds.
    pub async fn download_audio(
        extractor: &dyn Extractor,
        target: &DownloadTarget,
        sink: &dyn EventSink,
    ) -> StrategyOutcome {
        Self::download_audio_with(extractor, CLIENTS, target, sink).await
    }

    #[tracing::instrument(skip_all, fields(url = target.url.as_str()))]
    pub async fn download_audio_with(
        extractor: &dyn Extractor,
        clients: &[&str],
        target: &DownloadTarget,
        sink: &dyn EventSink,
    ) -> StrategyOutcome {
        let mut attempts = Vec::with_capacity(clients.len());

        for client in clients {
            debug!(%client, "Trying client");

            let attempt = match extractor.extract(client, target, sink).await {
                Ok(a) => a,
                Err(e) => ExtractionAttempt::new(client, -1, format!("ERROR: {e:#}")),
            };

            let verdict = classify(&attempt);
            attempts.push(attempt);

            match verdict {
                Verdict::Success => {
                    info!(%client, "Extraction succeeded");
                    let output = attempts.last().map(|a| a.output.clone()).unwrap_or_default();
                    return StrategyOutcome {
                        success: true,
                        client: Some((*client).to_string()),
                        exit_code: 0,
                        output,
                        attempts,
                    };
                }
                Verdict::FormatUnavailable => {
                    info!(%client, "Format not available for client, trying next");
                }
                Verdict::Failed => {
                    warn!(%client, "Extraction failed, trying next client");
                }
            }
        }

        StrategyOutcome {
            success: false,
            client: None,
            exit_code: 1,
            output: attempts.last().map(|a| a.output.clone()).unwrap_or_default(),
            attempts,
        }
    }
}
