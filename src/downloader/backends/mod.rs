pub mod ytdlp;

use std::path::PathBuf;

use url::Url;

use super::{progress::EventSink, strategy::ExtractionAttempt};

/// Everything the extractor needs to fetch the audio of one URL.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    pub url: Url,
    pub output_dir: PathBuf,
    pub audio_format: String,
    pub quality: String,
    pub no_playlist: bool,
}
impl DownloadTarget {
    /// Output template relative to `output_dir`: playlist title as a
    /// subfolder, playlist index as a prefix, then the video title.
    pub const OUTPUT_TEMPLATE: &'static str =
        "%(playlist_title|Singles)s/%(playlist_index&{}. |)s%(title)s.%(ext)s";

    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(Self::OUTPUT_TEMPLATE)
    }
}

/// Something that can download-and-extract audio while presenting itself as
/// a given client identity.
#[async_trait::async_trait]
pub trait Extractor: std::fmt::Debug + Send + Sync {
    /// Check that every external tool the extractor relies on is usable.
    async fn preflight(&self) -> anyhow::Result<()>;

    /// Run one attempt. An `Err` means the attempt could not even be started.
    async fn extract(
        &self,
        client: &str,
        target: &DownloadTarget,
        sink: &dyn EventSink,
    ) -> anyhow::Result<ExtractionAttempt>;
}
