use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::{debug, trace};

use super::{DownloadTarget, Extractor};
use crate::downloader::{
    progress::{dispatch_line, EventSink},
    strategy::ExtractionAttempt,
};

const DOWNLOAD_PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s|%(info.playlist_index)s|%(info.n_entries,info.playlist_count)s|%(progress.filename)s|%(info.title)s";
const POSTPROCESS_PROGRESS_TEMPLATE: &str =
    "postprocess:[postprocess] %(progress.status)s|%(progress.postprocessor)s|%(info.title)s";

/// Formats `--embed-thumbnail` can write into.
const THUMBNAIL_FORMATS: &[&str] = &["mp3", "m4a", "opus", "flac", "ogg"];

/// `yt-dlp` driven as a subprocess, with `ffmpeg` doing the conversion.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    ytdlp_bin: PathBuf,
    ffmpeg_bin: PathBuf,
    cookies_file: Option<PathBuf>,
}
impl YtDlpExtractor {
    pub const fn new(ytdlp_bin: PathBuf, ffmpeg_bin: PathBuf, cookies_file: Option<PathBuf>) -> Self {
        Self {
            ytdlp_bin,
            ffmpeg_bin,
            cookies_file,
        }
    }

    pub fn build_args(&self, client: &str, target: &DownloadTarget) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--newline",
            "--no-continue",
            "--no-part",
            "--restrict-filenames",
            "--concurrent-fragments",
            "1",
            "--embed-metadata",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        if THUMBNAIL_FORMATS.contains(&target.audio_format.as_str()) {
            args.push("--embed-thumbnail".into());
        }

        let quality = audio_quality(&target.quality);
        let client_arg = format!("youtube:player_client={client}");
        args.extend(
            [
                "--extract-audio",
                "--audio-format",
                target.audio_format.as_str(),
                "--audio-quality",
                quality.as_str(),
                "--extractor-args",
                client_arg.as_str(),
                "--progress-template",
                DOWNLOAD_PROGRESS_TEMPLATE,
                "--progress-template",
                POSTPROCESS_PROGRESS_TEMPLATE,
            ]
            .map(OsString::from),
        );

        args.push("--output".into());
        args.push(target.output_template().into_os_string());

        if target.no_playlist {
            args.push("--no-playlist".into());
        }

        if let Some(cookies) = self.cookies_file.as_ref().filter(|p| p.is_file()) {
            args.push("--cookies".into());
            args.push(cookies.clone().into_os_string());
        }

        if self.ffmpeg_bin.components().count() > 1 {
            args.push("--ffmpeg-location".into());
            args.push(self.ffmpeg_bin.clone().into_os_string());
        }

        args.push("--".into());
        args.push(target.url.as_str().into());

        args
    }

    async fn check_tool(bin: &Path, version_flag: &str) -> anyhow::Result<()> {
        let status = tryhard::retry_fn(|| {
            Command::new(bin)
                .arg(version_flag)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
        })
        .retries(2)
        .await
        .with_context(|| format!("{} is not installed or not runnable", bin.display()))?;

        trace!(?bin, ?status, "Tool check finished");

        if !status.success() {
            anyhow::bail!("{} exited with {:?}", bin.display(), status.code());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Extractor for YtDlpExtractor {
    async fn preflight(&self) -> anyhow::Result<()> {
        Self::check_tool(&self.ffmpeg_bin, "-version").await?;
        Self::check_tool(&self.ytdlp_bin, "--version").await
    }

    #[tracing::instrument(skip(self, target, sink), fields(url = target.url.as_str()))]
    async fn extract(
        &self,
        client: &str,
        target: &DownloadTarget,
        sink: &dyn EventSink,
    ) -> anyhow::Result<ExtractionAttempt> {
        tokio::fs::create_dir_all(&target.output_dir).await?;

        let args = self.build_args(client, target);
        debug!(?args, "Running extractor");

        let mut child = Command::new(&self.ytdlp_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.ytdlp_bin.display()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        let mut output = String::new();
        while let Some(line) = rx.recv().await {
            trace!(%line, "extractor");
            dispatch_line(&line, sink);
            output.push_str(&line);
            output.push('\n');
        }

        let status = child.wait().await?;
        trace!(?status, "Extractor finished");

        Ok(ExtractionAttempt::new(
            client,
            status.code().unwrap_or(-1),
            output,
        ))
    }
}

/// `yt-dlp` wants `0`-`10` or a bitrate such as `192K`.
fn audio_quality(quality: &str) -> String {
    let quality = quality.trim();
    match quality {
        "" | "best" => "0".to_string(),
        q if q.len() <= 2 && q.chars().all(|c| c.is_ascii_digit()) => q.to_string(),
        q if q.chars().all(|c| c.is_ascii_digit()) => format!("{q}K"),
        q => q.to_string(),
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    }
}
