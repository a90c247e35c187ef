//! Progress events coming out of the extractor and the adapter that turns
//! them into a handful of job log lines.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::trace;

use crate::jobs::job::Job;

/// Prefix of the lines printed through `--progress-template download:`.
pub const PROGRESS_PREFIX: &str = "[progress] ";
/// Prefix of the lines printed through `--progress-template postprocess:`.
pub const POSTPROCESS_PREFIX: &str = "[postprocess] ";
/// Field separator used in both templates.
pub const FIELD_SEPARATOR: char = '|';

/// Postprocessor that performs the audio extraction.
pub const EXTRACT_AUDIO_POSTPROCESSOR: &str = "ExtractAudio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Started,
    Downloading,
    Finished,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub filename: Option<String>,
    pub title: Option<String>,
    pub playlist_index: Option<u32>,
    pub playlist_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostprocessEvent {
    pub status: ProgressStatus,
    pub postprocessor: String,
    pub title: Option<String>,
}

/// Receiver of extractor events.
///
/// Implementations must never panic or otherwise fail outwards: a broken sink
/// may drop a log line but must not disturb the download.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_postprocess(&self, event: &PostprocessEvent);
}

#[derive(Debug)]
pub enum ExtractorLine {
    Progress(ProgressEvent),
    Postprocess(PostprocessEvent),
}

/// Parse one line of extractor output. Lines that are not structured
/// progress lines yield `None`.
pub fn parse_line(line: &str) -> Option<ExtractorLine> {
    let line = line.trim_end();

    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        // status|index|count|filename|title (title last, it may contain the separator)
        let mut fields = rest.splitn(5, FIELD_SEPARATOR);
        let status = parse_status(fields.next()?);
        let playlist_index = field(fields.next()).and_then(|x| x.parse().ok());
        let playlist_count = field(fields.next()).and_then(|x| x.parse().ok());
        let filename = field(fields.next());
        let title = field(fields.next());

        return Some(ExtractorLine::Progress(ProgressEvent {
            status,
            filename,
            title,
            playlist_index,
            playlist_count,
        }));
    }

    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let mut fields = rest.splitn(3, FIELD_SEPARATOR);
        let status = parse_status(fields.next()?);
        let postprocessor = field(fields.next())?;
        let title = field(fields.next());

        return Some(ExtractorLine::Postprocess(PostprocessEvent {
            status,
            postprocessor,
            title,
        }));
    }

    None
}

fn parse_status(s: &str) -> ProgressStatus {
    match s.trim() {
        "started" => ProgressStatus::Started,
        "downloading" => ProgressStatus::Downloading,
        "finished" => ProgressStatus::Finished,
        _ => ProgressStatus::Other,
    }
}

fn field(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|x| !x.is_empty() && *x != "NA" && *x != "None")
        .map(ToString::to_string)
}

/// Hand every structured line of `line` to `sink`.
pub fn dispatch_line(line: &str, sink: &dyn EventSink) {
    match parse_line(line) {
        Some(ExtractorLine::Progress(e)) => sink.on_progress(&e),
        Some(ExtractorLine::Postprocess(e)) => sink.on_postprocess(&e),
        None => {}
    }
}

#[derive(Debug, Default)]
struct TrackedFile {
    name: Option<String>,
    finished: bool,
}

/// Writes at most "item i/n", "starting download", "download complete",
/// "converting" and "conversion complete" per file into the job log.
#[derive(Debug)]
pub struct ProgressAdapter {
    job: Arc<Job>,
    current: Mutex<TrackedFile>,
}
impl ProgressAdapter {
    pub fn new(job: Arc<Job>) -> Self {
        Self {
            job,
            current: Mutex::new(TrackedFile::default()),
        }
    }

    fn handle_progress(&self, event: &ProgressEvent) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        match event.status {
            ProgressStatus::Downloading => {
                let Some(filename) = &event.filename else {
                    return;
                };
                let name = base_name(filename);
                if current.name.as_deref() == Some(name.as_str()) {
                    return;
                }

                let title = event.title.clone().or_else(|| {
                    Path::new(&name)
                        .file_stem()
                        .map(|x| x.to_string_lossy().into_owned())
                });

                *current = TrackedFile {
                    name: Some(name),
                    finished: false,
                };

                if let (Some(idx), Some(cnt)) = (event.playlist_index, event.playlist_count) {
                    self.job.log(format!("Item {idx}/{cnt}"));
                }
                match title {
                    Some(title) => self.job.log(format!("Starting download: {title}")),
                    None => self.job.log("Starting download…"),
                }
            }

            ProgressStatus::Finished => {
                let Some(filename) = &event.filename else {
                    return;
                };
                let name = base_name(filename);
                if current.name.as_deref() == Some(name.as_str()) && current.finished {
                    return;
                }
                *current = TrackedFile {
                    name: Some(name),
                    finished: true,
                };

                self.job.log("Download complete");
                // Announced before the converter has confirmed anything.
                self.job.log("Converting");
            }

            ProgressStatus::Started | ProgressStatus::Other => {}
        }
    }

    fn handle_postprocess(&self, event: &PostprocessEvent) {
        if event.status != ProgressStatus::Finished
            || event.postprocessor != EXTRACT_AUDIO_POSTPROCESSOR
        {
            return;
        }

        if let Some(title) = &event.title {
            self.job.add_ready_title(title.clone());
        }
        self.job.log("Conversion complete");
    }
}

impl EventSink for ProgressAdapter {
    fn on_progress(&self, event: &ProgressEvent) {
        if catch_unwind(AssertUnwindSafe(|| self.handle_progress(event))).is_err() {
            trace!(?event, "Progress handler panicked, event dropped");
        }
    }

    fn on_postprocess(&self, event: &PostprocessEvent) {
        if catch_unwind(AssertUnwindSafe(|| self.handle_postprocess(event))).is_err() {
            trace!(?event, "Postprocess handler panicked, event dropped");
        }
    }
}

fn base_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map_or_else(|| filename.to_string(), |x| x.to_string_lossy().into_owned())
}
