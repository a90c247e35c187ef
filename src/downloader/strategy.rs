//! Decides, from the captured output of one extraction attempt, whether the
//! attempt succeeded or the next client identity should be tried.

/// Client identities presented to the platform, in the order they are tried.
pub const CLIENTS: &[&str] = &["android", "ios", "mweb", "web_safari", "web"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionAttempt {
    pub client: String,
    pub exit_code: i32,
    pub output: String,
}
impl ExtractionAttempt {
    pub fn new<T: Into<String>>(client: &str, exit_code: i32, output: T) -> Self {
        Self {
            client: client.to_string(),
            exit_code,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Success whatever the exit code says.
    Success,
    /// Success, provided the extractor exited with 0.
    SuccessIfExitOk,
    /// The client cannot get a usable format. Try the next one.
    FormatUnavailable,
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub signature: &'static str,
    pub action: Action,
}

/// Evaluated top to bottom; the first applicable rule wins.
pub const RULES: &[Rule] = &[
    Rule {
        signature: "has already been downloaded",
        action: Action::Success,
    },
    Rule {
        signature: "[ExtractAudio] Destination:",
        action: Action::SuccessIfExitOk,
    },
    Rule {
        signature: "[download] Destination:",
        action: Action::SuccessIfExitOk,
    },
    Rule {
        signature: "[Merger] Merging formats into",
        action: Action::SuccessIfExitOk,
    },
    Rule {
        signature: "Deleting original file",
        action: Action::SuccessIfExitOk,
    },
    Rule {
        signature: "Requested format is not available",
        action: Action::FormatUnavailable,
    },
    Rule {
        signature: "Only images are available",
        action: Action::FormatUnavailable,
    },
    Rule {
        signature: "not available on this app",
        action: Action::FormatUnavailable,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    FormatUnavailable,
    Failed,
}

pub fn classify(attempt: &ExtractionAttempt) -> Verdict {
    classify_with(RULES, attempt)
}

pub fn classify_with(rules: &[Rule], attempt: &ExtractionAttempt) -> Verdict {
    let exit_ok = attempt.exit_code == 0;

    rules
        .iter()
        .filter(|rule| attempt.output.contains(rule.signature))
        .find_map(|rule| match rule.action {
            Action::Success => Some(Verdict::Success),
            Action::SuccessIfExitOk if exit_ok => Some(Verdict::Success),
            Action::SuccessIfExitOk => None,
            Action::FormatUnavailable => Some(Verdict::FormatUnavailable),
        })
        .unwrap_or(Verdict::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_marker_needs_zero_exit() {
        let ok = ExtractionAttempt::new("android", 0, "[ExtractAudio] Destination: a.mp3");
        let bad = ExtractionAttempt::new("android", 1, "[ExtractAudio] Destination: a.mp3");

        assert_eq!(classify(&ok), Verdict::Success);
        assert_eq!(classify(&bad), Verdict::Failed);
    }

    #[test]
    fn already_downloaded_wins_regardless_of_exit_code() {
        let attempt = ExtractionAttempt::new(
            "ios",
            1,
            "[download] a.mp3 has already been downloaded\nERROR: Postprocessing: boom",
        );

        assert_eq!(classify(&attempt), Verdict::Success);
    }

    #[test]
    fn format_unavailable_signature() {
        let attempt = ExtractionAttempt::new(
            "android",
            1,
            "ERROR: [youtube] abc: Requested format is not available. Use --list-formats",
        );

        assert_eq!(classify(&attempt), Verdict::FormatUnavailable);
    }

    #[test]
    fn failed_marker_then_format_error_is_format_unavailable() {
        let attempt = ExtractionAttempt::new(
            "mweb",
            1,
            "[download] Destination: a.webm\nERROR: Requested format is not available",
        );

        assert_eq!(classify(&attempt), Verdict::FormatUnavailable);
    }

    #[test]
    fn zero_exit_without_markers_is_not_success() {
        let attempt = ExtractionAttempt::new("web", 0, "[youtube] Extracting URL");

        assert_eq!(classify(&attempt), Verdict::Failed);
    }

    #[test]
    fn custom_table() {
        let rules = [Rule {
            signature: "HTTP Error 403",
            action: Action::FormatUnavailable,
        }];
        let attempt = ExtractionAttempt::new("web", 1, "ERROR: HTTP Error 403: Forbidden");

        assert_eq!(classify_with(&rules, &attempt), Verdict::FormatUnavailable);
        assert_eq!(classify(&attempt), Verdict::Failed);
    }
}
