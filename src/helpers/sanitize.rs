//! Title cleanup used to turn whatever the source platform calls a track into
//! a stable `"{Artist} - {Title}.{ext}"` file name.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest file stem we produce, in characters.
pub const MAX_STEM_CHARS: usize = 150;
const PLACEHOLDER_CHARS: usize = 40;
const PLACEHOLDER: &str = "track";
const MAX_PASSES: usize = 8;

static ILLEGAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/*?:"<>|\x00-\x1f]"#).expect("Invalid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex"));
static ANNOTATIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^()]*\)|\[[^\[\]]*\]").expect("Invalid regex"));
static INDEX_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,4}\.\s*)+").expect("Invalid regex"));

/// Strip characters that are illegal in file names on common platforms and
/// squeeze whitespace.
pub fn sanitize(raw: &str) -> String {
    let cleaned = ILLEGAL_CHARS.replace_all(raw, "");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Remove `(...)` and `[...]` annotations such as "(Official Video)".
pub fn strip_annotations(title: &str) -> String {
    sanitize(&ANNOTATIONS.replace_all(title, " "))
}

/// Split `"Artist - Title"` on the first hyphen.
///
/// Without a hyphen (or with nothing left of it) the whole input is the title.
/// Annotations are dropped on both sides.
pub fn split_artist_title(name: &str) -> (Option<String>, String) {
    if let Some((left, right)) = name.split_once('-') {
        let artist = strip_annotations(left);
        if !artist.is_empty() {
            return (Some(artist), strip_annotations(right));
        }
    }

    (None, strip_annotations(name))
}

/// Canonical `"{Artist} - {Title}.{ext}"` (or `"{Title}.{ext}"`) name for a
/// file stem produced by the extractor.
///
/// Cleanup can expose a new index prefix or annotation (`"(Live) 07. Song"`),
/// so it is repeated until the stem no longer changes.
pub fn canonical_file_name(stem: &str, ext: &str) -> String {
    let mut current = stem.replace('_', " ");
    for _ in 0..MAX_PASSES {
        let next = canonical_stem(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if ext.is_empty() {
        current
    } else {
        format!("{current}.{ext}")
    }
}

fn canonical_stem(readable: &str) -> String {
    let unindexed = INDEX_PREFIX.replace(readable.trim_start(), "");

    let (artist, title) = split_artist_title(&unindexed);

    let canonical = match artist {
        Some(artist) if !title.is_empty() => format!("{artist} - {title}"),
        Some(artist) => artist,
        None => title,
    };

    let stem = truncate_chars(&canonical, MAX_STEM_CHARS);
    if stem.is_empty() {
        placeholder(readable)
    } else {
        stem
    }
}

fn placeholder(original: &str) -> String {
    let fallback = truncate_chars(&sanitize(original), PLACEHOLDER_CHARS);
    if fallback.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        fallback
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.trim().to_string();
    }

    // A cut right after the separator would leave a dangling " -".
    s.chars()
        .take(max)
        .collect::<String>()
        .trim_end_matches(|c: char| c == '-' || c.is_whitespace())
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_illegal_characters() {
        assert_eq!(sanitize(r#"  a/b\c*d?e:f"g<h>i|j  "#), "abcdefghij");
        assert_eq!(sanitize("two   spaces\there"), "two spaces here");
    }

    #[test]
    fn annotations_are_removed() {
        assert_eq!(strip_annotations("Song (Official Video) [Lyrics]"), "Song");
        assert_eq!(strip_annotations("Song (feat. X) Live"), "Song Live");
    }

    #[test]
    fn splits_on_first_hyphen() {
        assert_eq!(
            split_artist_title("Jay-Z - Song (Official Video)"),
            (Some("Jay".to_string()), "Z - Song".to_string())
        );
        assert_eq!(
            split_artist_title("Artist - Title [HD]"),
            (Some("Artist".to_string()), "Title".to_string())
        );
        assert_eq!(
            split_artist_title("[HD] Artist - Song"),
            (Some("Artist".to_string()), "Song".to_string())
        );
    }

    #[test]
    fn no_hyphen_means_no_artist() {
        assert_eq!(
            split_artist_title("Just A Title (Audio)"),
            (None, "Just A Title".to_string())
        );
        assert_eq!(split_artist_title("- Orphan"), (None, "- Orphan".to_string()));
    }

    #[test]
    fn canonical_name_from_restricted_stem() {
        assert_eq!(
            canonical_file_name("03._Artist_-_Song_(Official_Video)", "mp3"),
            "Artist - Song.mp3"
        );
        assert_eq!(canonical_file_name("Lonely_Title", "m4a"), "Lonely Title.m4a");
    }

    #[test]
    fn canonical_name_is_idempotent() {
        let inputs = [
            "03._Artist_-_Song_(Official_Video)",
            "Jay-Z - Song",
            "Title-with-hyphen",
            "a - b - c [x]",
            "(only annotation)",
            "???",
            "12. 12. nested prefix",
            "(Live) 07. Song",
            "?07. Song",
            "[HD] 3. Artist - Song (Live)",
            "",
        ];

        for input in inputs {
            let once = canonical_file_name(input, "mp3");
            let stem = once.trim_end_matches(".mp3");
            let twice = canonical_file_name(stem, "mp3");
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn prefix_revealed_by_cleanup_is_removed() {
        assert_eq!(canonical_file_name("(Live) 07. Song", "mp3"), "Song.mp3");
        assert_eq!(canonical_file_name("?07._Song", "mp3"), "Song.mp3");
        assert_eq!(
            canonical_file_name("[HD]_3._Artist_-_Song_(Live)", "opus"),
            "Artist - Song.opus"
        );
    }

    #[test]
    fn empty_names_degrade_to_placeholder() {
        assert_eq!(canonical_file_name("???", "mp3"), "track.mp3");
        assert_eq!(canonical_file_name("(only annotation)", "mp3"), "(only annotation).mp3");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(400);
        let name = canonical_file_name(&long, "mp3");

        assert_eq!(name.len(), MAX_STEM_CHARS + ".mp3".len());

        let artist = "a".repeat(MAX_STEM_CHARS - 2);
        let name = canonical_file_name(&format!("{artist} - title"), "mp3");
        assert_eq!(name, format!("{artist}.mp3"));
    }
}
