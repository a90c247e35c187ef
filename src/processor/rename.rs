use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, trace};

use super::{collect_files, is_audio_file};
use crate::helpers::sanitize::canonical_file_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Already carries its canonical name.
    Unchanged,
    Renamed(PathBuf),
    /// Another file already had the canonical name; this one was deleted.
    DuplicateRemoved(PathBuf),
}

/// Give `path` its canonical `"{Artist} - {Title}.{ext}"` name, in place.
pub async fn normalize_file(path: &Path) -> io::Result<RenameOutcome> {
    let file_name = path
        .file_name()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();

    let canonical = canonical_file_name(&stem, &ext);
    if canonical == file_name {
        return Ok(RenameOutcome::Unchanged);
    }

    let target = path.with_file_name(&canonical);

    if fs::try_exists(&target).await? && !same_file(path, &target).await {
        trace!(?path, ?target, "Canonical name taken, removing duplicate");
        fs::remove_file(path).await?;
        return Ok(RenameOutcome::DuplicateRemoved(target));
    }

    debug!(?path, ?target, "Renaming");
    fs::rename(path, &target).await?;

    Ok(RenameOutcome::Renamed(target))
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Normalize every audio file below `root`. Failures are reported per file.
pub async fn normalize_dir(root: &Path) -> io::Result<Vec<(PathBuf, io::Result<RenameOutcome>)>> {
    let mut results = Vec::new();

    for path in collect_files(root, is_audio_file).await? {
        let outcome = normalize_file(&path).await;
        results.push((path, outcome));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renames_to_canonical_form() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let path = root.path().join("01._Artist_-_Song_(Official_Video).mp3");
        std::fs::write(&path, b"audio").expect("write should succeed");

        let outcome = normalize_file(&path).await.expect("rename should succeed");

        let expected = root.path().join("Artist - Song.mp3");
        assert_eq!(outcome, RenameOutcome::Renamed(expected.clone()));
        assert!(expected.is_file());
        assert!(!path.exists());

        assert_eq!(
            normalize_file(&expected).await.expect("second pass should succeed"),
            RenameOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn second_job_leaves_normalized_files_alone() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let first = root.path().join("(Live)_07._Song.mp3");
        let other = root.path().join("Song - Other.mp3");
        std::fs::write(&first, b"live").expect("write should succeed");
        std::fs::write(&other, b"other").expect("write should succeed");

        let once = normalize_dir(root.path()).await.expect("scan should succeed");
        assert_eq!(once.len(), 2);

        let twice = normalize_dir(root.path()).await.expect("scan should succeed");
        for (path, outcome) in twice {
            assert_eq!(
                outcome.expect("rename should succeed"),
                RenameOutcome::Unchanged,
                "{path:?} changed on the second pass"
            );
        }
        assert_eq!(
            std::fs::read(root.path().join("Song.mp3")).expect("read should succeed"),
            b"live"
        );
        assert!(other.is_file());
    }

    #[tokio::test]
    async fn duplicate_is_removed() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let keep = root.path().join("Artist - Song.mp3");
        let dup = root.path().join("Artist_-_Song_[Lyrics].mp3");
        std::fs::write(&keep, b"first").expect("write should succeed");
        std::fs::write(&dup, b"second").expect("write should succeed");

        let results = normalize_dir(root.path()).await.expect("normalize should succeed");

        let outcomes = results
            .into_iter()
            .map(|(_, r)| r.expect("each file should be handled"))
            .collect::<Vec<_>>();
        assert!(outcomes.contains(&RenameOutcome::DuplicateRemoved(keep.clone())));
        assert!(outcomes.contains(&RenameOutcome::Unchanged));
        assert!(!dup.exists());
        assert_eq!(std::fs::read(&keep).expect("read should succeed"), b"first");
    }

    #[tokio::test]
    async fn normalizing_twice_changes_nothing() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let nested = root.path().join("Mix");
        std::fs::create_dir_all(&nested).expect("mkdir should succeed");
        std::fs::write(nested.join("02._A_-_B.opus"), b"x").expect("write should succeed");
        std::fs::write(nested.join("Only_Title.mp3"), b"x").expect("write should succeed");

        normalize_dir(root.path()).await.expect("first pass should succeed");
        let second = normalize_dir(root.path()).await.expect("second pass should succeed");

        assert!(second
            .into_iter()
            .all(|(_, r)| r.expect("ok") == RenameOutcome::Unchanged));
        assert!(nested.join("A - B.opus").is_file());
        assert!(nested.join("Only Title.mp3").is_file());
    }
}
