use std::path::{Path, PathBuf};

use anyhow::Context;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::fs;
use tracing::{debug, trace, warn};

/// URL prefix under which published files are served.
pub const PUBLIC_URL_PREFIX: &str = "/downloads";

/// Characters escaped inside one URL path segment.
pub const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Public URL of a file published under `segments` (relative to the public
/// directory).
pub fn public_url(segments: &[&str]) -> String {
    let mut url = PUBLIC_URL_PREFIX.to_string();
    for segment in segments {
        url.push('/');
        url.extend(utf8_percent_encode(segment, PATH_SEGMENT));
    }
    url
}

/// Move `source` into `public_dir` under `file_name`.
///
/// A plain rename is tried first. When that fails (typically because the two
/// paths live on different filesystems) the file is copied and the source
/// removed afterwards.
#[tracing::instrument]
pub async fn publish_file(
    source: &Path,
    public_dir: &Path,
    file_name: &str,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(public_dir)
        .await
        .with_context(|| format!("Failed to create public directory {}", public_dir.display()))?;

    let destination = public_dir.join(file_name);

    match fs::rename(source, &destination).await {
        Ok(()) => {
            trace!(?destination, "Published by rename");
            return Ok(destination);
        }
        Err(e) => {
            debug!(?e, "Rename failed, falling back to copy");
        }
    }

    fs::copy(source, &destination)
        .await
        .with_context(|| format!("Failed to copy {} into public directory", source.display()))?;

    if let Err(e) = fs::remove_file(source).await {
        warn!(?e, ?source, "Published copy but could not remove source");
    }

    trace!(?destination, "Published by copy");

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_urls_are_escaped() {
        assert_eq!(public_url(&["Mix-ab12.zip"]), "/downloads/Mix-ab12.zip");
        assert_eq!(
            public_url(&["ab12", "A - B #1?.mp3"]),
            "/downloads/ab12/A%20-%20B%20%231%3F.mp3"
        );
    }

    #[tokio::test]
    async fn moves_file_into_public_dir() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let source = root.path().join("bundle.zip");
        std::fs::write(&source, b"zip").expect("write should succeed");
        let public = root.path().join("public");

        let published = publish_file(&source, &public, "out.zip")
            .await
            .expect("publish should succeed");

        assert_eq!(published, public.join("out.zip"));
        assert!(!source.exists());
        assert_eq!(std::fs::read(published).expect("read should succeed"), b"zip");
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let root = tempfile::tempdir().expect("temp dir should be created");

        let res = publish_file(&root.path().join("nope.zip"), root.path(), "out.zip").await;

        assert!(res.is_err());
    }
}
