pub mod archive;
pub mod rename;

use std::path::{Path, PathBuf};

/// Audio formats the extractor can leave behind.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "flac", "wav", "aac"];
/// Intermediate containers, only kept when the conversion step does not
/// delete them.
pub const CONTAINER_EXTENSIONS: &[&str] = &["webm", "mp4", "mkv"];

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .is_some_and(|x| extensions.iter().any(|e| e.eq_ignore_ascii_case(x)))
}

pub fn is_audio_file(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

pub fn is_container_file(path: &Path) -> bool {
    has_extension(path, CONTAINER_EXTENSIONS)
}

/// Every file below `root` (recursively) accepted by `keep`, sorted.
/// Hidden files and directories are skipped.
pub async fn collect_files<F>(root: &Path, keep: F) -> std::io::Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && keep(&path) {
                found.push(path);
            }
        }
    }

    found.sort();

    Ok(found)
}
