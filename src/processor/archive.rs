use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::trace;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Write `files` into a new zip at `zip_path`, each entry named by its path
/// relative to `root`.
#[tracing::instrument(skip(files), fields(files = files.len()))]
pub async fn build_zip(root: PathBuf, files: Vec<PathBuf>, zip_path: PathBuf) -> anyhow::Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let zip_file = std::fs::File::create(&zip_path)
            .with_context(|| format!("Failed to create {}", zip_path.display()))?;
        let mut zip = ZipWriter::new(BufWriter::new(zip_file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for file in &files {
            let entry_name = entry_name(&root, file)?;
            trace!(?entry_name, "Adding file to zip");

            zip.start_file(entry_name, options)?;
            let mut source = std::fs::File::open(file)
                .with_context(|| format!("Failed to open {}", file.display()))?;
            std::io::copy(&mut source, &mut zip)?;
        }

        zip.finish()?.flush()?;

        Ok(zip_path)
    })
    .await?
}

fn entry_name(root: &Path, file: &Path) -> anyhow::Result<String> {
    let relative = file
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", file.display(), root.display()))?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
