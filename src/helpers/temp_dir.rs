use std::{
    env,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use super::id::short_id;

/// Scratch directory removed (with its contents) when dropped.
#[derive(Debug)]
pub struct TempDir {
    path: PathBuf,
}
impl TempDir {
    pub fn new<T: Into<OsString>>(dir_name: T) -> Result<Self, std::io::Error> {
        let path = env::temp_dir().join(dir_name.into());

        fs::create_dir_all(&path)?;

        Ok(Self { path })
    }

    pub fn with_prefix<T: Into<OsString>>(dir_name_prefix: T) -> Result<Self, std::io::Error> {
        let mut f: OsString = dir_name_prefix.into();
        f.push(short_id());
        Self::new(f)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
