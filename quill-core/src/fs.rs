//! File access seam.
//!
//! The compiler reads templates and writes artifacts exclusively through
//! [`FileStream`]. [`LocalFileStream`] is the disk implementation.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::CoreError;

/// Components of a path, split the way the view layer names them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParts {
    pub dirname: PathBuf,
    /// File name without its final extension.
    pub filename: String,
    pub extension: Option<String>,
}

pub trait FileStream {
    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn get_content(&self, path: &Path) -> Result<String, CoreError>;

    /// Replace the content of `path`. Readers never observe a partially
    /// written file.
    fn put_content(&self, path: &Path, content: &str) -> Result<(), CoreError>;

    fn create_dir(&self, path: &Path) -> Result<(), CoreError>;

    fn modified(&self, path: &Path) -> Result<SystemTime, CoreError>;

    fn paths(&self, path: &Path) -> PathParts {
        PathParts {
            dirname: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            filename: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStream;

impl FileStream for LocalFileStream {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn get_content(&self, path: &Path) -> Result<String, CoreError> {
        Ok(fs::read_to_string(path)?)
    }

    fn put_content(&self, path: &Path, content: &str) -> Result<(), CoreError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|err| err.error)?;
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> Result<(), CoreError> {
        Ok(fs::create_dir_all(path)?)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime, CoreError> {
        Ok(fs::metadata(path)?.modified()?)
    }
}

impl LocalFileStream {
    /// Every template under `root` whose file name ends with `extension`,
    /// in a stable order.
    pub fn templates(&self, root: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>, CoreError> {
        let mut found = Vec::new();
        for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            let matches = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(extension));
            if entry.file_type().is_file() && matches {
                found.push(path.to_path_buf());
            }
        }
        Ok(found)
    }

    /// Remove every regular file under `dir`, returning how many were
    /// removed. A missing directory holds nothing to remove.
    pub fn remove_files(&self, dir: impl AsRef<Path>) -> Result<usize, CoreError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
