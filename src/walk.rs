//! File discovery and loading. The walker enumerates the content directory
//! one filesystem operation at a time (the traversal is strictly serial, so
//! nothing ever races on the shared store), derives a canonical URL for each
//! entry, and hands regular files to the loader, which reads their full text
//! into the record's `data` field. Neither the walker nor the loader
//! interprets file extensions; classification belongs to the pipeline so a
//! new format means a new stage, not a walker change.

use crate::store::{Page, Store};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Recursively visits every entry under `root`, filling `store` with one
/// record per derived URL. Directories produce a redirect record at their
/// non-slash URL plus an (initially empty) record at the slash URL; regular
/// files are loaded in full. Backup and temporary files (leading `#`,
/// leading `.#`, trailing `~`) are pruned entirely and never enter the
/// store. The first filesystem error aborts the whole walk.
pub fn walk(root: &Path, store: &mut Store) -> Result<()> {
    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_backup(entry));

    for result in entries {
        let entry = result?;
        let url = derive_url(root, entry.path())?;
        if entry.file_type().is_dir() {
            debug!(url = %url, "found directory");
            if url == "/" {
                store.entry(url).or_default();
            } else {
                let slash = format!("{url}/");
                store.insert(url.clone(), Page::redirect(&url, &slash));
                store.entry(slash).or_default();
            }
        } else {
            load(entry.path(), url, store)?;
        }
    }
    Ok(())
}

/// Reads a regular file's full text into `data` on the record at `url`,
/// creating the record if absent.
fn load(path: &Path, url: String, store: &mut Store) -> Result<()> {
    debug!(url = %url, path = %path.display(), "loading file");
    let data = std::fs::read_to_string(path).map_err(|err| Error::ReadFile {
        path: path.to_owned(),
        err,
    })?;
    store.entry(url).or_default().data = Some(data);
    Ok(())
}

/// Matches emacs-style backup and temporary filenames: leading `#`, leading
/// `.#`, or trailing `~`. Never matches the walk root itself.
fn is_backup(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('#') || name.starts_with(".#") || name.ends_with('~')
}

/// Derives the store key for a filesystem entry: the path relative to the
/// walk root, rooted at `/`. The root itself maps to `/`. Keys keep their
/// file extension; stripping is the pipeline's job.
fn derive_url(root: &Path, path: &Path) -> Result<String> {
    // strip_prefix can't fail: every walked path is under `root`
    let relative = path.strip_prefix(root).unwrap();
    let mut url = String::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| Error::NonUtf8Path(path.to_owned()))?;
        url.push('/');
        url.push_str(part);
    }
    if url.is_empty() {
        url.push('/');
    }
    Ok(url)
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for walking and loading the content directory. Every
/// variant is fatal: the build returns no partial store.
#[derive(Debug)]
pub enum Error {
    /// Returned when traversal fails (missing directory, permission denied).
    Walk(walkdir::Error),

    /// Returned when reading a discovered file fails.
    ReadFile { path: PathBuf, err: std::io::Error },

    /// Returned for path components that are not valid UTF-8 and therefore
    /// can't become part of a URL.
    NonUtf8Path(PathBuf),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Walk(err) => err.fmt(f),
            Error::ReadFile { path, err } => {
                write!(f, "Reading file '{}': {}", path.display(), err)
            }
            Error::NonUtf8Path(path) => {
                write!(f, "Path '{}' is not valid UTF-8", path.display())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Walk(err) => Some(err),
            Error::ReadFile { path: _, err } => Some(err),
            Error::NonUtf8Path(_) => None,
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts [`walkdir::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator on traversal results.
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}
