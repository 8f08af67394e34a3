//! Exports the [`build`] function which stitches together the high-level
//! steps of a site build: walking and loading the content directory
//! ([`crate::walk`]) and running the transformation pipeline
//! ([`crate::pipeline`]). The returned store is final; nothing mutates it
//! after `build` returns.

use crate::pipeline;
use crate::store::Store;
use crate::walk;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Builds the page map for the content directory at `root`. The walk runs to
/// completion (every file loaded) before the first pipeline stage; the first
/// error anywhere aborts the build and no partial store is returned.
pub fn build(root: &Path) -> Result<Store> {
    let mut store = Store::new();
    walk::walk(root, &mut store)?;
    info!(pages = store.len(), "walk complete");
    pipeline::run(&mut store)?;
    info!(pages = store.len(), "pipeline complete");
    Ok(store)
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site: either discovery/loading failed or a
/// pipeline stage did.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors while walking or loading the content directory.
    Walk(walk::Error),

    /// Returned for errors in a pipeline stage.
    Pipeline(pipeline::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Walk(err) => err.fmt(f),
            Error::Pipeline(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Walk(err) => Some(err),
            Error::Pipeline(err) => Some(err),
        }
    }
}

impl From<walk::Error> for Error {
    /// Converts [`walk::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: walk::Error) -> Error {
        Error::Walk(err)
    }
}

impl From<pipeline::Error> for Error {
    /// Converts [`pipeline::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: pipeline::Error) -> Error {
        Error::Pipeline(err)
    }
}
