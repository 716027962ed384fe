use std::io;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Search the current directory and its parents for `filename`.
///
/// Returns `Ok(None)` when nothing is found, or
/// [`Error::DotenvNotFound`] if `raise_error_if_not_found` is set.
pub fn find_dotenv(
    filename: impl AsRef<Path>,
    raise_error_if_not_found: bool,
) -> Result<Option<PathBuf>, Error> {
    let cwd = std::env::current_dir()?;
    find_dotenv_from(cwd, filename, raise_error_if_not_found)
}

/// Like [`find_dotenv`], starting at `start` instead of the current
/// directory. A file as `start` means its parent directory.
pub fn find_dotenv_from(
    start: impl AsRef<Path>,
    filename: impl AsRef<Path>,
    raise_error_if_not_found: bool,
) -> Result<Option<PathBuf>, Error> {
    let start = start.as_ref();
    let filename = filename.as_ref();

    for dir in walk_to_root(start)? {
        let candidate = dir.join(filename);
        if candidate.exists() && !candidate.is_dir() {
            tracing::debug!(path = %candidate.display(), "found dotenv file");
            return Ok(Some(candidate));
        }
    }

    if raise_error_if_not_found {
        return Err(Error::DotenvNotFound {
            filename: filename.display().to_string(),
            start: start.to_path_buf(),
        });
    }
    Ok(None)
}

/// Directories from `path` up to the filesystem root, nearest first.
pub fn walk_to_root(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("starting path {} not found", path.display()),
        )));
    }

    let dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or(path)
    };
    let absolute = std::path::absolute(dir)?;
    Ok(absolute.ancestors().map(Path::to_path_buf).collect())
}
