use std::path::{Path, PathBuf};

use fs_err as fs;

use crate::Error;

/// Handle to the repository root directory, injected into every component at
/// construction. The filesystem is the only durable store: list, describe and
/// pull re-derive their facts from disk on every call, so there is no cache
/// to invalidate.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Opens an existing repository root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("repository root '{}' does not exist", root.display()),
            )));
        }
        Ok(Self { root })
    }

    /// Opens the repository root, creating the directory first if absent.
    /// Serving must not begin before this has succeeded.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
