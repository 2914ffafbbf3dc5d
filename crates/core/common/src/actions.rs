//! Administrative actions.
//!
//! Action names arrive as strings on the wire; they are decided once at the
//! protocol boundary and carried as a closed enum from there on.

use std::str::FromStr;

use crate::{Error, Repository, error::not_found_or_io, resolve::ResolvedDataset};

/// The closed set of supported administrative actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Delete a plain dataset's backing file.
    DropDataset,
}

impl Action {
    /// Every action the server advertises.
    pub const ALL: &'static [Action] = &[Action::DropDataset];

    pub const fn name(&self) -> &'static str {
        match self {
            Action::DropDataset => "drop_dataset",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Action::DropDataset => "Delete a dataset.",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_dataset" => Ok(Action::DropDataset),
            other => Err(Error::UnsupportedAction(other.to_string())),
        }
    }
}

impl Repository {
    /// Executes an administrative action against the repository.
    pub async fn act(&self, action: Action, payload: &str) -> Result<(), Error> {
        match action {
            Action::DropDataset => self.drop_dataset(payload).await,
        }
    }

    /// Deletes the backing file of a plain dataset. Not transactional with
    /// in-flight pulls of the same file: the unlinked inode lets them finish.
    async fn drop_dataset(&self, identifier: &str) -> Result<(), Error> {
        let path = match self.resolve(identifier).await? {
            ResolvedDataset::Plain(path) => path,
            ResolvedDataset::Virtual(_) => {
                return Err(Error::UnsupportedTarget(identifier.to_string()));
            }
        };
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| not_found_or_io(identifier, err))?;
        tracing::info!("dropped dataset '{identifier}'");
        Ok(())
    }
}
