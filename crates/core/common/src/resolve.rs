//! Dataset identifier resolution.
//!
//! A client-visible identifier is either *plain* (exactly one physical file
//! under the repository root) or *virtual* (it ends with [`VIRTUAL_SUFFIX`]
//! and the portion before the suffix names a family of shard files
//! `<prefix>_*.parquet`). The plain/virtual decision is made once, here, and
//! carried as a typed value through the rest of the pipeline.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::{Error, PARQUET_EXT, Repository, VIRTUAL_SUFFIX};

/// A dataset identifier resolved against the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDataset {
    /// A single physical file. Existence is not checked at resolution time;
    /// callers check on first access.
    Plain(PathBuf),
    /// The ordered shard set of a virtual dataset. Lexicographic path order
    /// determines batch emission order and must be reproducible across
    /// resolutions of the same identifier.
    Virtual(Vec<PathBuf>),
}

impl Repository {
    /// Resolves an opaque identifier to a physical target. Only the virtual
    /// case touches the filesystem (the recursive shard search).
    pub async fn resolve(&self, identifier: &str) -> Result<ResolvedDataset, Error> {
        validate_identifier(identifier)?;
        match shard_prefix(identifier)? {
            Some(prefix) => {
                let repository = self.clone();
                let prefix = prefix.to_string();
                let shards = tokio::task::spawn_blocking(move || repository.find_shards(&prefix))
                    .await
                    .map_err(|err| Error::Io(std::io::Error::other(err)))?;
                Ok(ResolvedDataset::Virtual(shards))
            }
            None => Ok(ResolvedDataset::Plain(self.root().join(identifier))),
        }
    }

    /// Every file matching `<prefix>_*.parquet` under the root, recursively,
    /// sorted lexicographically by path.
    pub(crate) fn find_shards(&self, prefix: &str) -> Vec<PathBuf> {
        let needle = format!("{prefix}_");
        let mut shards: Vec<PathBuf> = WalkDir::new(self.root())
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_shard_file(path, &needle))
            .collect();
        shards.sort();
        shards
    }
}

/// Splits the shard prefix out of a virtual-dataset identifier. Returns
/// `None` for plain identifiers. A virtual identifier must contain exactly
/// one name separator: the `.` introducing the suffix.
fn shard_prefix(identifier: &str) -> Result<Option<&str>, Error> {
    let Some(prefix) = identifier.strip_suffix(VIRTUAL_SUFFIX) else {
        return Ok(None);
    };
    if prefix.is_empty() || prefix.contains('.') {
        return Err(Error::MalformedIdentifier(identifier.to_string()));
    }
    Ok(Some(prefix))
}

/// Client-supplied names must stay inside the repository root.
fn validate_identifier(identifier: &str) -> Result<(), Error> {
    let path = Path::new(identifier);
    let escapes = identifier.is_empty()
        || path.is_absolute()
        || path
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
    if escapes {
        return Err(Error::MalformedIdentifier(identifier.to_string()));
    }
    Ok(())
}

fn is_shard_file(path: &Path, needle: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    name.starts_with(needle)
        && path.extension().and_then(|ext| ext.to_str()) == Some(PARQUET_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{trip_batch, write_parquet};

    #[tokio::test]
    async fn plain_identifier_resolves_under_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let resolved = repository.resolve("sales_001.parquet").await.unwrap();

        assert_eq!(
            resolved,
            ResolvedDataset::Plain(temp_dir.path().join("sales_001.parquet"))
        );
    }

    #[tokio::test]
    async fn virtual_identifier_collects_shards_in_lexicographic_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();
        // Written out of order on purpose; nested shards count too.
        write_parquet(&temp_dir.path().join("sales_002.parquet"), &[trip_batch(0, 1)]);
        write_parquet(&temp_dir.path().join("sales_001.parquet"), &[trip_batch(0, 1)]);
        write_parquet(
            &temp_dir.path().join("archive/sales_000.parquet"),
            &[trip_batch(0, 1)],
        );

        let resolved = repository.resolve("sales.dataset").await.unwrap();

        let ResolvedDataset::Virtual(shards) = resolved else {
            panic!("expected a virtual dataset");
        };
        let mut expected = vec![
            temp_dir.path().join("archive/sales_000.parquet"),
            temp_dir.path().join("sales_001.parquet"),
            temp_dir.path().join("sales_002.parquet"),
        ];
        expected.sort();
        assert_eq!(shards, expected);
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();
        for name in ["sales_b.parquet", "sales_a.parquet", "sales_c.parquet"] {
            write_parquet(&temp_dir.path().join(name), &[trip_batch(0, 1)]);
        }

        let first = repository.resolve("sales.dataset").await.unwrap();
        let second = repository.resolve("sales.dataset").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unrelated_files_are_not_shards() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();
        write_parquet(&temp_dir.path().join("sales_001.parquet"), &[trip_batch(0, 1)]);
        write_parquet(&temp_dir.path().join("orders_001.parquet"), &[trip_batch(0, 1)]);
        write_parquet(&temp_dir.path().join("sales.parquet"), &[trip_batch(0, 1)]);

        let resolved = repository.resolve("sales.dataset").await.unwrap();

        assert_eq!(
            resolved,
            ResolvedDataset::Virtual(vec![temp_dir.path().join("sales_001.parquet")])
        );
    }

    #[tokio::test]
    async fn empty_shard_match_is_not_a_resolution_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let resolved = repository.resolve("sales.dataset").await.unwrap();

        assert_eq!(resolved, ResolvedDataset::Virtual(vec![]));
    }

    #[tokio::test]
    async fn extra_name_separators_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let err = repository.resolve("sales.eu.dataset").await.unwrap_err();

        assert!(matches!(err, Error::MalformedIdentifier(_)));
    }

    #[tokio::test]
    async fn empty_shard_prefix_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let err = repository.resolve(".dataset").await.unwrap_err();

        assert!(matches!(err, Error::MalformedIdentifier(_)));
    }

    #[tokio::test]
    async fn identifiers_cannot_escape_the_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        for identifier in ["../outside.parquet", "/etc/passwd", "a/../../b.parquet", ""] {
            let err = repository.resolve(identifier).await.unwrap_err();
            assert!(
                matches!(err, Error::MalformedIdentifier(_)),
                "identifier {identifier:?} should be rejected"
            );
        }
    }
}
