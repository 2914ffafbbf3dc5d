//! Dataset discovery over the repository root.

use std::{path::PathBuf, pin::Pin};

use futures::{Stream, StreamExt as _, future, stream};
use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::{
    Error, PARQUET_EXT, Repository, VIRTUAL_SUFFIX, descriptor::DatasetDescriptor,
    resolve::ResolvedDataset,
};

pub type DescriptorStream =
    Pin<Box<dyn Stream<Item = Result<DatasetDescriptor, Error>> + Send + 'static>>;

impl Repository {
    /// Enumerates datasets matching a discovery pattern:
    ///
    /// - empty pattern: every `*.parquet` file under the root, recursively;
    /// - a pattern ending in the virtual suffix: that one virtual dataset;
    /// - anything else: a glob over paths relative to the root.
    ///
    /// Descriptors are built lazily as the stream is consumed, in directory
    /// traversal order. A file that disappears or turns unreadable between
    /// the scan and the footer read is skipped, never failing the listing.
    pub async fn list(&self, pattern: &str) -> Result<DescriptorStream, Error> {
        if pattern.ends_with(VIRTUAL_SUFFIX) {
            let resolved = self.resolve(pattern).await?;
            let descriptor = self.describe(pattern, &resolved).await?;
            return Ok(stream::once(future::ready(Ok(descriptor))).boxed());
        }

        let matches = self.matching_files(pattern.to_string()).await?;
        let repository = self.clone();
        let descriptors = async_stream::stream! {
            for path in matches {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let name = name.to_string();
                let target = ResolvedDataset::Plain(path);
                match repository.describe(&name, &target).await {
                    Ok(descriptor) => yield Ok(descriptor),
                    Err(err) => {
                        tracing::warn!("skipping '{name}' while listing: {err}");
                    }
                }
            }
        };
        Ok(descriptors.boxed())
    }

    /// Blocking directory scan, dispatched off the async runtime.
    async fn matching_files(&self, pattern: String) -> Result<Vec<PathBuf>, Error> {
        let repository = self.clone();
        tokio::task::spawn_blocking(move || {
            if pattern.is_empty() {
                Ok(repository.table_files())
            } else {
                repository.globbed_files(&pattern)
            }
        })
        .await
        .map_err(|err| Error::Io(std::io::Error::other(err)))?
    }

    fn table_files(&self) -> Vec<PathBuf> {
        walk_files(self.root().to_path_buf())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(PARQUET_EXT))
            .collect()
    }

    fn globbed_files(&self, pattern: &str) -> Result<Vec<PathBuf>, Error> {
        let matcher = GlobBuilder::new(pattern)
            // `*` must not cross directory boundaries; `**` is for that.
            .literal_separator(true)
            .build()
            .map_err(|_| Error::MalformedIdentifier(pattern.to_string()))?
            .compile_matcher();

        let root = self.root().to_path_buf();
        Ok(walk_files(root.clone())
            .filter(|path| {
                path.strip_prefix(&root)
                    .map(|relative| matcher.is_match(relative))
                    .unwrap_or(false)
            })
            .collect())
    }
}

fn walk_files(root: PathBuf) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
}
