//! The streaming transfer engine.
//!
//! `pull` exposes a dataset as a lazy, forward-only sequence of record
//! batches; `push` writes an incoming sequence to a new physical file with
//! all-or-nothing completion. Neither direction ever buffers a whole dataset
//! in memory.

use std::{
    path::{Path, PathBuf},
    pin::Pin,
};

use arrow::{array::RecordBatch, datatypes::SchemaRef};
use futures::{Stream, StreamExt as _, TryStreamExt as _, stream};
use parquet::arrow::{
    AsyncArrowWriter, ParquetRecordBatchStreamBuilder, async_reader::ParquetRecordBatchStream,
};
use tokio::fs::File;

use crate::{Error, Repository, error::not_found_or_io, resolve::ResolvedDataset};

pub type BatchStream = Pin<Box<dyn Stream<Item = Result<RecordBatch, Error>> + Send + 'static>>;

/// A lazy batch sequence paired with the dataset's schema. Consumable exactly
/// once; dropping it releases the underlying file handle.
pub struct DatasetStream {
    pub schema: SchemaRef,
    pub batches: BatchStream,
}

impl std::fmt::Debug for DatasetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStream")
            .field("schema", &self.schema)
            .field("batches", &"<stream>")
            .finish()
    }
}

/// Outcome of a completed push.
#[derive(Debug, Clone, Copy)]
pub struct PushReceipt {
    pub rows: u64,
    pub bytes: u64,
}

impl Repository {
    /// Opens a dataset for reading. Batches are produced on demand as the
    /// consumer advances.
    pub async fn pull(&self, name: &str, resolved: ResolvedDataset) -> Result<DatasetStream, Error> {
        match resolved {
            ResolvedDataset::Plain(path) => pull_file(name, path).await,
            ResolvedDataset::Virtual(shards) => pull_shards(name, shards).await,
        }
    }

    /// Streams an uploaded dataset into `root/identifier`.
    ///
    /// Batches are written through as they arrive. The destination becomes
    /// visible only after the parquet footer is finalized and the staging
    /// file is renamed over it. Any failure, including the request future
    /// being dropped mid-stream, removes the staging file instead.
    pub async fn push<S>(
        &self,
        identifier: &str,
        schema: SchemaRef,
        mut batches: S,
    ) -> Result<PushReceipt, Error>
    where
        S: Stream<Item = Result<RecordBatch, Error>> + Unpin,
    {
        let dest = match self.resolve(identifier).await? {
            ResolvedDataset::Plain(path) => path,
            ResolvedDataset::Virtual(_) => {
                return Err(Error::UnsupportedTarget(identifier.to_string()));
            }
        };

        let (staging, file) = StagingFile::create(identifier, &dest).await?;
        let mut writer = AsyncArrowWriter::try_new(file, schema, None)?;

        let mut rows = 0u64;
        while let Some(batch) = batches.try_next().await? {
            rows += batch.num_rows() as u64;
            writer.write(&batch).await?;
        }
        writer.close().await?;

        let bytes = tokio::fs::metadata(staging.path()).await?.len();
        staging.commit(&dest).await?;
        tracing::debug!(identifier, rows, bytes, "push committed");

        Ok(PushReceipt { rows, bytes })
    }
}

async fn pull_file(name: &str, path: PathBuf) -> Result<DatasetStream, Error> {
    let reader = open_shard(name.to_string(), path).await?;
    Ok(DatasetStream {
        schema: reader.schema().clone(),
        batches: reader.map_err(Error::from).boxed(),
    })
}

/// The concatenation, in shard order, of each shard file's own batch
/// sequence. Shards are opened on demand as the consumer advances past the
/// previous shard's last batch, so at most one file handle is held at a time.
async fn pull_shards(name: &str, shards: Vec<PathBuf>) -> Result<DatasetStream, Error> {
    let mut shards = shards.into_iter();
    let Some(first) = shards.next() else {
        return Err(Error::DatasetNotFound(name.to_string()));
    };

    // The first shard also establishes the schema of the whole sequence.
    let reader = open_shard(name.to_string(), first).await?;
    let schema = reader.schema().clone();

    let name = name.to_string();
    let rest = stream::iter(shards)
        .then(move |shard| {
            let name = name.clone();
            async move { Ok::<_, Error>(open_shard(name, shard).await?.map_err(Error::from)) }
        })
        .try_flatten();

    Ok(DatasetStream {
        schema,
        batches: reader.map_err(Error::from).chain(rest).boxed(),
    })
}

async fn open_shard(name: String, path: PathBuf) -> Result<ParquetRecordBatchStream<File>, Error> {
    let file = File::open(&path)
        .await
        .map_err(|err| not_found_or_io(&name, err))?;
    let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
    Ok(builder.build()?)
}

/// Exclusive staging file for an in-flight push. The destination is never
/// touched until `commit`; dropping the guard without committing removes the
/// staging file, which also covers cancellation mid-write.
struct StagingFile {
    path: PathBuf,
    armed: bool,
}

impl StagingFile {
    async fn create(identifier: &str, dest: &Path) -> Result<(Self, File), Error> {
        let path = staging_path(dest);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => Error::Conflict(identifier.to_string()),
                _ => Error::Io(err),
            })?;
        Ok((Self { path, armed: true }, file))
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically publishes the staging file over the destination.
    async fn commit(mut self, dest: &Path) -> Result<(), Error> {
        tokio::fs::rename(&self.path, dest).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.armed {
            // Runs on the failure path and when the request future is
            // dropped mid-stream, so it cannot be async.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// `<dest>.part`: never matches the repository's `*.parquet` discovery, so a
/// partial write is invisible to list/describe/pull.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
