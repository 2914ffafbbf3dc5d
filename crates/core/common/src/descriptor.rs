//! Protocol descriptors: schema, cardinality and byte size, produced from
//! parquet footers without materializing any row data.

use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use tokio::fs::File;

use crate::{Error, Repository, error::not_found_or_io, resolve::ResolvedDataset};

/// Metadata summary of one dataset, returned without transferring rows.
#[derive(Debug, Clone)]
pub struct DatasetDescriptor {
    pub name: String,
    pub schema: SchemaRef,
    /// Exact row count; `None` when cardinality is unknown.
    pub total_records: Option<i64>,
    /// Serialized size in bytes. `None` for virtual datasets: no single
    /// contiguous byte size exists for a composite.
    pub total_bytes: Option<u64>,
}

impl Repository {
    /// Builds the descriptor for a resolved dataset.
    pub async fn describe(
        &self,
        name: &str,
        resolved: &ResolvedDataset,
    ) -> Result<DatasetDescriptor, Error> {
        match resolved {
            ResolvedDataset::Plain(path) => describe_file(name, path).await,
            ResolvedDataset::Virtual(shards) => describe_shards(name, shards).await,
        }
    }
}

async fn describe_file(name: &str, path: &Path) -> Result<DatasetDescriptor, Error> {
    let (schema, rows) = read_footer(name, path).await?;
    let bytes = tokio::fs::metadata(path)
        .await
        .map_err(|err| not_found_or_io(name, err))?
        .len();
    Ok(DatasetDescriptor {
        name: name.to_string(),
        schema,
        total_records: Some(rows),
        total_bytes: Some(bytes),
    })
}

/// Shard schemas are required to agree; the first shard's footer establishes
/// the schema and the row count is the exact sum over all shard footers.
async fn describe_shards(name: &str, shards: &[PathBuf]) -> Result<DatasetDescriptor, Error> {
    let Some(first) = shards.first() else {
        // A virtual dataset with no backing files does not exist.
        return Err(Error::DatasetNotFound(name.to_string()));
    };

    let (schema, mut rows) = read_footer(name, first).await?;
    for shard in &shards[1..] {
        let (_, shard_rows) = read_footer(name, shard).await?;
        rows += shard_rows;
    }

    Ok(DatasetDescriptor {
        name: name.to_string(),
        schema,
        total_records: Some(rows),
        total_bytes: None,
    })
}

/// Schema and exact row count from a parquet footer.
async fn read_footer(name: &str, path: &Path) -> Result<(SchemaRef, i64), Error> {
    let file = File::open(path)
        .await
        .map_err(|err| not_found_or_io(name, err))?;
    let builder = ParquetRecordBatchStreamBuilder::new(file).await?;
    let rows = builder.metadata().file_metadata().num_rows();
    Ok((builder.schema().clone(), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{trip_batch, trip_schema, write_parquet};

    #[tokio::test]
    async fn plain_descriptor_matches_the_footer_and_file_length() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();
        let path = temp_dir.path().join("trips.parquet");
        write_parquet(&path, &[trip_batch(0, 3), trip_batch(3, 4)]);

        let resolved = repository.resolve("trips.parquet").await.unwrap();
        let descriptor = repository.describe("trips.parquet", &resolved).await.unwrap();

        assert_eq!(descriptor.name, "trips.parquet");
        assert_eq!(descriptor.schema, trip_schema());
        assert_eq!(descriptor.total_records, Some(7));
        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(descriptor.total_bytes, Some(on_disk));
    }

    #[tokio::test]
    async fn missing_plain_dataset_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let resolved = repository.resolve("missing.parquet").await.unwrap();
        let err = repository
            .describe("missing.parquet", &resolved)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn virtual_descriptor_sums_shard_rows_with_unknown_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();
        write_parquet(
            &temp_dir.path().join("sales_001.parquet"),
            &[trip_batch(0, 100)],
        );
        write_parquet(
            &temp_dir.path().join("sales_002.parquet"),
            &[trip_batch(100, 150)],
        );

        let resolved = repository.resolve("sales.dataset").await.unwrap();
        let descriptor = repository.describe("sales.dataset", &resolved).await.unwrap();

        assert_eq!(descriptor.total_records, Some(250));
        assert_eq!(descriptor.total_bytes, None);
        assert_eq!(descriptor.schema, trip_schema());
    }

    #[tokio::test]
    async fn virtual_dataset_without_shards_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repository = Repository::open(temp_dir.path()).unwrap();

        let resolved = repository.resolve("sales.dataset").await.unwrap();
        let err = repository.describe("sales.dataset", &resolved).await.unwrap_err();

        assert!(err.is_not_found());
    }
}
