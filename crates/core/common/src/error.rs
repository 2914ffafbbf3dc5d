use thiserror::Error;

/// Failure taxonomy for repository operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A virtual-dataset identifier with zero or more than one name
    /// separator, or a name that would escape the repository root.
    #[error("malformed dataset identifier '{0}'")]
    MalformedIdentifier(String),

    #[error("dataset not found: '{0}'")]
    DatasetNotFound(String),

    /// No schema can be established for the dataset.
    #[error("no schema available for dataset '{0}'")]
    SchemaUnavailable(String),

    /// The operation is only valid for plain, single-file datasets.
    #[error("operation not supported for virtual dataset '{0}'")]
    UnsupportedTarget(String),

    #[error("unsupported action '{0}'")]
    UnsupportedAction(String),

    /// Another writer holds the destination file.
    #[error("dataset '{0}' is already being written")]
    Conflict(String),

    #[error("repository I/O error")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DatasetNotFound(_))
    }
}

/// Missing files surface as `DatasetNotFound` for the given identifier;
/// everything else stays an I/O failure.
pub(crate) fn not_found_or_io(identifier: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::DatasetNotFound(identifier.to_string())
    } else {
        Error::Io(err)
    }
}
