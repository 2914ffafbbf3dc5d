pub mod actions;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod repository;
pub mod resolve;
pub mod transfer;

mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;
pub use repository::Repository;

/// The canonical extension of every table file in the repository.
pub const PARQUET_EXT: &str = "parquet";

/// Identifier suffix marking a multi-shard virtual dataset.
pub const VIRTUAL_SUFFIX: &str = ".dataset";

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type BoxResult<T> = Result<T, BoxError>;
