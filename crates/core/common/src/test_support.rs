//! Shared fixtures for unit tests: a small trips table and a parquet writer
//! for seeding temp repositories.

use std::{path::Path, sync::Arc};

use arrow::{
    array::{Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use parquet::arrow::ArrowWriter;

pub(crate) fn trip_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("city", DataType::Utf8, true),
    ]))
}

/// A batch of `rows` consecutive ids starting at `start`.
pub(crate) fn trip_batch(start: i64, rows: usize) -> RecordBatch {
    let ids = Int64Array::from_iter_values(start..start + rows as i64);
    let cities = StringArray::from_iter_values((0..rows).map(|i| format!("city-{i}")));
    RecordBatch::try_new(trip_schema(), vec![Arc::new(ids), Arc::new(cities)]).unwrap()
}

pub(crate) fn write_parquet(path: &Path, batches: &[RecordBatch]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, trip_schema(), None).unwrap();
    for batch in batches {
        writer.write(batch).unwrap();
    }
    writer.close().unwrap();
}
