use arrow::array::{ArrayRef, StringArray};
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::{
    fs::{self, File},
    path::Path,
    sync::Arc,
};

use crate::error::StageError;

/// Build an all-Utf8 Arrow schema for the given column names. Every table
/// in the pipeline carries its cells as text; values pass through the
/// stages unchanged rather than being re-typed per file.
pub fn utf8_schema(names: &[&str]) -> SchemaRef {
    let fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(*n, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Read a headered, comma-delimited table into a single record batch
/// against a fixed column-name schema. The file's own header row is
/// skipped; its column count must match `names` exactly.
pub fn read_csv(path: &Path, names: &[&str]) -> Result<RecordBatch, StageError> {
    let schema = utf8_schema(names);
    let file = File::open(path)
        .map_err(|e| StageError::input(path, format!("opening table: {e}")))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_delimiter(b',')
        .build(file)
        .map_err(|e| StageError::input(path, format!("creating reader: {e}")))?;

    let mut batches = Vec::new();
    for result in reader {
        let batch = result.map_err(|e| StageError::schema_mismatch(path, e.to_string()))?;
        batches.push(batch);
    }
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    arrow::compute::concat_batches(&schema, &batches)
        .map_err(|e| StageError::schema_mismatch(path, e.to_string()))
}

/// Write a record batch as UTF-8, comma-delimited text with a header row,
/// replacing any previous file wholesale. The parent directory is created
/// if it does not exist yet.
pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StageError::environment(parent, e.to_string()))?;
    }
    let file = File::create(path)
        .map_err(|e| StageError::environment(path, format!("creating table: {e}")))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer
        .write(batch)
        .map_err(|e| StageError::environment(path, format!("writing table: {e}")))
}

/// Assemble string columns into a record batch under the given names.
/// `path` attributes any shape error to the file the columns came from.
pub fn columns_to_batch(
    names: &[&str],
    columns: Vec<Vec<String>>,
    path: &Path,
) -> Result<RecordBatch, StageError> {
    let schema = utf8_schema(names);
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|values| Arc::new(StringArray::from(values)) as ArrayRef)
        .collect();
    RecordBatch::try_new(schema, arrays)
        .map_err(|e| StageError::schema_mismatch(path, e.to_string()))
}
