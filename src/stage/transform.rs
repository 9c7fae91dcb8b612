use arrow::array::{ArrayRef, StringArray};
use arrow::record_batch::RecordBatch;
use std::{path::Path, sync::Arc};
use tracing::{info, instrument};

use crate::{
    config::PipelineConfig,
    error::StageError,
    stage::{CONSOLIDATED_COLUMNS, VEHICLE_TYPE_COLUMN},
    table,
};

/// Transformer: upper-case the vehicle-type column of the consolidated
/// table and write the final table. All other columns pass through
/// unchanged.
#[instrument(level = "info", skip(config))]
pub fn run(config: &PipelineConfig) -> Result<(), StageError> {
    let source = config.consolidated_table();
    let batch = table::read_csv(&source, CONSOLIDATED_COLUMNS)?;
    let transformed = uppercase_column(&batch, VEHICLE_TYPE_COLUMN, &source)?;
    info!(rows = transformed.num_rows(), "transformed");
    table::write_csv(&transformed, &config.final_table())
}

/// Rebuild the batch with one string column upper-cased.
fn uppercase_column(
    batch: &RecordBatch,
    name: &str,
    source: &Path,
) -> Result<RecordBatch, StageError> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| StageError::schema_mismatch(source, format!("missing column {name:?}")))?;

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (i, column) in batch.columns().iter().enumerate() {
        if i != index {
            columns.push(column.clone());
            continue;
        }
        let values = column
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                StageError::schema_mismatch(source, format!("column {name:?} is not text"))
            })?;
        let upper: StringArray = values
            .iter()
            .map(|cell| cell.map(|v| v.to_uppercase()))
            .collect();
        columns.push(Arc::new(upper) as ArrayRef);
    }

    RecordBatch::try_new(batch.schema(), columns)
        .map_err(|e| StageError::schema_mismatch(source, e.to_string()))
}
