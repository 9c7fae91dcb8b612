use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::{path::Path, sync::Arc};
use tracing::{info, instrument};

use crate::{
    config::PipelineConfig,
    error::StageError,
    stage::{PAYMENT_COLUMNS, TOLLPLAZA_COLUMNS, VEHICLE_COLUMNS},
    table,
};

/// Consolidator: zip the three intermediate tables by row position into
/// the fixed nine-column table. The inputs are bound to fixed roles from
/// the config, so the output column order never depends on call order.
#[instrument(level = "info", skip(config))]
pub fn run(config: &PipelineConfig) -> Result<(), StageError> {
    let vehicles = table::read_csv(&config.vehicle_table(), VEHICLE_COLUMNS)?;
    let plazas = table::read_csv(&config.tollplaza_table(), TOLLPLAZA_COLUMNS)?;
    let payments = table::read_csv(&config.payment_table(), PAYMENT_COLUMNS)?;

    let out_path = config.consolidated_table();
    let consolidated = concat_columns(&[&vehicles, &plazas, &payments], &out_path)?;
    info!(rows = consolidated.num_rows(), "consolidated");
    table::write_csv(&consolidated, &out_path)
}

/// Concatenate the parts' columns side by side. Row order is the only
/// join key, so unequal row counts would silently misalign records; they
/// are rejected here instead.
fn concat_columns(parts: &[&RecordBatch], out_path: &Path) -> Result<RecordBatch, StageError> {
    let counts: Vec<usize> = parts.iter().map(|p| p.num_rows()).collect();
    if counts.windows(2).any(|w| w[0] != w[1]) {
        let shape = counts
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(" / ");
        return Err(StageError::schema_mismatch(
            out_path,
            format!("row counts differ across intermediate tables: {shape}"),
        ));
    }

    let mut fields = Vec::new();
    let mut columns = Vec::new();
    for part in parts {
        fields.extend(part.schema().fields().iter().cloned());
        columns.extend(part.columns().iter().cloned());
    }
    let schema: SchemaRef = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, columns)
        .map_err(|e| StageError::schema_mismatch(out_path, e.to_string()))
}
