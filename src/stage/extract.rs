use arrow::record_batch::RecordBatch;
use csv::ReaderBuilder;
use std::{fs, path::Path};
use tracing::{info, instrument};

use crate::{
    config::PipelineConfig,
    error::StageError,
    stage::{PAYMENT_COLUMNS, TOLLPLAZA_COLUMNS, VEHICLE_COLUMNS},
    table,
};

/// Character widths of the payment file's layout. Fields 5 and 6 carry the
/// payment-type code and vehicle code.
pub const FIXED_WIDTHS: [usize; 7] = [6, 25, 7, 9, 10, 4, 6];

const PAYMENT_FIELDS: [usize; 2] = [5, 6];

/// CSV extractor: vehicle fields 0-3 of the comma-delimited raw file.
#[instrument(level = "info", skip(config))]
pub fn extract_csv(config: &PipelineConfig) -> Result<(), StageError> {
    let source = config.vehicle_csv();
    let batch = project_delimited(&source, b',', &[0, 1, 2, 3], VEHICLE_COLUMNS)?;
    info!(rows = batch.num_rows(), source = %source.display(), "extracted vehicle table");
    table::write_csv(&batch, &config.vehicle_table())
}

/// TSV extractor: toll-plaza fields 4-6 of the tab-delimited raw file.
#[instrument(level = "info", skip(config))]
pub fn extract_tsv(config: &PipelineConfig) -> Result<(), StageError> {
    let source = config.tollplaza_tsv();
    let batch = project_delimited(&source, b'\t', &[4, 5, 6], TOLLPLAZA_COLUMNS)?;
    info!(rows = batch.num_rows(), source = %source.display(), "extracted toll-plaza table");
    table::write_csv(&batch, &config.tollplaza_table())
}

/// Fixed-width extractor: payment fields 5-6 of the width-delimited raw
/// file. Every line is data; there is no header row to skip.
#[instrument(level = "info", skip(config))]
pub fn extract_fixed_width(config: &PipelineConfig) -> Result<(), StageError> {
    let source = config.payment_txt();
    let batch = project_fixed_width(&source, &FIXED_WIDTHS, &PAYMENT_FIELDS, PAYMENT_COLUMNS)?;
    info!(rows = batch.num_rows(), source = %source.display(), "extracted payment table");
    table::write_csv(&batch, &config.payment_table())
}

/// Read a delimited raw file, skip its header row, and project the given
/// field positions into a renamed table. A record missing one of the
/// selected fields fails the stage; rows are never silently dropped.
fn project_delimited(
    path: &Path,
    delimiter: u8,
    fields: &[usize],
    names: &[&str],
) -> Result<RecordBatch, StageError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StageError::input(path, format!("opening: {e}")))?;

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); fields.len()];
    for (idx, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| StageError::input(path, format!("record {idx}: {e}")))?;
        for (slot, &field) in fields.iter().enumerate() {
            let value = record.get(field).ok_or_else(|| {
                StageError::input(
                    path,
                    format!(
                        "record {idx} has {} fields, needs at least {}",
                        record.len(),
                        field + 1
                    ),
                )
            })?;
            columns[slot].push(value.to_string());
        }
    }

    table::columns_to_batch(names, columns, path)
}

/// Slice every line of a fixed-width file at the offsets the widths
/// imply, trim each cell, and project the given field positions. Width
/// conformance is checked upfront: a line that does not reach the start
/// of the last field fails the stage. The final field tolerates a ragged
/// right edge.
fn project_fixed_width(
    path: &Path,
    widths: &[usize],
    fields: &[usize],
    names: &[&str],
) -> Result<RecordBatch, StageError> {
    let text = fs::read_to_string(path)
        .map_err(|e| StageError::input(path, format!("opening: {e}")))?;

    let mut starts = Vec::with_capacity(widths.len());
    let mut offset = 0;
    for width in widths {
        starts.push(offset);
        offset += width;
    }
    let last_start = *starts.last().expect("layout has at least one field");

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); fields.len()];
    for (lineno, line) in text.lines().enumerate() {
        // Offsets are character positions, as the layout defines them.
        let chars: Vec<char> = line.chars().collect();
        if chars.len() < last_start {
            return Err(StageError::input(
                path,
                format!(
                    "line {} is {} chars wide, expected at least {}",
                    lineno + 1,
                    chars.len(),
                    last_start
                ),
            ));
        }
        for (slot, &field) in fields.iter().enumerate() {
            let start = starts[field];
            let end = (start + widths[field]).min(chars.len());
            let cell: String = chars[start..end].iter().collect();
            columns[slot].push(cell.trim().to_string());
        }
    }

    table::columns_to_batch(names, columns, path)
}
