pub mod consolidate;
pub mod extract;
pub mod transform;
pub mod unzip;

use crate::graph::{RetryPolicy, TaskGraph};

/// Vehicle table: raw CSV fields 0-3.
pub const VEHICLE_COLUMNS: &[&str] = &[
    "Rowid",
    "Timestamp",
    "Anonymized Vehicle number",
    "Vehicle type",
];

/// Toll-plaza table: raw TSV fields 4-6.
pub const TOLLPLAZA_COLUMNS: &[&str] = &["Number of axles", "Tollplaza id", "Tollplaza code"];

/// Payment table: fixed-width fields 5-6.
pub const PAYMENT_COLUMNS: &[&str] = &["Type of Payment code", "Vehicle Code"];

/// The consolidated table's fixed column order.
pub const CONSOLIDATED_COLUMNS: &[&str] = &[
    "Rowid",
    "Timestamp",
    "Anonymized Vehicle number",
    "Vehicle type",
    "Number of axles",
    "Tollplaza id",
    "Tollplaza code",
    "Type of Payment code",
    "Vehicle Code",
];

/// The column the transformer upper-cases.
pub const VEHICLE_TYPE_COLUMN: &str = "Vehicle type";

/// Declare the five-stage toll pipeline: stager, the three independent
/// extractors, consolidator, transformer. The extractors share a single
/// predecessor and run concurrently.
pub fn build(policy: RetryPolicy) -> TaskGraph {
    let mut graph = TaskGraph::new(policy);
    graph.add_stage("unzip_data", &[], unzip::run);
    graph.add_stage("extract_csv", &["unzip_data"], extract::extract_csv);
    graph.add_stage("extract_tsv", &["unzip_data"], extract::extract_tsv);
    graph.add_stage(
        "extract_fixed_width",
        &["unzip_data"],
        extract::extract_fixed_width,
    );
    graph.add_stage(
        "consolidate_data",
        &["extract_csv", "extract_tsv", "extract_fixed_width"],
        consolidate::run,
    );
    graph.add_stage("transform_data", &["consolidate_data"], transform::run);
    graph
}
