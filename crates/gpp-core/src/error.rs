use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the GPP trends pipeline.
#[derive(Error, Debug)]
pub enum GppError {
    /// A configured sample year has no usable source, or a forest is absent
    /// from a configured year while strict coverage is required.
    #[error("Missing source data for sample year {year}: {reason}")]
    MissingSourceData { year: i32, reason: String },

    /// A row lacks a required field or carries a non-numeric value where a
    /// number is required. `row` is 1-based over data rows; 0 is the header.
    #[error("Malformed record in {source_name} at row {row}: {message}")]
    MalformedRecord {
        source_name: String,
        row: usize,
        message: String,
    },

    /// The administrative area converts to a non-positive (or non-finite)
    /// number of square kilometres.
    #[error("Invalid area for forest {forest_id} in {year}: {acres} acres")]
    InvalidArea { forest_id: i64, year: i32, acres: f64 },

    /// The same forest appears twice for one sample year.
    #[error("Duplicate year {year} in series for forest {forest_id}")]
    DuplicateYearInSeries { forest_id: i64, year: i32 },

    /// The CSV reader or writer failed for the named source in a way not
    /// covered by a more specific variant.
    #[error("CSV error in {source_name}: {error}")]
    Csv {
        source_name: String,
        #[source]
        error: csv::Error,
    },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GppError {
    /// Whether a row-level policy may drop the offending row instead of
    /// aborting the run.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            GppError::MalformedRecord { .. } | GppError::InvalidArea { .. }
        )
    }
}

/// Convenience alias used throughout the GPP crates.
pub type Result<T> = std::result::Result<T, GppError>;
