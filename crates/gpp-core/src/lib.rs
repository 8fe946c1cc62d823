//! Shared building blocks for the GPP trends pipeline.
//!
//! Holds the error taxonomy, the record model, per-row metric derivation,
//! CLI/config settings and number formatting used by the data and binary
//! crates.

pub mod error;
pub mod formatting;
pub mod metrics;
pub mod models;
pub mod settings;
