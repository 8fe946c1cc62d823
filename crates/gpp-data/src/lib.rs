//! Data layer for GPP trends.
//!
//! Responsible for resolving and reading the per-year CSV exports, running
//! the derivation and longitudinal aggregation pipeline, and exposing and
//! exporting the resulting table.

pub mod aggregator;
pub mod analysis;
pub mod reader;
pub mod table;
pub mod writer;

pub use gpp_core as core;
