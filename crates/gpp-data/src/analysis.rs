//! Main pipeline for GPP trends.
//!
//! Orchestrates loading, per-row derivation, coverage checks and
//! longitudinal aggregation, returning an [`AnalysisResult`] ready for the
//! presentation layer.

use chrono::Utc;
use gpp_core::error::{GppError, Result};
use gpp_core::metrics::derive;
use gpp_core::models::{EnrichedRecord, RawRecord, RowPolicy, SampleYears, SeriesCoverage};
use gpp_core::settings::{ColumnMapping, Settings};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::LongitudinalAggregator;
use crate::reader::{load_all, SourceResolver};
use crate::table::ResultTable;

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything a run needs besides the sources themselves.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub years: SampleYears,
    pub columns: ColumnMapping,
    pub row_policy: RowPolicy,
    pub coverage: SeriesCoverage,
}

impl PipelineOptions {
    /// Options from resolved CLI/config settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            years: settings.sample_years()?,
            columns: settings.columns.clone(),
            row_policy: settings.row_policy(),
            coverage: settings.coverage(),
        })
    }
}

/// Metadata produced alongside the result table.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    /// Configured sample years, ascending.
    pub years: Vec<i32>,
    /// `(year, rows kept)` per configured year.
    pub rows_per_year: Vec<(i32, usize)>,
    pub rows_loaded: usize,
    /// Rows dropped under the skip policy, at load or derivation.
    pub rows_skipped: usize,
    pub forests: usize,
    /// Wall-clock seconds spent reading sources.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent deriving and aggregating.
    pub transform_time_seconds: f64,
}

/// The complete output of [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub table: ResultTable,
    pub metadata: AnalysisMetadata,
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run the full pipeline.
///
/// 1. Load every configured year from `resolver`.
/// 2. Derive per-row metrics, applying the row policy to invalid areas.
/// 3. Partition by forest, and under strict coverage require every forest
///    in every configured year.
/// 4. Annotate each series with its change statistics.
///
/// Any fatal condition aborts the run; no partial table is returned.
pub fn run_pipeline(
    resolver: &dyn SourceResolver,
    options: &PipelineOptions,
) -> Result<AnalysisResult> {
    // ── Step 1: Load ──────────────────────────────────────────────────────────
    let load_start = std::time::Instant::now();
    let loaded = load_all(resolver, &options.years, &options.columns, options.row_policy)?;
    let load_time = load_start.elapsed().as_secs_f64();
    let rows_loaded = loaded.records.len();

    // ── Step 2: Derive ────────────────────────────────────────────────────────
    let transform_start = std::time::Instant::now();
    let (enriched, derive_skipped) = derive_all(&loaded.records, options.row_policy)?;

    // ── Step 3: Partition + coverage ──────────────────────────────────────────
    let series = LongitudinalAggregator::partition(enriched)?;
    match options.coverage {
        SeriesCoverage::Strict => LongitudinalAggregator::check_coverage(&series, &options.years)?,
        SeriesCoverage::AllowGaps => {
            let partial = series
                .iter()
                .filter(|s| s.first_missing_year(&options.years).is_some())
                .count();
            if partial > 0 {
                warn!("{} forests are missing from at least one sample year", partial);
            }
        }
    }
    let forests = series.len();

    // ── Step 4: Annotate ──────────────────────────────────────────────────────
    let table = ResultTable::new(LongitudinalAggregator::annotate_series(series));
    let transform_time = transform_start.elapsed().as_secs_f64();

    info!(
        "Pipeline finished: {} rows, {} forests, {} skipped",
        table.len(),
        forests,
        loaded.skipped + derive_skipped
    );

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        years: options.years.to_vec(),
        rows_per_year: loaded.per_year,
        rows_loaded,
        rows_skipped: loaded.skipped + derive_skipped,
        forests,
        load_time_seconds: load_time,
        transform_time_seconds: transform_time,
    };

    Ok(AnalysisResult { table, metadata })
}

/// Derive every row in parallel. Under [`RowPolicy::SkipAndWarn`] rows with
/// an invalid area are dropped and counted; otherwise the first one in input
/// order fails the run.
fn derive_all(
    records: &[RawRecord],
    policy: RowPolicy,
) -> Result<(Vec<EnrichedRecord>, usize)> {
    let results: Vec<Result<EnrichedRecord>> = records.par_iter().map(derive).collect();

    let mut enriched = Vec::with_capacity(results.len());
    let mut skipped = 0usize;
    for result in results {
        match result {
            Ok(record) => enriched.push(record),
            Err(err) if policy == RowPolicy::SkipAndWarn && err.is_row_level() => {
                warn!("Skipping row: {}", err);
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok((enriched, skipped))
}

/// Convenience wrapper that surfaces an empty result as a configuration
/// problem rather than an empty report.
pub fn run_pipeline_nonempty(
    resolver: &dyn SourceResolver,
    options: &PipelineOptions,
) -> Result<AnalysisResult> {
    let result = run_pipeline(resolver, options)?;
    if result.table.is_empty() {
        return Err(GppError::Config(format!(
            "no usable rows in any of the {} configured sample years",
            options.years.len()
        )));
    }
    Ok(result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
