//! Longitudinal change statistics grouped by forest.
//!
//! Partitions enriched rows by forest id, orders each forest's series by
//! year and walks it once to attach lag- and baseline-based change fields.

use std::collections::BTreeMap;

use gpp_core::error::{GppError, Result};
use gpp_core::models::{ChangeAnnotatedRecord, EnrichedRecord, SampleYears};
use tracing::debug;

// ── ForestSeries ──────────────────────────────────────────────────────────────

/// One forest's rows, strictly ascending by year.
#[derive(Debug, Clone)]
pub struct ForestSeries {
    forest_id: i64,
    records: Vec<EnrichedRecord>,
}

impl ForestSeries {
    /// Sort `records` by year and check that no year repeats.
    ///
    /// All records must share `forest_id`.
    pub fn new(forest_id: i64, mut records: Vec<EnrichedRecord>) -> Result<Self> {
        debug_assert!(records.iter().all(|r| r.forest_id() == forest_id));

        records.sort_by_key(|r| r.year());
        if let Some(pair) = records.windows(2).find(|w| w[0].year() == w[1].year()) {
            return Err(GppError::DuplicateYearInSeries {
                forest_id,
                year: pair[0].year(),
            });
        }

        Ok(Self { forest_id, records })
    }

    pub fn forest_id(&self) -> i64 {
        self.forest_id
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.records.iter().map(|r| r.year())
    }

    /// The first configured year this series lacks, if any.
    pub fn first_missing_year(&self, years: &SampleYears) -> Option<i32> {
        years
            .iter()
            .find(|year| self.records.binary_search_by_key(year, |r| r.year()).is_err())
    }

    /// Walk the series once, producing the change-annotated rows.
    pub fn annotate(self) -> Vec<ChangeAnnotatedRecord> {
        let Some(first) = self.records.first() else {
            return Vec::new();
        };
        let baseline = first.productivity_scaled;
        let last_index = self.records.len() - 1;
        // A lone observation has not changed from itself, even at zero.
        let single = last_index == 0;
        let baseline_pct = |change: f64| {
            if single {
                Some(0.0)
            } else {
                relative_change(change, baseline)
            }
        };

        let final_change_pct = self
            .records
            .last()
            .and_then(|last| baseline_pct(last.productivity_scaled - baseline));

        let mut previous: Option<f64> = None;
        let mut annotated = Vec::with_capacity(self.records.len());

        for (i, record) in self.records.into_iter().enumerate() {
            let value = record.productivity_scaled;

            let change_from_prior = previous.map(|prev| value - prev);
            let change_from_prior_pct = previous
                .zip(change_from_prior)
                .and_then(|(prev, change)| relative_change(change, prev));

            let change_from_baseline = value - baseline;

            annotated.push(ChangeAnnotatedRecord {
                change_from_prior,
                change_from_prior_pct,
                change_from_baseline,
                change_from_baseline_pct: baseline_pct(change_from_baseline),
                final_change_pct,
                is_last_in_series: i == last_index,
                record,
            });

            previous = Some(value);
        }

        annotated
    }
}

/// `change / reference`, undefined when the reference is zero.
fn relative_change(change: f64, reference: f64) -> Option<f64> {
    if reference == 0.0 {
        None
    } else {
        Some(change / reference)
    }
}

// ── LongitudinalAggregator ────────────────────────────────────────────────────

/// Stateless helper that turns enriched rows into change-annotated rows.
pub struct LongitudinalAggregator;

impl LongitudinalAggregator {
    /// Group `records` into per-forest series, ordered by forest id.
    ///
    /// Fails with [`GppError::DuplicateYearInSeries`] on the first forest
    /// holding two rows for one year.
    pub fn partition(records: Vec<EnrichedRecord>) -> Result<Vec<ForestSeries>> {
        // BTreeMap keeps forests in a stable ascending-id order.
        let mut groups: BTreeMap<i64, Vec<EnrichedRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.forest_id()).or_default().push(record);
        }

        groups
            .into_iter()
            .map(|(forest_id, rows)| ForestSeries::new(forest_id, rows))
            .collect()
    }

    /// Fail with [`GppError::MissingSourceData`] for the first forest that
    /// lacks a configured year.
    pub fn check_coverage(series: &[ForestSeries], years: &SampleYears) -> Result<()> {
        for s in series {
            if let Some(year) = s.first_missing_year(years) {
                let name = s
                    .records()
                    .first()
                    .map(|r| r.short_name.as_str())
                    .unwrap_or("");
                return Err(GppError::MissingSourceData {
                    year,
                    reason: format!("forest {} ({}) has no row for this year", s.forest_id(), name),
                });
            }
        }
        Ok(())
    }

    /// Annotate every row with its series' change statistics.
    ///
    /// Output is grouped by ascending forest id and ascending year within
    /// each forest. Any duplicate year aborts the whole aggregation.
    pub fn annotate(records: Vec<EnrichedRecord>) -> Result<Vec<ChangeAnnotatedRecord>> {
        let series = Self::partition(records)?;
        Ok(Self::annotate_series(series))
    }

    /// Annotate already-partitioned series.
    pub fn annotate_series(series: Vec<ForestSeries>) -> Vec<ChangeAnnotatedRecord> {
        let forests = series.len();
        let annotated: Vec<ChangeAnnotatedRecord> =
            series.into_iter().flat_map(ForestSeries::annotate).collect();
        debug!("Annotated {} rows across {} forests", annotated.len(), forests);
        annotated
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gpp_core::metrics::derive;
    use gpp_core::models::{RawRecord, Region};

    fn enriched(cnid: i64, year: i32, scaled: f64) -> EnrichedRecord {
        derive(&RawRecord {
            cnid,
            common_name: format!("Forest {} National Forest", cnid),
            region: Region::Northern,
            productivity_sum: scaled * 1_000_000.0,
            area_acres: 247_000.0,
            year,
        })
        .unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    // ── ForestSeries ──────────────────────────────────────────────────────────

    #[test]
    fn test_series_sorts_by_year() {
        let series = ForestSeries::new(
            1,
            vec![enriched(1, 2021, 3.0), enriched(1, 1986, 1.0), enriched(1, 2001, 2.0)],
        )
        .unwrap();
        let years: Vec<i32> = series.years().collect();
        assert_eq!(years, vec![1986, 2001, 2021]);
    }

    #[test]
    fn test_series_rejects_duplicate_year() {
        let err = ForestSeries::new(
            4,
            vec![enriched(4, 1991, 1.0), enriched(4, 1986, 1.0), enriched(4, 1991, 2.0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GppError::DuplicateYearInSeries {
                forest_id: 4,
                year: 1991
            }
        ));
    }

    #[test]
    fn test_first_missing_year() {
        let years = SampleYears::new(1986, 1996, 5).unwrap();
        let full = ForestSeries::new(
            1,
            vec![enriched(1, 1986, 1.0), enriched(1, 1991, 1.0), enriched(1, 1996, 1.0)],
        )
        .unwrap();
        let gappy =
            ForestSeries::new(2, vec![enriched(2, 1986, 1.0), enriched(2, 1996, 1.0)]).unwrap();

        assert_eq!(full.first_missing_year(&years), None);
        assert_eq!(gappy.first_missing_year(&years), Some(1991));
    }

    // ── annotate ──────────────────────────────────────────────────────────────

    #[test]
    fn test_annotate_change_fields() {
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 10.0),
            enriched(1, 1991, 12.0),
            enriched(1, 1996, 9.0),
        ])
        .unwrap();

        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].change_from_prior, None);
        assert_eq!(rows[0].change_from_prior_pct, None);
        assert_close(rows[0].change_from_baseline, 0.0);
        assert_close(rows[0].change_from_baseline_pct.unwrap(), 0.0);

        assert_close(rows[1].change_from_prior.unwrap(), 2.0);
        assert_close(rows[1].change_from_prior_pct.unwrap(), 0.2);
        assert_close(rows[1].change_from_baseline, 2.0);
        assert_close(rows[1].change_from_baseline_pct.unwrap(), 0.2);

        assert_close(rows[2].change_from_prior.unwrap(), -3.0);
        assert_close(rows[2].change_from_prior_pct.unwrap(), -0.25);
        assert_close(rows[2].change_from_baseline, -1.0);
        assert_close(rows[2].change_from_baseline_pct.unwrap(), -0.1);

        for row in &rows {
            assert_close(row.final_change_pct.unwrap(), -0.1);
        }
        let last_flags: Vec<bool> = rows.iter().map(|r| r.is_last_in_series).collect();
        assert_eq!(last_flags, vec![false, false, true]);
    }

    #[test]
    fn test_annotate_single_row_series() {
        let rows = LongitudinalAggregator::annotate(vec![enriched(7, 2006, 4.2)]).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.change_from_prior, None);
        assert_eq!(row.change_from_prior_pct, None);
        assert_eq!(row.change_from_baseline, 0.0);
        assert_eq!(row.change_from_baseline_pct, Some(0.0));
        assert_eq!(row.final_change_pct, Some(0.0));
        assert!(row.is_last_in_series);
    }

    #[test]
    fn test_annotate_single_row_series_at_zero() {
        let rows = LongitudinalAggregator::annotate(vec![enriched(8, 1986, 0.0)]).unwrap();

        let row = &rows[0];
        assert_eq!(row.change_from_baseline, 0.0);
        assert_eq!(row.change_from_baseline_pct, Some(0.0));
        assert_eq!(row.final_change_pct, Some(0.0));
    }

    #[test]
    fn test_annotate_zero_prior_and_baseline() {
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 0.0),
            enriched(1, 1991, 5.0),
            enriched(1, 1996, 0.0),
            enriched(1, 2001, 2.0),
        ])
        .unwrap();

        assert_close(rows[1].change_from_prior.unwrap(), 5.0);
        assert_eq!(rows[1].change_from_prior_pct, None);
        assert_close(rows[2].change_from_prior_pct.unwrap(), -1.0);
        assert_eq!(rows[3].change_from_prior_pct, None);

        for row in &rows {
            assert_eq!(row.change_from_baseline_pct, None);
            assert_eq!(row.final_change_pct, None);
        }
        assert_close(rows[3].change_from_baseline, 2.0);
    }

    #[test]
    fn test_annotate_orders_regardless_of_input_order() {
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(2, 2021, 1.0),
            enriched(1, 1996, 1.0),
            enriched(2, 1986, 1.0),
            enriched(1, 1986, 1.0),
            enriched(2, 2001, 1.0),
            enriched(1, 1991, 1.0),
        ])
        .unwrap();

        let keys: Vec<(i64, i32)> = rows.iter().map(|r| (r.forest_id(), r.year())).collect();
        assert_eq!(
            keys,
            vec![
                (1, 1986),
                (1, 1991),
                (1, 1996),
                (2, 1986),
                (2, 2001),
                (2, 2021)
            ]
        );
        for pair in rows.windows(2) {
            if pair[0].forest_id() == pair[1].forest_id() {
                assert!(pair[0].year() < pair[1].year());
            }
        }
    }

    #[test]
    fn test_annotate_one_last_row_per_series() {
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 1.0),
            enriched(1, 1991, 2.0),
            enriched(2, 1986, 1.0),
            enriched(3, 1991, 1.0),
            enriched(3, 1986, 1.0),
        ])
        .unwrap();

        for forest in [1, 2, 3] {
            let last: Vec<&ChangeAnnotatedRecord> = rows
                .iter()
                .filter(|r| r.forest_id() == forest && r.is_last_in_series)
                .collect();
            assert_eq!(last.len(), 1, "forest {forest}");
            let max_year = rows
                .iter()
                .filter(|r| r.forest_id() == forest)
                .map(|r| r.year())
                .max()
                .unwrap();
            assert_eq!(last[0].year(), max_year);
        }
    }

    #[test]
    fn test_annotate_baseline_consistency() {
        let values = [3.1, 2.7, 4.4, 5.0, 3.9, 6.2];
        let records: Vec<EnrichedRecord> = values
            .iter()
            .enumerate()
            .rev()
            .map(|(i, v)| enriched(9, 1986 + 5 * i as i32, *v))
            .collect();
        let rows = LongitudinalAggregator::annotate(records).unwrap();

        let first = rows[0].productivity_scaled();
        for row in &rows {
            let expected = (row.productivity_scaled() - first) / first;
            assert_close(row.change_from_baseline_pct.unwrap(), expected);
        }
    }

    #[test]
    fn test_annotate_no_cross_series_leakage() {
        // Both forests grow by 50%, from very different starting points.
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 2.0),
            enriched(2, 1986, 200.0),
            enriched(1, 2021, 3.0),
            enriched(2, 2021, 300.0),
        ])
        .unwrap();

        for row in &rows {
            assert_close(row.final_change_pct.unwrap(), 0.5);
        }
        let small_last = rows.iter().find(|r| r.forest_id() == 1 && r.is_last_in_series).unwrap();
        let large_last = rows.iter().find(|r| r.forest_id() == 2 && r.is_last_in_series).unwrap();
        assert_close(small_last.change_from_baseline, 1.0);
        assert_close(large_last.change_from_baseline, 100.0);
        assert_eq!(small_last.change_from_prior.map(|c| c.round()), Some(1.0));
    }

    #[test]
    fn test_annotate_duplicate_aborts_everything() {
        let err = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 1.0),
            enriched(2, 1986, 1.0),
            enriched(2, 1986, 2.0),
        ])
        .unwrap_err();
        assert!(matches!(err, GppError::DuplicateYearInSeries { forest_id: 2, .. }));
    }

    #[test]
    fn test_annotate_empty() {
        assert!(LongitudinalAggregator::annotate(Vec::new()).unwrap().is_empty());
    }

    // ── check_coverage ────────────────────────────────────────────────────────

    #[test]
    fn test_check_coverage_strict() {
        let years = SampleYears::new(1986, 1996, 5).unwrap();
        let series = LongitudinalAggregator::partition(vec![
            enriched(1, 1986, 1.0),
            enriched(1, 1991, 1.0),
            enriched(1, 1996, 1.0),
            enriched(2, 1986, 1.0),
            enriched(2, 1996, 1.0),
        ])
        .unwrap();

        let err = LongitudinalAggregator::check_coverage(&series, &years).unwrap_err();
        match err {
            GppError::MissingSourceData { year, reason } => {
                assert_eq!(year, 1991);
                assert!(reason.contains("forest 2"));
                assert!(reason.contains("Forest 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(LongitudinalAggregator::check_coverage(&series[..1], &years).is_ok());
    }

    #[test]
    fn test_gapped_series_lags_previous_present_year() {
        let rows = LongitudinalAggregator::annotate(vec![
            enriched(1, 1986, 10.0),
            enriched(1, 2001, 15.0),
        ])
        .unwrap();
        assert_close(rows[1].change_from_prior.unwrap(), 5.0);
        assert_close(rows[1].change_from_prior_pct.unwrap(), 0.5);
    }
}
