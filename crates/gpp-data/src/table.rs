//! The immutable, fully annotated result of a pipeline run.
//!
//! [`ResultTable`] is what presentation code consumes. Every query here is a
//! read-only projection; nothing mutates the rows after aggregation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use gpp_core::models::{ChangeAnnotatedRecord, Region};
use serde::Serialize;

// ── Query types ───────────────────────────────────────────────────────────────

/// A change field that can be filtered by sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeField {
    Prior,
    PriorPct,
    Baseline,
    BaselinePct,
    FinalPct,
}

impl ChangeField {
    fn value(self, record: &ChangeAnnotatedRecord) -> Option<f64> {
        match self {
            ChangeField::Prior => record.change_from_prior,
            ChangeField::PriorPct => record.change_from_prior_pct,
            ChangeField::Baseline => Some(record.change_from_baseline),
            ChangeField::BaselinePct => record.change_from_baseline_pct,
            ChangeField::FinalPct => record.final_change_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
    Zero,
}

impl Sign {
    fn matches(self, value: f64) -> bool {
        match self {
            Sign::Positive => value > 0.0,
            Sign::Negative => value < 0.0,
            Sign::Zero => value == 0.0,
        }
    }
}

/// Per-region counts over each forest's final change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: Region,
    pub label: String,
    pub forests: usize,
    /// Forests whose final change is positive.
    pub improved: usize,
    /// Forests whose final change is negative.
    pub declined: usize,
    /// Forests whose final change is zero or undefined.
    pub unchanged: usize,
    pub mean_final_change_pct: Option<f64>,
}

// ── ResultTable ───────────────────────────────────────────────────────────────

/// Change-annotated rows for every forest and sample year.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    records: Vec<ChangeAnnotatedRecord>,
}

impl ResultTable {
    /// Wrap the aggregator's output. Rows are expected grouped by forest and
    /// ascending by year within each forest, as the aggregator produces them.
    pub fn new(records: Vec<ChangeAnnotatedRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ChangeAnnotatedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct sample years present, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.year()).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Number of distinct forests.
    pub fn forest_count(&self) -> usize {
        self.latest().count()
    }

    pub fn for_year(&self, year: i32) -> impl Iterator<Item = &ChangeAnnotatedRecord> + '_ {
        self.records.iter().filter(move |r| r.year() == year)
    }

    pub fn for_region(&self, region: Region) -> impl Iterator<Item = &ChangeAnnotatedRecord> + '_ {
        self.records.iter().filter(move |r| r.region() == region)
    }

    /// Rows whose `field` has the given sign. Rows where the field is
    /// undefined never match.
    pub fn with_sign(
        &self,
        field: ChangeField,
        sign: Sign,
    ) -> impl Iterator<Item = &ChangeAnnotatedRecord> + '_ {
        self.records
            .iter()
            .filter(move |r| field.value(r).is_some_and(|v| sign.matches(v)))
    }

    /// One forest's rows, ascending by year.
    pub fn series(&self, forest_id: i64) -> Vec<&ChangeAnnotatedRecord> {
        let mut rows: Vec<&ChangeAnnotatedRecord> = self
            .records
            .iter()
            .filter(|r| r.forest_id() == forest_id)
            .collect();
        rows.sort_by_key(|r| r.year());
        rows
    }

    /// The most recent row of every forest.
    pub fn latest(&self) -> impl Iterator<Item = &ChangeAnnotatedRecord> + '_ {
        self.records.iter().filter(|r| r.is_last_in_series)
    }

    /// Latest rows ordered by final change, largest first. Forests with an
    /// undefined final change sort last; ties break on forest id.
    pub fn ranked_by_final_change(&self) -> Vec<&ChangeAnnotatedRecord> {
        let mut rows: Vec<&ChangeAnnotatedRecord> = self.latest().collect();
        rows.sort_by(|a, b| {
            let by_change = match (a.final_change_pct, b.final_change_pct) {
                (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_change.then_with(|| a.forest_id().cmp(&b.forest_id()))
        });
        rows
    }

    /// Forests whose final change is positive.
    pub fn improved_count(&self) -> usize {
        self.latest()
            .filter(|r| r.final_change_pct.is_some_and(|v| v > 0.0))
            .count()
    }

    /// Forests whose final change is negative.
    pub fn declined_count(&self) -> usize {
        self.latest()
            .filter(|r| r.final_change_pct.is_some_and(|v| v < 0.0))
            .count()
    }

    /// Mean final change across forests, one value per forest. Undefined
    /// values are ignored; `None` when no forest has one.
    pub fn mean_final_change_pct(&self) -> Option<f64> {
        mean(self.latest().filter_map(|r| r.final_change_pct))
    }

    /// Per-region summary, ascending by region number. Regions without
    /// forests are omitted.
    pub fn region_summaries(&self) -> Vec<RegionSummary> {
        let mut by_region: BTreeMap<Region, Vec<&ChangeAnnotatedRecord>> = BTreeMap::new();
        for row in self.latest() {
            by_region.entry(row.region()).or_default().push(row);
        }

        by_region
            .into_iter()
            .map(|(region, rows)| {
                let improved = rows
                    .iter()
                    .filter(|r| r.final_change_pct.is_some_and(|v| v > 0.0))
                    .count();
                let declined = rows
                    .iter()
                    .filter(|r| r.final_change_pct.is_some_and(|v| v < 0.0))
                    .count();
                RegionSummary {
                    region,
                    label: region.label(),
                    forests: rows.len(),
                    improved,
                    declined,
                    unchanged: rows.len() - improved - declined,
                    mean_final_change_pct: mean(rows.iter().filter_map(|r| r.final_change_pct)),
                }
            })
            .collect()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
