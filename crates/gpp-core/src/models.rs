use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GppError, Result};

// ── Region ─────────────────────────────────────────────────────────────────────

/// USFS administrative region. Region 7 was merged away in 1966 and has no
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Region {
    Northern,
    RockyMountain,
    Southwestern,
    Intermountain,
    PacificSouthwest,
    PacificNorthwest,
    Southern,
    Eastern,
    Alaska,
}

impl Region {
    /// Every recognised region in ascending number order.
    pub const ALL: [Region; 9] = [
        Region::Northern,
        Region::RockyMountain,
        Region::Southwestern,
        Region::Intermountain,
        Region::PacificSouthwest,
        Region::PacificNorthwest,
        Region::Southern,
        Region::Eastern,
        Region::Alaska,
    ];

    /// Map an administrative region number to a variant.
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Region::Northern),
            2 => Some(Region::RockyMountain),
            3 => Some(Region::Southwestern),
            4 => Some(Region::Intermountain),
            5 => Some(Region::PacificSouthwest),
            6 => Some(Region::PacificNorthwest),
            8 => Some(Region::Southern),
            9 => Some(Region::Eastern),
            10 => Some(Region::Alaska),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Region::Northern => 1,
            Region::RockyMountain => 2,
            Region::Southwestern => 3,
            Region::Intermountain => 4,
            Region::PacificSouthwest => 5,
            Region::PacificNorthwest => 6,
            Region::Southern => 8,
            Region::Eastern => 9,
            Region::Alaska => 10,
        }
    }

    /// Short display label, e.g. `"R1"`.
    pub fn label(self) -> String {
        format!("R{}", self.number())
    }

    /// Descriptive region name.
    pub fn name(self) -> &'static str {
        match self {
            Region::Northern => "Northern",
            Region::RockyMountain => "Rocky Mountain",
            Region::Southwestern => "Southwestern",
            Region::Intermountain => "Intermountain",
            Region::PacificSouthwest => "Pacific Southwest",
            Region::PacificNorthwest => "Pacific Northwest",
            Region::Southern => "Southern",
            Region::Eastern => "Eastern",
            Region::Alaska => "Alaska",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.number())
    }
}

impl From<Region> for u8 {
    fn from(region: Region) -> Self {
        region.number()
    }
}

impl TryFrom<u8> for Region {
    type Error = String;

    fn try_from(number: u8) -> std::result::Result<Self, Self::Error> {
        Region::from_number(number).ok_or_else(|| format!("unknown USFS region {}", number))
    }
}

// ── Records ────────────────────────────────────────────────────────────────────

/// One forest in one sample year, exactly as loaded from a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Forest identifier, stable across all sample years.
    pub cnid: i64,
    /// Forest common name, e.g. `"Bighorn National Forest"`.
    pub common_name: String,
    pub region: Region,
    /// Total productivity over the forest, raw upstream units.
    pub productivity_sum: f64,
    /// Administrative area in acres.
    pub area_acres: f64,
    pub year: i32,
}

/// A [`RawRecord`] with its per-row normalized metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub raw: RawRecord,
    /// `productivity_sum` in millions.
    pub productivity_scaled: f64,
    pub area_km2: f64,
    pub productivity_per_km2: f64,
    /// Common name without the "National Forest(s)" suffix.
    pub short_name: String,
    /// `"R"` followed by the region number.
    pub region_label: String,
}

impl EnrichedRecord {
    pub fn forest_id(&self) -> i64 {
        self.raw.cnid
    }

    pub fn year(&self) -> i32 {
        self.raw.year
    }
}

/// An [`EnrichedRecord`] annotated with change statistics computed within
/// its forest's year-ordered series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnnotatedRecord {
    #[serde(flatten)]
    pub record: EnrichedRecord,
    /// Difference from the previous sample year; `None` on the first row.
    pub change_from_prior: Option<f64>,
    /// `change_from_prior` relative to the previous value; `None` on the
    /// first row or when the previous value is zero.
    pub change_from_prior_pct: Option<f64>,
    /// Difference from the series' first (baseline) value.
    pub change_from_baseline: f64,
    /// `change_from_baseline` relative to the baseline value; `None` only
    /// when the baseline value is zero.
    pub change_from_baseline_pct: Option<f64>,
    /// The last row's `change_from_baseline_pct`, repeated on every row.
    pub final_change_pct: Option<f64>,
    pub is_last_in_series: bool,
}

impl ChangeAnnotatedRecord {
    pub fn forest_id(&self) -> i64 {
        self.record.raw.cnid
    }

    pub fn year(&self) -> i32 {
        self.record.raw.year
    }

    pub fn region(&self) -> Region {
        self.record.raw.region
    }

    pub fn short_name(&self) -> &str {
        &self.record.short_name
    }

    pub fn productivity_scaled(&self) -> f64 {
        self.record.productivity_scaled
    }
}

// ── SampleYears ────────────────────────────────────────────────────────────────

/// Default first sample year.
pub const DEFAULT_START_YEAR: i32 = 1986;
/// Default last sample year.
pub const DEFAULT_END_YEAR: i32 = 2021;
/// Default spacing between sample years.
pub const DEFAULT_YEAR_STEP: i32 = 5;

/// Upper bound on the number of sample years in one run.
pub const MAX_SAMPLE_YEARS: usize = 1000;

/// An ascending, evenly spaced sequence of sample years.
///
/// Deserialization goes through [`SampleYears::new`], so every value in
/// hand is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSampleYears")]
pub struct SampleYears {
    start: i32,
    end: i32,
    step: i32,
}

#[derive(Deserialize)]
struct RawSampleYears {
    start: i32,
    end: i32,
    step: i32,
}

impl TryFrom<RawSampleYears> for SampleYears {
    type Error = GppError;

    fn try_from(raw: RawSampleYears) -> Result<Self> {
        SampleYears::new(raw.start, raw.end, raw.step)
    }
}

impl SampleYears {
    /// Build the sequence `start, start + step, …, end`.
    ///
    /// Fails when `step` is not positive, `end < start`, `end` is not
    /// reachable from `start` in whole steps, or the sequence would hold
    /// more than [`MAX_SAMPLE_YEARS`] years.
    pub fn new(start: i32, end: i32, step: i32) -> Result<Self> {
        if step <= 0 {
            return Err(GppError::Config(format!(
                "sample year step must be positive, got {}",
                step
            )));
        }
        if end < start {
            return Err(GppError::Config(format!(
                "end year {} precedes start year {}",
                end, start
            )));
        }
        let span = end.checked_sub(start).ok_or_else(|| {
            GppError::Config(format!("year range {}..={} is too wide", start, end))
        })?;
        if span % step != 0 {
            return Err(GppError::Config(format!(
                "end year {} is not reachable from {} in steps of {}",
                end, start, step
            )));
        }
        let count = (span / step) as usize + 1;
        if count > MAX_SAMPLE_YEARS {
            return Err(GppError::Config(format!(
                "{} sample years requested, at most {} allowed",
                count, MAX_SAMPLE_YEARS
            )));
        }
        Ok(Self { start, end, step })
    }

    /// The first configured year.
    pub fn baseline(&self) -> i32 {
        self.start
    }

    /// The last configured year.
    pub fn latest(&self) -> i32 {
        self.end
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn len(&self) -> usize {
        ((self.end - self.start) / self.step) as usize + 1
    }

    /// Always `false`; a valid sequence holds at least its start year.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end && (year - self.start) % self.step == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> {
        (self.start..=self.end).step_by(self.step as usize)
    }

    pub fn to_vec(&self) -> Vec<i32> {
        self.iter().collect()
    }
}

impl Default for SampleYears {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_YEAR,
            end: DEFAULT_END_YEAR,
            step: DEFAULT_YEAR_STEP,
        }
    }
}

// ── Policies ───────────────────────────────────────────────────────────────────

/// What to do with a row that fails with a row-level error
/// ([`GppError::MalformedRecord`] or [`GppError::InvalidArea`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Drop the row and log a warning.
    #[serde(rename = "skip")]
    SkipAndWarn,
}

/// Whether every forest must be present in every configured sample year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesCoverage {
    /// A forest missing from any configured year fails the run.
    #[default]
    Strict,
    /// Partial series are kept; lags refer to the previous present year.
    #[serde(rename = "allow-gaps")]
    AllowGaps,
}
