//! Per-year CSV loading for the GPP trends pipeline.
//!
//! Each configured sample year maps to one tabular export from the upstream
//! geospatial provider. A [`SourceResolver`] turns a year into a readable
//! source; [`load_year`] parses it into [`RawRecord`]s and [`load_all`] does
//! so for every configured year.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use csv::StringRecord;
use gpp_core::error::{GppError, Result};
use gpp_core::models::{RawRecord, Region, RowPolicy, SampleYears};
use gpp_core::settings::ColumnMapping;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

// ── SourceResolver ────────────────────────────────────────────────────────────

/// An opened source together with the name used for it in errors and logs.
pub struct ResolvedSource {
    pub name: String,
    pub reader: Box<dyn Read + Send>,
}

/// Maps a sample year to a readable tabular source.
pub trait SourceResolver: Sync {
    /// Open the source for `year`.
    ///
    /// Fails with [`GppError::MissingSourceData`] when no source exists.
    fn resolve(&self, year: i32) -> Result<ResolvedSource>;
}

/// Resolves years to CSV files inside a data directory.
///
/// The file for a year is `data_dir/pattern` with `{year}` substituted. When
/// that file does not exist, the directory is searched recursively for a
/// single `.csv` file whose name contains the year as a standalone number.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    data_dir: PathBuf,
    pattern: String,
}

impl DirectoryResolver {
    pub fn new(data_dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pattern: pattern.into(),
        }
    }

    /// The path the pattern yields for `year`.
    pub fn patterned_path(&self, year: i32) -> PathBuf {
        self.data_dir
            .join(self.pattern.replace("{year}", &year.to_string()))
    }

    /// Locate the file for `year`: the patterned path first, then discovery.
    pub fn locate(&self, year: i32) -> Result<PathBuf> {
        let patterned = self.patterned_path(year);
        if patterned.is_file() {
            return Ok(patterned);
        }

        if !self.data_dir.is_dir() {
            return Err(GppError::MissingSourceData {
                year,
                reason: format!("data directory {} does not exist", self.data_dir.display()),
            });
        }

        let mut candidates = find_year_files(&self.data_dir, year);
        match candidates.len() {
            0 => Err(GppError::MissingSourceData {
                year,
                reason: format!(
                    "no file {} and no CSV naming {} under {}",
                    patterned.display(),
                    year,
                    self.data_dir.display()
                ),
            }),
            1 => {
                let found = candidates.remove(0);
                debug!(
                    "Year {}: {} not found, using discovered {}",
                    year,
                    patterned.display(),
                    found.display()
                );
                Ok(found)
            }
            n => Err(GppError::Config(format!(
                "{} candidate CSV files name year {} under {}; set a file pattern",
                n,
                year,
                self.data_dir.display()
            ))),
        }
    }
}

impl SourceResolver for DirectoryResolver {
    fn resolve(&self, year: i32) -> Result<ResolvedSource> {
        let path = self.locate(year)?;
        let file = File::open(&path).map_err(|e| GppError::MissingSourceData {
            year,
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;
        Ok(ResolvedSource {
            name: path.display().to_string(),
            reader: Box::new(BufReader::new(file)),
        })
    }
}

/// Resolves years to CSV text held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    sources: HashMap<i32, String>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the CSV text for `year`, replacing any earlier entry.
    pub fn with_source(mut self, year: i32, csv_text: impl Into<String>) -> Self {
        self.sources.insert(year, csv_text.into());
        self
    }
}

impl SourceResolver for InMemoryResolver {
    fn resolve(&self, year: i32) -> Result<ResolvedSource> {
        let text = self
            .sources
            .get(&year)
            .ok_or_else(|| GppError::MissingSourceData {
                year,
                reason: "no in-memory source registered".to_string(),
            })?;
        Ok(ResolvedSource {
            name: format!("<memory:{}>", year),
            reader: Box::new(std::io::Cursor::new(text.clone().into_bytes())),
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Rows loaded from one year's source.
#[derive(Debug, Clone)]
pub struct YearRows {
    pub year: i32,
    pub source: String,
    pub records: Vec<RawRecord>,
    /// Rows dropped under [`RowPolicy::SkipAndWarn`].
    pub skipped: usize,
}

/// Rows loaded from every configured year, in year order.
#[derive(Debug, Clone, Default)]
pub struct LoadedRows {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
    /// `(year, rows kept)` for each configured year.
    pub per_year: Vec<(i32, usize)>,
}

/// Load every configured year.
///
/// Years are loaded in parallel; results are concatenated in ascending year
/// order. Any [`GppError::MissingSourceData`] fails the whole load, and when
/// several years fail the earliest one is reported.
pub fn load_all(
    resolver: &dyn SourceResolver,
    years: &SampleYears,
    columns: &ColumnMapping,
    policy: RowPolicy,
) -> Result<LoadedRows> {
    let year_list = years.to_vec();

    let results: Vec<Result<YearRows>> = year_list
        .par_iter()
        .map(|&year| load_year(resolver, year, columns, policy))
        .collect();

    let mut loads = Vec::with_capacity(results.len());
    for result in results {
        loads.push(result?);
    }
    loads.sort_by_key(|load| load.year);

    let mut loaded = LoadedRows::default();
    for load in loads {
        loaded.skipped += load.skipped;
        loaded.per_year.push((load.year, load.records.len()));
        loaded.records.extend(load.records);
    }

    info!(
        "Loaded {} rows from {} sample years ({} skipped)",
        loaded.records.len(),
        year_list.len(),
        loaded.skipped
    );

    Ok(loaded)
}

/// Load one year's source into [`RawRecord`]s tagged with `year`.
pub fn load_year(
    resolver: &dyn SourceResolver,
    year: i32,
    columns: &ColumnMapping,
    policy: RowPolicy,
) -> Result<YearRows> {
    let ResolvedSource {
        name: source,
        reader,
    } = resolver.resolve(year)?;
    let (records, skipped) = parse_records(reader, &source, year, columns, policy)?;

    if records.is_empty() {
        warn!("Source {} for {} contains no usable rows", source, year);
    }
    debug!(
        "Source {}: {} rows kept, {} skipped",
        source,
        records.len(),
        skipped
    );

    Ok(YearRows {
        year,
        source,
        records,
        skipped,
    })
}

/// Parse CSV text from `reader`. Returns the kept records and the number of
/// rows skipped under `policy`.
///
/// A header that cannot be read, or an I/O failure mid-file, leaves the year
/// without usable data and fails with [`GppError::MissingSourceData`]. A data
/// row that is not valid UTF-8 is a [`GppError::MalformedRecord`] and falls
/// under `policy` like any other bad row.
pub fn parse_records(
    reader: impl Read,
    source: &str,
    year: i32,
    columns: &ColumnMapping,
    policy: RowPolicy,
) -> Result<(Vec<RawRecord>, usize)> {
    let unreadable = |error: &csv::Error| GppError::MissingSourceData {
        year,
        reason: format!("cannot read {}: {}", source, error),
    };

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = csv_reader.headers().map_err(|e| unreadable(&e))?.clone();
    let index = ColumnIndex::resolve(&header, columns, source)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (i, row_result) in csv_reader.records().enumerate() {
        let row = i + 1;
        let parsed = row_result
            .map_err(|error| {
                if let csv::ErrorKind::Utf8 { err, .. } = error.kind() {
                    return GppError::MalformedRecord {
                        source_name: source.to_string(),
                        row,
                        message: format!("invalid UTF-8: {}", err),
                    };
                }
                if matches!(error.kind(), csv::ErrorKind::Io(_)) {
                    return unreadable(&error);
                }
                GppError::Csv {
                    source_name: source.to_string(),
                    error,
                }
            })
            .and_then(|record| index.parse_row(&record, source, row, year));

        match parsed {
            Ok(raw) => records.push(raw),
            Err(err) if policy == RowPolicy::SkipAndWarn && err.is_row_level() => {
                warn!("Skipping row: {}", err);
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok((records, skipped))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Positions of the required columns within one source's header.
#[derive(Debug, Clone)]
struct ColumnIndex {
    forest_id: (usize, String),
    common_name: (usize, String),
    region: (usize, String),
    productivity_sum: (usize, String),
    area_acres: (usize, String),
}

impl ColumnIndex {
    fn resolve(header: &StringRecord, columns: &ColumnMapping, source: &str) -> Result<Self> {
        let find = |name: &str| -> Result<(usize, String)> {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
                .map(|pos| (pos, name.to_string()))
                .ok_or_else(|| GppError::MalformedRecord {
                    source_name: source.to_string(),
                    row: 0,
                    message: format!("missing required column '{}'", name),
                })
        };

        Ok(Self {
            forest_id: find(&columns.forest_id)?,
            common_name: find(&columns.common_name)?,
            region: find(&columns.region)?,
            productivity_sum: find(&columns.productivity_sum)?,
            area_acres: find(&columns.area_acres)?,
        })
    }

    fn parse_row(
        &self,
        record: &StringRecord,
        source: &str,
        row: usize,
        year: i32,
    ) -> Result<RawRecord> {
        let malformed = |message: String| GppError::MalformedRecord {
            source_name: source.to_string(),
            row,
            message,
        };

        let (_, id_name) = &self.forest_id;
        let id_text = required_field(record, &self.forest_id).map_err(&malformed)?;
        let cnid = parse_integer(id_text).ok_or_else(|| {
            malformed(format!("column '{}' is not an integer: '{}'", id_name, id_text))
        })?;

        let (_, region_name) = &self.region;
        let region_text = required_field(record, &self.region).map_err(&malformed)?;
        let region = parse_integer(region_text)
            .and_then(|n| u8::try_from(n).ok())
            .and_then(Region::from_number)
            .ok_or_else(|| {
                malformed(format!(
                    "column '{}' is not a known USFS region: '{}'",
                    region_name, region_text
                ))
            })?;

        let numeric = |column: &(usize, String)| -> Result<f64> {
            let text = required_field(record, column).map_err(&malformed)?;
            parse_number(text).ok_or_else(|| {
                malformed(format!("column '{}' is not numeric: '{}'", column.1, text))
            })
        };
        let productivity_sum = numeric(&self.productivity_sum)?;
        let area_acres = numeric(&self.area_acres)?;

        let common_name = required_field(record, &self.common_name).map_err(&malformed)?;

        Ok(RawRecord {
            cnid,
            common_name: common_name.to_string(),
            region,
            productivity_sum,
            area_acres,
            year,
        })
    }
}

/// The trimmed, non-empty value of `column` in `record`, or a message
/// naming the missing column.
fn required_field<'r>(
    record: &'r StringRecord,
    (pos, name): &(usize, String),
) -> std::result::Result<&'r str, String> {
    match record.get(*pos).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("missing value for column '{}'", name)),
    }
}

/// Parse a finite floating-point number.
fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer, accepting integral floats such as `"12.0"` which some
/// exporters write for integer columns.
fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let v = parse_number(text)?;
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Find `.csv` files under `dir` whose file name contains `year` as a whole
/// digit run. Sorted by path.
fn find_year_files(dir: &Path, year: i32) -> Vec<PathBuf> {
    static DIGIT_RUN: OnceLock<Regex> = OnceLock::new();
    let digits = DIGIT_RUN.get_or_init(|| Regex::new(r"\d+").expect("regex is valid"));
    let year_text = year.to_string();

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            digits.find_iter(&name).any(|m| m.as_str() == year_text)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Tests ─────────────────────────────────────────────────────────────────────
