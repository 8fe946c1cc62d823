use clap::{CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GppError, Result};
use crate::models::{
    RowPolicy, SampleYears, SeriesCoverage, DEFAULT_END_YEAR, DEFAULT_START_YEAR,
    DEFAULT_YEAR_STEP,
};

/// File name pattern used when none is configured. `{year}` is replaced by
/// the sample year.
pub const DEFAULT_FILE_PATTERN: &str = "gpp_{year}.csv";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Longitudinal productivity trends for national forests
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gpp-trends",
    about = "Longitudinal productivity trends for national forests",
    version
)]
pub struct Settings {
    /// Directory holding one CSV export per sample year
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// File name pattern; `{year}` is replaced by the sample year
    #[arg(long, default_value = DEFAULT_FILE_PATTERN)]
    pub pattern: String,

    /// First sample year (the baseline)
    #[arg(long, default_value_t = DEFAULT_START_YEAR)]
    pub start_year: i32,

    /// Last sample year
    #[arg(long, default_value_t = DEFAULT_END_YEAR)]
    pub end_year: i32,

    /// Years between samples
    #[arg(long, default_value_t = DEFAULT_YEAR_STEP)]
    pub step: i32,

    /// JSON config file (defaults to ~/.gpp-trends/config.json when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the full result table to this CSV file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// What to do with malformed rows and rows with invalid area
    #[arg(long, default_value = "abort", value_parser = ["abort", "skip"])]
    pub on_bad_row: String,

    /// Accept forests that are missing from some sample years
    #[arg(long)]
    pub allow_gaps: bool,

    /// Number of forests listed at each end of the ranking
    #[arg(long, default_value = "5")]
    pub top: usize,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Source column names, from the config file
    #[arg(skip)]
    pub columns: ColumnMapping,
}

// ── ColumnMapping ──────────────────────────────────────────────────────────────

/// Header names of the required source columns. Matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub forest_id: String,
    pub common_name: String,
    pub region: String,
    pub productivity_sum: String,
    pub area_acres: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            forest_id: "cnid".to_string(),
            common_name: "commonname".to_string(),
            region: "region".to_string(),
            productivity_sum: "sum".to_string(),
            area_acres: "gis_acres".to_string(),
        }
    }
}

// ── ProjectConfig ──────────────────────────────────────────────────────────────

/// Optional JSON config file. Every field is optional; CLI flags given
/// explicitly always win.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_bad_row: Option<RowPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_gaps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnMapping>,
}

impl ProjectConfig {
    /// Default config location, `~/.gpp-trends/config.json`.
    pub fn default_path() -> PathBuf {
        Self::default_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// The default config path rooted at `base_dir`.
    pub fn default_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".gpp-trends").join("config.json")
    }

    /// Load a config file. Unlike the default-path lookup, an explicit path
    /// that cannot be read is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| GppError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments and merge in the config file.
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args_os().collect(), &ProjectConfig::default_path())
    }

    /// Same as [`Settings::load`] with an explicit argument list and default
    /// config path, so tests can redirect both.
    pub fn load_from_args(
        args: Vec<std::ffi::OsString>,
        default_config: &Path,
    ) -> Result<Self> {
        let matches = Settings::command()
            .try_get_matches_from(args)
            .map_err(cli_error)?;
        let mut settings = Settings::from_arg_matches(&matches).map_err(cli_error)?;

        let config = match &settings.config {
            Some(path) => ProjectConfig::load_from(path)?,
            None if default_config.exists() => ProjectConfig::load_from(default_config)?,
            None => ProjectConfig::default(),
        };

        settings.merge_config(config, &matches);

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        Ok(settings)
    }

    /// Apply config values to every field not explicitly set on the
    /// command line.
    fn merge_config(&mut self, config: ProjectConfig, matches: &clap::ArgMatches) {
        // clap keys args by field name, not by the hyphenated flag.
        if !is_arg_explicitly_set(matches, "data_dir") {
            if let Some(v) = config.data_dir {
                self.data_dir = v;
            }
        }
        if !is_arg_explicitly_set(matches, "pattern") {
            if let Some(v) = config.pattern {
                self.pattern = v;
            }
        }
        if !is_arg_explicitly_set(matches, "start_year") {
            if let Some(v) = config.start_year {
                self.start_year = v;
            }
        }
        if !is_arg_explicitly_set(matches, "end_year") {
            if let Some(v) = config.end_year {
                self.end_year = v;
            }
        }
        if !is_arg_explicitly_set(matches, "step") {
            if let Some(v) = config.step {
                self.step = v;
            }
        }
        if !is_arg_explicitly_set(matches, "on_bad_row") {
            if let Some(v) = config.on_bad_row {
                self.on_bad_row = match v {
                    RowPolicy::Abort => "abort".to_string(),
                    RowPolicy::SkipAndWarn => "skip".to_string(),
                };
            }
        }
        if !is_arg_explicitly_set(matches, "allow_gaps") {
            if let Some(v) = config.allow_gaps {
                self.allow_gaps = v;
            }
        }
        if let Some(columns) = config.columns {
            self.columns = columns;
        }
    }

    /// The configured sample-year sequence.
    pub fn sample_years(&self) -> Result<SampleYears> {
        SampleYears::new(self.start_year, self.end_year, self.step)
    }

    pub fn row_policy(&self) -> RowPolicy {
        if self.on_bad_row == "skip" {
            RowPolicy::SkipAndWarn
        } else {
            RowPolicy::Abort
        }
    }

    pub fn coverage(&self) -> SeriesCoverage {
        if self.allow_gaps {
            SeriesCoverage::AllowGaps
        } else {
            SeriesCoverage::Strict
        }
    }
}

/// `--help` and `--version` print and exit like a normal clap parse; every
/// other parse failure becomes a [`GppError::Config`].
fn cli_error(err: clap::Error) -> GppError {
    use clap::error::ErrorKind;
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => GppError::Config(err.to_string()),
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line.
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<OsString> {
        std::iter::once("gpp-trends")
            .chain(list.iter().copied())
            .map(OsString::from)
            .collect()
    }

    fn no_default_config(tmp: &TempDir) -> PathBuf {
        ProjectConfig::default_path_in(tmp.path())
    }

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_defaults_without_config() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_from_args(args(&[]), &no_default_config(&tmp)).unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("."));
        assert_eq!(settings.pattern, DEFAULT_FILE_PATTERN);
        assert_eq!(settings.sample_years().unwrap(), SampleYears::default());
        assert_eq!(settings.row_policy(), RowPolicy::Abort);
        assert_eq!(settings.coverage(), SeriesCoverage::Strict);
        assert_eq!(settings.columns, ColumnMapping::default());
        assert_eq!(settings.log_level, "INFO");
    }

    #[test]
    fn test_cli_flags() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_from_args(
            args(&[
                "--data-dir",
                "/srv/gpp",
                "--start-year",
                "1990",
                "--end-year",
                "2020",
                "--step",
                "10",
                "--on-bad-row",
                "skip",
                "--allow-gaps",
                "--debug",
            ]),
            &no_default_config(&tmp),
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/srv/gpp"));
        assert_eq!(
            settings.sample_years().unwrap().to_vec(),
            vec![1990, 2000, 2010, 2020]
        );
        assert_eq!(settings.row_policy(), RowPolicy::SkipAndWarn);
        assert_eq!(settings.coverage(), SeriesCoverage::AllowGaps);
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_invalid_flag_value_is_config_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = Settings::load_from_args(
            args(&["--on-bad-row", "ignore"]),
            &no_default_config(&tmp),
        )
        .unwrap_err();
        assert!(matches!(err, GppError::Config(_)));
    }

    #[test]
    fn test_bad_year_range_surfaces_from_sample_years() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_from_args(
            args(&["--start-year", "2021", "--end-year", "1986"]),
            &no_default_config(&tmp),
        )
        .unwrap();
        assert!(settings.sample_years().is_err());
    }

    // ── config file ───────────────────────────────────────────────────────────

    #[test]
    fn test_config_file_fills_unset_fields() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("project.json");
        let config = ProjectConfig {
            data_dir: Some(PathBuf::from("/exports")),
            pattern: Some("forest_gpp_{year}.csv".to_string()),
            start_year: Some(2001),
            on_bad_row: Some(RowPolicy::SkipAndWarn),
            allow_gaps: Some(true),
            columns: Some(ColumnMapping {
                productivity_sum: "gpp_sum".to_string(),
                ..ColumnMapping::default()
            }),
            ..ProjectConfig::default()
        };
        config.save_to(&path).unwrap();

        let settings = Settings::load_from_args(
            args(&["--config", path.to_str().unwrap()]),
            &no_default_config(&tmp),
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/exports"));
        assert_eq!(settings.pattern, "forest_gpp_{year}.csv");
        assert_eq!(settings.start_year, 2001);
        assert_eq!(settings.end_year, DEFAULT_END_YEAR);
        assert_eq!(settings.row_policy(), RowPolicy::SkipAndWarn);
        assert_eq!(settings.coverage(), SeriesCoverage::AllowGaps);
        assert_eq!(settings.columns.productivity_sum, "gpp_sum");
        assert_eq!(settings.columns.forest_id, "cnid");
    }

    #[test]
    fn test_cli_wins_over_config_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("project.json");
        std::fs::write(&path, r#"{"start_year": 2001, "on_bad_row": "skip"}"#).unwrap();

        let settings = Settings::load_from_args(
            args(&[
                "--config",
                path.to_str().unwrap(),
                "--start-year",
                "1986",
                "--on-bad-row",
                "abort",
            ]),
            &no_default_config(&tmp),
        )
        .unwrap();

        assert_eq!(settings.start_year, 1986);
        assert_eq!(settings.row_policy(), RowPolicy::Abort);
    }

    #[test]
    fn test_default_config_path_is_used_when_present() {
        let tmp = TempDir::new().expect("tempdir");
        let default_path = ProjectConfig::default_path_in(tmp.path());
        ProjectConfig {
            step: Some(7),
            end_year: Some(2000),
            ..ProjectConfig::default()
        }
        .save_to(&default_path)
        .unwrap();

        let settings = Settings::load_from_args(args(&[]), &default_path).unwrap();
        assert_eq!(settings.step, 7);
        assert_eq!(settings.end_year, 2000);
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("nope.json");
        let err = Settings::load_from_args(
            args(&["--config", missing.to_str().unwrap()]),
            &no_default_config(&tmp),
        )
        .unwrap_err();
        assert!(matches!(err, GppError::FileRead { .. }));
    }

    #[test]
    fn test_malformed_config_is_json_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Settings::load_from_args(
            args(&["--config", path.to_str().unwrap()]),
            &no_default_config(&tmp),
        )
        .unwrap_err();
        assert!(matches!(err, GppError::JsonParse(_)));
    }

    #[test]
    fn test_partial_column_mapping_keeps_defaults() {
        let json = r#"{"region": "REGION_NO"}"#;
        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.region, "REGION_NO");
        assert_eq!(mapping.area_acres, "gis_acres");
    }
}
