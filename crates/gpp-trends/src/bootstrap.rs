use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use gpp_core::settings::Settings;
use gpp_data::reader::DirectoryResolver;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a CLI log-level name to a `tracing` filter directive.
///
/// Unknown names fall back to `"info"`.
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Logs go to stderr. When `log_file` is set they are also appended to that
/// file without ANSI colours.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Source bootstrap ───────────────────────────────────────────────────────────

/// Build the directory resolver described by `settings`.
pub fn resolver_for(settings: &Settings) -> DirectoryResolver {
    DirectoryResolver::new(&settings.data_dir, settings.pattern.clone())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gpp_core::settings::ProjectConfig;
    use std::ffi::OsString;
    use tempfile::TempDir;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("CRITICAL"), "info");
    }

    #[test]
    fn test_resolver_for_uses_settings_pattern() {
        let tmp = TempDir::new().expect("tempdir");
        let args: Vec<OsString> = [
            "gpp-trends",
            "--data-dir",
            tmp.path().to_str().unwrap(),
            "--pattern",
            "nf_{year}_gpp.csv",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        let settings =
            Settings::load_from_args(args, &ProjectConfig::default_path_in(tmp.path())).unwrap();

        let resolver = resolver_for(&settings);
        assert_eq!(
            resolver.patterned_path(2011),
            tmp.path().join("nf_2011_gpp.csv")
        );
    }
}
