mod bootstrap;
mod report;

use std::io::Write;

use anyhow::{Context, Result};
use gpp_core::settings::Settings;
use gpp_data::analysis::{run_pipeline_nonempty, PipelineOptions};
use gpp_data::writer::write_csv_file;

use crate::report::Summary;

fn main() -> Result<()> {
    let settings = Settings::load()?;

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("GPP Trends v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Data: {}, Pattern: {}, Years: {}-{} every {}",
        settings.data_dir.display(),
        settings.pattern,
        settings.start_year,
        settings.end_year,
        settings.step
    );

    run(&settings, &mut std::io::stdout().lock())
}

/// Run the pipeline, export the table when `--output` is set and print the
/// summary to `out`.
fn run(settings: &Settings, out: &mut impl Write) -> Result<()> {
    let options = PipelineOptions::from_settings(settings)?;
    let resolver = bootstrap::resolver_for(settings);

    let result = run_pipeline_nonempty(&resolver, &options).with_context(|| {
        format!(
            "failed to build GPP trends from {}",
            settings.data_dir.display()
        )
    })?;

    if let Some(path) = &settings.output {
        write_csv_file(&result.table, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let summary = Summary::from_table(&result.table, settings.top);
    if settings.json {
        writeln!(out, "{}", report::render_json(&result, &summary)?)?;
    } else {
        write!(out, "{}", report::render_text(&summary))?;
    }

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
