//! Plain-text and JSON summaries of a result table.

use std::fmt::Write as _;

use gpp_core::formatting::{format_change_pct, format_number, format_share};
use gpp_core::models::ChangeAnnotatedRecord;
use gpp_data::analysis::AnalysisResult;
use gpp_data::table::{RegionSummary, ResultTable};
use serde::Serialize;

/// One forest in the ranking.
#[derive(Debug, Clone, Serialize)]
pub struct ForestLine {
    pub cnid: i64,
    pub name: String,
    pub region: String,
    pub latest_year: i32,
    pub productivity_scaled: f64,
    pub productivity_per_km2: f64,
    pub final_change_pct: Option<f64>,
}

impl From<&ChangeAnnotatedRecord> for ForestLine {
    fn from(row: &ChangeAnnotatedRecord) -> Self {
        Self {
            cnid: row.forest_id(),
            name: row.short_name().to_string(),
            region: row.record.region_label.clone(),
            latest_year: row.year(),
            productivity_scaled: row.productivity_scaled(),
            productivity_per_km2: row.record.productivity_per_km2,
            final_change_pct: row.final_change_pct,
        }
    }
}

/// Headline figures for a run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub baseline_year: Option<i32>,
    pub latest_year: Option<i32>,
    pub forests: usize,
    pub improved: usize,
    pub declined: usize,
    pub mean_final_change_pct: Option<f64>,
    pub regions: Vec<RegionSummary>,
    pub top: Vec<ForestLine>,
    pub bottom: Vec<ForestLine>,
}

impl Summary {
    /// Summarise `table`, listing `top` forests at each end of the ranking.
    /// Forests with an undefined final change are left out of the bottom
    /// list.
    pub fn from_table(table: &ResultTable, top: usize) -> Self {
        let years = table.years();
        let ranked = table.ranked_by_final_change();

        let best: Vec<ForestLine> = ranked.iter().take(top).map(|r| ForestLine::from(*r)).collect();
        let worst: Vec<ForestLine> = ranked
            .iter()
            .rev()
            .filter(|r| r.final_change_pct.is_some())
            .take(top)
            .map(|r| ForestLine::from(*r))
            .collect();

        Self {
            baseline_year: years.first().copied(),
            latest_year: years.last().copied(),
            forests: table.forest_count(),
            improved: table.improved_count(),
            declined: table.declined_count(),
            mean_final_change_pct: table.mean_final_change_pct(),
            regions: table.region_summaries(),
            top: best,
            bottom: worst,
        }
    }
}

/// Render the summary as aligned plain text.
pub fn render_text(summary: &Summary) -> String {
    let mut out = String::new();

    let span = match (summary.baseline_year, summary.latest_year) {
        (Some(first), Some(last)) => format!("{}–{}", first, last),
        _ => "no data".to_string(),
    };
    let _ = writeln!(out, "GPP trends {} ({} forests)", span, summary.forests);
    let _ = writeln!(
        out,
        "  Mean change since baseline: {}",
        format_change_pct(summary.mean_final_change_pct, 1)
    );
    let _ = writeln!(out, "  Improved: {}", format_share(summary.improved, summary.forests));
    let _ = writeln!(out, "  Declined: {}", format_share(summary.declined, summary.forests));

    if !summary.regions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "  {:<6} {:>7} {:>9} {:>9} {:>10}",
            "Region", "Forests", "Improved", "Declined", "Mean"
        );
        for r in &summary.regions {
            let _ = writeln!(
                out,
                "  {:<6} {:>7} {:>9} {:>9} {:>10}",
                r.label,
                r.forests,
                r.improved,
                r.declined,
                format_change_pct(r.mean_final_change_pct, 1)
            );
        }
    }

    write_ranking(&mut out, "Largest gains", &summary.top);
    write_ranking(&mut out, "Largest losses", &summary.bottom);

    out
}

fn write_ranking(out: &mut String, title: &str, lines: &[ForestLine]) {
    if lines.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "  {}:", title);
    for line in lines {
        let _ = writeln!(
            out,
            "    {:<28} {:<4} {:>9}  {:>12} M  ({} per km²)",
            line.name,
            line.region,
            format_change_pct(line.final_change_pct, 1),
            format_number(line.productivity_scaled, 2),
            format_number(line.productivity_per_km2, 5),
        );
    }
}

/// Render metadata and summary as one pretty JSON document.
pub fn render_json(result: &AnalysisResult, summary: &Summary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "metadata": result.metadata,
        "summary": summary,
    }))
}
