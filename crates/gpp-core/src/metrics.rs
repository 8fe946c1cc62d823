//! Per-row metric derivation.
//!
//! Turns a [`RawRecord`] into an [`EnrichedRecord`] by converting units and
//! cleaning the forest name. Every function here is pure; no row depends on
//! any other.

use crate::error::{GppError, Result};
use crate::models::{EnrichedRecord, RawRecord, Region};

/// Raw productivity sums are reported in millions.
pub const PRODUCTIVITY_SCALE: f64 = 1_000_000.0;

/// Acres per square kilometre, as used by the upstream reports.
pub const ACRES_PER_KM2: f64 = 247.0;

/// Phrases stripped from common names. Longest first so the plural form is
/// removed whole.
const NAME_SUFFIXES: [&str; 2] = ["National Forests", "National Forest"];

/// Derive the normalized metrics for one row.
///
/// Fails with [`GppError::InvalidArea`] when the area is not a positive,
/// finite number of square kilometres. Whether that drops the row or aborts
/// the run is up to the caller.
pub fn derive(raw: &RawRecord) -> Result<EnrichedRecord> {
    let area_km2 = raw.area_acres / ACRES_PER_KM2;
    if !area_km2.is_finite() || area_km2 <= 0.0 {
        return Err(GppError::InvalidArea {
            forest_id: raw.cnid,
            year: raw.year,
            acres: raw.area_acres,
        });
    }

    let productivity_scaled = raw.productivity_sum / PRODUCTIVITY_SCALE;

    Ok(EnrichedRecord {
        raw: raw.clone(),
        productivity_scaled,
        area_km2,
        productivity_per_km2: productivity_scaled / area_km2,
        short_name: short_name(&raw.common_name),
        region_label: region_label(raw.region),
    })
}

/// `"R"` followed by the region number.
pub fn region_label(region: Region) -> String {
    region.label()
}

/// Shorten a forest's common name for display.
///
/// Removes "National Forest"/"National Forests", replaces the word "and"
/// with "&", and collapses whitespace. The transform is repeated until it
/// reaches a fixed point, so `short_name(short_name(s)) == short_name(s)`.
///
/// ```
/// use gpp_core::metrics::short_name;
///
/// assert_eq!(short_name("Bighorn National Forest"), "Bighorn");
/// assert_eq!(
///     short_name("Medicine Bow and Routt National Forests"),
///     "Medicine Bow & Routt"
/// );
/// ```
pub fn short_name(name: &str) -> String {
    let mut current = clean_once(name);
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One pass of the name transform. Only ever shortens the string or turns
/// non-space whitespace into spaces, so iterating it terminates.
fn clean_once(name: &str) -> String {
    let mut stripped = name.to_string();
    for suffix in NAME_SUFFIXES {
        stripped = stripped.replace(suffix, "");
    }

    // Whole words only: "Highland" keeps its "and".
    stripped
        .split_whitespace()
        .map(|word| if word == "and" { "&" } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}
