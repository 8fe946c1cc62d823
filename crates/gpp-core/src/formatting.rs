/// Format a number with thousands separators and a fixed number of decimal
/// places.
///
/// # Examples
///
/// ```
/// use gpp_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let formatted = format!("{:.prec$}", value.abs(), prec = decimals as usize);
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut result = group_thousands(int_part);
    if let Some(frac) = frac_part {
        result.push('.');
        result.push_str(frac);
    }

    // "-0.00" reads as noise in a summary table.
    if value < 0.0 && !is_zero_text(&result) {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a fractional change (`0.36` = 36 %) as a signed percentage.
///
/// `None` renders as `"n/a"`.
///
/// ```
/// use gpp_core::formatting::format_change_pct;
///
/// assert_eq!(format_change_pct(Some(0.36), 1), "+36.0%");
/// assert_eq!(format_change_pct(Some(-0.042), 1), "-4.2%");
/// assert_eq!(format_change_pct(None, 1), "n/a");
/// ```
pub fn format_change_pct(fraction: Option<f64>, decimals: u32) -> String {
    match fraction {
        None => "n/a".to_string(),
        Some(f) => {
            let body = format_number(f * 100.0, decimals);
            if body.starts_with('-') || is_zero_text(&body) {
                format!("{}%", body)
            } else {
                format!("+{}%", body)
            }
        }
    }
}

/// Format a count together with its share of `total`, e.g. `"12 (40.0%)"`.
pub fn format_share(count: usize, total: usize) -> String {
    format!(
        "{} ({}%)",
        count,
        format_number(percentage(count as f64, total as f64, 1), 1)
    )
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero.
///
/// ```
/// use gpp_core::formatting::percentage;
///
/// assert!((percentage(50.0, 200.0, 1) - 25.0).abs() < 1e-9);
/// assert_eq!(percentage(0.0, 0.0, 2), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Whether a formatted number is all zeros once separators are ignored.
fn is_zero_text(formatted: &str) -> bool {
    formatted.chars().all(|c| matches!(c, '0' | '.' | ','))
}

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (len - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

// ── Tests ──────────────────────────────────────────────────────────────────────
