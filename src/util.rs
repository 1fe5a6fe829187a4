// Utility helpers for coercing and formatting values.
//
// Export columns are typed by hand in a spreadsheet before they reach us, so
// everything here is forgiving: bad input degrades to a default instead of an
// error.
use num_format::{Locale, ToFormattedString};

/// Trim a text field and drop it when nothing is left.
pub fn clean_text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parse a number the way a spreadsheet user would read it.
///
/// - Trims whitespace and strips thousands separators (`","`).
/// - Accepts a leading numeric prefix, so `"12.5 m3"` reads as `12.5`.
/// - Returns `None` when no digits lead the value.
pub fn parse_f64_lenient(s: Option<&str>) -> Option<f64> {
    let s = s?.trim().replace(',', "");
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    // Longest prefix that still looks like a decimal number.
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            '0'..='9' => seen_digit = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse::<f64>().ok()
}

/// Numeric coercion used for every quantity/value column: `0.0` when the
/// field is blank or unreadable.
pub fn to_number(s: Option<&str>) -> f64 {
    parse_f64_lenient(s).unwrap_or(0.0)
}

/// Run extractors in priority order and keep the first value produced.
pub fn first_some<S, T>(source: &S, extractors: &[fn(&S) -> Option<T>]) -> Option<T> {
    extractors.iter().find_map(|extract| extract(source))
}

/// First candidate that is a non-zero finite number, or `0.0`.
pub fn first_nonzero(candidates: &[f64]) -> f64 {
    candidates
        .iter()
        .copied()
        .find(|v| v.is_finite() && *v != 0.0)
        .unwrap_or(0.0)
}

/// `part / whole` as a percentage in `[0, 100]`; `0` when `whole` is not
/// positive.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    let pct = part / whole * 100.0;
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale thousands separators, e.g. `1,234,567.89`.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
