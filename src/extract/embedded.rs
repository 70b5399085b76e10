//! Values serialised inside inline `<script>` blocks
//!
//! Chart pages ship their numbers as JavaScript literals instead of DOM
//! nodes. Nothing here evaluates JavaScript; each value is located by a
//! narrow textual pattern and returned as raw tokens. Numeric and date
//! coercion is left to the caller.

use crate::{ExtractError, ExtractResult};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key under which the date axis is returned by [`extract_series`]
pub const DATES_FIELD: &str = "Dates";

/// Marker that introduces the date axis of a chart
pub const TICKS_MARKER: &str = "ticks";

/// Text of the first inline script whose body contains `marker`
pub fn find_script(html: &Html, marker: &str) -> Option<String> {
    let selector = Selector::parse("script").ok()?;
    html.select(&selector)
        .map(|script| script.text().collect::<String>())
        .find(|body| body.contains(marker))
}

/// Extracts named numeric series and their date axis from a chart script
///
/// Each field is read from `'<field>', [<tokens>]` (the opening bracket may
/// also precede the field name, as in `['<field>', <tokens>]`). A field with
/// no match is left out of the result. The axis is read from
/// `<date_marker> = [<quoted tokens>];`, which may span lines, and stored
/// under [`DATES_FIELD`]; a missing axis fails the whole page with
/// [`ExtractError::MissingAxis`].
///
/// # Example
///
/// ```
/// use flipwatch::extract::{extract_series, DATES_FIELD};
///
/// let script = r#"draw('Revenue', [1,2,3]); var ticks = ["2020-01","2020-02","2020-03"];"#;
/// let series = extract_series(script, &["Revenue"], "ticks").unwrap();
///
/// assert_eq!(series["Revenue"], vec!["1", "2", "3"]);
/// assert_eq!(series[DATES_FIELD], vec!["2020-01", "2020-02", "2020-03"]);
/// ```
pub fn extract_series(
    script: &str,
    fields: &[&str],
    date_marker: &str,
) -> ExtractResult<BTreeMap<String, Vec<String>>> {
    let axis_pattern = Regex::new(&format!(
        r"{}\s*=\s*\[([^\]]*)\]\s*;",
        regex::escape(date_marker)
    ))
    .map_err(|_| ExtractError::MissingAxis(date_marker.to_string()))?;

    let axis = axis_pattern
        .captures(script)
        .and_then(|c| c.get(1))
        .ok_or_else(|| ExtractError::MissingAxis(date_marker.to_string()))?;

    let mut series = BTreeMap::new();

    for field in fields {
        let pattern = match Regex::new(&format!(
            r#"['"]{}['"]\s*,\s*\[?([-\d.,\s]*)\]"#,
            regex::escape(field)
        )) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Skipping series '{}': {}", field, e);
                continue;
            }
        };

        if let Some(tokens) = pattern.captures(script).and_then(|c| c.get(1)) {
            series.insert(field.to_string(), split_tokens(tokens.as_str()));
        } else {
            tracing::debug!("Series '{}' not present in script", field);
        }
    }

    series.insert(DATES_FIELD.to_string(), split_tokens(axis.as_str()));
    Ok(series)
}

/// Every JSON array literal assigned on its own script line
///
/// Lines of the form `var name = [ ... ];` are parsed with `serde_json`.
/// Assignments holding plain JavaScript rather than JSON (single-quoted
/// strings, bare keys) are skipped. Returns the parsed arrays in script
/// order; fails only when array assignments exist and none of them parse.
pub fn extract_json_arrays(script: &str) -> ExtractResult<Vec<Value>> {
    let mut arrays = Vec::new();
    let mut first_error = None;

    for line in script.lines() {
        let line = line.trim();
        let Some((lhs, rhs)) = line.split_once('=') else {
            continue;
        };
        let rhs = rhs.trim().trim_end_matches(';').trim_end();
        if !(rhs.starts_with('[') && rhs.ends_with(']')) {
            continue;
        }
        match serde_json::from_str(rhs) {
            Ok(array) => arrays.push(array),
            Err(e) => {
                tracing::debug!("Skipping non-JSON assignment '{}': {}", lhs.trim(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) if arrays.is_empty() => Err(e.into()),
        _ => Ok(arrays),
    }
}

fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
