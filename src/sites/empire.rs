//! Empire Flippers
//!
//! The marketplace page carries its whole listing batch as JSON array
//! literals in the script that mentions `for_sale_list`. Detail pages draw
//! their revenue, profit and pageview charts from the script containing
//! `updateCanvas()`.

use super::{DetailTask, IndexItem, IndexPage, SiteKind};
use crate::extract::{extract_json_arrays, extract_series, Page, TICKS_MARKER};
use crate::state::KeyPart;
use crate::storage::{detail_key, DetailRecord, Listing, RecordKind};
use crate::{ExtractError, ExtractResult};
use serde_json::{Map, Value};
use url::Url;

const LISTING_SCRIPT_MARKER: &str = "for_sale_list";
const CHART_SCRIPT_MARKER: &str = "updateCanvas()";

/// Series read from the detail chart
pub(super) const CHART_FIELDS: [&str; 3] = ["Revenue", "Profit", "Pageviews"];

pub(super) fn parse_index(page: &Page, follow_details: bool) -> ExtractResult<IndexPage> {
    let script = page
        .script(LISTING_SCRIPT_MARKER)
        .ok_or_else(|| ExtractError::MissingScript(LISTING_SCRIPT_MARKER.to_string()))?;

    let mut index = IndexPage::default();

    for value in extract_json_arrays(&script)? {
        let Value::Array(entries) = value else {
            continue;
        };
        for entry in entries {
            let Value::Object(fields) = entry else {
                index.rejected += 1;
                continue;
            };
            match listing_from_json(page, fields) {
                Some((listing, url)) => {
                    let detail = follow_details.then(|| DetailTask {
                        source: SiteKind::Empire,
                        listing_id: listing.listing_id.clone(),
                        url,
                        yields: RecordKind::Detail,
                        key: detail_key(SiteKind::Empire, &listing.listing_id),
                    });
                    index.items.push(IndexItem {
                        listing: Some(listing),
                        detail,
                    });
                }
                None => index.rejected += 1,
            }
        }
    }

    tracing::debug!(
        "Empire index {}: {} listings, {} rejected",
        page.url(),
        index.items.len(),
        index.rejected
    );
    Ok(index)
}

fn listing_from_json(page: &Page, fields: Map<String, Value>) -> Option<(Listing, Url)> {
    let listing_id = id_text(fields.get("listing_id"))?;
    let post_id = id_text(fields.get("post_id")).unwrap_or_else(|| listing_id.clone());

    let url = page.resolve(&format!("/listing/{}", listing_id))?;
    let mut listing = Listing::new(SiteKind::Empire, &post_id, &listing_id, url.as_str());

    listing.title = text(fields.get("listing_title").or_else(|| fields.get("title")));
    listing.asking_price = text(fields.get("listing_price").or_else(|| fields.get("price")));
    listing.attributes = fields;

    Some((listing, url))
}

/// Normalised id text; blank and null ids count as missing
fn id_text(value: Option<&Value>) -> Option<String> {
    let part = KeyPart::from(value?);
    (!part.as_str().is_empty()).then(|| part.as_str().to_string())
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub(super) fn parse_detail(task: &DetailTask, page: &Page) -> ExtractResult<DetailRecord> {
    let script = page
        .script(CHART_SCRIPT_MARKER)
        .ok_or_else(|| ExtractError::MissingScript(CHART_SCRIPT_MARKER.to_string()))?;

    let series = extract_series(&script, &CHART_FIELDS, TICKS_MARKER)?;

    Ok(DetailRecord {
        source: task.source,
        listing_id: task.listing_id.clone(),
        url: page.url().to_string(),
        series,
    })
}
