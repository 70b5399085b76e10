//! Flippa
//!
//! Index pages are plain link lists; every business is described on its own
//! detail page, so a Flippa listing is produced by the detail fetch and is
//! deduplicated in the listing namespace. Browsing requires a logged-in
//! session, which the coordinator establishes before the first index fetch.

use super::{DetailTask, IndexItem, IndexPage, SiteKind};
use crate::composite_key;
use crate::extract::{extract_link, select_all, MatchSpec, NamedTable, Page, Table};
use crate::state::CompositeKey;
use crate::storage::{Listing, RecordKind};
use crate::ExtractResult;
use scraper::ElementRef;
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

const RESULTS_CLASS: &str = "ListingResults___listingResults";
const NEXT_LINK_CLASS: &str = "Pagination___nextLink";
const BORDERED_TABLE: &str = "Table Table--bordered";

/// Numeric post id leading the first path segment (`/12345-some-name`)
fn parse_post_id(url: &Url) -> Option<String> {
    let first = url.path_segments()?.next()?;
    let split = first
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(first.len());
    let (digits, rest) = first.split_at(split);
    (!digits.is_empty() && rest.starts_with('-')).then(|| digits.to_string())
}

fn listing_key(post_id: &str) -> CompositeKey {
    composite_key!(SiteKind::Flippa.as_str(), post_id, post_id)
}

pub(super) fn parse_index(page: &Page, follow_details: bool) -> ExtractResult<IndexPage> {
    let mut index = IndexPage::default();
    let mut seen = HashSet::new();

    for container in select_all(page.root(), &MatchSpec::attr_contains("class", RESULTS_CLASS)) {
        for anchor in container.descendants().filter_map(ElementRef::wrap) {
            if anchor.value().name() != "a" {
                continue;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = page.resolve(href.trim()) else {
                index.rejected += 1;
                continue;
            };
            let Some(post_id) = parse_post_id(&url) else {
                tracing::trace!("Skipping non-listing link {}", url);
                continue;
            };
            // Cards link to the same post from the image and the title
            if !seen.insert(post_id.clone()) {
                continue;
            }

            let item = if follow_details {
                IndexItem {
                    listing: None,
                    detail: Some(DetailTask {
                        source: SiteKind::Flippa,
                        listing_id: post_id.clone(),
                        url,
                        yields: RecordKind::Listing,
                        key: listing_key(&post_id),
                    }),
                }
            } else {
                IndexItem {
                    listing: Some(Listing::new(
                        SiteKind::Flippa,
                        &post_id,
                        &post_id,
                        url.as_str(),
                    )),
                    detail: None,
                }
            };
            index.items.push(item);
        }
    }

    index.next_page = extract_link(page.root(), &MatchSpec::attr_contains("class", NEXT_LINK_CLASS))
        .and_then(|href| page.resolve(&href));

    tracing::debug!(
        "Flippa index {}: {} posts, next page {:?}",
        page.url(),
        index.items.len(),
        index.next_page.as_ref().map(Url::as_str)
    );
    Ok(index)
}

pub(super) fn parse_detail(task: &DetailTask, page: &Page) -> ExtractResult<Listing> {
    let mut listing = Listing::new(
        SiteKind::Flippa,
        &task.listing_id,
        &task.listing_id,
        task.url.as_str(),
    );

    listing.title = page.scalar(&MatchSpec::class("ListingHero-propertyIdentifierLink").deep_text());
    listing.site_type = page.scalar(&MatchSpec::id("site_type"));
    listing.platform = page.scalar(&MatchSpec::id("platform"));
    listing.site_age = page.scalar(&MatchSpec::id("site_age"));

    let scalars = [
        ("summary", MatchSpec::class("Listing-listingSummary").deep_text()),
        ("seller", MatchSpec::attr("context", "SellerNameOnListing")),
        ("listing_status", MatchSpec::class("ListingStatus-auctionTime--bidBox")),
        ("seller_tx_value", MatchSpec::class("UserProfile-transactionsSummary")),
        ("pg_session", MatchSpec::id("pages_/_session")),
        ("pg_duration", MatchSpec::id("avg._session_duration")),
        ("pg_bounce", MatchSpec::id("bounce_rate")),
    ];
    for (name, spec) in &scalars {
        if let Some(value) = page.scalar(spec) {
            listing
                .attributes
                .insert(name.to_string(), Value::String(value));
        }
    }

    let traffic = page
        .table(&MatchSpec::class("Listing-trafficTable"), 1)
        .bind_columns(&["date", "uniques", "views"]);
    let channels = page
        .table(
            &MatchSpec::class(BORDERED_TABLE).beside_heading("h4", "Top Channels"),
            2,
        )
        .bind_columns(&["channels", "views", "pct_of_total"]);
    let countries = page
        .table(
            &MatchSpec::class(BORDERED_TABLE).beside_heading("h4", "Top Countries"),
            3,
        )
        .bind_columns(&["country", "views"]);
    let financials = page
        .table(
            &MatchSpec::class(BORDERED_TABLE).within_section("div", "Panel-section", "h2", "Financials"),
            1,
        )
        .bind_columns(&["date", "revenue", "costs", "profit"]);

    let mut info = Table::empty();
    for occurrence in 1..=3 {
        info.append(page.table(&MatchSpec::class("Table--siteInfo"), occurrence));
    }
    let mut site_info = info.bind_columns(&["field", "value"]);
    site_info.map_column("field", |f| f.replace('?', "").trim().to_string());

    for (name, table) in [
        ("traffic", traffic),
        ("channels", channels),
        ("countries", countries),
        ("financials", financials),
        ("site_info", site_info),
    ] {
        insert_table(&mut listing, name, table);
    }

    if listing.title.is_none() {
        tracing::debug!("Flippa listing {} has no title", task.url);
    }
    Ok(listing)
}

fn insert_table(listing: &mut Listing, name: &str, table: NamedTable) {
    if table.is_empty() {
        return;
    }
    let rows = table.to_records().into_iter().map(Value::Object).collect();
    listing.tables.insert(name.to_string(), Value::Array(rows));
}
