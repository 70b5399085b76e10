//! FE International
//!
//! Index pages list each business in a `div.listing` block with its headline
//! figures in `dt`/`dd` pairs. Detail pages, when followed, carry the same
//! inline chart script format as Empire Flippers.

use super::{empire::CHART_FIELDS, DetailTask, IndexItem, IndexPage, SiteKind};
use crate::extract::{
    extract_link, extract_scalar, extract_series, select_all, MatchSpec, Page, TICKS_MARKER,
};
use crate::storage::{detail_key, DetailRecord, Listing, RecordKind};
use crate::{ExtractError, ExtractResult};
use scraper::ElementRef;
use serde_json::Value;
use url::Url;

const STATS: [&str; 3] = ["yearly-revenue", "yearly-profit", "asking-price"];

pub(super) fn parse_index(page: &Page, follow_details: bool) -> ExtractResult<IndexPage> {
    let mut index = IndexPage::default();
    let blocks = select_all(page.root(), &MatchSpec::class("listing").on_tag("div"));

    for block in blocks {
        let Some(listing) = listing_from_block(page, block) else {
            index.rejected += 1;
            continue;
        };

        let detail = if follow_details {
            Url::parse(&listing.url).ok().map(|url| DetailTask {
                source: SiteKind::Fei,
                listing_id: listing.listing_id.clone(),
                url,
                yields: RecordKind::Detail,
                key: detail_key(SiteKind::Fei, &listing.listing_id),
            })
        } else {
            None
        };

        index.items.push(IndexItem {
            listing: Some(listing),
            detail,
        });
    }

    index.next_page = extract_link(page.root(), &MatchSpec::class("next page-numbers"))
        .or_else(|| extract_link(page.root(), &MatchSpec::class("next").on_tag("a")))
        .and_then(|href| page.resolve(&href));

    tracing::debug!(
        "FEI index {}: {} listings, {} rejected, next page {:?}",
        page.url(),
        index.items.len(),
        index.rejected,
        index.next_page.as_ref().map(Url::as_str)
    );
    Ok(index)
}

fn listing_from_block(page: &Page, block: ElementRef<'_>) -> Option<Listing> {
    let header = MatchSpec::class("listing-title").on_tag("h2");
    let href = extract_link(block, &header)?;
    let url = page.resolve(&href)?;

    let post_id = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)?;
    let listing_id = block
        .value()
        .attr("data-listing-id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| post_id.clone());

    let mut listing = Listing::new(SiteKind::Fei, &post_id, &listing_id, url.as_str());
    listing.title = extract_scalar(block, &header.deep_text());

    for stat in STATS {
        let value = extract_scalar(
            block,
            &MatchSpec::attr_contains("class", &format!("listing-overview-item-{}", stat))
                .on_tag("dd")
                .deep_text(),
        );

        let label = extract_scalar(
            block,
            &MatchSpec::attr_contains("class", &format!("listing-overview-item-title-{}", stat))
                .on_tag("dt")
                .deep_text()
                .token_safe(),
        )
        .map(|l| l.to_lowercase());

        if let (Some(label), Some(value)) = (&label, &value) {
            listing
                .attributes
                .insert(label.clone(), Value::String(value.clone()));
        }

        match stat {
            "yearly-revenue" => listing.yearly_revenue = value,
            "yearly-profit" => listing.yearly_profit = value,
            _ => listing.asking_price = value,
        }
    }

    Some(listing)
}

pub(super) fn parse_detail(task: &DetailTask, page: &Page) -> ExtractResult<DetailRecord> {
    let script = page
        .script(TICKS_MARKER)
        .ok_or_else(|| ExtractError::MissingScript(TICKS_MARKER.to_string()))?;

    let series = extract_series(&script, &CHART_FIELDS, TICKS_MARKER)?;

    Ok(DetailRecord {
        source: task.source,
        listing_id: task.listing_id.clone(),
        url: page.url().to_string(),
        series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite_key;

    const INDEX: &str = r#"<html><body>
        <div class="listing" data-listing-id="listing-1">
          <h2 class="listing-title"><a href="/listing/post-1/">Content site in the pet niche</a></h2>
          <dl>
            <dt class="listing-overview-item listing-overview-item-title-yearly-revenue">Yearly Revenue</dt>
            <dd class="listing-overview-item listing-overview-item-yearly-revenue">$120,000</dd>
            <dt class="listing-overview-item listing-overview-item-title-yearly-profit">Yearly Profit</dt>
            <dd class="listing-overview-item listing-overview-item-yearly-profit">$80,000</dd>
            <dt class="listing-overview-item listing-overview-item-title-asking-price">Asking Price</dt>
            <dd class="listing-overview-item listing-overview-item-asking-price">$250,000</dd>
          </dl>
        </div>
        <div class="listing">
          <h2 class="listing-title"><a href="https://feinternational.com/listing/post-2">SaaS</a></h2>
          <dl>
            <dt class="listing-overview-item-title-yearly-revenue">Yearly Revenue</dt>
            <dd class="listing-overview-item-yearly-revenue">$1,000,000</dd>
          </dl>
        </div>
        <div class="listing"><p>Sold</p></div>
        <a class="next page-numbers" href="?page=2">Next</a>
        </body></html>"#;

    fn page(body: &str) -> Page {
        Page::parse(
            body,
            Url::parse("https://feinternational.com/buy-a-website/").unwrap(),
        )
    }

    #[test]
    fn test_index_items_in_page_order() {
        let index = parse_index(&page(INDEX), true).unwrap();

        assert_eq!(index.items.len(), 2);
        assert_eq!(index.rejected, 1);

        let first = index.items[0].listing.as_ref().unwrap();
        assert_eq!(first.key(), composite_key!("fei", "post-1", "listing-1"));
        assert_eq!(first.url, "https://feinternational.com/listing/post-1/");
        assert_eq!(first.title.as_deref(), Some("Content site in the pet niche"));
        assert_eq!(first.yearly_revenue.as_deref(), Some("$120,000"));
        assert_eq!(first.asking_price.as_deref(), Some("$250,000"));
        assert_eq!(first.attributes["yearly_profit"], "$80,000");

        let task = index.items[0].detail.as_ref().unwrap();
        assert_eq!(task.key, composite_key!("fei", "listing-1"));
    }

    #[test]
    fn test_missing_price_is_none() {
        let index = parse_index(&page(INDEX), false).unwrap();
        let second = index.items[1].listing.as_ref().unwrap();

        assert_eq!(second.key(), composite_key!("fei", "post-2", "post-2"));
        assert_eq!(second.yearly_revenue.as_deref(), Some("$1,000,000"));
        assert_eq!(second.asking_price, None);
        assert!(index.items[1].detail.is_none());
    }

    #[test]
    fn test_next_page_resolved() {
        let index = parse_index(&page(INDEX), true).unwrap();
        assert_eq!(
            index.next_page.unwrap().as_str(),
            "https://feinternational.com/buy-a-website/?page=2"
        );
    }

    #[test]
    fn test_last_page_has_no_next() {
        let index = parse_index(&page("<html><body></body></html>"), true).unwrap();
        assert!(index.items.is_empty());
        assert!(index.next_page.is_none());
    }

    #[test]
    fn test_detail_chart() {
        let task = DetailTask {
            source: SiteKind::Fei,
            listing_id: "listing-1".to_string(),
            url: Url::parse("https://feinternational.com/listing/post-1/").unwrap(),
            yields: RecordKind::Detail,
            key: composite_key!("fei", "listing-1"),
        };
        let body = r#"<script>chart('Revenue', [10,20]); var ticks = ["2020-01","2020-02"];</script>"#;
        let record = parse_detail(&task, &page(body)).unwrap();

        assert_eq!(record.listing_id, "listing-1");
        assert_eq!(record.series["Revenue"], vec!["10", "20"]);
    }
}
