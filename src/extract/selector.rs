//! Declarative element matching and value extraction
//!
//! A [`MatchSpec`] picks elements by an attribute value, optionally limited to
//! one tag name and optionally scoped beneath a structural anchor. Extraction
//! never fails for "not found": scalars come back as `None`, tables as
//! [`Table::empty`].

use super::table::Table;
use scraper::ElementRef;

/// How the attribute value is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Whitespace-delimited token sequence, like a class list
    Token,
    /// Raw substring of the attribute value
    Substring,
}

/// Where matching elements are looked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Anywhere under the extraction root
    Document,
    /// Under the parent of a heading that contains `text` and is followed by
    /// a sibling `<table>`
    HeadingBlock { heading_tag: String, text: String },
    /// Under a container with exactly `container_class` that holds a
    /// heading containing `text`
    Section {
        container_tag: String,
        container_class: String,
        heading_tag: String,
        text: String,
    },
}

/// Declarative description of which elements to extract from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpec {
    attr: String,
    value: String,
    mode: MatchMode,
    tag: Option<String>,
    scope: Scope,
    deep_text: bool,
    token_safe: bool,
}

impl MatchSpec {
    /// Elements whose `attr` contains the token sequence `value`
    pub fn attr(attr: &str, value: &str) -> Self {
        Self {
            attr: attr.to_string(),
            value: normalize_space(value),
            mode: MatchMode::Token,
            tag: None,
            scope: Scope::Document,
            deep_text: false,
            token_safe: false,
        }
    }

    /// Elements whose class list contains `token`
    pub fn class(token: &str) -> Self {
        Self::attr("class", token)
    }

    pub fn id(value: &str) -> Self {
        Self::attr("id", value)
    }

    /// Elements whose `attr` contains `needle` anywhere
    pub fn attr_contains(attr: &str, needle: &str) -> Self {
        Self {
            mode: MatchMode::Substring,
            value: needle.to_string(),
            ..Self::attr(attr, "")
        }
    }

    /// Restricts matches to one tag name
    pub fn on_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_ascii_lowercase());
        self
    }

    pub fn beside_heading(mut self, heading_tag: &str, text: &str) -> Self {
        self.scope = Scope::HeadingBlock {
            heading_tag: heading_tag.to_ascii_lowercase(),
            text: text.to_string(),
        };
        self
    }

    pub fn within_section(
        mut self,
        container_tag: &str,
        container_class: &str,
        heading_tag: &str,
        text: &str,
    ) -> Self {
        self.scope = Scope::Section {
            container_tag: container_tag.to_ascii_lowercase(),
            container_class: container_class.to_string(),
            heading_tag: heading_tag.to_ascii_lowercase(),
            text: text.to_string(),
        };
        self
    }

    /// Scalars read all descendant text instead of direct text nodes
    pub fn deep_text(mut self) -> Self {
        self.deep_text = true;
        self
    }

    /// Scalars have spaces replaced with underscores
    pub fn token_safe(mut self) -> Self {
        self.token_safe = true;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn matches(&self, element: ElementRef<'_>) -> bool {
        if let Some(tag) = &self.tag {
            if element.value().name() != tag {
                return false;
            }
        }

        let Some(raw) = element.value().attr(&self.attr) else {
            return false;
        };

        match self.mode {
            MatchMode::Token => {
                format!(" {} ", normalize_space(raw)).contains(&format!(" {} ", self.value))
            }
            MatchMode::Substring => raw.contains(&self.value),
        }
    }
}

/// All elements matching `spec` under `root`, in document order
pub fn select_all<'a>(root: ElementRef<'a>, spec: &MatchSpec) -> Vec<ElementRef<'a>> {
    let include_self = matches!(spec.scope, Scope::Document);
    let mut matched = Vec::new();

    for scope_root in outermost(scope_roots(root, &spec.scope)) {
        for element in scope_root.descendants().filter_map(ElementRef::wrap) {
            if !include_self && element == scope_root {
                continue;
            }
            if spec.matches(element) {
                matched.push(element);
            }
        }
    }

    matched
}

/// Drops repeated scope roots and roots nested inside another root
fn outermost(roots: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let mut kept: Vec<ElementRef<'_>> = Vec::new();
    for candidate in &roots {
        let covered = roots.iter().any(|other| {
            other != candidate && candidate.ancestors().any(|a| a.id() == other.id())
        });
        if !covered && !kept.contains(candidate) {
            kept.push(*candidate);
        }
    }
    kept
}

/// First non-blank text of the matching elements, cleaned
///
/// Returns `None` when nothing matches or every match is blank.
pub fn extract_scalar(root: ElementRef<'_>, spec: &MatchSpec) -> Option<String> {
    for element in select_all(root, spec) {
        let candidates: Vec<String> = if spec.deep_text {
            vec![element.text().collect::<String>()]
        } else {
            element
                .children()
                .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
                .collect()
        };

        if let Some(text) = candidates.iter().find(|t| !t.trim().is_empty()) {
            return Some(clean_text(text, spec.token_safe));
        }
    }
    None
}

/// The `occurrence`-th (1-based) match parsed as a table
///
/// Returns an empty table if there are fewer matches than `occurrence` or the
/// matched fragment holds no table.
pub fn extract_table(root: ElementRef<'_>, spec: &MatchSpec, occurrence: usize) -> Table {
    if occurrence == 0 {
        return Table::empty();
    }

    let matches = select_all(root, spec);
    let Some(element) = matches.get(occurrence - 1) else {
        tracing::trace!(
            "Table occurrence {} requested, {} available",
            occurrence,
            matches.len()
        );
        return Table::empty();
    };

    Table::from_element(*element).unwrap_or_else(|| {
        tracing::debug!("Matched fragment contains no table");
        Table::empty()
    })
}

/// The href of the first match, or of the first link inside it
pub fn extract_link(root: ElementRef<'_>, spec: &MatchSpec) -> Option<String> {
    select_all(root, spec).into_iter().find_map(|element| {
        element
            .value()
            .attr("href")
            .or_else(|| {
                element
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .find(|e| e.value().name() == "a" && e.value().attr("href").is_some())
                    .and_then(|a| a.value().attr("href"))
            })
            .map(|href| href.trim().to_string())
            .filter(|href| !href.is_empty())
    })
}

/// Strips control characters and collapses runs of spaces
///
/// With `token_safe`, the remaining spaces become underscores.
pub fn clean_text(raw: &str, token_safe: bool) -> String {
    let stripped: String = raw.chars().filter(|c| !c.is_control()).collect();
    let collapsed = normalize_space(&stripped);
    if token_safe {
        collapsed.replace(' ', "_")
    } else {
        collapsed
    }
}

fn normalize_space(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn scope_roots<'a>(root: ElementRef<'a>, scope: &Scope) -> Vec<ElementRef<'a>> {
    match scope {
        Scope::Document => vec![root],
        Scope::HeadingBlock { heading_tag, text } => root
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == heading_tag)
            .filter(|e| e.text().collect::<String>().contains(text.as_str()))
            .filter(|e| {
                e.next_siblings()
                    .filter_map(ElementRef::wrap)
                    .any(|s| s.value().name() == "table")
            })
            .filter_map(|e| e.parent().and_then(ElementRef::wrap))
            .collect(),
        Scope::Section {
            container_tag,
            container_class,
            heading_tag,
            text,
        } => root
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == container_tag)
            .filter(|e| e.value().attr("class") == Some(container_class.as_str()))
            .filter(|e| {
                e.descendants().filter_map(ElementRef::wrap).any(|h| {
                    h.value().name() == heading_tag
                        && h.text().collect::<String>().contains(text.as_str())
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const LISTING: &str = r#"
        <html><body>
          <h1 class="ListingHero-propertyIdentifierLink">
             Acme
             Widgets  Store
          </h1>
          <p class="Listing-listingSummary"><span>nested only</span></p>
          <div id="site_age">  </div>
          <div id="site_age">3 years</div>
          <div id="platform">WordPress</div>
          <div class="Panel-section">
            <h2>Financials</h2>
            <table class="Table Table--bordered">
              <tr><th>Month</th><th>Revenue</th><th>Costs</th><th>Profit</th></tr>
              <tr><td>Jan</td><td>100</td><td>40</td><td>60</td></tr>
            </table>
          </div>
          <div class="Panel-section">
            <h4>Top Channels</h4>
            <table class="Table Table--bordered">
              <tr><td>Search</td><td>900</td><td>90%</td></tr>
            </table>
            <h4>Top Countries</h4>
            <table class="Table Table--bordered">
              <tr><td>US</td><td>700</td></tr>
            </table>
          </div>
          <nav><a class="Pagination___nextLink" href="/websites/all?page=2">Next</a></nav>
        </body></html>
    "#;

    fn doc() -> Html {
        Html::parse_document(LISTING)
    }

    #[test]
    fn test_scalar_cleans_text() {
        let doc = doc();
        let value = extract_scalar(
            doc.root_element(),
            &MatchSpec::class("ListingHero-propertyIdentifierLink"),
        );
        assert_eq!(value.as_deref(), Some("Acme Widgets Store"));
    }

    #[test]
    fn test_scalar_skips_blank_matches() {
        let doc = doc();
        let value = extract_scalar(doc.root_element(), &MatchSpec::id("site_age"));
        assert_eq!(value.as_deref(), Some("3 years"));
    }

    #[test]
    fn test_scalar_absent_is_none() {
        let doc = doc();
        assert_eq!(
            extract_scalar(doc.root_element(), &MatchSpec::class("does-not-exist")),
            None
        );
    }

    #[test]
    fn test_scalar_direct_text_vs_deep() {
        let doc = doc();
        let spec = MatchSpec::class("Listing-listingSummary");
        assert_eq!(extract_scalar(doc.root_element(), &spec), None);
        assert_eq!(
            extract_scalar(doc.root_element(), &spec.deep_text()).as_deref(),
            Some("nested only")
        );
    }

    #[test]
    fn test_token_safe() {
        let doc = doc();
        let spec = MatchSpec::class("ListingHero-propertyIdentifierLink").token_safe();
        assert_eq!(
            extract_scalar(doc.root_element(), &spec).as_deref(),
            Some("Acme_Widgets_Store")
        );
    }

    #[test]
    fn test_token_match_is_not_prefix_match() {
        let doc = Html::parse_document(r#"<div class="Table--siteInfoX">x</div>"#);
        assert!(select_all(doc.root_element(), &MatchSpec::class("Table--siteInfo")).is_empty());
        assert_eq!(
            select_all(
                doc.root_element(),
                &MatchSpec::attr_contains("class", "Table--siteInfo")
            )
            .len(),
            1
        );
    }

    #[test]
    fn test_multi_token_class() {
        let doc = doc();
        let tables = select_all(doc.root_element(), &MatchSpec::class("Table Table--bordered"));
        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn test_table_occurrence() {
        let doc = doc();
        let spec = MatchSpec::class("Table Table--bordered");
        let third = extract_table(doc.root_element(), &spec, 3);
        assert_eq!(third.rows()[0], vec!["US", "700"]);
    }

    #[test]
    fn test_table_occurrence_out_of_range_is_empty() {
        let doc = doc();
        let spec = MatchSpec::class("Table Table--bordered");
        assert!(extract_table(doc.root_element(), &spec, 9).is_empty());
        assert!(extract_table(doc.root_element(), &spec, 0).is_empty());
    }

    #[test]
    fn test_section_scope() {
        let doc = doc();
        let spec = MatchSpec::class("Table Table--bordered").within_section(
            "div",
            "Panel-section",
            "h2",
            "Financials",
        );
        let fin = extract_table(doc.root_element(), &spec, 1);
        assert_eq!(fin.rows(), &[vec!["Jan", "100", "40", "60"]]);
    }

    #[test]
    fn test_heading_block_scope() {
        let doc = doc();
        let spec = MatchSpec::class("Table Table--bordered").beside_heading("h4", "Top Countries");
        let matches = select_all(doc.root_element(), &spec);
        // Both tables share the heading's parent block
        assert_eq!(matches.len(), 2);
        assert_eq!(
            extract_table(doc.root_element(), &spec, 2).rows()[0],
            vec!["US", "700"]
        );
    }

    #[test]
    fn test_extract_link() {
        let doc = doc();
        assert_eq!(
            extract_link(doc.root_element(), &MatchSpec::class("Pagination___nextLink")).as_deref(),
            Some("/websites/all?page=2")
        );
        assert_eq!(
            extract_link(doc.root_element(), &MatchSpec::class("Pagination___prevLink")),
            None
        );
    }

    #[test]
    fn test_on_tag() {
        let doc = Html::parse_document(
            r#"<dl><dt class="item-x">Label</dt><dd class="item-x">Value</dd></dl>"#,
        );
        let spec = MatchSpec::class("item-x").on_tag("dd");
        assert_eq!(
            extract_scalar(doc.root_element(), &spec).as_deref(),
            Some("Value")
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Yearly\tRevenue \n", false), "YearlyRevenue");
        assert_eq!(clean_text("Asking  Price", true), "Asking_Price");
    }
}
