//! Page content extraction
//!
//! # Components
//!
//! - `selector`: declarative element matching, scalar/table/link extraction
//! - `table`: positional tables and caller-bound column names
//! - `embedded`: series and JSON literals inside inline scripts
//!
//! `scraper::Html` is not `Send`, so a [`Page`] is parsed, read and dropped
//! inside synchronous code; only owned records cross an `.await`.

mod embedded;
mod selector;
mod table;

pub use embedded::{extract_json_arrays, extract_series, find_script, DATES_FIELD, TICKS_MARKER};
pub use selector::{
    clean_text, extract_link, extract_scalar, extract_table, select_all, MatchMode, MatchSpec,
    Scope,
};
pub use table::{NamedTable, Record, Table};

use scraper::{ElementRef, Html};
use url::Url;

/// A fetched document together with the URL it was fetched from
pub struct Page {
    html: Html,
    url: Url,
}

impl Page {
    pub fn parse(body: &str, url: Url) -> Self {
        Self {
            html: Html::parse_document(body),
            url,
        }
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Resolves a possibly relative href against the page URL
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.url.join(href).ok()
    }

    pub fn scalar(&self, spec: &MatchSpec) -> Option<String> {
        extract_scalar(self.root(), spec)
    }

    pub fn table(&self, spec: &MatchSpec, occurrence: usize) -> Table {
        extract_table(self.root(), spec, occurrence)
    }

    /// Script text containing `marker`, if any
    pub fn script(&self, marker: &str) -> Option<String> {
        find_script(&self.html, marker)
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("url", &self.url).finish()
    }
}
