//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CompositeKey`: normalised multi-attribute record identity
//! - `DedupIndex`: keys already persisted, loaded once per run
//! - `CrawlState`: frontier, followed detail keys and pagination cursor

mod dedup;
mod frontier;
mod key;

// Re-export main types
pub use dedup::DedupIndex;
pub use frontier::{CrawlFrontier, CrawlState, CrawlTask, IndexTask, PaginationCursor};
pub use key::{CompositeKey, KeyPart, KEY_SEPARATOR};
