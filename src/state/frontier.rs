//! Per-run crawl bookkeeping
//!
//! `CrawlState` owns the frontier of pending fetches, the set of detail keys
//! already followed this run, and the pagination cursor. It is owned by a
//! single coordinator and is never shared between tasks.

use crate::sites::DetailTask;
use crate::state::CompositeKey;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// An index page waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTask {
    pub url: Url,
    /// 1-based position in the pagination sequence
    pub page_number: u32,
}

/// A unit of pending work
#[derive(Debug, Clone)]
pub enum CrawlTask {
    FetchIndex(IndexTask),
    FollowDetail(DetailTask),
}

/// FIFO queue of pending crawl tasks
#[derive(Debug, Default)]
pub struct CrawlFrontier {
    pending: VecDeque<CrawlTask>,
}

impl CrawlFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: CrawlTask) {
        self.pending.push_back(task);
    }

    pub fn pop(&mut self) -> Option<CrawlTask> {
        self.pending.pop_front()
    }

    /// Removes the run of detail tasks at the head of the queue
    ///
    /// Detail tasks discovered on one index page are queued contiguously,
    /// ahead of that page's pagination task, so this returns exactly one
    /// page's worth of independent detail fetches.
    pub fn take_detail_batch(&mut self) -> Vec<DetailTask> {
        let mut batch = Vec::new();
        while let Some(CrawlTask::FollowDetail(_)) = self.pending.front() {
            if let Some(CrawlTask::FollowDetail(task)) = self.pending.pop_front() {
                batch.push(task);
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Where pagination currently stands for one site
#[derive(Debug, Clone, Default)]
pub struct PaginationCursor {
    /// Index pages queued so far, including the start page
    pub pages_queued: u32,
    /// Most recently fetched index page
    pub current: Option<Url>,
}

/// All mutable bookkeeping for crawling one site in one run
#[derive(Debug)]
pub struct CrawlState {
    frontier: CrawlFrontier,
    followed: HashSet<CompositeKey>,
    visited_index: HashSet<Url>,
    cursor: PaginationCursor,
    max_index_pages: u32,
}

impl CrawlState {
    /// Creates state with the start page queued as page 1
    pub fn new(start_url: Url, max_index_pages: u32) -> Self {
        let mut state = Self {
            frontier: CrawlFrontier::new(),
            followed: HashSet::new(),
            visited_index: HashSet::new(),
            cursor: PaginationCursor::default(),
            max_index_pages,
        };
        state.enqueue_index(start_url);
        state
    }

    /// Queues the next index page unless it was already queued this run
    /// or the page budget is spent
    ///
    /// Returns true if the page was queued.
    pub fn enqueue_index(&mut self, url: Url) -> bool {
        if self.cursor.pages_queued >= self.max_index_pages {
            tracing::warn!(
                "Index page limit ({}) reached, not following {}",
                self.max_index_pages,
                url
            );
            return false;
        }

        if !self.visited_index.insert(url.clone()) {
            tracing::debug!("Index page {} already queued this run", url);
            return false;
        }

        self.cursor.pages_queued += 1;
        self.frontier.push(CrawlTask::FetchIndex(IndexTask {
            url,
            page_number: self.cursor.pages_queued,
        }));
        true
    }

    /// Queues a detail fetch unless its key was already followed this run
    ///
    /// Returns true if the task was queued.
    pub fn enqueue_detail(&mut self, task: DetailTask) -> bool {
        if !self.followed.insert(task.key.clone()) {
            return false;
        }
        self.frontier.push(CrawlTask::FollowDetail(task));
        true
    }

    /// Records which index page is being processed
    pub fn set_current(&mut self, url: Url) {
        self.cursor.current = Some(url);
    }

    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    pub fn has_followed(&self, key: &CompositeKey) -> bool {
        self.followed.contains(key)
    }

    pub fn frontier(&self) -> &CrawlFrontier {
        &self.frontier
    }

    pub fn frontier_mut(&mut self) -> &mut CrawlFrontier {
        &mut self.frontier
    }

    /// Drops every pending task; used when a run is cancelled
    pub fn abandon(&mut self) -> usize {
        let dropped = self.frontier.len();
        self.frontier = CrawlFrontier::new();
        dropped
    }
}
