//! Bounded worker pool for detail-page fetches
//!
//! This module handles:
//! - Running one index page's detail tasks concurrently
//! - Global concurrency limiting via a semaphore
//! - Writing each parsed record through the sink from its own task
//! - Abandoning in-flight work when the run is cancelled
//!
//! Detail tasks from one index page are independent of each other, so they
//! are the only work the crawl runs in parallel. Each task owns its fetch,
//! parse and insert; the caller gets back one [`DetailResult`] per task and
//! does all dedup bookkeeping itself.

use crate::crawler::fetcher::{fetch_cancellable, Fetch, FetchError, FetchRequest, FetchedPage};
use crate::extract::Page;
use crate::sites::{self, DetailPayload, DetailTask};
use crate::state::CompositeKey;
use crate::storage::{InsertOutcome, Record, RecordKind, RecordSink, SinkBinding, StorageError};
use crate::{ExtractError, ExtractResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every detail task of one site
pub struct DetailContext {
    pub fetcher: Arc<dyn Fetch>,
    pub sink: Arc<dyn RecordSink>,
    /// Collections the site's records are written to
    pub binding: SinkBinding,
}

/// What happened to one detail task
#[derive(Debug)]
pub enum DetailOutcome {
    /// The record was written
    Stored { kind: RecordKind, key: CompositeKey },
    /// The store already held the record
    Duplicate { kind: RecordKind, key: CompositeKey },
    FetchFailed(FetchError),
    ExtractFailed(ExtractError),
    StoreFailed(StorageError),
    /// The run was cancelled before the task finished
    Cancelled,
}

/// A detail task paired with its outcome
#[derive(Debug)]
pub struct DetailResult {
    pub task: DetailTask,
    pub outcome: DetailOutcome,
}

/// Runs batches of detail tasks with at most `max_concurrent` in flight
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Maximum detail fetches in flight at once (at least 1)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs every task in `tasks` and returns their results in input order
    ///
    /// On cancellation the remaining tasks are aborted; tasks that had
    /// already finished keep their results, aborted ones are reported as
    /// [`DetailOutcome::Cancelled`].
    pub async fn run_batch(
        &self,
        context: &Arc<DetailContext>,
        tasks: Vec<DetailTask>,
        cancel: &CancellationToken,
    ) -> Vec<DetailResult> {
        let total = tasks.len();
        let mut slots: Vec<Option<DetailResult>> = (0..total).map(|_| None).collect();
        let mut pending: Vec<Option<DetailTask>> = Vec::with_capacity(total);
        let mut in_flight = JoinSet::new();

        for (position, task) in tasks.into_iter().enumerate() {
            pending.push(Some(task.clone()));

            let semaphore = Arc::clone(&self.semaphore);
            let context = Arc::clone(context);
            let cancel = cancel.clone();

            in_flight.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => follow_detail(&context, &task, &cancel).await,
                    Err(_) => DetailOutcome::Cancelled,
                };
                (position, DetailResult { task, outcome })
            });
        }

        tracing::debug!(
            "Following {} detail pages ({} at a time)",
            total,
            self.max_concurrent
        );

        loop {
            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok((position, result))) => {
                        pending[position] = None;
                        slots[position] = Some(result);
                    }
                    Some(Err(e)) => tracing::error!("Detail task did not complete: {}", e),
                    None => break,
                },
                _ = cancel.cancelled() => {
                    in_flight.abort_all();
                    while let Some(joined) = in_flight.join_next().await {
                        if let Ok((position, result)) = joined {
                            pending[position] = None;
                            slots[position] = Some(result);
                        }
                    }
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(pending)
            .filter_map(|(slot, task)| match (slot, task) {
                (Some(result), _) => Some(result),
                (None, Some(task)) => Some(DetailResult {
                    task,
                    outcome: DetailOutcome::Cancelled,
                }),
                (None, None) => None,
            })
            .collect()
    }
}

/// Fetches, parses and stores one detail page
async fn follow_detail(
    context: &DetailContext,
    task: &DetailTask,
    cancel: &CancellationToken,
) -> DetailOutcome {
    let request = FetchRequest::get(task.url.clone());
    let fetched = match fetch_cancellable(context.fetcher.as_ref(), &request, cancel).await {
        Ok(page) => page,
        Err(FetchError::Cancelled(_)) => return DetailOutcome::Cancelled,
        Err(e) => return DetailOutcome::FetchFailed(e),
    };

    let record = match parse_detail_page(task, fetched) {
        Ok(record) => record,
        Err(e) => return DetailOutcome::ExtractFailed(e),
    };

    let kind = record.kind();
    let key = record.key();
    match context.sink.insert(context.binding.collection(kind), &record) {
        Ok(InsertOutcome::Inserted) => DetailOutcome::Stored { kind, key },
        Ok(InsertOutcome::Duplicate) => DetailOutcome::Duplicate { kind, key },
        Err(e) => DetailOutcome::StoreFailed(e),
    }
}

/// Parses a fetched detail page into the record it holds
///
/// The parsed document is dropped before returning so nothing non-`Send`
/// outlives this call.
fn parse_detail_page(task: &DetailTask, fetched: FetchedPage) -> ExtractResult<Record> {
    let page = Page::parse(&fetched.body, fetched.url);
    Ok(match sites::parse_detail(task, &page)? {
        DetailPayload::Series(detail) => Record::Detail(detail),
        DetailPayload::Listing(listing) => Record::Listing(listing),
    })
}
