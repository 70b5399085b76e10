//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop for every configured site:
//! - Logging in when the site needs a session
//! - Loading the dedup index from the store
//! - Fetching and parsing index pages in pagination order
//! - Persisting new listings and handing detail pages to the scheduler
//! - Recording the run and its counters
//!
//! Within one site the loop is strictly sequential at the page level: page
//! N+1 is fetched only after every item of page N, including its detail
//! pages, has been handled. The dedup index and crawl state are owned by
//! the loop and never shared with the detail tasks.

use crate::config::Config;
use crate::crawler::fetcher::{fetch_cancellable, Fetch, FetchError, FetchRequest, FetchedPage, HttpFetcher};
use crate::crawler::login::login;
use crate::crawler::scheduler::{DetailContext, DetailOutcome, DetailResult, Scheduler};
use crate::extract::Page;
use crate::output::{CrawlReport, RunReport, SiteReport};
use crate::sites::{self, IndexItem, IndexPage, SiteBinding, SiteKind};
use crate::state::{CrawlState, CrawlTask, DedupIndex, IndexTask};
use crate::storage::{
    open_storage, InsertOutcome, Listing, Record, RecordKind, RecordSink, RunStatus, Storage,
};
use crate::{ConfigError, ExtractResult, FlipwatchError};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main crawler coordinator structure
///
/// Every collaborator is handed in at construction; nothing is swapped
/// afterwards.
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn Storage>,
    sink: Arc<dyn RecordSink>,
    scheduler: Scheduler,
    sites: Vec<SiteBinding>,
}

impl Coordinator {
    /// Creates a coordinator over explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, recorded on the run
    /// * `fetcher` - Fetch capability used for every request
    /// * `store` - Persisted store; also the record sink
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Every enabled site resolved
    /// * `Err(FlipwatchError)` - A site could not be resolved or a login
    ///   credential is missing from the environment
    pub fn new<S>(
        config: Config,
        config_hash: String,
        fetcher: Arc<dyn Fetch>,
        store: Arc<S>,
    ) -> Result<Self, FlipwatchError>
    where
        S: Storage + 'static,
    {
        let sites = config
            .sites
            .iter()
            .filter(|entry| entry.enabled)
            .map(SiteBinding::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        for binding in &sites {
            if let Some(login) = &binding.login {
                if std::env::var(&login.password_env).is_err() {
                    return Err(ConfigError::MissingCredential(login.password_env.clone()).into());
                }
            }
        }

        if sites.is_empty() {
            tracing::warn!("No enabled sites in configuration");
        }

        let sink: Arc<dyn RecordSink> = store.clone();
        let store: Arc<dyn Storage> = store;

        Ok(Self {
            scheduler: Scheduler::new(config.crawler.max_concurrent_details as usize),
            config: Arc::new(config),
            config_hash,
            fetcher,
            store,
            sink,
            sites,
        })
    }

    /// Creates a coordinator with the HTTP fetcher and the SQLite store
    /// named by the configuration
    ///
    /// Fails if the store cannot be opened; no run is recorded in that case.
    pub fn from_config(config: Config, config_hash: String) -> Result<Self, FlipwatchError> {
        tracing::info!("Opening store at {}", config.store.database_path);
        let storage = Arc::new(open_storage(Path::new(&config.store.database_path))?);
        let fetcher = Arc::new(HttpFetcher::new(&config.crawler, &config.user_agent)?);

        Self::new(config, config_hash, fetcher, storage)
    }

    /// Sites this coordinator will crawl, in configuration order
    pub fn sites(&self) -> &[SiteBinding] {
        &self.sites
    }

    /// Restricts the run to a single site kind
    pub fn restrict_to(&mut self, kind: SiteKind) -> Result<(), FlipwatchError> {
        self.sites.retain(|binding| binding.kind == kind);
        if self.sites.is_empty() {
            return Err(ConfigError::Validation(format!(
                "site '{}' is not configured or is disabled",
                kind
            ))
            .into());
        }
        Ok(())
    }

    /// Runs the crawl over every site
    ///
    /// Per-page and per-item failures are counted in the report and never
    /// returned. An error means the store failed; the run row is marked
    /// failed before it is returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, FlipwatchError> {
        let run_id = self.store.create_run(&self.config_hash)?;
        tracing::info!(
            "Starting crawl run {} over {} site(s)",
            run_id,
            self.sites.len()
        );

        let mut sites = Vec::with_capacity(self.sites.len());
        for binding in &self.sites {
            if cancel.is_cancelled() {
                tracing::info!("Run cancelled, not starting {}", binding.kind);
                break;
            }

            match self.crawl_site(binding, &cancel).await {
                Ok(report) => {
                    tracing::info!(
                        "Finished {}: {} listing(s) persisted, {} detail(s) fetched, {} failure(s)",
                        binding.kind,
                        report.listings_persisted,
                        report.details_fetched,
                        report.index_failures + report.details_failed
                    );
                    sites.push(SiteReport {
                        kind: binding.kind,
                        report,
                    });
                }
                Err(e) => {
                    tracing::error!("Crawl of {} failed: {}", binding.kind, e);
                    let partial = RunReport {
                        run_id,
                        status: RunStatus::Failed,
                        sites,
                    };
                    if let Err(finish_err) =
                        self.store
                            .finish_run(run_id, RunStatus::Failed, &partial.total())
                    {
                        tracing::error!("Failed to mark run {} failed: {}", run_id, finish_err);
                    }
                    return Err(e);
                }
            }
        }

        let status = if cancel.is_cancelled() {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        let report = RunReport {
            run_id,
            status,
            sites,
        };

        let mut total = report.total();
        total.cancelled |= cancel.is_cancelled();
        self.store.finish_run(run_id, status, &total)?;

        tracing::info!("Crawl run {} {}", run_id, status.to_db_string());
        Ok(report)
    }

    /// Crawls one site until its frontier is exhausted or the run is cancelled
    async fn crawl_site(
        &self,
        binding: &SiteBinding,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, FlipwatchError> {
        let mut report = CrawlReport::default();
        tracing::info!("Crawling {} from {}", binding.kind, binding.start_url);

        if let Some(login_config) = &binding.login {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    return Ok(report);
                }
                outcome = login(self.fetcher.as_ref(), login_config) => outcome,
            };
            if let Err(e) = outcome {
                tracing::warn!("Login to {} failed, skipping site: {}", binding.kind, e);
                report.index_failures += 1;
                return Ok(report);
            }
        }

        let mut dedup = DedupIndex::load(self.store.as_ref(), &binding.sink)?;
        let mut state = CrawlState::new(
            binding.start_url.clone(),
            self.config.crawler.max_index_pages,
        );
        let context = Arc::new(DetailContext {
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            binding: binding.sink.clone(),
        });

        while let Some(task) = state.frontier_mut().pop() {
            if cancel.is_cancelled() {
                let dropped = state.abandon() + 1;
                tracing::info!(
                    "Crawl of {} cancelled, abandoning {} pending task(s)",
                    binding.kind,
                    dropped
                );
                break;
            }

            match task {
                CrawlTask::FetchIndex(index_task) => {
                    self.crawl_index_page(
                        binding,
                        index_task,
                        &mut state,
                        &mut dedup,
                        &mut report,
                        cancel,
                    )
                    .await;
                }
                CrawlTask::FollowDetail(first) => {
                    let mut batch = vec![first];
                    batch.extend(state.frontier_mut().take_detail_batch());

                    let results = self.scheduler.run_batch(&context, batch, cancel).await;
                    for result in results {
                        record_detail(result, &mut dedup, &mut report);
                    }
                }
            }
        }

        report.cancelled |= cancel.is_cancelled();
        Ok(report)
    }

    /// Fetches and parses one index page, then queues its follow-up work
    async fn crawl_index_page(
        &self,
        binding: &SiteBinding,
        task: IndexTask,
        state: &mut CrawlState,
        dedup: &mut DedupIndex,
        report: &mut CrawlReport,
        cancel: &CancellationToken,
    ) {
        state.set_current(task.url.clone());
        tracing::debug!(
            "Fetching {} index page {}: {}",
            binding.kind,
            task.page_number,
            task.url
        );

        let request = FetchRequest::get(task.url.clone());
        let fetched = match fetch_cancellable(self.fetcher.as_ref(), &request, cancel).await {
            Ok(page) => page,
            Err(FetchError::Cancelled(_)) => return,
            Err(e) => {
                tracing::warn!(
                    "{} index page {} failed, ending pagination: {}",
                    binding.kind,
                    task.page_number,
                    e
                );
                report.index_failures += 1;
                return;
            }
        };

        let index = match parse_index_page(binding, fetched) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    "{} index page {} could not be parsed: {}",
                    binding.kind,
                    task.page_number,
                    e
                );
                report.index_failures += 1;
                return;
            }
        };

        report.index_pages += 1;
        report.listings_rejected += index.rejected as u64;
        tracing::info!(
            "{} index page {}: {} item(s), {} rejected",
            binding.kind,
            task.page_number,
            index.items.len(),
            index.rejected
        );

        for item in index.items {
            self.process_item(binding, item, state, dedup, report);
        }

        match index.next_page {
            Some(next) => {
                state.enqueue_index(next);
            }
            None => tracing::debug!("{} pagination ends at {}", binding.kind, task.url),
        }
    }

    /// Persists an item's listing and queues its detail page, in that order
    fn process_item(
        &self,
        binding: &SiteBinding,
        item: IndexItem,
        state: &mut CrawlState,
        dedup: &mut DedupIndex,
        report: &mut CrawlReport,
    ) {
        let yields_listing = item
            .detail
            .as_ref()
            .map_or(false, |task| task.yields == RecordKind::Listing);
        if item.listing.is_some() || yields_listing {
            report.listings_found += 1;
        }

        if let Some(listing) = item.listing {
            self.persist_listing(binding, listing, dedup, report);
        }

        if let Some(task) = item.detail {
            let yields = task.yields;
            if dedup.contains(yields, &task.key) {
                tracing::debug!("Not following {}: {} {} already stored", task.url, yields, task.key);
                count_skip(yields, report);
            } else {
                let key = task.key.clone();
                if !state.enqueue_detail(task) {
                    tracing::debug!("{} {} already followed this run", yields, key);
                    count_skip(yields, report);
                }
            }
        }
    }

    fn persist_listing(
        &self,
        binding: &SiteBinding,
        listing: Listing,
        dedup: &mut DedupIndex,
        report: &mut CrawlReport,
    ) {
        let key = listing.key();
        if dedup.contains(RecordKind::Listing, &key) {
            tracing::debug!("Listing {} already stored", key);
            report.listings_skipped += 1;
            return;
        }

        let collection = &binding.sink.listings_collection;
        match self.sink.insert(collection, &Record::Listing(listing)) {
            Ok(InsertOutcome::Inserted) => {
                tracing::debug!("Stored listing {} in {}", key, collection);
                report.listings_persisted += 1;
                dedup.mark_seen(RecordKind::Listing, key);
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!("Store already holds listing {}", key);
                report.listings_skipped += 1;
                dedup.mark_seen(RecordKind::Listing, key);
            }
            Err(e) => {
                tracing::warn!("Failed to store listing {}: {}", key, e);
                report.listings_rejected += 1;
            }
        }
    }
}

/// Parses a fetched index page
///
/// Kept synchronous so the parsed document never lives across an await.
fn parse_index_page(binding: &SiteBinding, fetched: FetchedPage) -> ExtractResult<IndexPage> {
    let page = Page::parse(&fetched.body, fetched.url);
    sites::parse_index(binding.kind, &page, binding.follow_details)
}

fn count_skip(kind: RecordKind, report: &mut CrawlReport) {
    match kind {
        RecordKind::Listing => report.listings_skipped += 1,
        RecordKind::Detail => report.details_skipped += 1,
    }
}

/// Folds one detail task's outcome into the dedup index and report
fn record_detail(result: DetailResult, dedup: &mut DedupIndex, report: &mut CrawlReport) {
    let DetailResult { task, outcome } = result;
    match outcome {
        DetailOutcome::Stored { kind, key } => {
            tracing::debug!("Stored {} {} from {}", kind, key, task.url);
            report.details_fetched += 1;
            if kind == RecordKind::Listing {
                report.listings_persisted += 1;
            }
            dedup.mark_seen(kind, key);
        }
        DetailOutcome::Duplicate { kind, key } => {
            tracing::debug!("Store already holds {} {}", kind, key);
            count_skip(kind, report);
            dedup.mark_seen(kind, key);
        }
        DetailOutcome::FetchFailed(e) => {
            tracing::warn!("Detail page {} not fetched: {}", task.url, e);
            report.details_failed += 1;
        }
        DetailOutcome::ExtractFailed(e) => {
            tracing::warn!("Detail page {} not extracted: {}", task.url, e);
            report.details_failed += 1;
        }
        DetailOutcome::StoreFailed(e) => {
            tracing::warn!("Detail record for {} not stored: {}", task.url, e);
            report.details_failed += 1;
        }
        DetailOutcome::Cancelled => {
            tracing::debug!("Detail page {} abandoned", task.url);
        }
    }
}
