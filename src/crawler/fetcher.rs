//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building an HTTP client with the configured user agent and cookie store
//! - GET requests for index and detail pages
//! - Form POSTs for the login step
//! - Bounded retry for transient failures
//! - Error classification
//!
//! The crawler depends only on the [`Fetch`] trait; [`HttpFetcher`] is the
//! reqwest-backed implementation.

use crate::config::{CrawlerConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::{header::REFERER, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Fetch of {0} cancelled")]
    Cancelled(String),
}

impl FetchError {
    /// Whether another attempt may succeed
    ///
    /// | Condition | Retried |
    /// |-----------|---------|
    /// | Timeout | yes |
    /// | Connection error | yes |
    /// | HTTP 5xx | yes |
    /// | HTTP 404, 429, other 4xx | no |
    /// | Cancelled | no |
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Request { .. } | Self::Cancelled(_) => false,
        }
    }

    fn from_reqwest(url: &Url, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// One request to the fetch capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form body; turns the request into a POST
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            form: None,
        }
    }

    pub fn post_form(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            url,
            headers: Vec::new(),
            form: Some(form),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Raw page content returned by a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// The narrow fetch capability the crawler depends on
///
/// Session state (cookies established by a login POST) is the
/// implementation's concern.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// Fetches `request` unless `cancel` fires first
///
/// A cancelled fetch is dropped mid-flight and its result discarded.
pub async fn fetch_cancellable(
    fetcher: &dyn Fetch,
    request: &FetchRequest,
    cancel: &CancellationToken,
) -> Result<FetchedPage, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled(request.url.to_string())),
        result = fetcher.fetch(request) => result,
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.user_agent.as_str())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10).min(timeout))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetch`] with bounded retry
pub struct HttpFetcher {
    client: Client,
    referer: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            user_agent,
            Duration::from_secs(crawler.request_timeout_secs),
        )?;

        Ok(Self {
            client,
            referer: user_agent.referer.clone(),
            max_retries: crawler.max_retries,
            retry_delay: Duration::from_millis(crawler.retry_delay_ms),
        })
    }

    async fn fetch_once(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let url = &request.url;
        let mut builder = match &request.form {
            Some(form) => self.client.post(url.clone()).form(form),
            None => self.client.get(url.clone()),
        };

        if let Some(referer) = &self.referer {
            builder = builder.header(REFERER, referer.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        let final_url = response.url().clone();

        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Rate limited by {}", url);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(request).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e,
                        attempt,
                        self.max_retries + 1,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
