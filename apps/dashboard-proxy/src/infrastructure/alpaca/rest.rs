//! Market Data REST Client
//!
//! Implements [`MarketDataPort`] over Alpaca's market data REST API with
//! key/secret headers, a request timeout and bounded retries.
//!
//! # Endpoints
//!
//! - `GET /v2/stocks/{symbol}/bars`
//! - `GET /v2/stocks/{symbol}/quotes/latest`
//! - `GET /v1beta1/options/snapshots/{underlying}` (chain, paginated)
//! - `GET /v1beta1/options/snapshots?symbols=` (single contract)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::api_types::{
    AlpacaBarsResponse, AlpacaErrorResponse, AlpacaLatestQuoteResponse,
    AlpacaOptionSnapshotsResponse,
};
use super::auth::Credentials;
use super::error::AlpacaError;
use crate::application::ports::{BarsQuery, MarketDataError, MarketDataPort, OptionsQuery};
use crate::domain::streaming::{Bar, OptionSnapshot, OptionType, OptionsChain, Quote};
use crate::infrastructure::metrics::{self, Endpoint};

/// Default market data API base URL.
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";

/// Largest page the snapshot endpoints return.
const OPTION_PAGE_LIMIT: u32 = 1000;

/// Largest page the bars endpoint returns.
const BAR_PAGE_LIMIT: u32 = 10_000;

// =============================================================================
// Configuration
// =============================================================================

/// Stock data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockFeed {
    /// IEX only (free plan).
    #[default]
    Iex,
    /// Consolidated SIP feed.
    Sip,
}

impl StockFeed {
    /// Parse a feed name; anything but `sip` is IEX.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("sip") {
            Self::Sip
        } else {
            Self::Iex
        }
    }

    /// Feed name used in URLs and query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Iex => "iex",
            Self::Sip => "sip",
        }
    }
}

/// Options data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionsFeed {
    /// Delayed indicative feed (paper accounts).
    #[default]
    Indicative,
    /// Real-time OPRA feed.
    Opra,
}

impl OptionsFeed {
    /// Feed matching the account type.
    #[must_use]
    pub const fn for_paper(paper: bool) -> Self {
        if paper { Self::Indicative } else { Self::Opra }
    }

    /// Feed name used in query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indicative => "indicative",
            Self::Opra => "opra",
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct AlpacaRestConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Market data API base URL, without trailing slash.
    pub data_url: String,
    /// Stock feed for bars and quotes.
    pub stock_feed: StockFeed,
    /// Options feed for snapshots.
    pub options_feed: OptionsFeed,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryConfig,
    /// Maximum pages fetched per options chain side.
    pub max_option_pages: u32,
}

impl AlpacaRestConfig {
    /// Configuration with default feeds, timeout and retries.
    #[must_use]
    pub fn new(credentials: Credentials, data_url: impl Into<String>) -> Self {
        Self {
            credentials,
            data_url: data_url.into().trim_end_matches('/').to_string(),
            stock_feed: StockFeed::default(),
            options_feed: OptionsFeed::default(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            max_option_pages: 10,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Alpaca market data REST client.
#[derive(Debug, Clone)]
pub struct AlpacaRestClient {
    client: Client,
    config: AlpacaRestConfig,
}

impl AlpacaRestClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: AlpacaRestConfig) -> Result<Self, AlpacaError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AlpacaError::Http(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn fetch_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, AlpacaError> {
        let path = format!("/v2/stocks/{}/bars", query.symbol);
        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = query
                .limit
                .map(|limit| limit.saturating_sub(u32::try_from(bars.len()).unwrap_or(u32::MAX)));
            if remaining == Some(0) {
                break;
            }

            let mut params = vec![
                ("timeframe", query.timeframe.clone()),
                ("feed", self.config.stock_feed.as_str().to_string()),
                (
                    "limit",
                    remaining.unwrap_or(BAR_PAGE_LIMIT).min(BAR_PAGE_LIMIT).to_string(),
                ),
            ];
            if let Some(start) = &query.start {
                params.push(("start", start.clone()));
            }
            if let Some(end) = &query.end {
                params.push(("end", end.clone()));
            }
            if let Some(token) = page_token.take() {
                params.push(("page_token", token));
            }

            let page: AlpacaBarsResponse = self.get_json(&path, &params).await?;
            bars.extend(
                page.bars
                    .unwrap_or_default()
                    .into_iter()
                    .map(|bar| bar.into_bar(&query.symbol)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(bars)
    }

    async fn fetch_chain_side(
        &self,
        query: &OptionsQuery,
        option_type: OptionType,
    ) -> Result<OptionsChain, AlpacaError> {
        let path = format!("/v1beta1/options/snapshots/{}", query.underlying);
        let mut chain = OptionsChain::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.config.max_option_pages.max(1) {
            let mut params = vec![
                ("feed", self.config.options_feed.as_str().to_string()),
                ("type", option_type.as_str().to_string()),
                ("limit", OPTION_PAGE_LIMIT.to_string()),
            ];
            if let Some(gte) = query.expiration_gte {
                params.push(("expiration_date_gte", gte.to_string()));
            }
            if let Some(lte) = query.expiration_lte {
                params.push(("expiration_date_lte", lte.to_string()));
            }
            if let Some(token) = page_token.take() {
                params.push(("page_token", token));
            }

            let page: AlpacaOptionSnapshotsResponse = self.get_json(&path, &params).await?;
            chain.extend(page.snapshots.into_iter().map(|(symbol, raw)| {
                let snapshot = OptionSnapshot::from(raw);
                let snapshot = if query.minimal {
                    snapshot.minimal()
                } else {
                    snapshot
                };
                (symbol, snapshot)
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(chain),
            }
        }

        tracing::warn!(
            underlying = %query.underlying,
            option_type = option_type.as_str(),
            contracts = chain.len(),
            "Options chain truncated at page cap"
        );
        Ok(chain)
    }

    async fn fetch_chain(&self, query: &OptionsQuery) -> Result<OptionsChain, AlpacaError> {
        let (mut calls, puts) = tokio::try_join!(
            self.fetch_chain_side(query, OptionType::Call),
            self.fetch_chain_side(query, OptionType::Put),
        )?;
        calls.extend(puts);
        Ok(calls)
    }

    async fn fetch_contract(&self, contract_symbol: &str) -> Result<OptionSnapshot, AlpacaError> {
        let params = [
            ("symbols", contract_symbol.to_string()),
            ("feed", self.config.options_feed.as_str().to_string()),
        ];
        let mut response: AlpacaOptionSnapshotsResponse = self
            .get_json("/v1beta1/options/snapshots", &params)
            .await?;

        response
            .snapshots
            .remove(contract_symbol)
            .map(OptionSnapshot::from)
            .ok_or_else(|| AlpacaError::NotFound(contract_symbol.to_string()))
    }

    /// GET a data API path with retries.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, AlpacaError> {
        let url = format!("{}{path}", self.config.data_url);
        let mut backoff = ExponentialBackoff::new(&self.config.retry);

        loop {
            let request = self
                .client
                .get(&url)
                .query(params)
                .header("APCA-API-KEY-ID", self.config.credentials.key())
                .header("APCA-API-SECRET-KEY", self.config.credentials.secret());

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            error = %e,
                            path,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempt,
                            "Network error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AlpacaError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                        last_error: e.to_string(),
                    });
                }
            };

            let status = response.status();

            if status.is_success() {
                let text = response.text().await?;
                return Ok(serde_json::from_str(&text)?);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());

            let error_body = response.text().await.unwrap_or_default();
            let error_message = serde_json::from_str::<AlpacaErrorResponse>(&error_body)
                .map_or(error_body, |err| err.message);

            match categorize_status(status) {
                ErrorCategory::RateLimited => {
                    if let Some(delay) = backoff.next_backoff() {
                        let delay = retry_after
                            .map_or(delay, Duration::from_secs)
                            .min(self.config.retry.max_backoff);
                        tracing::warn!(
                            path,
                            delay_ms = delay.as_millis(),
                            "Rate limited, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AlpacaError::RateLimited {
                        retry_after_secs: retry_after,
                    });
                }
                ErrorCategory::Retryable => {
                    if let Some(delay) = backoff.next_backoff() {
                        tracing::warn!(
                            status = status.as_u16(),
                            message = %error_message,
                            path,
                            delay_ms = delay.as_millis(),
                            "Retryable error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(AlpacaError::MaxRetriesExceeded {
                        attempts: backoff.attempt,
                        last_error: format!("{}: {error_message}", status.as_u16()),
                    });
                }
                ErrorCategory::NonRetryable => {
                    return Err(match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            AlpacaError::AuthenticationFailed(error_message)
                        }
                        StatusCode::NOT_FOUND => AlpacaError::NotFound(if error_message.is_empty() {
                            path.to_string()
                        } else {
                            error_message
                        }),
                        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                            AlpacaError::InvalidRequest(error_message)
                        }
                        _ => AlpacaError::Api {
                            status: status.as_u16(),
                            message: error_message,
                        },
                    });
                }
            }
        }
    }
}

/// Record the request outcome and convert the error for the port.
fn observe<T>(
    endpoint: Endpoint,
    started: Instant,
    result: Result<T, AlpacaError>,
) -> Result<T, MarketDataError> {
    metrics::record_upstream_request(endpoint, result.is_ok(), started.elapsed());
    result.map_err(|e| {
        tracing::warn!(endpoint = endpoint.as_str(), error = %e, "Upstream request failed");
        MarketDataError::from(e)
    })
}

#[async_trait]
impl MarketDataPort for AlpacaRestClient {
    async fn get_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, MarketDataError> {
        let started = Instant::now();
        observe(Endpoint::Bars, started, self.fetch_bars(query).await)
    }

    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let started = Instant::now();
        let path = format!("/v2/stocks/{symbol}/quotes/latest");
        let params = [("feed", self.config.stock_feed.as_str().to_string())];
        let result = self
            .get_json::<AlpacaLatestQuoteResponse>(&path, &params)
            .await
            .map(Quote::from);
        observe(Endpoint::Quote, started, result)
    }

    async fn get_options_snapshots(
        &self,
        query: &OptionsQuery,
    ) -> Result<OptionsChain, MarketDataError> {
        let started = Instant::now();
        observe(Endpoint::OptionsChain, started, self.fetch_chain(query).await)
    }

    async fn get_option_snapshot(
        &self,
        contract_symbol: &str,
    ) -> Result<OptionSnapshot, MarketDataError> {
        let started = Instant::now();
        observe(
            Endpoint::OptionContract,
            started,
            self.fetch_contract(contract_symbol).await,
        )
    }
}

// =============================================================================
// Retry Helpers
// =============================================================================

/// Error category for determining retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

/// Categorize HTTP status code for retry handling.
const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

/// Exponential backoff calculator.
struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    current_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            current_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }

        let backoff = self.current_backoff;
        self.current_backoff = Duration::from_secs_f64(
            (self.current_backoff.as_secs_f64() * self.multiplier)
                .min(self.max_backoff.as_secs_f64()),
        );

        Some(backoff)
    }
}
