//! HTTP client for the course catalog.
//!
//! A fetch is two requests:
//! 1. GET the course listing page and find the section's detail link
//! 2. GET the detail page and read the seat table

use super::error::FetchError;
use super::types::{CourseQuery, SeatSnapshot};
use super::{parse_detail, parse_listing};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Base URL of the catalog site.
const CATALOG_BASE_URL: &str = "https://www.uvic.ca";

/// Path of the course listing page.
const LISTING_PATH: &str = "/BAN1P/bwckctlg.p_disp_listcrse";

/// What to do when no listing heading matches the requested section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Fail the fetch with [`FetchError::NotFound`]
    #[default]
    Error,
    /// Log a warning and report an all-zero snapshot
    Zero,
}

/// Configuration for the catalog client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Scheme and host of the catalog; detail links are resolved against it
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Total timeout per request
    pub timeout_secs: u64,
    pub user_agent: String,
    pub not_found: NotFoundPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: CATALOG_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 30,
            user_agent: concat!("seatwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            not_found: NotFoundPolicy::default(),
        }
    }
}

/// Anything that can produce a seat snapshot for a query.
#[async_trait]
pub trait SeatSource: Send + Sync {
    async fn fetch(&self, query: &CourseQuery) -> Result<SeatSnapshot, FetchError>;
}

/// Scrapes seat counts from the catalog site.
pub struct CatalogClient {
    client: Client,
    base_url: Url,
    config: CatalogConfig,
}

impl CatalogClient {
    /// Creates a new catalog client with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(CatalogConfig::default())
    }

    /// Creates a new client with custom configuration.
    pub fn with_config(config: CatalogConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        let base_url = Url::parse(&config.base_url)?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Builds the listing URL for `query` as of `today`.
    pub fn listing_url(&self, query: &CourseQuery, today: NaiveDate) -> Result<Url, FetchError> {
        let mut url = self.base_url.join(LISTING_PATH)?;
        url.query_pairs_mut()
            .append_pair("term_in", &query.term.catalog_key(today))
            .append_pair("subj_in", &query.subject_code)
            .append_pair("crse_in", &query.course_number.to_string())
            .append_pair("schd_in", "");
        Ok(url)
    }

    /// Fetches the current seat snapshot for `query`.
    pub async fn fetch_snapshot(&self, query: &CourseQuery) -> Result<SeatSnapshot, FetchError> {
        let start = Instant::now();
        let listing_url = self.listing_url(query, Local::now().date_naive())?;

        info!(
            course = %query,
            term = %query.term,
            url = %listing_url,
            "Fetching course listing"
        );

        let listing = self.get_html(listing_url.as_str()).await?;

        let Some(href) = parse_listing(&listing, &query.section)? else {
            let err = FetchError::NotFound {
                section: query.section.clone(),
                subject: query.subject_code.clone(),
                number: query.course_number,
                term: query.term,
            };
            warn!(course = %query, error = %err, "Section not found in listing");
            return match self.config.not_found {
                NotFoundPolicy::Error => Err(err),
                NotFoundPolicy::Zero => Ok(SeatSnapshot::zero()),
            };
        };

        let detail_url = self.base_url.join(&href)?;
        debug!(course = %query, url = %detail_url, "Fetching section detail page");

        let detail = self.get_html(detail_url.as_str()).await?;
        let snapshot = parse_detail(&detail)?;

        info!(
            course = %query,
            seats_remaining = snapshot.seats.remaining,
            waitlist_remaining = snapshot.waitlist.remaining,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched seat snapshot"
        );

        Ok(snapshot)
    }

    async fn get_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Network {
                message: format!("GET {} returned status {}", url, response.status()),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SeatSource for CatalogClient {
    async fn fetch(&self, query: &CourseQuery) -> Result<SeatSnapshot, FetchError> {
        self.fetch_snapshot(query).await
    }
}
