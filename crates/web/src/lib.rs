//! # ctfrag-web: CTFtime Scraping
//!
//! The web collaborators of the intake pipeline. [`CtftimeScraper`] walks the
//! CTFtime write-up listing and its summary pages and implements the core's
//! `WriteupSource` trait. [`ReadableTextExtractor`] implements `ContentExtractor`
//! on top of `ctfrag-html`.

use async_trait::async_trait;
use ctfrag::config::ScraperConfig;
use ctfrag::intake::{
    ContentExtractor, ExtractError, ListingRow, SourceError, SummaryDetails, WriteupSource,
};
use ctfrag::types::WriteupId;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

// --- Error Definitions ---

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("Failed to fetch {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("Invalid URL '{0}': {1}")]
    InvalidUrl(String, url::ParseError),
}

impl From<ScrapeError> for SourceError {
    fn from(err: ScrapeError) -> Self {
        SourceError(err.to_string())
    }
}

// --- Page Parsing ---

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    selector(css)
        .map(|s| scope.select(&s).collect())
        .unwrap_or_default()
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Rows of a listing page, or `None` when the page has no write-up table.
///
/// The summary link is the first link of the fifth cell; rows whose link does
/// not end in a numeric id are skipped.
pub fn parse_listing(html: &str, base: &Url) -> Option<Vec<ListingRow>> {
    let document = Html::parse_document(html);
    let table = document.select(&selector("table.table")?).next()?;

    let rows = select_all(table, "tbody tr")
        .into_iter()
        .filter_map(|row| {
            let cell = *select_all(row, "td").get(4)?;
            let href = select_all(cell, "a[href]").first()?.value().attr("href")?;
            let ctftime_id: WriteupId = href
                .trim_end_matches('/')
                .rsplit('/')
                .next()?
                .parse()
                .ok()?;
            let summary_url = base.join(href).ok()?.to_string();
            Some(ListingRow {
                ctftime_id,
                summary_url,
            })
        })
        .collect();
    Some(rows)
}

/// Everything the summary page of one write-up offers.
pub fn parse_summary(html: &str, base: &Url) -> SummaryDetails {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let breadcrumb = select_all(root, "ul.breadcrumb").first().copied();
    let crumb = |prefix: &str| {
        breadcrumb.and_then(|b| {
            select_all(b, &format!("a[href^=\"{prefix}\"]"))
                .first()
                .map(|a| text_of(*a))
        })
    };

    let original_url = select_all(root, "a[href]")
        .into_iter()
        .find(|a| text_of(*a).contains("Original writeup"))
        .and_then(|a| a.value().attr("href"))
        .map(|href| {
            base.join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string())
        });

    let embedded_html = select_all(root, "div.well").first().map(|d| d.html());

    let tags = select_all(root, "div.tags a").into_iter().map(text_of).collect();

    let rating = select_all(root, "div.rating")
        .first()
        .map(|d| text_of(*d))
        .and_then(|r| r.parse::<f64>().ok());

    SummaryDetails {
        event_name: crumb("/event/"),
        task_name: crumb("/task/"),
        original_url,
        embedded_html,
        tags,
        rating,
    }
}

// --- CTFtime Source ---

/// Fetches CTFtime pages with the configured timeouts and user agent.
#[derive(Debug, Clone)]
pub struct CtftimeScraper {
    client: reqwest::Client,
    base: Url,
    summary_timeout: Duration,
    content_timeout: Duration,
}

impl CtftimeScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ScrapeError::InvalidUrl(config.base_url.clone(), e))?;
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(ScrapeError::Client)?;
        Ok(Self {
            client,
            base,
            summary_timeout: Duration::from_secs(config.summary_timeout_secs),
            content_timeout: Duration::from_secs(config.content_timeout_secs),
        })
    }

    pub fn listing_url(&self, page: usize) -> Result<Url, ScrapeError> {
        let mut url = self
            .base
            .join("writeups")
            .map_err(|e| ScrapeError::InvalidUrl(self.base.to_string(), e))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, ScrapeError> {
        debug!("GET {url}");
        let fetch_err = |source| ScrapeError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(fetch_err)?;
        if !response.status().is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.text().await.map_err(fetch_err)
    }
}

#[async_trait]
impl WriteupSource for CtftimeScraper {
    async fn listing_page(&self, page: usize) -> Result<Option<Vec<ListingRow>>, SourceError> {
        let url = self.listing_url(page)?;
        let html = self.get_text(url.as_str(), self.summary_timeout).await?;
        Ok(parse_listing(&html, &self.base))
    }

    async fn summary(&self, summary_url: &str) -> Result<SummaryDetails, SourceError> {
        let html = self.get_text(summary_url, self.summary_timeout).await?;
        let details = parse_summary(&html, &self.base);
        debug!(
            "Summary {summary_url}: original={:?}, embedded={}, tags={:?}, rating={:?}",
            details.original_url,
            details.embedded_html.is_some(),
            details.tags,
            details.rating
        );
        Ok(details)
    }

    async fn fetch_content(&self, url: &str) -> Result<String, SourceError> {
        Ok(self.get_text(url, self.content_timeout).await?)
    }
}

// --- Text Extraction ---

/// Boilerplate-free Markdown text of a write-up page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableTextExtractor;

impl ContentExtractor for ReadableTextExtractor {
    fn extract(&self, html: &str) -> Result<String, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError("empty document".to_string()));
        }
        Ok(ctfrag_html::extract_text(html))
    }
}
