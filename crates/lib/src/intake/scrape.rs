//! # Stage 1: Scrape
//!
//! Walks the write-up listing, skips known and rejected ids, groups items by
//! source URL and persists the raw content of every single-task group.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::grouping::{record_for_review, SourceGrouper};
use crate::intake::throttle::Throttle;
use crate::ledger::RejectionLedger;
use crate::manifest::RunManifest;
use crate::providers::db::DocumentStore;
use crate::run_dir::RunDir;
use crate::types::{ScrapedItem, TaskInfo, WriteupId, UNKNOWN_EVENT, UNKNOWN_TASK};
use async_trait::async_trait;
use chrono::Local;
use std::collections::HashSet;
use std::fmt::Debug;
use std::fs;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SourceError(pub String);

/// One row of the write-up listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub ctftime_id: WriteupId,
    /// Absolute URL of the summary page.
    pub summary_url: String,
}

/// What a summary page says about one write-up.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryDetails {
    pub event_name: Option<String>,
    pub task_name: Option<String>,
    pub original_url: Option<String>,
    pub embedded_html: Option<String>,
    pub tags: Vec<String>,
    pub rating: Option<f64>,
}

impl SummaryDetails {
    pub fn has_source(&self) -> bool {
        self.original_url.is_some() || self.embedded_html.is_some()
    }
}

/// The web collaborator of the scrape stage.
#[async_trait]
pub trait WriteupSource: Send + Sync + Debug {
    /// Rows of listing page `page` (1-based). `Ok(None)` when the page has no listing table.
    async fn listing_page(&self, page: usize) -> Result<Option<Vec<ListingRow>>, SourceError>;

    async fn summary(&self, summary_url: &str) -> Result<SummaryDetails, SourceError>;

    /// Raw body of an external write-up.
    async fn fetch_content(&self, url: &str) -> Result<String, SourceError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    pub discovered: usize,
    pub scraped: usize,
    pub failed: usize,
    pub manual_review: usize,
}

/// Ids already stored or permanently rejected.
///
/// A store that cannot be read is reported and treated as empty.
pub async fn collect_skip_ids(
    store: Option<&dyn DocumentStore>,
    ledger: &RejectionLedger,
) -> HashSet<WriteupId> {
    let stored = match store {
        Some(store) => match store.ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Could not read existing ids from the document store. Proceeding without them. Error: {e}");
                HashSet::new()
            }
        },
        None => HashSet::new(),
    };
    info!("Found {} existing IDs in the database.", stored.len());
    info!("Found {} rejected IDs in the log.", ledger.len());
    let skip: HashSet<WriteupId> = stored.union(ledger.ids()).copied().collect();
    info!("Total IDs to skip: {}", skip.len());
    skip
}

fn item_from_details(row: &ListingRow, details: SummaryDetails) -> ScrapedItem {
    ScrapedItem {
        task: TaskInfo {
            ctftime_id: row.ctftime_id,
            event_name: details
                .event_name
                .unwrap_or_else(|| UNKNOWN_EVENT.to_string()),
            task_name: details
                .task_name
                .unwrap_or_else(|| UNKNOWN_TASK.to_string()),
            original_url: details.original_url,
        },
        summary_url: row.summary_url.clone(),
        embedded_html: details.embedded_html,
        tags: details.tags,
        rating: details.rating,
    }
}

/// Walks the listing and collects every new write-up that has at least one source.
async fn discover(
    config: &PipelineConfig,
    source: &dyn WriteupSource,
    skip_ids: &HashSet<WriteupId>,
) -> SourceGrouper {
    let scraper = &config.scraper;
    let row_throttle = Throttle::from_millis(scraper.row_delay_ms, scraper.row_jitter_ms);
    let page_throttle = Throttle::from_millis(scraper.page_delay_ms, 0);
    let page_limit = scraper.page_limit();
    let writeup_limit = scraper.writeup_limit();

    let mut grouper = SourceGrouper::new();
    let mut found = 0usize;
    let mut page = 1usize;

    'pages: loop {
        if page_limit.is_some_and(|limit| page > limit) {
            info!("Reached page limit of {}. Stopping.", page - 1);
            break;
        }

        info!("--- Scraping Page {page} ---");
        let rows = match source.listing_page(page).await {
            Ok(Some(rows)) => rows,
            Ok(None) => {
                warn!("Could not find the write-ups table. Ending.");
                break;
            }
            Err(e) => {
                error!("Error fetching listing page {page}: {e}");
                break;
            }
        };
        if rows.is_empty() {
            info!("No more write-ups found on this page. Ending.");
            break;
        }

        for row in rows {
            if writeup_limit.is_some_and(|limit| found >= limit) {
                info!("Reached write-up limit of {found}. Stopping.");
                break 'pages;
            }
            row_throttle.wait().await;

            if skip_ids.contains(&row.ctftime_id) {
                debug!("ID {} is in skip list. Skipping.", row.ctftime_id);
                continue;
            }

            let details = match source.summary(&row.summary_url).await {
                Ok(details) => details,
                Err(e) => {
                    error!("Error fetching {}: {e}", row.summary_url);
                    continue;
                }
            };
            if !details.has_source() {
                warn!(
                    "Could not get details for ID {} (no sources found), skipping.",
                    row.ctftime_id
                );
                continue;
            }

            let item = item_from_details(&row, details);
            found += 1;
            info!(
                "Found writeup for ID {} ({}). Total found: {found}",
                item.task.ctftime_id, item.task.task_name
            );
            grouper.insert(item);
        }

        page += 1;
        page_throttle.wait().await;
    }

    info!(
        "--- Finished gathering tasks. Found {} unique source URLs. ---",
        grouper.len()
    );
    grouper
}

/// Fetches and saves the sources of one item. Returns whether anything was saved.
async fn persist_item(
    run: &RunDir,
    source: &dyn WriteupSource,
    item: &ScrapedItem,
) -> Result<bool, PipelineError> {
    let id = item.task.ctftime_id;
    let mut saved = Vec::new();

    if let Some(external_url) = item.task.original_url.as_deref() {
        match source.fetch_content(external_url).await {
            Ok(html) => {
                fs::write(run.primary_html(id), html)?;
                saved.push("external");
            }
            Err(e) => {
                warn!("Failed to fetch external content from {external_url} for ID {id}: {e}");
            }
        }
    }

    if let Some(embedded) = item.embedded_html.as_deref() {
        fs::write(run.summary_html(id), embedded)?;
        saved.push("embedded");
    }

    if saved.is_empty() {
        return Ok(false);
    }

    fs::write(run.meta_json(id), serde_json::to_string_pretty(&item.task)?)?;
    info!(
        "Successfully processed ID {id}. Saved {} content.",
        saved.join(" and ")
    );
    Ok(true)
}

/// Runs stage 1 into `run` and writes the run manifest.
#[instrument(skip_all, fields(run = %run.run_id()))]
pub async fn run_scrape_stage(
    run: &RunDir,
    config: &PipelineConfig,
    source: &dyn WriteupSource,
    store: Option<&dyn DocumentStore>,
) -> Result<ScrapeReport, PipelineError> {
    info!("--- Starting Step 1: Scraper ---");
    run.ensure_layout()?;
    let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let ledger = RejectionLedger::load(&config.paths.rejected_ids_log)?;
    let skip_ids = collect_skip_ids(store, &ledger).await;

    let grouper = discover(config, source, &skip_ids).await;
    let mut report = ScrapeReport {
        discovered: grouper.len(),
        ..ScrapeReport::default()
    };

    let partition = grouper.partition();
    if !partition.review.is_empty() {
        record_for_review(run.root(), &partition.review, &started_at)?;
    }
    report.manual_review = partition.review.len();
    info!("{} URLs will be processed.", partition.single.len());

    let mut manifest = RunManifest::new(run.run_id(), started_at);
    let fetch_throttle = Throttle::from_millis(config.scraper.fetch_delay_ms, 0);

    for (url, item) in partition.single {
        info!("Processing source: {url}");
        let ok = match persist_item(run, source, &item).await {
            Ok(ok) => ok,
            Err(e) => {
                error!(
                    "Failed to save content for ID {}: {e}",
                    item.task.ctftime_id
                );
                false
            }
        };
        if ok {
            report.scraped += 1;
        } else {
            warn!(
                "Failed to scrape any content for ID {} from source {url}.",
                item.task.ctftime_id
            );
            report.failed += 1;
        }
        manifest.record_scrape(url, vec![item.task], ok);
        fetch_throttle.wait().await;
    }

    let manifest_path = run.manifest_path();
    manifest.save(&manifest_path)?;
    info!(
        "--- Step 1: Scraper Finished. Manifest saved to {} ---",
        manifest_path.display()
    );
    Ok(report)
}
