//! # Intake Stage Tests
//!
//! Scraping against an in-memory write-up source, extraction with the quality
//! gate, and the runner halting on the first failed stage.

mod common;

use common::{long_text, scraped_run, setup_tracing, task, test_config};
use ctfrag::errors::PipelineError;
use ctfrag::grouping::MANUAL_REVIEW_BACKLOG;
use ctfrag::intake::{
    run_extraction_stage, run_scrape_stage, IntakeServices, ListingRow, PipelineRunner,
    ScrapeReport, Stage, SummaryDetails,
};
use ctfrag::ledger::RejectionLedger;
use ctfrag::manifest::{RunManifest, UrlState, UrlStatus};
use ctfrag::run_dir::RunDir;
use ctfrag::types::TaskInfo;
use ctfrag_test_utils::{MockWriteupSource, TagStrippingExtractor};
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn row(id: u64) -> ListingRow {
    ListingRow {
        ctftime_id: id,
        summary_url: format!("https://ctftime.org/writeup/{id}"),
    }
}

fn details(task_name: &str, original_url: Option<&str>, embedded: Option<&str>) -> SummaryDetails {
    SummaryDetails {
        event_name: Some("Example CTF 2025".to_string()),
        task_name: Some(task_name.to_string()),
        original_url: original_url.map(str::to_string),
        embedded_html: embedded.map(str::to_string),
        tags: vec!["pwn".to_string()],
        rating: Some(4.5),
    }
}

/// A listing exercising every scrape branch:
///
/// * 1: external write-up that downloads fine
/// * 2: embedded write-up only
/// * 3: already rejected
/// * 4, 5: two tasks sharing one blog post
/// * 6: summary page missing
/// * 7: no source at all
/// * 8: external write-up that fails to download
fn busy_source() -> MockWriteupSource {
    let source = MockWriteupSource::new();
    source
        .add_page((1..=5).map(row).collect())
        .add_page((6..=8).map(row).collect())
        .add_summary(
            "https://ctftime.org/writeup/1",
            details("heap", Some("https://blog.example/heap"), None),
        )
        .add_summary(
            "https://ctftime.org/writeup/2",
            details("rsa", None, Some("<p>embedded</p>")),
        )
        .add_summary(
            "https://ctftime.org/writeup/3",
            details("old", Some("https://blog.example/old"), None),
        )
        .add_summary(
            "https://ctftime.org/writeup/4",
            details("part1", Some("https://blog.example/combo"), None),
        )
        .add_summary(
            "https://ctftime.org/writeup/5",
            details("part2", Some("https://blog.example/combo#part2"), None),
        )
        .add_summary("https://ctftime.org/writeup/7", details("ghost", None, None))
        .add_summary(
            "https://ctftime.org/writeup/8",
            details("gone", Some("https://blog.example/gone"), None),
        )
        .add_content("https://blog.example/heap", "<html>heap</html>");
    source
}

#[tokio::test]
async fn test_scrape_groups_skips_and_persists() {
    // --- 1. Arrange ---
    setup_tracing();
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    fs::write(&config.paths.rejected_ids_log, "3\n").unwrap();
    let run = RunDir::new(dir.path().join("runs").join("r1"));
    let source = busy_source();

    // --- 2. Act ---
    let report = run_scrape_stage(&run, &config, &source, None).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(
        report,
        ScrapeReport {
            discovered: 4,
            scraped: 2,
            failed: 1,
            manual_review: 1,
        }
    );

    let manifest = RunManifest::load(&run.manifest_path()).unwrap();
    assert_eq!(manifest.run_id, "r1");
    let scraped: Vec<&String> = manifest
        .urls_with_status(UrlStatus::Scraped)
        .into_iter()
        .map(|(url, _)| url)
        .collect();
    assert_eq!(
        scraped,
        vec!["https://blog.example/heap", "https://ctftime.org/writeup/2"]
    );
    assert_eq!(
        manifest.failed_urls["https://blog.example/gone"].status(),
        UrlStatus::FailedScrape
    );
    assert!(!manifest.processed_urls.contains_key("https://blog.example/combo"));

    assert_eq!(fs::read_to_string(run.primary_html(1)).unwrap(), "<html>heap</html>");
    assert_eq!(fs::read_to_string(run.summary_html(2)).unwrap(), "<p>embedded</p>");
    let meta: TaskInfo =
        serde_json::from_str(&fs::read_to_string(run.meta_json(1)).unwrap()).unwrap();
    assert_eq!(meta, task(1, "Example CTF 2025", "heap", Some("https://blog.example/heap")));
    assert!(!run.meta_json(8).exists());
    assert!(!source.fetched().contains(&"https://blog.example/old".to_string()));

    let backlog: Value =
        serde_json::from_str(&fs::read_to_string(run.root().join(MANUAL_REVIEW_BACKLOG)).unwrap())
            .unwrap();
    let combo = &backlog["https://blog.example/combo"];
    assert_eq!(combo["status"], "pending_review");
    assert_eq!(combo["tasks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_scrape_write_error_marks_item_failed_and_keeps_manifest() {
    // --- 1. Arrange ---
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let run = RunDir::new(dir.path().join("runs").join("r1"));
    run.ensure_layout().unwrap();
    fs::create_dir_all(run.primary_html(1)).unwrap();
    let source = busy_source();

    // --- 2. Act ---
    let report = run_scrape_stage(&run, &config, &source, None).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(report.scraped, 1);
    assert_eq!(report.failed, 3);
    let manifest = RunManifest::load(&run.manifest_path()).unwrap();
    assert_eq!(
        manifest.failed_urls["https://blog.example/heap"].status(),
        UrlStatus::FailedScrape
    );
    assert_eq!(
        manifest.processed_urls["https://ctftime.org/writeup/2"].status(),
        UrlStatus::Scraped
    );
    assert!(!run.meta_json(1).exists());
}

#[tokio::test]
async fn test_scrape_respects_writeup_limit() {
    // --- 1. Arrange ---
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.scraper.max_writeups = 1;
    let run = RunDir::new(dir.path().join("runs").join("r1"));
    let source = busy_source();

    // --- 2. Act ---
    let report = run_scrape_stage(&run, &config, &source, None).await.unwrap();

    // --- 3. Assert ---
    assert_eq!(report.discovered, 1);
    assert_eq!(source.fetched(), vec!["https://blog.example/heap".to_string()]);
}

#[tokio::test]
async fn test_extract_applies_quality_gate_per_source() {
    // --- 1. Arrange ---
    setup_tracing();
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let good = format!("<article>{}</article>", long_text("overflow", 400));
    let short = "<p>see attached</p>";
    let run = scraped_run(
        dir.path(),
        &[
            ("https://a.example", task(10, "E", "good", None), Some(good.as_str()), None),
            ("https://b.example", task(11, "E", "short", None), Some(short), Some(short)),
            ("https://c.example", task(12, "E", "broken", None), Some("<!-- broken -->"), None),
            ("https://d.example", task(13, "E", "summary", None), Some(short), Some(good.as_str())),
        ],
    );

    // --- 2. Act ---
    let report = run_extraction_stage(&run, &config, &TagStrippingExtractor)
        .await
        .unwrap();

    // --- 3. Assert ---
    assert_eq!((report.cleaned, report.rejected, report.failed), (2, 1, 1));
    let manifest = RunManifest::load(&run.manifest_path()).unwrap();
    assert_eq!(
        manifest.processed_urls["https://a.example"].state,
        UrlState::Cleaned {
            cleaned_text_path: Some("processed_trafilatura/10.txt".into()),
            cleaned_summary_path: None,
        }
    );
    assert_eq!(
        manifest.processed_urls["https://b.example"].status(),
        UrlStatus::RejectedLowQuality
    );
    assert_eq!(
        manifest.processed_urls["https://c.example"].status(),
        UrlStatus::FailedCleaning
    );
    assert_eq!(
        manifest.processed_urls["https://d.example"].state,
        UrlState::Cleaned {
            cleaned_text_path: None,
            cleaned_summary_path: Some("processed_trafilatura/13.summary.txt".into()),
        }
    );

    let cleaned = fs::read_to_string(run.cleaned_dir().join("10.txt")).unwrap();
    assert!(cleaned.starts_with("overflow"));
    assert!(!run.cleaned_dir().join("13.txt").exists());

    let ledger = RejectionLedger::load(&config.paths.rejected_ids_log).unwrap();
    assert!(ledger.contains(11));
    assert!(!ledger.contains(12));
}

#[tokio::test]
async fn test_extract_without_pending_urls_is_a_no_op() {
    // --- 1. Arrange ---
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let run = scraped_run(dir.path(), &[]);

    // --- 2. Act ---
    let report = run_extraction_stage(&run, &config, &TagStrippingExtractor)
        .await
        .unwrap();

    // --- 3. Assert ---
    assert_eq!(report.cleaned + report.rejected + report.failed, 0);
    assert!(!config.paths.rejected_ids_log.exists());
}

#[tokio::test]
async fn test_runner_halts_at_the_first_failing_stage() {
    // --- 1. Arrange ---
    setup_tracing();
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let heap = format!("<div>{}</div>", long_text("tcache", 400));
    let source = MockWriteupSource::new();
    source
        .add_page(vec![row(1)])
        .add_summary(
            "https://ctftime.org/writeup/1",
            details("heap", Some("https://blog.example/heap"), None),
        )
        .add_content("https://blog.example/heap", &heap);
    let services = IntakeServices {
        source: Box::new(source),
        extractor: Box::new(TagStrippingExtractor),
        batch: None,
        store: None,
    };
    let runner = PipelineRunner::new(&config, services);
    let run = RunDir::new(dir.path().join("runs").join("r1"));

    // --- 2. Act ---
    let result = runner.run_all(&run).await;

    // --- 3. Assert ---
    assert!(matches!(result, Err(PipelineError::MissingPrerequisite(_))));
    let manifest = RunManifest::load(&run.manifest_path()).unwrap();
    assert_eq!(manifest.count(UrlStatus::Cleaned), 1);
    assert!(fs::read_dir(run.ai_processed_dir()).unwrap().next().is_none());

    let store_only = runner.run_stage(Stage::Store, &run).await;
    assert!(matches!(store_only, Err(PipelineError::MissingPrerequisite(_))));
}
