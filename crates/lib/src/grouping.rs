//! # Source Grouping
//!
//! Several CTFtime tasks often point at the same external write-up. Items are
//! grouped by canonical source URL; only groups with exactly one item are
//! processed automatically. Larger groups go to the manual-review log and the
//! `manual_review.json` backlog and never enter the run manifest.

use crate::types::{ScrapedItem, TaskInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

pub const MANUAL_REVIEW_LOG: &str = "manual_review.log";
pub const MANUAL_REVIEW_BACKLOG: &str = "manual_review.json";

/// Strips the fragment from a URL.
///
/// Absolute URLs are normalized by `url`; anything it cannot parse is cut at
/// the first `#`.
pub fn canonical_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(_) => raw.split_once('#').map_or(raw, |(base, _)| base).to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceGroup {
    pub url: String,
    pub items: Vec<ScrapedItem>,
}

/// Collects scraped items in discovery order, keyed by canonical URL.
#[derive(Debug, Default)]
pub struct SourceGrouper {
    groups: Vec<SourceGroup>,
    index: HashMap<String, usize>,
}

/// The result of [`SourceGrouper::partition`].
#[derive(Debug, Default)]
pub struct GroupPartition {
    /// Groups holding exactly one item, forwarded to the manifest.
    pub single: Vec<(String, ScrapedItem)>,
    /// Groups needing a human decision.
    pub review: Vec<SourceGroup>,
}

impl SourceGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: ScrapedItem) {
        let key = canonical_url(item.source_url());
        match self.index.get(&key) {
            Some(&pos) => self.groups[pos].items.push(item),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push(SourceGroup {
                    url: key,
                    items: vec![item],
                });
            }
        }
    }

    /// The number of distinct source URLs seen so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn partition(self) -> GroupPartition {
        let mut partition = GroupPartition::default();
        for mut group in self.groups {
            if group.items.len() == 1 {
                if let Some(item) = group.items.pop() {
                    partition.single.push((group.url, item));
                }
            } else {
                warn!(
                    "URL '{}' has {} tasks. Logging for manual review and skipping.",
                    group.url,
                    group.items.len()
                );
                partition.review.push(group);
            }
        }
        partition
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReviewEntry {
    pub status: ReviewStatus,
    pub tasks: Vec<TaskInfo>,
}

/// Machine-readable backlog of groups awaiting a human decision.
pub type ReviewBacklog = BTreeMap<String, ReviewEntry>;

/// Appends the groups to `manual_review.log` and merges them into `manual_review.json`.
///
/// The log header is only written when the log file is new.
pub fn record_for_review(
    run_dir: &Path,
    groups: &[SourceGroup],
    started_at: &str,
) -> std::io::Result<()> {
    let log_path = run_dir.join(MANUAL_REVIEW_LOG);
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    if log.metadata()?.len() == 0 {
        writeln!(log, "--- Log for run starting at {started_at} ---\n")?;
    }
    for group in groups {
        log.write_all(render_review_entry(group).as_bytes())?;
    }

    let backlog_path = run_dir.join(MANUAL_REVIEW_BACKLOG);
    let mut backlog = load_backlog(&backlog_path)?;
    for group in groups {
        backlog.insert(
            group.url.clone(),
            ReviewEntry {
                status: ReviewStatus::PendingReview,
                tasks: group.items.iter().map(|i| i.task.clone()).collect(),
            },
        );
    }
    fs::write(&backlog_path, serde_json::to_string_pretty(&backlog)?)?;

    info!(
        "Filtered out {} URLs for manual review. See '{}'.",
        groups.len(),
        log_path.display()
    );
    Ok(())
}

/// Reads the backlog. An unreadable backlog is moved to `manual_review.json.bak`
/// so pending decisions are never overwritten.
fn load_backlog(path: &Path) -> std::io::Result<ReviewBacklog> {
    if !path.exists() {
        return Ok(ReviewBacklog::new());
    }
    match serde_json::from_str(&fs::read_to_string(path)?) {
        Ok(backlog) => Ok(backlog),
        Err(e) => {
            let aside = path.with_extension("json.bak");
            warn!(
                "Could not parse '{}' ({e}). Moving it to '{}' and starting a new backlog.",
                path.display(),
                aside.display()
            );
            fs::rename(path, &aside)?;
            Ok(ReviewBacklog::new())
        }
    }
}

fn render_review_entry(group: &SourceGroup) -> String {
    let mut out = format!("URL: {}\n", group.url);
    for item in &group.items {
        out.push_str(&format!(
            "  - ID: {}, Task: '{}', Original URL: {}\n",
            item.task.ctftime_id,
            item.task.task_name,
            item.task.original_url.as_deref().unwrap_or("None")
        ));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(id: u64, original: Option<&str>) -> ScrapedItem {
        ScrapedItem {
            task: TaskInfo {
                ctftime_id: id,
                event_name: "Event".into(),
                task_name: format!("task-{id}"),
                original_url: original.map(String::from),
            },
            summary_url: format!("https://ctftime.org/writeup/{id}"),
            embedded_html: None,
            tags: vec![],
            rating: None,
        }
    }

    #[test]
    fn canonical_url_strips_only_the_fragment() {
        assert_eq!(
            canonical_url("https://blog.example/p?x=1#part-2"),
            "https://blog.example/p?x=1"
        );
        assert_eq!(canonical_url("https://blog.example/p"), "https://blog.example/p");
        assert_eq!(canonical_url("  https://Blog.Example/p#x "), "https://blog.example/p");
        assert_eq!(canonical_url("not a url#frag"), "not a url");
    }

    #[test]
    fn unreadable_backlog_is_moved_aside_not_overwritten() {
        let dir = tempdir().unwrap();
        let backlog_path = dir.path().join(MANUAL_REVIEW_BACKLOG);
        let truncated = r#"{"https://old.example/a": {"status": "pending_review", "tasks": []},"#;
        fs::write(&backlog_path, truncated).unwrap();
        let group = SourceGroup {
            url: "https://new.example/b".into(),
            items: vec![item(4, None), item(5, None)],
        };

        record_for_review(dir.path(), &[group], "2025-01-01 00:00:00").unwrap();

        let kept = fs::read_to_string(dir.path().join("manual_review.json.bak")).unwrap();
        assert_eq!(kept, truncated);
        assert!(kept.contains("https://old.example/a"));
        let backlog: ReviewBacklog =
            serde_json::from_str(&fs::read_to_string(&backlog_path).unwrap()).unwrap();
        assert_eq!(backlog.keys().collect::<Vec<_>>(), vec!["https://new.example/b"]);
    }

    #[test]
    fn fragments_collapse_into_one_group_for_review() {
        let mut grouper = SourceGrouper::new();
        grouper.insert(item(1, Some("https://blog.example/ctf#pwn")));
        grouper.insert(item(2, Some("https://blog.example/ctf#web")));
        grouper.insert(item(3, None));

        let partition = grouper.partition();

        assert_eq!(partition.single.len(), 1);
        assert_eq!(partition.single[0].0, "https://ctftime.org/writeup/3");
        assert_eq!(partition.review.len(), 1);
        assert_eq!(partition.review[0].url, "https://blog.example/ctf");
        let ids: Vec<u64> = partition.review[0]
            .items
            .iter()
            .map(|i| i.task.ctftime_id)
            .collect();
        assert_eq!(ids, vec![1, 2], "discovery order is preserved");
    }

    #[test]
    fn review_log_has_header_once_and_backlog_is_written() {
        let dir = tempdir().unwrap();
        let group = SourceGroup {
            url: "https://blog.example/ctf".into(),
            items: vec![item(1, Some("https://blog.example/ctf#a")), item(2, None)],
        };

        record_for_review(dir.path(), std::slice::from_ref(&group), "2025-01-01 00:00:00")
            .unwrap();
        record_for_review(dir.path(), &[group], "2025-01-02 00:00:00").unwrap();

        let log = fs::read_to_string(dir.path().join(MANUAL_REVIEW_LOG)).unwrap();
        assert_eq!(log.matches("--- Log for run starting at").count(), 1);
        assert!(log.contains("URL: https://blog.example/ctf\n"));
        assert!(log.contains(
            "  - ID: 1, Task: 'task-1', Original URL: https://blog.example/ctf#a\n"
        ));
        assert!(log.contains("  - ID: 2, Task: 'task-2', Original URL: None\n"));

        let backlog: ReviewBacklog = serde_json::from_str(
            &fs::read_to_string(dir.path().join(MANUAL_REVIEW_BACKLOG)).unwrap(),
        )
        .unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog["https://blog.example/ctf"].tasks.len(), 2);
        assert_eq!(
            backlog["https://blog.example/ctf"].status,
            ReviewStatus::PendingReview
        );
    }
}
