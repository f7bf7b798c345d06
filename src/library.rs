//! Library view: query engine and library context.
//!
//! [`run_query`] turns the current record list and a [`LibraryQuery`] into the
//! visible page: filter (search text + file type), sort (date or name), then
//! paginate. [`LibraryContext`] is the library view's state. It keeps a
//! [`CatalogSync`] running so records written by another context show up
//! within one poll period, and it performs the one write the library view
//! makes: removing a record.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::catalog::{Catalog, SqliteStorage};
use crate::config::{Config, LibraryConfig};
use crate::models::DocumentRecord;
use crate::sync::CatalogSync;

/// Sort order of the library listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Most recently uploaded first.
    #[default]
    Date,
    /// Filename, ascending.
    Name,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" => Ok(SortKey::Date),
            "name" => Ok(SortKey::Name),
            other => Err(format!("unknown sort key '{}': use date or name", other)),
        }
    }
}

/// File type filter: everything, or one filename extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileTypeFilter {
    #[default]
    All,
    /// Lowercased extension without the leading dot.
    Extension(String),
}

impl FileTypeFilter {
    /// Parses `"All Types"`, `"all"`, `""`, or an extension such as `".PDF"`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("all types") {
            FileTypeFilter::All
        } else {
            FileTypeFilter::Extension(s.trim_start_matches('.').to_lowercase())
        }
    }

    pub fn matches(&self, record: &DocumentRecord) -> bool {
        match self {
            FileTypeFilter::All => true,
            FileTypeFilter::Extension(ext) => record.extension().as_deref() == Some(ext.as_str()),
        }
    }
}

impl std::fmt::Display for FileTypeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileTypeFilter::All => f.write_str("All Types"),
            FileTypeFilter::Extension(ext) => write!(f, ".{}", ext),
        }
    }
}

/// Ephemeral query state of the library view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryQuery {
    pub search: String,
    pub file_type: FileTypeFilter,
    pub sort: SortKey,
    /// 1-based page number; out-of-range values are clamped.
    pub page: usize,
}

/// One rendered page of the library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryPage {
    pub items: Vec<DocumentRecord>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    /// Records passing the filters.
    pub matched: usize,
    /// Records in local state.
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl LibraryPage {
    pub fn next_page(&self) -> Option<usize> {
        self.has_next.then(|| self.page + 1)
    }

    pub fn previous_page(&self) -> Option<usize> {
        self.has_previous.then(|| self.page - 1)
    }
}

/// Case-insensitive match of `needle` (already lowercased) against the
/// record's name, title, or any tag. An empty needle matches everything.
fn matches_search(record: &DocumentRecord, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    record.name.to_lowercase().contains(needle)
        || record
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(needle))
        || record
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

/// Filters, sorts, and paginates `records`.
pub fn run_query(records: &[DocumentRecord], query: &LibraryQuery, page_size: usize) -> LibraryPage {
    let page_size = page_size.max(1);
    let needle = query.search.trim().to_lowercase();

    let mut matched: Vec<&DocumentRecord> = records
        .iter()
        .filter(|r| matches_search(r, &needle) && query.file_type.matches(r))
        .collect();

    match query.sort {
        SortKey::Date => matched.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at)),
        SortKey::Name => matched.sort_by(|a, b| a.name.cmp(&b.name)),
    }

    let total_pages = matched.len().div_ceil(page_size);
    let page = query.page.clamp(1, total_pages.max(1));
    let items = matched
        .iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|r| (*r).clone())
        .collect();

    LibraryPage {
        items,
        page,
        page_size,
        total_pages,
        matched: matched.len(),
        total: records.len(),
        has_previous: page > 1,
        has_next: page < total_pages,
    }
}

/// The library view's state.
pub struct LibraryContext {
    sync: CatalogSync,
    page_size: usize,
}

impl LibraryContext {
    /// Mounts the library view: one immediate catalog read, then polling.
    pub async fn mount(catalog: Catalog, config: &LibraryConfig) -> Self {
        let sync = CatalogSync::mount(catalog, config.poll_period()).await;
        Self {
            sync,
            page_size: config.page_size,
        }
    }

    pub fn records(&self) -> Vec<DocumentRecord> {
        self.sync.snapshot()
    }

    /// Receiver woken whenever local state changes (poll or removal).
    pub fn subscribe(&self) -> watch::Receiver<Vec<DocumentRecord>> {
        self.sync.subscribe()
    }

    pub fn query(&self, query: &LibraryQuery) -> LibraryPage {
        run_query(&self.sync.snapshot(), query, self.page_size)
    }

    /// Removes a record from the catalog, then from local state.
    ///
    /// Returns `false` (and writes nothing) if `id` is unknown. When the
    /// write fails the record stays visible and the error is returned.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let removed = self
            .sync
            .commit(|records| {
                let before = records.len();
                records.retain(|r| r.id != id);
                records.len() != before
            })
            .await?;
        if removed {
            tracing::info!(id, "record removed");
        }
        Ok(removed)
    }

    /// Stops polling.
    pub fn unmount(&self) {
        self.sync.stop();
    }
}

async fn open_catalog(config: &Config) -> Result<(Arc<SqliteStorage>, Catalog)> {
    let storage = Arc::new(SqliteStorage::open(config).await?);
    let catalog = Catalog::new(storage.clone(), config.catalog.key.clone());
    Ok((storage, catalog))
}

fn print_page(page: &LibraryPage, query: &LibraryQuery) {
    println!(
        "{} documents stored  |  showing {} of {}  |  {}  |  sort: {:?}",
        page.total, page.matched, page.total, query.file_type, query.sort
    );
    if page.items.is_empty() {
        println!("No documents.");
        return;
    }
    println!(
        "{:<36}  {:<32}  {:>9}  {:>5}  {:>4}  {:<10}  TAGS",
        "ID", "TITLE", "SIZE", "PAGES", "PCT", "STATUS"
    );
    for r in &page.items {
        println!(
            "{:<36}  {:<32}  {:>9}  {:>5}  {:>3}%  {:<10}  {}",
            r.id,
            truncate(r.display_title(), 32),
            r.size_label,
            r.pages,
            r.progress,
            r.status,
            r.tags.join(", ")
        );
    }
    println!(
        "page {} of {}{}{}",
        page.page,
        page.total_pages.max(1),
        if page.has_previous { "  [prev]" } else { "" },
        if page.has_next { "  [next]" } else { "" }
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// CLI entry point for `desk library`.
///
/// With `watch`, keeps polling the catalog and re-renders on every change
/// until interrupted.
pub async fn run_library(config: &Config, query: &LibraryQuery, watch: bool) -> Result<()> {
    let (storage, catalog) = open_catalog(config).await?;
    let ctx = LibraryContext::mount(catalog, &config.library).await;
    print_page(&ctx.query(query), query);

    if watch {
        let mut rx = ctx.subscribe();
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!();
                    print_page(&ctx.query(query), query);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }
    }

    ctx.unmount();
    storage.close().await;
    Ok(())
}

/// CLI entry point for `desk remove`.
pub async fn run_remove(config: &Config, id: &str) -> Result<()> {
    let (storage, catalog) = open_catalog(config).await?;
    let ctx = LibraryContext::mount(catalog, &config.library).await;
    let removed = ctx.remove(id).await?;
    ctx.unmount();
    storage.close().await;

    if !removed {
        bail!("document not found: {}", id);
    }
    println!("removed {}", id);
    Ok(())
}

/// CLI entry point for `desk reset`: deletes the catalog key.
pub async fn run_reset(config: &Config) -> Result<()> {
    let (storage, catalog) = open_catalog(config).await?;
    catalog.clear().await?;
    storage.close().await;
    println!(
        "catalog '{}' cleared in {}",
        catalog.key(),
        config.catalog.path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryStorage, Storage};
    use crate::models::RecordStatus;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;
    use chrono::{Duration, TimeZone, Utc};

    fn record(id: &str, name: &str, tags: &[&str], minutes: i64) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            name: name.to_string(),
            title: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            size_label: "1.0 MB".to_string(),
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            pages: 10,
            progress: 100,
            status: RecordStatus::Completed,
        }
    }

    fn names(page: &LibraryPage) -> Vec<&str> {
        page.items.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn search_matches_tags() {
        let records = vec![
            record("1", "A.pdf", &["x"], 0),
            record("2", "B.txt", &[], 1),
        ];
        let q = LibraryQuery {
            search: "x".to_string(),
            ..Default::default()
        };
        let page = run_query(&records, &q, 10);
        assert_eq!(names(&page), vec!["A.pdf"]);
        assert_eq!(page.matched, 1);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn search_is_case_insensitive_over_name_title_and_tags() {
        let mut titled = record("3", "scan_001.pdf", &[], 2);
        titled.title = Some("Neural Networks Guide".to_string());
        let records = vec![
            record("1", "Deep_Learning.PDF", &[], 0),
            record("2", "notes.md", &["Deep-Dive"], 1),
            titled,
            record("4", "other.txt", &[], 3),
        ];

        let q = LibraryQuery {
            search: "  DEEP ".to_string(),
            sort: SortKey::Name,
            ..Default::default()
        };
        assert_eq!(
            names(&run_query(&records, &q, 10)),
            vec!["Deep_Learning.PDF", "notes.md"]
        );

        let q = LibraryQuery {
            search: "neural".to_string(),
            ..Default::default()
        };
        assert_eq!(names(&run_query(&records, &q, 10)), vec!["scan_001.pdf"]);
    }

    #[test]
    fn file_type_filter() {
        let records = vec![
            record("1", "a.PDF", &[], 0),
            record("2", "b.txt", &[], 1),
            record("3", "c.pdf", &[], 2),
            record("4", "README", &[], 3),
        ];
        let q = LibraryQuery {
            file_type: FileTypeFilter::parse(".pdf"),
            sort: SortKey::Name,
            ..Default::default()
        };
        assert_eq!(names(&run_query(&records, &q, 10)), vec!["a.PDF", "c.pdf"]);

        assert_eq!(FileTypeFilter::parse("All Types"), FileTypeFilter::All);
        assert_eq!(FileTypeFilter::parse(""), FileTypeFilter::All);
        assert_eq!(FileTypeFilter::parse("Pdf").to_string(), ".pdf");

        let all = LibraryQuery::default();
        assert_eq!(run_query(&records, &all, 10).matched, 4);
    }

    #[test]
    fn sorts_by_date_desc_and_name_asc() {
        let records = vec![
            record("1", "b.pdf", &[], 5),
            record("2", "c.pdf", &[], 10),
            record("3", "a.pdf", &[], 0),
        ];
        let by_date = run_query(&records, &LibraryQuery::default(), 10);
        assert_eq!(names(&by_date), vec!["c.pdf", "b.pdf", "a.pdf"]);

        let q = LibraryQuery {
            sort: SortKey::Name,
            ..Default::default()
        };
        assert_eq!(names(&run_query(&records, &q, 10)), vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[test]
    fn paginates_25_records_into_3_pages() {
        let records: Vec<DocumentRecord> = (0..25)
            .map(|i| record(&i.to_string(), &format!("doc{:02}.pdf", i), &[], i))
            .collect();
        let q = LibraryQuery {
            page: 3,
            ..Default::default()
        };
        let page = run_query(&records, &q, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
        assert!(page.has_previous);
        assert!(!page.has_next);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.previous_page(), Some(2));
        // newest first: page 3 holds the five oldest
        assert_eq!(page.items[4].name, "doc00.pdf");

        let first = run_query(&records, &LibraryQuery::default(), 10);
        assert_eq!(first.page, 1);
        assert!(!first.has_previous);
        assert_eq!(first.next_page(), Some(2));
    }

    #[test]
    fn out_of_range_pages_are_clamped() {
        let records: Vec<DocumentRecord> = (0..12)
            .map(|i| record(&i.to_string(), &format!("d{}.md", i), &[], i))
            .collect();
        let q = LibraryQuery {
            page: 99,
            ..Default::default()
        };
        let page = run_query(&records, &q, 10);
        assert_eq!(page.page, 2);
        assert_eq!(page.items.len(), 2);

        let empty = run_query(&[], &q, 10);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_previous && !empty.has_next);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!("Name".parse::<SortKey>(), Ok(SortKey::Name));
        assert_eq!("date".parse::<SortKey>(), Ok(SortKey::Date));
        assert!("size".parse::<SortKey>().is_err());
    }

    /// Memory storage whose writes can be switched off.
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Storage for FlakyStorage {
        async fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key).await
        }
        async fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                bail!("disk full");
            }
            self.inner.set_item(key, value).await
        }
        async fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_remove_keeps_record_visible() {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            fail_writes: AtomicBool::new(false),
        });
        let catalog = Catalog::new(storage.clone(), "uploadedFiles");
        catalog
            .save(&[record("1", "a.pdf", &[], 0), record("2", "b.pdf", &[], 1)])
            .await
            .unwrap();
        let ctx = LibraryContext::mount(catalog.clone(), &LibraryConfig::default()).await;

        storage.fail_writes.store(true, Ordering::SeqCst);
        assert!(ctx.remove("1").await.is_err());
        assert_eq!(ctx.records().len(), 2);
        assert_eq!(catalog.load().await.len(), 2);

        storage.fail_writes.store(false, Ordering::SeqCst);
        let mut rx = ctx.subscribe();
        assert!(ctx.remove("1").await.unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(ctx.records().len(), 1);
        assert!(catalog.load().await.iter().all(|r| r.id != "1"));

        // polls after the write agree with local state
        tokio::time::sleep(StdDuration::from_secs(2)).await;
        assert_eq!(ctx.records().len(), 1);
        assert!(!ctx.remove("1").await.unwrap());
    }

    #[test]
    fn truncates_long_titles() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5), "abcd…");
    }
}
