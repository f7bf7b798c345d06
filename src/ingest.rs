//! Upload context and ingestion queue.
//!
//! [`UploadContext`] is the upload view's state: it runs submitted files
//! through the validation gate, creates records, drives each record through
//! `uploading → processing → completed` with its own ticker, and writes the
//! full record list back to the shared catalog after every change so other
//! contexts can watch partial progress.
//!
//! Before every write the context re-reads the catalog, so a record another
//! context deleted stays deleted once this context has stopped ticking it.
//!
//! Each record's ticker is an independent task consuming the progress stream
//! of an [`IngestionBackend`]. Tickers never wait on each other; cancelling
//! or finishing one leaves the others untouched. All writes from one context
//! go through a single async mutex, so they reach the catalog in tick order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::backend::{IngestionBackend, TimerBackend};
use crate::catalog::{Catalog, SqliteStorage};
use crate::config::{Config, IngestConfig};
use crate::models::{DocumentRecord, FileDescriptor, RecordStatus};
use crate::notify::{Notification, Notifier, NotifyMode};
use crate::validate::{validate_batch, UploadForm, ValidatedBatch};

/// Outcome of applying one progress update to the local list.
enum Step {
    Advanced(RecordStatus),
    Ignored,
    Missing,
}

struct Inner {
    catalog: Catalog,
    backend: Arc<dyn IngestionBackend>,
    notifier: Arc<dyn Notifier>,
    config: IngestConfig,
    records: tokio::sync::Mutex<Vec<DocumentRecord>>,
    tickers: Mutex<HashMap<String, JoinHandle<()>>>,
    idle: Notify,
}

impl Inner {
    async fn apply_progress(&self, id: &str, progress: u8) -> Step {
        let mut records = self.records.lock().await;
        self.reconcile(&mut records).await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Step::Missing;
        };
        if !record.advance(progress) {
            return Step::Ignored;
        }
        let status = record.status;
        tracing::debug!(id, progress, %status, "record advanced");

        self.persist(&records).await;
        Step::Advanced(status)
    }

    /// Folds the catalog's current list into local state.
    ///
    /// The catalog is the base. Records this context is still ticking
    /// overlay it by id and are kept even when missing from it. Settled
    /// local records that another context deleted are dropped. An
    /// unreadable catalog leaves local state untouched.
    async fn reconcile(&self, records: &mut Vec<DocumentRecord>) {
        let stored = match self.catalog.try_load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "keeping local upload records");
                return;
            }
        };
        let in_flight: HashSet<String> = self
            .tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        let mut ticking: Vec<DocumentRecord> = records
            .drain(..)
            .filter(|r| in_flight.contains(&r.id))
            .collect();
        let mut merged = Vec::with_capacity(stored.len() + ticking.len());
        for mut record in stored {
            match ticking.iter().position(|r| r.id == record.id) {
                Some(pos) => merged.push(ticking.remove(pos)),
                None => {
                    record.normalize();
                    merged.push(record);
                }
            }
        }
        merged.extend(ticking);
        *records = merged;
    }

    async fn persist(&self, records: &[DocumentRecord]) {
        if let Err(e) = self.catalog.save(records).await {
            tracing::warn!(error = %e, "failed to write catalog");
        }
    }

    fn finish(&self, id: &str) {
        let mut tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        tickers.remove(id);
        if tickers.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// The upload view's ingestion state.
///
/// Dropping the context (or calling [`unmount`](UploadContext::unmount))
/// stops every ticker, so an unmounted view never writes again.
pub struct UploadContext {
    inner: Arc<Inner>,
}

impl UploadContext {
    /// Mounts the upload view.
    ///
    /// Reads the catalog once and adopts its records. Records that were
    /// still in flight when they were last written are resumed from their
    /// stored progress.
    pub async fn mount(
        catalog: Catalog,
        backend: Arc<dyn IngestionBackend>,
        notifier: Arc<dyn Notifier>,
        config: IngestConfig,
    ) -> Self {
        let mut records = catalog.load().await;
        for record in &mut records {
            record.normalize();
        }
        let unfinished: Vec<DocumentRecord> = records
            .iter()
            .filter(|r| !r.is_completed())
            .cloned()
            .collect();
        tracing::info!(
            records = records.len(),
            resumed = unfinished.len(),
            "upload context mounted"
        );

        let ctx = Self {
            inner: Arc::new(Inner {
                catalog,
                backend,
                notifier,
                config,
                records: tokio::sync::Mutex::new(records),
                tickers: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        };
        for record in &unfinished {
            ctx.spawn_ticker(record);
        }
        ctx
    }

    /// Validates a batch, records the accepted files, and starts their tickers.
    ///
    /// Rejected files are reported through the notifier and never reach the
    /// catalog. The form is cleared when at least one file was accepted.
    pub async fn submit(&self, files: &[FileDescriptor], form: &mut UploadForm) -> ValidatedBatch {
        let batch = validate_batch(files, form, &self.inner.config);

        for rejection in &batch.rejected {
            tracing::info!(name = %rejection.name, code = rejection.code, "file rejected");
            self.inner.notifier.notify(Notification::Rejected {
                name: rejection.name.clone(),
                message: rejection.message.clone(),
            });
        }

        if batch.accepted.is_empty() {
            return batch;
        }

        {
            let mut records = self.inner.records.lock().await;
            self.inner.reconcile(&mut records).await;
            records.extend(batch.accepted.iter().cloned());
            self.inner.persist(&records).await;
        }

        for record in &batch.accepted {
            self.spawn_ticker(record);
        }
        batch
    }

    fn spawn_ticker(&self, record: &DocumentRecord) {
        let mut updates = self.inner.backend.submit(record);
        let inner = Arc::clone(&self.inner);
        let id = record.id.clone();
        let name = record.name.clone();

        // The map is locked across spawn so the task cannot finish before
        // its handle is registered.
        let mut tickers = self
            .inner
            .tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            while let Some(progress) = updates.recv().await {
                match inner.apply_progress(&task_id, progress).await {
                    Step::Advanced(RecordStatus::Completed) => {
                        tracing::info!(id = %task_id, name = %name, "upload completed");
                        inner.notifier.notify(Notification::UploadSucceeded {
                            id: task_id.clone(),
                            name: name.clone(),
                        });
                        break;
                    }
                    Step::Advanced(_) | Step::Ignored => {}
                    Step::Missing => break,
                }
            }
            inner.finish(&task_id);
        });
        if let Some(previous) = tickers.insert(id, handle) {
            previous.abort();
        }
    }

    /// Snapshot of the context's local record list, refreshed from the
    /// catalog first.
    pub async fn records(&self) -> Vec<DocumentRecord> {
        let mut records = self.inner.records.lock().await;
        self.inner.reconcile(&mut records).await;
        records.clone()
    }

    /// Number of records whose ticker is still running.
    pub fn in_flight(&self) -> usize {
        self.inner
            .tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops the ticker for one record. Returns `false` if none was running.
    ///
    /// The record keeps whatever progress it had reached.
    pub fn cancel(&self, id: &str) -> bool {
        let mut tickers = self
            .inner
            .tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = tickers.remove(id) else {
            return false;
        };
        handle.abort();
        if tickers.is_empty() {
            self.inner.idle.notify_waiters();
        }
        true
    }

    /// Stops every ticker.
    pub fn unmount(&self) {
        let mut tickers = self
            .inner
            .tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in tickers.drain() {
            handle.abort();
        }
        self.inner.idle.notify_waiters();
    }

    /// Waits until no ticker is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for UploadContext {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Expands paths into file descriptors; directories are walked recursively.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<FileDescriptor>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(describe(entry.path())?);
                }
            }
        } else {
            files.push(describe(path)?);
        }
    }
    Ok(files)
}

fn describe(path: &Path) -> Result<FileDescriptor> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    Ok(FileDescriptor::new(name, meta.len()))
}

/// CLI entry point for `desk upload`.
///
/// Mounts an upload context against the configured catalog, submits the
/// files, and waits until every record (including resumed ones) completes.
pub async fn run_upload(
    config: &Config,
    paths: &[PathBuf],
    title: Option<String>,
    tags: Option<String>,
    mode: NotifyMode,
) -> Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        bail!("No files to upload");
    }

    let storage = Arc::new(SqliteStorage::open(config).await?);
    let catalog = Catalog::new(storage.clone(), config.catalog.key.clone());
    let ctx = UploadContext::mount(
        catalog,
        Arc::new(TimerBackend::from_config(&config.ingest)),
        Arc::from(mode.notifier()),
        config.ingest.clone(),
    )
    .await;

    let mut form = UploadForm::new(title.unwrap_or_default(), tags.unwrap_or_default());
    let batch = ctx.submit(&files, &mut form).await;

    for record in &batch.accepted {
        println!("queued {}  {}  {}", record.id, record.name, record.size_label);
    }
    for rejection in &batch.rejected {
        println!("rejected {}", rejection.message);
    }

    ctx.wait_idle().await;

    let records = ctx.records().await;
    let completed = records.iter().filter(|r| r.is_completed()).count();

    println!("upload");
    println!("  accepted: {}", batch.accepted.len());
    println!("  rejected: {}", batch.rejected.len());
    println!("  catalog records: {}", records.len());
    println!("  completed: {}", completed);
    println!("ok");

    drop(ctx);
    storage.close().await;
    Ok(())
}
