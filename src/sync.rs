//! Catalog synchronizer.
//!
//! A context that did not create the records (the library view) learns about
//! changes only through the shared catalog. [`CatalogSync`] seeds its local
//! state with one immediate read, then re-reads the catalog on a fixed period
//! and replaces local state wholesale with whatever the catalog holds.
//!
//! A payload that fails to parse keeps the previous state; the view never
//! blanks on transient corruption. Local state is published on a
//! [`tokio::sync::watch`] channel, and subscribers are only woken when the
//! record list actually changed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::catalog::{Catalog, CatalogError};
use crate::models::DocumentRecord;

/// Local record state of one context, kept in step with the catalog.
///
/// Dropping the value stops polling.
pub struct CatalogSync {
    catalog: Catalog,
    state: Arc<watch::Sender<Vec<DocumentRecord>>>,
    /// Held by a poll while it reads and publishes, and by [`commit`](Self::commit).
    gate: Arc<Mutex<()>>,
    task: JoinHandle<()>,
}

impl CatalogSync {
    /// Loads the catalog once and starts polling it every `period`.
    pub async fn mount(catalog: Catalog, period: Duration) -> Self {
        let seed = catalog.load().await;
        tracing::debug!(records = seed.len(), "catalog sync seeded");
        let (tx, _) = watch::channel(seed);
        let state = Arc::new(tx);

        let gate = Arc::new(Mutex::new(()));

        let poll_catalog = catalog.clone();
        let poll_state = Arc::clone(&state);
        let poll_gate = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let _guard = poll_gate.lock().await;
                match refresh(&poll_catalog, &poll_state).await {
                    Ok(true) => tracing::debug!("catalog changed"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "keeping previous library state"),
                }
            }
        });

        Self {
            catalog,
            state,
            gate,
            task,
        }
    }

    /// Current local records.
    pub fn snapshot(&self) -> Vec<DocumentRecord> {
        self.state.borrow().clone()
    }

    /// A receiver that is notified whenever local state changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<DocumentRecord>> {
        self.state.subscribe()
    }

    /// Applies an edit to a copy of local state and writes it to the catalog.
    ///
    /// `edit` returns whether it changed anything; nothing is written when it
    /// did not. Local state only takes the edit once the write succeeded, and
    /// no poll runs in between.
    pub async fn commit<F>(&self, edit: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Vec<DocumentRecord>) -> bool,
    {
        let _guard = self.gate.lock().await;
        let mut next = self.snapshot();
        if !edit(&mut next) {
            return Ok(false);
        }
        self.catalog.save(&next).await?;
        self.state.send_replace(next);
        Ok(true)
    }

    /// Stops polling. Local state stays readable.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CatalogSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Re-reads the catalog into `state`. Returns whether the records changed.
pub async fn refresh(
    catalog: &Catalog,
    state: &watch::Sender<Vec<DocumentRecord>>,
) -> Result<bool, CatalogError> {
    let records = catalog.try_load().await?;
    Ok(state.send_if_modified(|current| {
        if *current == records {
            false
        } else {
            *current = records;
            true
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryStorage, Storage};
    use crate::models::RecordStatus;
    use chrono::Utc;

    fn record(id: &str, progress: u8) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            name: format!("{}.pdf", id),
            title: None,
            tags: vec![],
            size_label: "1.0 MB".to_string(),
            uploaded_at: Utc::now(),
            pages: 2,
            progress,
            status: RecordStatus::for_progress(progress),
        }
    }

    const PERIOD: Duration = Duration::from_millis(750);

    #[tokio::test(start_paused = true)]
    async fn seeds_immediately_and_follows_writer() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = Catalog::new(storage.clone(), "uploadedFiles");
        let first = vec![record("1", 15)];
        writer.save(&first).await.unwrap();

        let sync = CatalogSync::mount(Catalog::new(storage.clone(), "uploadedFiles"), PERIOD).await;
        assert_eq!(sync.snapshot(), first);

        let mut rx = sync.subscribe();
        let updated = vec![record("1", 60), record("2", 0)];
        writer.save(&updated).await.unwrap();

        // not visible until the next poll
        assert_eq!(sync.snapshot().len(), 1);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), updated);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_poll_keeps_previous_state() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = Catalog::new(storage.clone(), "uploadedFiles");
        let good = vec![record("1", 100)];
        writer.save(&good).await.unwrap();

        let sync = CatalogSync::mount(Catalog::new(storage.clone(), "uploadedFiles"), PERIOD).await;
        storage.set_item("uploadedFiles", "[{\"id\":").await.unwrap();
        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(sync.snapshot(), good);
        assert!(sync.is_running());

        let fixed = vec![record("1", 100), record("3", 30)];
        writer.save(&fixed).await.unwrap();
        tokio::time::sleep(PERIOD + Duration::from_millis(1)).await;
        assert_eq!(sync.snapshot(), fixed);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_seed_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("uploadedFiles", "garbage").await.unwrap();
        let sync = CatalogSync::mount(Catalog::new(storage, "uploadedFiles"), PERIOD).await;
        assert!(sync.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_payload_does_not_wake_subscribers() {
        let storage = Arc::new(MemoryStorage::new());
        let catalog = Catalog::new(storage, "uploadedFiles");
        catalog.save(&[record("1", 100)]).await.unwrap();

        let (tx, mut rx) = watch::channel(catalog.load().await);
        assert!(!refresh(&catalog, &tx).await.unwrap());
        assert!(!rx.has_changed().unwrap());

        catalog.save(&[]).await.unwrap();
        assert!(refresh(&catalog, &tx).await.unwrap());
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_local_state() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = Catalog::new(storage.clone(), "uploadedFiles");
        let sync = CatalogSync::mount(Catalog::new(storage, "uploadedFiles"), PERIOD).await;

        sync.stop();
        writer.save(&[record("1", 0)]).await.unwrap();
        tokio::time::sleep(PERIOD * 4).await;
        assert!(sync.snapshot().is_empty());
        assert!(!sync.is_running());
    }
}
