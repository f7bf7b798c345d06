//! Core data models used throughout Research Desk.
//!
//! These types represent the file descriptors handed to the upload gate and
//! the document records that flow through ingestion, the shared catalog, and
//! the library view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw file selected or dropped by the user, before validation.
///
/// Only the name and byte size are known; contents are never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Lifecycle stage of a document record.
///
/// Ordered: a record only ever moves forward through these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Uploading,
    Processing,
    Completed,
}

impl RecordStatus {
    /// Progress at which a record leaves `Uploading`.
    pub const PROCESSING_THRESHOLD: u8 = 50;

    /// Derives the status from a progress value.
    ///
    /// `< 50` uploading, `50..100` processing, `100` completed. Values above
    /// 100 are treated as 100.
    pub fn for_progress(progress: u8) -> Self {
        if progress >= 100 {
            RecordStatus::Completed
        } else if progress >= Self::PROCESSING_THRESHOLD {
            RecordStatus::Processing
        } else {
            RecordStatus::Uploading
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Uploading => "uploading",
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A document in the shared catalog.
///
/// Serialized as a camelCase JSON object; the size label lives under the
/// `size` key. `title` and `tags` may be missing from stored payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "size")]
    pub size_label: String,
    pub uploaded_at: DateTime<Utc>,
    pub pages: u32,
    pub progress: u8,
    pub status: RecordStatus,
}

impl DocumentRecord {
    /// Title shown to the user: the override when present, else the filename.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    /// Lowercased filename extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    /// Applies a progress update.
    ///
    /// Returns `false` and leaves the record untouched when the update would
    /// move progress backwards or not at all. Status is re-derived from the
    /// new progress and never moves backwards.
    pub fn advance(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.status = self.status.max(RecordStatus::for_progress(progress));
        true
    }

    /// Re-derives `status` from `progress` for records read back from storage.
    pub fn normalize(&mut self) {
        self.progress = self.progress.min(100);
        self.status = RecordStatus::for_progress(self.progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(progress: u8) -> DocumentRecord {
        DocumentRecord {
            id: "r1".to_string(),
            name: "Notes.MD".to_string(),
            title: None,
            tags: vec![],
            size_label: "0.1 MB".to_string(),
            uploaded_at: Utc::now(),
            pages: 3,
            progress,
            status: RecordStatus::for_progress(progress),
        }
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(RecordStatus::for_progress(0), RecordStatus::Uploading);
        assert_eq!(RecordStatus::for_progress(49), RecordStatus::Uploading);
        assert_eq!(RecordStatus::for_progress(50), RecordStatus::Processing);
        assert_eq!(RecordStatus::for_progress(99), RecordStatus::Processing);
        assert_eq!(RecordStatus::for_progress(100), RecordStatus::Completed);
        assert_eq!(RecordStatus::for_progress(200), RecordStatus::Completed);
    }

    #[test]
    fn advance_rejects_regressions() {
        let mut r = record(60);
        assert!(!r.advance(45));
        assert!(!r.advance(60));
        assert_eq!(r.progress, 60);
        assert_eq!(r.status, RecordStatus::Processing);

        assert!(r.advance(130));
        assert_eq!(r.progress, 100);
        assert!(r.is_completed());
    }

    #[test]
    fn display_title_falls_back_to_name() {
        let mut r = record(0);
        assert_eq!(r.display_title(), "Notes.MD");
        r.title = Some("Field notes".to_string());
        assert_eq!(r.display_title(), "Field notes");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(record(0).extension().as_deref(), Some("md"));
    }

    #[test]
    fn json_shape_matches_catalog_payload() {
        let r = record(15);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["size"], "0.1 MB");
        assert_eq!(v["status"], "uploading");
        assert!(v.get("uploadedAt").is_some());
        assert!(v.get("title").is_none());

        let parsed: DocumentRecord = serde_json::from_str(
            r#"{"id":"1","name":"a.pdf","size":"1.0 MB","uploadedAt":"2024-03-15T10:00:00.000Z","pages":4,"progress":100,"status":"completed"}"#,
        )
        .unwrap();
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.display_title(), "a.pdf");
    }
}
