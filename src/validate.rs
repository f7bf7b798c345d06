//! Upload validation gate.
//!
//! Turns a raw batch of [`FileDescriptor`]s into record drafts ready for
//! ingestion, rejecting files that exceed the size limit (or, when an accept
//! list is configured, files of other types). Rejected files never become
//! records.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::models::{DocumentRecord, FileDescriptor, RecordStatus};

const MIB: f64 = 1024.0 * 1024.0;

/// Upper bound (inclusive) of the synthetic page count.
pub const MAX_SYNTHETIC_PAGES: u32 = 50;

/// Why a file was refused by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("exceeds {limit_mb}MB limit")]
    TooLarge { size: u64, limit_mb: u64 },
    #[error("is not a supported file type")]
    UnsupportedType,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::TooLarge { .. } => "too_large",
            RejectReason::UnsupportedType => "unsupported_type",
        }
    }
}

/// A refused file together with the user-visible message naming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub name: String,
    pub code: &'static str,
    pub message: String,
    #[serde(skip)]
    pub reason: RejectReason,
}

impl Rejection {
    fn new(name: &str, reason: RejectReason) -> Self {
        Self {
            name: name.to_string(),
            code: reason.code(),
            message: format!("{} {}", name, reason),
            reason,
        }
    }
}

/// Optional title and tag input that applies to a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub title: String,
    pub tags: String,
}

impl UploadForm {
    pub fn new(title: impl Into<String>, tags: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            tags: tags.into(),
        }
    }

    /// Resets both inputs for the next batch.
    pub fn clear(&mut self) {
        self.title.clear();
        self.tags.clear();
    }
}

/// Result of running a batch through the gate.
#[derive(Debug, Clone, Default)]
pub struct ValidatedBatch {
    pub accepted: Vec<DocumentRecord>,
    pub rejected: Vec<Rejection>,
}

/// Validates a batch of files and builds drafts for the accepted ones.
///
/// The form is cleared only when at least one file is accepted.
pub fn validate_batch(
    files: &[FileDescriptor],
    form: &mut UploadForm,
    config: &IngestConfig,
) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();
    if files.is_empty() {
        return batch;
    }

    let title = form.title.trim();
    let title = (!title.is_empty()).then(|| title.to_string());
    let tags = parse_tags(&form.tags);
    let mut rng = rand::thread_rng();

    for file in files {
        if let Err(reason) = check_file(file, config) {
            batch.rejected.push(Rejection::new(&file.name, reason));
            continue;
        }

        batch.accepted.push(DocumentRecord {
            id: Uuid::new_v4().to_string(),
            name: file.name.clone(),
            title: Some(title.clone().unwrap_or_else(|| file.name.clone())),
            tags: tags.clone(),
            size_label: format_size_label(file.size),
            uploaded_at: Utc::now(),
            pages: rng.gen_range(1..=MAX_SYNTHETIC_PAGES),
            progress: 0,
            status: RecordStatus::Uploading,
        });
    }

    if !batch.accepted.is_empty() {
        form.clear();
    }
    batch
}

fn check_file(file: &FileDescriptor, config: &IngestConfig) -> Result<(), RejectReason> {
    if file.size > config.max_file_bytes {
        return Err(RejectReason::TooLarge {
            size: file.size,
            limit_mb: config.max_file_bytes / (1024 * 1024),
        });
    }

    if !config.accept.is_empty() {
        let ext = std::path::Path::new(&file.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let allowed = ext.is_some_and(|ext| {
            config
                .accept
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        });
        if !allowed {
            return Err(RejectReason::UnsupportedType);
        }
    }

    Ok(())
}

/// Splits comma-separated tag input into trimmed, non-empty, unique tags.
///
/// Order of first appearance is kept; case is preserved.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Formats a byte count as megabytes with one decimal, e.g. `"3.2 MB"`.
pub fn format_size_label(size: u64) -> String {
    let tenths = (size as f64 / MIB * 10.0).round() / 10.0;
    format!("{:.1} MB", tenths)
}
