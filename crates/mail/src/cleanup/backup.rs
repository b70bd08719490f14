//! JSON backup export of messages before a destructive run

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::api::MailApi;
use crate::models::{FullMessage, MessageMeta};
use crate::retry::{RetryPolicy, call_with_retry};
use crate::throttle::AdaptiveThrottle;

/// One exported message
#[derive(Debug, Serialize)]
struct BackupEntry {
    id: String,
    subject: String,
    received_at: Option<DateTime<Utc>>,
    message: FullMessage,
}

/// Outcome of a backup export
#[derive(Debug)]
pub struct BackupSummary {
    pub file: PathBuf,
    pub exported: usize,
    pub errors: usize,
}

/// Export every message in full to one timestamped JSON file under `dir`.
///
/// Per-message fetch failures are counted and logged; the export keeps
/// going and writes whatever was fetched. The file is written even when
/// some messages failed, so a partial backup is never silently lost.
pub fn export_messages(
    api: &dyn MailApi,
    items: &[MessageMeta],
    dir: &Path,
    retry: &RetryPolicy,
    throttle: &mut AdaptiveThrottle,
    pacing: bool,
) -> Result<BackupSummary> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup directory: {}", dir.display()))?;

    let file = dir.join(format!(
        "backup_{}.json",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    info!("backing up {} messages to {}", items.len(), file.display());

    let mut entries = Vec::with_capacity(items.len());
    let mut errors = 0usize;

    for meta in items {
        match call_with_retry(retry, throttle, pacing, || api.get_message(&meta.id)) {
            Ok(message) => entries.push(BackupEntry {
                id: meta.id.as_str().to_string(),
                subject: meta.subject.clone(),
                received_at: meta.received_at,
                message,
            }),
            Err(e) => {
                error!("backup fetch failed for {}: {}", meta.id.as_str(), e);
                errors += 1;
            }
        }
    }

    let content = serde_json::to_string_pretty(&entries)?;
    std::fs::write(&file, content)
        .with_context(|| format!("Failed to write backup file: {}", file.display()))?;

    info!("backup saved: {} ({} messages)", file.display(), entries.len());
    Ok(BackupSummary {
        file,
        exported: entries.len(),
        errors,
    })
}
