use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::BookingStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    Retried,
    Expired,
    Skipped,
    Error,
}

/// One booking's fate in a reconciliation sweep, with before/after status
/// snapshots for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileEntry {
    pub booking_id: Uuid,
    pub booking_ref: String,
    pub status_before: BookingStatus,
    pub status_after: BookingStatus,
    pub outcome: ReconcileOutcome,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub run_by: String,
    pub dry_run: bool,
    pub scanned: u32,
    pub retried: u32,
    pub expired: u32,
    pub skipped: u32,
    pub errors: u32,
    pub entries: Vec<ReconcileEntry>,
}

impl ReconciliationRun {
    pub fn record(&mut self, entry: ReconcileEntry) {
        match entry.outcome {
            ReconcileOutcome::Retried => self.retried += 1,
            ReconcileOutcome::Expired => self.expired += 1,
            ReconcileOutcome::Skipped => self.skipped += 1,
            ReconcileOutcome::Error => self.errors += 1,
        }
        self.entries.push(entry);
    }
}
