use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Published status of one background transfer task.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferStatus {
    /// Human-readable stage label
    pub stage: String,
    /// Aggregate percentage in [0, 100]
    pub progress: f64,
    /// Instantaneous throughput estimate in KB/s
    pub speed_kbps: f64,
    /// True once the task finished successfully
    pub done: bool,
    /// Set when the task failed or was cancelled
    pub error: Option<String>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl TransferStatus {
    fn new(stage: impl Into<String>, progress: f64, speed_kbps: f64) -> Self {
        Self {
            stage: stage.into(),
            progress: progress.clamp(0.0, 100.0),
            speed_kbps,
            done: false,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn queued() -> Self {
        Self::new("Queued", 0.0, 0.0)
    }

    pub fn preparing() -> Self {
        Self::new("Preparing upload", 0.0, 0.0)
    }

    pub fn uploading(part: usize, total: usize, progress: f64, speed_kbps: f64) -> Self {
        Self::new(
            format!("Uploading part {part}/{total}"),
            progress,
            speed_kbps,
        )
    }

    pub fn part_started(part: usize, total: usize, progress: f64) -> Self {
        Self::new(
            format!("Starting upload of part {part}/{total}"),
            progress,
            0.0,
        )
    }

    pub fn part_completed(part: usize, total: usize, progress: f64) -> Self {
        Self::new(format!("Completed part {part}/{total}"), progress, 0.0)
    }

    pub fn completed() -> Self {
        Self {
            done: true,
            ..Self::new("Completed", 100.0, 0.0)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new("Error", 0.0, 0.0)
        }
    }

    pub fn cancelled() -> Self {
        Self {
            error: Some("transfer cancelled".to_string()),
            ..Self::new("Cancelled", 0.0, 0.0)
        }
    }

    /// Terminal entries are frozen: either finished at 100 or errored.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}

/// Process-wide progress map read by the polling endpoints.
///
/// Entries are only ever overwritten, never removed; stale keys are harmless
/// because both key spaces (filenames of live sessions, one-shot task ids)
/// are small and short-lived in practice.
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    split: DashMap<String, f64>,
    transfers: DashMap<Uuid, TransferStatus>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes splitting progress for `filename`, clamped to [0, 100].
    pub fn set_split_progress(&self, filename: &str, percent: f64) {
        self.split
            .insert(filename.to_string(), percent.clamp(0.0, 100.0));
    }

    /// Current splitting progress; 0 for unknown filenames.
    pub fn split_progress(&self, filename: &str) -> f64 {
        self.split.get(filename).map(|p| *p).unwrap_or(0.0)
    }

    pub fn init_transfer(&self, task_id: Uuid) {
        self.transfers.insert(task_id, TransferStatus::queued());
    }

    /// Publishes a transfer status transition. Updates against a terminal
    /// entry are ignored, which keeps Completed/Error states settled even if
    /// a straggling progress callback fires afterwards.
    pub fn update_transfer(&self, task_id: Uuid, status: TransferStatus) {
        self.transfers
            .entry(task_id)
            .and_modify(|current| {
                if !current.is_terminal() {
                    *current = status.clone();
                }
            })
            .or_insert(status);
    }

    pub fn transfer_status(&self, task_id: Uuid) -> Option<TransferStatus> {
        self.transfers.get(&task_id).map(|s| s.clone())
    }
}
