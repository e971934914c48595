use crate::services::ledger::ArtifactLedger;
use crate::utils::keyed_mutex::KeyedMutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Deletes session-owned artifacts and sweeps orphaned storage.
///
/// Session-scoped reaps run under a per-session mutex so the explicit
/// cleanup endpoint, the page-load reap and a download-completion reap can
/// race without double-deleting or interleaving with each other. Every
/// deletion tolerates already-missing paths, which makes reaping idempotent.
pub struct SessionReaper {
    ledger: Arc<ArtifactLedger>,
    locks: KeyedMutex,
    upload_root: PathBuf,
    split_root: PathBuf,
}

impl SessionReaper {
    pub fn new(ledger: Arc<ArtifactLedger>, upload_root: PathBuf, split_root: PathBuf) -> Self {
        Self {
            ledger,
            locks: KeyedMutex::new(),
            upload_root,
            split_root,
        }
    }

    /// Removes every path in the session's ledger record and leaves the
    /// record empty. Safe to call repeatedly.
    pub async fn reap_session(&self, session: &str) {
        let _guard = self.locks.lock(session).await;
        let record = self.ledger.drain(session);

        if record.is_empty() {
            return;
        }

        for path in &record.uploads {
            remove_file_tolerant(path).await;
        }
        for folder in &record.splits {
            remove_dir_tolerant(folder).await;
        }

        info!(
            "Reaped session {}: {} upload(s), {} split folder(s)",
            session,
            record.uploads.len(),
            record.splits.len()
        );
    }

    /// Removes one split folder and releases its ledger entry; used when a
    /// download has delivered the folder's last content.
    pub async fn reap_folder(&self, session: &str, folder: &Path) {
        let _guard = self.locks.lock(session).await;
        remove_dir_tolerant(folder).await;
        self.ledger.release(session, folder);
        info!("Reaped split folder {}", folder.display());
    }

    /// Ledger-independent safety net: removes anything in the storage roots
    /// whose mtime predates `max_age` ago. Catches artifacts orphaned by
    /// crashed or ledger-desynchronized sessions.
    pub async fn reap_stale(&self, max_age: Duration) {
        let cutoff = SystemTime::now() - max_age;
        sweep_root(&self.upload_root, cutoff, false).await;
        sweep_root(&self.split_root, cutoff, true).await;
        self.locks.evict_idle();
    }
}

async fn remove_file_tolerant(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove {}: {}", path.display(), e),
    }
}

async fn remove_dir_tolerant(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => info!("Removed folder {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to remove folder {}: {}", path.display(), e),
    }
}

/// Removes direct children of `root` older than `cutoff`. A single failed
/// deletion is logged and the sweep continues.
async fn sweep_root(root: &Path, cutoff: SystemTime, dirs: bool) {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Stale sweep skipped {}: {}", root.display(), e);
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Stale sweep aborted in {}: {}", root.display(), e);
                break;
            }
        };

        let path = entry.path();
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Stale sweep could not stat {}: {}", path.display(), e);
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        if dirs {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                info!("Sweeping stale folder {}", path.display());
                remove_dir_tolerant(&path).await;
            }
        } else if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            info!("Sweeping stale file {}", path.display());
            remove_file_tolerant(&path).await;
        }
    }
}

/// Periodic background sweep with graceful shutdown, one per process.
pub struct ReaperWorker {
    reaper: Arc<SessionReaper>,
    interval: Duration,
    max_age: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ReaperWorker {
    pub fn new(
        reaper: Arc<SessionReaper>,
        interval: Duration,
        max_age: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reaper,
            interval,
            max_age,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            "🧹 Reaper worker started (interval {:?}, max age {:?})",
            self.interval, self.max_age
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("Reaper worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.reaper.reap_stale(self.max_age).await;
                }
            }
        }
    }
}
