use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Filesystem artifacts currently owned by one client session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    /// Uploaded originals, not yet split
    pub uploads: Vec<PathBuf>,
    /// Split-output folders
    pub splits: Vec<PathBuf>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.splits.is_empty()
    }

    /// All owned paths, uploads first.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.uploads.iter().chain(self.splits.iter())
    }
}

/// Session-scoped ownership ledger for server-side artifacts.
///
/// Every mutation for a given session runs under that session's map entry,
/// so same-session operations are linearizable while different sessions
/// never block each other. Records are auto-created on first touch and kept
/// for the process lifetime; session tokens are bounded and expiring, so the
/// map stays small.
#[derive(Debug, Default)]
pub struct ArtifactLedger {
    records: DashMap<String, SessionRecord>,
}

impl ArtifactLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_upload(&self, session: &str, path: PathBuf) {
        let mut record = self.records.entry(session.to_string()).or_default();
        if !record.uploads.contains(&path) {
            record.uploads.push(path);
        }
    }

    pub fn register_split_folder(&self, session: &str, path: PathBuf) {
        let mut record = self.records.entry(session.to_string()).or_default();
        if !record.splits.contains(&path) {
            record.splits.push(path);
        }
    }

    /// Removes `path` from the session's record. No-op if the session or
    /// the path is unknown.
    pub fn release(&self, session: &str, path: &Path) {
        if let Some(mut record) = self.records.get_mut(session) {
            record.uploads.retain(|p| p != path);
            record.splits.retain(|p| p != path);
        }
    }

    /// Takes every path owned by the session, leaving its record empty.
    pub fn drain(&self, session: &str) -> SessionRecord {
        let mut record = self.records.entry(session.to_string()).or_default();
        std::mem::take(&mut *record)
    }

    /// Copy of the session's current record (empty if unknown).
    pub fn snapshot(&self, session: &str) -> SessionRecord {
        self.records
            .get(session)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// True if a different session currently owns `path`. Used by the upload
    /// boundary to keep every path owned by at most one session.
    pub fn owned_by_other(&self, session: &str, path: &Path) -> bool {
        self.records.iter().any(|entry| {
            entry.key() != session && entry.value().paths().any(|p| p == path)
        })
    }
}
