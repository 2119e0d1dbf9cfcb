// ABOUTME: Pending-mark journal - remote ids created on Kreezalid but not yet marked in MySQL
// ABOUTME: Lets the next run finish the mark without creating the remote object twice

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::entity::EntityKind;
use crate::models::RemoteId;

/// One remote object whose source row still lacks its marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMark {
    pub entity: EntityKind,
    pub row_id: u64,
    pub remote_id: RemoteId,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    version: u32,
    pending: Vec<PendingMark>,
}

/// JSON-file backed set of pending marks.
///
/// Every mutation is written through to disk before returning.
#[derive(Debug)]
pub struct MarkJournal {
    path: PathBuf,
    pending: Vec<PendingMark>,
}

impl MarkJournal {
    /// Open the journal at `path`, starting empty if the file does not exist.
    ///
    /// Any other I/O error is returned: a journal that cannot be inspected must
    /// never be mistaken for an empty one.
    pub async fn open(path: &Path) -> Result<Self> {
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to check mark journal {:?}", path))?;
        let pending = if exists {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read mark journal {:?}", path))?;
            let file: JournalFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse mark journal {:?}", path))?;
            file.pending
        } else {
            Vec::new()
        };

        if !pending.is_empty() {
            tracing::warn!(
                "Mark journal {:?} holds {} remote object(s) created by an earlier run but not marked in the source database",
                path,
                pending.len()
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            pending,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pending marks for one entity kind, oldest first.
    pub fn pending_for(&self, kind: EntityKind) -> Vec<PendingMark> {
        self.pending
            .iter()
            .filter(|mark| mark.entity == kind)
            .cloned()
            .collect()
    }

    pub fn contains(&self, kind: EntityKind, row_id: u64) -> bool {
        self.pending
            .iter()
            .any(|mark| mark.entity == kind && mark.row_id == row_id)
    }

    /// Record a freshly created remote object before its row is marked.
    ///
    /// The in-memory set only changes once the file has been written.
    pub async fn record(&mut self, kind: EntityKind, row_id: u64, remote_id: RemoteId) -> Result<()> {
        let mut pending = self.without(kind, row_id);
        pending.push(PendingMark {
            entity: kind,
            row_id,
            remote_id,
            recorded_at: Utc::now(),
        });
        self.save(&pending).await?;
        self.pending = pending;
        Ok(())
    }

    /// Forget a pending mark once its row has been updated.
    pub async fn resolve(&mut self, kind: EntityKind, row_id: u64) -> Result<()> {
        if !self.contains(kind, row_id) {
            return Ok(());
        }
        let pending = self.without(kind, row_id);
        self.save(&pending).await?;
        self.pending = pending;
        Ok(())
    }

    fn without(&self, kind: EntityKind, row_id: u64) -> Vec<PendingMark> {
        self.pending
            .iter()
            .filter(|mark| !(mark.entity == kind && mark.row_id == row_id))
            .cloned()
            .collect()
    }

    async fn save(&self, pending: &[PendingMark]) -> Result<()> {
        let exists = fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to check mark journal {:?}", self.path))?;
        if pending.is_empty() && !exists {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let file = JournalFile {
            version: 1,
            pending: pending.to_vec(),
        };
        let contents =
            serde_json::to_string_pretty(&file).context("Failed to serialize mark journal")?;

        // Write to a sibling file and rename so a crash never leaves half a journal.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write mark journal {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace mark journal {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let journal = MarkJournal::open(&dir.path().join("nested/marks.json"))
            .await
            .unwrap();
        assert!(journal.is_empty());
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_record_persists_and_resolve_clears() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/marks.json");

        let mut journal = MarkJournal::open(&path).await.unwrap();
        journal
            .record(EntityKind::User, 1, RemoteId(555))
            .await
            .unwrap();
        journal
            .record(EntityKind::Listing, 9, RemoteId(900))
            .await
            .unwrap();
        assert!(path.exists());

        let mut reopened = MarkJournal::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains(EntityKind::User, 1));
        assert!(!reopened.contains(EntityKind::Category, 1));
        let users = reopened.pending_for(EntityKind::User);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].remote_id, RemoteId(555));

        reopened.resolve(EntityKind::User, 1).await.unwrap();
        let reopened = MarkJournal::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains(EntityKind::Listing, 9));
    }

    #[tokio::test]
    async fn test_record_replaces_existing_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("marks.json");
        let mut journal = MarkJournal::open(&path).await.unwrap();
        journal
            .record(EntityKind::Category, 3, RemoteId(10))
            .await
            .unwrap();
        journal
            .record(EntityKind::Category, 3, RemoteId(11))
            .await
            .unwrap();
        let pending = journal.pending_for(EntityKind::Category);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].remote_id, RemoteId(11));
    }

    #[tokio::test]
    async fn test_corrupt_journal_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("marks.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(MarkJournal::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_unreadable_location_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = MarkJournal::open(&blocker.join("marks.json"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to check mark journal"));
    }

    #[tokio::test]
    async fn test_failed_record_leaves_journal_unchanged() {
        let dir = tempdir().unwrap();
        let state = dir.path().join("state");
        let mut journal = MarkJournal::open(&state.join("marks.json")).await.unwrap();
        std::fs::write(&state, "not a directory").unwrap();

        assert!(journal
            .record(EntityKind::User, 1, RemoteId(555))
            .await
            .is_err());
        assert!(journal.is_empty());
        assert!(!journal.contains(EntityKind::User, 1));
    }
}
