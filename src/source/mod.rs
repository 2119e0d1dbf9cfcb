// ABOUTME: Data-access seam between the migration pipelines and the source database
// ABOUTME: Defines the MigrationStore trait; MySQL implementation lives in mysql.rs

pub mod mysql;

pub use mysql::MysqlStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::entity::EntityKind;
use crate::models::{BlockedListing, CategoryRow, ListingRow, RemoteId, UserRow};

/// Migrated / unmigrated row counts for one source table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub total: u64,
    pub migrated: u64,
}

impl EntityCounts {
    pub fn unmigrated(&self) -> u64 {
        self.total.saturating_sub(self.migrated)
    }
}

/// Query and update capability the pipelines need from the source database.
///
/// Every `fetch_*` method returns only rows whose `imported_at` is NULL, so a
/// row that has been marked is never read again.
///
/// Implementations own a single connection; methods take `&mut self` because
/// processing is strictly sequential.
#[async_trait]
pub trait MigrationStore: Send {
    async fn fetch_unmigrated_users(&mut self) -> Result<Vec<UserRow>>;

    /// Unmigrated categories joined with their canonical translation
    /// (lowest translation id per category).
    async fn fetch_unmigrated_categories(&mut self) -> Result<Vec<CategoryRow>>;

    /// Unmigrated listings whose user and category both carry a remote id.
    async fn fetch_ready_listings(&mut self) -> Result<Vec<ListingRow>>;

    /// Unmigrated listings that are NOT ready: the user or the category (or the
    /// category link itself) has no remote id yet.
    async fn fetch_blocked_listings(&mut self) -> Result<Vec<BlockedListing>>;

    /// Write `remote_id` and the current server time into the row's marker
    /// columns. Returns the number of affected rows (expected: 1).
    async fn mark_migrated(
        &mut self,
        kind: EntityKind,
        row_id: u64,
        remote_id: RemoteId,
    ) -> Result<u64>;

    async fn count_rows(&mut self, kind: EntityKind) -> Result<EntityCounts>;
}
