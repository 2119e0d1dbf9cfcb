// ABOUTME: Per-entity migration pipelines: read unmigrated rows, transform, publish, mark
// ABOUTME: Runs users, categories and listings strictly in sequence, one row at a time

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use crate::config::PayloadDefaults;
use crate::entity::EntityKind;
use crate::journal::MarkJournal;
use crate::models::RemoteId;
use crate::publisher::{PublishError, PublishOutcome, Publisher};
use crate::source::MigrationStore;
use crate::transform;

/// Every requested pipeline completed and nothing is left inconsistent.
pub const EXIT_OK: u8 = 0;
/// Configuration, connection or journal failure.
pub const EXIT_FATAL: u8 = 1;
/// At least one pipeline stopped on a query error.
pub const EXIT_ABORTED: u8 = 2;
/// Remote objects exist whose source rows could not be marked.
pub const EXIT_INCONSISTENT: u8 = 3;

/// Terminal state of one row within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Published and marked.
    Migrated(RemoteId),
    /// Nothing was created remotely; the row stays unmigrated and is retried next run.
    PublishFailed(PublishError),
    /// Created remotely but the source row could not be marked. The remote id is
    /// kept in the journal so the next run marks it instead of re-creating it.
    MarkFailed { remote_id: RemoteId, reason: String },
    /// A journal entry already covers this row; publishing again would duplicate it.
    Skipped,
    /// `--dry-run`: transformed and logged only.
    DryRun,
}

/// Counters for one entity pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub read: usize,
    pub migrated: usize,
    pub publish_failed: usize,
    pub mark_failed: usize,
    pub skipped: usize,
    pub dry_run: usize,
    /// Listings held back because their user or category has no remote id.
    pub blocked: usize,
    /// Journal entries marked at the start of this pipeline.
    pub replayed: usize,
    /// Journal entries dropped because their source row no longer exists.
    pub orphaned: usize,
    /// Journal entries for this entity still unresolved at the end.
    pub pending_marks: usize,
    pub aborted: Option<String>,
    pub duration_ms: u64,
}

impl EntityReport {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            read: 0,
            migrated: 0,
            publish_failed: 0,
            mark_failed: 0,
            skipped: 0,
            dry_run: 0,
            blocked: 0,
            replayed: 0,
            orphaned: 0,
            pending_marks: 0,
            aborted: None,
            duration_ms: 0,
        }
    }

    fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Migrated(_) => self.migrated += 1,
            RowOutcome::PublishFailed(_) => self.publish_failed += 1,
            RowOutcome::MarkFailed { .. } => self.mark_failed += 1,
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::DryRun => self.dry_run += 1,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|report| report.kind == kind)
    }

    pub fn total_read(&self) -> usize {
        self.entities.iter().map(|report| report.read).sum()
    }

    pub fn exit_code(&self) -> u8 {
        if self.entities.iter().any(EntityReport::is_aborted) {
            EXIT_ABORTED
        } else if self.entities.iter().any(|report| report.pending_marks > 0) {
            EXIT_INCONSISTENT
        } else {
            EXIT_OK
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("Migration summary:");
        for report in &self.entities {
            tracing::info!(
                "  {:<10} read={} migrated={} publish_failed={} mark_failed={} skipped={} blocked={} replayed={} ({} ms)",
                report.kind.table(),
                report.read,
                report.migrated,
                report.publish_failed,
                report.mark_failed,
                report.skipped,
                report.blocked,
                report.replayed,
                report.duration_ms
            );
            if report.orphaned > 0 {
                tracing::warn!(
                    "    {} journal entry(ies) dropped: source row no longer exists",
                    report.orphaned
                );
            }
            if report.dry_run > 0 {
                tracing::info!("    {} payload(s) logged without publishing (dry run)", report.dry_run);
            }
            if let Some(reason) = &report.aborted {
                tracing::error!("    {} pipeline aborted: {}", report.kind, reason);
            }
            if report.pending_marks > 0 {
                tracing::warn!(
                    "    {} {} row(s) exist on Kreezalid but are not marked in the source database",
                    report.pending_marks,
                    report.kind
                );
            }
        }
    }
}

/// How a row ended, plus a journal write failure to surface once the row is settled.
struct SettledRow {
    outcome: RowOutcome,
    journal_error: Option<anyhow::Error>,
}

impl From<RowOutcome> for SettledRow {
    fn from(outcome: RowOutcome) -> Self {
        Self {
            outcome,
            journal_error: None,
        }
    }
}

/// A source row after transformation, ready to publish.
struct PreparedRow {
    row_id: u64,
    payload: std::result::Result<Value, PublishError>,
    missing: Vec<&'static str>,
}

impl PreparedRow {
    fn new<T: Serialize>(row_id: u64, payload: &T, missing: Vec<&'static str>) -> Self {
        Self {
            row_id,
            payload: serde_json::to_value(payload).map_err(|e| PublishError::Encode(e.to_string())),
            missing,
        }
    }
}

/// Runs the read → transform → publish → mark cycle over one store and one publisher.
pub struct Migrator<S, P> {
    store: S,
    publisher: P,
    journal: MarkJournal,
    defaults: PayloadDefaults,
    dry_run: bool,
}

impl<S: MigrationStore, P: Publisher> Migrator<S, P> {
    pub fn new(store: S, publisher: P, journal: MarkJournal, defaults: PayloadDefaults) -> Self {
        Self {
            store,
            publisher,
            journal,
            defaults,
            dry_run: false,
        }
    }

    /// Read and transform only; never publish or mark.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn journal(&self) -> &MarkJournal {
        &self.journal
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run the requested pipelines in migration order.
    ///
    /// A query failure aborts only its own pipeline; later pipelines are still
    /// attempted. Only journal I/O errors abort the whole run, and only after
    /// the row being processed has been marked (or reported as unmarked).
    pub async fn run(&mut self, kinds: &[EntityKind]) -> Result<RunReport> {
        let mut report = RunReport::default();
        for kind in EntityKind::ordered(kinds) {
            let entity_report = self.migrate_entity(kind).await?;
            report.entities.push(entity_report);
        }
        Ok(report)
    }

    /// Run one entity pipeline to completion (or until its query fails).
    pub async fn migrate_entity(&mut self, kind: EntityKind) -> Result<EntityReport> {
        let start = Instant::now();
        let mut report = EntityReport::new(kind);
        tracing::info!("Migrating {} rows from `{}`...", kind, kind.table());

        if !self.dry_run {
            self.replay_pending_marks(kind, &mut report).await?;
        }

        match self.read_rows(kind, &mut report).await {
            Ok(rows) => {
                report.read = rows.len();
                tracing::info!("Found {} unmigrated {} row(s)", rows.len(), kind);
                for row in rows {
                    let settled = self.process_row(kind, row).await;
                    report.record(&settled.outcome);
                    if let Some(e) = settled.journal_error {
                        return Err(e.context(format!(
                            "Pending-mark journal {:?} is not writable; stopping the run",
                            self.journal.path()
                        )));
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to read unmigrated {} rows: {:#}", kind, e);
                report.aborted = Some(format!("{:#}", e));
            }
        }

        report.pending_marks = self.journal.pending_for(kind).len();
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Read and transform every unmigrated row of `kind`.
    async fn read_rows(&mut self, kind: EntityKind, report: &mut EntityReport) -> Result<Vec<PreparedRow>> {
        let rows = match kind {
            EntityKind::User => self
                .store
                .fetch_unmigrated_users()
                .await?
                .iter()
                .map(|row| {
                    let payload = transform::user_payload(row, &self.defaults);
                    let missing = transform::missing_user_fields(&payload);
                    PreparedRow::new(row.id, &payload, missing)
                })
                .collect(),
            EntityKind::Category => self
                .store
                .fetch_unmigrated_categories()
                .await?
                .iter()
                .map(|row| {
                    let payload = transform::category_payload(row);
                    let missing = transform::missing_category_fields(&payload);
                    PreparedRow::new(row.id, &payload, missing)
                })
                .collect(),
            EntityKind::Listing => {
                let blocked = self.store.fetch_blocked_listings().await?;
                report.blocked = blocked.len();
                for listing in &blocked {
                    tracing::warn!(
                        "Listing {} is not ready to migrate: {} not migrated yet",
                        listing.id,
                        listing.missing()
                    );
                }

                self.store
                    .fetch_ready_listings()
                    .await?
                    .iter()
                    .map(|row| {
                        let payload = transform::listing_payload(row, &self.defaults);
                        let missing = transform::missing_listing_fields(&payload);
                        PreparedRow::new(row.id, &payload, missing)
                    })
                    .collect()
            }
        };
        Ok(rows)
    }

    /// Mark rows whose remote object was created by an earlier run.
    async fn replay_pending_marks(&mut self, kind: EntityKind, report: &mut EntityReport) -> Result<()> {
        for pending in self.journal.pending_for(kind) {
            tracing::info!(
                "Completing mark of {} {} with existing Kreezalid id {} (created {})",
                kind,
                pending.row_id,
                pending.remote_id,
                pending.recorded_at
            );
            match self
                .store
                .mark_migrated(kind, pending.row_id, pending.remote_id)
                .await
            {
                Ok(1) => {
                    self.journal.resolve(kind, pending.row_id).await?;
                    report.replayed += 1;
                }
                Ok(0) => {
                    tracing::error!(
                        "{} {} no longer exists in `{}`; Kreezalid id {} has no source row. Dropping journal entry",
                        kind,
                        pending.row_id,
                        kind.table(),
                        pending.remote_id
                    );
                    self.journal.resolve(kind, pending.row_id).await?;
                    report.orphaned += 1;
                }
                Ok(affected) => tracing::error!(
                    "Marking {} {} affected {} rows (expected 1); keeping journal entry",
                    kind,
                    pending.row_id,
                    affected
                ),
                Err(e) => tracing::error!(
                    "Failed to mark {} {} with Kreezalid id {}: {:#}",
                    kind,
                    pending.row_id,
                    pending.remote_id,
                    e
                ),
            }
        }
        Ok(())
    }

    async fn process_row(&mut self, kind: EntityKind, row: PreparedRow) -> SettledRow {
        let row_id = row.row_id;

        if self.journal.contains(kind, row_id) {
            tracing::warn!(
                "Skipping {} {}: already created on Kreezalid, waiting for its mark to succeed",
                kind,
                row_id
            );
            return RowOutcome::Skipped.into();
        }

        if !row.missing.is_empty() {
            tracing::warn!(
                "{} {} has no value for required field(s): {}",
                kind,
                row_id,
                row.missing.join(", ")
            );
        }

        let payload = match row.payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to build {} {} payload: {}", kind, row_id, e);
                return RowOutcome::PublishFailed(e).into();
            }
        };

        if self.dry_run {
            tracing::info!("[dry run] {} {}: {}", kind, row_id, payload);
            return RowOutcome::DryRun.into();
        }

        let remote_id = match self.publisher.publish(kind, &payload).await {
            PublishOutcome::Created(remote_id) => remote_id,
            PublishOutcome::Failed(e) => {
                tracing::error!("Failed to publish {} {}: {}", kind, row_id, e);
                return RowOutcome::PublishFailed(e).into();
            }
        };
        tracing::debug!("Created {} {} as Kreezalid id {}", kind, row_id, remote_id);

        // The mark is attempted even when the journal cannot be written.
        let mut journal_error = match self.journal.record(kind, row_id, remote_id).await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    "Failed to journal {} {} (Kreezalid id {}): {:#}",
                    kind,
                    row_id,
                    remote_id,
                    e
                );
                Some(e)
            }
        };

        let outcome = match self.store.mark_migrated(kind, row_id, remote_id).await {
            Ok(1) => {
                if journal_error.is_none() {
                    if let Err(e) = self.journal.resolve(kind, row_id).await {
                        journal_error = Some(e);
                    }
                }
                tracing::info!("Migrated {} {} -> Kreezalid id {}", kind, row_id, remote_id);
                RowOutcome::Migrated(remote_id)
            }
            Ok(affected) => RowOutcome::MarkFailed {
                remote_id,
                reason: format!("update affected {} rows (expected 1)", affected),
            },
            Err(e) => RowOutcome::MarkFailed {
                remote_id,
                reason: format!("{:#}", e),
            },
        };

        if let RowOutcome::MarkFailed { reason, .. } = &outcome {
            if journal_error.is_some() {
                tracing::error!(
                    "Failed to mark {} {}: {}. Kreezalid id {} is NOT journaled; set `{}`.kreezalid_id = {} for id {} by hand before the next run",
                    kind,
                    row_id,
                    reason,
                    remote_id,
                    kind.table(),
                    remote_id,
                    row_id
                );
            } else {
                tracing::error!(
                    "Failed to mark {} {} (Kreezalid id {}): {}. Recorded in {:?}",
                    kind,
                    row_id,
                    remote_id,
                    reason,
                    self.journal.path()
                );
            }
        }

        SettledRow {
            outcome,
            journal_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kind: EntityKind) -> EntityReport {
        EntityReport::new(kind)
    }

    #[test]
    fn test_exit_code_ok() {
        let run = RunReport {
            entities: EntityKind::ALL.iter().map(|kind| report(*kind)).collect(),
        };
        assert_eq!(run.exit_code(), EXIT_OK);
    }

    #[test]
    fn test_exit_code_publish_failures_are_retryable() {
        let mut users = report(EntityKind::User);
        users.publish_failed = 4;
        let run = RunReport {
            entities: vec![users],
        };
        assert_eq!(run.exit_code(), EXIT_OK);
    }

    #[test]
    fn test_exit_code_aborted_wins() {
        let mut users = report(EntityKind::User);
        users.pending_marks = 1;
        let mut listings = report(EntityKind::Listing);
        listings.aborted = Some("query failed".to_string());
        let run = RunReport {
            entities: vec![users, listings],
        };
        assert_eq!(run.exit_code(), EXIT_ABORTED);
    }

    #[test]
    fn test_exit_code_inconsistent() {
        let mut categories = report(EntityKind::Category);
        categories.pending_marks = 2;
        let run = RunReport {
            entities: vec![categories],
        };
        assert_eq!(run.exit_code(), EXIT_INCONSISTENT);
    }

    #[test]
    fn test_record_outcomes() {
        let mut report = report(EntityKind::User);
        report.record(&RowOutcome::Migrated(RemoteId(1)));
        report.record(&RowOutcome::PublishFailed(PublishError::Transport("x".into())));
        report.record(&RowOutcome::MarkFailed {
            remote_id: RemoteId(2),
            reason: "y".into(),
        });
        report.record(&RowOutcome::Skipped);
        assert_eq!(
            (report.migrated, report.publish_failed, report.mark_failed, report.skipped),
            (1, 1, 1, 1)
        );
    }
}
