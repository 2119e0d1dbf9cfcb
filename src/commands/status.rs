// ABOUTME: Status command - reports migration progress per table without changing anything
// ABOUTME: Shows migrated/unmigrated counts, blocked listings and pending journal marks

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::DatabaseConfig;
use crate::entity::EntityKind;
use crate::journal::MarkJournal;
use crate::source::{MigrationStore, MysqlStore};

pub async fn status(database: &DatabaseConfig, journal_path: &Path) -> Result<()> {
    let journal = MarkJournal::open(journal_path)
        .await
        .context("Failed to open pending-mark journal")?;
    let mut store = MysqlStore::connect(database).await?;
    let result = print_status(&mut store, &journal).await;
    if let Err(e) = store.disconnect().await {
        tracing::warn!("{:#}", e);
    }
    result
}

async fn print_status(store: &mut MysqlStore, journal: &MarkJournal) -> Result<()> {
    println!();
    println!(
        "{:<18} {:>10} {:>10} {:>12} {:>14}",
        "TABLE", "TOTAL", "MIGRATED", "UNMIGRATED", "PENDING MARKS"
    );
    for kind in EntityKind::ALL {
        let counts = store.count_rows(kind).await?;
        println!(
            "{:<18} {:>10} {:>10} {:>12} {:>14}",
            kind.table(),
            counts.total,
            counts.migrated,
            counts.unmigrated(),
            journal.pending_for(kind).len()
        );
    }

    let blocked = store.fetch_blocked_listings().await?;
    println!();
    if blocked.is_empty() {
        println!("All unmigrated listings reference migrated users and categories.");
    } else {
        println!(
            "{} unmigrated listing(s) wait for their user or category to be migrated:",
            blocked.len()
        );
        for listing in &blocked {
            println!("  listing {}: {}", listing.id, listing.missing());
        }
    }

    if !journal.is_empty() {
        println!();
        println!(
            "{} remote object(s) in {:?} still need their source row marked; run `migrate` to complete them.",
            journal.len(),
            journal.path()
        );
    }
    Ok(())
}
