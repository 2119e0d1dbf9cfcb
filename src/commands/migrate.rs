// ABOUTME: Migrate command - runs the user, category and listing pipelines against Kreezalid
// ABOUTME: Owns the single source connection for the whole run and maps the report to an exit code

use anyhow::{Context, Result};

use crate::config::MigrationConfig;
use crate::entity::EntityKind;
use crate::journal::MarkJournal;
use crate::pipeline::Migrator;
use crate::publisher::KreezalidClient;
use crate::source::MysqlStore;

/// Run the requested pipelines and return the process exit code.
///
/// The source connection is opened once and closed once, whether the
/// pipelines succeed or not.
pub async fn migrate(config: &MigrationConfig, only: &[EntityKind], dry_run: bool) -> Result<u8> {
    let kinds = EntityKind::ordered(only);
    let names: Vec<&str> = kinds.iter().map(|kind| kind.table()).collect();
    tracing::info!("Importing started: {}", names.join(", "));
    if dry_run {
        tracing::info!("Dry run: payloads are logged, nothing is sent to Kreezalid");
    }

    let journal = MarkJournal::open(&config.journal_path)
        .await
        .context("Failed to open pending-mark journal")?;
    let publisher = KreezalidClient::new(&config.api)?;
    let store = MysqlStore::connect(&config.database).await?;

    let mut migrator = Migrator::new(store, publisher, journal, config.defaults.clone())
        .with_dry_run(dry_run);
    let result = migrator.run(&kinds).await;

    if let Err(e) = migrator.into_store().disconnect().await {
        tracing::warn!("{:#}", e);
    }

    let report = result?;
    report.log_summary();
    let code = report.exit_code();
    if code == crate::pipeline::EXIT_OK {
        tracing::info!("Importing finished");
    } else {
        tracing::warn!("Importing finished with problems (exit code {})", code);
    }
    Ok(code)
}
