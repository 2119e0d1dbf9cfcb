// ABOUTME: Validate command - pre-flight checks before a migration run
// ABOUTME: Prints each check and reports whether all of them passed

use anyhow::Result;

use crate::config::{ApiConfig, DatabaseConfig};
use crate::preflight::run_preflight_checks;

/// Returns `true` when every check passed.
pub async fn validate(database: &DatabaseConfig, api: &ApiConfig) -> Result<bool> {
    tracing::info!("Running pre-flight checks...");
    let result = run_preflight_checks(database, api).await?;
    result.print();
    Ok(result.all_passed())
}
