// ABOUTME: Pre-flight validation checks for a migration run
// ABOUTME: Validates API configuration, source connectivity and the marker columns on each table

use anyhow::Result;

use crate::config::{ApiConfig, DatabaseConfig, TlsPolicy};
use crate::entity::EntityKind;
use crate::source::mysql::MARKER_COLUMNS;
use crate::source::MysqlStore;

/// Tables read through joins but never marked.
const JOIN_TABLES: [(&str, &[&str]); 2] = [
    ("listing_category_translation", &["id", "translatable_id", "name", "slug"]),
    ("listing_listing_category", &["listing_id", "listing_category_id"]),
];

/// Individual check result
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Complete pre-flight results
#[derive(Debug, Default)]
pub struct PreflightResult {
    pub configuration: Vec<CheckResult>,
    pub network: Vec<CheckResult>,
    pub schema: Vec<CheckResult>,
}

impl PreflightResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn all_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.configuration
            .iter()
            .chain(self.network.iter())
            .chain(self.schema.iter())
    }

    pub fn all_passed(&self) -> bool {
        self.all_checks().all(|check| check.passed)
    }

    pub fn failed_count(&self) -> usize {
        self.all_checks().filter(|check| !check.passed).count()
    }

    /// Print formatted output
    pub fn print(&self) {
        println!();
        println!("Pre-flight Checks");
        println!("{}", "═".repeat(61));
        println!();

        for (title, checks) in [
            ("Configuration:", &self.configuration),
            ("Source Connectivity:", &self.network),
            ("Source Schema:", &self.schema),
        ] {
            if checks.is_empty() {
                continue;
            }
            println!("{}", title);
            for check in checks {
                let icon = if check.passed { "✓" } else { "✗" };
                println!("  {} {}", icon, check.message);
                if let Some(ref details) = check.details {
                    println!("      {}", details);
                }
            }
            println!();
        }

        println!("{}", "═".repeat(61));
        if self.all_passed() {
            println!("PASSED: All pre-flight checks successful");
        } else {
            println!("FAILED: {} check(s) must be resolved", self.failed_count());
        }
    }
}

/// Check that `table` exists and carries every column in `required`.
///
/// `found` is the table's column list; an empty list means the table is missing.
pub fn check_table_columns(table: &str, found: &[String], required: &[&str]) -> CheckResult {
    if found.is_empty() {
        return CheckResult::fail(table, format!("Table `{}` not found", table));
    }
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !found.iter().any(|f| f.eq_ignore_ascii_case(column)))
        .collect();
    if missing.is_empty() {
        CheckResult::pass(table, format!("Table `{}` has required columns", table))
    } else {
        CheckResult::fail(
            table,
            format!("Table `{}` is missing column(s): {}", table, missing.join(", ")),
        )
        .with_details(format!(
            "Add them with: ALTER TABLE `{}` ADD COLUMN kreezalid_id BIGINT UNSIGNED NULL, ADD COLUMN imported_at DATETIME NULL",
            table
        ))
    }
}

fn check_api_configuration(result: &mut PreflightResult, api: &ApiConfig) {
    result.configuration.push(CheckResult::pass(
        "api_endpoint",
        format!("API endpoint {}", api.base_url),
    ));

    if api.username.is_empty() || api.password.is_empty() {
        result.configuration.push(
            CheckResult::fail("api_credentials", "API credentials are incomplete")
                .with_details("Set AUTH_USERNAME and AUTH_PASSWORD"),
        );
    } else {
        result
            .configuration
            .push(CheckResult::pass("api_credentials", "API credentials provided"));
    }

    let tls = match &api.tls {
        TlsPolicy::Verify => CheckResult::pass("tls", "TLS certificates verified (system roots)"),
        TlsPolicy::CustomCa(path) => {
            if path.exists() {
                CheckResult::pass("tls", format!("TLS certificates verified against {:?}", path))
            } else {
                CheckResult::fail("tls", format!("CA certificate {:?} not found", path))
            }
        }
        TlsPolicy::AcceptInvalid => CheckResult::pass("tls", "TLS verification disabled")
            .with_details("Insecure: use --ca-cert with the API's certificate authority instead"),
    };
    result.configuration.push(tls);
}

/// Run all pre-flight checks
pub async fn run_preflight_checks(database: &DatabaseConfig, api: &ApiConfig) -> Result<PreflightResult> {
    let mut result = PreflightResult::new();

    check_api_configuration(&mut result, api);

    let mut store = match MysqlStore::connect(database).await {
        Ok(mut store) => match store.ping().await {
            Ok(()) => {
                result.network.push(CheckResult::pass(
                    "source",
                    format!("Connected to {}", database.display_url()),
                ));
                store
            }
            Err(e) => {
                result.network.push(
                    CheckResult::fail("source", "Source database did not respond")
                        .with_details(format!("{:#}", e)),
                );
                return Ok(result);
            }
        },
        Err(e) => {
            result.network.push(
                CheckResult::fail("source", format!("Cannot connect to {}", database.display_url()))
                    .with_details(format!("{:#}", e)),
            );
            return Ok(result);
        }
    };

    for kind in EntityKind::ALL {
        let mut required = vec!["id"];
        required.extend(MARKER_COLUMNS);
        let columns = store.column_names(kind.table()).await?;
        result
            .schema
            .push(check_table_columns(kind.table(), &columns, &required));
    }
    for (table, required) in JOIN_TABLES {
        let columns = store.column_names(table).await?;
        result
            .schema
            .push(check_table_columns(table, &columns, required));
    }

    if let Err(e) = store.disconnect().await {
        tracing::warn!("{:#}", e);
    }

    Ok(result)
}
