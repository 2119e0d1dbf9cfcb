// ABOUTME: CLI entry point for kreezalid-migrator
// ABOUTME: Loads .env, parses commands and maps results to process exit codes

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kreezalid_migrator::commands;
use kreezalid_migrator::config::{
    default_journal_path, ApiConfig, DatabaseConfig, MigrationConfig, PayloadDefaults, TlsPolicy,
    DEFAULT_DB_PORT,
};
use kreezalid_migrator::pipeline::{EXIT_FATAL, EXIT_OK};
use kreezalid_migrator::EntityKind;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kreezalid-migrator")]
#[command(about = "Migrate users, categories and listings from MySQL to Kreezalid", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Extra PEM certificate authority trusted for the Kreezalid API
    #[arg(long = "ca-cert", global = true)]
    ca_cert: Option<PathBuf>,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Pending-mark journal (remote ids created but not yet marked in MySQL)
    #[arg(long, global = true)]
    journal: Option<PathBuf>,
    #[command(flatten)]
    database: DatabaseArgs,
    #[command(flatten)]
    api: ApiArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DatabaseArgs {
    /// Source MySQL host
    #[arg(long = "db-host", env = "DB_HOST", global = true)]
    host: Option<String>,
    /// Source MySQL port
    #[arg(long = "db-port", env = "DB_PORT", global = true)]
    port: Option<u16>,
    /// Source MySQL user
    #[arg(long = "db-user", env = "DB_USER", global = true)]
    user: Option<String>,
    /// Source MySQL password
    #[arg(id = "db_password", long = "db-password", env = "DB_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
    /// Source MySQL database name
    #[arg(long = "db-name", env = "DB_NAME", global = true)]
    name: Option<String>,
}

#[derive(Args)]
struct ApiArgs {
    /// Kreezalid API base URL (e.g. https://shop.kreezalid.com/api/v1)
    #[arg(long = "api-endpoint", env = "API_ENDPOINT", global = true)]
    endpoint: Option<String>,
    /// Kreezalid API Basic-auth username
    #[arg(long = "auth-username", env = "AUTH_USERNAME", global = true)]
    username: Option<String>,
    /// Kreezalid API Basic-auth password
    #[arg(id = "auth_password", long = "auth-password", env = "AUTH_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate unmigrated rows: users, then categories, then listings
    Migrate {
        /// Only run these pipelines (repeatable; order is always users, categories, listings)
        #[arg(long, value_enum)]
        only: Vec<EntityKind>,
        /// Read and transform rows and log the payloads without calling the API
        #[arg(long)]
        dry_run: bool,
        /// TOML file overriding payload constants (currency, group id, listing title, ...)
        #[arg(long = "config")]
        config_path: Option<PathBuf>,
    },
    /// Show migration progress per table
    Status,
    /// Check configuration, source connectivity and schema before migrating
    Validate,
}

fn required(value: Option<String>, env: &str, flag: &str) -> anyhow::Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        anyhow::anyhow!(
            "{} is not set. Export it, add it to .env, or pass {}",
            env,
            flag
        )
    })
}

fn database_config(args: DatabaseArgs) -> anyhow::Result<DatabaseConfig> {
    Ok(DatabaseConfig {
        host: required(args.host, "DB_HOST", "--db-host")?,
        port: args.port.unwrap_or(DEFAULT_DB_PORT),
        user: required(args.user, "DB_USER", "--db-user")?,
        password: args.password.filter(|p| !p.is_empty()),
        name: required(args.name, "DB_NAME", "--db-name")?,
    })
}

fn api_config(args: ApiArgs, tls: TlsPolicy) -> anyhow::Result<ApiConfig> {
    let endpoint = required(args.endpoint, "API_ENDPOINT", "--api-endpoint")?;
    ApiConfig::new(
        &endpoint,
        args.username.unwrap_or_default(),
        args.password.unwrap_or_default(),
        tls,
    )
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let tls = TlsPolicy::from_flags(cli.allow_self_signed_certs, cli.ca_cert);
    let journal_path = cli.journal.unwrap_or_else(default_journal_path);

    match cli.command {
        Commands::Migrate {
            only,
            dry_run,
            config_path,
        } => {
            let defaults = PayloadDefaults::load_or_default(config_path.as_deref())
                .context("Failed to load payload defaults")?;
            let api = api_config(cli.api, tls)?;
            if api.username.is_empty() || api.password.is_empty() {
                anyhow::bail!("AUTH_USERNAME and AUTH_PASSWORD are required to call the Kreezalid API");
            }
            let config = MigrationConfig {
                database: database_config(cli.database)?,
                api,
                defaults,
                journal_path,
            };
            commands::migrate(&config, &only, dry_run).await
        }
        Commands::Status => {
            let database = database_config(cli.database)?;
            commands::status(&database, &journal_path).await?;
            Ok(EXIT_OK)
        }
        Commands::Validate => {
            let database = database_config(cli.database)?;
            let api = api_config(cli.api, tls)?;
            if commands::validate(&database, &api).await? {
                Ok(EXIT_OK)
            } else {
                Ok(EXIT_FATAL)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so clap's `env = ...` attributes see its values
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
