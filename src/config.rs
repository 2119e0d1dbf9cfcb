// ABOUTME: Runtime configuration for the source database, the Kreezalid API and payload defaults
// ABOUTME: Values come from env/CLI flags; payload constants may be overridden from a TOML file

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default MySQL port used when `DB_PORT` is not set.
pub const DEFAULT_DB_PORT: u16 = 3306;

/// Connection settings for the source MySQL database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
}

impl DatabaseConfig {
    /// Build mysql_async connection options.
    pub fn to_opts(&self) -> mysql_async::Opts {
        mysql_async::OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(self.password.clone())
            .db_name(Some(self.name.clone()))
            .into()
    }

    /// Connection URL safe for logs (password masked).
    pub fn display_url(&self) -> String {
        let auth = match self.password {
            Some(_) => format!("{}:***", self.user),
            None => self.user.clone(),
        };
        format!("mysql://{}@{}:{}/{}", auth, self.host, self.port, self.name)
    }
}

/// How the HTTP client treats the API's TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    /// Verify against the system trust store.
    #[default]
    Verify,
    /// Verify against the system trust store plus an extra PEM root.
    CustomCa(PathBuf),
    /// Accept any certificate (insecure - use only for testing).
    AcceptInvalid,
}

impl TlsPolicy {
    pub fn from_flags(allow_self_signed_certs: bool, ca_cert: Option<PathBuf>) -> Self {
        match (allow_self_signed_certs, ca_cert) {
            (true, _) => TlsPolicy::AcceptInvalid,
            (false, Some(path)) => TlsPolicy::CustomCa(path),
            (false, None) => TlsPolicy::Verify,
        }
    }
}

/// Target API endpoint and Basic-auth credentials.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub tls: TlsPolicy,
}

impl ApiConfig {
    pub fn new(endpoint: &str, username: String, password: String, tls: TlsPolicy) -> Result<Self> {
        Ok(Self {
            base_url: parse_api_endpoint(endpoint)?,
            username,
            password,
            tls,
        })
    }
}

/// Parse the API base URL, normalising it to end with `/` so that relative
/// endpoint paths are appended rather than replacing the last segment.
pub fn parse_api_endpoint(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        bail!("API endpoint is empty. Set API_ENDPOINT or pass --api-endpoint");
    }
    let mut url =
        Url::parse(trimmed).with_context(|| format!("Invalid API endpoint URL: {}", trimmed))?;
    match url.scheme() {
        "http" | "https" => {}
        other => bail!("API endpoint must use http or https, got '{}'", other),
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Constants injected where a Kreezalid field has no source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PayloadDefaults {
    pub account_type: String,
    pub user_group_id: u64,
    pub currency: String,
    pub listing_title: String,
    pub order_type_id: u64,
}

impl Default for PayloadDefaults {
    fn default() -> Self {
        Self {
            account_type: "individual".to_string(),
            user_group_id: 845751,
            currency: "USD".to_string(),
            listing_title: "coaching".to_string(),
            order_type_id: 3,
        }
    }
}

impl PayloadDefaults {
    /// Load defaults from a TOML file. Keys that are absent keep their default value.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload config {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse payload config {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let defaults: PayloadDefaults = toml::from_str(contents)?;
        if defaults.currency.len() != 3 {
            bail!(
                "currency must be a 3-letter ISO code, got '{}'",
                defaults.currency
            );
        }
        Ok(defaults)
    }

    /// Load from `path` when given, otherwise use built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Everything a migration run needs.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub defaults: PayloadDefaults,
    pub journal_path: PathBuf,
}

/// Default location of the pending-mark journal, relative to the working directory.
pub fn default_journal_path() -> PathBuf {
    PathBuf::from(".kreezalid-migrator/pending-marks.json")
}
