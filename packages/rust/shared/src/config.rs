//! Application configuration for Wisdom.
//!
//! User config lives at `~/.wisdom/wisdom.toml`.
//! CLI flags override environment variables, which override config file
//! values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WisdomError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wisdom.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wisdom";

/// Page ceiling used when `--pagelimit` is not given. Large enough to mean
/// "every page" for any real knowledge base.
pub const DEFAULT_PAGE_LIMIT: u32 = 10_001;

/// Environment variable overriding `[oauth] token_host`.
pub const ENV_TOKEN_HOST: &str = "TOKEN_HOST";
/// Environment variable overriding `[oauth] token_path`.
pub const ENV_TOKEN_PATH: &str = "TOKEN_PATH";
/// Environment variable overriding `[export] output_dir`.
pub const ENV_OUTPUT_DIR: &str = "DIR_ARTICLEDATA";

// ---------------------------------------------------------------------------
// Config structs (matching wisdom.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// OAuth token endpoint settings.
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Export behaviour.
    #[serde(default)]
    pub export: ExportDefaults,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Instance URL used when the token response does not carry one.
    #[serde(default = "default_instance_url")]
    pub instance_url: String,

    /// REST API version segment, e.g. `v41.0`.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Articles requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            instance_url: default_instance_url(),
            api_version: default_api_version(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_instance_url() -> String {
    "https://login.salesforce.com".into()
}
fn default_api_version() -> String {
    "v41.0".into()
}
fn default_page_size() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[oauth]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Token endpoint host, e.g. `https://login.salesforce.com`.
    #[serde(default = "default_token_host")]
    pub token_host: String,

    /// Token endpoint path.
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Name of the env var holding the client id (never store the id itself).
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    /// Name of the env var holding the client secret.
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_host: default_token_host(),
            token_path: default_token_path(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
        }
    }
}

fn default_token_host() -> String {
    "https://login.salesforce.com".into()
}
fn default_token_path() -> String {
    "/services/oauth2/token".into()
}
fn default_client_id_env() -> String {
    "CLIENT_ID".into()
}
fn default_client_secret_env() -> String {
    "CLIENT_SECRET".into()
}

/// `[export]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Root directory of the export tree.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Tasks in flight per stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Delay after each task, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// CSV files augmented in parallel.
    #[serde(default = "default_augment_concurrency")]
    pub augment_concurrency: u32,

    /// CSV column holding the article id used to join metadata.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Download images referenced from rich-text fields.
    #[serde(default = "default_true")]
    pub fetch_images: bool,

    /// Follow the master-version links to the article record.
    #[serde(default = "default_true")]
    pub fetch_master_record: bool,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            delay_ms: default_delay_ms(),
            augment_concurrency: default_augment_concurrency(),
            id_column: default_id_column(),
            fetch_images: true,
            fetch_master_record: true,
        }
    }
}

fn default_output_dir() -> String {
    "articledata".into()
}
fn default_concurrency() -> u32 {
    1
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_augment_concurrency() -> u32 {
    1
}
fn default_id_column() -> String {
    "KnowledgeArticleId".into()
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Apply environment overrides using the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides through an arbitrary lookup.
    pub fn apply_env_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(host) = non_empty(ENV_TOKEN_HOST) {
            self.oauth.token_host = host;
        }
        if let Some(path) = non_empty(ENV_TOKEN_PATH) {
            self.oauth.token_path = path;
        }
        if let Some(dir) = non_empty(ENV_OUTPUT_DIR) {
            self.export.output_dir = dir;
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime export configuration.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Root of the export tree.
    pub output_root: PathBuf,
    /// Articles per listing page.
    pub page_size: u32,
    /// Inclusive ceiling on listing pages fetched.
    pub page_limit: u32,
    /// Tasks in flight for describe, article and image stages.
    pub concurrency: u32,
    /// Delay after each task, in milliseconds.
    pub delay_ms: u64,
    /// CSV files augmented in parallel.
    pub augment_concurrency: u32,
    /// Column used to join rows with metadata.
    pub id_column: String,
    /// Whether the image stage runs.
    pub fetch_images: bool,
    /// Whether the master record is looked up per article.
    pub fetch_master_record: bool,
    /// Tool version recorded in the export manifest.
    pub tool_version: String,
}

impl From<&AppConfig> for ExportConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_root: expand_home(&config.export.output_dir),
            page_size: config.api.page_size,
            page_limit: DEFAULT_PAGE_LIMIT,
            concurrency: config.export.concurrency,
            delay_ms: config.export.delay_ms,
            augment_concurrency: config.export.augment_concurrency,
            id_column: config.export.id_column.clone(),
            fetch_images: config.export.fetch_images,
            fetch_master_record: config.export.fetch_master_record,
            tool_version: String::new(),
        }
    }
}

/// OAuth client credentials resolved from the environment.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Resolve the OAuth client id/secret from the env vars named in config.
pub fn client_credentials(config: &OAuthConfig) -> Result<ClientCredentials> {
    client_credentials_with(config, |name| std::env::var(name).ok())
}

/// Resolve the OAuth client id/secret through an arbitrary lookup.
pub fn client_credentials_with(
    config: &OAuthConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientCredentials> {
    let read = |var: &str| match lookup(var) {
        Some(val) if !val.is_empty() => Ok(val),
        _ => Err(WisdomError::config(format!(
            "OAuth client credential not found. Set the {var} environment variable."
        ))),
    };

    Ok(ClientCredentials {
        client_id: read(&config.client_id_env)?,
        client_secret: read(&config.client_secret_env)?,
    })
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wisdom/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| WisdomError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.wisdom/wisdom.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WisdomError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| WisdomError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WisdomError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WisdomError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WisdomError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
