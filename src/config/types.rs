use serde::Deserialize;

/// Main configuration structure for ICD Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
}

/// Remote API access configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Root linearization URL the crawl starts from
    pub release_url: String,

    /// Release tag stamped on every chapter record
    #[serde(default = "default_release_id")]
    pub release_id: String,

    /// Value of the Accept-Language header
    #[serde(default = "default_language")]
    pub language: String,

    /// Value of the API-Version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    /// Per-attempt request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Fetch child URLs published as http:// over https://
    #[serde(default = "default_true")]
    pub force_https: bool,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent worker tasks
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Attempts per fetch before the URL fails terminally
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each later attempt (milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Times an exhausted URL goes back to pending before it is abandoned
    #[serde(default = "default_requeue_limit")]
    pub requeue_limit: u32,

    /// Bound of the channel between workers and the record sink
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Log a progress line every N completed URLs
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            requeue_limit: default_requeue_limit(),
            channel_capacity: default_channel_capacity(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Classification tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassificationConfig {
    /// Title keywords marking a diagnosis as infectious
    #[serde(default = "default_infectious_keywords")]
    pub infectious_keywords: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            infectious_keywords: default_infectious_keywords(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Output file (jsonl, csv, sqlite) or directory (json)
    pub path: String,

    /// SQLite file holding resumable crawl state; in-memory when absent
    #[serde(default)]
    pub state_path: Option<String>,

    /// Markdown validation report written after the run
    #[serde(default)]
    pub report_path: Option<String>,
}

/// Supported record sink formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Json,
    Csv,
    Sqlite,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!(
                "unsupported output format '{}' (expected jsonl, json, csv or sqlite)",
                other
            )),
        }
    }
}

fn default_release_id() -> String {
    "2024-01".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_api_version() -> String {
    "v2".to_string()
}

fn default_token_url() -> String {
    "https://icdaccessmanagement.who.int/connect/token".to_string()
}

fn default_scope() -> String {
    "icdapi_access".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_requeue_limit() -> u32 {
    1
}

fn default_channel_capacity() -> usize {
    256
}

fn default_progress_interval() -> u64 {
    100
}

fn default_infectious_keywords() -> Vec<String> {
    ["infection", "infectious", "virus", "bacteria", "pathogen"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
