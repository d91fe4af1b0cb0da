//! Runtime configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "google-ai-studio/gemini-2.5-flash";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 1;

/// Markers left in template configs that mean "not filled in yet"
const PLACEHOLDER_BASE_URL: &str = "YOUR_ACCOUNT_ID";
const PLACEHOLDER_API_KEY: &str = "your-cloudflare-api-key";

#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI-compatible gateway base URL (`CF_AI_BASE_URL`)
    pub base_url: Option<String>,
    /// Gateway API key (`CF_AI_API_KEY`)
    pub api_key: Option<String>,
    pub default_model: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = get("CLARITY_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".clarity-chat").join("sessions.db")
            },
            PathBuf::from,
        );

        Self {
            base_url: get("CF_AI_BASE_URL"),
            api_key: get("CF_AI_API_KEY"),
            default_model: get("CLARITY_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            port: get("CLARITY_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            db_path,
            llm_timeout: Duration::from_secs(
                get("CLARITY_LLM_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            llm_max_retries: get("CLARITY_LLM_MAX_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
        }
    }

    /// Whether real gateway credentials are present
    pub fn is_configured(&self) -> bool {
        match (&self.base_url, &self.api_key) {
            (Some(url), Some(key)) => {
                !url.contains(PLACEHOLDER_BASE_URL) && !key.contains(PLACEHOLDER_API_KEY)
            }
            _ => false,
        }
    }
}
