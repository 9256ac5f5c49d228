use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("Unsupported AI provider: {0}. Available providers: {available}", available = ProviderKind::names().join(", "))]
    UnsupportedProvider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    /// Deterministic stand-in that never leaves the process.
    Echo,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gemini, ProviderKind::Echo];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Echo => "echo",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.as_str()).collect()
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or(ConfigError::UnsupportedProvider(wanted))
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide settings, loaded once at startup and shared read-only.
#[derive(Clone)]
pub struct Settings {
    pub api_keys: Vec<String>,
    pub model_provider: ProviderKind,
    pub model_api_key: Option<String>,
    pub model_name: String,
    pub gemini_base_url: String,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

// Keep secrets out of log lines.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_keys", &format_args!("[{} configured]", self.api_keys.len()))
            .field("model_provider", &self.model_provider)
            .field("model_api_key", &self.model_api_key.as_ref().map(|_| "***"))
            .field("model_name", &self.model_name)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("allowed_origins", &self.allowed_origins)
            .field("log_level", &self.log_level)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_keys = parse_api_keys(&var("API_KEY").unwrap_or_else(|| "test-api-key".to_string()));

        let model_provider = match var("MODEL_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => ProviderKind::Gemini,
        };

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 8000,
        };

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(raw) => parse_origins(&raw)?,
            None => vec!["*".to_string()],
        };

        Ok(Self {
            api_keys,
            model_provider,
            model_api_key: var("MODEL_API_KEY").map(|k| k.trim().to_string()),
            model_name: var("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            allowed_origins,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }

    pub fn is_valid_api_key(&self, candidate: &str) -> bool {
        self.api_keys.iter().any(|key| key == candidate)
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_api_keys(raw: &str) -> Vec<String> {
    if raw.contains(',') {
        raw.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    } else {
        vec![raw.to_string()]
    }
}

fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(vec!["*".to_string()]);
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| ConfigError::InvalidValue {
            name: "ALLOWED_ORIGINS",
            reason: e.to_string(),
        });
    }

    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect())
}
