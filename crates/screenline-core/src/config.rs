//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Screenline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephony: Option<TelephonyConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<CallConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// HTTP + media-stream server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Public base URL the telephony provider reaches this service at
    /// (e.g. "https://screen.example.com"). The media-stream URL in the
    /// call-control markup is derived from it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: None,
            public_url: None,
        }
    }
}

/// Conversational speech engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// WebSocket endpoint of the speech engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Realtime model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Output voice identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Speech-to-text model used for caller transcription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_model: Option<String>,

    /// Language hint for transcription (e.g. "es").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl EngineConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()))
    }
}

/// Telephony provider account, used only for the terminate-call action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_env: Option<String>,

    /// REST API base (default: "https://api.twilio.com").
    #[serde(default = "default_telephony_api_url")]
    pub api_url: String,
}

fn default_telephony_api_url() -> String {
    "https://api.twilio.com".into()
}

impl TelephonyConfig {
    pub fn resolve_auth_token(&self) -> Option<String> {
        resolve_secret_field(&self.auth_token, &self.auth_token_env)
    }
}

/// Per-call behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// How long to wait for the hangup mark echo before terminating
    /// the call anyway (default: 6000).
    #[serde(default = "default_hangup_fallback_ms")]
    pub hangup_fallback_ms: u64,
}

fn default_hangup_fallback_ms() -> u64 {
    6_000
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            hangup_fallback_ms: default_hangup_fallback_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "screenline_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::ScreenlineError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::ScreenlineError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location: `~/.screenline/config.json`.
    pub fn config_path() -> PathBuf {
        let dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".screenline");
        let expanded = shellexpand::tilde(&dir.to_string_lossy().into_owned()).into_owned();
        PathBuf::from(expanded).join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    pub fn public_url(&self) -> Option<&str> {
        self.gateway
            .as_ref()
            .and_then(|g| g.public_url.as_deref())
    }

    pub fn hangup_fallback_ms(&self) -> u64 {
        self.call
            .as_ref()
            .map(|c| c.hangup_fallback_ms)
            .unwrap_or_else(default_hangup_fallback_ms)
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let engine = self.engine.clone().unwrap_or_default();
        if engine.resolve_api_key().is_none() {
            warnings.push("No speech engine API key configured".to_string());
        }

        match &self.telephony {
            Some(t) => {
                if t.account_sid.is_none() || t.resolve_auth_token().is_none() {
                    warnings.push(
                        "Telephony credentials incomplete; call termination will be skipped"
                            .to_string(),
                    );
                }
            }
            None => warnings.push(
                "No telephony account configured; call termination will be skipped".to_string(),
            ),
        }

        if self.public_url().is_none() {
            errors.push("gateway.public_url is required to build the media-stream URL".to_string());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }
}
