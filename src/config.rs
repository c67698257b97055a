use serde::Deserialize;

pub const DEFAULT_HOME: &str = "/home/user";
pub const DEFAULT_MODEL: &str = "gpt-4.1-2025-04-14";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024; // 1MB

/// Forces the execution mode instead of detecting it from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeOverride {
    Local,
    Remote,
}

impl ModeOverride {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(ModeOverride::Local),
            "remote" => Some(ModeOverride::Remote),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub home_dir: String,
    pub command_timeout_ms: u64,
    pub max_output_bytes: usize,
    pub recent_commands: usize,
    pub mode: Option<ModeOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            api_base: DEFAULT_API_BASE.into(),
            model: DEFAULT_MODEL.into(),
            home_dir: DEFAULT_HOME.into(),
            command_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT,
            recent_commands: 5,
            mode: None,
        }
    }
}

impl Config {
    /// Build a config from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any variable source. Unset or unparsable values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        cfg.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(base) = lookup("OPENAI_BASE_URL") {
            cfg.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("VIBE_MODEL") {
            cfg.model = model;
        }
        if let Some(home) = lookup("VIBE_HOME") {
            cfg.home_dir = home;
        }
        if let Some(ms) = lookup("VIBE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.command_timeout_ms = ms;
        }
        if let Some(bytes) = lookup("VIBE_MAX_OUTPUT").and_then(|v| v.parse().ok()) {
            cfg.max_output_bytes = bytes;
        }
        cfg.mode = lookup("VIBE_MODE").as_deref().and_then(ModeOverride::parse);
        cfg
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_json::from_str(json)
    }
}
