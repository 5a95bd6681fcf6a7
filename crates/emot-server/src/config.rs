//! Server configuration.
//!
//! Resolution order, highest first:
//!
//! 1. Environment variables (`EMOT_*`, `OPENAI_API_KEY`, `ELEVENLABS_API_KEY`)
//! 2. `<data_dir>/config.toml`
//! 3. Built-in defaults rooted at the data directory
//!
//! The data directory is `EMOT_DIR` if set, otherwise `~/.emot`.

use anyhow::Context;
use emot_core::{LlmConfig, SessionConfig, VoiceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address (default: 127.0.0.1)
    pub host: String,
    /// Port (default: 5100)
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5100,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory holding sessions, audio cache and config file
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,
    pub server: ServerSettings,
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
}

impl Config {
    /// Defaults with every path under `data_dir`.
    pub fn defaults_in(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            config_path: data_dir.join("config.toml"),
            server: ServerSettings::default(),
            session: SessionConfig::in_dir(data_dir),
            llm: LlmConfig::default(),
            voice: VoiceConfig {
                audio_cache_dir: data_dir.join("audio_cache"),
                ..Default::default()
            },
        }
    }

    /// Load configuration from file, environment and defaults
    ///
    /// Standard directory structure:
    /// ```text
    /// ~/.emot/
    /// ├── config.toml               # Optional configuration
    /// ├── audio_cache/              # Synthesized speech (<sha256>.mp3)
    /// └── sessions/
    ///     ├── conversations.db      # SQLite message store
    ///     ├── <id>_metadata.json    # Session metadata
    ///     └── <id>_messages.json    # Fallback message store
    /// ```
    pub fn load() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir(std::env::var("EMOT_DIR").ok());
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Self::load_from(&data_dir, |key| std::env::var(key).ok())
    }

    /// Load with an explicit data directory and environment lookup.
    pub fn load_from(
        data_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::defaults_in(data_dir);

        let path = config.config_path.clone();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            config = config
                .merge_toml(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
        }

        config.apply_env(env)?;
        Ok(config)
    }

    /// Overlay a TOML document onto this config. Keys absent from the
    /// document keep their current values.
    fn merge_toml(self, content: &str) -> anyhow::Result<Self> {
        let overlay: toml::Table = content.parse()?;
        let mut base = match toml::Value::try_from(&self)? {
            toml::Value::Table(table) => table,
            other => anyhow::bail!("config serialized to a {} instead of a table", other.type_str()),
        };
        merge_tables(&mut base, overlay);

        let mut merged: Config = toml::Value::Table(base).try_into()?;
        merged.data_dir = self.data_dir;
        merged.config_path = self.config_path;
        // Secrets are never serialized into the base table.
        merged.llm.api_key = merged.llm.api_key.or(self.llm.api_key);
        merged.voice.transcription_api_key = merged
            .voice
            .transcription_api_key
            .or(self.voice.transcription_api_key);
        merged.voice.elevenlabs_api_key = merged
            .voice
            .elevenlabs_api_key
            .or(self.voice.elevenlabs_api_key);
        Ok(merged)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("EMOT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_var(&var, "EMOT_PORT")? {
            self.server.port = port;
        }
        if let Some(path) = var("EMOT_DATABASE_PATH") {
            self.session.database_path = PathBuf::from(path);
        }
        if let Some(max_history) = parse_var(&var, "EMOT_MAX_HISTORY")? {
            self.session.max_history = max_history;
        }
        if let Some(timeout) = parse_var(&var, "EMOT_SESSION_TIMEOUT_SECS")? {
            self.session.session_timeout_secs = timeout;
        }
        if let Some(interval) = parse_var(&var, "EMOT_CLEANUP_INTERVAL_SECS")? {
            self.session.cleanup_interval_secs = interval;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("EMOT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = var("ELEVENLABS_API_KEY") {
            self.voice.elevenlabs_api_key = Some(key);
        }
        if let Some(voice) = var("EMOT_VOICE") {
            self.voice.voice = voice;
        }
        if let Some(dir) = var("EMOT_AUDIO_CACHE_DIR") {
            self.voice.audio_cache_dir = PathBuf::from(dir);
        }

        // Transcription shares the OpenAI account unless configured apart.
        if self.voice.transcription_api_key.is_none() {
            self.voice.transcription_api_key = self.llm.api_key.clone();
        }
        Ok(())
    }

    /// Check the configuration before any component is built.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;
        self.llm.validate()?;
        if self.server.host.trim().is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// `EMOT_DIR` when set, otherwise `~/.emot`.
pub fn resolve_data_dir(emot_dir: Option<String>) -> PathBuf {
    match emot_dir.filter(|d| !d.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".emot"),
    }
}

fn parse_var<T>(var: impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid value for {}", key))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
