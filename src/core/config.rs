use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::api::provider::ReplyMode;

pub const DEFAULT_BASE_URL: &str = "https://api.minimax.chat/v1";
pub const DEFAULT_MODEL: &str = "MiniMax-M2.5";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3900";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3900/api/chat";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
/// Every outbound HTTP call carries an explicit timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Environment variable holding the provider bearer credential. Read at
/// request time; absence is a configuration error, never a retry.
pub const API_KEY_ENV: &str = "MAXWIN_API_KEY";

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Provider API base URL (OpenAI-style chat completions).
    pub provider_base_url: Option<String>,
    pub model: Option<String>,
    /// Fixed per deployment: how the relay returns replies to clients.
    pub reply_mode: Option<ReplyMode>,
    /// Persona template id (e.g. "advisor-v11"); newest when unset.
    pub persona: Option<String>,
    /// Knowledge excerpt file; a missing file degrades to an empty
    /// knowledge context.
    pub knowledge_file: Option<PathBuf>,
    pub listen_addr: Option<String>,
    /// Relay endpoint the chat client talks to.
    pub endpoint: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    fn get_config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("com", "maxwinwin", "maxwin")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    pub fn provider_base_url(&self) -> &str {
        self.provider_base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn reply_mode(&self) -> ReplyMode {
        self.reply_mode.unwrap_or(ReplyMode::Incremental)
    }

    pub fn listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Provider credential, read from the environment at call time so
    /// the server picks up rotation without a restart.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
    }

    /// Knowledge excerpt text. A missing or unreadable file is logged
    /// and degrades to empty; the turn proceeds persona-only.
    pub fn load_knowledge(&self) -> String {
        let Some(path) = &self.knowledge_file else {
            return String::new();
        };
        match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load knowledge file");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.reply_mode(), ReplyMode::Incremental);
        assert_eq!(config.request_timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn reply_mode_parses_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "reply_mode = \"buffered\"").unwrap();
        writeln!(file, "model = \"MiniMax-Text-01\"").unwrap();
        drop(file);

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.reply_mode(), ReplyMode::Buffered);
        assert_eq!(config.model(), "MiniMax-Text-01");
    }

    #[test]
    fn missing_knowledge_file_degrades_to_empty() {
        let config = Config {
            knowledge_file: Some(PathBuf::from("/nonexistent/knowledge.md")),
            ..Config::default()
        };
        assert_eq!(config.load_knowledge(), "");
    }
}
