use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "VOICE_JOURNAL_CONFIG";
pub const API_URL_ENV: &str = "VOICE_JOURNAL_API_URL";
pub const TOKEN_ENV: &str = "VOICE_JOURNAL_TOKEN";

const APP_DIR: &str = "voice-journal";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub timing: TimingConfig,
    pub playback: PlaybackConfig,
    pub community: CommunityConfig,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "http://localhost:8000/api".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub autosave_debounce_ms: u64,
    pub saved_ready_delay_ms: u64,
    pub selected_ready_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            autosave_debounce_ms: 1_000,
            saved_ready_delay_ms: 3_000,
            selected_ready_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub backend: BackendKind,
    /// Player invoked with the clip path appended as the last argument.
    pub player_command: Vec<String>,
    /// Speech engine invoked with the text appended as the last argument.
    pub speech_command: Vec<String>,
    pub clip_extension: String,
    pub resume_verify_ms: u64,
    pub max_restarts: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            backend: BackendKind::Remote,
            player_command: ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
                .into_iter()
                .map(String::from)
                .collect(),
            speech_command: vec!["espeak-ng".to_string()],
            clip_extension: "mp3".to_string(),
            resume_verify_ms: 500,
            max_restarts: 3,
        }
    }
}

impl PlaybackConfig {
    pub fn resume_verify(&self) -> Duration {
        Duration::from_millis(self.resume_verify_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub category: Option<String>,
    pub limit: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        CommunityConfig {
            category: Some("Control".to_string()),
            limit: 5,
        }
    }
}

impl Config {
    /// Loads from `VOICE_JOURNAL_CONFIG` or the platform config directory, then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);
        let mut config = match path {
            Some(path) => Config::from_file(&path)?,
            None => Config::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// A missing file is not an error; it yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.is_empty()) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|token| !token.is_empty()) {
            self.api.token = Some(token);
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(env::temp_dir)
                .join(APP_DIR)
                .join("voice-journal.log")
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}
