use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use common::DEFAULT_FORBIDDEN_CHARS;
use serde::{Deserialize, Serialize};

use crate::external::Provider;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_COMPILATION_SUFFIX: &str = " - Topic";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    Mp3gain,
    Ffmpeg,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSourceConfig {
    pub id: String,
    pub provider: Provider,
    pub enabled: bool,
    pub url: String,
    pub user_agent: String,
}

impl Default for MetadataSourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            provider: Provider::MusicBrainz,
            enabled: true,
            url: String::new(),
            user_agent: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub token: String,
    pub channel_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub yt_dlp: String,
    pub mp3gain: String,
    pub ffmpeg: String,
    pub sox: String,
    pub fingerprint: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            mp3gain: "mp3gain".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            sox: "sox".to_string(),
            fingerprint: "echoprint-codegen".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub version: u32,
    pub playlist_id: String,
    pub archive_dir: String,
    pub work_dir: String,
    pub tracks_file: String,
    pub index_file: String,
    pub download_workers: usize,
    pub process_workers: usize,
    pub interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub forbidden_chars: String,
    pub compilation_suffix: String,
    pub normalizer: Normalizer,
    pub tools: ToolsConfig,
    pub metadata_sources: Vec<MetadataSourceConfig>,
    pub lookup_timeout_secs: u64,
    pub discord: DiscordConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            playlist_id: String::new(),
            archive_dir: "data/tracks".to_string(),
            work_dir: "work".to_string(),
            tracks_file: "data/tracks.json".to_string(),
            index_file: "data/tracks/playlist.m3u".to_string(),
            download_workers: DEFAULT_WORKERS,
            process_workers: DEFAULT_WORKERS,
            interval_secs: 0,
            proxy: None,
            forbidden_chars: DEFAULT_FORBIDDEN_CHARS.to_string(),
            compilation_suffix: DEFAULT_COMPILATION_SUFFIX.to_string(),
            normalizer: Normalizer::Mp3gain,
            tools: ToolsConfig::default(),
            metadata_sources: Vec::new(),
            lookup_timeout_secs: 8,
            discord: DiscordConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn proxy(&self) -> Option<&str> {
        self.proxy
            .as_deref()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("ARCHIVER_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

pub fn load_or_create_config(path: &Path) -> Result<(SyncConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&contents)?;
        return Ok((normalize_config(config), false));
    }

    let config = SyncConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

fn normalize_config(mut config: SyncConfig) -> SyncConfig {
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    config.playlist_id = config.playlist_id.trim().to_string();
    if config.download_workers == 0 {
        config.download_workers = DEFAULT_WORKERS;
    }
    if config.process_workers == 0 {
        config.process_workers = DEFAULT_WORKERS;
    }
    if config.forbidden_chars.is_empty() {
        config.forbidden_chars = DEFAULT_FORBIDDEN_CHARS.to_string();
    }
    if config.archive_dir.trim().is_empty() {
        config.archive_dir = "data/tracks".to_string();
    }
    if config.work_dir.trim().is_empty() {
        config.work_dir = "work".to_string();
    }
    if config.tracks_file.trim().is_empty() {
        config.tracks_file = "data/tracks.json".to_string();
    }
    if config.lookup_timeout_secs == 0 {
        config.lookup_timeout_secs = 8;
    }
    let defaults = ToolsConfig::default();
    let tools = &mut config.tools;
    for (value, fallback) in [
        (&mut tools.yt_dlp, defaults.yt_dlp),
        (&mut tools.mp3gain, defaults.mp3gain),
        (&mut tools.ffmpeg, defaults.ffmpeg),
        (&mut tools.sox, defaults.sox),
        (&mut tools.fingerprint, defaults.fingerprint),
    ] {
        if value.trim().is_empty() {
            *value = fallback;
        }
    }
    config
}

pub fn save_config(path: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
