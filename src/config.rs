use std::path::PathBuf;

use teloxide::types::ChatId;
use thiserror::Error;

use crate::kinopoisk::DEFAULT_API_URL;
use crate::scraper::site::DEFAULT_BASE_URL;

const DEFAULT_DATABASE_URL: &str = "sqlite://movies.db";
/// Потолок загрузки файла через облачный Bot API.
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is missing")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: Option<String>,
    /// Канал-хранилище, куда заливаются видео.
    pub channel_id: ChatId,
    pub kinopoisk_token: Option<String>,
    pub kinopoisk_api_url: String,
    pub database_url: String,
    pub site_url: String,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub max_browser_sessions: usize,
    pub download_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("BOT_TOKEN")
            .or_else(|| var("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let channel = var("CHANNEL_ID").ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        let channel_id = channel
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| ConfigError::Invalid { key: "CHANNEL_ID", value: channel })?;

        Ok(Self {
            bot_token,
            telegram_api_url: var("TELEGRAM_API_URL"),
            channel_id,
            kinopoisk_token: var("KINOPOISK_TOKEN"),
            kinopoisk_api_url: var("KINOPOISK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            site_url: var("ZONA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            headless: parse_or("HEADLESS", var("HEADLESS"), true, parse_bool)?,
            chrome_path: var("CHROME_PATH").map(PathBuf::from),
            max_browser_sessions: parse_or("MAX_BROWSER_SESSIONS", var("MAX_BROWSER_SESSIONS"), 2, |v| {
                v.parse::<usize>().ok().filter(|n| *n > 0)
            })?,
            download_dir: var("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", var("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES, |v| {
                v.parse::<u64>().ok().filter(|n| *n > 0)
            })?,
            accept_invalid_certs: parse_or("ACCEPT_INVALID_CERTS", var("ACCEPT_INVALID_CERTS"), false, parse_bool)?,
        })
    }
}

fn parse_or<T>(
    key: &'static str,
    raw: Option<String>,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => parse(&v).ok_or(ConfigError::Invalid { key, value: v }),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
