use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::ClientSettings;
use crate::storage::{self, read_state::DEFAULT_READ_STATE_KEY};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const API_URL_ENV: &str = "MARKET_CHAT_API_URL";
pub const TOKEN_ENV: &str = "MARKET_CHAT_TOKEN";

const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub page_size: u32,
    pub data_dir: PathBuf,
    pub read_state_key: String,
    pub user_id: i64,
    pub sender_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            data_dir: PathBuf::from("data"),
            read_state_key: DEFAULT_READ_STATE_KEY.to_string(),
            user_id: 0,
            sender_name: String::new(),
        }
    }
}

impl AppConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chat.db")
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            user_id: self.user_id,
            sender_name: self.sender_name.clone(),
            page_size: self.page_size,
            read_state_key: self.read_state_key.clone(),
        }
    }

    /// Environment wins over the file for the API location.
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> AppConfig {
    let path = path.as_ref();
    let mut config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    };

    if config.page_size == 0 {
        log::warn!("page_size must be positive; using {DEFAULT_PAGE_SIZE}");
        config.page_size = DEFAULT_PAGE_SIZE;
    }
    config
}

/// Persist `config` as pretty JSON, creating the config directory on first
/// write.
pub fn save_config<P: AsRef<Path>>(path: P, config: &AppConfig) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        storage::ensure_data_dir(dir)?;
    }
    fs::write(path, serde_json::to_vec_pretty(config)?)?;
    log::info!("Saved config to {}", path.display());
    Ok(())
}
