use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::catalog::stats::DEFAULT_TARGET_CLIPS;
use crate::catalog::store::Credentials;
use crate::waveform::PLAYER_SAMPLES;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub waveform: WaveformConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub users: Vec<Credentials>,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct WaveformConfig {
    #[serde(default = "default_samples")]
    pub samples: usize,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_dpr")]
    pub dpr: f32,
    #[serde(default = "default_played")]
    pub played: String,
    #[serde(default = "default_unplayed")]
    pub unplayed: String,
}

#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_team")]
    pub team: Vec<String>,
    #[serde(default = "default_target_clips")]
    pub target_clips: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            users: Vec::new(),
            signed_url_ttl_secs: default_signed_url_ttl(),
        }
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            samples: default_samples(),
            width: default_width(),
            height: default_height(),
            dpr: default_dpr(),
            played: default_played(),
            unplayed: default_unplayed(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            team: default_team(),
            target_clips: default_target_clips(),
        }
    }
}

pub const DEFAULT_STORE_ROOT: &str = "emoclip-data";

fn default_root() -> PathBuf { PathBuf::from(DEFAULT_STORE_ROOT) }
fn default_signed_url_ttl() -> u64 { 3600 }
fn default_samples() -> usize { PLAYER_SAMPLES }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 80 }
fn default_dpr() -> f32 { 1.0 }
fn default_played() -> String { "#667eea".into() }
fn default_unplayed() -> String { "#cccccc".into() }
fn default_target_clips() -> usize { DEFAULT_TARGET_CLIPS }
fn default_team() -> Vec<String> {
    ["Ömer", "Hüseyin", "Hossein", "Celina", "Faruk"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Explicit path, else `emoclip.toml` in the working directory, else
/// `~/.config/emoclip/config.toml`, else the platform config dir.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("emoclip.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("emoclip").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("emoclip").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}
