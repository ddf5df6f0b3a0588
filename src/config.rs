//! TOML settings file.
//!
//! Every section falls back to its defaults, so a partial file (or none at
//! all) is valid. A missing file is created with the defaults on first start.

use crate::dispatch::DispatchSettings;
use crate::idle::IdleSettings;
use crate::runtime::ScrollerSettings;
use crate::sampler::SamplerSettings;
use crate::scroll::ResolutionSettings;
use crate::sensor::SensorSettings;
use crate::transport::{WiredSettings, WirelessSettings};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "SCROLLER_CONFIG";
const CONFIG_DIR: &str = ".config/scroller";
const CONFIG_FILE: &str = "scroller.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub thread_ids: bool,
    pub file_and_line: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            thread_ids: true,
            file_and_line: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub sampler: SamplerSettings,
    pub resolution: ResolutionSettings,
    pub dispatch: DispatchSettings,
    pub idle: IdleSettings,
    pub sensor: SensorSettings,
    pub wired: WiredSettings,
    pub wireless: WirelessSettings,
}

impl Settings {
    /// `$SCROLLER_CONFIG`, else `~/.config/scroller/scroller.toml`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load_or_create(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check config file {}: {}", path.display(), e))?;

        if !exists {
            let settings = Settings::default();
            settings.save(path).await?;
            info!("Wrote default settings to {}", path.display());
            return Ok(settings);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let settings = Self::from_toml(&content)?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolution.coarse_divisor <= 0 || self.resolution.fine_divisor <= 0 {
            return Err(eyre!(
                "Resolution divisors must be positive (coarse {}, fine {})",
                self.resolution.coarse_divisor,
                self.resolution.fine_divisor
            ));
        }
        if self.sampler.period_ms == 0 {
            return Err(eyre!("Sampler period must be at least 1 ms"));
        }
        if self.idle.period_ms == 0 {
            return Err(eyre!("Idle poll period must be at least 1 ms"));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(eyre!("Dispatch queue capacity must be at least 1"));
        }
        if self.wireless.enabled && self.wireless.report_buffer == 0 {
            return Err(eyre!("Wireless report buffer must hold at least 1 report"));
        }
        Ok(())
    }

    pub fn scroller(&self) -> ScrollerSettings {
        ScrollerSettings {
            sampler: self.sampler.clone(),
            resolution: self.resolution.clone(),
            dispatch: self.dispatch.clone(),
            idle: self.idle.clone(),
        }
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
