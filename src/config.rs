//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding and database location
//! - Points rates and streak milestones
//! - Expiration windows and the maintenance schedule
//! - The PIN salt
//!
//! The embedded `config.toml` is the fallback when no file exists on disk.
//! `LOYALTY_HOST`, `LOYALTY_PORT`, `LOYALTY_DB` and `LOYALTY_PIN_SALT`
//! override the loaded values; `LOYALTY_CONFIG` points at another file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::expiration::ExpirationPolicy;
use crate::money::Percent;
use crate::points::{PointsCalculator, BASE_POINTS_RATE, REFERRAL_REWARD_SHARE};
use crate::streaks::{default_milestones, StreakMilestone};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub streaks: StreaksConfig,
    #[serde(default)]
    pub expiration: ExpirationPolicy,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub pin: PinConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, created on first start
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "loyalty.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    pub base_rate_percent: Percent,
    pub referral_share_percent: Percent,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            base_rate_percent: BASE_POINTS_RATE,
            referral_share_percent: REFERRAL_REWARD_SHARE,
        }
    }
}

impl PointsConfig {
    pub fn calculator(&self) -> PointsCalculator {
        PointsCalculator::new(self.base_rate_percent, self.referral_share_percent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreaksConfig {
    pub milestones: Vec<StreakMilestone>,
}

impl Default for StreaksConfig {
    fn default() -> Self {
        Self {
            milestones: default_milestones(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    #[serde(default)]
    pub initial_delay_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            initial_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    pub salt: String,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            salt: "wad_salt_2024".to_string(),
        }
    }
}

impl Config {
    /// Load from `LOYALTY_CONFIG` or config.toml, then apply env overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var("LOYALTY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_file(path)
    }

    /// Load a specific file with env overrides applied and validated
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    fn apply_env(&mut self) {
        if let Some(host) = non_empty_env("LOYALTY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_env("LOYALTY_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(db) = non_empty_env("LOYALTY_DB") {
            self.database.path = db;
        }
        if let Some(salt) = non_empty_env("LOYALTY_PIN_SALT") {
            self.pin.salt = salt;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.points.base_rate_percent.is_valid_percentage()
            || !self.points.referral_share_percent.is_valid_percentage()
        {
            anyhow::bail!("points rates must be between 0 and 100 percent");
        }
        if self.streaks.milestones.iter().any(|m| m.days == 0) {
            anyhow::bail!("streak milestones need a positive day count");
        }
        let e = &self.expiration;
        if e.inactivity_days == 0 || e.critical_days > e.warning_days {
            anyhow::bail!("expiration windows are inconsistent");
        }
        if self.maintenance.enabled && self.maintenance.interval_secs == 0 {
            anyhow::bail!("maintenance interval must be positive");
        }
        if self.pin.salt.is_empty() {
            anyhow::bail!("PIN salt must not be empty");
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            points: PointsConfig::default(),
            streaks: StreaksConfig::default(),
            expiration: ExpirationPolicy::default(),
            maintenance: MaintenanceConfig::default(),
            pin: PinConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Points;

    #[test]
    fn test_embedded_default_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.points.base_rate_percent, Percent::from_whole(10));
        assert_eq!(config.streaks.milestones, default_milestones());
        assert_eq!(config.expiration, ExpirationPolicy::default());
        assert_eq!(config.pin.salt, "wad_salt_2024");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::load_from("/nonexistent/loyalty.toml").unwrap();
        assert_eq!(config.database.path, "loyalty.db");
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 9000

[[streaks.milestones]]
days = 3
bonus = 20
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.streaks.milestones.len(), 1);
        assert_eq!(config.streaks.milestones[0].bonus, Points::from_whole(20));
        assert_eq!(config.points.referral_share_percent, Percent::from_whole(25));
        assert!(config.maintenance.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.points.base_rate_percent = Percent::from_whole(150);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.expiration.critical_days = 60;
        assert!(config.validate().is_err());
    }
}
