//! Runtime configuration loaded from TOML with environment overrides

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::conference::ConferenceEntry;
use crate::error::ConfmanError;

/// Environment variable that overrides `redirect.seconds_before_redirect`
pub const SECONDS_BEFORE_REDIRECT_ENV: &str = "CONFMAN_SECONDS_BEFORE_REDIRECT";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redirect: RedirectConfig,
    pub asterisk: AsteriskConfig,
    /// Static directory entries
    pub contacts: Vec<ContactEntry>,
    /// Static conference catalog
    pub conferences: Vec<ConferenceEntry>,
}

/// Timing of the watch task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Give-up window for an unanswered call
    pub seconds_before_redirect: f64,
    /// Delay between two channel snapshots
    pub poll_interval_secs: f64,
    /// Share of the give-up window to wait before the first snapshot
    pub grace_fraction: f64,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            seconds_before_redirect: 30.0,
            poll_interval_secs: 1.0,
            grace_fraction: 0.2,
        }
    }
}

impl RedirectConfig {
    pub fn with_seconds_before_redirect(seconds: f64) -> Self {
        Self {
            seconds_before_redirect: seconds,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.seconds_before_redirect)
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_secs_f64(self.seconds_before_redirect * self.grace_fraction)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfmanError> {
        if !(self.seconds_before_redirect.is_finite() && self.seconds_before_redirect > 0.0) {
            return Err(ConfmanError::Config(
                "seconds_before_redirect must be positive".into(),
            ));
        }
        if !(self.poll_interval_secs.is_finite() && self.poll_interval_secs > 0.0) {
            return Err(ConfmanError::Config(
                "poll_interval_secs must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.grace_fraction) {
            return Err(ConfmanError::Config(
                "grace_fraction must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// How to reach the Asterisk instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsteriskConfig {
    /// Path of the `asterisk` executable used for `-rx` commands
    pub binary: PathBuf,
    /// Call-file spool directory watched by Asterisk
    pub spool_dir: PathBuf,
    /// Where call files are written before being renamed into the spool.
    /// Must be on the same filesystem as `spool_dir`.
    pub staging_dir: PathBuf,
    /// Dialplan context used for outbound legs
    pub dialout_context: String,
    pub max_retries: u32,
    pub retry_time: u32,
    pub wait_time: u32,
}

impl Default for AsteriskConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("asterisk"),
            spool_dir: PathBuf::from("/var/spool/asterisk/outgoing"),
            staging_dir: PathBuf::from("/var/spool/asterisk/tmp"),
            dialout_context: "confman-dialout".into(),
            max_retries: 0,
            retry_time: 300,
            wait_time: 45,
        }
    }
}

/// A contact declared in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Phone of the contact this one backs up
    #[serde(default)]
    pub superior: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).with_context(|| {
                format!("Failed to parse TOML config file: {}", path.display())
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            }
        };

        config.finish(env::var(SECONDS_BEFORE_REDIRECT_ENV).ok().as_deref())
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply the `CONFMAN_SECONDS_BEFORE_REDIRECT` value, if any, then validate
    fn finish(mut self, seconds_before_redirect: Option<&str>) -> anyhow::Result<Self> {
        if let Some(raw) = seconds_before_redirect.filter(|raw| !raw.is_empty()) {
            self.redirect.seconds_before_redirect = raw.trim().parse().with_context(|| {
                format!("{SECONDS_BEFORE_REDIRECT_ENV} is not a number: {raw}")
            })?;
        }
        self.redirect.validate()?;
        Ok(self)
    }
}
