use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{
    ANALYSIS_INTERVAL_MS, APP_DIR_NAME, ATTENDANCE_LOG_INTERVAL_SECS, MIN_LOGIN_FACE_FRACTION,
    RATE_LIMIT_PAUSE_MS, RECOGNITION_CONFIDENCE_THRESHOLD, SESSION_COUNTDOWN_TICK_MS,
    SESSION_TIMEOUT_SECS, SESSION_WARNING_SECS, TRACK_IOU_THRESHOLD,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the reconciliation engine, scheduler and session monitor.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poll_interval_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub attendance_interval_secs: u64,
    pub iou_threshold: f64,
    pub session_timeout_secs: u64,
    pub session_warning_secs: u32,
    pub countdown_tick_ms: u64,
    pub recognition_threshold: f64,
    pub min_login_face_fraction: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: ANALYSIS_INTERVAL_MS,
            rate_limit_backoff_ms: RATE_LIMIT_PAUSE_MS,
            attendance_interval_secs: ATTENDANCE_LOG_INTERVAL_SECS,
            iou_threshold: TRACK_IOU_THRESHOLD,
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            session_warning_secs: SESSION_WARNING_SECS,
            countdown_tick_ms: SESSION_COUNTDOWN_TICK_MS,
            recognition_threshold: RECOGNITION_CONFIDENCE_THRESHOLD,
            min_login_face_fraction: MIN_LOGIN_FACE_FRACTION,
        }
    }
}

impl EngineConfig {
    /// Platform config location: `<config_dir>/FaceAttendance/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the platform config file if it exists, defaults otherwise.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.countdown_tick_ms == 0 {
            return Err(ConfigError::Invalid("countdown_tick_ms must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "iou_threshold must be in [0, 1), got {}",
                self.iou_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.recognition_threshold) {
            return Err(ConfigError::Invalid(format!(
                "recognition_threshold must be in [0, 1], got {}",
                self.recognition_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.min_login_face_fraction) {
            return Err(ConfigError::Invalid(format!(
                "min_login_face_fraction must be in [0, 1), got {}",
                self.min_login_face_fraction
            )));
        }
        if u64::from(self.session_warning_secs) >= self.session_timeout_secs {
            return Err(ConfigError::Invalid(
                "session_warning_secs must be shorter than session_timeout_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn attendance_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.attendance_interval_secs as i64)
    }

    /// Idle time before the warning countdown starts.
    pub fn inactivity_grace(&self) -> Duration {
        Duration::from_secs(
            self.session_timeout_secs
                .saturating_sub(u64::from(self.session_warning_secs)),
        )
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}
