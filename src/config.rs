//! Configuration management for SnapStream
//!
//! Holds the tunables of the capture-encode-upload loop: server paths and
//! timeouts, tick cadence, JPEG quality and the camera pair used by `flip`.
//! The stream controller only ever receives a `StreamConfig` value; reading
//! it from disk is left to the binaries and plugin that embed it.

use crate::errors::StreamError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
}

/// Remote ingestion endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// URL prefilled for the operator
    pub default_url: String,
    /// Path probed before going live
    pub status_path: String,
    /// Path every frame is POSTed to
    pub upload_path: String,
    /// Pre-flight timeout in milliseconds
    pub status_timeout_ms: u64,
    /// Per-frame upload timeout in milliseconds
    pub upload_timeout_ms: u64,
}

/// Capture loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Tick cadence
    pub ticks_per_second: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Refresh the live status line every N delivered frames
    pub status_refresh_every: u64,
    /// Camera indices toggled by `flip` (front/back)
    pub camera_indices: [u32; 2],
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                default_url: "http://127.0.0.1:8888".to_string(),
                status_path: "/stream/video/status".to_string(),
                upload_path: "/stream/video".to_string(),
                status_timeout_ms: 3000,
                upload_timeout_ms: 2000,
            },
            capture: CaptureConfig {
                ticks_per_second: 20,
                jpeg_quality: 85,
                status_refresh_every: 30,
                camera_indices: [0, 1],
            },
        }
    }
}

impl ServerConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

impl CaptureConfig {
    /// Interval between two ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second.max(1)
    }
}

impl StreamConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            StreamError::ConfigFileError(format!("Failed to read config file: {}", e))
        })?;

        let config: StreamConfig = toml::from_str(&contents).map_err(|e| {
            StreamError::ConfigFileError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate().map_err(StreamError::ConfigFileError)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StreamError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StreamError::ConfigFileError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            StreamError::ConfigFileError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            StreamError::ConfigFileError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("snapstream.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if !self.server.status_path.starts_with('/') {
            return Err("Status path must start with '/'".to_string());
        }
        if !self.server.upload_path.starts_with('/') {
            return Err("Upload path must start with '/'".to_string());
        }
        if self.server.status_timeout_ms == 0 || self.server.upload_timeout_ms == 0 {
            return Err("Timeouts must be greater than zero".to_string());
        }

        if self.capture.ticks_per_second == 0 || self.capture.ticks_per_second > 60 {
            return Err("Tick rate must be between 1 and 60 per second".to_string());
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.capture.status_refresh_every == 0 {
            return Err("Status refresh interval must be at least 1 frame".to_string());
        }
        if self.capture.camera_indices[0] == self.capture.camera_indices[1] {
            return Err("Camera indices must differ".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.server.status_path, "/stream/video/status");
        assert_eq!(config.server.upload_path, "/stream/video");
        assert_eq!(config.server.status_timeout(), Duration::from_secs(3));
        assert_eq!(config.server.upload_timeout(), Duration::from_secs(2));
        assert_eq!(config.capture.ticks_per_second, 20);
        assert_eq!(config.capture.jpeg_quality, 85);
        assert_eq!(config.capture.status_refresh_every, 30);
    }

    #[test]
    fn test_tick_period() {
        let config = StreamConfig::default();
        assert_eq!(config.capture.tick_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_config_validation() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_rate = config.clone();
        bad_rate.capture.ticks_per_second = 0;
        assert!(bad_rate.validate().is_err());

        let mut bad_quality = StreamConfig::default();
        bad_quality.capture.jpeg_quality = 101;
        assert!(bad_quality.validate().is_err());

        let mut bad_path = StreamConfig::default();
        bad_path.server.upload_path = "stream/video".to_string();
        assert!(bad_path.validate().is_err());

        let mut same_cameras = StreamConfig::default();
        same_cameras.capture.camera_indices = [2, 2];
        assert!(same_cameras.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("snapstream.toml");

        let mut config = StreamConfig::default();
        config.capture.jpeg_quality = 70;
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = StreamConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let config = StreamConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[server]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("upload_path"));
        assert!(toml_string.contains("ticks_per_second"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("snapstream.toml");

        let mut config = StreamConfig::default();
        config.capture.ticks_per_second = 500;
        let toml_string = toml::to_string_pretty(&config).unwrap();
        fs::write(&config_path, toml_string).unwrap();

        let result = StreamConfig::load_from_file(&config_path);
        assert!(matches!(result, Err(StreamError::ConfigFileError(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = StreamConfig::load_from_file("nonexistent_snapstream.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().capture.ticks_per_second, 20);
    }
}
