use crate::client::MeetingInfo;
use crate::defaults;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub transport: TransportParams,
    pub meeting: MeetingConfig,
}

/// Audio parameters shared read-only by the ingest and the egress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportParams {
    pub audio_out_enabled: bool,
    pub audio_out_sample_rate: u32,
    pub audio_out_channels: u16,
    pub audio_in_enabled: bool,
    pub audio_in_sample_rate: u32,
    pub audio_in_channels: u16,
    /// Capacity of the pipeline intake queue in frames.
    pub audio_in_queue_frames: usize,
    /// Upper bound on how long a native delivery waits for intake capacity.
    /// `None` blocks until the pipeline accepts the frame.
    pub audio_in_handoff_timeout_ms: Option<u64>,
}

/// Meeting connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeetingConfig {
    pub auth_token: Option<String>,
    pub api_base: Option<String>,
    pub enable_audio: bool,
    pub enable_video: bool,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            audio_out_enabled: true,
            audio_out_sample_rate: defaults::SAMPLE_RATE,
            audio_out_channels: defaults::AUDIO_OUT_CHANNELS,
            audio_in_enabled: true,
            audio_in_sample_rate: defaults::SAMPLE_RATE,
            audio_in_channels: defaults::AUDIO_IN_CHANNELS,
            audio_in_queue_frames: defaults::AUDIO_IN_QUEUE_FRAMES,
            audio_in_handoff_timeout_ms: None,
        }
    }
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            api_base: None,
            enable_audio: true,
            enable_video: true,
        }
    }
}

impl TransportParams {
    /// Handoff timeout as a `Duration`, if one is configured.
    pub fn handoff_timeout(&self) -> Option<Duration> {
        self.audio_in_handoff_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio_in_queue_frames == 0 {
            return Err(BridgeError::ConfigInvalidValue {
                key: "transport.audio_in_queue_frames".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (key, value) in [
            ("transport.audio_in_sample_rate", self.audio_in_sample_rate),
            ("transport.audio_out_sample_rate", self.audio_out_sample_rate),
        ] {
            if value == 0 {
                return Err(BridgeError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be positive".to_string(),
                });
            }
        }
        for (key, value) in [
            ("transport.audio_in_channels", self.audio_in_channels),
            ("transport.audio_out_channels", self.audio_out_channels),
        ] {
            if value == 0 {
                return Err(BridgeError::ConfigInvalidValue {
                    key: key.to_string(),
                    message: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl MeetingConfig {
    /// Build the connection parameters handed to the meeting client.
    ///
    /// Token and API base are opaque startup inputs; both must be present.
    pub fn meeting_info(&self) -> Result<MeetingInfo> {
        let auth_token = non_empty(self.auth_token.as_deref()).ok_or_else(|| {
            BridgeError::ConfigInvalidValue {
                key: "meeting.auth_token".to_string(),
                message: "must be set (or ROOMBRIDGE_AUTH_TOKEN)".to_string(),
            }
        })?;
        let base_url = non_empty(self.api_base.as_deref()).ok_or_else(|| {
            BridgeError::ConfigInvalidValue {
                key: "meeting.api_base".to_string(),
                message: "must be set (or ROOMBRIDGE_API_BASE)".to_string(),
            }
        })?;

        Ok(MeetingInfo {
            auth_token: auth_token.to_string(),
            enable_audio: self.enable_audio,
            enable_video: self.enable_video,
            base_url: base_url.to_string(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BridgeError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => BridgeError::Io(e),
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only falls back to defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(BridgeError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - ROOMBRIDGE_AUTH_TOKEN → meeting.auth_token
    /// - ROOMBRIDGE_API_BASE → meeting.api_base
    /// - ROOMBRIDGE_HANDOFF_TIMEOUT → transport.audio_in_handoff_timeout_ms ("250ms", "1s")
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(token) = std::env::var("ROOMBRIDGE_AUTH_TOKEN")
            && !token.is_empty()
        {
            self.meeting.auth_token = Some(token);
        }

        if let Ok(base) = std::env::var("ROOMBRIDGE_API_BASE")
            && !base.is_empty()
        {
            self.meeting.api_base = Some(base);
        }

        if let Ok(timeout) = std::env::var("ROOMBRIDGE_HANDOFF_TIMEOUT")
            && !timeout.is_empty()
        {
            let duration = parse_duration_ms(&timeout).map_err(|message| {
                BridgeError::ConfigInvalidValue {
                    key: "ROOMBRIDGE_HANDOFF_TIMEOUT".to_string(),
                    message,
                }
            })?;
            self.transport.audio_in_handoff_timeout_ms = Some(duration);
        }

        Ok(self)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/roombridge/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("roombridge").join("config.toml"))
    }
}

/// Parse a duration such as `250ms`, `2s` or a bare number of milliseconds.
pub fn parse_duration_ms(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| e.to_string())
}
