//! Configuration for the xr-tracking runtime
//!
//! Every section is optional in the TOML file; missing fields fall back to
//! the values the tracking layer was tuned with.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "XR_TRACKING_CONFIG";

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub session: SessionConfig,
    pub hit_test: HitTestConfig,
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub bridge: BridgeConfig,
    pub frame: FrameConfig,
    pub logging: LoggingConfig,
}

/// Re-anchoring behaviour of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Age (ms) after which a fresh camera anchor is minted
    pub reanchor_interval_ms: f64,
    /// Number of camera anchors kept before the oldest is evicted
    pub camera_anchor_capacity: usize,
    /// Position of the camera anchor in the eye-level frame
    pub camera_anchor_offset: [f32; 3],
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reanchor_interval_ms: 60_000.0,
            camera_anchor_capacity: 10,
            camera_anchor_offset: [0.0, -1.0, 0.0],
        }
    }
}

/// CPU plane hit testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitTestConfig {
    /// Slack (meters) added to each plane half-extent
    pub extent_tolerance: f32,
}

impl Default for HitTestConfig {
    fn default() -> Self {
        Self {
            extent_tolerance: 0.0075,
        }
    }
}

/// Display projection defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub fov_y_degrees: f32,
    pub depth_near: f32,
    pub depth_far: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 70.0,
            depth_near: 0.1,
            depth_far: 1000.0,
        }
    }
}

/// Fallback camera used when frames come from a plain video source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 70.0,
            default_width: 640,
            default_height: 480,
        }
    }
}

/// Ambient light normalisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Native intensity that maps to 1.0
    pub neutral_intensity: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            neutral_intensity: 1000.0,
        }
    }
}

/// Data the native bridge is asked to stream while watching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub location: bool,
    pub camera: bool,
    pub objects: bool,
    pub light_intensity: bool,
    pub computer_vision_data: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            location: true,
            camera: true,
            objects: true,
            light_intensity: true,
            computer_vision_data: false,
        }
    }
}

/// Frame clock cadence for hosts without a native refresh signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub refresh_interval_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TrackingConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load with precedence: explicit path > env var > user config dir > defaults.
    ///
    /// A file that does not exist falls through to the next source; a file
    /// that exists but does not parse is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates = explicit
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .chain(Self::default_path());

        for path in candidates {
            if path.exists() {
                debug!("Loading tracking config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        debug!("No tracking config file found, using defaults");
        Ok(Self::default())
    }

    /// `<config dir>/config.toml` for this application
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "xr-tracking", "xr-tracking")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
