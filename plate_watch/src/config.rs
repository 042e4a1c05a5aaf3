//! Application configuration
//!
//! Every section has a `Default`, so a TOML file only needs the keys it
//! wants to change.

use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

use crate::matcher::MatchPolicy;
use crate::matcher::DEFAULT_THRESHOLD;
use crate::PlateError;
use crate::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub localizer: LocalizerConfig,
    pub ocr: OcrConfig,
    pub matcher: MatcherConfig,
    pub registry: RegistryConfig,
    pub notify: NotifyConfig,
    pub location: LocationConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Whether a match should reopen the source. A video file would replay
    /// from the start and match the same plate again, so only live sources
    /// restart.
    pub fn restarts_after_match(&self) -> bool {
        self.pipeline.restart_after_match && self.source.is_live()
    }
}

/// Where frames come from. `uri` wins over `device` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Capture device index
    pub device: i32,
    /// Video file path or stream URL
    pub uri: Option<String>,
    /// Optional frame rate cap
    pub max_fps: Option<u32>,
}

impl SourceConfig {
    /// A capture device or a network stream, as opposed to a file on disk.
    pub fn is_live(&self) -> bool {
        match &self.uri {
            None => true,
            Some(uri) => uri.contains("://"),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: 0,
            uri: None,
            max_fps: None,
        }
    }
}

/// Geometry heuristics of the contour localizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Frames are resized to this width before edge detection
    pub working_width: i32,
    /// Gaussian kernel size, must be odd
    pub blur_kernel: i32,
    pub canny_low: f64,
    pub canny_high: f64,
    /// Number of largest contours inspected
    pub top_k: usize,
    /// Polygon approximation tolerance in working-frame pixels
    pub approx_epsilon: f64,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            working_width: 600,
            blur_kernel: 5,
            canny_low: 50.0,
            canny_high: 200.0,
            top_k: 5,
            approx_epsilon: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// tessdata directory, system default when unset
    pub data_path: Option<String>,
    pub language: String,
    /// Tesseract page segmentation mode (6 = single uniform block of text)
    pub page_seg_mode: u32,
    pub char_whitelist: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
            page_seg_mode: 6,
            char_whitelist: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity (0-100) for a registry row to match
    pub threshold: u8,
    pub policy: MatchPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            policy: MatchPolicy::FirstMatch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("License_plate_user_details.csv"),
        }
    }
}

/// SMS delivery. Without Twilio credentials notices are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Prepended to the registry contact number
    pub country_prefix: String,
    pub twilio: Option<TwilioConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            country_prefix: "+91".to_string(),
            twilio: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

/// Reverse geocoding of the camera position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// LocationIQ key; the fixed `address` is used when unset
    pub api_key: Option<String>,
    pub endpoint: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Fallback address when no geocoder is configured
    pub address: String,
    /// Seconds a geocoded address stays cached
    pub refresh_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://us1.locationiq.com/v1/reverse.php".to_string(),
            latitude: 19.8776,
            longitude: 75.3423,
            address: "unknown location".to_string(),
            refresh_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show frames in a HighGUI window with this title
    pub window: Option<String>,
    /// Record annotated frames to an MJPG file
    pub record_path: Option<PathBuf>,
    pub rtp: Option<RtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpConfig {
    pub host: String,
    pub port: u16,
    pub width: i32,
    pub height: i32,
    pub fps: u32,
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            width: 1280,
            height: 720,
            fps: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stop after this many frames; unbounded when unset
    pub max_ticks: Option<u64>,
    /// Reopen the source and keep watching after a match. Ignored for
    /// video files.
    pub restart_after_match: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prometheus text dump written on shutdown
    pub metrics_path: Option<PathBuf>,
    /// Pyroscope server, profiling disabled when unset
    pub pyroscope_url: Option<String>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| PlateError::Config(e.to_string()))
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| PlateError::Config(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}
