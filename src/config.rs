use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{HttpDetectorConfig, DEFAULT_ENDPOINT, DEFAULT_PROMPT};
use crate::frame::CropRegion;
use crate::grid::{GridGeometry, GridLocalizer};

const DEFAULT_MQTT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_FEED_TOPIC: &str = "camera/image_projected/compressed";
const DEFAULT_MQTT_CLIENT_ID: &str = "gridloc";
const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LocatorConfigFile {
    feed: Option<FeedConfigFile>,
    detector: Option<DetectorConfigFile>,
    grid: Option<GridConfigFile>,
    crop: Option<CropRegion>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedConfigFile {
    broker_addr: Option<String>,
    topic: Option<String>,
    client_id: Option<String>,
    use_tls: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert_path: Option<PathBuf>,
    tls_client_key_path: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    endpoint: Option<String>,
    prompt: Option<String>,
    timeout_secs: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct GridConfigFile {
    cell_width: Option<f64>,
    cell_height: Option<f64>,
    rows: Option<usize>,
    cols: Option<usize>,
    image_width: Option<u32>,
    image_height: Option<u32>,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub feed: FeedSettings,
    pub detector: HttpDetectorConfig,
    pub grid: GridGeometry,
    pub crop: CropRegion,
}

/// Video feed subscription settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub broker_addr: String,
    pub topic: String,
    pub client_id: String,
    pub use_tls: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert_path: Option<PathBuf>,
    pub tls_client_key_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        // An empty file struct resolves to the built-in defaults.
        Self::from_file(LocatorConfigFile::default())
    }
}

impl LocatorConfig {
    /// Load from `GRIDLOC_CONFIG` (JSON, or TOML for `*.toml`), then apply
    /// `GRIDLOC_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GRIDLOC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LocatorConfigFile) -> Self {
        let feed_file = file.feed.unwrap_or_default();
        let feed = FeedSettings {
            broker_addr: feed_file
                .broker_addr
                .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
            topic: feed_file
                .topic
                .unwrap_or_else(|| DEFAULT_FEED_TOPIC.to_string()),
            client_id: feed_file
                .client_id
                .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
            use_tls: feed_file.use_tls.unwrap_or(false),
            tls_ca_path: feed_file.tls_ca_path,
            tls_client_cert_path: feed_file.tls_client_cert_path,
            tls_client_key_path: feed_file.tls_client_key_path,
            username: feed_file.username,
            password: feed_file.password,
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = HttpDetectorConfig {
            endpoint: detector_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            prompt: detector_file
                .prompt
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            timeout: detector_file.timeout_secs.map(Duration::from_secs),
            jpeg_quality: detector_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        };

        let defaults = GridGeometry::default();
        let grid_file = file.grid.unwrap_or_default();
        let grid = GridGeometry {
            cell_width: grid_file.cell_width.unwrap_or(defaults.cell_width),
            cell_height: grid_file.cell_height.unwrap_or(defaults.cell_height),
            rows: grid_file.rows.unwrap_or(defaults.rows),
            cols: grid_file.cols.unwrap_or(defaults.cols),
            image_width: grid_file.image_width.unwrap_or(defaults.image_width),
            image_height: grid_file.image_height.unwrap_or(defaults.image_height),
        };

        Self {
            feed,
            detector,
            grid,
            crop: file.crop.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("GRIDLOC_MQTT_BROKER_ADDR") {
            if !addr.trim().is_empty() {
                self.feed.broker_addr = addr;
            }
        }
        if let Ok(topic) = std::env::var("GRIDLOC_FEED_TOPIC") {
            if !topic.trim().is_empty() {
                self.feed.topic = topic;
            }
        }
        if let Ok(endpoint) = std::env::var("GRIDLOC_DETECT_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.detector.endpoint = endpoint;
            }
        }
        if let Ok(prompt) = std::env::var("GRIDLOC_DETECT_PROMPT") {
            if !prompt.trim().is_empty() {
                self.detector.prompt = prompt;
            }
        }
        if let Ok(timeout) = std::env::var("GRIDLOC_DETECT_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("GRIDLOC_DETECT_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.detector.timeout = Some(Duration::from_secs(seconds));
        }
        Ok(())
    }

    /// Check cross-field constraints. `load` calls this; callers that build a
    /// config by hand should too.
    pub fn validate(&self) -> Result<()> {
        let endpoint = url::Url::parse(&self.detector.endpoint)
            .with_context(|| format!("invalid detector endpoint '{}'", self.detector.endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported detector endpoint scheme '{}'; expected http or https",
                endpoint.scheme()
            ));
        }
        if self.detector.prompt.trim().is_empty() {
            return Err(anyhow!("detector prompt must not be empty"));
        }
        if self.detector.timeout == Some(Duration::ZERO) {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        if !(1..=100).contains(&self.detector.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.feed.topic.trim().is_empty() {
            return Err(anyhow!("feed topic must not be empty"));
        }
        if self.crop.is_empty() {
            return Err(anyhow!(
                "crop region ({},{})-({},{}) is empty",
                self.crop.left,
                self.crop.top,
                self.crop.right,
                self.crop.bottom
            ));
        }
        GridLocalizer::new(self.grid)?;
        if (self.crop.width(), self.crop.height())
            != (self.grid.image_width, self.grid.image_height)
        {
            log::warn!(
                "crop region is {}x{} but grid image is {}x{}; boxes are scaled to the grid image",
                self.crop.width(),
                self.crop.height(),
                self.grid.image_width,
                self.grid.image_height
            );
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LocatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
