use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

pub const DEFAULT_SCALE: f32 = 1.0;
pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.25;
/// Upper bound for `scroll_step` (cells per j/k).
pub const MAX_SCROLL_STEP: u32 = 1_000;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub library_path: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
    #[serde(default)]
    pub fetch: FetchConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub default_scale: Option<f32>,
    pub min_scale: Option<f32>,
    pub max_scale: Option<f32>,
    pub zoom_step: Option<f32>,
    pub scroll_step: Option<u32>,
    pub frame_budget_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct FetchConfigFile {
    pub timeout_ms: Option<u64>,
    pub max_bytes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub library_path: Option<PathBuf>,
    pub download_dir: PathBuf,
    pub viewer: ViewerConfig,
    pub fetch: FetchOptions,
}

pub struct ViewerConfig {
    pub zoom: ZoomLimits,
    pub scroll_step: u32,
    pub frame_budget: Duration,
}

/// Zoom range and step shared by the controller and the CLI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            min: MIN_SCALE,
            max: MAX_SCALE,
            step: ZOOM_STEP,
            default: DEFAULT_SCALE,
        }
    }
}

impl ZoomLimits {
    /// Clamp a requested scale into `[min, max]`. NaN yields `None`.
    pub fn clamp(&self, scale: f32) -> Option<f32> {
        if scale.is_nan() {
            None
        } else {
            Some(scale.clamp(self.min, self.max))
        }
    }
}

/// Network limits for remote documents.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, scale: Option<f32>, library_path: Option<PathBuf>) {
        if let Some(v) = scale {
            debug!("config: CLI override default_scale={v}");
            self.viewer.default_scale = scale;
        }
        if let Some(ref v) = library_path {
            debug!("config: CLI override library_path={}", v.display());
            self.library_path = library_path;
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let zoom = resolve_zoom(&self.viewer);
        let defaults = FetchOptions::default();
        let config = Config {
            library_path: self.library_path,
            download_dir: self.download_dir.map(expand_home).unwrap_or_else(default_download_dir),
            viewer: ViewerConfig {
                zoom,
                scroll_step: self.viewer.scroll_step.unwrap_or(3).clamp(1, MAX_SCROLL_STEP),
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(16)),
            },
            fetch: FetchOptions {
                timeout: self
                    .fetch
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timeout),
                max_bytes: self.fetch.max_bytes.unwrap_or(defaults.max_bytes),
            },
        };
        info!(
            "config: resolved scale={} (range {}..={}, step {}), scroll_step={}, \
             frame_budget={}ms, fetch_timeout={}ms, max_bytes={}, download_dir={}",
            config.viewer.zoom.default,
            config.viewer.zoom.min,
            config.viewer.zoom.max,
            config.viewer.zoom.step,
            config.viewer.scroll_step,
            config.viewer.frame_budget.as_millis(),
            config.fetch.timeout.as_millis(),
            config.fetch.max_bytes,
            config.download_dir.display(),
        );
        config
    }
}

fn resolve_zoom(file: &ViewerConfigFile) -> ZoomLimits {
    let mut zoom = ZoomLimits::default();
    let min = file.min_scale.unwrap_or(MIN_SCALE);
    let max = file.max_scale.unwrap_or(MAX_SCALE);
    if min.is_finite() && max.is_finite() && min > 0.0 && min < max {
        zoom.min = min;
        zoom.max = max;
    } else {
        warn!("config: invalid zoom range {min}..={max}, using {MIN_SCALE}..={MAX_SCALE}");
    }
    match file.zoom_step {
        Some(step) if step.is_finite() && step > 0.0 => zoom.step = step,
        Some(step) => warn!("config: invalid zoom_step {step}, using {ZOOM_STEP}"),
        None => {}
    }
    let default = file.default_scale.unwrap_or(DEFAULT_SCALE);
    zoom.default = zoom.clamp(default).unwrap_or(DEFAULT_SCALE.clamp(zoom.min, zoom.max));
    zoom
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn expand_home(path: PathBuf) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Some(home) => home.join(rest),
            None => path,
        },
        Err(_) => path,
    }
}

fn default_download_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_DOWNLOAD_DIR") {
        return PathBuf::from(dir);
    }
    match home_dir() {
        Some(home) => home.join("Downloads"),
        None => PathBuf::from("."),
    }
}

/// Resolve the XDG config path for folio.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".config")))?;
    Some(config_dir.join("folio").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
