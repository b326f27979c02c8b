use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::SourceSettings;
use crate::pipeline::LoopSettings;
use crate::storage::SnapshotFormat;

const DEFAULT_SOURCE_URL: &str = "stub://camera0";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_SNAPSHOT_DIR: &str = "screenshots";
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 20;
const DEFAULT_SNAPSHOT_QUEUE_DEPTH: usize = 4;
const DEFAULT_DISPLAY_WIDTH: u32 = 640;
const DEFAULT_DISPLAY_HEIGHT: u32 = 480;
const DEFAULT_DISPLAY_QUEUE_DEPTH: usize = 8;
const DEFAULT_RETRY_DELAY_MS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapwatchConfigFile {
    source: Option<SourceConfigFile>,
    models: Option<ModelsConfigFile>,
    snapshots: Option<SnapshotsConfigFile>,
    display: Option<DisplayConfigFile>,
    retry_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelsConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotsConfigFile {
    dir: Option<PathBuf>,
    interval_secs: Option<u64>,
    format: Option<String>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SnapwatchConfig {
    pub source: SourceSettings,
    pub model_dir: PathBuf,
    pub snapshots: SnapshotSettings,
    pub display: DisplaySettings,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub dir: PathBuf,
    pub interval: Duration,
    pub format: SnapshotFormat,
    pub queue_depth: usize,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub max_width: u32,
    pub max_height: u32,
    pub queue_depth: usize,
}

impl SnapwatchConfig {
    /// Load from `SNAPWATCH_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SNAPWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SnapwatchConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let model_dir = file
            .models
            .and_then(|models| models.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR));

        let snapshots_file = file.snapshots.unwrap_or_default();
        let format = match snapshots_file.format.as_deref() {
            Some(format) => SnapshotFormat::parse(format)?,
            None => SnapshotFormat::default(),
        };
        let snapshots = SnapshotSettings {
            dir: snapshots_file
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            interval: Duration::from_secs(
                snapshots_file
                    .interval_secs
                    .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_SECS),
            ),
            format,
            queue_depth: snapshots_file
                .queue_depth
                .unwrap_or(DEFAULT_SNAPSHOT_QUEUE_DEPTH),
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplaySettings {
            max_width: display_file.max_width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
            max_height: display_file.max_height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            queue_depth: display_file
                .queue_depth
                .unwrap_or(DEFAULT_DISPLAY_QUEUE_DEPTH),
        };

        Ok(Self {
            source,
            model_dir,
            snapshots,
            display,
            retry_delay: Duration::from_millis(
                file.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
            ),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SNAPWATCH_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(dir) = std::env::var("SNAPWATCH_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.model_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("SNAPWATCH_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshots.dir = PathBuf::from(dir);
            }
        }
        if let Ok(interval) = std::env::var("SNAPWATCH_INTERVAL_SECS") {
            let seconds: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("SNAPWATCH_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.snapshots.interval = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.snapshots.interval.is_zero() {
            return Err(anyhow!("snapshot interval must be greater than zero"));
        }
        if self.snapshots.queue_depth == 0 || self.display.queue_depth == 0 {
            return Err(anyhow!("queue depths must be greater than zero"));
        }
        if self.display.max_width == 0 || self.display.max_height == 0 {
            return Err(anyhow!("display size must be greater than zero"));
        }
        self.source.validate()?;
        Ok(())
    }

    /// Loop settings derived from this configuration.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            snapshot_interval: self.snapshots.interval,
            display_max_width: self.display.max_width,
            display_max_height: self.display.max_height,
            retry_delay: self.retry_delay,
        }
    }
}

impl Default for SnapwatchConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                url: DEFAULT_SOURCE_URL.to_string(),
                target_fps: DEFAULT_SOURCE_FPS,
                width: DEFAULT_SOURCE_WIDTH,
                height: DEFAULT_SOURCE_HEIGHT,
            },
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            snapshots: SnapshotSettings {
                dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
                interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS),
                format: SnapshotFormat::default(),
                queue_depth: DEFAULT_SNAPSHOT_QUEUE_DEPTH,
            },
            display: DisplaySettings {
                max_width: DEFAULT_DISPLAY_WIDTH,
                max_height: DEFAULT_DISPLAY_HEIGHT,
                queue_depth: DEFAULT_DISPLAY_QUEUE_DEPTH,
            },
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

fn read_config_file(path: &Path) -> Result<SnapwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
