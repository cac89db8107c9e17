use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::debounce::{DebounceSettings, DEFAULT_FALLING_THRESHOLD, DEFAULT_SITTING_THRESHOLD};
use crate::detect::DEFAULT_MIN_CONFIDENCE;
use crate::ingest::{CaptureSettings, SourceSpec};
use crate::notify::{DEFAULT_NOTIFY_ENDPOINT, DEFAULT_NOTIFY_TIMEOUT_MS};
use crate::storage::DEFAULT_SNAPSHOT_DIR;

const DEFAULT_MODEL_PATH: &str = "model/best_model.onnx";
const DEFAULT_CAMERAS: [&str; 2] = ["device:0", "test/Human Fall Detection Sample.mp4"];

#[derive(Debug, Deserialize, Default)]
struct FallWatchConfigFile {
    model_path: Option<PathBuf>,
    min_confidence: Option<f32>,
    thresholds: Option<ThresholdConfigFile>,
    notify: Option<NotifyConfigFile>,
    snapshots: Option<SnapshotConfigFile>,
    capture: Option<CaptureConfigFile>,
    cameras: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdConfigFile {
    sitting_secs: Option<u64>,
    falling_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FallWatchConfig {
    pub model_path: PathBuf,
    pub min_confidence: f32,
    pub sitting_threshold: Duration,
    pub falling_threshold: Duration,
    pub notify: NotifySettings,
    pub snapshot_dir: PathBuf,
    pub capture: CaptureSettings,
    pub cameras: Vec<SourceSpec>,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub endpoint: String,
    pub timeout: Duration,
}

impl FallWatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FallWatchConfigFile) -> Result<Self> {
        let model_path = file
            .model_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH));
        let min_confidence = file.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
        let sitting_threshold = file
            .thresholds
            .as_ref()
            .and_then(|t| t.sitting_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SITTING_THRESHOLD);
        let falling_threshold = file
            .thresholds
            .as_ref()
            .and_then(|t| t.falling_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FALLING_THRESHOLD);
        let notify = NotifySettings {
            endpoint: file
                .notify
                .as_ref()
                .and_then(|notify| notify.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_NOTIFY_ENDPOINT.to_string()),
            timeout: Duration::from_millis(
                file.notify
                    .as_ref()
                    .and_then(|notify| notify.timeout_ms)
                    .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_MS),
            ),
        };
        let snapshot_dir = file
            .snapshots
            .and_then(|snapshots| snapshots.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
        let defaults = CaptureSettings::default();
        let capture = CaptureSettings {
            target_fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.target_fps)
                .unwrap_or(defaults.target_fps),
            width: file
                .capture
                .as_ref()
                .and_then(|capture| capture.width)
                .unwrap_or(defaults.width),
            height: file
                .capture
                .as_ref()
                .and_then(|capture| capture.height)
                .unwrap_or(defaults.height),
        };
        let cameras = match file.cameras {
            Some(cameras) => cameras
                .iter()
                .map(|spec| spec.parse::<SourceSpec>())
                .collect::<Result<Vec<_>>>()?,
            None => DEFAULT_CAMERAS
                .iter()
                .map(|spec| spec.parse::<SourceSpec>())
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self {
            model_path,
            min_confidence,
            sitting_threshold,
            falling_threshold,
            notify,
            snapshot_dir,
            capture,
            cameras,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("FALLWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(confidence) = std::env::var("FALLWATCH_MIN_CONFIDENCE") {
            self.min_confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("FALLWATCH_MIN_CONFIDENCE must be a number"))?;
        }
        if let Ok(secs) = std::env::var("FALLWATCH_SITTING_SECS") {
            self.sitting_threshold = parse_secs("FALLWATCH_SITTING_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("FALLWATCH_FALLING_SECS") {
            self.falling_threshold = parse_secs("FALLWATCH_FALLING_SECS", &secs)?;
        }
        if let Ok(endpoint) = std::env::var("FALLWATCH_NOTIFY_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.notify.endpoint = endpoint.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("FALLWATCH_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = PathBuf::from(dir);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(anyhow!(
                "min_confidence must be between 0 and 1 (got {})",
                self.min_confidence
            ));
        }
        if self.sitting_threshold.is_zero() || self.falling_threshold.is_zero() {
            return Err(anyhow!("alert thresholds must be greater than zero"));
        }
        crate::notify::parse_endpoint(&self.notify.endpoint)?;
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one camera must be configured"));
        }
        Ok(())
    }

    pub fn debounce_settings(&self) -> DebounceSettings {
        DebounceSettings {
            sitting_threshold: self.sitting_threshold,
            falling_threshold: self.falling_threshold,
            min_confidence: self.min_confidence,
        }
    }

    /// Camera by its 1-based number, as shown to the user.
    pub fn camera(&self, number: usize) -> Result<&SourceSpec> {
        number
            .checked_sub(1)
            .and_then(|index| self.cameras.get(index))
            .ok_or_else(|| {
                anyhow!(
                    "camera {} is not configured ({} available)",
                    number,
                    self.cameras.len()
                )
            })
    }
}

fn read_config_file(path: &Path) -> Result<FallWatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let seconds: u64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds", key))?;
    Ok(Duration::from_secs(seconds))
}
