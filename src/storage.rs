//! Fall snapshot storage.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_SNAPSHOT_DIR: &str = "images";

/// Where frames that triggered a falling alert are kept.
pub trait SnapshotStore: Send {
    /// Persist `image`, captured at wall-clock time `at`. Returns the written path.
    fn save(&self, image: &RgbImage, at: DateTime<Local>) -> Result<PathBuf>;
}

/// Writes `fall_detected_YYYYmmdd-HHMMSS.png` files into one directory.
pub struct DirectorySnapshotStore {
    dir: PathBuf,
}

impl DirectorySnapshotStore {
    /// Open the store, creating the directory if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_path(&self, stem: &str) -> PathBuf {
        let first = self.dir.join(format!("{stem}.png"));
        if !first.exists() {
            return first;
        }
        // Same-second collisions get a numeric suffix instead of overwriting.
        (1u32..)
            .map(|n| self.dir.join(format!("{stem}-{n}.png")))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

impl SnapshotStore for DirectorySnapshotStore {
    fn save(&self, image: &RgbImage, at: DateTime<Local>) -> Result<PathBuf> {
        let path = self.free_path(&snapshot_stem(at));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }
}

/// File stem for a snapshot taken at `at`.
pub fn snapshot_stem(at: DateTime<Local>) -> String {
    format!("fall_detected_{}", at.format("%Y%m%d-%H%M%S"))
}

/// Keeps snapshots in memory. Cloned handles share the same list.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    saved: Arc<Mutex<Vec<(PathBuf, RgbImage)>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.saved
            .lock()
            .map(|s| s.iter().map(|(p, _)| p.clone()).collect())
            .unwrap_or_default()
    }

    pub fn images(&self) -> Vec<RgbImage> {
        self.saved
            .lock()
            .map(|s| s.iter().map(|(_, image)| image.clone()).collect())
            .unwrap_or_default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, image: &RgbImage, at: DateTime<Local>) -> Result<PathBuf> {
        let path = PathBuf::from(format!("{}.png", snapshot_stem(at)));
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot store lock poisoned"))?;
        saved.push((path.clone(), image.clone()));
        Ok(path)
    }
}
