//! Configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file at all) is a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scan::window::{Dimensions, DEFAULT_STRIDE, DEFAULT_WINDOW};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite catalog file
    pub catalog_path: PathBuf,
    /// Directory holding the photo directories
    pub photos_root: PathBuf,
    /// Photo directories (relative to `photos_root`) to ingest
    pub image_dirs: Vec<String>,
    /// Photo file extensions, matched case-insensitively
    pub extensions: Vec<String>,
    pub ingest: IngestConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Photographs per worker chunk
    pub chunk_size: usize,
    /// Chunks decoded concurrently
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub window: Dimensions,
    pub stride: Dimensions,
    /// Degrees between rotated attempts
    pub rotation_step: u32,
    /// Largest rotation tried, inclusive
    pub rotation_max: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            catalog_path: default_catalog_path(),
            photos_root: PathBuf::from("data/raw/photos"),
            image_dirs: Vec::new(),
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            ingest: IngestConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            chunk_size: 100,
            workers: default_workers(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            window: DEFAULT_WINDOW,
            stride: DEFAULT_STRIDE,
            rotation_step: 5,
            rotation_max: 80,
        }
    }
}

impl ScanConfig {
    /// Rotation angles in the order they are tried
    pub fn rotations(&self) -> impl Iterator<Item = u32> {
        (self.rotation_step..=self.rotation_max).step_by(self.rotation_step.max(1) as usize)
    }
}

impl Config {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(Error::Config("ingest.chunk_size must be at least 1".into()));
        }
        if self.ingest.workers == 0 {
            return Err(Error::Config("ingest.workers must be at least 1".into()));
        }
        let scan = &self.scan;
        for (name, dims) in [("window", scan.window), ("stride", scan.stride)] {
            if dims.width == 0 || dims.height == 0 {
                return Err(Error::Config(format!("scan.{} dimensions must be non-zero", name)));
            }
        }
        if scan.rotation_step == 0 {
            return Err(Error::Config("scan.rotation_step must be at least 1".into()));
        }
        Ok(())
    }

    /// Absolute locations of the configured photo directories
    pub fn image_dir_paths(&self) -> Vec<PathBuf> {
        self.image_dirs.iter().map(|d| self.photos_root.join(d)).collect()
    }
}

/// Same location convention as other desktop data: `<data dir>/specimen-ledger/catalog.db`
fn default_catalog_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("specimen-ledger");
    path.push("catalog.db");
    path
}

/// Leave a few cores for the rest of the machine, cap at 10
fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cpus.saturating_sub(4).clamp(1, 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.ingest.chunk_size, 100);
        assert!(config.ingest.workers >= 1 && config.ingest.workers <= 10);
        assert_eq!(config.scan.window, Dimensions::new(400, 400));
        assert_eq!(config.scan.stride, Dimensions::new(200, 200));
        assert_eq!(config.extensions, vec!["jpg", "jpeg"]);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            photos_root = "/srv/photos"
            image_dirs = ["MO-DOE", "NY_visit_2"]

            [ingest]
            chunk_size = 25

            [scan]
            window = { width = 300, height = 200 }
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.chunk_size, 25);
        assert_eq!(config.scan.window, Dimensions::new(300, 200));
        assert_eq!(config.scan.stride, Dimensions::new(200, 200));
        assert_eq!(
            config.image_dir_paths(),
            vec![PathBuf::from("/srv/photos/MO-DOE"), PathBuf::from("/srv/photos/NY_visit_2")]
        );
    }

    #[test]
    fn test_rotation_angles() {
        let angles: Vec<u32> = ScanConfig::default().rotations().collect();
        assert_eq!(angles.len(), 16);
        assert_eq!(angles.first(), Some(&5));
        assert_eq!(angles.last(), Some(&80));
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        assert!(matches!(Config::from_toml_str("[ingest]\nchunk_size = 0"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("[ingest]\nworkers = 0"), Err(Error::Config(_))));
        assert!(matches!(
            Config::from_toml_str("[scan]\nstride = { width = 0, height = 10 }"),
            Err(Error::Config(_))
        ));
        let zero_step = Config::from_toml_str("[scan]\nrotation_step = 0");
        assert!(matches!(zero_step, Err(Error::Config(_))));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(Config::from_toml_str("ingest = 3"), Err(Error::Config(_))));
    }
}
