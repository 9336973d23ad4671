// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigResult;
use crate::processing::mapper::{CoordinateMapper, ScaleConfig, WindowGeometry};
use crate::processing::statistics::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub mapping: MappingConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Tracker address, `host:port`.
    pub address: String,
    pub auto_connect: bool,
    /// CSV file receiving every accepted sample, if set.
    pub record_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8765".to_string(),
            auto_connect: false,
            record_path: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MappingConfig {
    pub invert_y: bool,
    pub scale: ScaleConfig,
    pub window: WindowGeometry,
}

impl MappingConfig {
    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.window, self.scale, self.invert_y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
    let config_str = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&config_str)?)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
    let yaml = serde_yaml::to_string(config)?;
    fs::write(path, yaml)?;
    Ok(())
}
