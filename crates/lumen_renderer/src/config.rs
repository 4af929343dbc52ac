//! Render settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Render configuration.
///
/// Every field has a default, so a JSON file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Samples per pixel for anti-aliasing and integration
    pub samples_per_pixel: u32,
    /// Hard cap on path length
    pub max_depth: u32,
    /// Edge length of a square bucket in pixels
    pub bucket_size: u32,
    /// Random seed; taken from the clock when unset
    pub seed: Option<u64>,
    /// Grid size for tabulating the background
    pub background_resolution: u32,
    pub gamma: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            samples_per_pixel: 64,
            max_depth: 64,
            bucket_size: 64,
            seed: None,
            background_resolution: 128,
            gamma: 2.2,
        }
    }
}

impl RenderConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RenderConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples_per_pixel == 0 {
            return Err(ConfigError::NotPositive("samples_per_pixel"));
        }
        if self.bucket_size == 0 {
            return Err(ConfigError::NotPositive("bucket_size"));
        }
        if self.background_resolution == 0 {
            return Err(ConfigError::NotPositive("background_resolution"));
        }
        if self.gamma.is_nan() || self.gamma <= 0.0 {
            return Err(ConfigError::NotPositive("gamma"));
        }
        Ok(())
    }

    pub fn with_samples(mut self, samples_per_pixel: u32) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The configured seed, or one drawn from the wall clock.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        })
    }
}
