//! Demo configuration.
//!
//! Everything here has a baked-in default matching the classic demo setup
//! (two million points drawn in batches of ten, seed 23232323). An optional
//! `stardust.toml` next to the binary can override any field.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of animated points.
pub const DEFAULT_POINT_COUNT: u32 = 2_000_000;
/// Default vertices per draw call.
pub const DEFAULT_BATCH_SIZE: u32 = 10;
/// Default animation seed.
pub const DEFAULT_SEED: u32 = 23_232_323;

/// Top-level demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Total number of animated points.
    pub point_count: u32,
    /// Vertices issued per draw call.
    pub batch_size: u32,
    /// Starting value for the LCG animation seed.
    pub seed: u32,
    /// Run in a decorated window instead of borderless fullscreen.
    pub windowed: bool,
    /// Window width in pixels (windowed mode).
    pub width: u32,
    /// Window height in pixels (windowed mode).
    pub height: u32,
    /// Directory holding the compiled SPIR-V shaders.
    pub shader_dir: String,
    /// Directory holding palette and skybox images.
    pub asset_dir: String,
    /// Cap on the number of worker threads (0 = one per logical core).
    pub max_cores: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            point_count: DEFAULT_POINT_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: DEFAULT_SEED,
            windowed: true,
            width: 1280,
            height: 720,
            shader_dir: "shaders".to_string(),
            asset_dir: "assets".to_string(),
            max_cores: 16,
        }
    }
}

impl DemoConfig {
    /// Create a configuration with the stock demo defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file, falling back to defaults if the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => {
                    log::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Ignoring malformed {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Set the point count.
    pub fn with_point_count(mut self, count: u32) -> Self {
        self.point_count = count;
        self
    }

    /// Set the per-draw batch size.
    pub fn with_batch_size(mut self, batch: u32) -> Self {
        self.batch_size = batch;
        self
    }

    /// Set the animation seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Select windowed or borderless fullscreen presentation.
    pub fn with_windowed(mut self, windowed: bool) -> Self {
        self.windowed = windowed;
        self
    }

    /// Number of recording threads to use for `available` logical cores.
    pub fn core_count(&self, available: usize) -> usize {
        let cap = if self.max_cores == 0 {
            usize::MAX
        } else {
            self.max_cores as usize
        };
        available.clamp(1, cap)
    }

    /// Reject configurations the renderer cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        if self.point_count == 0 {
            return Err("point_count must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.point_count < self.batch_size {
            return Err(format!(
                "point_count {} is smaller than batch_size {}",
                self.point_count, self.batch_size
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err("window dimensions must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_demo() {
        let config = DemoConfig::default();
        assert_eq!(config.point_count, 2_000_000);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.seed, 23_232_323);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = DemoConfig::default().with_point_count(500_000).with_seed(7);
        let text = toml::to_string(&config).unwrap();
        let back: DemoConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.point_count, 500_000);
        assert_eq!(back.seed, 7);
        assert_eq!(back.batch_size, config.batch_size);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let back: DemoConfig = toml::from_str("point_count = 1000\n").unwrap();
        assert_eq!(back.point_count, 1000);
        assert_eq!(back.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(back.seed, DEFAULT_SEED);
    }

    #[test]
    fn core_count_respects_cap() {
        let config = DemoConfig::default();
        assert_eq!(config.core_count(4), 4);
        assert_eq!(config.core_count(32), 16);
        assert_eq!(config.core_count(0), 1);

        let uncapped = DemoConfig { max_cores: 0, ..DemoConfig::default() };
        assert_eq!(uncapped.core_count(32), 32);
    }

    #[test]
    fn rejects_degenerate_settings() {
        assert!(DemoConfig::default().with_point_count(0).validate().is_err());
        assert!(DemoConfig::default().with_batch_size(0).validate().is_err());
        assert!(DemoConfig::default()
            .with_point_count(5)
            .with_batch_size(10)
            .validate()
            .is_err());
    }
}
