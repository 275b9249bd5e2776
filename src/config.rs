//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `derivo.toml`. The config is an
//! immutable value built once at startup and handed to the
//! [`Optimizer`](crate::optimize::Optimizer),
//! [`Resolver`](crate::resolve::Resolver) and
//! [`AssetLayout`](crate::paths::AssetLayout) constructors. Nothing reads
//! settings from global state, so tests can run side by side with
//! different quality levels or size tables.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! media_root = "media"                     # Root holding projects/ and services/
//! media_url = "/media/"                    # URL prefix mapped onto media_root
//! placeholder = "static/placeholder.png"   # Returned when nothing else exists
//!
//! [quality]
//! webp = 85       # Derived WebP variants
//! preserve = 88   # Format-preserving re-encodes
//!
//! [sizes]
//! small = [300, 300]
//! medium = [600, 600]
//! large = [1200, 1200]
//!
//! [limits]
//! max_input_bytes = 52428800   # 50 MiB
//! max_pixels = 50000000
//!
//! [processing]
//! max_processes = 4            # Batch workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BoundingBox, DecodeLimits, Quality, SizeClass};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config filename looked up by the CLI when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "derivo.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `derivo.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Where assets live and how they map to URLs.
    pub storage: StorageConfig,
    /// Encoding quality levels.
    pub quality: QualityConfig,
    /// Bounding boxes for the sized variants.
    pub sizes: SizesConfig,
    /// Fail-fast input limits.
    pub limits: LimitsConfig,
    /// Parallel processing settings for the batch driver.
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, q) in [("webp", self.quality.webp), ("preserve", self.quality.preserve)] {
            if !(1..=100).contains(&q) {
                return Err(ConfigError::Validation(format!(
                    "quality.{name} must be 1-100"
                )));
            }
        }
        for (name, [w, h]) in [
            ("small", self.sizes.small),
            ("medium", self.sizes.medium),
            ("large", self.sizes.large),
        ] {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation(format!(
                    "sizes.{name} values must be non-zero"
                )));
            }
        }
        if self.limits.max_input_bytes == 0 || self.limits.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "limits values must be non-zero".into(),
            ));
        }
        if self.storage.media_url.is_empty() {
            return Err(ConfigError::Validation(
                "storage.media_url must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Bounding box for a size class. `None` for the canonical variant.
    pub fn bounding_box(&self, size: SizeClass) -> Option<BoundingBox> {
        let [w, h] = match size {
            SizeClass::Canonical => return None,
            SizeClass::Small => self.sizes.small,
            SizeClass::Medium => self.sizes.medium,
            SizeClass::Large => self.sizes.large,
        };
        Some(BoundingBox::new(w, h))
    }

    pub fn webp_quality(&self) -> Quality {
        Quality::new(self.quality.webp)
    }

    pub fn preserve_quality(&self) -> Quality {
        Quality::new(self.quality.preserve)
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_input_bytes: self.limits.max_input_bytes,
            max_pixels: self.limits.max_pixels,
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory containing one folder per entity kind.
    pub media_root: PathBuf,
    /// URL prefix under which `media_root` is served.
    pub media_url: String,
    /// Path returned by the resolver when neither a derived variant nor the
    /// original exists.
    pub placeholder: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            placeholder: PathBuf::from("static/placeholder.png"),
        }
    }
}

/// Encoding quality levels (1 = worst, 100 = best).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Quality for every derived WebP variant.
    pub webp: u32,
    /// Quality for re-encodes that keep the source format.
    pub preserve: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            webp: Quality::default().value(),
            preserve: Quality::PRESERVE.value(),
        }
    }
}

/// Bounding boxes as `[max_width, max_height]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SizesConfig {
    pub small: [u32; 2],
    pub medium: [u32; 2],
    pub large: [u32; 2],
}

impl Default for SizesConfig {
    fn default() -> Self {
        Self {
            small: [300, 300],
            medium: [600, 600],
            large: [1200, 1200],
        }
    }
}

/// Input limits checked before a full decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_input_bytes: u64,
    pub max_pixels: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = DecodeLimits::default();
        Self {
            max_input_bytes: limits.max_input_bytes,
            max_pixels: limits.max_pixels,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel batch workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(PipelineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, deserialize, validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `derivo.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# derivo configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Root directory holding one folder per entity kind (projects/, services/).
media_root = "media"

# URL prefix under which media_root is served.
media_url = "/media/"

# Returned by the resolver when neither a derived variant nor the original exists.
placeholder = "static/placeholder.png"

# ---------------------------------------------------------------------------
# Encoding quality (1 = worst, 100 = best)
# ---------------------------------------------------------------------------
[quality]
# Every derived WebP variant (canonical, small, medium, large).
webp = 85

# Re-encodes that keep the source's own format.
preserve = 88

# ---------------------------------------------------------------------------
# Bounding boxes for sized variants, as [max_width, max_height].
# The canonical variant keeps the original resolution.
# ---------------------------------------------------------------------------
[sizes]
small = [300, 300]
medium = [600, 600]
large = [1200, 1200]

# ---------------------------------------------------------------------------
# Input limits, checked before decoding
# ---------------------------------------------------------------------------
[limits]
max_input_bytes = 52428800
max_pixels = 50000000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for the batch `optimize` command.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.quality.webp, 85);
        assert_eq!(config.quality.preserve, 88);
        assert_eq!(config.sizes.small, [300, 300]);
        assert_eq!(config.sizes.medium, [600, 600]);
        assert_eq!(config.sizes.large, [1200, 1200]);
        assert_eq!(config.storage.media_root, PathBuf::from("media"));
        assert_eq!(config.storage.media_url, "/media/");
    }

    #[test]
    fn bounding_box_per_size_class() {
        let config = PipelineConfig::default();
        assert_eq!(config.bounding_box(SizeClass::Canonical), None);
        assert_eq!(
            config.bounding_box(SizeClass::Small),
            Some(BoundingBox::new(300, 300))
        );
        assert_eq!(
            config.bounding_box(SizeClass::Large),
            Some(BoundingBox::new(1200, 1200))
        );
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[quality]
webp = 70
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.quality.webp, 70);
        // Defaults preserved
        assert_eq!(config.quality.preserve, 88);
        assert_eq!(config.sizes.medium, [600, 600]);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
[storage]
media_root = "/srv/media"

[sizes]
small = [200, 150]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.media_root, PathBuf::from("/srv/media"));
        assert_eq!(config.sizes.small, [200, 150]);
        assert_eq!(config.sizes.large, [1200, 1200]);
        assert_eq!(config.storage.media_url, "/media/");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[quality]\nwebp = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let result: Result<PipelineConfig, _> = toml::from_str("[quality]\nwebbp = 80\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<PipelineConfig, _> = toml::from_str("[sizez]\nsmall = [1, 1]\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_box() {
        let mut config = PipelineConfig::default();
        config.sizes.medium = [0, 600];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sizes.medium"));
    }

    #[test]
    fn validate_rejects_quality_over_100() {
        let mut config = PipelineConfig::default();
        config.quality.preserve = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[sizes]\nsmall = [300, 300]\nlarge = [1200, 1200]\n").unwrap();
        let overlay: toml::Value = toml::from_str("[sizes]\nsmall = [100, 100]\n").unwrap();
        let merged = merge_toml(base, overlay);
        let sizes = merged.get("sizes").unwrap();
        assert_eq!(sizes.get("small").unwrap().as_array().unwrap()[0].as_integer(), Some(100));
        assert!(sizes.get("large").is_some());
    }

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("webp = 85").unwrap();
        let overlay: toml::Value = toml::from_str("webp = 60").unwrap();
        assert_eq!(merge_toml(base, overlay).get("webp").unwrap().as_integer(), Some(60));
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: PipelineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        for section in ["storage", "quality", "sizes", "limits", "processing"] {
            assert!(val.get(section).is_some(), "missing [{section}]");
        }
    }
}
