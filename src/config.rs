//! Server configuration module.
//!
//! Handles loading, validating, and merging `lipo.toml`. Stock defaults are
//! the base layer; a user file overrides any subset of keys.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! bind = "127.0.0.1:3000"
//!
//! [limits]
//! field_name_size = 100     # Max bytes in a multipart field name
//! field_size = "1mb"        # Max bytes in a non-file field (the options JSON)
//! file_size = "5mb"         # Max bytes in the uploaded image
//! fields = 10               # Max non-file fields
//! files = 1                 # Max file fields
//!
//! [processing]
//! max_processes = 4         # Engine workers (omit for auto = CPU cores)
//! max_dimension = 16384     # Max width or height of any image
//! max_pixels = 67108864     # Max width x height of any image
//!
//! [cache]
//! entries = 32              # Cached responses (0 disables the cache)
//! size = "64mb"             # Total bytes of cached responses
//! ```
//!
//! Sizes accept a plain byte count or a string with a `b`, `kb`, `mb` or
//! `gb` suffix (1024-based). Unknown keys are rejected to catch typos early.

use crate::imaging::params::SizeLimits;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE: &str = "lipo.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration loaded from `lipo.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to listen on. Port 0 picks a free port.
    pub bind: String,
    /// Multipart upload limits.
    pub limits: UploadLimits,
    /// Engine pool settings.
    pub processing: ProcessingConfig,
    /// Result cache settings.
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            limits: UploadLimits::default(),
            processing: ProcessingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.limits.field_name_size < "options".len() {
            return Err(ConfigError::Validation(
                "limits.field_name_size must fit the field names \"input\" and \"options\"".into(),
            ));
        }
        if self.limits.fields == 0 {
            return Err(ConfigError::Validation(
                "limits.fields must allow the options field".into(),
            ));
        }
        if self.limits.field_size.bytes() == 0 || self.limits.file_size.bytes() == 0 {
            return Err(ConfigError::Validation(
                "limits.field_size and limits.file_size must be non-zero".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        if self.processing.max_dimension == 0 || self.processing.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "processing.max_dimension and processing.max_pixels must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::Validation(format!("bind '{}': {e}", self.bind)))
    }
}

/// A byte count written as an integer or a suffixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const KB: u64 = 1024;
    pub const MB: u64 = 1024 * 1024;
    pub const GB: u64 = 1024 * 1024 * 1024;

    pub fn kb(n: u64) -> Self {
        Self(n * Self::KB)
    }

    pub fn mb(n: u64) -> Self {
        Self(n * Self::MB)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid size '{0}': expected a byte count or a value like \"512kb\" or \"5mb\"")]
pub struct InvalidByteSize(String);

impl FromStr for ByteSize {
    type Err = InvalidByteSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let split = lower
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(lower.len());
        let (digits, suffix) = lower.split_at(split);
        let n: u64 = digits.parse().map_err(|_| InvalidByteSize(s.to_string()))?;
        let unit = match suffix.trim() {
            "" | "b" => 1,
            "k" | "kb" => Self::KB,
            "m" | "mb" => Self::MB,
            "g" | "gb" => Self::GB,
            _ => return Err(InvalidByteSize(s.to_string())),
        };
        n.checked_mul(unit)
            .map(ByteSize)
            .ok_or_else(|| InvalidByteSize(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n >= Self::GB && n % Self::GB == 0 {
            write!(f, "{}gb", n / Self::GB)
        } else if n >= Self::MB && n % Self::MB == 0 {
            write!(f, "{}mb", n / Self::MB)
        } else if n >= Self::KB && n % Self::KB == 0 {
            write!(f, "{}kb", n / Self::KB)
        } else {
            write!(f, "{n}b")
        }
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(ByteSize(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Multipart upload limits, enforced while the body streams in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadLimits {
    /// Max bytes in a field name.
    pub field_name_size: usize,
    /// Max bytes in a non-file field value.
    pub field_size: ByteSize,
    /// Max bytes in an uploaded file.
    pub file_size: ByteSize,
    /// Max number of non-file fields.
    pub fields: usize,
    /// Max number of file fields.
    pub files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            field_name_size: 100,
            field_size: ByteSize::mb(1),
            file_size: ByteSize::mb(5),
            fields: 10,
            files: 1,
        }
    }
}

/// Per-part allowance for boundaries and part headers.
const PART_OVERHEAD: u64 = 1024;

impl UploadLimits {
    /// Largest request body any combination of allowed parts can produce.
    ///
    /// Checked against `Content-Length` before the body is read.
    pub fn max_body_size(&self) -> u64 {
        let parts = (self.fields + self.files) as u64;
        self.field_size.bytes() * self.fields as u64
            + self.file_size.bytes() * self.files as u64
            + parts * (PART_OVERHEAD + self.field_name_size as u64)
    }
}

/// Engine pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel engine workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Largest width or height accepted for decode, create and resize.
    pub max_dimension: u32,
    /// Largest pixel count (width x height) accepted for decode, create
    /// and resize.
    pub max_pixels: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_dimension: SizeLimits::DEFAULT_MAX_DIMENSION,
            max_pixels: SizeLimits::DEFAULT_MAX_PIXELS,
        }
    }
}

impl ProcessingConfig {
    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits::new(self.max_dimension, self.max_pixels)
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Number of responses kept. `0` disables caching.
    pub entries: u64,
    /// Total size of the kept responses. `0` disables caching.
    pub size: ByteSize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entries: 32,
            size: ByteSize::mb(64),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.entries > 0 && self.size.bytes() > 0
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServerConfig::default())?)
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `lipo.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# lipo server configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Socket address to listen on. Use port 0 to pick a free port.
bind = "127.0.0.1:3000"

# ---------------------------------------------------------------------------
# Upload limits
# ---------------------------------------------------------------------------
# Enforced while the multipart body streams in; violations answer 413.
# Sizes accept a byte count or a string such as "512kb" or "5mb".
[limits]
# Max bytes in a multipart field name.
field_name_size = 100

# Max bytes in a non-file field (the JSON options).
field_size = "1mb"

# Max bytes in the uploaded image.
file_size = "5mb"

# Max number of non-file fields.
fields = 10

# Max number of file fields.
files = 1

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel engine workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Largest width or height accepted for decode, create and resize.
max_dimension = 16384

# Largest pixel count (width x height) accepted for decode, create and
# resize. Bounds the memory one request can claim.
max_pixels = 67108864

# ---------------------------------------------------------------------------
# Result cache
# ---------------------------------------------------------------------------
[cache]
# Responses kept for identical requests. 0 disables the cache.
entries = 32

# Total size of the kept responses; the oldest and least used go first.
size = "64mb"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_upload_limits() {
        let config = ServerConfig::default();
        assert_eq!(config.limits.field_name_size, 100);
        assert_eq!(config.limits.field_size, ByteSize::mb(1));
        assert_eq!(config.limits.file_size, ByteSize::mb(5));
        assert_eq!(config.limits.fields, 10);
        assert_eq!(config.limits.files, 1);
    }

    #[test]
    fn default_config_has_processing_settings() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.processing.max_processes, None);
        assert_eq!(config.processing.max_dimension, 16_384);
        assert_eq!(config.processing.max_pixels, 8192 * 8192);
        assert_eq!(config.cache.entries, 32);
        assert_eq!(config.cache.size, ByteSize::mb(64));
        assert!(config.cache.is_enabled());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[limits]
file_size = "10mb"
"#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        // Overridden value
        assert_eq!(config.limits.file_size, ByteSize::mb(10));
        // Default values preserved
        assert_eq!(config.limits.field_size, ByteSize::mb(1));
        assert_eq!(config.bind, "127.0.0.1:3000");
    }

    // =========================================================================
    // ByteSize tests
    // =========================================================================

    #[test]
    fn byte_size_parses_suffixes() {
        assert_eq!("100".parse::<ByteSize>().unwrap(), ByteSize(100));
        assert_eq!("100b".parse::<ByteSize>().unwrap(), ByteSize(100));
        assert_eq!("1kb".parse::<ByteSize>().unwrap(), ByteSize(1024));
        assert_eq!("5MB".parse::<ByteSize>().unwrap(), ByteSize::mb(5));
        assert_eq!(" 2 gb ".parse::<ByteSize>().unwrap(), ByteSize(2 * ByteSize::GB));
    }

    #[test]
    fn byte_size_rejects_garbage() {
        assert!("".parse::<ByteSize>().is_err());
        assert!("mb".parse::<ByteSize>().is_err());
        assert!("5tb".parse::<ByteSize>().is_err());
        assert!("-5".parse::<ByteSize>().is_err());
    }

    #[test]
    fn byte_size_accepts_integer_or_string_in_toml() {
        let limits: UploadLimits = toml::from_str("file_size = 2048\nfield_size = \"2kb\"").unwrap();
        assert_eq!(limits.file_size, ByteSize(2048));
        assert_eq!(limits.field_size, ByteSize(2048));
    }

    #[test]
    fn byte_size_display_picks_largest_unit() {
        assert_eq!(ByteSize::mb(5).to_string(), "5mb");
        assert_eq!(ByteSize::kb(1).to_string(), "1kb");
        assert_eq!(ByteSize(1500).to_string(), "1500b");
    }

    #[test]
    fn max_body_size_covers_every_part() {
        let limits = UploadLimits::default();
        let body = limits.max_body_size();
        assert!(body > ByteSize::mb(5).bytes() + 10 * ByteSize::mb(1).bytes());
    }

    // =========================================================================
    // effective_threads tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig::default();
        let threads = effective_threads(&config);
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(threads, cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..ProcessingConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99_999),
            ..ProcessingConfig::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("bind = \"127.0.0.1:3000\"").unwrap();
        let overlay: toml::Value = toml::from_str("bind = \"0.0.0.0:8080\"").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["bind"].as_str(), Some("0.0.0.0:8080"));
    }

    #[test]
    fn merge_toml_table_merge_preserves_base_keys() {
        let base: toml::Value = toml::from_str("[limits]\nfields = 10\nfiles = 1").unwrap();
        let overlay: toml::Value = toml::from_str("[limits]\nfiles = 2").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["limits"]["fields"].as_integer(), Some(10));
        assert_eq!(merged["limits"]["files"].as_integer(), Some(2));
    }

    // =========================================================================
    // Loading and validation
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
bind = "0.0.0.0:0"

[processing]
max_processes = 2

[cache]
entries = 0
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.bind, "0.0.0.0:0");
        assert_eq!(config.processing.max_processes, Some(2));
        assert_eq!(config.processing.max_dimension, 16_384);
        assert_eq!(config.cache.entries, 0);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("port = 3000");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("[limits]\nparts = 3");
        assert!(result.is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_bind() {
        let config = ServerConfig {
            bind: "localhost".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = ServerConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_pixel_budget() {
        let mut config = ServerConfig::default();
        config.processing.max_pixels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn size_limits_follow_processing_config() {
        let toml = "[processing]\nmax_dimension = 4000\nmax_pixels = 1000000";
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.processing.size_limits(),
            SizeLimits::new(4000, 1_000_000)
        );
    }

    #[test]
    fn cache_disabled_by_zero_entries_or_size() {
        let cache: CacheConfig = toml::from_str("entries = 0").unwrap();
        assert!(!cache.is_enabled());
        let cache: CacheConfig = toml::from_str("size = 0").unwrap();
        assert!(!cache.is_enabled());
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str("[limits]\nfields = 0").unwrap();
        assert!(matches!(
            resolve_config(base, Some(overlay)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config = resolve_config(stock_defaults_value().unwrap(), Some(value)).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value().unwrap();
        let table = value.as_table().unwrap();
        for key in ["bind", "limits", "processing", "cache"] {
            assert!(table.contains_key(key), "missing {key}");
        }
    }
}
