//! Host-facing configuration
//!
//! The two tunables of the hot-swap core (`check_interval`, `outside_search`)
//! plus the locator's path conventions and logging options. Files can be any
//! format the `config` crate understands, detected from the extension:
//! YAML, TOML, JSON, INI, RON, JSON5.
//!
//! `${VAR}` and `$VAR` references are substituted from the environment before
//! parsing, and `TICKSWAP__<KEY>` variables override file values
//! (`__` separates nesting, e.g. `TICKSWAP__LOCATOR__ROOT`).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "TICKSWAP";

/// Default number of ticks between modification checks.
pub const DEFAULT_CHECK_INTERVAL: u32 = 60;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which entry strategy drives the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Load once at attach, never re-check
    Cold,
    /// Poll on a tick schedule and swap in newer builds
    #[default]
    #[serde(alias = "hot_swap", alias = "hot-swap")]
    HotSwap,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cold" => Ok(Self::Cold),
            "hotswap" | "hot_swap" | "hot-swap" => Ok(Self::HotSwap),
            other => Err(ConfigError::Parse(format!("unknown strategy: {other}"))),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Cold => write!(f, "cold"),
            StrategyKind::HotSwap => write!(f, "hotswap"),
        }
    }
}

/// How the locator summarizes the canonical file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// Modification time and size
    #[default]
    Metadata,
    /// SHA-256 of the file bytes
    Content,
}

/// Path conventions for the module locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Directory the builder writes the module into
    pub root: PathBuf,
    /// Library name without platform prefix/extension (`layers` -> `liblayers.so`)
    pub module_name: String,
    /// Where staged copies live; defaults to `<root>/.tickswap/staging`
    pub staging_dir: Option<PathBuf>,
    /// Extra directories searched when outside search is enabled
    pub outside_dirs: Vec<PathBuf>,
    /// Change detection mode
    pub fingerprint: FingerprintMode,
    /// Give every staged copy a fresh file name
    pub versioned_staging: bool,
    /// Libraries the module links against by symbol, preloaded when it fails to open
    pub companions: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            module_name: "layers".to_string(),
            staging_dir: None,
            outside_dirs: Vec::new(),
            fingerprint: FingerprintMode::default(),
            versioned_staging: false,
            companions: Vec::new(),
        }
    }
}

impl LocatorConfig {
    /// Create a config for `module_name` under `root`
    pub fn new(root: impl Into<PathBuf>, module_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            module_name: module_name.into(),
            ..Self::default()
        }
    }

    /// Set the staging directory
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Add a directory for outside search
    pub fn with_outside_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.outside_dirs.push(dir.into());
        self
    }

    /// Set the fingerprint mode
    pub fn with_fingerprint(mut self, mode: FingerprintMode) -> Self {
        self.fingerprint = mode;
        self
    }

    /// Enable/disable versioned staging
    pub fn with_versioned_staging(mut self, enabled: bool) -> Self {
        self.versioned_staging = enabled;
        self
    }

    /// Add a companion library name
    pub fn with_companion(mut self, name: impl Into<String>) -> Self {
        self.companions.push(name.into());
        self
    }

    /// Effective staging directory
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| self.root.join(".tickswap").join("staging"))
    }
}

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Prefix records with `file:line`
    pub show_source: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            show_source: true,
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Entry strategy, selected once at startup
    pub strategy: StrategyKind,
    /// Ticks between modification checks; `0` loads once at attach
    pub check_interval: u32,
    /// Let the locator look beyond `locator.root`
    pub outside_search: bool,
    /// Locator path conventions
    pub locator: LocatorConfig,
    /// Logging options
    pub logging: LogConfig,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            outside_search: false,
            locator: LocatorConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl SwapConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strategy
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the check interval
    pub fn with_check_interval(mut self, ticks: u32) -> Self {
        self.check_interval = ticks;
        self
    }

    /// Enable/disable outside search
    pub fn with_outside_search(mut self, enabled: bool) -> Self {
        self.outside_search = enabled;
        self
    }

    /// Set the locator configuration
    pub fn with_locator(mut self, locator: LocatorConfig) -> Self {
        self.locator = locator;
        self
    }

    /// Load from a file with `TICKSWAP__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        load_with_env(path, ENV_PREFIX)
    }
}

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)\b")
        .expect("env var pattern is valid")
});

/// Substitute `${VAR}` and `$VAR` references; unknown variables are left as written.
pub fn substitute_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &regex::Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Parse configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load configuration from a file, format detected from the extension
pub fn load_config<T>(path: impl AsRef<Path>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Load configuration with environment variable overrides
///
/// Variables are `<PREFIX>__<KEY>`, with `__` for nesting.
pub fn load_with_env<T>(path: impl AsRef<Path>, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let substituted = substitute_env_vars(&content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted, format))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}
