//! Kernel configuration
//!
//! The configuration file is TOML by default; a `.json` extension selects
//! JSON. Every field has a default, so partial files load and a missing file
//! means defaults.
//!
//! # Location
//!
//! `$VIZKERNEL_CONFIG` if set, otherwise `kernel.toml` in the platform
//! config directory under `vizkernel`:
//! - **Linux**: `~/.config/vizkernel/kernel.toml`
//! - **macOS**: `~/Library/Application Support/vizkernel/kernel.toml`
//! - **Windows**: `%APPDATA%\vizkernel\kernel.toml`
//!
//! # Example
//!
//! ```toml
//! [logging]
//! filter = "info,vizkernel=trace"
//!
//! [modules]
//! default = ["Scalar Source", "Statistics"]
//! allowed = []
//!
//! [kernel]
//! command_capacity = 64
//! ```

use crate::error::{KernelError, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::registry::ModuleFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform config directory
pub const APP_ID: &str = "vizkernel";

/// Configuration filename
pub const CONFIG_FILE: &str = "kernel.toml";

/// Environment variable overriding the configuration path
pub const CONFIG_ENV: &str = "VIZKERNEL_CONFIG";

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,vizkernel=debug";

/// Default capacity of the kernel command channel
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Get the platform configuration directory for the kernel
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Path of the configuration file, honouring `$VIZKERNEL_CONFIG`
pub fn config_path() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => config_dir().map(|p| p.join(CONFIG_FILE)),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

// ==================== Sections ====================

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for daily rolling log files; none disables file logging
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Colored terminal output
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            log_dir: None,
            ansi: true,
        }
    }
}

/// Which modules exist at start-up and which may be created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Prototypes instantiated when the kernel starts, in order
    #[serde(default)]
    pub default: Vec<String>,

    /// Allow-list of prototypes; empty allows all
    #[serde(default)]
    pub allowed: Vec<String>,

    /// Disable the allow-list without clearing it
    #[serde(default)]
    pub ignore_allowed: bool,
}

impl ModulesConfig {
    pub fn filter(&self) -> ModuleFilter {
        ModuleFilter::new(self.allowed.clone(), self.ignore_allowed)
    }
}

/// Kernel thread tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSettings {
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Per-subscriber event queue capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Stack size of module threads in bytes; none uses the platform default
    #[serde(default)]
    pub thread_stack_size: Option<usize>,
}

fn default_command_capacity() -> usize {
    DEFAULT_COMMAND_CAPACITY
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            thread_stack_size: None,
        }
    }
}

// ==================== Kernel Config ====================

/// Complete kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub modules: ModulesConfig,

    #[serde(default)]
    pub kernel: KernelSettings,
}

impl KernelConfig {
    /// Load from `path`; the format follows the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("Failed to read config {:?}: {}", path, e)))?;

        if is_json(path) {
            serde_json::from_str(&content)
                .map_err(|e| KernelError::Config(format!("Failed to parse config {:?}: {}", path, e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| KernelError::Config(format!("Failed to parse config {:?}: {}", path, e)))
        }
    }

    /// Load from the default location; a missing file yields defaults
    pub fn load_default() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            KernelError::Config("Could not determine config path".to_string())
        })?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_default().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to `path`, creating the parent directory
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KernelError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| KernelError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| KernelError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| KernelError::Config(format!("Failed to write config {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert!(config.logging.log_dir.is_none());
        assert!(config.modules.default.is_empty());
        assert_eq!(config.kernel.command_capacity, DEFAULT_COMMAND_CAPACITY);
        assert!(config.modules.filter().permits("anything"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: KernelConfig = toml::from_str(
            r#"
            [modules]
            default = ["Scalar Source"]
            "#,
        )
        .unwrap();
        assert_eq!(config.modules.default, vec!["Scalar Source"]);
        assert!(config.logging.ansi);
        assert_eq!(config.kernel.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_toml_and_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KernelConfig::default();
        config.modules.allowed = vec!["Scale".into()];
        config.kernel.thread_stack_size = Some(512 * 1024);

        for file in ["kernel.toml", "nested/kernel.json"] {
            let path = dir.path().join(file);
            config.save(&path).unwrap();
            assert_eq!(KernelConfig::load(&path).unwrap(), config);
        }

        let json = std::fs::read_to_string(dir.path().join("nested/kernel.json")).unwrap();
        assert!(json.trim_start().starts_with('{'));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[modules\n").unwrap();
        assert!(matches!(KernelConfig::load(&path), Err(KernelError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[logging]\nfilter = \"warn\"\n").unwrap();

        std::env::set_var(CONFIG_ENV, &path);
        assert_eq!(config_path(), Some(path.clone()));
        let config = KernelConfig::load_default().unwrap();
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    #[serial]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_ENV, dir.path().join("absent.toml"));
        let config = KernelConfig::load_default().unwrap();
        std::env::remove_var(CONFIG_ENV);

        assert_eq!(config, KernelConfig::default());
    }
}
