//! Module configuration resolved from the process environment.
//!
//! # Responsibility
//! - Collect the few knobs the host cannot pass through the ABI.
//! - Resolve them once per process so every entry point sees the same values.
//!
//! # Invariants
//! - Invalid values fall back to defaults; configuration never fails loading.
//! - `log_dir` is only set for absolute paths.

use crate::logging::default_log_level;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable selecting the log level.
pub const ENV_LOG_LEVEL: &str = "SHADEX_LOG_LEVEL";
/// Environment variable selecting the rolling log directory.
pub const ENV_LOG_DIR: &str = "SHADEX_LOG_DIR";
/// Environment variable capping dimensions accepted by sized initializers.
pub const ENV_MAX_DIMENSION: &str = "SHADEX_MAX_DIMENSION";

/// Default cap for initializer-declared dimensions.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

static GLOBAL_CONFIG: OnceLock<ModuleConfig> = OnceLock::new();

/// Process-wide module settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub log_level: String,
    /// Logging stays disabled when unset.
    pub log_dir: Option<PathBuf>,
    pub max_dimension: u32,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl ModuleConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = non_empty(lookup(ENV_LOG_LEVEL)) {
            config.log_level = level;
        }

        if let Some(dir) = non_empty(lookup(ENV_LOG_DIR)) {
            let path = PathBuf::from(dir);
            if path.is_absolute() {
                config.log_dir = Some(path);
            }
        }

        if let Some(raw) = non_empty(lookup(ENV_MAX_DIMENSION)) {
            match raw.parse::<u32>() {
                Ok(value) if value > 0 => config.max_dimension = value,
                _ => {}
            }
        }

        config
    }

    /// Configuration resolved once from the environment and cached.
    pub fn global() -> &'static ModuleConfig {
        GLOBAL_CONFIG.get_or_init(Self::from_env)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
