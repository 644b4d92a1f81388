//! Cache configuration

use super::error::{Result, VariantError};
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "PARSANOL_VARIANTS_CACHE_DIR";

/// Default artifact file name prefix
pub const DEFAULT_PREFIX: &str = "parser";

/// Default resident artifact limit (10 user variants plus the 2 baselines)
pub const DEFAULT_MAX_RESIDENT: usize = 12;

/// Resident limit used in test mode, large enough that eviction never runs
pub const TEST_MODE_MAX_RESIDENT: usize = 1000;

/// Configuration for the variant cache
///
/// # Example
///
/// ```
/// use parsanol_variants::variants::CacheConfig;
///
/// let config = CacheConfig::new("/tmp/variants").with_max_resident(4);
/// assert!(config.cache_dir.ends_with("parsers"));
/// assert_eq!(config.effective_max_resident(), 4);
/// assert_eq!(config.with_test_mode(true).effective_max_resident(), 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Artifact store directory
    pub cache_dir: PathBuf,

    /// Directory holding the baseline templates
    pub template_dir: PathBuf,

    /// Artifact file name prefix
    pub prefix: String,

    /// Maximum number of resident artifacts, baselines included
    pub max_resident: usize,

    /// Disable eviction for validation workloads
    pub test_mode: bool,
}

impl CacheConfig {
    /// Config rooted at `root`: store in `<root>/parsers`, templates in `<root>/templates`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_dir: root.join("parsers"),
            template_dir: root.join("templates"),
            prefix: DEFAULT_PREFIX.to_string(),
            max_resident: DEFAULT_MAX_RESIDENT,
            test_mode: false,
        }
    }

    /// Config rooted at `$PARSANOL_VARIANTS_CACHE_DIR`, or the per-user default
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os(CACHE_DIR_ENV) {
            Some(root) => PathBuf::from(root),
            None => default_cache_root()?,
        };
        Ok(Self::new(root))
    }

    /// Set the artifact store directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the baseline template directory
    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    /// Set the artifact file name prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the resident artifact limit
    pub fn with_max_resident(mut self, max: usize) -> Self {
        self.max_resident = max;
        self
    }

    /// Enable or disable test mode
    pub fn with_test_mode(mut self, enabled: bool) -> Self {
        self.test_mode = enabled;
        self
    }

    /// The limit eviction actually enforces
    pub fn effective_max_resident(&self) -> usize {
        if self.test_mode {
            TEST_MODE_MAX_RESIDENT
        } else {
            self.max_resident
        }
    }
}

pub(crate) fn default_cache_root() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(VariantError::MissingHomeDir)?;

    Ok(home.join(".cache").join("parsanol-variants"))
}
