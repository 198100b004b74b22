use std::path::{Path, PathBuf};

use serde::Deserialize;

// =============================================================================
// Resolution constants
// =============================================================================

/// Default npm registry URL
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Registry queries allowed in flight during a parent-version crawl
pub const DEFAULT_CRAWL_CONCURRENCY: usize = 5;

/// Retries after the first attempt of a single registry query
pub const DEFAULT_RETRIES: u32 = 5;

/// Delay before the first retry in milliseconds; doubled on each retry
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Printed by npm when several `npm info` processes race on its update check
pub const NPM_UPDATE_CHECK_FAILED: &str = "npm update check failed";

/// Rendered by [`crate::version::error::RegistryError::Contention`]
pub const REGISTRY_CONTENTION: &str = "registry contention";

pub fn default_transient_markers() -> Vec<String> {
    vec![
        NPM_UPDATE_CHECK_FAILED.to_string(),
        REGISTRY_CONTENTION.to_string(),
    ]
}

/// Resolver configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub packages: PackagesConfig,
    pub registry: RegistryConfig,
    pub crawl: CrawlConfig,
    pub log: LogConfig,
}

impl ResolverConfig {
    /// Reads a JSON configuration file; missing fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Names of the packages whose versions are correlated
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PackagesConfig {
    /// Project generator
    pub scaffold: String,
    /// Build tooling library the generated project depends on
    pub scripts: String,
    /// Library that ejected projects keep depending on
    pub utilities: String,
    /// Packages whose declared versions follow the update instant
    pub companions: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            scaffold: "create-react-app".to_string(),
            scripts: "react-scripts".to_string(),
            utilities: "react-dev-utils".to_string(),
            companions: vec!["react".to_string(), "react-dom".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// npm registry HTTP API
    #[default]
    Http,
    /// `npm info` subprocesses
    Cli,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub transport: Transport,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            transport: Transport::Http,
        }
    }
}

/// Parent-version crawl tuning
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlConfig {
    pub concurrency: usize,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub transient_markers: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CRAWL_CONCURRENCY,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            transient_markers: default_transient_markers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
    pub json: bool,
}

/// Returns the path to the data directory for scaffold-versions.
/// Uses $XDG_DATA_HOME/scaffold-versions if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/scaffold-versions,
/// or ./scaffold-versions if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the default path of the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("scaffold-versions.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("scaffold-versions")
}
