//! Application configuration.
//!
//! Settings are read from an optional config file overlaid with environment
//! variables (`ANON_PROXY_ADDR`, `STORE_URI`, `REQUEST_TIMEOUT_SECONDS`,
//! `DOWNLOAD_MAX_BYTES`, `MONITOR_POOL_SIZE`, `MONITOR_CAP_PER_OWNER`,
//! `LOG_DIR`, ...). Every field has a default so the daemon starts with no
//! configuration at all.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

fn default_store_uri() -> String {
    "sqlite://onionwatch.db".to_string()
}

fn default_anon_proxy_addr() -> String {
    "socks5h://127.0.0.1:9050".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_fetch_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_download_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_file_downloads() -> usize {
    10
}

fn default_monitor_pool_size() -> usize {
    4
}

fn default_monitor_cap_per_owner() -> u32 {
    5
}

fn default_scheduler_tick_seconds() -> u64 {
    30
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

fn default_signature_scanner_path() -> String {
    "/usr/bin/clamscan".to_string()
}

fn default_metadata_extractor_path() -> String {
    "/usr/bin/exiftool".to_string()
}

/// Application configuration for Onionwatch.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Connection string for the scan store.
    #[serde(default = "default_store_uri")]
    pub store_uri: String,

    /// SOCKS5 endpoint used to reach hidden services.
    #[serde(default = "default_anon_proxy_addr")]
    pub anon_proxy_addr: String,

    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Wall-clock deadline for a single page fetch, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Response size cap applied while reading a page body.
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: u64,

    /// Size cap for a single file download.
    #[serde(default = "default_download_max_bytes")]
    pub download_max_bytes: u64,

    /// Maximum file links retrieved per scan.
    #[serde(default = "default_max_file_downloads")]
    pub max_file_downloads: usize,

    /// Number of concurrent monitor scan workers.
    #[serde(default = "default_monitor_pool_size")]
    pub monitor_pool_size: usize,

    /// Maximum monitors a single owner may register.
    #[serde(default = "default_monitor_cap_per_owner")]
    pub monitor_cap_per_owner: u32,

    /// Seconds between scheduler wake-ups.
    #[serde(default = "default_scheduler_tick_seconds")]
    pub scheduler_tick_seconds: u64,

    /// Maximum seconds to wait for graceful shutdown.
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,

    /// Directory for the log file; logs go to stdout when unset.
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Path of the external malware signature scanner.
    #[serde(default = "default_signature_scanner_path")]
    pub signature_scanner_path: String,

    /// Path of the external file metadata extractor.
    #[serde(default = "default_metadata_extractor_path")]
    pub metadata_extractor_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_uri: default_store_uri(),
            anon_proxy_addr: default_anon_proxy_addr(),
            listen_address: default_listen_address(),
            request_timeout_seconds: default_request_timeout_seconds(),
            fetch_max_bytes: default_fetch_max_bytes(),
            download_max_bytes: default_download_max_bytes(),
            max_file_downloads: default_max_file_downloads(),
            monitor_pool_size: default_monitor_pool_size(),
            monitor_cap_per_owner: default_monitor_cap_per_owner(),
            scheduler_tick_seconds: default_scheduler_tick_seconds(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
            log_dir: None,
            signature_scanner_path: default_signature_scanner_path(),
            metadata_extractor_path: default_metadata_extractor_path(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from an optional file overlaid with environment
    /// variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path.unwrap_or("onionwatch")).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;
        s.try_deserialize()
    }

    /// Wall-clock deadline for a single page fetch.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Interval between scheduler wake-ups.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_seconds)
    }

    /// Deadline for graceful shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}
