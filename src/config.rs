// Copyright (c) 2026, Anthony DeDominic <adedomin@gmail.com>
//
// Permission to use, copy, modify, and/or distribute this software for any
// purpose with or without fee is hereby granted, provided that the above
// copyright notice and this permission notice appear in all copies.
//
// THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
// WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
// MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
// ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
// WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
// ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
// OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.

//! Configuration loading. A JSON file discovered via the systemd/XDG chain
//! supplies the base settings; individual fields may be overridden by
//! environment variables at startup.

use std::io::{self, ErrorKind};
use std::num::NonZero;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::Deserialize;

#[cfg(unix)]
mod env_vars {
    pub mod config {
        pub const BASE: &str = "CONFIGURATION_DIRECTORY";
        pub const USER: &str = "XDG_CONFIG_HOME";
        pub const FALLBACK: &str = "/etc";
    }
    pub mod rt {
        pub const BASE: &str = "RUNTIME_DIRECTORY";
        pub const USER: &str = "XDG_RUNTIME_DIR";
        pub const FALLBACK: &str = "/run";
    }
}

#[cfg(windows)]
mod env_vars {
    pub mod config {
        pub const BASE: &str = "EDGE_POLICY_GATEWAY_HOME";
        pub const USER: &str = "AppData";
        pub const FALLBACK: &str = r"C:\ProgramData";
    }
    pub mod rt {
        pub use super::config::*;
    }
}

use env_vars::{config, rt};

/// It's assumed the package name is the "above path" in the XDG and fallback case.
fn find_systemd_or_xdg_path(systemd: &str, xdg: &str, fallback: &str, dest: &str) -> PathBuf {
    let mut base = std::env::var_os(systemd)
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os(xdg).map(|p| {
                let mut p = PathBuf::from(p);
                p.push(env!("CARGO_PKG_NAME"));
                p
            })
        })
        .unwrap_or_else(|| {
            let mut p = PathBuf::from(fallback);
            p.push(env!("CARGO_PKG_NAME"));
            p
        });
    base.push(dest);
    base
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoErr(#[from] io::Error),
    #[error("failed to deserialize config: {0}")]
    DeserConfig(#[from] serde_json::Error),
    #[error("config file not found at {0:?} - see example config below:\n\n{EXAMPLE_CONFIG}")]
    NoConfig(PathBuf),
    #[error("invalid CIDR {0:?} in trustedProxies: {1}")]
    BadCidr(String, ipnetwork::IpNetworkError),
    #[error("{0} must be > 0 (got {1})")]
    NonPositive(&'static str, f64),
}

fn bind_default() -> String {
    "[::1]:8080".to_owned()
}

fn store_url_default() -> String {
    "redis://127.0.0.1:6379".to_owned()
}

fn key_prefix_default() -> String {
    String::new()
}

fn command_timeout_default() -> NonZero<u64> {
    NonZero::new(2).unwrap()
}

fn default_capacity_default() -> f64 {
    60.0
}

fn default_refill_tokens_default() -> f64 {
    60.0
}

fn default_refill_interval_default() -> f64 {
    60.0
}

fn admin_rate_limit_default() -> i64 {
    100
}

fn admin_rate_window_default() -> u64 {
    60
}

fn reputation_cache_ttl_default() -> u64 {
    3600
}

fn reputation_lock_ttl_default() -> u64 {
    5000
}

fn reputation_threshold_default() -> u8 {
    75
}

#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub max_age_in_days: Option<u32>,
}

#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReputationSettings {
    #[serde(default = "reputation_cache_ttl_default")]
    pub cache_ttl: u64,
    #[serde(default = "reputation_lock_ttl_default")]
    pub lock_ttl: u64,
    #[serde(default = "reputation_threshold_default")]
    pub block_threshold: u8,
    pub abuseipdb: Option<AdapterSettings>,
    pub ipqualityscore: Option<AdapterSettings>,
}

impl ReputationSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl)
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    #[serde(default = "store_url_default")]
    pub url: String,
    #[serde(default = "key_prefix_default")]
    pub key_prefix: String,
    #[serde(default = "command_timeout_default")]
    pub command_timeout_secs: NonZero<u64>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: store_url_default(),
            key_prefix: key_prefix_default(),
            command_timeout_secs: command_timeout_default(),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
    #[serde(default = "default_capacity_default")]
    pub default_capacity: f64,
    #[serde(default = "default_refill_tokens_default")]
    pub default_refill_tokens: f64,
    #[serde(default = "default_refill_interval_default")]
    pub default_refill_interval: f64,
    #[serde(default = "admin_rate_limit_default")]
    pub admin_rate_limit: i64,
    #[serde(default = "admin_rate_window_default")]
    pub admin_rate_window: u64,
    #[serde(default)]
    pub reputation: ReputationSettings,
    #[serde(default = "bind_default")]
    bind: String,
}

const PORT_ENV: [&str; 3] = ["HTTP_PLATFORM_PORT", "FUNCTIONS_CUSTOMHANDLER_PORT", "8080"];

impl Config {
    pub fn get_bind_addr(&self) -> String {
        if let Some(rtdir) = self.bind.strip_prefix("rt-dir:") {
            let socket_base = find_systemd_or_xdg_path(rt::BASE, rt::USER, rt::FALLBACK, rtdir);
            format!("unix:{}", socket_base.to_string_lossy())
        } else if let Some(inet) = self.bind.strip_suffix(":%PORT%") {
            let port = std::env::var(PORT_ENV[0])
                .or_else(|_| std::env::var(PORT_ENV[1]))
                .unwrap_or_else(|_| {
                    log::warn!("%PORT% could not be read from the environment; defaulting to {}", PORT_ENV[2]);
                    PORT_ENV[2].to_string()
                });
            format!("{inet}:{port}")
        } else {
            self.bind.clone()
        }
    }

    pub fn default_refill_rate(&self) -> f64 {
        self.default_refill_tokens / self.default_refill_interval
    }

    pub fn trusted_proxy_networks(&self) -> Result<Vec<IpNetwork>, ConfigError> {
        self.trusted_proxies
            .iter()
            .map(|s| s.parse().map_err(|e| ConfigError::BadCidr(s.clone(), e)))
            .collect()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("GATEWAY_STORE_URL") {
            self.store.url = url;
        }
        if let Ok(prefix) = std::env::var("GATEWAY_STORE_KEY_PREFIX") {
            self.store.key_prefix = prefix;
        }
        if let Ok(cap) = std::env::var("GATEWAY_DEFAULT_CAPACITY")
            && let Ok(cap) = cap.parse()
        {
            self.default_capacity = cap;
        }
        if let Ok(tokens) = std::env::var("GATEWAY_DEFAULT_REFILL_TOKENS")
            && let Ok(tokens) = tokens.parse()
        {
            self.default_refill_tokens = tokens;
        }
        if let Ok(interval) = std::env::var("GATEWAY_DEFAULT_REFILL_INTERVAL")
            && let Ok(interval) = interval.parse()
        {
            self.default_refill_interval = interval;
        }
        if let Ok(key) = std::env::var("GATEWAY_ABUSEIPDB_API_KEY") {
            self.reputation
                .abuseipdb
                .get_or_insert_with(AdapterSettings::default)
                .api_key = key;
        }
        if let Ok(key) = std::env::var("GATEWAY_IPQUALITYSCORE_API_KEY") {
            self.reputation
                .ipqualityscore
                .get_or_insert_with(AdapterSettings::default)
                .api_key = key;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_capacity <= 0.0 {
            return Err(ConfigError::NonPositive("defaultCapacity", self.default_capacity));
        }
        if self.default_refill_rate() <= 0.0 {
            return Err(ConfigError::NonPositive("defaultRefillTokens/defaultRefillInterval", self.default_refill_rate()));
        }
        Ok(())
    }
}

pub fn open_and_parse<T>(config_path: T) -> Result<Config, ConfigError>
where
    T: std::fmt::Debug + AsRef<Path>,
{
    match std::fs::File::open(&config_path) {
        Ok(file) => {
            let file = std::io::BufReader::new(file);
            Ok(serde_json::from_reader(file)?)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ConfigError::NoConfig(config_path.as_ref().to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_config() -> Result<Config, ConfigError> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            find_systemd_or_xdg_path(config::BASE, config::USER, config::FALLBACK, "config.json")
        });
    let mut config = open_and_parse(config_path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

const EXAMPLE_CONFIG: &str = r###"
{ "store":
    { "url": "redis://127.0.0.1:6379"
    , "keyPrefix": ""
    , "commandTimeoutSecs": 2
    }
, "trustedProxies": ["10.0.0.0/8"]
, "defaultCapacity": 60
, "defaultRefillTokens": 60
, "defaultRefillInterval": 60
, "adminRateLimit": 100
, "adminRateWindow": 60
, "reputation":
    { "cacheTtl": 3600
    , "lockTtl": 5000
    , "blockThreshold": 75
    , "abuseipdb": { "apiKey": "...", "baseUrl": "https://api.abuseipdb.com/api/v2", "maxAgeInDays": 30 }
    , "ipqualityscore": { "apiKey": "...", "baseUrl": "https://ipqualityscore.com/api/json/ip" }
    }
, "bind": "[::1]:8080"
}
"###;
