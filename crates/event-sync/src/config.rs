// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tunables for scanning, retrying, caching and hydration.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::fetcher::RetryPolicy;

pub mod defaults {
    pub const fn chunk_size() -> u64 {
        // Large enough to keep round-trips low, small enough for the usual 10k-log response caps.
        5_000
    }

    pub const fn chunk_pause_ms() -> u64 {
        250
    }

    pub const fn reorg_buffer() -> u64 {
        12
    }

    pub const fn max_retries() -> u32 {
        4
    }

    pub const fn base_delay_ms() -> u64 {
        500
    }

    pub const fn max_jitter_ms() -> u64 {
        250
    }

    pub const fn max_items() -> usize {
        2_000
    }

    pub const fn batch_size() -> usize {
        50
    }

    pub const fn timestamp_concurrency() -> usize {
        4
    }

    pub const fn page_size() -> usize {
        25
    }
}

/// Block range scanning settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of blocks requested per `eth_getLogs` call.
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: u64,
    /// Pause inserted between successive chunk fetches.
    #[serde(default = "defaults::chunk_pause_ms")]
    pub chunk_pause_ms: u64,
    /// Blocks re-scanned below the resolved-through block on resume.
    #[serde(default = "defaults::reorg_buffer")]
    pub reorg_buffer: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::chunk_size(),
            chunk_pause_ms: defaults::chunk_pause_ms(),
            reorg_buffer: defaults::reorg_buffer(),
        }
    }
}

impl ScanConfig {
    pub fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }
}

/// Backoff applied to rate-limited endpoint calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "defaults::max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
            max_jitter_ms: defaults::max_jitter_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

/// Persisted cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of events kept in a persisted envelope. Oldest events are dropped first.
    #[serde(default = "defaults::max_items")]
    pub max_items: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_items: defaults::max_items() }
    }
}

/// Detail hydration settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HydrationConfig {
    /// Maximum number of calls packed into one aggregated call.
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    /// Worker count for block timestamp lookups.
    #[serde(default = "defaults::timestamp_concurrency")]
    pub timestamp_concurrency: usize,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            timestamp_concurrency: defaults::timestamp_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PageConfig {
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self { page_size: defaults::page_size() }
    }
}

/// Engine configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub hydration: HydrationConfig,
    #[serde(default)]
    pub page: PageConfig,
}

impl SyncConfig {
    /// Load the config from a TOML file on disk
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        let config: Self =
            toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config to disk
    pub async fn write(&self, path: &Path) -> Result<()> {
        let data = toml::to_string(&self).context("Failed to serialize config")?;
        fs::write(path, data).await.context("Failed to write config to disk")
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.scan.chunk_size > 0, "scan.chunk_size must be greater than zero");
        anyhow::ensure!(self.page.page_size > 0, "page.page_size must be greater than zero");
        anyhow::ensure!(
            self.hydration.batch_size > 0,
            "hydration.batch_size must be greater than zero"
        );
        anyhow::ensure!(
            self.hydration.timestamp_concurrency > 0,
            "hydration.timestamp_concurrency must be greater than zero"
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs::File,
        io::{Seek, Write},
    };
    use tempfile::NamedTempFile;

    const CONFIG_TEMPL: &str = r#"
[scan]
chunk_size = 2000
chunk_pause_ms = 0
reorg_buffer = 6

[retry]
max_retries = 2
base_delay_ms = 10

[page]
page_size = 10"#;

    const BAD_CONFIG: &str = r#"
[scan]
chunk_size = ?"#;

    const ZERO_CHUNK_CONFIG: &str = r#"
[scan]
chunk_size = 0"#;

    fn write_config(data: &str, file: &mut File) {
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        file.write_all(data.as_bytes()).unwrap();
        file.set_len(data.len() as u64).unwrap();
    }

    #[tokio::test]
    async fn config_parser() {
        let mut config_temp = NamedTempFile::new().unwrap();
        write_config(CONFIG_TEMPL, config_temp.as_file_mut());
        let config = SyncConfig::load(config_temp.path()).await.unwrap();

        assert_eq!(config.scan.chunk_size, 2000);
        assert_eq!(config.scan.chunk_pause(), Duration::ZERO);
        assert_eq!(config.scan.reorg_buffer, 6);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 10);
        // Unset keys fall back to defaults.
        assert_eq!(config.retry.max_jitter_ms, defaults::max_jitter_ms());
        assert_eq!(config.cache.max_items, defaults::max_items());
        assert_eq!(config.hydration.batch_size, defaults::batch_size());
        assert_eq!(config.page.page_size, 10);

        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn empty_config_uses_defaults() {
        let mut config_temp = NamedTempFile::new().unwrap();
        write_config("", config_temp.as_file_mut());
        let config = SyncConfig::load(config_temp.path()).await.unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[tokio::test]
    async fn config_write_then_load() {
        let config_temp = NamedTempFile::new().unwrap();
        let mut config = SyncConfig::default();
        config.cache.max_items = 42;
        config.write(config_temp.path()).await.unwrap();

        let loaded = SyncConfig::load(config_temp.path()).await.unwrap();
        assert_eq!(loaded.cache.max_items, 42);
    }

    #[tokio::test]
    #[should_panic(expected = "Failed to parse toml file")]
    async fn bad_config() {
        let mut config_temp = NamedTempFile::new().unwrap();
        write_config(BAD_CONFIG, config_temp.as_file_mut());
        SyncConfig::load(config_temp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn zero_chunk_size_rejected() {
        let mut config_temp = NamedTempFile::new().unwrap();
        write_config(ZERO_CHUNK_CONFIG, config_temp.as_file_mut());
        let err = SyncConfig::load(config_temp.path()).await.unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }
}
