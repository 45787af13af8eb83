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

use std::{path::PathBuf, sync::Arc};

use alloy::{primitives::Address, providers::ProviderBuilder};
use anyhow::{Context, Result};
use clap::Parser;
use event_sync::{
    kv_store_from_uri, profiles::ProfileKind, AlloyEndpoint, ChainEndpoint, RefreshOutcome,
    SyncConfig, SyncCoordinator, SyncEvent,
};
use url::Url;

/// Arguments of the event sync CLI.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Url,
    /// Address of the contract emitting the events.
    #[clap(short, long, env)]
    contract: Address,
    /// Event profile: "proposals" or "locks".
    #[clap(long, env, default_value = "proposals")]
    profile: ProfileKind,
    /// Block the contract was deployed at. Scans never start below it.
    #[clap(long, env)]
    deployment_block: u64,
    /// Optional TOML config file. Defaults are used when omitted.
    #[clap(long, env)]
    config: Option<PathBuf>,
    /// Cache storage URI (memory://, file:///path/to/cache or sqlite:path/to/cache.db).
    #[clap(long, env, default_value = "memory://")]
    cache_uri: String,
    /// Run a refresh pass after the first load.
    #[clap(long, default_value_t = false)]
    refresh: bool,
    /// Remove the cached envelope before loading.
    #[clap(long, default_value_t = false)]
    clear_cache: bool,
    /// Number of pages to print.
    #[clap(long, default_value = "1")]
    pages: usize,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = match &args.config {
        Some(path) => SyncConfig::load(path).await.context("Failed to load sync config")?,
        None => SyncConfig::default(),
    };

    let provider = ProviderBuilder::new().connect_http(args.rpc_url.clone());
    let endpoint: Arc<dyn ChainEndpoint> = Arc::new(AlloyEndpoint::new(provider));
    let store = kv_store_from_uri(&args.cache_uri)
        .await
        .with_context(|| format!("Failed to open cache {}", args.cache_uri))?;

    let coordinator: SyncCoordinator = SyncCoordinator::connect(
        endpoint,
        args.profile.build(),
        args.contract,
        args.deployment_block,
        store,
        &config,
    )
    .await
    .context("Failed to initialize event sync")?;

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::Merged { added, updated, total, watermark_block } => tracing::info!(
                    "Merged {} new and {updated} updated records, {total} total, watermark {watermark_block}",
                    added.len()
                ),
                SyncEvent::Error(err) => tracing::error!("Sync error: {err}"),
                SyncEvent::StateChanged(state) => tracing::debug!("State: {state}"),
            }
        }
    });

    if args.clear_cache {
        coordinator.clear_cache().await;
    }

    coordinator.request_page().await.context("Initial load failed")?;
    coordinator.wait_for_background().await;

    if args.refresh {
        match coordinator.request_refresh().await.context("Refresh failed")? {
            RefreshOutcome::Completed(summary) => tracing::info!(
                "Refreshed blocks {}..={}: {} new, {} updated",
                summary.from_block,
                summary.to_block,
                summary.added,
                summary.updated
            ),
            RefreshOutcome::Skipped => tracing::info!("Refresh skipped, a pass was in flight"),
        }
    }

    let mut snapshot = coordinator.snapshot().await;
    for _ in 1..args.pages {
        if snapshot.pending == 0 {
            break;
        }
        snapshot = coordinator.load_more().await;
    }

    for record in &snapshot.records {
        println!("{}", serde_json::to_string(record)?);
    }
    tracing::info!(
        "Printed {} records ({} pending), status {:?}, watermark {}, resolved through {}",
        snapshot.records.len(),
        snapshot.pending,
        snapshot.status,
        snapshot.watermark_block,
        snapshot.resolved_through_block
    );
    if let Some(err) = snapshot.last_error {
        anyhow::bail!("Sync finished with error: {err}");
    }

    Ok(())
}
