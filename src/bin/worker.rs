// Copyright 2026 Saturn Contributors
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

//! The `worker` binary: loads config, wires a [`Broker`], and runs it
//! until a shutdown signal arrives (§10.5 of SPEC_FULL.md).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use saturn_broker::config::{make_config_loader, BrokerConfig};
use saturn_broker::control_plane::HttpControlPlaneClient;
use saturn_broker::error::SafeDisplay;
use saturn_broker::executor::{Executor, PipelineResult};
use saturn_broker::message::PipelineMessage;
use saturn_broker::registry::{QueueRegistry, TaskRegistry};
use saturn_broker::services::ServicesManager;
use saturn_broker::tracing_setup::init_tracing;
use saturn_broker::Broker;

#[derive(Parser)]
#[command(name = "worker", about = "Saturn worker broker")]
struct Cli {
    /// Path to a TOML config file; overridden by SATURN__-prefixed env vars.
    #[arg(long, default_value = "config/saturn-worker.toml")]
    config: PathBuf,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

/// A no-op [`Executor`] shipped as the binary's default until a real
/// pipeline backend is wired in; concrete pipeline execution is a
/// pluggable, out-of-scope collaborator.
struct PassthroughExecutor;

#[async_trait]
impl Executor for PassthroughExecutor {
    async fn process_message(&self, _message: PipelineMessage) -> anyhow::Result<PipelineResult> {
        Ok(PipelineResult::default())
    }

    async fn close(&self) {}
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loader = if cli.config == PathBuf::from("config/saturn-worker.toml") {
        make_config_loader()
    } else {
        saturn_broker::config::ConfigLoader::new(&cli.config)
    };
    let config: BrokerConfig = loader.load()?;

    if cli.dump_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config
        .validate()
        .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;

    init_tracing(&config.tracing);
    tracing::info!("loaded configuration:\n{}", config.to_safe_string());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let control_plane = Arc::new(HttpControlPlaneClient::new(config.control_plane_url.clone()));
    let executor: Arc<dyn Executor> = Arc::new(PassthroughExecutor);
    let queue_registry = Arc::new(QueueRegistry::new());
    let task_registry = Arc::new(TaskRegistry::new());
    let services = ServicesManager::new();

    let broker = Arc::new(Broker::new(
        &config,
        control_plane,
        executor,
        queue_registry,
        task_registry,
        services,
    ));

    let shutdown_broker = broker.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown_broker.stop();
    });

    broker.run().await.map_err(Into::into)
}
