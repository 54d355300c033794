// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use tracepost_interop::config::InteropNodeConfig;
use tracepost_interop::node::run_interop_node;
use tracepost_interop_cli::{
    generate_interop_node_config_and_write_to_file, verify, view_chains, view_message, Args,
    InteropCommand,
};
use tracepost_interop_config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    match args.command {
        InteropCommand::Run { config_path } => {
            let config = InteropNodeConfig::load(&config_path)?;
            info!("Loaded interop node config from {}", config_path.display());
            let handle = run_interop_node(config, prometheus::Registry::new()).await?;
            handle.await?;
        }
        InteropCommand::CreateInteropNodeConfigTemplate { path, port } => {
            generate_interop_node_config_and_write_to_file(&path, port)?;
            println!(
                "Interop node config template generated at {}",
                path.display()
            );
        }
        InteropCommand::ViewChains { url } => {
            let chains = view_chains(&reqwest::Client::new(), &url).await?;
            println!("{}", serde_json::to_string_pretty(&chains)?);
        }
        InteropCommand::ViewMessage { url, message_id } => {
            let message = view_message(&reqwest::Client::new(), &url, &message_id).await?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        InteropCommand::Verify {
            url,
            tx_id,
            protocol,
            source_chain_id,
            dest_chain_id,
        } => {
            let result = verify(
                &reqwest::Client::new(),
                &url,
                &tx_id,
                &protocol,
                &source_chain_id,
                &dest_chain_id,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
