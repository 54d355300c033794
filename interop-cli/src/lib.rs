// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Context};
use clap::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracepost_interop::config::InteropNodeConfig;
use tracepost_interop_config::Config;
use url::Url;

pub const DEFAULT_SERVER_PORT: u16 = 9191;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub struct Args {
    #[clap(subcommand)]
    pub command: InteropCommand,
}

#[derive(Parser, Debug, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum InteropCommand {
    // Run an interop node from a YAML or JSON config file
    #[clap(name = "run")]
    Run {
        #[clap(long = "config-path", env = "INTEROP_NODE_CONFIG")]
        config_path: PathBuf,
    },
    #[clap(name = "create-interop-node-config-template")]
    CreateInteropNodeConfigTemplate {
        path: PathBuf,
        #[clap(long = "port", default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
    },
    // List the chains registered on a running node
    #[clap(name = "view-chains")]
    ViewChains {
        #[clap(long = "url")]
        url: Url,
    },
    // Show a cross-chain message known to a running node
    #[clap(name = "view-message")]
    ViewMessage {
        #[clap(long = "url")]
        url: Url,
        message_id: String,
    },
    #[clap(name = "verify")]
    Verify {
        #[clap(long = "url")]
        url: Url,
        #[clap(long = "tx-id")]
        tx_id: String,
        #[clap(long = "protocol", default_value = "auto")]
        protocol: String,
        #[clap(long = "source-chain-id")]
        source_chain_id: String,
        #[clap(long = "dest-chain-id")]
        dest_chain_id: String,
    },
}

pub fn generate_interop_node_config_and_write_to_file(path: &Path, port: u16) -> anyhow::Result<()> {
    InteropNodeConfig::template(port).save(path)
}

fn endpoint(base: &Url, path: &str) -> anyhow::Result<Url> {
    base.join(path)
        .with_context(|| format!("Invalid path {} for {}", path, base))
}

async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.context("Node returned a non-JSON body")?;
    if !status.is_success() {
        return Err(anyhow!(
            "Node answered {}: {}",
            status,
            body.get("error").and_then(Value::as_str).unwrap_or("unknown error")
        ));
    }
    Ok(body)
}

pub async fn view_chains(client: &reqwest::Client, url: &Url) -> anyhow::Result<Value> {
    read_json(client.get(endpoint(url, "interop/chains")?).send().await?).await
}

pub async fn view_message(
    client: &reqwest::Client,
    url: &Url,
    message_id: &str,
) -> anyhow::Result<Value> {
    let path = format!("interop/txs/{}", message_id);
    read_json(client.get(endpoint(url, &path)?).send().await?).await
}

pub async fn verify(
    client: &reqwest::Client,
    url: &Url,
    tx_id: &str,
    protocol: &str,
    source_chain_id: &str,
    dest_chain_id: &str,
) -> anyhow::Result<Value> {
    let body = json!({
        "tx_id": tx_id,
        "protocol": protocol,
        "source_chain_id": source_chain_id,
        "dest_chain_id": dest_chain_id,
    });
    read_json(
        client
            .post(endpoint(url, "interop/verify")?)
            .json(&body)
            .send()
            .await?,
    )
    .await
}
