// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod bridge_manager;
pub mod builders;
pub mod chain_registry;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod message_store;
pub mod metrics;
pub mod node;
pub mod relay;
pub mod server;
pub mod standards;
pub mod status_tracker;
pub mod sweeper;
pub mod types;
pub mod verification;

#[cfg(test)]
pub(crate) mod test_utils;
