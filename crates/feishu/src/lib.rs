//! Feishu / Lark channel plugin.
//!
//! Inbound `im.message.receive_v1` events are deduplicated, gated by the
//! account's DM and group policies, and handed to the host's event sink.
//! Replies go out through [`DeliveryPipeline`], which uploads media to the
//! Open API and falls back to a plain link when rich delivery fails.

pub mod access;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod outbound;
pub mod plugin;
pub mod probe;
pub mod state;
pub mod status;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use {
    api::{BotInfo, FeishuApi},
    client::FeishuHttpClient,
    config::{FeishuAccountConfig, FeishuConfig, FeishuDomain},
    error::{Error, Result},
    outbound::{DeliveryOutcome, DeliveryPipeline},
    plugin::{FeishuPlugin, InboundDisposition},
    probe::{ProbeResult, probe_credentials},
    status::{StatusIssue, collect_status_issues},
    upload::{ContentHandle, RemoteUploader},
};
