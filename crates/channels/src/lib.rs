//! Channel plugin system.
//!
//! Shared building blocks for chat-platform integrations: the `ChannelPlugin`
//! trait family, access gating, inbound event deduplication, and the
//! group-chat reply filter.

pub mod dedup;
pub mod error;
pub mod gating;
pub mod group_filter;
pub mod plugin;

pub use {
    dedup::DuplicateGuard,
    error::{Error, Result},
    group_filter::{GroupAddressFilter, should_respond_in_group},
    plugin::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelMessageMeta,
        ChannelOutbound, ChannelPlugin, ChannelReplyTarget, ChannelStatus,
    },
};
