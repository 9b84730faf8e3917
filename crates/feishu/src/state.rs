use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use larkbot_channels::{ChannelEventSink, DuplicateGuard, GroupAddressFilter};

use crate::{config::FeishuAccountConfig, outbound::DeliveryPipeline};

/// Shared account state map.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

/// Per-account runtime state.
pub struct AccountState {
    pub account_id: String,
    pub config: FeishuAccountConfig,
    pub pipeline: DeliveryPipeline,
    pub dedup: Arc<DuplicateGuard>,
    pub filter: GroupAddressFilter,
    pub event_sink: Option<Arc<dyn ChannelEventSink>>,
}
