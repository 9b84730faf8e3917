use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, RwLock},
    time::Duration,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    larkbot_channels::{
        ChannelEvent, ChannelEventSink, ChannelHealthSnapshot, ChannelMessageMeta,
        ChannelOutbound, ChannelPlugin, ChannelReplyTarget, ChannelStatus, DuplicateGuard,
        GroupAddressFilter,
    },
    larkbot_media::TransientFetcher,
    tracing::{debug, info, warn},
};

use crate::{
    access::{self, AccessDenied, InboundContext},
    api::FeishuApi,
    client::FeishuHttpClient,
    config::{FeishuAccountConfig, FeishuConfig},
    event::EventEnvelope,
    outbound::{DeliveryPipeline, FeishuOutbound},
    probe::{DEFAULT_PROBE_TIMEOUT, probe_api},
    state::{AccountState, AccountStateMap},
    status::{AccountSnapshot, StatusIssue, collect_status_issues},
};

pub const CHANNEL_TYPE: &str = "feishu";

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundDisposition {
    /// Already seen within the suppression window.
    Duplicate,
    /// Not a text message, or nobody is listening.
    Ignored,
    Denied(AccessDenied),
    /// Handed to the event sink for a reply.
    Dispatched,
}

/// Feishu / Lark channel plugin.
pub struct FeishuPlugin {
    accounts: AccountStateMap,
    outbound: FeishuOutbound,
    event_sink: Option<Arc<dyn ChannelEventSink>>,
    media_dir: Option<PathBuf>,
}

impl FeishuPlugin {
    pub fn new() -> Self {
        let accounts: AccountStateMap = Arc::new(RwLock::new(HashMap::new()));
        let outbound = FeishuOutbound {
            accounts: Arc::clone(&accounts),
        };
        Self {
            accounts,
            outbound,
            event_sink: None,
            media_dir: None,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ChannelEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Scratch directory for downloaded media. Defaults to the OS temp dir.
    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }

    pub fn shared_outbound(&self) -> Arc<dyn ChannelOutbound> {
        Arc::new(FeishuOutbound {
            accounts: Arc::clone(&self.accounts),
        })
    }

    pub fn account_ids(&self) -> Vec<String> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_account(&self, account_id: &str) -> bool {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.contains_key(account_id)
    }

    /// The delivery pipeline of a running account.
    pub fn pipeline(&self, account_id: &str) -> Option<DeliveryPipeline> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).map(|s| s.pipeline.clone())
    }

    /// How long to wait before posting a placeholder reply, if enabled.
    pub fn thinking_threshold(&self, account_id: &str) -> Option<Duration> {
        let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
        accounts
            .get(account_id)
            .and_then(|s| s.config.thinking_threshold())
    }

    /// Register an account backed by `api`.
    pub fn start_account_with_api(
        &mut self,
        account_id: &str,
        config: FeishuAccountConfig,
        api: Arc<dyn FeishuApi>,
    ) -> Result<()> {
        let mut fetcher = TransientFetcher::with_timeout(config.request_timeout())?
            .with_file_prefix(CHANNEL_TYPE)
            .with_max_bytes(config.media_max_bytes());
        if let Some(dir) = &self.media_dir {
            fetcher = fetcher.with_dir(dir.clone());
        }

        info!(account_id, app_id = %config.app_id, "starting feishu account");
        let state = AccountState {
            account_id: account_id.to_string(),
            pipeline: DeliveryPipeline::new(account_id, api, fetcher),
            dedup: Arc::new(DuplicateGuard::new()),
            filter: GroupAddressFilter::new(&config.bot_names),
            event_sink: self.event_sink.clone(),
            config,
        };
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        accounts.insert(account_id.to_string(), state);
        Ok(())
    }

    /// Start every enabled account of a `channels.feishu` section and return
    /// the configuration issues found along the way. Unconfigured accounts
    /// are reported, not started.
    pub async fn start_section(&mut self, section: serde_json::Value) -> Result<Vec<StatusIssue>> {
        let section = FeishuConfig::from_value(section)?;
        let mut snapshots = Vec::new();
        for account_id in section.account_ids() {
            let resolved = section.resolve_account(Some(&account_id))?;
            snapshots.push(AccountSnapshot::from(&resolved));
            if !resolved.enabled() {
                info!(account_id, "feishu account disabled, not starting");
                continue;
            }
            if !resolved.configured() {
                warn!(account_id, "feishu account missing credentials, not starting");
                continue;
            }
            let config = serde_json::to_value(&resolved.config)?;
            self.start_account(&account_id, config).await?;
        }
        Ok(collect_status_issues(&snapshots))
    }

    /// Configuration issues of the running accounts.
    pub fn status_issues(&self) -> Vec<StatusIssue> {
        let snapshots: Vec<AccountSnapshot> = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .values()
                .map(|s| AccountSnapshot::from_config(&s.account_id, &s.config))
                .collect()
        };
        collect_status_issues(&snapshots)
    }

    /// Process one `im.message.receive_v1` event payload.
    pub async fn ingest_event(
        &self,
        account_id: &str,
        payload: serde_json::Value,
    ) -> Result<InboundDisposition> {
        let envelope =
            EventEnvelope::from_value(payload).map_err(larkbot_channels::Error::invalid_input)?;
        let (config, dedup, filter, event_sink) = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            let state = accounts
                .get(account_id)
                .ok_or_else(|| larkbot_channels::Error::unknown_account(account_id))?;
            (
                state.config.clone(),
                Arc::clone(&state.dedup),
                state.filter.clone(),
                state.event_sink.clone(),
            )
        };

        let event_id = envelope.dedup_key().map(str::to_string);
        if dedup.check_and_mark(event_id.as_deref()) {
            debug!(account_id, event_id = ?event_id, "duplicate feishu event dropped");
            if let Some(sink) = event_sink.as_ref() {
                sink.emit(ChannelEvent::DuplicateDropped {
                    channel_type: CHANNEL_TYPE.into(),
                    account_id: account_id.to_string(),
                    event_id: event_id.unwrap_or_default(),
                })
                .await;
            }
            return Ok(InboundDisposition::Duplicate);
        }

        let Some(text) = envelope.text() else {
            debug!(
                account_id,
                message_type = %envelope.message().message_type,
                "non-text feishu message ignored"
            );
            return Ok(InboundDisposition::Ignored);
        };

        let message = envelope.message();
        let chat_type = envelope.chat_type();
        let sender_ids = envelope.sender_ids();
        let peer_id = sender_ids.first().copied().unwrap_or("unknown").to_string();
        let access = access::check_access(&config, &filter, &InboundContext {
            chat_type,
            sender_ids: &sender_ids,
            chat_id: &message.chat_id,
            text: &text,
            mention_count: envelope.mention_count(),
        });

        if let Some(sink) = event_sink.as_ref() {
            sink.emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL_TYPE.into(),
                account_id: account_id.to_string(),
                peer_id: peer_id.clone(),
                chat_type,
                sender_name: None,
                access_granted: access.is_ok(),
            })
            .await;
        }

        if let Err(reason) = access {
            debug!(account_id, chat_id = %message.chat_id, %reason, "feishu message not answered");
            return Ok(InboundDisposition::Denied(reason));
        }

        let Some(sink) = event_sink else {
            warn!(
                account_id,
                "feishu inbound message ignored: no channel event sink"
            );
            return Ok(InboundDisposition::Ignored);
        };

        let reply_to = ChannelReplyTarget {
            channel_type: CHANNEL_TYPE.into(),
            account_id: account_id.to_string(),
            chat_id: message.chat_id.clone(),
            message_id: Some(message.message_id.clone()),
        };
        sink.dispatch_to_chat(&text, reply_to, ChannelMessageMeta {
            channel_type: CHANNEL_TYPE.into(),
            chat_type,
            sender_id: peer_id,
            sender_name: None,
            model: config.model.clone(),
            model_provider: config.model_provider.clone(),
        })
        .await;
        Ok(InboundDisposition::Dispatched)
    }
}

impl Default for FeishuPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelPlugin for FeishuPlugin {
    fn id(&self) -> &str {
        CHANNEL_TYPE
    }

    fn name(&self) -> &str {
        "Feishu"
    }

    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()> {
        let cfg: FeishuAccountConfig = serde_json::from_value(config)?;
        if !cfg.is_configured() {
            return Err(larkbot_channels::Error::unavailable(
                "Feishu app_id and app_secret are required",
            )
            .into());
        }
        let client = FeishuHttpClient::new(cfg.clone())?;
        self.start_account_with_api(account_id, cfg, Arc::new(client))
    }

    async fn stop_account(&mut self, account_id: &str) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(|e| e.into_inner());
        if accounts.remove(account_id).is_none() {
            warn!(account_id, "feishu account not found");
        } else {
            info!(account_id, "stopped feishu account");
        }
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for FeishuPlugin {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot> {
        let api = {
            let accounts = self.accounts.read().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(account_id)
                .map(|s| Arc::clone(s.pipeline.api()))
        };
        let Some(api) = api else {
            return Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some("account not started".into()),
            });
        };

        let result = probe_api(api.as_ref(), DEFAULT_PROBE_TIMEOUT).await;
        let details = if result.ok {
            let name = result
                .bot
                .as_ref()
                .and_then(|b| b.app_name.clone())
                .unwrap_or_else(|| "bot".into());
            format!("{name} ({}ms)", result.elapsed_ms)
        } else {
            result.error.clone().unwrap_or_default()
        };
        Ok(ChannelHealthSnapshot {
            connected: result.ok,
            account_id: account_id.to_string(),
            details: Some(details),
        })
    }
}
