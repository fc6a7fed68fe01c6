//! Popup-side client. Stateless apart from the tab it was opened on; every
//! call is bounded by a timeout and degrades to an error reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use crate::clock::{with_timeout, Clock};
use crate::config::ExtensionConfig;
use crate::detection::DetectionRecord;
use crate::error::{Error, RelayError, Result};
use crate::history::TransactionRecord;
use crate::protocol::{Reply, RuntimeMessage, TabMessage};
use crate::relay::Background;
use crate::router::Action;

/// `chrome.tabs`
#[async_trait(?Send)]
pub trait Tabs {
    async fn active_tab(&self) -> Result<Option<i32>>;
    async fn send(&self, tab_id: i32, message: TabMessage) -> Result<Reply>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Page,
    Background,
}

/// What the popup shows in its header, from whichever context answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupStatus {
    #[serde(skip, default = "default_source")]
    pub source: StatusSource,
    #[serde(default)]
    pub x402_detected: bool,
    #[serde(default)]
    pub x402_data: Option<DetectionRecord>,
    #[serde(default)]
    pub wallet_connected: bool,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

fn default_source() -> StatusSource {
    StatusSource::Page
}

pub struct PopupClient<C> {
    background: Rc<dyn Background>,
    tabs: Rc<dyn Tabs>,
    clock: C,
    config: Rc<ExtensionConfig>,
    tab: Cell<Option<i32>>,
}

impl<C: Clock> PopupClient<C> {
    pub fn new(background: Rc<dyn Background>, tabs: Rc<dyn Tabs>, clock: C, config: Rc<ExtensionConfig>) -> Self {
        Self {
            background,
            tabs,
            clock,
            config,
            tab: Cell::new(None),
        }
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn tab(&self) -> Option<i32> {
        self.tab.get()
    }

    async fn bounded<F>(&self, action: &str, timeout: Duration, call: F) -> Reply
    where
        F: Future<Output = Result<Reply>>,
    {
        match with_timeout(&self.clock, timeout, call).await {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => Reply::error(e),
            None => Reply::error(RelayError::Timeout {
                action: action.to_string(),
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn to_background(&self, message: RuntimeMessage) -> Reply {
        let name = message.name();
        self.bounded(name, self.config.timeouts.popup(), self.background.send(message))
            .await
    }

    /// `timeout` is the bridge budget behind the relay, if any
    async fn to_tab(&self, message: TabMessage, bridge_timeout: Duration) -> Reply {
        let Some(tab_id) = self.tab.get() else {
            return Reply::error("No active tab");
        };
        self.bounded(
            message.name(),
            self.config.timeouts.popup_for(bridge_timeout),
            self.tabs.send(tab_id, message),
        )
        .await
    }

    /// Check the coordinator is alive and remember the active tab
    pub async fn init(&self) -> Result<()> {
        let ping = self.to_background(RuntimeMessage::Ping).await;
        if let Some(e) = ping.error_message() {
            log::warn!("Background did not answer PING: {}", e);
        }
        let tab = self.tabs.active_tab().await?;
        log::info!("🪟 Popup opened on tab {:?}", tab);
        self.tab.set(tab);
        Ok(())
    }

    /// Ask the page first, then the background when the page is unreachable
    pub async fn check_status(&self) -> Result<PopupStatus> {
        let reply = self.to_tab(TabMessage::CheckStatus, Duration::ZERO).await;
        if reply.is_ok() {
            return reply.parse();
        }
        log::warn!(
            "Content script unavailable ({}), falling back to background state",
            reply.error_message().unwrap_or("no error")
        );
        let state = self.to_background(RuntimeMessage::GetState).await;
        let mut status: PopupStatus = serde_json::from_value(state.into_result()?).map_err(Error::from)?;
        status.source = StatusSource::Background;
        Ok(status)
    }

    pub async fn connect_wallet(&self) -> Reply {
        let timeouts = &self.config.timeouts;
        self.to_tab(
            TabMessage::ConnectWallet,
            timeouts.bridge_diagnostic() + timeouts.bridge_connect(),
        )
        .await
    }

    pub async fn wallet_status(&self) -> Reply {
        self.to_tab(TabMessage::GetWalletStatus, self.config.timeouts.bridge_status())
            .await
    }

    pub async fn make_payment(&self) -> Reply {
        self.to_tab(TabMessage::MakePayment, self.config.timeouts.bridge_payment())
            .await
    }

    pub async fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        let reply = self.to_background(RuntimeMessage::GetTransactions).await;
        let data = reply.into_result()?;
        if data.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(data)?)
    }

    pub async fn clear_history(&self) -> Reply {
        self.to_background(RuntimeMessage::ClearHistory).await
    }
}
