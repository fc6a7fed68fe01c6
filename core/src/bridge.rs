//! Page-context side of the correlated channel.
//!
//! Answers [`BridgeAction`] requests posted by the content script and
//! forwards wallet manager events back over the same window channel.

use async_trait::async_trait;
use serde_json::Value;
use std::rc::Rc;

use crate::clock::Clock;
use crate::correlator::Outbound;
use crate::payment::PaymentExecutor;
use crate::protocol::{source_of, BridgeAction, BridgeMessage, Reply, WalletManagerEvent, CONTENT_SOURCE};
use crate::router::{route, Handler, MessageSender};
use crate::wallet::{EventSink, Wallet, WalletProvider};

/// Posts wallet manager events to the content script
pub struct BridgeEvents<O> {
    outbound: O,
}

impl<O: Outbound> BridgeEvents<O> {
    pub fn new(outbound: O) -> Self {
        Self { outbound }
    }
}

impl<O: Outbound> EventSink for BridgeEvents<O> {
    fn emit(&self, event: WalletManagerEvent) {
        let posted = BridgeMessage::Event { event }
            .to_value()
            .map_err(|e| e.to_string())
            .and_then(|message| self.outbound.post(message).map_err(|e| e.to_string()));
        if let Err(e) = posted {
            log::warn!("Failed to post wallet event: {}", e);
        }
    }
}

pub struct PageBridge<P, C> {
    wallet: Rc<Wallet<P>>,
    executor: PaymentExecutor<P, C>,
    clock: C,
}

impl<P: WalletProvider, C: Clock + Clone> PageBridge<P, C> {
    pub fn new(wallet: Rc<Wallet<P>>, clock: C) -> Self {
        Self {
            executor: PaymentExecutor::new(wallet.clone(), clock.clone()),
            wallet,
            clock,
        }
    }

    /// Tell the content script the bridge is listening
    pub fn announce<O: Outbound>(&self, outbound: &O) {
        match BridgeMessage::Ready.to_value() {
            Ok(ready) => {
                if let Err(e) = outbound.post(ready) {
                    log::warn!("Failed to announce bridge: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to encode ready message: {}", e),
        }
    }

    /// Answer one window message. Anything not stamped by the content script
    /// is ignored; requests without an id cannot be answered and are dropped.
    pub async fn on_window_message(&self, raw: &Value) -> Option<BridgeMessage> {
        if source_of(raw) != Some(CONTENT_SOURCE) {
            return None;
        }
        let Some(id) = raw.get("id").and_then(Value::as_u64) else {
            log::warn!("Dropping bridge request without an id");
            return None;
        };
        let response = route::<BridgeAction, _>(self, raw, MessageSender::default()).await;
        Some(BridgeMessage::Response { id, response })
    }
}

#[async_trait(?Send)]
impl<P: WalletProvider, C: Clock + Clone> Handler<BridgeAction> for PageBridge<P, C> {
    async fn handle(&self, action: BridgeAction, _sender: MessageSender) -> Reply {
        match action {
            BridgeAction::CheckWalletProviders => Reply::data(&self.wallet.diagnostic(self.clock.now_ms())),
            BridgeAction::ConnectWallet => self.wallet.connect().await.into(),
            BridgeAction::GetWalletStatus => self.wallet.status().await.into(),
            BridgeAction::MakePayment { payload } => self.executor.execute(&payload).await.into_result().into(),
        }
    }
}
