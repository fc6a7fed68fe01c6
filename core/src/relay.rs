//! Content script: the only relay between popup, background and page.
//!
//! Scans the page for x402 fields, answers popup queries, forwards wallet
//! operations to the page bridge through the [`Correlator`] and relays the
//! bridge's wallet and payment events to the background coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::clock::Clock;
use crate::config::ExtensionConfig;
use crate::correlator::{Correlator, Outbound};
use crate::detection::{DetectionRecord, PageFields, Scanner};
use crate::error::Result;
use crate::history::{WalletStatus, WalletUpdate};
use crate::protocol::{BridgeAction, BridgeMessage, Reply, RuntimeMessage, TabMessage, WalletManagerEvent};
use crate::router::{Handler, MessageSender};

/// `chrome.runtime.sendMessage` towards the background
#[async_trait(?Send)]
pub trait Background {
    async fn send(&self, message: RuntimeMessage) -> Result<Reply>;
}

/// Reads the declarative x402 fields of the current document
pub trait PageSource {
    fn read_fields(&self) -> PageFields;
}

/// Answer to `CHECK_STATUS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub x402_detected: bool,
    pub x402_data: Option<DetectionRecord>,
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    pub bridge_ready: bool,
}

pub struct Relay<O, C> {
    correlator: Rc<Correlator<O, C>>,
    background: Rc<dyn Background>,
    page: Rc<dyn PageSource>,
    scanner: Scanner,
    config: Rc<ExtensionConfig>,
    detection: RefCell<Option<DetectionRecord>>,
    wallet: RefCell<WalletStatus>,
    bridge_ready: Cell<bool>,
}

impl<O: Outbound, C: Clock> Relay<O, C> {
    pub fn new(
        correlator: Rc<Correlator<O, C>>,
        background: Rc<dyn Background>,
        page: Rc<dyn PageSource>,
        config: Rc<ExtensionConfig>,
    ) -> Self {
        Self {
            correlator,
            background,
            page,
            scanner: Scanner::new(config.token.symbol.clone()),
            config,
            detection: RefCell::new(None),
            wallet: RefCell::new(WalletStatus::default()),
            bridge_ready: Cell::new(false),
        }
    }

    pub fn detection(&self) -> Option<DetectionRecord> {
        self.detection.borrow().clone()
    }

    pub fn bridge_ready(&self) -> bool {
        self.bridge_ready.get()
    }

    async fn notify(&self, message: RuntimeMessage) {
        let name = crate::router::Action::name(&message);
        match self.background.send(message).await {
            Ok(reply) if !reply.is_ok() => {
                log::warn!("Background refused {}: {:?}", name, reply.error_message());
            }
            Ok(_) => {}
            Err(e) => log::warn!("Failed to notify background of {}: {}", name, e),
        }
    }

    /// First contact with the background after injection
    pub async fn start(&self) {
        log::info!("🔌 Content script loaded");
        self.notify(RuntimeMessage::ContentScriptLoaded).await;
        self.rescan().await;
    }

    /// Scan `fields` and report the result to the coordinator. Every scan that
    /// finds a payment is reported, since the coordinator forgets detections
    /// on tab switches; a payment that disappears is reported once.
    pub async fn observe(&self, fields: &PageFields) -> Option<DetectionRecord> {
        let current = self.scanner.scan(fields);
        let previous = self.detection.replace(current.clone());
        match (&previous, &current) {
            (_, Some(record)) => {
                if previous.as_ref() != Some(record) {
                    log::info!("💰 x402 payment detected: {} {}", record.amount, record.currency);
                }
                self.notify(RuntimeMessage::X402Detected {
                    data: record.clone(),
                })
                .await;
            }
            (Some(_), None) => {
                log::info!("x402 payment tags removed");
                self.notify(RuntimeMessage::X402Cleared).await;
            }
            (None, None) => {}
        }
        current
    }

    pub async fn rescan(&self) -> Option<DetectionRecord> {
        let fields = self.page.read_fields();
        self.observe(&fields).await
    }

    /// Handle one window message; only bridge-stamped messages are considered
    pub async fn on_page_message(&self, raw: &Value) {
        let Some(message) = BridgeMessage::from_value(raw) else {
            return;
        };
        match message {
            BridgeMessage::Ready => {
                log::info!("🌉 Wallet bridge ready");
                self.bridge_ready.set(true);
            }
            BridgeMessage::Response { id, response } => {
                self.correlator.dispatch(id, response);
            }
            BridgeMessage::Event { event } => {
                self.track(&event);
                self.notify(event.into_runtime()).await;
            }
        }
    }

    fn track(&self, event: &WalletManagerEvent) {
        let update = match event {
            WalletManagerEvent::WalletConnected(address) => WalletUpdate::Connected(address.clone()),
            WalletManagerEvent::WalletDisconnected => WalletUpdate::Disconnected,
            WalletManagerEvent::BalanceUpdated(balance) => WalletUpdate::Balance(balance.clone()),
            WalletManagerEvent::NetworkUpdated(network) => WalletUpdate::Network(network.clone()),
            _ => return,
        };
        self.wallet.borrow_mut().apply(&update);
    }

    async fn status(&self) -> RelayStatus {
        let detection = self.rescan().await;
        let wallet = self.wallet.borrow().clone();
        RelayStatus {
            x402_detected: detection.is_some(),
            x402_data: detection,
            wallet_connected: wallet.connected,
            wallet_address: wallet.address,
            bridge_ready: self.bridge_ready.get(),
        }
    }

    /// The context is going away; nothing pending may settle as a success
    pub fn shutdown(&self) {
        self.correlator.teardown();
    }
}

#[async_trait(?Send)]
impl<O: Outbound, C: Clock> Handler<TabMessage> for Relay<O, C> {
    async fn handle(&self, action: TabMessage, _sender: MessageSender) -> Reply {
        let timeouts = &self.config.timeouts;
        match action {
            TabMessage::Ping => Reply::data(&serde_json::json!({
                "status": "PONG",
                "bridgeReady": self.bridge_ready.get(),
            })),
            TabMessage::CheckStatus => Reply::data(&self.status().await),
            TabMessage::ConnectWallet => {
                // no provider means no prompt will ever appear
                let diagnostic = self
                    .correlator
                    .send(BridgeAction::CheckWalletProviders, timeouts.bridge_diagnostic())
                    .await;
                if let Ok(diagnostic) = &diagnostic {
                    if diagnostic["ethereum"]["available"] == Value::Bool(false) {
                        return Reply::error(crate::error::WalletError::NoProvider);
                    }
                }
                self.correlator
                    .send(BridgeAction::ConnectWallet, timeouts.bridge_connect())
                    .await
                    .into()
            }
            TabMessage::GetWalletStatus => self
                .correlator
                .send(BridgeAction::GetWalletStatus, timeouts.bridge_status())
                .await
                .into(),
            TabMessage::MakePayment => {
                let Some(payload) = self.rescan().await else {
                    return Reply::error("No payment required on this page");
                };
                self.correlator
                    .send(BridgeAction::MakePayment { payload }, timeouts.bridge_payment())
                    .await
                    .into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::TokioClock;
    use crate::error::RelayError;
    use crate::protocol::{PaymentPhase, PaymentReport};
    use crate::router::route;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct Window(RefCell<Vec<Value>>);

    impl Outbound for Window {
        fn post(&self, message: Value) -> std::result::Result<(), RelayError> {
            self.0.borrow_mut().push(message);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Inbox(RefCell<Vec<RuntimeMessage>>);

    #[async_trait(?Send)]
    impl Background for Inbox {
        async fn send(&self, message: RuntimeMessage) -> Result<Reply> {
            self.0.borrow_mut().push(message);
            Ok(Reply::ok())
        }
    }

    #[derive(Default)]
    struct Page(RefCell<Vec<(&'static str, &'static str)>>);

    impl PageSource for Page {
        fn read_fields(&self) -> PageFields {
            self.0.borrow().iter().copied().collect()
        }
    }

    struct Fixture {
        relay: Relay<Rc<Window>, TokioClock>,
        window: Rc<Window>,
        inbox: Rc<Inbox>,
        page: Rc<Page>,
    }

    fn fixture(timeout_ms: u64) -> Fixture {
        let mut config = ExtensionConfig::bundled().unwrap();
        config.timeouts.bridge_status_ms = timeout_ms;
        config.timeouts.bridge_connect_ms = timeout_ms;
        config.timeouts.bridge_diagnostic_ms = timeout_ms;
        config.timeouts.bridge_payment_ms = timeout_ms;
        let window = Rc::new(Window::default());
        let inbox = Rc::new(Inbox::default());
        let page = Rc::new(Page::default());
        let correlator = Rc::new(Correlator::new(window.clone(), TokioClock));
        let relay = Relay::new(correlator, inbox.clone(), page.clone(), Rc::new(config));
        Fixture {
            relay,
            window,
            inbox,
            page,
        }
    }

    fn paywalled(page: &Page) {
        *page.0.borrow_mut() = vec![
            ("payment-required", "true"),
            ("amount", "2.50"),
            ("currency", "USDC"),
            ("description", "Premium article"),
        ];
    }

    #[tokio::test]
    async fn test_every_scan_of_a_paywall_is_reported() {
        let f = fixture(50);
        paywalled(&f.page);
        f.relay.start().await;
        f.relay.rescan().await;

        let inbox = f.inbox.0.borrow();
        assert_eq!(inbox[0], RuntimeMessage::ContentScriptLoaded);
        let detections = inbox
            .iter()
            .filter(|m| matches!(m, RuntimeMessage::X402Detected { .. }))
            .count();
        assert_eq!(detections, 2);
    }

    #[tokio::test]
    async fn test_changed_detection_carries_new_amount() {
        let f = fixture(50);
        paywalled(&f.page);
        f.relay.rescan().await;
        f.page.0.borrow_mut()[1] = ("amount", "3.00");
        f.relay.rescan().await;
        let inbox = f.inbox.0.borrow();
        assert_eq!(inbox.len(), 2);
        let RuntimeMessage::X402Detected { data } = &inbox[1] else {
            panic!("expected a detection");
        };
        assert_eq!(data.amount, "3.00");
        assert_eq!(f.relay.detection().unwrap().amount, "3.00");
    }

    #[tokio::test]
    async fn test_removed_paywall_is_reported_once() {
        let f = fixture(50);
        f.relay.rescan().await;
        assert!(f.inbox.0.borrow().is_empty());

        paywalled(&f.page);
        f.relay.rescan().await;
        f.page.0.borrow_mut().clear();
        f.relay.rescan().await;
        f.relay.rescan().await;

        let inbox = f.inbox.0.borrow();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[1], RuntimeMessage::X402Cleared);
        assert_eq!(f.relay.detection(), None);
    }

    #[tokio::test]
    async fn test_popup_request_is_correlated_with_bridge_reply() {
        let f = fixture(1000);
        let raw = json!({"action": "GET_WALLET_STATUS"});
        let popup = route::<TabMessage, _>(&f.relay, &raw, MessageSender::default());
        let bridge = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let request = f.window.0.borrow()[0].clone();
            assert_eq!(request["action"], "GET_WALLET_STATUS");
            let response = BridgeMessage::Response {
                id: request["id"].as_u64().unwrap(),
                response: Reply::data(&json!({"walletConnected": true})),
            };
            f.relay.on_page_message(&response.to_value().unwrap()).await;
        };
        let (reply, ()) = futures::join!(popup, bridge);
        assert!(reply.is_ok());
        assert_eq!(reply.data["walletConnected"], true);
    }

    #[tokio::test]
    async fn test_silent_bridge_times_out_into_error_reply() {
        let f = fixture(10);
        let reply = f.relay.handle(TabMessage::GetWalletStatus, MessageSender::default()).await;
        assert_eq!(reply.error_message(), Some("GET_WALLET_STATUS timed out after 10 ms"));
    }

    #[tokio::test]
    async fn test_payment_requires_detection() {
        let f = fixture(10);
        let reply = f.relay.handle(TabMessage::MakePayment, MessageSender::default()).await;
        assert_eq!(reply.error_message(), Some("No payment required on this page"));
        assert!(f.window.0.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_events_are_forwarded_and_tracked() {
        let f = fixture(10);
        let connected = BridgeMessage::Event {
            event: WalletManagerEvent::WalletConnected("0xabc".into()),
        };
        let failed = BridgeMessage::Event {
            event: WalletManagerEvent::PaymentFailed(PaymentReport {
                amount: "2.50".into(),
                currency: "USDC".into(),
                ..Default::default()
            }),
        };
        f.relay.on_page_message(&connected.to_value().unwrap()).await;
        f.relay.on_page_message(&failed.to_value().unwrap()).await;
        f.relay.on_page_message(&json!({"source": "some-widget", "kind": "ready"})).await;

        let inbox = f.inbox.0.borrow();
        assert_eq!(inbox.len(), 2);
        assert!(matches!(
            inbox[1],
            RuntimeMessage::PaymentStatus {
                status: PaymentPhase::Failed,
                ..
            }
        ));
        assert!(!f.relay.bridge_ready());

        drop(inbox);
        let status = f.relay.handle(TabMessage::CheckStatus, MessageSender::default()).await;
        assert_eq!(status.data["walletConnected"], true);
        assert_eq!(status.data["walletAddress"], "0xabc");
        assert_eq!(status.data["x402Detected"], false);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_pending_calls() {
        let f = fixture(1000);
        let popup = f.relay.handle(TabMessage::GetWalletStatus, MessageSender::default());
        let unload = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            f.relay.shutdown();
        };
        let (reply, ()) = futures::join!(popup, unload);
        assert_eq!(
            reply.error_message(),
            Some("Context disconnected before GET_WALLET_STATUS completed")
        );
    }
}
