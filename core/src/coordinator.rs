//! Background coordinator.
//!
//! Owns the shared extension state for the lifetime of the service worker,
//! persists history and the wallet snapshot, raises notifications and keeps
//! the toolbar badge in sync.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

use crate::clock::Clock;
use crate::detection::DetectionRecord;
use crate::error::{Error, Result};
use crate::history::{History, KeyValueStore, TransactionRecord, WalletUpdate};
use crate::protocol::{PaymentPhase, PaymentReport, Reply, RuntimeMessage, WalletEventKind};
use crate::router::{Handler, MessageSender};

pub const BADGE_TEXT: &str = "X402";
pub const COLOR_READY: &str = "#00C853";
pub const COLOR_NEEDS_WALLET: &str = "#FFD600";
pub const COLOR_WALLET_ONLY: &str = "#0052FF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub text: &'static str,
    pub color: Option<&'static str>,
}

pub fn badge_for(detected: bool, wallet_connected: bool) -> Badge {
    match (detected, wallet_connected) {
        (true, true) => Badge {
            text: BADGE_TEXT,
            color: Some(COLOR_READY),
        },
        (true, false) => Badge {
            text: BADGE_TEXT,
            color: Some(COLOR_NEEDS_WALLET),
        },
        (false, true) => Badge {
            text: "",
            color: Some(COLOR_WALLET_ONLY),
        },
        (false, false) => Badge {
            text: "",
            color: None,
        },
    }
}

/// `chrome.action` badge for one tab
pub trait BadgeSurface {
    fn show(&self, tab_id: i32, badge: Badge);
}

/// Fire-and-forget desktop notification
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusRecord {
    pub status: PaymentPhase,
    pub data: PaymentReport,
    pub timestamp: u64,
}

/// Answer to `GET_STATE`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorState {
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    pub x402_detected: bool,
    pub x402_data: Option<DetectionRecord>,
    pub payment_status: Option<PaymentStatusRecord>,
    #[serde(skip)]
    pub active_tab: Option<i32>,
}

impl CoordinatorState {
    pub fn record_detection(&mut self, detection: DetectionRecord) {
        self.x402_detected = true;
        self.x402_data = Some(detection);
    }

    pub fn reset_detection(&mut self) {
        self.x402_detected = false;
        self.x402_data = None;
    }

    pub fn badge(&self) -> Badge {
        badge_for(self.x402_detected, self.wallet_connected)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct Coordinator<S, C> {
    state: RefCell<CoordinatorState>,
    history: History<S>,
    clock: C,
    notifier: Rc<dyn Notifier>,
    badge: Rc<dyn BadgeSurface>,
}

impl<S: KeyValueStore, C: Clock> Coordinator<S, C> {
    pub fn new(
        history: History<S>,
        clock: C,
        notifier: Rc<dyn Notifier>,
        badge: Rc<dyn BadgeSurface>,
    ) -> Self {
        Self {
            state: RefCell::new(CoordinatorState::default()),
            history,
            clock,
            notifier,
            badge,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    pub fn history(&self) -> &History<S> {
        &self.history
    }

    fn refresh_badge(&self, tab_id: Option<i32>) {
        let state = self.state.borrow();
        if let Some(tab_id) = tab_id.or(state.active_tab) {
            self.badge.show(tab_id, state.badge());
        }
    }

    pub async fn on_installed(&self) -> Result<()> {
        log::info!("🚀 Extension installed, initializing storage");
        self.history.initialize().await?;
        self.refresh_badge(None);
        Ok(())
    }

    pub fn on_tab_activated(&self, tab_id: i32) {
        {
            let mut state = self.state.borrow_mut();
            state.active_tab = Some(tab_id);
            state.reset_detection();
        }
        self.refresh_badge(Some(tab_id));
    }

    async fn on_wallet_event(&self, event: WalletEventKind, data: &Value) -> Result<()> {
        let text = || {
            value_text(data).ok_or_else(|| Error::Malformed(format!("{:?} event without data", event)))
        };
        let update = match event {
            WalletEventKind::Connect => WalletUpdate::Connected(text()?),
            WalletEventKind::Disconnect => WalletUpdate::Disconnected,
            WalletEventKind::Balance => WalletUpdate::Balance(text()?),
            WalletEventKind::Network => WalletUpdate::Network(text()?),
        };
        {
            let mut state = self.state.borrow_mut();
            match &update {
                WalletUpdate::Connected(address) => {
                    state.wallet_connected = true;
                    state.wallet_address = Some(address.clone());
                }
                WalletUpdate::Disconnected => {
                    state.wallet_connected = false;
                    state.wallet_address = None;
                }
                _ => {}
            }
        }
        self.history.merge_wallet_status(&update).await?;
        Ok(())
    }

    async fn on_payment_status(&self, status: PaymentPhase, data: PaymentReport) -> Result<()> {
        let now = self.clock.now_ms();
        self.state.borrow_mut().payment_status = Some(PaymentStatusRecord {
            status,
            data: data.clone(),
            timestamp: now,
        });

        let recorded = match TransactionRecord::from_report(status, &data, now) {
            Some(record) => {
                log::info!("🧾 Payment {:?}: {} {}", record.status, record.amount, record.currency);
                self.history.append(record).await.map(|_| ())
            }
            None => Ok(()),
        };
        if let Err(e) = &recorded {
            log::error!("Failed to record payment: {}", e);
        }
        if status == PaymentPhase::Success {
            let description = if data.description.is_empty() {
                "content"
            } else {
                data.description.as_str()
            };
            self.notifier.notify(
                "Payment Successful",
                &format!("Paid {} {} for {}", data.amount, data.currency, description),
            );
        }
        recorded
    }
}

#[async_trait(?Send)]
impl<S: KeyValueStore, C: Clock> Handler<RuntimeMessage> for Coordinator<S, C> {
    async fn handle(&self, action: RuntimeMessage, sender: MessageSender) -> Reply {
        match action {
            RuntimeMessage::Ping => Reply::data(&json!({
                "status": "OK",
                "timestamp": self.clock.now_ms(),
            })),
            RuntimeMessage::WalletEvent { event, data } => {
                let result = self.on_wallet_event(event, &data).await;
                self.refresh_badge(sender.tab_id);
                result.map(|()| Value::Null).into()
            }
            RuntimeMessage::X402Detected { data } => {
                self.state.borrow_mut().record_detection(data);
                self.refresh_badge(sender.tab_id);
                Reply::ok()
            }
            RuntimeMessage::X402Cleared => {
                self.state.borrow_mut().reset_detection();
                self.refresh_badge(sender.tab_id);
                Reply::ok()
            }
            RuntimeMessage::PaymentStatus { status, data } => {
                let result = self.on_payment_status(status, data).await;
                self.refresh_badge(sender.tab_id);
                result.map(|()| Value::Null).into()
            }
            RuntimeMessage::ContentScriptLoaded => {
                self.state.borrow_mut().active_tab = sender.tab_id;
                Reply::ok()
            }
            RuntimeMessage::GetState => Reply::data(&self.state()),
            RuntimeMessage::GetTransactions => self.history.load().await.into(),
            RuntimeMessage::ClearHistory => self.history.clear().await.map(|()| Value::Null).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::TokioClock;
    use crate::history::{MemoryStore, TxStatus, WalletStatus, TRANSACTIONS_KEY};
    use crate::router::route;

    #[derive(Default)]
    struct Toolbar(RefCell<Vec<(i32, Badge)>>);

    impl BadgeSurface for Toolbar {
        fn show(&self, tab_id: i32, badge: Badge) {
            self.0.borrow_mut().push((tab_id, badge));
        }
    }

    #[derive(Default)]
    struct Notifications(RefCell<Vec<String>>);

    impl Notifier for Notifications {
        fn notify(&self, _title: &str, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    struct Fixture {
        coordinator: Coordinator<Rc<MemoryStore>, TokioClock>,
        store: Rc<MemoryStore>,
        toolbar: Rc<Toolbar>,
        notifications: Rc<Notifications>,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(MemoryStore::new());
        let toolbar = Rc::new(Toolbar::default());
        let notifications = Rc::new(Notifications::default());
        let coordinator = Coordinator::new(
            History::new(store.clone(), 10),
            TokioClock,
            notifications.clone(),
            toolbar.clone(),
        );
        Fixture {
            coordinator,
            store,
            toolbar,
            notifications,
        }
    }

    /// Reads come back empty, writes always fail
    struct FullStore;

    #[async_trait(?Send)]
    impl KeyValueStore for FullStore {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> Result<()> {
            Err(Error::Storage("QUOTA_BYTES quota exceeded".to_string()))
        }
    }

    fn report(amount: &str) -> PaymentReport {
        PaymentReport {
            amount: amount.to_string(),
            currency: "USDC".to_string(),
            description: "Premium article".to_string(),
            ..Default::default()
        }
    }

    fn detection() -> DetectionRecord {
        DetectionRecord {
            detected: true,
            amount: "2.50".into(),
            currency: "USDC".into(),
            description: "Premium article".into(),
            payment_target: None,
        }
    }

    async fn send(f: &Fixture, message: RuntimeMessage) -> Reply {
        f.coordinator.handle(message, MessageSender::tab(7)).await
    }

    #[test]
    fn test_badge_rules() {
        assert_eq!(badge_for(true, true).color, Some(COLOR_READY));
        assert_eq!(badge_for(true, false).color, Some(COLOR_NEEDS_WALLET));
        assert_eq!(badge_for(true, false).text, "X402");
        assert_eq!(badge_for(false, true), Badge { text: "", color: Some(COLOR_WALLET_ONLY) });
        assert_eq!(badge_for(false, false), Badge { text: "", color: None });
    }

    #[tokio::test]
    async fn test_detection_and_wallet_drive_the_badge() {
        let f = fixture();
        send(&f, RuntimeMessage::X402Detected { data: detection() }).await;
        send(
            &f,
            RuntimeMessage::WalletEvent {
                event: WalletEventKind::Connect,
                data: Value::String("0xabc".into()),
            },
        )
        .await;

        let shown = f.toolbar.0.borrow();
        assert_eq!(shown[0], (7, badge_for(true, false)));
        assert_eq!(shown[1], (7, badge_for(true, true)));
    }

    #[tokio::test]
    async fn test_wallet_events_merge_into_stored_snapshot() {
        let f = fixture();
        for (event, data) in [
            (WalletEventKind::Connect, Value::String("0xabc".into())),
            (WalletEventKind::Balance, serde_json::json!(12.5)),
            (WalletEventKind::Network, Value::String("0x14a34".into())),
        ] {
            assert!(send(&f, RuntimeMessage::WalletEvent { event, data }).await.is_ok());
        }
        let stored = f.coordinator.history().wallet_status().await.unwrap();
        assert_eq!(
            stored,
            WalletStatus {
                connected: true,
                address: Some("0xabc".into()),
                balance: Some("12.5".into()),
                network: Some("0x14a34".into()),
            }
        );
        assert!(f.coordinator.state().wallet_connected);
    }

    #[tokio::test]
    async fn test_connect_without_address_is_malformed() {
        let f = fixture();
        let reply = send(
            &f,
            RuntimeMessage::WalletEvent {
                event: WalletEventKind::Connect,
                data: Value::Null,
            },
        )
        .await;
        assert!(reply.error_message().unwrap().starts_with("Malformed message"));
    }

    #[tokio::test]
    async fn test_terminal_payments_are_recorded() {
        let f = fixture();
        send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Started, data: report("1") }).await;
        assert!(f.coordinator.history().load().await.unwrap().is_empty());

        let mut failed = report("2.50");
        failed.error = Some("Insufficient USDC balance".into());
        send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Failed, data: failed }).await;
        send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Success, data: report("1.00") }).await;

        let records = f.coordinator.history().load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, TxStatus::Success);
        assert_eq!(records[1].status, TxStatus::Failed);
        assert_eq!(
            *f.notifications.0.borrow(),
            vec!["Paid 1.00 USDC for Premium article".to_string()]
        );
        assert_eq!(
            f.coordinator.state().payment_status.unwrap().status,
            PaymentPhase::Success
        );
    }

    #[tokio::test]
    async fn test_corrupt_history_does_not_block_payments() {
        let f = fixture();
        f.store
            .set(TRANSACTIONS_KEY, Value::String("oops".into()))
            .await
            .unwrap();

        for amount in ["1.00", "2.00"] {
            let reply = send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Success, data: report(amount) }).await;
            assert!(reply.is_ok());
        }

        let records = f.coordinator.history().load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, "2.00");
        assert_eq!(f.notifications.0.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_success_is_announced_even_when_storage_fails() {
        let notifications = Rc::new(Notifications::default());
        let coordinator = Coordinator::new(
            History::new(FullStore, 10),
            TokioClock,
            notifications.clone(),
            Rc::new(Toolbar::default()),
        );

        let reply = coordinator
            .handle(
                RuntimeMessage::PaymentStatus { status: PaymentPhase::Success, data: report("1.00") },
                MessageSender::tab(7),
            )
            .await;
        assert!(reply.error_message().unwrap().starts_with("Storage error"));
        assert_eq!(
            *notifications.0.borrow(),
            vec!["Paid 1.00 USDC for Premium article".to_string()]
        );
        assert_eq!(
            coordinator.state().payment_status.unwrap().status,
            PaymentPhase::Success
        );
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let f = fixture();
        for i in 0..12 {
            send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Success, data: report(&i.to_string()) }).await;
        }
        let reply = send(&f, RuntimeMessage::GetTransactions).await;
        let records: Vec<TransactionRecord> = reply.parse().unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0].amount, "11");

        assert!(send(&f, RuntimeMessage::ClearHistory).await.is_ok());
        assert!(f.coordinator.history().load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_state_shape() {
        let f = fixture();
        send(&f, RuntimeMessage::X402Detected { data: detection() }).await;
        let reply = route::<RuntimeMessage, _>(
            &f.coordinator,
            &serde_json::json!({"action": "GET_STATE"}),
            MessageSender::default(),
        )
        .await;
        assert_eq!(reply.data["x402Detected"], true);
        assert_eq!(reply.data["x402Data"]["amount"], "2.50");
        assert_eq!(reply.data["walletConnected"], false);
        assert!(reply.data.get("activeTab").is_none());
    }

    #[tokio::test]
    async fn test_tab_switch_resets_detection() {
        let f = fixture();
        send(&f, RuntimeMessage::ContentScriptLoaded).await;
        send(&f, RuntimeMessage::X402Detected { data: detection() }).await;
        assert_eq!(f.coordinator.state().active_tab, Some(7));

        f.coordinator.on_tab_activated(8);
        let state = f.coordinator.state();
        assert_eq!(state.active_tab, Some(8));
        assert!(!state.x402_detected);
        assert_eq!(f.toolbar.0.borrow().last(), Some(&(8, badge_for(false, false))));
    }

    #[tokio::test]
    async fn test_cleared_detection_resets_badge() {
        let f = fixture();
        send(&f, RuntimeMessage::X402Detected { data: detection() }).await;
        assert!(send(&f, RuntimeMessage::X402Cleared).await.is_ok());

        let state = f.coordinator.state();
        assert!(!state.x402_detected);
        assert_eq!(state.x402_data, None);
        assert_eq!(f.toolbar.0.borrow().last(), Some(&(7, badge_for(false, false))));
    }

    #[tokio::test]
    async fn test_install_initializes_storage() {
        let f = fixture();
        send(&f, RuntimeMessage::PaymentStatus { status: PaymentPhase::Success, data: report("1") }).await;
        f.coordinator.on_installed().await.unwrap();
        assert!(f.coordinator.history().load().await.unwrap().is_empty());
        assert_eq!(
            f.coordinator.history().wallet_status().await.unwrap(),
            WalletStatus::default()
        );
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected() {
        let f = fixture();
        let reply = route::<RuntimeMessage, _>(
            &f.coordinator,
            &serde_json::json!({"action": "SELF_DESTRUCT"}),
            MessageSender::default(),
        )
        .await;
        assert_eq!(reply.error_message(), Some("Unknown action: SELF_DESTRUCT"));
    }
}
