//! All four contexts wired together in one process: the window channel is a
//! shared queue pumped between relay and page bridge.

use async_trait::async_trait;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::bridge::{BridgeEvents, PageBridge};
use crate::clock::testing::TokioClock;
use crate::coordinator::{Badge, BadgeSurface, Coordinator, Notifier};
use crate::correlator::{Correlator, Outbound};
use crate::detection::PageFields;
use crate::error::{RelayError, Result};
use crate::history::{History, MemoryStore, TxStatus};
use crate::protocol::{Reply, RuntimeMessage, TabMessage};
use crate::relay::{Background, PageSource, Relay};
use crate::router::{Handler, MessageSender};
use crate::wallet::testing::{config, FakeWallet};
use crate::wallet::Wallet;

#[derive(Default)]
struct Window(RefCell<VecDeque<Value>>);

impl Outbound for Window {
    fn post(&self, message: Value) -> std::result::Result<(), RelayError> {
        self.0.borrow_mut().push_back(message);
        Ok(())
    }
}

struct Quiet;

impl Notifier for Quiet {
    fn notify(&self, _title: &str, _message: &str) {}
}

impl BadgeSurface for Quiet {
    fn show(&self, _tab_id: i32, _badge: Badge) {}
}

type TestCoordinator = Coordinator<Rc<MemoryStore>, TokioClock>;

/// chrome.runtime.sendMessage straight into the coordinator
struct Runtime(Rc<TestCoordinator>);

#[async_trait(?Send)]
impl Background for Runtime {
    async fn send(&self, message: RuntimeMessage) -> Result<Reply> {
        Ok(self.0.handle(message, MessageSender::tab(1)).await)
    }
}

struct Paywall;

impl PageSource for Paywall {
    fn read_fields(&self) -> PageFields {
        [
            ("payment-required", "true"),
            ("amount", "2.50"),
            ("currency", "USDC"),
            ("description", "Premium article"),
        ]
        .into_iter()
        .collect()
    }
}

#[tokio::test]
async fn test_insufficient_balance_ends_as_failed_history_entry() {
    let config = config();
    let window = Rc::new(Window::default());

    let coordinator: Rc<TestCoordinator> = Rc::new(Coordinator::new(
        History::new(Rc::new(MemoryStore::new()), config.history.cap),
        TokioClock,
        Rc::new(Quiet),
        Rc::new(Quiet),
    ));
    let relay = Relay::new(
        Rc::new(Correlator::new(window.clone(), TokioClock)),
        Rc::new(Runtime(coordinator.clone())),
        Rc::new(Paywall),
        config.clone(),
    );

    // one USDC available, 2.50 requested
    let fake = FakeWallet::funded(1_000_000);
    let wallet = Rc::new(Wallet::new(
        Some(fake.clone()),
        config.clone(),
        Rc::new(BridgeEvents::new(window.clone())),
    ));
    let bridge = PageBridge::new(wallet, TokioClock);

    relay.start().await;
    assert!(coordinator.state().x402_detected);

    let done = Cell::new(false);
    let popup = async {
        let reply = relay.handle(TabMessage::MakePayment, MessageSender::default()).await;
        done.set(true);
        reply
    };
    let pump = async {
        while !done.get() {
            let next = window.0.borrow_mut().pop_front();
            match next {
                Some(message) => {
                    if let Some(answer) = bridge.on_window_message(&message).await {
                        window.post(answer.to_value().unwrap()).unwrap();
                    }
                    relay.on_page_message(&message).await;
                }
                None => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    };
    let (reply, ()) = futures::join!(popup, pump);

    let error = reply.error_message().unwrap();
    assert!(error.contains("Insufficient USDC balance"), "{error}");
    assert!(fake.sent_transactions().is_empty());

    let records = coordinator.history().load().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TxStatus::Failed);
    assert_eq!(records[0].amount, "2.50");
    let message = records[0].error.as_deref().unwrap();
    assert!(message.contains("Insufficient USDC balance"));
    assert!(message.contains("2.50"));
}

#[tokio::test]
async fn test_returning_to_a_paywalled_tab_restores_detection() {
    let config = config();
    let window = Rc::new(Window::default());
    let coordinator: Rc<TestCoordinator> = Rc::new(Coordinator::new(
        History::new(Rc::new(MemoryStore::new()), config.history.cap),
        TokioClock,
        Rc::new(Quiet),
        Rc::new(Quiet),
    ));
    let relay = Relay::new(
        Rc::new(Correlator::new(window, TokioClock)),
        Rc::new(Runtime(coordinator.clone())),
        Rc::new(Paywall),
        config,
    );

    relay.start().await;
    coordinator.on_tab_activated(2);
    assert!(!coordinator.state().x402_detected);
    coordinator.on_tab_activated(1);

    relay.rescan().await;
    relay.rescan().await;
    let state = coordinator.state();
    assert!(state.x402_detected);
    assert_eq!(state.x402_data.unwrap().amount, "2.50");
}
