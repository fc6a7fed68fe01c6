use dioxus::prelude::*;
use std::rc::Rc;
use wasm_bindgen::prelude::wasm_bindgen;
use x402_pay_core::history::TransactionRecord;
use x402_pay_core::payment::PaymentReceipt;
use x402_pay_core::popup::PopupStatus;
use x402_pay_core::wallet::{ConnectReport, WalletStatusReport};

use crate::components::{HistoryList, Notice, NoticeBanner, PaymentPanel, StatusBar, WalletPanel};
use crate::popup_context::{Client, PopupContext};

#[component]
fn App() -> Element {
    let context = use_hook(|| crate::load_config().map(PopupContext::new));

    rsx! {
        div { class: "w-96 min-h-[480px] bg-gray-50 p-4 space-y-4",
            match context {
                Some(context) => rsx! { Dashboard { context } },
                None => rsx! {
                    p { class: "text-sm text-red-600", "Extension configuration is invalid" }
                },
            }
        }
    }
}

/// Re-query page, wallet and history
async fn refresh(
    client: Rc<Client>,
    mut status: Signal<Option<PopupStatus>>,
    mut wallet: Signal<Option<WalletStatusReport>>,
    mut history: Signal<Vec<TransactionRecord>>,
) {
    match client.check_status().await {
        Ok(current) => status.set(Some(current)),
        Err(e) => {
            log::warn!("Status unavailable: {}", e);
            status.set(None);
        }
    }

    let reply = client.wallet_status().await;
    if reply.is_ok() {
        match reply.parse::<WalletStatusReport>() {
            Ok(report) => wallet.set(Some(report)),
            Err(e) => log::warn!("Unexpected wallet status: {}", e),
        }
    } else {
        log::debug!("Wallet status unavailable: {:?}", reply.error_message());
    }

    match client.transactions().await {
        Ok(records) => history.set(records),
        Err(e) => log::warn!("History unavailable: {}", e),
    }
}

#[component]
fn Dashboard(context: PopupContext) -> Element {
    use_context_provider(|| context.clone());
    let status = use_signal(|| None::<PopupStatus>);
    let wallet = use_signal(|| None::<WalletStatusReport>);
    let mut history = use_signal(Vec::<TransactionRecord>::new);
    let mut notice = use_signal(|| None::<Notice>);
    let mut busy = use_signal(|| false);

    let client = context.client.clone();
    use_future(move || {
        let client = client.clone();
        async move {
            if let Err(e) = client.init().await {
                log::error!("Popup init failed: {}", e);
            }
            refresh(client, status, wallet, history).await;
        }
    });

    let for_refresh = context.client.clone();
    let for_connect = context.client.clone();
    let for_pay = context.client.clone();
    let for_clear = context.client.clone();
    let explorer = context.clone();

    let detection = status().and_then(|s| s.x402_data);
    let connected = wallet().map(|w| w.wallet_connected).unwrap_or(false)
        || status().map(|s| s.wallet_connected).unwrap_or(false);

    rsx! {
        StatusBar {
            status,
            busy: busy(),
            on_refresh: move |_| {
                let client = for_refresh.clone();
                spawn(async move {
                    busy.set(true);
                    refresh(client, status, wallet, history).await;
                    busy.set(false);
                });
            }
        }

        if let Some(current) = notice() {
            NoticeBanner { notice: current, on_dismiss: move |_| notice.set(None) }
        }

        WalletPanel {
            wallet,
            busy: busy(),
            on_connect: move |_| {
                let client = for_connect.clone();
                spawn(async move {
                    busy.set(true);
                    let reply = client.connect_wallet().await;
                    match (reply.is_ok(), reply.parse::<ConnectReport>()) {
                        (true, Ok(report)) => notice.set(Some(Notice::Success(report.message))),
                        _ => notice.set(Some(Notice::Error(
                            reply.error_message().unwrap_or("Connection failed").to_string(),
                        ))),
                    }
                    refresh(client, status, wallet, history).await;
                    busy.set(false);
                });
            }
        }

        PaymentPanel {
            detection,
            connected,
            busy: busy(),
            on_pay: move |_| {
                let client = for_pay.clone();
                spawn(async move {
                    busy.set(true);
                    notice.set(Some(Notice::Info("Confirm the payment in your wallet".to_string())));
                    let reply = client.make_payment().await;
                    match (reply.is_ok(), reply.parse::<PaymentReceipt>()) {
                        (true, Ok(receipt)) => notice.set(Some(Notice::Paid(receipt))),
                        _ => notice.set(Some(Notice::Error(
                            reply.error_message().unwrap_or("Payment failed").to_string(),
                        ))),
                    }
                    refresh(client, status, wallet, history).await;
                    busy.set(false);
                });
            }
        }

        HistoryList {
            records: history(),
            explorer,
            on_clear: move |_| {
                let client = for_clear.clone();
                spawn(async move {
                    let reply = client.clear_history().await;
                    match reply.error_message() {
                        Some(e) => notice.set(Some(Notice::Error(e.to_string()))),
                        None => history.set(Vec::new()),
                    }
                });
            }
        }
    }
}

#[wasm_bindgen]
pub fn run_popup() {
    crate::init_logging();
    log::info!("x402 popup starting...");
    dioxus::launch(App);
}
