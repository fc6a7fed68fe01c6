// Page-context wallet bridge: runs next to window.ethereum and answers the
// content script over window messages.

use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use x402_pay_core::bridge::{BridgeEvents, PageBridge};
use x402_pay_core::correlator::Outbound;
use x402_pay_core::wallet::{wait_for_provider, EventSource, ProviderEvent, Wallet};
use x402_pay_extension::runtime::BrowserClock;
use x402_pay_extension::services::{InjectedProvider, ProviderEvents, WindowChannel};
use x402_pay_extension::{init_logging, load_config};

type BridgeWallet = Wallet<InjectedProvider>;

// Dummy main for binary target
fn main() {}

fn subscribe(wallet: &Rc<BridgeWallet>, provider: InjectedProvider) {
    let Some(events) = ProviderEvents::new(provider) else {
        log::warn!("Provider exposes no event subscription method");
        return;
    };
    let wallet = wallet.clone();
    let subscribed = events.subscribe(Rc::new(move |event: ProviderEvent| {
        let wallet = wallet.clone();
        spawn_local(async move { wallet.handle_provider_event(event).await });
    }));
    if let Err(e) = subscribed {
        log::warn!("Failed to subscribe to provider events: {}", e);
    }
}

#[wasm_bindgen]
pub async fn init_page_bridge() -> Result<(), JsValue> {
    init_logging();
    let config = load_config().ok_or_else(|| JsValue::from_str("Invalid configuration"))?;
    let channel = WindowChannel::new().ok_or_else(|| JsValue::from_str("No window"))?;

    let provider = wait_for_provider(&BrowserClock, &config.provider, InjectedProvider::detect).await;
    let wallet = Rc::new(Wallet::new(
        provider.clone(),
        config,
        Rc::new(BridgeEvents::new(channel.clone())),
    ));
    if let Some(provider) = provider {
        subscribe(&wallet, provider);
        match wallet.check_connection().await {
            Ok(Some(address)) => log::info!("🔗 Already connected as {}", address),
            Ok(None) => {}
            Err(e) => log::warn!("Connection check failed: {}", e),
        }
    }

    let bridge = Rc::new(PageBridge::new(wallet, BrowserClock));
    let replies = channel.clone();
    let listener = bridge.clone();
    channel.listen(move |raw| {
        let bridge = listener.clone();
        let replies = replies.clone();
        spawn_local(async move {
            let Some(answer) = bridge.on_window_message(&raw).await else {
                return;
            };
            let posted = answer
                .to_value()
                .map_err(|e| e.to_string())
                .and_then(|message| replies.post(message).map_err(|e| e.to_string()));
            if let Err(e) = posted {
                log::warn!("Failed to answer bridge request: {}", e);
            }
        });
    })?;

    bridge.announce(&channel);
    log::info!("🌉 Wallet bridge listening");
    Ok(())
}
