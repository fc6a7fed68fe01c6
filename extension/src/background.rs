// Background service worker: owns coordinator state for its lifetime.
// JavaScript glue only loads the module and calls `init_background`.

use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use x402_pay_core::coordinator::Coordinator;
use x402_pay_core::history::History;
use x402_pay_core::RuntimeMessage;
use x402_pay_extension::chrome::{self, from_js};
use x402_pay_extension::runtime::{listen, BrowserClock, ChromeBadge, ChromeNotifier};
use x402_pay_extension::services::ChromeStore;
use x402_pay_extension::{init_logging, load_config};

const NOTIFICATION_ICON: &str = "icons/icon128.png";

// Dummy main for binary target
fn main() {}

#[wasm_bindgen]
pub fn init_background() {
    init_logging();
    let Some(config) = load_config() else {
        return;
    };

    let coordinator = Rc::new(Coordinator::new(
        History::new(ChromeStore::new(), config.history.cap),
        BrowserClock,
        Rc::new(ChromeNotifier {
            icon: NOTIFICATION_ICON,
        }),
        Rc::new(ChromeBadge),
    ));

    listen::<RuntimeMessage, _>(coordinator.clone());

    let installed = coordinator.clone();
    let on_installed = Closure::wrap(Box::new(move |_details: JsValue| {
        let coordinator = installed.clone();
        spawn_local(async move {
            if let Err(e) = coordinator.on_installed().await {
                log::error!("Failed to initialize storage: {}", e);
            }
        });
    }) as Box<dyn FnMut(JsValue)>);
    chrome::on_installed(&on_installed);
    on_installed.forget();

    let activated = coordinator;
    let on_activated = Closure::wrap(Box::new(move |info: JsValue| {
        let tab_id = from_js(&info)
            .ok()
            .and_then(|info| info.get("tabId").and_then(|id| id.as_i64()));
        if let Some(tab_id) = tab_id {
            activated.on_tab_activated(tab_id as i32);
        }
    }) as Box<dyn FnMut(JsValue)>);
    chrome::on_tab_activated(&on_activated);
    on_activated.forget();

    log::info!("🚀 x402 background service initialized");
}
