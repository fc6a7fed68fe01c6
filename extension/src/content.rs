// Content script: injects the page bridge, watches the page for x402 tags
// and relays between popup, background and page.

use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, HtmlScriptElement};
use x402_pay_core::correlator::Correlator;
use x402_pay_core::relay::Relay;
use x402_pay_core::TabMessage;
use x402_pay_extension::chrome;
use x402_pay_extension::dom::{observe_head, MetaReader};
use x402_pay_extension::runtime::{listen, BrowserClock, ChromeRuntime};
use x402_pay_extension::services::WindowChannel;
use x402_pay_extension::{init_logging, load_config};

const BRIDGE_SCRIPT: &str = "page_bridge.js";

type ContentRelay = Relay<WindowChannel, BrowserClock>;

// Dummy main for binary target
fn main() {}

fn inject_bridge(document: &Document) -> Result<(), JsValue> {
    let script: HtmlScriptElement = document.create_element("script")?.dyn_into()?;
    script.set_src(&chrome::runtime_get_url(BRIDGE_SCRIPT));
    script.set_type("module");
    let parent = document
        .head()
        .map(Into::into)
        .or_else(|| document.document_element())
        .ok_or_else(|| JsValue::from_str("Document has no head"))?;
    parent.append_child(&script)?;
    Ok(())
}

fn on_pagehide(relay: Rc<ContentRelay>) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let callback = Closure::wrap(Box::new(move |_event: JsValue| {
        relay.shutdown();
    }) as Box<dyn FnMut(JsValue)>);
    window.add_event_listener_with_callback("pagehide", callback.as_ref().unchecked_ref())?;
    callback.forget();
    Ok(())
}

#[wasm_bindgen]
pub fn init_content_script() -> Result<(), JsValue> {
    init_logging();
    let config = load_config().ok_or_else(|| JsValue::from_str("Invalid configuration"))?;
    let channel = WindowChannel::new().ok_or_else(|| JsValue::from_str("No window"))?;
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("No document"))?;

    let relay: Rc<ContentRelay> = Rc::new(Relay::new(
        Rc::new(Correlator::new(channel.clone(), BrowserClock)),
        Rc::new(ChromeRuntime),
        Rc::new(MetaReader::new(document.clone())),
        config,
    ));

    let from_page = relay.clone();
    channel.listen(move |raw| {
        let relay = from_page.clone();
        spawn_local(async move { relay.on_page_message(&raw).await });
    })?;
    listen::<TabMessage, _>(relay.clone());

    let rescan = relay.clone();
    observe_head(&document, move || {
        let relay = rescan.clone();
        spawn_local(async move {
            relay.rescan().await;
        });
    })?;
    on_pagehide(relay.clone())?;

    inject_bridge(&document)?;
    spawn_local(async move { relay.start().await });
    Ok(())
}
