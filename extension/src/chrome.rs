//! Raw `chrome.*` bindings and JSON conversion at the JS edge.
//!
//! Everything crossing into Rust goes through `serde_json::Value` so the
//! core crate never sees a `JsValue`.

use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use x402_pay_core::router::MessageSender;
use x402_pay_core::{RelayError, Reply, Result};

pub type MessageListener = Closure<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = sendMessage, catch)]
    pub fn runtime_send_message(message: JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = getURL)]
    pub fn runtime_get_url(path: &str) -> String;

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    pub fn on_runtime_message(callback: &MessageListener);

    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onInstalled"], js_name = addListener)]
    pub fn on_installed(callback: &Closure<dyn FnMut(JsValue)>);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = query)]
    pub fn tabs_query(query: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = sendMessage, catch)]
    pub fn tabs_send_message(tab_id: i32, message: JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "tabs", "onActivated"], js_name = addListener)]
    pub fn on_tab_activated(callback: &Closure<dyn FnMut(JsValue)>);

    #[wasm_bindgen(js_namespace = ["chrome", "action"], js_name = setBadgeText)]
    pub fn set_badge_text(details: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
    pub fn set_badge_background_color(details: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "notifications"], js_name = create)]
    pub fn notifications_create(options: JsValue) -> js_sys::Promise;
}

/// Best-effort message out of a thrown JS value
pub fn js_error(e: JsValue) -> RelayError {
    let message = e
        .as_string()
        .or_else(|| {
            js_sys::Reflect::get(&e, &"message".into())
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", e));
    RelayError::Channel(message)
}

pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue> {
    let text = serde_json::to_string(value)?;
    Ok(js_sys::JSON::parse(&text).map_err(js_error)?)
}

pub fn from_js(value: &JsValue) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value).map_err(js_error)?.into();
    Ok(serde_json::from_str(&text)?)
}

/// Decode the answer of a `sendMessage` call
pub fn reply_from_js(answer: &JsValue) -> Result<Reply> {
    match from_js(answer)? {
        // no listener called sendResponse
        Value::Null => Err(RelayError::Channel("No response from receiver".to_string()).into()),
        value => Ok(serde_json::from_value(value)?),
    }
}

/// `sender.tab.id` of a `runtime.onMessage` sender
pub fn message_sender(sender: &JsValue) -> MessageSender {
    let tab_id = js_sys::Reflect::get(sender, &"tab".into())
        .ok()
        .filter(|tab| tab.is_object())
        .and_then(|tab| js_sys::Reflect::get(&tab, &"id".into()).ok())
        .and_then(|id| id.as_f64())
        .map(|id| id as i32);
    MessageSender { tab_id }
}

pub fn respond(send_response: &js_sys::Function, reply: &Reply) {
    let sent = to_js(reply).and_then(|payload| {
        send_response
            .call1(&JsValue::NULL, &payload)
            .map(|_| ())
            .map_err(|e| js_error(e).into())
    });
    if let Err(e) = sent {
        log::warn!("Failed to send response: {}", e);
    }
}
