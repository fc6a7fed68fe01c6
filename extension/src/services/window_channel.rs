// window.postMessage between the content script and the page bridge

use serde_json::Value;
use wasm_bindgen::prelude::*;
use web_sys::{MessageEvent, Window};
use x402_pay_core::correlator::Outbound;
use x402_pay_core::RelayError;

use crate::chrome::{from_js, js_error, to_js};

#[derive(Clone)]
pub struct WindowChannel {
    window: Window,
}

impl WindowChannel {
    pub fn new() -> Option<Self> {
        Some(Self {
            window: web_sys::window()?,
        })
    }

    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_else(|_| "*".to_string())
    }

    /// Call `on_message` with every message this window posts to itself
    pub fn listen<F>(&self, on_message: F) -> Result<(), JsValue>
    where
        F: Fn(Value) + 'static,
    {
        let window = self.window.clone();
        let onmessage_callback = Closure::wrap(Box::new(move |ev: MessageEvent| {
            // same-window messages only
            let same_window = ev
                .source()
                .map(|source| JsValue::from(source) == JsValue::from(window.clone()))
                .unwrap_or(false);
            if !same_window {
                return;
            }
            match from_js(&ev.data()) {
                Ok(Value::Object(map)) => on_message(Value::Object(map)),
                Ok(_) => {}
                Err(e) => log::debug!("Ignoring undecodable window message: {}", e),
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        self.window
            .add_event_listener_with_callback("message", onmessage_callback.as_ref().unchecked_ref())?;
        onmessage_callback.forget();
        Ok(())
    }
}

impl Outbound for WindowChannel {
    fn post(&self, message: Value) -> Result<(), RelayError> {
        let payload = to_js(&message).map_err(|e| RelayError::Channel(e.to_string()))?;
        self.window.post_message(&payload, &self.origin()).map_err(js_error)
    }
}
