// window.ethereum as an EIP-1193 provider

use async_trait::async_trait;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use x402_pay_core::wallet::{
    EventSource, ProviderEvent, ProviderInfo, ProviderListener, SubscriptionStyle, WalletProvider, PROVIDER_EVENTS,
};
use x402_pay_core::ProviderError;

use crate::chrome::{from_js, to_js};

fn property(target: &JsValue, name: &str) -> JsValue {
    js_sys::Reflect::get(target, &name.into()).unwrap_or(JsValue::UNDEFINED)
}

fn method(target: &JsValue, name: &str) -> Option<js_sys::Function> {
    property(target, name).dyn_into::<js_sys::Function>().ok()
}

fn provider_error(e: JsValue) -> ProviderError {
    let message = property(&e, "message")
        .as_string()
        .or_else(|| e.as_string())
        .unwrap_or_else(|| "Wallet request failed".to_string());
    match property(&e, "code").as_f64() {
        Some(code) => ProviderError::with_code(code as i64, message),
        None => ProviderError::new(message),
    }
}

#[derive(Clone)]
pub struct InjectedProvider {
    ethereum: JsValue,
}

impl InjectedProvider {
    /// `window.ethereum` if a wallet has injected one yet
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = property(&window, "ethereum");
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        Some(Self { ethereum })
    }

    fn flag(&self, name: &str) -> bool {
        property(&self.ethereum, name).as_bool().unwrap_or(false)
    }

    fn text(&self, name: &str) -> Option<String> {
        property(&self.ethereum, name).as_string()
    }

    /// Which subscription method this provider exposes
    pub fn subscription_style(&self) -> Option<SubscriptionStyle> {
        SubscriptionStyle::detect(
            method(&self.ethereum, "addEventListener").is_some(),
            method(&self.ethereum, "on").is_some(),
        )
    }
}

#[async_trait(?Send)]
impl WalletProvider for InjectedProvider {
    async fn request(&self, method_name: &str, params: Value) -> Result<Value, ProviderError> {
        let request = method(&self.ethereum, "request")
            .ok_or_else(|| ProviderError::new("Provider has no request method"))?;
        let args = to_js(&json!({ "method": method_name, "params": params }))
            .map_err(|e| ProviderError::new(e.to_string()))?;

        let promise = request
            .call1(&self.ethereum, &args)
            .map_err(provider_error)?
            .dyn_into::<js_sys::Promise>()
            .map_err(|_| ProviderError::new(format!("{} did not return a promise", method_name)))?;
        let result = JsFuture::from(promise).await.map_err(provider_error)?;
        from_js(&result).map_err(|e| ProviderError::new(e.to_string()))
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            available: true,
            is_coinbase_wallet: self.flag("isCoinbaseWallet"),
            is_meta_mask: self.flag("isMetaMask"),
            chain_id: self.text("chainId"),
            selected_address: self.text("selectedAddress"),
        }
    }
}

/// Subscribes through whichever method the provider was detected to have
pub struct ProviderEvents {
    provider: InjectedProvider,
    style: SubscriptionStyle,
}

impl ProviderEvents {
    pub fn new(provider: InjectedProvider) -> Option<Self> {
        let style = provider.subscription_style()?;
        Some(Self { provider, style })
    }
}

impl EventSource for ProviderEvents {
    fn subscribe(&self, listener: ProviderListener) -> Result<(), ProviderError> {
        let name = match self.style {
            SubscriptionStyle::AddEventListener => "addEventListener",
            SubscriptionStyle::On => "on",
        };
        let register = method(&self.provider.ethereum, name)
            .ok_or_else(|| ProviderError::new(format!("Provider lost its {} method", name)))?;

        for event in PROVIDER_EVENTS {
            let listener = listener.clone();
            let callback = Closure::wrap(Box::new(move |payload: JsValue| {
                let payload = from_js(&payload).unwrap_or(Value::Null);
                match ProviderEvent::parse(event, &payload) {
                    Some(parsed) => listener(parsed),
                    None => log::debug!("Ignoring malformed {} event", event),
                }
            }) as Box<dyn FnMut(JsValue)>);
            register
                .call2(&self.provider.ethereum, &event.into(), callback.as_ref())
                .map_err(provider_error)?;
            callback.forget();
        }
        log::info!("👂 Subscribed to provider events via {}", name);
        Ok(())
    }
}
