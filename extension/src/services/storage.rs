// chrome.storage.local behind the core's key/value store

use async_trait::async_trait;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use x402_pay_core::history::KeyValueStore;
use x402_pay_core::{Error, Result};

use crate::chrome::{from_js, to_js};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"])]
    fn get(keys: JsValue) -> js_sys::Promise;

    #[wasm_bindgen(js_namespace = ["chrome", "storage", "local"])]
    fn set(items: JsValue) -> js_sys::Promise;
}

fn storage_error(e: JsValue) -> Error {
    Error::Storage(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeStore;

impl ChromeStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl KeyValueStore for ChromeStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let keys = js_sys::Array::new();
        keys.push(&key.into());

        let result = JsFuture::from(get(keys.into())).await.map_err(storage_error)?;
        let item = js_sys::Reflect::get(&result, &key.into()).map_err(storage_error)?;
        match from_js(&item)? {
            Value::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let obj = js_sys::Object::new();
        js_sys::Reflect::set(&obj, &key.into(), &to_js(&value)?).map_err(storage_error)?;

        JsFuture::from(set(obj.into())).await.map_err(storage_error)?;
        log::debug!("Stored {}", key);
        Ok(())
    }
}
