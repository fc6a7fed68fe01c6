//! Browser implementations of the core's context traits.

use async_trait::async_trait;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use x402_pay_core::clock::Clock;
use x402_pay_core::coordinator::{Badge, BadgeSurface, Notifier};
use x402_pay_core::popup::Tabs;
use x402_pay_core::relay::Background;
use x402_pay_core::router::{serve, Action, Handler};
use x402_pay_core::{Reply, Result, RuntimeMessage, TabMessage};

use crate::chrome::{self, from_js, js_error, message_sender, reply_from_js, respond, to_js};

/// `Date.now()` and `setTimeout`
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        gloo_timers::future::sleep(duration).boxed_local()
    }
}

/// `chrome.runtime.sendMessage`
pub struct ChromeRuntime;

#[async_trait(?Send)]
impl Background for ChromeRuntime {
    async fn send(&self, message: RuntimeMessage) -> Result<Reply> {
        let promise = chrome::runtime_send_message(to_js(&message)?).map_err(js_error)?;
        let answer = JsFuture::from(promise).await.map_err(js_error)?;
        reply_from_js(&answer)
    }
}

pub struct ChromeTabs;

#[async_trait(?Send)]
impl Tabs for ChromeTabs {
    async fn active_tab(&self) -> Result<Option<i32>> {
        let query = to_js(&json!({ "active": true, "currentWindow": true }))?;
        let tabs = JsFuture::from(chrome::tabs_query(query)).await.map_err(js_error)?;
        let tabs = from_js(&tabs)?;
        Ok(tabs
            .get(0)
            .and_then(|tab| tab.get("id"))
            .and_then(|id| id.as_i64())
            .map(|id| id as i32))
    }

    async fn send(&self, tab_id: i32, message: TabMessage) -> Result<Reply> {
        let promise = chrome::tabs_send_message(tab_id, to_js(&message)?).map_err(js_error)?;
        let answer = JsFuture::from(promise).await.map_err(js_error)?;
        reply_from_js(&answer)
    }
}

/// `chrome.action` badge
pub struct ChromeBadge;

impl BadgeSurface for ChromeBadge {
    fn show(&self, tab_id: i32, badge: Badge) {
        spawn_local(async move {
            let text = to_js(&json!({ "tabId": tab_id, "text": badge.text }));
            if let Ok(details) = text {
                if let Err(e) = JsFuture::from(chrome::set_badge_text(details)).await {
                    log::warn!("setBadgeText failed: {:?}", e);
                }
            }
            let Some(color) = badge.color else {
                return;
            };
            if let Ok(details) = to_js(&json!({ "tabId": tab_id, "color": color })) {
                if let Err(e) = JsFuture::from(chrome::set_badge_background_color(details)).await {
                    log::warn!("setBadgeBackgroundColor failed: {:?}", e);
                }
            }
        });
    }
}

pub struct ChromeNotifier {
    pub icon: &'static str,
}

impl Notifier for ChromeNotifier {
    fn notify(&self, title: &str, message: &str) {
        let options = to_js(&json!({
            "type": "basic",
            "iconUrl": self.icon,
            "title": title,
            "message": message,
        }));
        let Ok(options) = options else {
            return;
        };
        spawn_local(async move {
            if let Err(e) = JsFuture::from(chrome::notifications_create(options)).await {
                log::warn!("Notification failed: {:?}", e);
            }
        });
    }
}

/// Serve one message family on `chrome.runtime.onMessage`.
///
/// The listener returns `true` so the browser keeps the response channel
/// open until the handler's future settles.
pub fn listen<A, H>(handler: Rc<H>)
where
    A: Action + 'static,
    H: Handler<A> + 'static,
{
    let callback = Closure::wrap(Box::new(move |message: JsValue, sender: JsValue, send_response: js_sys::Function| {
        let handler = handler.clone();
        spawn_local(async move {
            let sender = message_sender(&sender);
            let reply_to = move |reply: Reply| respond(&send_response, &reply);
            match from_js(&message) {
                Ok(raw) => serve::<A, H, _>(&*handler, &raw, sender, reply_to).await,
                Err(e) => reply_to(Reply::error(e)),
            }
        });
        true
    }) as Box<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>);
    chrome::on_runtime_message(&callback);
    callback.forget();
}
