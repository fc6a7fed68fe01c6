use dioxus::prelude::*;
use x402_pay_core::popup::{PopupStatus, StatusSource};

use crate::icons;

#[component]
pub fn StatusBar(status: Signal<Option<PopupStatus>>, busy: bool, on_refresh: EventHandler<()>) -> Element {
    let (dot, label) = match status() {
        Some(PopupStatus {
            source: StatusSource::Page,
            ..
        }) => ("bg-green-500", "Connected to page"),
        Some(PopupStatus {
            source: StatusSource::Background,
            ..
        }) => ("bg-yellow-400", "Page unavailable, showing saved state"),
        None => ("bg-gray-400", "Not connected"),
    };

    rsx! {
        div { class: "flex items-center justify-between",
            div { class: "flex items-center space-x-2",
                h1 { class: "text-xl font-bold text-gray-900", "x402 Pay" }
            }
            div { class: "flex items-center space-x-2 text-xs text-gray-600",
                span { class: "w-2 h-2 rounded-full {dot}" }
                span { "{label}" }
                button {
                    class: "text-gray-400 hover:text-gray-600 disabled:opacity-50",
                    disabled: busy,
                    title: "Refresh",
                    onclick: move |_| on_refresh.call(()),
                    icons::RefreshCw { class: Some(if busy { "w-4 h-4 animate-spin".to_string() } else { "w-4 h-4".to_string() }) }
                }
            }
        }
    }
}
