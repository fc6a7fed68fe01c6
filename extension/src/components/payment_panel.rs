use dioxus::prelude::*;
use x402_pay_core::detection::DetectionRecord;

use crate::icons;

#[component]
pub fn PaymentPanel(
    detection: Option<DetectionRecord>,
    connected: bool,
    busy: bool,
    on_pay: EventHandler<()>,
) -> Element {
    let Some(record) = detection else {
        return rsx! {
            div { class: "bg-white rounded-lg shadow p-4 text-center text-sm text-gray-400",
                "No payment required on this page"
            }
        };
    };

    rsx! {
        div { class: "bg-white rounded-lg shadow p-4",
            div { class: "flex items-center mb-3",
                icons::CreditCard { class: Some("w-5 h-5 text-blue-600 mr-2".to_string()) }
                h2 { class: "text-sm font-medium text-gray-500 uppercase", "Payment Required" }
            }
            div { class: "bg-gradient-to-br from-blue-500 to-blue-700 rounded-lg p-4 text-white mb-4",
                h3 { class: "text-3xl font-bold", "{record.amount} {record.currency}" }
                p { class: "text-sm opacity-80 mt-1", "{record.description}" }
            }
            button {
                class: "w-full bg-green-600 text-white py-3 px-4 rounded-lg hover:bg-green-700 transition disabled:opacity-50 disabled:cursor-not-allowed",
                disabled: busy || !connected,
                onclick: move |_| on_pay.call(()),
                if busy { "Processing..." } else { "Pay {record.amount} {record.currency}" }
            }
            if !connected {
                p { class: "mt-2 text-xs text-gray-500 text-center", "Connect your wallet first" }
            }
        }
    }
}
