use dioxus::prelude::*;
use x402_pay_core::history::{TransactionRecord, TxStatus};

use crate::icons;
use crate::popup_context::PopupContext;

fn status_style(status: TxStatus) -> (&'static str, &'static str) {
    match status {
        TxStatus::Success => ("text-green-600", "Paid"),
        TxStatus::Failed => ("text-yellow-600", "Failed"),
        TxStatus::Error => ("text-red-600", "Error"),
    }
}

#[component]
pub fn HistoryList(records: Vec<TransactionRecord>, explorer: PopupContext, on_clear: EventHandler<()>) -> Element {
    rsx! {
        div { class: "space-y-2",
            div { class: "flex items-center justify-between",
                h3 { class: "text-sm font-medium text-gray-500 uppercase", "Recent Payments" }
                if !records.is_empty() {
                    button {
                        class: "text-gray-400 hover:text-red-600 flex items-center text-xs",
                        onclick: move |_| on_clear.call(()),
                        icons::Trash { class: Some("w-3 h-3 mr-1".to_string()) }
                        "Clear"
                    }
                }
            }

            if records.is_empty() {
                div { class: "text-center py-6 text-gray-400 text-sm",
                    p { "No transactions yet" }
                }
            }

            for (index, record) in records.iter().enumerate() {
                div {
                    key: "{index}",
                    class: "bg-white rounded-lg shadow-sm p-3 text-sm",
                    div { class: "flex justify-between",
                        span { class: "font-medium text-gray-900", "{record.amount} {record.currency}" }
                        span { class: status_style(record.status).0, "{status_style(record.status).1}" }
                    }
                    if !record.description.is_empty() {
                        p { class: "text-xs text-gray-500 truncate", "{record.description}" }
                    }
                    if let Some(error) = &record.error {
                        p { class: "text-xs text-red-500 mt-1", "{error}" }
                    }
                    if let Some(href) = record.tx_hash.as_deref().and_then(|hash| explorer.explorer_link(hash)) {
                        a {
                            class: "inline-flex items-center text-xs text-blue-600 hover:underline mt-1",
                            href: "{href}",
                            target: "_blank",
                            "View transaction"
                            icons::ExternalLink { class: Some("w-3 h-3 ml-1".to_string()) }
                        }
                    }
                }
            }
        }
    }
}
