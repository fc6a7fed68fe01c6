use dioxus::prelude::*;
use x402_pay_core::payment::PaymentReceipt;

use crate::icons;

#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Info(String),
    Success(String),
    Paid(PaymentReceipt),
    Error(String),
}

#[component]
pub fn NoticeBanner(notice: Notice, on_dismiss: EventHandler<()>) -> Element {
    let (tone, message, link) = match &notice {
        Notice::Info(message) => ("bg-blue-50 border-blue-200 text-blue-800", message.clone(), None),
        Notice::Success(message) => ("bg-green-50 border-green-200 text-green-800", message.clone(), None),
        Notice::Paid(receipt) => (
            "bg-green-50 border-green-200 text-green-800",
            receipt.message.clone(),
            receipt.explorer_url.clone(),
        ),
        Notice::Error(message) => ("bg-red-50 border-red-200 text-red-800", message.clone(), None),
    };
    let failed = matches!(notice, Notice::Error(_));

    rsx! {
        div { class: "border rounded-lg p-3 text-sm {tone}",
            div { class: "flex items-start",
                if failed {
                    icons::AlertCircle { class: Some("w-4 h-4 mr-2 mt-0.5 flex-shrink-0".to_string()) }
                } else {
                    icons::CheckCircle { class: Some("w-4 h-4 mr-2 mt-0.5 flex-shrink-0".to_string()) }
                }
                div { class: "flex-1 break-words",
                    p { "{message}" }
                    if let Some(href) = link {
                        a {
                            class: "inline-flex items-center mt-1 underline",
                            href: "{href}",
                            target: "_blank",
                            "View on explorer"
                            icons::ExternalLink { class: Some("w-3 h-3 ml-1".to_string()) }
                        }
                    }
                }
                button {
                    class: "ml-2 opacity-60 hover:opacity-100",
                    onclick: move |_| on_dismiss.call(()),
                    icons::X { class: Some("w-4 h-4".to_string()) }
                }
            }
        }
    }
}
