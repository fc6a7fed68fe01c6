use dioxus::prelude::*;
use x402_pay_core::wallet::WalletStatusReport;

use crate::icons;
use crate::popup_context::PopupContext;

fn short_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

#[component]
pub fn WalletPanel(wallet: Signal<Option<WalletStatusReport>>, busy: bool, on_connect: EventHandler<()>) -> Element {
    let context = use_context::<PopupContext>();
    let config = context.config();
    let symbol = config.token.symbol.clone();
    let expected_network = config.network.name.clone();
    let report = wallet().unwrap_or_default();
    let address = short_address(report.wallet_address.as_deref().unwrap_or_default());
    let balance = report.balance.clone().unwrap_or_else(|| "-".to_string());
    let network = report.network.clone().unwrap_or_else(|| expected_network.clone());

    rsx! {
        div { class: "bg-white rounded-lg shadow p-4",
            div { class: "flex items-center mb-3",
                icons::Wallet { class: Some("w-5 h-5 text-blue-600 mr-2".to_string()) }
                h2 { class: "text-sm font-medium text-gray-500 uppercase", "Wallet" }
            }

            if report.wallet_connected {
                div { class: "space-y-2 text-sm",
                    div { class: "flex justify-between",
                        span { class: "text-gray-500", "Address" }
                        span { class: "font-mono text-gray-900", "{address}" }
                    }
                    div { class: "flex justify-between",
                        span { class: "text-gray-500", "Balance" }
                        span { class: "text-gray-900", "{balance} {symbol}" }
                    }
                    div { class: "flex justify-between",
                        span { class: "text-gray-500", "Network" }
                        span { class: "text-green-600", "{network}" }
                    }
                }
            } else {
                p { class: "text-sm text-gray-600 mb-3",
                    if report.wallet_available {
                        "Connect your wallet to pay on {expected_network}."
                    } else {
                        "No wallet detected on this page yet."
                    }
                }
                button {
                    class: "w-full bg-blue-600 text-white py-2 px-4 rounded-lg hover:bg-blue-700 transition disabled:opacity-50 disabled:cursor-not-allowed",
                    disabled: busy,
                    onclick: move |_| on_connect.call(()),
                    "Connect Wallet"
                }
            }
        }
    }
}
