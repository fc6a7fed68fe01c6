//! Browser side of the x402 payment extension.
//!
//! The library holds the `chrome.*` / DOM adapters shared by the context
//! binaries (`background`, `content`, `page_bridge`) and the Dioxus popup.

use std::rc::Rc;
use x402_pay_core::ExtensionConfig;

pub mod chrome;
pub mod dom;
pub mod runtime;
pub mod services;

#[cfg(feature = "dioxus")]
mod components;
#[cfg(feature = "dioxus")]
pub mod icons;
#[cfg(feature = "dioxus")]
mod popup;
#[cfg(feature = "dioxus")]
mod popup_context;

#[cfg(feature = "dioxus")]
pub use popup::run_popup;

pub fn init_logging() {
    wasm_logger::init(wasm_logger::Config::default());
}

/// The bundled network/token configuration; `None` (logged) if it is invalid
pub fn load_config() -> Option<Rc<ExtensionConfig>> {
    match ExtensionConfig::bundled() {
        Ok(config) => Some(Rc::new(config)),
        Err(e) => {
            log::error!("Invalid bundled configuration: {:#}", e);
            None
        }
    }
}
