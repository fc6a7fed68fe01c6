//! x402 payment extension core.
//!
//! Protocol, state and payment logic for the four extension contexts
//! (background, content script, page bridge, popup). Browser APIs sit
//! behind small traits so everything here runs natively under test.

pub mod abi;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod correlator;
pub mod detection;
pub mod error;
pub mod history;
pub mod payment;
pub mod popup;
pub mod protocol;
pub mod relay;
pub mod router;
pub mod wallet;

#[cfg(test)]
mod end_to_end;

pub use config::ExtensionConfig;
pub use error::{Error, ProviderError, RelayError, Result, WalletError};
pub use protocol::{BridgeAction, BridgeMessage, Reply, RuntimeMessage, TabMessage};
