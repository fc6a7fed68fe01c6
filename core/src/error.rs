//! Error taxonomy shared by every context.
//!
//! Nothing here is fatal: each error is converted into an `ERROR` reply at
//! the boundary nearest to where it happened.

use thiserror::Error;

/// Failures of the message channel itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("{action} timed out after {after_ms} ms")]
    Timeout { action: String, after_ms: u64 },

    #[error("Context disconnected before {0} completed")]
    Disconnected(String),

    #[error("Message channel error: {0}")]
    Channel(String),

    #[error("{0}")]
    Remote(String),
}

/// Provider-level JSON-RPC error as reported by the injected wallet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    /// EIP-3085: the requested chain has not been added to the wallet
    pub const UNKNOWN_CHAIN: i64 = 4902;
    /// EIP-1193: user rejected the request
    pub const USER_REJECTED: i64 = 4001;

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn is_unknown_chain(&self) -> bool {
        self.code == Some(Self::UNKNOWN_CHAIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("No wallet detected. Please install a wallet extension.")]
    NoProvider,

    #[error("No accounts found. Please unlock your wallet.")]
    NoAccounts,

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Please switch to {0} network")]
    WrongNetwork(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("Payment cancelled by user")]
    UserRejected,

    #[error("{0}")]
    Rpc(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid payment amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl From<ProviderError> for Error {
    fn from(e: ProviderError) -> Self {
        Error::Wallet(WalletError::Rpc(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
