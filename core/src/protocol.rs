//! Wire messages exchanged between the four extension contexts.
//!
//! | Family | Direction |
//! |--------|-----------|
//! | [`RuntimeMessage`] | content script / popup -> background |
//! | [`TabMessage`] | popup -> content script |
//! | [`BridgeRequest`] | content script -> page bridge (correlated) |
//! | [`BridgeMessage`] | page bridge -> content script |
//!
//! Every reply has the same shape, see [`Reply`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

use crate::detection::DetectionRecord;
use crate::error::{Error, RelayError, Result};
use crate::history::TxStatus;
use crate::router::Action;

/// `source` tag on window messages posted by the content script
pub const CONTENT_SOURCE: &str = "x402-content-script";
/// `source` tag on window messages posted by the page bridge
pub const BRIDGE_SOURCE: &str = "x402-wallet-bridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// `{status: "OK" | "ERROR", error?, data?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: ReplyStatus::Ok,
            error: None,
            data: Value::Null,
        }
    }

    pub fn data<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status: ReplyStatus::Ok,
                error: None,
                data,
            },
            Err(e) => Self::error(format!("Serialization error: {}", e)),
        }
    }

    pub fn error(message: impl Display) -> Self {
        Self {
            status: ReplyStatus::Error,
            error: Some(message.to_string()),
            data: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// An `ERROR` reply becomes [`RelayError::Remote`]
    pub fn into_result(self) -> std::result::Result<Value, RelayError> {
        match self.status {
            ReplyStatus::Ok => Ok(self.data),
            ReplyStatus::Error => Err(RelayError::Remote(
                self.error.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(Error::from)
    }
}

impl<T: Serialize, E: Display> From<std::result::Result<T, E>> for Reply {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(data) => Reply::data(&data),
            Err(e) => Reply::error(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletEventKind {
    Connect,
    Disconnect,
    Balance,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPhase {
    Started,
    Success,
    Failed,
    Error,
}

impl PaymentPhase {
    /// History status for terminal phases, `None` while in flight
    pub fn history_status(self) -> Option<TxStatus> {
        match self {
            PaymentPhase::Started => None,
            PaymentPhase::Success => Some(TxStatus::Success),
            PaymentPhase::Failed => Some(TxStatus::Failed),
            PaymentPhase::Error => Some(TxStatus::Error),
        }
    }
}

/// Payload of payment events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReport {
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentReport {
    pub fn for_detection(detection: &DetectionRecord) -> Self {
        Self {
            amount: detection.amount.clone(),
            currency: detection.currency.clone(),
            description: detection.description.clone(),
            ..Default::default()
        }
    }
}

/// Messages answered by the background coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeMessage {
    Ping,
    WalletEvent {
        event: WalletEventKind,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "X402_DETECTED")]
    X402Detected { data: DetectionRecord },
    #[serde(rename = "X402_CLEARED")]
    X402Cleared,
    PaymentStatus {
        status: PaymentPhase,
        data: PaymentReport,
    },
    ContentScriptLoaded,
    GetState,
    GetTransactions,
    ClearHistory,
}

impl Action for RuntimeMessage {
    const ACTIONS: &'static [&'static str] = &[
        "PING",
        "WALLET_EVENT",
        "X402_DETECTED",
        "X402_CLEARED",
        "PAYMENT_STATUS",
        "CONTENT_SCRIPT_LOADED",
        "GET_STATE",
        "GET_TRANSACTIONS",
        "CLEAR_HISTORY",
    ];

    fn name(&self) -> &'static str {
        match self {
            RuntimeMessage::Ping => "PING",
            RuntimeMessage::WalletEvent { .. } => "WALLET_EVENT",
            RuntimeMessage::X402Detected { .. } => "X402_DETECTED",
            RuntimeMessage::X402Cleared => "X402_CLEARED",
            RuntimeMessage::PaymentStatus { .. } => "PAYMENT_STATUS",
            RuntimeMessage::ContentScriptLoaded => "CONTENT_SCRIPT_LOADED",
            RuntimeMessage::GetState => "GET_STATE",
            RuntimeMessage::GetTransactions => "GET_TRANSACTIONS",
            RuntimeMessage::ClearHistory => "CLEAR_HISTORY",
        }
    }
}

/// Messages the popup sends to the content script of the active tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabMessage {
    Ping,
    CheckStatus,
    ConnectWallet,
    GetWalletStatus,
    MakePayment,
}

impl Action for TabMessage {
    const ACTIONS: &'static [&'static str] = &[
        "PING",
        "CHECK_STATUS",
        "CONNECT_WALLET",
        "GET_WALLET_STATUS",
        "MAKE_PAYMENT",
    ];

    fn name(&self) -> &'static str {
        match self {
            TabMessage::Ping => "PING",
            TabMessage::CheckStatus => "CHECK_STATUS",
            TabMessage::ConnectWallet => "CONNECT_WALLET",
            TabMessage::GetWalletStatus => "GET_WALLET_STATUS",
            TabMessage::MakePayment => "MAKE_PAYMENT",
        }
    }
}

/// Wallet operations served by the page bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeAction {
    CheckWalletProviders,
    ConnectWallet,
    GetWalletStatus,
    MakePayment { payload: DetectionRecord },
}

impl Action for BridgeAction {
    const ACTIONS: &'static [&'static str] = &[
        "CHECK_WALLET_PROVIDERS",
        "CONNECT_WALLET",
        "GET_WALLET_STATUS",
        "MAKE_PAYMENT",
    ];

    fn name(&self) -> &'static str {
        match self {
            BridgeAction::CheckWalletProviders => "CHECK_WALLET_PROVIDERS",
            BridgeAction::ConnectWallet => "CONNECT_WALLET",
            BridgeAction::GetWalletStatus => "GET_WALLET_STATUS",
            BridgeAction::MakePayment { .. } => "MAKE_PAYMENT",
        }
    }
}

/// `{source, id, action, payload?}` posted from the content script
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    pub id: u64,
    pub action: BridgeAction,
}

impl BridgeRequest {
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(&self.action)?;
        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::from(self.id));
        }
        Ok(stamp(value, CONTENT_SOURCE))
    }
}

/// Events raised by the wallet manager inside the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WalletManagerEvent {
    WalletConnected(String),
    WalletDisconnected,
    BalanceUpdated(String),
    NetworkUpdated(String),
    PaymentStarted(PaymentReport),
    PaymentSuccess(PaymentReport),
    PaymentFailed(PaymentReport),
    PaymentError(PaymentReport),
}

impl WalletManagerEvent {
    /// Background message the relay forwards this event as
    pub fn into_runtime(self) -> RuntimeMessage {
        let wallet = |event, data| RuntimeMessage::WalletEvent { event, data };
        let payment = |status, data| RuntimeMessage::PaymentStatus { status, data };
        match self {
            WalletManagerEvent::WalletConnected(address) => {
                wallet(WalletEventKind::Connect, Value::String(address))
            }
            WalletManagerEvent::WalletDisconnected => wallet(WalletEventKind::Disconnect, Value::Null),
            WalletManagerEvent::BalanceUpdated(balance) => {
                wallet(WalletEventKind::Balance, Value::String(balance))
            }
            WalletManagerEvent::NetworkUpdated(chain) => {
                wallet(WalletEventKind::Network, Value::String(chain))
            }
            WalletManagerEvent::PaymentStarted(r) => payment(PaymentPhase::Started, r),
            WalletManagerEvent::PaymentSuccess(r) => payment(PaymentPhase::Success, r),
            WalletManagerEvent::PaymentFailed(r) => payment(PaymentPhase::Failed, r),
            WalletManagerEvent::PaymentError(r) => payment(PaymentPhase::Error, r),
        }
    }
}

/// Everything the page bridge posts back to the content script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeMessage {
    Ready,
    Response { id: u64, response: Reply },
    Event { event: WalletManagerEvent },
}

impl BridgeMessage {
    pub fn to_value(&self) -> Result<Value> {
        Ok(stamp(serde_json::to_value(self)?, BRIDGE_SOURCE))
    }

    /// `None` for anything not stamped by the bridge (page noise, our own requests)
    pub fn from_value(raw: &Value) -> Option<Self> {
        if source_of(raw) != Some(BRIDGE_SOURCE) {
            return None;
        }
        match serde_json::from_value(raw.clone()) {
            Ok(message) => Some(message),
            Err(e) => {
                log::warn!("Dropping malformed bridge message: {}", e);
                None
            }
        }
    }
}

pub fn stamp(mut value: Value, source: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("source".to_string(), Value::String(source.to_string()));
    }
    value
}

pub fn source_of(raw: &Value) -> Option<&str> {
    raw.get("source").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::decode;
    use serde_json::json;

    fn detection() -> DetectionRecord {
        DetectionRecord {
            detected: true,
            amount: "2.50".to_string(),
            currency: "USDC".to_string(),
            description: "Premium article".to_string(),
            payment_target: None,
        }
    }

    #[test]
    fn test_runtime_message_wire_names() {
        let msg: RuntimeMessage = decode(&json!({"action": "X402_DETECTED", "data": {
            "detected": true, "amount": "2.50", "currency": "USDC", "description": "Premium article"
        }}))
        .unwrap();
        assert_eq!(msg, RuntimeMessage::X402Detected { data: detection() });

        let value = serde_json::to_value(RuntimeMessage::ContentScriptLoaded).unwrap();
        assert_eq!(value, json!({"action": "CONTENT_SCRIPT_LOADED"}));
    }

    #[test]
    fn test_every_listed_action_is_decodable() {
        for name in TabMessage::ACTIONS {
            let msg: TabMessage = decode(&json!({ "action": name })).unwrap();
            assert_eq!(msg.name(), *name);
        }
        for name in ["PING", "X402_CLEARED", "CONTENT_SCRIPT_LOADED", "GET_STATE", "GET_TRANSACTIONS", "CLEAR_HISTORY"] {
            let msg: RuntimeMessage = decode(&json!({ "action": name })).unwrap();
            assert_eq!(msg.name(), name);
        }
    }

    #[test]
    fn test_bridge_request_envelope() {
        let request = BridgeRequest {
            id: 7,
            action: BridgeAction::MakePayment {
                payload: detection(),
            },
        };
        let value = request.to_value().unwrap();
        assert_eq!(value["source"], CONTENT_SOURCE);
        assert_eq!(value["id"], 7);
        assert_eq!(value["action"], "MAKE_PAYMENT");
        assert_eq!(value["payload"]["amount"], "2.50");

        assert_eq!(decode::<BridgeAction>(&value).unwrap(), request.action);
    }

    #[test]
    fn test_bridge_message_ignores_foreign_sources() {
        let event = BridgeMessage::Event {
            event: WalletManagerEvent::WalletConnected("0xabc".to_string()),
        };
        let value = event.to_value().unwrap();
        assert_eq!(value["event"]["type"], "walletConnected");
        assert_eq!(BridgeMessage::from_value(&value), Some(event));

        assert_eq!(BridgeMessage::from_value(&json!({"kind": "ready"})), None);
        assert_eq!(
            BridgeMessage::from_value(&json!({"source": BRIDGE_SOURCE, "kind": "ready"})),
            Some(BridgeMessage::Ready)
        );
    }

    #[test]
    fn test_manager_events_map_to_runtime_messages() {
        let report = PaymentReport::for_detection(&detection());
        assert_eq!(
            WalletManagerEvent::PaymentFailed(report.clone()).into_runtime(),
            RuntimeMessage::PaymentStatus {
                status: PaymentPhase::Failed,
                data: report
            }
        );
        assert_eq!(
            WalletManagerEvent::WalletDisconnected.into_runtime(),
            RuntimeMessage::WalletEvent {
                event: WalletEventKind::Disconnect,
                data: Value::Null
            }
        );
    }

    #[test]
    fn test_reply_shape() {
        let reply = Reply::error("Connection timeout");
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"status": "ERROR", "error": "Connection timeout"})
        );
        assert_eq!(
            reply.into_result(),
            Err(RelayError::Remote("Connection timeout".to_string()))
        );

        let reply = Reply::data(&json!({"address": "0xabc"}));
        assert!(reply.is_ok());
        assert_eq!(reply.into_result().unwrap()["address"], "0xabc");
    }
}
