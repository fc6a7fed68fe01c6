//! Persisted transaction history and wallet snapshot.
//!
//! Both live in the extension's key/value storage. Writes are
//! read-modify-write; the coordinator is the only writer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::{PaymentPhase, PaymentReport};

pub const TRANSACTIONS_KEY: &str = "transactions";
pub const WALLET_STATUS_KEY: &str = "walletStatus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub status: TxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: u64,
}

impl TransactionRecord {
    /// `None` for non-terminal phases
    pub fn from_report(phase: PaymentPhase, report: &PaymentReport, timestamp: u64) -> Option<Self> {
        let status = phase.history_status()?;
        Some(Self {
            amount: report.amount.clone(),
            currency: report.currency.clone(),
            description: report.description.clone(),
            tx_hash: report.tx_hash.clone(),
            network: report.network.clone(),
            status,
            error: report.error.clone(),
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// Partial update merged into the stored [`WalletStatus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletUpdate {
    Connected(String),
    Disconnected,
    Balance(String),
    Network(String),
}

impl WalletStatus {
    pub fn apply(&mut self, update: &WalletUpdate) {
        match update {
            WalletUpdate::Connected(address) => {
                self.connected = true;
                self.address = Some(address.clone());
            }
            WalletUpdate::Disconnected => {
                self.connected = false;
                self.address = None;
                self.balance = None;
            }
            WalletUpdate::Balance(balance) => self.balance = Some(balance.clone()),
            WalletUpdate::Network(network) => self.network = Some(network.clone()),
        }
    }
}

/// Async key/value storage (`chrome.storage.local` in the browser)
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait(?Send)]
impl<S: KeyValueStore + ?Sized> KeyValueStore for std::rc::Rc<S> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }
}

/// Bounded newest-first transaction log
pub struct History<S> {
    store: S,
    cap: usize,
}

impl<S: KeyValueStore> History<S> {
    pub fn new(store: S, cap: usize) -> Self {
        Self { store, cap }
    }

    pub async fn load(&self) -> Result<Vec<TransactionRecord>> {
        match self.store.get(TRANSACTIONS_KEY).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| Error::Storage(format!("corrupt {}: {}", TRANSACTIONS_KEY, e))),
        }
    }

    /// Insert at the front and drop the oldest entries beyond the cap.
    /// A corrupt log is started over.
    pub async fn append(&self, record: TransactionRecord) -> Result<Vec<TransactionRecord>> {
        let mut records = match self.store.get(TRANSACTIONS_KEY).await? {
            None | Some(Value::Null) => Vec::new(),
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
                log::warn!("Discarding corrupt {}: {}", TRANSACTIONS_KEY, e);
                Vec::new()
            }),
        };
        records.insert(0, record);
        records.truncate(self.cap);
        self.store
            .set(TRANSACTIONS_KEY, serde_json::to_value(&records)?)
            .await?;
        Ok(records)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.set(TRANSACTIONS_KEY, Value::Array(Vec::new())).await
    }

    pub async fn wallet_status(&self) -> Result<WalletStatus> {
        match self.store.get(WALLET_STATUS_KEY).await? {
            None | Some(Value::Null) => Ok(WalletStatus::default()),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| Error::Storage(format!("corrupt {}: {}", WALLET_STATUS_KEY, e))),
        }
    }

    pub async fn merge_wallet_status(&self, update: &WalletUpdate) -> Result<WalletStatus> {
        let mut status = self.wallet_status().await?;
        status.apply(update);
        self.store
            .set(WALLET_STATUS_KEY, serde_json::to_value(&status)?)
            .await?;
        Ok(status)
    }

    /// Fresh install: empty history, blank snapshot
    pub async fn initialize(&self) -> Result<()> {
        self.clear().await?;
        self.store
            .set(WALLET_STATUS_KEY, serde_json::to_value(WalletStatus::default())?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amount: &str, timestamp: u64) -> TransactionRecord {
        TransactionRecord {
            amount: amount.to_string(),
            currency: "USDC".to_string(),
            description: "Premium article".to_string(),
            tx_hash: None,
            network: None,
            status: TxStatus::Success,
            error: None,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_history_keeps_newest_entries_first() {
        let history = History::new(MemoryStore::new(), 10);
        for i in 0..25u64 {
            history.append(record(&i.to_string(), i)).await.unwrap();
        }
        let records = history.load().await.unwrap();
        assert_eq!(records.len(), 10);
        let timestamps: Vec<u64> = records.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, (15..25).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_history_below_cap_keeps_everything() {
        let history = History::new(MemoryStore::new(), 10);
        history.append(record("1", 1)).await.unwrap();
        history.append(record("2", 2)).await.unwrap();
        let records = history.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, "2");
    }

    #[tokio::test]
    async fn test_clear_and_initialize() {
        let history = History::new(MemoryStore::new(), 10);
        history.append(record("1", 1)).await.unwrap();
        history.clear().await.unwrap();
        assert!(history.load().await.unwrap().is_empty());

        history
            .merge_wallet_status(&WalletUpdate::Connected("0xabc".to_string()))
            .await
            .unwrap();
        history.initialize().await.unwrap();
        assert_eq!(history.wallet_status().await.unwrap(), WalletStatus::default());
    }

    #[tokio::test]
    async fn test_wallet_snapshot_merges_fields() {
        let history = History::new(MemoryStore::new(), 10);
        history
            .merge_wallet_status(&WalletUpdate::Connected("0xabc".to_string()))
            .await
            .unwrap();
        history
            .merge_wallet_status(&WalletUpdate::Balance("12.5".to_string()))
            .await
            .unwrap();
        let status = history
            .merge_wallet_status(&WalletUpdate::Network("0x14a34".to_string()))
            .await
            .unwrap();
        assert!(status.connected);
        assert_eq!(status.address.as_deref(), Some("0xabc"));
        assert_eq!(status.balance.as_deref(), Some("12.5"));

        let status = history.merge_wallet_status(&WalletUpdate::Disconnected).await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.network.as_deref(), Some("0x14a34"));
    }

    #[tokio::test]
    async fn test_corrupt_history_is_a_storage_error() {
        let store = MemoryStore::new();
        store.set(TRANSACTIONS_KEY, Value::String("oops".into())).await.unwrap();
        let history = History::new(store, 10);
        assert!(matches!(history.load().await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_append_recovers_from_corrupt_history() {
        let store = MemoryStore::new();
        store.set(TRANSACTIONS_KEY, Value::String("oops".into())).await.unwrap();
        let history = History::new(store, 10);

        let records = history.append(record("1", 1)).await.unwrap();
        assert_eq!(records.len(), 1);
        history.append(record("2", 2)).await.unwrap();
        let amounts: Vec<String> = history.load().await.unwrap().into_iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec!["2".to_string(), "1".to_string()]);
    }

    #[test]
    fn test_terminal_phases_become_records() {
        let report = PaymentReport {
            amount: "2.50".to_string(),
            currency: "USDC".to_string(),
            error: Some("boom".to_string()),
            ..Default::default()
        };
        assert_eq!(TransactionRecord::from_report(PaymentPhase::Started, &report, 1), None);
        let failed = TransactionRecord::from_report(PaymentPhase::Failed, &report, 1).unwrap();
        assert_eq!(failed.status, TxStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(serde_json::to_value(&failed).unwrap()["status"], "failed");
    }
}
