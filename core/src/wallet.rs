//! Wallet manager for the injected EIP-1193 provider.
//!
//! Lives in the page context next to `window.ethereum`. Keeps a
//! `{connected, address, balance, network}` snapshot current and reports
//! every change to an [`EventSink`], which the page bridge forwards to the
//! content script.

use async_trait::async_trait;
use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

use crate::abi::{decode_uint256, encode_balance_of, format_units, parse_address, to_hex_data};
use crate::clock::{poll_until, Clock};
use crate::config::{ExtensionConfig, ProviderConfig};
use crate::error::{Error, ProviderError, Result, WalletError};
use crate::history::WalletStatus;
use crate::protocol::WalletManagerEvent;

/// `window.ethereum`, or a stand-in
#[async_trait(?Send)]
pub trait WalletProvider {
    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError>;

    /// Flags the provider object exposes without a round trip
    fn info(&self) -> ProviderInfo;
}

#[async_trait(?Send)]
impl<P: WalletProvider + ?Sized> WalletProvider for Rc<P> {
    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError> {
        (**self).request(method, params).await
    }

    fn info(&self) -> ProviderInfo {
        (**self).info()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub available: bool,
    pub is_coinbase_wallet: bool,
    pub is_meta_mask: bool,
    pub chain_id: Option<String>,
    pub selected_address: Option<String>,
}

/// Answer to `CHECK_WALLET_PROVIDERS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDiagnostic {
    pub timestamp: u64,
    pub ethereum: ProviderInfo,
}

/// Answer to `GET_WALLET_STATUS`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatusReport {
    pub wallet_available: bool,
    pub wallet_connected: bool,
    pub wallet_address: Option<String>,
    pub network: Option<String>,
    pub balance: Option<String>,
}

/// Answer to `CONNECT_WALLET`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectReport {
    pub address: String,
    pub network: Option<String>,
    pub balance: Option<String>,
    pub message: String,
}

pub trait EventSink {
    fn emit(&self, event: WalletManagerEvent);
}

impl<F: Fn(WalletManagerEvent)> EventSink for F {
    fn emit(&self, event: WalletManagerEvent) {
        self(event)
    }
}

/// Provider-originated notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Disconnect,
}

pub const PROVIDER_EVENTS: [&str; 3] = ["accountsChanged", "chainChanged", "disconnect"];

impl ProviderEvent {
    pub fn parse(name: &str, payload: &Value) -> Option<Self> {
        match name {
            "accountsChanged" => {
                let accounts = payload
                    .as_array()
                    .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                Some(ProviderEvent::AccountsChanged(accounts))
            }
            "chainChanged" => payload
                .as_str()
                .map(|chain| ProviderEvent::ChainChanged(chain.to_string())),
            "disconnect" => Some(ProviderEvent::Disconnect),
            _ => None,
        }
    }
}

pub type ProviderListener = Rc<dyn Fn(ProviderEvent)>;

/// Subscription side of a provider. Adapters are chosen by
/// [`SubscriptionStyle::detect`], never by provider brand.
pub trait EventSource {
    fn subscribe(&self, listener: ProviderListener) -> std::result::Result<(), ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStyle {
    AddEventListener,
    On,
}

impl SubscriptionStyle {
    pub fn detect(has_add_event_listener: bool, has_on: bool) -> Option<Self> {
        if has_add_event_listener {
            Some(SubscriptionStyle::AddEventListener)
        } else if has_on {
            Some(SubscriptionStyle::On)
        } else {
            None
        }
    }
}

/// Bounded wait for the provider to be injected
pub async fn wait_for_provider<C, P, F>(clock: &C, config: &ProviderConfig, find: F) -> Option<P>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<P>,
{
    let found = poll_until(clock, config.wait_attempts, config.wait_interval(), find).await;
    if found.is_none() {
        log::warn!(
            "No wallet provider after {} attempts",
            config.wait_attempts
        );
    }
    found
}

pub struct Wallet<P> {
    provider: Option<P>,
    config: Rc<ExtensionConfig>,
    sink: Rc<dyn EventSink>,
    state: RefCell<WalletStatus>,
}

impl<P: WalletProvider> Wallet<P> {
    pub fn new(provider: Option<P>, config: Rc<ExtensionConfig>, sink: Rc<dyn EventSink>) -> Self {
        Self {
            provider,
            config,
            sink,
            state: RefCell::new(WalletStatus::default()),
        }
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn provider(&self) -> Result<&P> {
        self.provider.as_ref().ok_or_else(|| WalletError::NoProvider.into())
    }

    pub fn snapshot(&self) -> WalletStatus {
        self.state.borrow().clone()
    }

    pub fn address(&self) -> Option<String> {
        self.state.borrow().address.clone()
    }

    pub(crate) fn emit(&self, event: WalletManagerEvent) {
        self.sink.emit(event);
    }

    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        Ok(self.provider()?.request(method, params).await?)
    }

    pub async fn accounts(&self) -> Result<Vec<String>> {
        let raw = self.rpc("eth_accounts", json!([])).await?;
        Ok(serde_json::from_value(raw)?)
    }

    fn mark_connected(&self, address: &str) {
        {
            let mut state = self.state.borrow_mut();
            state.connected = true;
            state.address = Some(address.to_string());
        }
        self.emit(WalletManagerEvent::WalletConnected(address.to_string()));
    }

    fn mark_disconnected(&self) {
        let was_connected = {
            let mut state = self.state.borrow_mut();
            let was = state.connected;
            state.connected = false;
            state.address = None;
            state.balance = None;
            was
        };
        if was_connected {
            self.emit(WalletManagerEvent::WalletDisconnected);
        }
    }

    fn set_network(&self, chain_id: &str) {
        self.state.borrow_mut().network = Some(chain_id.to_string());
        self.emit(WalletManagerEvent::NetworkUpdated(chain_id.to_string()));
    }

    /// Silent check via `eth_accounts`; never prompts the user
    pub async fn check_connection(&self) -> Result<Option<String>> {
        let accounts = self.accounts().await?;
        let Some(address) = accounts.into_iter().next() else {
            self.mark_disconnected();
            return Ok(None);
        };
        self.mark_connected(&address);
        if let Err(e) = self.refresh_balance().await {
            log::warn!("Balance refresh failed: {}", e);
        }
        Ok(Some(address))
    }

    /// Prompt for accounts, move to the configured chain and load the balance
    pub async fn connect(&self) -> Result<ConnectReport> {
        let raw = self.rpc("eth_requestAccounts", json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(raw)?;
        let address = accounts.into_iter().next().ok_or(WalletError::NoAccounts)?;
        log::info!("💰 Wallet connected: {}", address);
        self.mark_connected(&address);

        if let Err(e) = self.ensure_network().await {
            log::warn!("Network switch after connect failed: {}", e);
        }
        let balance = match self.refresh_balance().await {
            Ok(balance) => balance.map(|b| format_units(b, self.config.token.decimals)),
            Err(e) => {
                log::warn!("Balance refresh failed: {}", e);
                None
            }
        };

        Ok(ConnectReport {
            address,
            network: self.state.borrow().network.clone(),
            balance,
            message: "Wallet connected successfully".to_string(),
        })
    }

    pub async fn check_network(&self) -> Result<String> {
        let raw = self.rpc("eth_chainId", json!([])).await?;
        let chain_id: String = serde_json::from_value(raw)?;
        self.set_network(&chain_id);
        Ok(chain_id)
    }

    fn add_chain_params(&self) -> Value {
        let network = &self.config.network;
        json!([{
            "chainId": network.chain_id_hex(),
            "chainName": network.name,
            "nativeCurrency": {
                "name": network.native_symbol,
                "symbol": network.native_symbol,
                "decimals": 18,
            },
            "rpcUrls": network.rpc_urls,
            "blockExplorerUrls": network.explorer_url.iter().collect::<Vec<_>>(),
        }])
    }

    /// Switch to the configured chain, adding it first when the wallet does
    /// not know it (4902)
    pub async fn ensure_network(&self) -> Result<()> {
        let current = self.check_network().await?;
        let network = &self.config.network;
        if network.matches(&current) {
            return Ok(());
        }

        let target = network.chain_id_hex();
        log::info!("🔀 Switching wallet from {} to {} ({})", current, network.name, target);
        let provider = self.provider()?;
        match provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": target }]))
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_unknown_chain() => {
                log::info!("➕ Adding {} to the wallet", network.name);
                provider
                    .request("wallet_addEthereumChain", self.add_chain_params())
                    .await
                    .map_err(|e| {
                        log::warn!("wallet_addEthereumChain failed: {}", e);
                        WalletError::WrongNetwork(network.name.clone())
                    })?;
            }
            Err(e) if e.code == Some(ProviderError::USER_REJECTED) => {
                return Err(WalletError::UserRejected.into());
            }
            Err(e) => {
                log::warn!("wallet_switchEthereumChain failed: {}", e);
                return Err(WalletError::WrongNetwork(network.name.clone()).into());
            }
        }
        self.set_network(&target);
        Ok(())
    }

    pub async fn balance_of(&self, owner: &Address) -> Result<U256> {
        let call = json!([
            {
                "to": self.config.token.contract,
                "data": to_hex_data(&encode_balance_of(owner)),
            },
            "latest"
        ]);
        let raw = self.rpc("eth_call", call).await?;
        let data = raw
            .as_str()
            .ok_or_else(|| Error::Malformed(format!("eth_call returned {}", raw)))?;
        decode_uint256(data)
    }

    /// Token balance of the connected account; `None` when disconnected or
    /// on another chain
    pub async fn refresh_balance(&self) -> Result<Option<U256>> {
        let Some(address) = self.address() else {
            return Ok(None);
        };
        let chain_id = self.check_network().await?;
        if !self.config.network.matches(&chain_id) {
            self.state.borrow_mut().balance = None;
            return Ok(None);
        }

        let balance = self.balance_of(&parse_address(&address)?).await?;
        let display = format_units(balance, self.config.token.decimals);
        self.state.borrow_mut().balance = Some(display.clone());
        self.emit(WalletManagerEvent::BalanceUpdated(display));
        Ok(Some(balance))
    }

    /// Fresh status read from the provider
    pub async fn status(&self) -> Result<WalletStatusReport> {
        if self.provider.is_none() {
            return Ok(WalletStatusReport::default());
        }
        let accounts = self.accounts().await?;
        let address = accounts.into_iter().next();
        let network = match &address {
            Some(_) => match self.rpc("eth_chainId", json!([])).await {
                Ok(chain) => chain.as_str().map(str::to_string),
                Err(e) => {
                    log::warn!("eth_chainId failed: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(WalletStatusReport {
            wallet_available: true,
            wallet_connected: address.is_some(),
            wallet_address: address,
            network,
            balance: self.state.borrow().balance.clone(),
        })
    }

    pub fn diagnostic(&self, now_ms: u64) -> ProviderDiagnostic {
        ProviderDiagnostic {
            timestamp: now_ms,
            ethereum: self.provider.as_ref().map(|p| p.info()).unwrap_or_default(),
        }
    }

    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        log::info!("💰 Provider event: {:?}", event);
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                Some(address) => {
                    self.mark_connected(address);
                    if let Err(e) = self.refresh_balance().await {
                        log::warn!("Balance refresh failed: {}", e);
                    }
                }
                None => self.mark_disconnected(),
            },
            ProviderEvent::ChainChanged(chain_id) => {
                self.set_network(&chain_id);
                if let Err(e) = self.refresh_balance().await {
                    log::warn!("Balance refresh failed: {}", e);
                }
            }
            ProviderEvent::Disconnect => self.mark_disconnected(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";

    /// In-memory chain + wallet answering the RPC subset the manager uses
    pub struct FakeWallet {
        pub accounts: RefCell<Vec<String>>,
        pub chain_id: RefCell<String>,
        pub known_chains: RefCell<Vec<String>>,
        pub token_balance: Cell<u64>,
        /// Replaces the encoded balance as the `eth_call` result
        pub call_result: RefCell<Option<Value>>,
        /// `None` leaves the transaction pending forever
        pub receipt_status: RefCell<Option<&'static str>>,
        pub connect_error: RefCell<Option<ProviderError>>,
        pub send_error: RefCell<Option<ProviderError>>,
        pub calls: RefCell<Vec<(String, Value)>>,
    }

    impl FakeWallet {
        /// Unlocked, on Base Sepolia, holding `balance` base units
        pub fn funded(balance: u64) -> Rc<Self> {
            Rc::new(Self {
                accounts: RefCell::new(vec![ALICE.to_string()]),
                chain_id: RefCell::new("0x14a34".to_string()),
                known_chains: RefCell::new(vec!["0x1".to_string(), "0x14a34".to_string()]),
                token_balance: Cell::new(balance),
                call_result: RefCell::new(None),
                receipt_status: RefCell::new(Some("0x1")),
                connect_error: RefCell::new(None),
                send_error: RefCell::new(None),
                calls: RefCell::new(Vec::new()),
            })
        }

        pub fn methods(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(m, _)| m.clone()).collect()
        }

        pub fn sent_transactions(&self) -> Vec<Value> {
            self.calls
                .borrow()
                .iter()
                .filter(|(m, _)| m == "eth_sendTransaction")
                .map(|(_, p)| p[0].clone())
                .collect()
        }
    }

    #[async_trait(?Send)]
    impl WalletProvider for FakeWallet {
        async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError> {
            self.calls.borrow_mut().push((method.to_string(), params.clone()));
            match method {
                "eth_accounts" => Ok(json!(*self.accounts.borrow())),
                "eth_requestAccounts" => match self.connect_error.borrow().clone() {
                    Some(e) => Err(e),
                    None => Ok(json!(*self.accounts.borrow())),
                },
                "eth_chainId" => Ok(json!(*self.chain_id.borrow())),
                "wallet_switchEthereumChain" => {
                    let target = params[0]["chainId"].as_str().unwrap_or_default().to_string();
                    if self.known_chains.borrow().contains(&target) {
                        *self.chain_id.borrow_mut() = target;
                        Ok(Value::Null)
                    } else {
                        Err(ProviderError::with_code(
                            ProviderError::UNKNOWN_CHAIN,
                            "Unrecognized chain ID",
                        ))
                    }
                }
                "wallet_addEthereumChain" => {
                    let target = params[0]["chainId"].as_str().unwrap_or_default().to_string();
                    self.known_chains.borrow_mut().push(target.clone());
                    *self.chain_id.borrow_mut() = target;
                    Ok(Value::Null)
                }
                "eth_call" => Ok(match self.call_result.borrow().clone() {
                    Some(result) => result,
                    None => json!(format!("0x{:064x}", self.token_balance.get())),
                }),
                "eth_sendTransaction" => match self.send_error.borrow().clone() {
                    Some(e) => Err(e),
                    None => Ok(json!(format!("0x{:064x}", 0xfeedu64))),
                },
                "eth_getTransactionReceipt" => Ok(match *self.receipt_status.borrow() {
                    Some(status) => json!({ "status": status }),
                    None => Value::Null,
                }),
                other => Err(ProviderError::new(format!("unsupported method {}", other))),
            }
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                available: true,
                is_coinbase_wallet: true,
                is_meta_mask: false,
                chain_id: Some(self.chain_id.borrow().clone()),
                selected_address: self.accounts.borrow().first().cloned(),
            }
        }
    }

    #[derive(Default)]
    pub struct Recorder(pub RefCell<Vec<WalletManagerEvent>>);

    impl EventSink for Recorder {
        fn emit(&self, event: WalletManagerEvent) {
            self.0.borrow_mut().push(event);
        }
    }

    pub fn config() -> Rc<ExtensionConfig> {
        Rc::new(ExtensionConfig::bundled().unwrap())
    }
}
