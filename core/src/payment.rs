//! ERC-20 payment execution.
//!
//! One [`PaymentAttempt`] per request, driven through
//! `idle -> started -> submitted -> confirmed | error`, or
//! `started -> rejected` when the attempt fails before a transaction
//! reaches the wallet's mempool. There are no automatic retries.

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::rc::Rc;
use url::Url;

use crate::abi::{encode_transfer, format_address, format_units, parse_address, to_base_units, to_hex_data, to_hex_quantity};
use crate::clock::Clock;
use crate::config::ExtensionConfig;
use crate::detection::DetectionRecord;
use crate::error::{Error, ProviderError, Result, WalletError};
use crate::protocol::{PaymentPhase, PaymentReport, WalletManagerEvent};
use crate::wallet::{Wallet, WalletProvider};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PaymentState {
    #[default]
    Idle,
    Started,
    Submitted { tx_hash: String },
    Confirmed { tx_hash: String, success: bool },
    Error(String),
    Rejected(String),
}

impl PaymentState {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Started => "started",
            PaymentState::Submitted { .. } => "submitted",
            PaymentState::Confirmed { .. } => "confirmed",
            PaymentState::Error(_) => "error",
            PaymentState::Rejected(_) => "rejected",
        }
    }

    pub fn can_become(&self, next: &PaymentState) -> bool {
        use PaymentState::*;
        matches!(
            (self, next),
            (Idle, Started)
                | (Started, Submitted { .. })
                | (Started, Rejected(_))
                | (Submitted { .. }, Confirmed { .. })
                | (Submitted { .. }, Error(_))
        )
    }

    /// Phase reported to the coordinator; `None` until terminal
    pub fn terminal_phase(&self) -> Option<PaymentPhase> {
        match self {
            PaymentState::Confirmed { success: true, .. } => Some(PaymentPhase::Success),
            PaymentState::Confirmed { success: false, .. } | PaymentState::Rejected(_) => {
                Some(PaymentPhase::Failed)
            }
            PaymentState::Error(_) => Some(PaymentPhase::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PaymentAttempt {
    state: PaymentState,
}

impl PaymentAttempt {
    pub fn state(&self) -> &PaymentState {
        &self.state
    }

    pub fn advance(&mut self, next: PaymentState) -> Result<()> {
        if !self.state.can_become(&next) {
            return Err(Error::Other(format!(
                "Illegal payment transition {} -> {}",
                self.state.name(),
                next.name()
            )));
        }
        log::debug!("💸 payment {} -> {}", self.state.name(), next.name());
        self.state = next;
        Ok(())
    }
}

const INSUFFICIENT_FUNDS: &[&str] = &["transfer amount exceeds balance", "insufficient funds", "exceeds balance"];
const USER_REJECTED: &[&str] = &["user rejected", "denied"];
const WRONG_NETWORK: &[&str] = &["network", "chain"];

pub fn insufficient_funds_message(config: &ExtensionConfig, amount: &str, have: Option<&str>) -> String {
    let symbol = &config.token.symbol;
    let mut message = format!("Insufficient {} balance.", symbol);
    if let Some(have) = have {
        message.push_str(&format!(" You have {} {}.", have, symbol));
    }
    message.push_str(&format!(
        " You need {} {} on {}.",
        amount, symbol, config.network.name
    ));
    if let Some(faucet) = &config.token.faucet_url {
        message.push_str(&format!(" Visit {} to get test {} tokens.", faucet, symbol));
    }
    message
}

/// Rewrite a wallet RPC failure into something the user can act on
pub fn classify_provider_error(error: &ProviderError, amount: &str, config: &ExtensionConfig) -> String {
    let text = error.message.to_lowercase();
    let mentions = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));

    if mentions(INSUFFICIENT_FUNDS) {
        insufficient_funds_message(config, amount, None)
    } else if error.code == Some(ProviderError::USER_REJECTED) || mentions(USER_REJECTED) {
        WalletError::UserRejected.to_string()
    } else if mentions(WRONG_NETWORK) {
        WalletError::WrongNetwork(config.network.name.clone()).to_string()
    } else {
        error.message.clone()
    }
}

pub fn classify_error(error: &Error, amount: &str, config: &ExtensionConfig) -> String {
    match error {
        Error::Wallet(WalletError::Rpc(e)) => classify_provider_error(e, amount, config),
        other => other.to_string(),
    }
}

/// A hex address, or the `address` query parameter of a payment URL, else
/// the configured default
pub fn resolve_recipient(target: Option<&str>, default: &str) -> Result<Address> {
    if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
        if let Ok(address) = parse_address(target) {
            return Ok(address);
        }
        match Url::parse(target) {
            Ok(url) => {
                let from_query = url
                    .query_pairs()
                    .find(|(key, _)| key == "address")
                    .and_then(|(_, value)| parse_address(&value).ok());
                if let Some(address) = from_query {
                    return Ok(address);
                }
            }
            Err(e) => log::debug!("Payment target {:?} is not a URL: {}", target, e),
        }
        log::warn!("Payment target {} names no recipient, using default", target);
    }
    parse_address(default)
}

/// Successful payment as returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub tx_hash: String,
    pub explorer_url: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub state: PaymentState,
    pub report: PaymentReport,
    pub explorer_url: Option<String>,
}

impl PaymentOutcome {
    pub fn phase(&self) -> PaymentPhase {
        self.state.terminal_phase().unwrap_or(PaymentPhase::Error)
    }

    pub fn into_result(self) -> std::result::Result<PaymentReceipt, String> {
        match self.state {
            PaymentState::Confirmed {
                tx_hash,
                success: true,
            } => Ok(PaymentReceipt {
                tx_hash,
                explorer_url: self.explorer_url,
                message: format!(
                    "Payment of {} {} completed successfully",
                    self.report.amount, self.report.currency
                ),
            }),
            _ => Err(self
                .report
                .error
                .unwrap_or_else(|| "Payment failed".to_string())),
        }
    }
}

struct Transfer {
    from: String,
    recipient: Address,
    data: Vec<u8>,
}

pub struct PaymentExecutor<P, C> {
    wallet: Rc<Wallet<P>>,
    clock: C,
}

impl<P: WalletProvider, C: Clock> PaymentExecutor<P, C> {
    pub fn new(wallet: Rc<Wallet<P>>, clock: C) -> Self {
        Self { wallet, clock }
    }

    fn config(&self) -> &ExtensionConfig {
        self.wallet.config()
    }

    /// Everything that can fail before the wallet is asked to sign
    async fn prepare(&self, detection: &DetectionRecord) -> Result<Transfer> {
        let config = self.config();
        let required = to_base_units(&detection.amount, config.token.decimals)?;
        let recipient = resolve_recipient(
            detection.payment_target.as_deref(),
            &config.payment.default_recipient,
        )?;

        let from = self
            .wallet
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(WalletError::NotConnected)?;
        self.wallet.ensure_network().await?;

        let balance = self.wallet.balance_of(&parse_address(&from)?).await?;
        if balance < required {
            let have = format_units(balance, config.token.decimals);
            return Err(WalletError::InsufficientFunds(insufficient_funds_message(
                config,
                &detection.amount,
                Some(&have),
            ))
            .into());
        }

        Ok(Transfer {
            from,
            recipient,
            data: encode_transfer(&recipient, required),
        })
    }

    async fn send(&self, transfer: &Transfer) -> Result<String> {
        let config = self.config();
        let params = json!([{
            "from": transfer.from,
            "to": config.token.contract,
            "data": to_hex_data(&transfer.data),
            "value": "0x0",
            "gas": to_hex_quantity(config.payment.gas_limit),
        }]);
        let raw = self.wallet.rpc("eth_sendTransaction", params).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// `Some(success)` once mined, `None` when polls run out
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Option<bool>> {
        let payment = &self.config().payment;
        for poll in 1..=payment.receipt_max_polls {
            let receipt = self
                .wallet
                .rpc("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                let status = receipt.get("status").and_then(Value::as_str).unwrap_or_default();
                return Ok(Some(U256::from_str_radix(status.trim_start_matches("0x"), 16)
                    .map(|s| s == U256::one())
                    .unwrap_or(false)));
            }
            if poll < payment.receipt_max_polls {
                self.clock.sleep(payment.poll_interval()).await;
            }
        }
        Ok(None)
    }

    fn settle(&self, attempt: &mut PaymentAttempt, report: &mut PaymentReport, next: PaymentState) {
        match &next {
            PaymentState::Error(reason) | PaymentState::Rejected(reason) => {
                report.error = Some(reason.clone());
            }
            PaymentState::Confirmed { success: false, .. } => {
                report.error = Some("Transaction failed".to_string());
            }
            _ => {}
        }
        if let Err(e) = attempt.advance(next) {
            log::error!("{}", e);
            return;
        }
        let event = match attempt.state().terminal_phase() {
            Some(PaymentPhase::Success) => WalletManagerEvent::PaymentSuccess(report.clone()),
            Some(PaymentPhase::Failed) => WalletManagerEvent::PaymentFailed(report.clone()),
            Some(PaymentPhase::Error) => WalletManagerEvent::PaymentError(report.clone()),
            Some(PaymentPhase::Started) | None => return,
        };
        self.wallet.emit(event);
    }

    pub async fn execute(&self, detection: &DetectionRecord) -> PaymentOutcome {
        let config = self.config();
        let mut attempt = PaymentAttempt::default();
        let mut report = PaymentReport::for_detection(detection);
        report.network = Some(config.network.name.clone());
        log::info!(
            "💸 Paying {} {} for {}",
            detection.amount,
            detection.currency,
            detection.description
        );

        self.settle(&mut attempt, &mut report, PaymentState::Started);
        let submitted = match self.prepare(detection).await {
            Ok(transfer) => {
                report.recipient = Some(format_address(&transfer.recipient));
                self.wallet
                    .emit(WalletManagerEvent::PaymentStarted(report.clone()));
                self.send(&transfer).await
            }
            Err(e) => Err(e),
        };

        match submitted {
            Ok(tx_hash) => {
                log::info!("📤 Transaction submitted: {}", tx_hash);
                report.tx_hash = Some(tx_hash.clone());
                self.settle(
                    &mut attempt,
                    &mut report,
                    PaymentState::Submitted {
                        tx_hash: tx_hash.clone(),
                    },
                );
                let next = match self.wait_for_receipt(&tx_hash).await {
                    Ok(Some(success)) => PaymentState::Confirmed { tx_hash, success },
                    Ok(None) => PaymentState::Error(format!(
                        "Transaction {} not confirmed after {} polls",
                        tx_hash, config.payment.receipt_max_polls
                    )),
                    Err(e) => PaymentState::Error(classify_error(&e, &detection.amount, config)),
                };
                self.settle(&mut attempt, &mut report, next);
            }
            Err(e) => {
                log::warn!("Payment rejected before submission: {}", e);
                let reason = classify_error(&e, &detection.amount, config);
                self.settle(&mut attempt, &mut report, PaymentState::Rejected(reason));
            }
        }

        let explorer_url = report.tx_hash.as_deref().and_then(|h| config.network.tx_url(h));
        PaymentOutcome {
            state: attempt.state().clone(),
            report,
            explorer_url,
        }
    }
}
