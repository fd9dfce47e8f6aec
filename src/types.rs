use std::fmt;

use bitcoin::{Address, Amount, Denomination, ScriptBuf, Transaction, TxOut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    #[default]
    P2pkh,
    P2wpkh,
}

impl ScriptType {
    /// `None` for any locking script this crate cannot spend.
    pub fn from_script_buf(script: &ScriptBuf) -> Option<Self> {
        if script.is_p2pkh() {
            Some(ScriptType::P2pkh)
        } else if script.is_p2wpkh() {
            Some(ScriptType::P2wpkh)
        } else {
            None
        }
    }
}

/// A spendable output as reported by the indexer, identified by `(txid, vout)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub value_sat: u64,
}

/// The custodial key a payment is spent from. Held only for one build.
#[derive(Clone)]
pub struct SourceWallet {
    wif: String,
}

impl SourceWallet {
    pub fn from_wif(wif: impl Into<String>) -> Self {
        Self {
            wif: wif.into().trim().to_string(),
        }
    }

    pub(crate) fn wif(&self) -> &str {
        &self.wif
    }
}

impl fmt::Debug for SourceWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceWallet")
            .field("wif", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub destination: String,
    /// Decimal BTC, e.g. `"0.0005"`.
    pub amount_btc: String,
}

impl PaymentRequest {
    pub fn new(destination: impl Into<String>, amount_btc: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            amount_btc: amount_btc.into(),
        }
    }

    pub fn amount_sat(&self) -> Result<u64> {
        btc_to_sat(&self.amount_btc)
    }
}

/// Converts a decimal BTC string to satoshis, flooring anything past the
/// eighth decimal place. Zero and negative amounts are rejected.
pub fn btc_to_sat(amount_btc: &str) -> Result<u64> {
    let s = amount_btc.trim();
    let invalid = |reason: &str| PaymentError::InvalidAmount(format!("{s:?}: {reason}"));

    let truncated = match s.split_once('.') {
        Some((whole, frac)) if frac.len() > 8 => {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("not a decimal number"));
            }
            format!("{whole}.{}", &frac[..8])
        }
        _ => s.to_string(),
    };

    let amount = Amount::from_str_in(&truncated, Denomination::Bitcoin)
        .map_err(|e| invalid(&e.to_string()))?;
    if amount == Amount::ZERO {
        return Err(invalid("must be at least one satoshi"));
    }
    Ok(amount.to_sat())
}

/// One selected UTXO together with the previous output it locks.
#[derive(Debug, Clone)]
pub struct PlanInput {
    pub utxo: UnspentOutput,
    pub prevout: TxOut,
    pub script_type: ScriptType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOutput {
    pub address: Address,
    pub value_sat: u64,
}

/// Inputs and outputs chosen for a payment, before any signature exists.
///
/// `fee_sat` is the effective fee: change at or below the dust threshold is
/// added to it, so the plan always balances.
#[derive(Debug, Clone)]
pub struct UnsignedPlan {
    pub source_address: Address,
    pub inputs: Vec<PlanInput>,
    pub destination: PlannedOutput,
    pub change: Option<PlannedOutput>,
    pub fee_sat: u64,
}

impl UnsignedPlan {
    pub fn input_total_sat(&self) -> u64 {
        self.inputs.iter().map(|i| i.utxo.value_sat).sum()
    }

    pub fn output_total_sat(&self) -> u64 {
        self.destination.value_sat + self.change.as_ref().map_or(0, |c| c.value_sat)
    }

    pub fn is_balanced(&self) -> bool {
        self.input_total_sat() == self.output_total_sat() + self.fee_sat
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw_hex: String,
    /// Computed locally; the network has not acknowledged it yet.
    pub txid: String,
    pub tx: Transaction,
    pub plan: UnsignedPlan,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount_btc: String,
    pub timestamp_utc: DateTime<Utc>,
    pub status: TransactionStatus,
    pub confirmations: u64,
}

impl TransactionRecord {
    pub fn pending(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount_sat: u64,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            amount_btc: Amount::from_sat(amount_sat)
                .to_string_in(Denomination::Bitcoin),
            timestamp_utc: Utc::now(),
            status: TransactionStatus::Pending,
            confirmations: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_and_fractional_amounts_convert_exactly() {
        assert_eq!(btc_to_sat("0.0005").unwrap(), 50_000);
        assert_eq!(btc_to_sat("0.00077").unwrap(), 77_000);
        assert_eq!(btc_to_sat("1").unwrap(), 100_000_000);
        assert_eq!(btc_to_sat(" 0.00000001 ").unwrap(), 1);
    }

    #[test]
    fn excess_precision_is_floored() {
        assert_eq!(btc_to_sat("0.000000019").unwrap(), 1);
        assert_eq!(btc_to_sat("0.123456789999").unwrap(), 12_345_678);
    }

    #[test]
    fn non_positive_amounts_are_invalid() {
        assert!(matches!(btc_to_sat("0"), Err(PaymentError::InvalidAmount(_))));
        assert!(matches!(
            btc_to_sat("0.000000009"),
            Err(PaymentError::InvalidAmount(_))
        ));
        assert!(matches!(btc_to_sat("-0.5"), Err(PaymentError::InvalidAmount(_))));
    }

    #[test]
    fn garbage_amounts_are_invalid() {
        assert!(btc_to_sat("").is_err());
        assert!(btc_to_sat("abc").is_err());
        assert!(btc_to_sat("0.1234567x9").is_err());
        assert!(btc_to_sat("0.12345678é").is_err());
    }

    #[test]
    fn wallet_debug_hides_key() {
        let wallet =
            SourceWallet::from_wif("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn");
        let debug = format!("{wallet:?}");
        assert!(!debug.contains("KwDiBf"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn script_type_from_script() {
        let p2pkh =
            ScriptBuf::from_hex("76a914751e76e8199196d454941c45d1b3a323f1433bd688ac").unwrap();
        assert_eq!(ScriptType::from_script_buf(&p2pkh), Some(ScriptType::P2pkh));
        let p2wpkh = ScriptBuf::from_hex("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(ScriptType::from_script_buf(&p2wpkh), Some(ScriptType::P2wpkh));
        assert_eq!(ScriptType::from_script_buf(&ScriptBuf::new()), None);
    }

    #[test]
    fn pending_record_formats_amount_in_btc() {
        let record = TransactionRecord::pending("ab", "from", "to", 50_000);
        assert_eq!(btc_to_sat(&record.amount_btc).unwrap(), 50_000);
        assert_eq!(record.status, TransactionStatus::Pending);
        assert_eq!(record.confirmations, 0);
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(TransactionStatus::Pending.to_string(), "PENDING");
    }
}
