use std::str::FromStr;
use std::sync::Arc;

use bitcoin::{
    absolute::LockTime,
    address::NetworkUnchecked,
    hashes::Hash,
    script::{Instruction, PushBytesBuf},
    secp256k1::{All, Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, CompressedPublicKey, OutPoint, PrivateKey, PublicKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::{
    config::PaymentConfig,
    error::{PaymentError, Result},
    fee::FeeEstimator,
    network::BtcNetwork,
    remote::UtxoSource,
    types::{
        PaymentRequest, PlanInput, PlannedOutput, ScriptType, SignedTransaction, SourceWallet,
        UnsignedPlan, UnspentOutput,
    },
};

/// Destination plus provisional change.
const PLANNED_OUTPUTS: usize = 2;

/// The decoded source key and the single address all its UTXOs are locked to.
#[derive(Debug, Clone)]
pub struct SourceKey {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
    pub address: Address,
    pub script_type: ScriptType,
}

impl SourceKey {
    pub fn from_wallet(
        wallet: &SourceWallet,
        network: BtcNetwork,
        kind: ScriptType,
        secp: &Secp256k1<All>,
    ) -> Result<Self> {
        let private_key = PrivateKey::from_wif(wallet.wif())?;
        if private_key.network != network.kind() {
            return Err(PaymentError::NetworkMismatch {
                configured: network.to_string(),
                found: format!("{:?}", private_key.network),
            });
        }
        let public_key = private_key.public_key(secp);

        let address = match kind {
            ScriptType::P2pkh => {
                Address::p2pkh(public_key.pubkey_hash(), network.to_bitcoin_network())
            }
            ScriptType::P2wpkh => {
                if !public_key.compressed {
                    return Err(PaymentError::Config(
                        "P2WPKH source addresses require a compressed key".into(),
                    ));
                }
                let compressed = CompressedPublicKey(public_key.inner);
                Address::p2wpkh(&compressed, network.to_bitcoin_network())
            }
        };

        Ok(Self {
            private_key,
            public_key,
            address,
            script_type: kind,
        })
    }
}

pub fn parse_destination(destination: &str, network: BtcNetwork) -> Result<Address> {
    let unchecked = destination
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| PaymentError::InvalidAddress {
            address: destination.to_string(),
            reason: e.to_string(),
        })?;
    if !unchecked.is_valid_for_network(network.to_bitcoin_network()) {
        return Err(PaymentError::NetworkMismatch {
            configured: network.to_string(),
            found: format!("address {destination}"),
        });
    }
    Ok(unchecked.assume_checked())
}

#[derive(Debug, Clone)]
pub struct UtxoSelection {
    pub selected: Vec<UnspentOutput>,
    pub total_sat: u64,
    /// Fee for the selected inputs and two outputs.
    pub fee_sat: u64,
}

/// Accumulates UTXOs in the order given until they cover the amount plus the
/// fee for the inputs taken so far.
pub fn select_utxos(
    utxos: &[UnspentOutput],
    amount_sat: u64,
    fees: &FeeEstimator,
) -> Result<UtxoSelection> {
    let mut selected = Vec::new();
    let mut total_sat: u64 = 0;
    let mut fee_sat = fees.estimate_fee(0, PLANNED_OUTPUTS);

    for utxo in utxos {
        if utxo.value_sat > Amount::MAX_MONEY.to_sat() {
            return Err(PaymentError::InvalidUtxo {
                txid: utxo.txid.clone(),
                vout: utxo.vout,
                reason: format!("value of {} sats exceeds the money supply", utxo.value_sat),
            });
        }
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.value_sat);
        fee_sat = fees.estimate_fee(selected.len(), PLANNED_OUTPUTS);

        if total_sat >= amount_sat.saturating_add(fee_sat) {
            log::debug!(
                "selected {} of {} UTXOs: {} sats covers {} + fee {}",
                selected.len(),
                utxos.len(),
                total_sat,
                amount_sat,
                fee_sat
            );
            return Ok(UtxoSelection {
                selected,
                total_sat,
                fee_sat,
            });
        }
    }

    Err(PaymentError::InsufficientFunds {
        available: total_sat,
        required: amount_sat.saturating_add(fee_sat),
        fee: fee_sat,
    })
}

/// Turns a selection into inputs and outputs. Change at or below
/// `dust_threshold_sat` is left to the miner.
pub fn plan_payment(
    utxos: &[UnspentOutput],
    amount_sat: u64,
    destination: Address,
    source: &SourceKey,
    fees: &FeeEstimator,
    dust_threshold_sat: u64,
) -> Result<UnsignedPlan> {
    let selection = select_utxos(utxos, amount_sat, fees)?;
    let change_sat = selection
        .total_sat
        .saturating_sub(amount_sat)
        .saturating_sub(selection.fee_sat);

    let source_script = source.address.script_pubkey();
    let inputs = selection
        .selected
        .into_iter()
        .map(|utxo| PlanInput {
            prevout: TxOut {
                value: Amount::from_sat(utxo.value_sat),
                script_pubkey: source_script.clone(),
            },
            utxo,
            script_type: source.script_type,
        })
        .collect();

    let (change, fee_sat) = if change_sat > dust_threshold_sat {
        log::debug!("change {} sats back to {}", change_sat, source.address);
        let change = PlannedOutput {
            address: source.address.clone(),
            value_sat: change_sat,
        };
        (Some(change), selection.fee_sat)
    } else {
        if change_sat > 0 {
            log::warn!(
                "change of {} sats is at or below the dust threshold ({} sats) and goes to fee",
                change_sat,
                dust_threshold_sat
            );
        }
        (None, selection.fee_sat + change_sat)
    };

    let plan = UnsignedPlan {
        source_address: source.address.clone(),
        inputs,
        destination: PlannedOutput {
            address: destination,
            value_sat: amount_sat,
        },
        change,
        fee_sat,
    };
    debug_assert!(plan.is_balanced());
    Ok(plan)
}

fn unsigned_transaction(plan: &UnsignedPlan) -> Result<Transaction> {
    let input = plan
        .inputs
        .iter()
        .map(|pi| {
            let txid = Txid::from_str(&pi.utxo.txid).map_err(|e| PaymentError::InvalidUtxo {
                txid: pi.utxo.txid.clone(),
                vout: pi.utxo.vout,
                reason: e.to_string(),
            })?;
            Ok(TxIn {
                previous_output: OutPoint::new(txid, pi.utxo.vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut output = vec![TxOut {
        value: Amount::from_sat(plan.destination.value_sat),
        script_pubkey: plan.destination.address.script_pubkey(),
    }];
    if let Some(change) = &plan.change {
        output.push(TxOut {
            value: Amount::from_sat(change.value_sat),
            script_pubkey: change.address.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

fn input_sighash(
    cache: &mut SighashCache<&Transaction>,
    input_index: usize,
    input: &PlanInput,
) -> Result<Message> {
    let signing_error = |reason: String| PaymentError::SigningError {
        input_index,
        reason,
    };
    let script = &input.prevout.script_pubkey;
    if ScriptType::from_script_buf(script) != Some(input.script_type) {
        return Err(signing_error(format!(
            "spent output is not a {:?} script",
            input.script_type
        )));
    }

    let digest = match input.script_type {
        ScriptType::P2pkh => cache
            .legacy_signature_hash(input_index, script, EcdsaSighashType::All.to_u32())
            .map_err(|e| signing_error(e.to_string()))?
            .to_byte_array(),
        ScriptType::P2wpkh => cache
            .p2wpkh_signature_hash(
                input_index,
                script,
                input.prevout.value,
                EcdsaSighashType::All,
            )
            .map_err(|e| signing_error(e.to_string()))?
            .to_byte_array(),
    };
    Ok(Message::from_digest(digest))
}

/// Signs every input of `plan` with `source`, then finalizes and verifies.
pub fn sign_plan(
    plan: UnsignedPlan,
    source: &SourceKey,
    secp: &Secp256k1<All>,
) -> Result<SignedTransaction> {
    let mut transaction = unsigned_transaction(&plan)?;

    // Sighashes are taken over the unsigned transaction; scriptSigs and
    // witnesses are not committed to.
    let messages = {
        let mut cache = SighashCache::new(&transaction);
        plan.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| input_sighash(&mut cache, i, input))
            .collect::<Result<Vec<_>>>()?
    };

    log::info!("signing {} inputs", messages.len());
    for ((input_index, input), message) in plan.inputs.iter().enumerate().zip(&messages) {
        let ecdsa = secp.sign_ecdsa(message, &source.private_key.inner);
        let signature = bitcoin::ecdsa::Signature::sighash_all(ecdsa);

        match input.script_type {
            ScriptType::P2pkh => {
                let push = PushBytesBuf::try_from(signature.to_vec()).map_err(|_| {
                    PaymentError::SigningError {
                        input_index,
                        reason: "signature does not fit a script push".into(),
                    }
                })?;
                transaction.input[input_index].script_sig = bitcoin::script::Builder::new()
                    .push_slice(push)
                    .push_key(&source.public_key)
                    .into_script();
            }
            ScriptType::P2wpkh => {
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(source.public_key.to_bytes());
                transaction.input[input_index].witness = witness;
            }
        }
        log::debug!("signed input {} ({:?})", input_index, input.script_type);
    }

    finalize(transaction, plan, secp)
}

/// Checks each input's signature against a sighash recomputed from the
/// finished transaction, then serializes it.
fn finalize(
    transaction: Transaction,
    plan: UnsignedPlan,
    secp: &Secp256k1<All>,
) -> Result<SignedTransaction> {
    {
        let mut cache = SighashCache::new(&transaction);
        for (input_index, input) in plan.inputs.iter().enumerate() {
            let txin = &transaction.input[input_index];
            verify_input(txin, &mut cache, input_index, input, secp)?;
        }
    }

    let raw_hex = hex::encode(bitcoin::consensus::serialize(&transaction));
    let txid = transaction.compute_txid().to_string();
    log::info!(
        "finalized {} ({} inputs, {} outputs, fee {} sats)",
        txid,
        transaction.input.len(),
        transaction.output.len(),
        plan.fee_sat
    );
    Ok(SignedTransaction {
        raw_hex,
        txid,
        tx: transaction,
        plan,
    })
}

fn verify_input(
    txin: &TxIn,
    cache: &mut SighashCache<&Transaction>,
    input_index: usize,
    input: &PlanInput,
    secp: &Secp256k1<All>,
) -> Result<()> {
    let fail = |reason: &str| PaymentError::SigningError {
        input_index,
        reason: reason.to_string(),
    };

    let (sig_bytes, key_bytes): (Vec<u8>, Vec<u8>) = match input.script_type {
        ScriptType::P2pkh => {
            let pushes = txin
                .script_sig
                .instructions()
                .map(|ins| match ins {
                    Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
                    _ => Err(fail("scriptSig is not push-only")),
                })
                .collect::<Result<Vec<_>>>()?;
            match <[Vec<u8>; 2]>::try_from(pushes) {
                Ok([sig, key]) => (sig, key),
                Err(_) => return Err(fail("scriptSig must hold a signature and a public key")),
            }
        }
        ScriptType::P2wpkh => {
            let witness = &txin.witness;
            match (witness.len(), witness.nth(0), witness.nth(1)) {
                (2, Some(sig), Some(key)) => (sig.to_vec(), key.to_vec()),
                _ => return Err(fail("witness must hold a signature and a public key")),
            }
        }
    };

    let signature =
        bitcoin::ecdsa::Signature::from_slice(&sig_bytes).map_err(|e| fail(&e.to_string()))?;
    if signature.sighash_type != EcdsaSighashType::All {
        return Err(fail("unexpected sighash type"));
    }
    let public_key = PublicKey::from_slice(&key_bytes).map_err(|e| fail(&e.to_string()))?;

    let expected_script = match input.script_type {
        ScriptType::P2pkh => ScriptBuf::new_p2pkh(&public_key.pubkey_hash()),
        ScriptType::P2wpkh => {
            if !public_key.compressed {
                return Err(fail("witness public key must be compressed"));
            }
            ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key.inner).wpubkey_hash())
        }
    };
    if expected_script != input.prevout.script_pubkey {
        return Err(fail("public key does not match the spent output"));
    }

    let message = input_sighash(cache, input_index, input)?;
    secp.verify_ecdsa(&message, &signature.signature, &public_key.inner)
        .map_err(|e| fail(&e.to_string()))
}

/// Builds and signs single-recipient payments from the UTXOs of a source
/// wallet.
pub struct TransactionBuilder {
    utxo_source: Arc<dyn UtxoSource>,
    network: BtcNetwork,
    address_kind: ScriptType,
    fees: FeeEstimator,
    dust_threshold_sat: u64,
    secp: Secp256k1<All>,
}

impl TransactionBuilder {
    pub fn new(config: &PaymentConfig, utxo_source: Arc<dyn UtxoSource>) -> Self {
        Self {
            utxo_source,
            network: config.network,
            address_kind: config.address_kind,
            fees: FeeEstimator::new(config.fee_rate_sat_per_byte),
            dust_threshold_sat: config.dust_threshold_sat,
            secp: Secp256k1::new(),
        }
    }

    pub fn source_key(&self, wallet: &SourceWallet) -> Result<SourceKey> {
        SourceKey::from_wallet(wallet, self.network, self.address_kind, &self.secp)
    }

    pub async fn build(
        &self,
        wallet: &SourceWallet,
        request: &PaymentRequest,
    ) -> Result<SignedTransaction> {
        let source = self.source_key(wallet)?;
        self.build_from(&source, request).await
    }

    pub async fn build_from(
        &self,
        source: &SourceKey,
        request: &PaymentRequest,
    ) -> Result<SignedTransaction> {
        let amount_sat = request.amount_sat()?;
        let destination = parse_destination(&request.destination, self.network)?;
        log::info!(
            "building payment of {} sats from {} to {}",
            amount_sat,
            source.address,
            destination
        );

        let address = source.address.to_string();
        let utxos = self.utxo_source.fetch_unspent(&address).await?;
        if utxos.is_empty() {
            return Err(PaymentError::EmptyUtxoSet { address });
        }

        let plan = plan_payment(
            &utxos,
            amount_sat,
            destination,
            source,
            &self.fees,
            self.dust_threshold_sat,
        )?;
        sign_plan(plan, source, &self.secp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAINNET_WIF: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
    const MAINNET_P2PKH: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
    const MAINNET_P2WPKH: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const TESTNET_WIF: &str = "cMahea7zqjxrtgAbB7LSGbcQUr1uX1ojuat9jZodMN87JcbXMTcA";
    const DESTINATION: &str = "1cMh228HTCiwS8ZsaakH8A8wze1JR5ZsP";

    fn utxo(byte: char, vout: u32, value_sat: u64) -> UnspentOutput {
        UnspentOutput {
            txid: byte.to_string().repeat(64),
            vout,
            value_sat,
        }
    }

    fn source(kind: ScriptType) -> SourceKey {
        let secp = Secp256k1::new();
        let wallet = SourceWallet::from_wif(MAINNET_WIF);
        SourceKey::from_wallet(&wallet, BtcNetwork::Mainnet, kind, &secp).unwrap()
    }

    fn destination() -> Address {
        parse_destination(DESTINATION, BtcNetwork::Mainnet).unwrap()
    }

    /// Default fee rate and dust threshold.
    fn default_plan(utxos: &[UnspentOutput], amount_sat: u64, src: &SourceKey) -> UnsignedPlan {
        plan_payment(utxos, amount_sat, destination(), src, &FeeEstimator::default(), 546).unwrap()
    }

    #[test]
    fn derives_p2pkh_source_address() {
        assert_eq!(source(ScriptType::P2pkh).address.to_string(), MAINNET_P2PKH);
    }

    #[test]
    fn derives_p2wpkh_source_address() {
        assert_eq!(source(ScriptType::P2wpkh).address.to_string(), MAINNET_P2WPKH);
    }

    #[test]
    fn testnet_key_on_mainnet_is_a_mismatch() {
        let secp = Secp256k1::new();
        let result = SourceKey::from_wallet(
            &SourceWallet::from_wif(TESTNET_WIF),
            BtcNetwork::Mainnet,
            ScriptType::P2pkh,
            &secp,
        );
        assert!(matches!(result, Err(PaymentError::NetworkMismatch { .. })));
    }

    #[test]
    fn garbage_wif_is_invalid_key() {
        let secp = Secp256k1::new();
        let result = SourceKey::from_wallet(
            &SourceWallet::from_wif("5notakey"),
            BtcNetwork::Mainnet,
            ScriptType::P2pkh,
            &secp,
        );
        assert!(matches!(result, Err(PaymentError::InvalidKey(_))));
    }

    #[test]
    fn destination_must_match_network() {
        assert!(matches!(
            parse_destination(DESTINATION, BtcNetwork::Testnet),
            Err(PaymentError::NetworkMismatch { .. })
        ));
        assert!(matches!(
            parse_destination("not-an-address", BtcNetwork::Mainnet),
            Err(PaymentError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn selection_stops_once_fee_is_covered() {
        let fees = FeeEstimator::default();
        let utxos = vec![utxo('a', 0, 100_000), utxo('b', 0, 100_000)];
        let selection = select_utxos(&utxos, 50_000, &fees).unwrap();
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.fee_sat, 22_600);
    }

    #[test]
    fn selection_pulls_more_inputs_when_fee_pushes_requirement_up() {
        let fees = FeeEstimator::default();
        // 60k alone covers the 50k amount but not 50k + 22.6k fee.
        let utxos = vec![
            utxo('a', 0, 60_000),
            utxo('b', 1, 40_000),
            utxo('c', 2, 40_000),
        ];
        let selection = select_utxos(&utxos, 50_000, &fees).unwrap();
        assert_eq!(selection.selected.len(), 2);
        assert_eq!(selection.total_sat, 100_000);
        assert_eq!(selection.fee_sat, 37_400);
    }

    #[test]
    fn selection_keeps_source_order() {
        let fees = FeeEstimator::new(1);
        let utxos = vec![utxo('a', 0, 1_000), utxo('b', 0, 500_000)];
        let selection = select_utxos(&utxos, 1_200, &fees).unwrap();
        assert_eq!(selection.selected[0].txid, "a".repeat(64));
        assert_eq!(selection.selected.len(), 2);
    }

    #[test]
    fn exhausted_utxos_report_shortfall() {
        let fees = FeeEstimator::default();
        let utxos = vec![utxo('a', 0, 30_000), utxo('b', 0, 30_000)];
        match select_utxos(&utxos, 50_000, &fees) {
            Err(PaymentError::InsufficientFunds {
                available,
                required,
                fee,
            }) => {
                assert_eq!(available, 60_000);
                assert_eq!(fee, 37_400);
                assert_eq!(required, 87_400);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn plan_with_change_balances() {
        let src = source(ScriptType::P2pkh);
        let plan = default_plan(&[utxo('a', 0, 100_000)], 50_000, &src);
        assert!(plan.is_balanced());
        assert_eq!(plan.destination.value_sat, 50_000);
        let change = plan.change.as_ref().unwrap();
        assert_eq!(change.value_sat, 27_400);
        assert_eq!(change.address.to_string(), MAINNET_P2PKH);
        assert_eq!(plan.fee_sat, 22_600);
    }

    #[test]
    fn dust_change_is_forfeited_to_fee() {
        let src = source(ScriptType::P2pkh);
        let plan = default_plan(&[utxo('a', 0, 100_000)], 77_000, &src);
        assert!(plan.change.is_none());
        assert_eq!(plan.fee_sat, 23_000);
        assert!(plan.is_balanced());
    }

    #[test]
    fn dust_boundary_is_exclusive() {
        let src = source(ScriptType::P2pkh);
        // change = 100_000 - amount - 22_600
        let at_threshold = default_plan(&[utxo('a', 0, 100_000)], 76_854, &src);
        assert!(at_threshold.change.is_none());
        let above = default_plan(&[utxo('a', 0, 100_000)], 76_853, &src);
        assert_eq!(above.change.unwrap().value_sat, 547);
    }

    #[test]
    fn signed_p2pkh_transaction_has_script_sigs() {
        let secp = Secp256k1::new();
        let src = source(ScriptType::P2pkh);
        let utxos = vec![utxo('a', 0, 60_000), utxo('b', 3, 60_000)];
        let signed = sign_plan(default_plan(&utxos, 50_000, &src), &src, &secp).unwrap();

        assert_eq!(signed.tx.input.len(), 2);
        assert_eq!(signed.tx.input[1].previous_output.vout, 3);
        for input in &signed.tx.input {
            assert!(!input.script_sig.is_empty());
            assert!(input.witness.is_empty());
        }
        assert_eq!(signed.tx.output[0].value.to_sat(), 50_000);
        assert_eq!(signed.txid, signed.tx.compute_txid().to_string());

        let raw = hex::decode(&signed.raw_hex).unwrap();
        let decoded: Transaction = bitcoin::consensus::deserialize(&raw).unwrap();
        assert_eq!(decoded, signed.tx);
    }

    #[test]
    fn signed_p2wpkh_transaction_has_witnesses() {
        let secp = Secp256k1::new();
        let src = source(ScriptType::P2wpkh);
        let fees = FeeEstimator::new(10);
        let plan = plan_payment(&[utxo('c', 1, 100_000)], 50_000, destination(), &src, &fees, 546)
            .unwrap();
        let signed = sign_plan(plan, &src, &secp).unwrap();

        let input = &signed.tx.input[0];
        assert!(input.script_sig.is_empty());
        assert_eq!(input.witness.len(), 2);
        assert_eq!(input.witness.nth(1).unwrap(), src.public_key.to_bytes().as_slice());
    }

    #[test]
    fn signing_is_deterministic() {
        let secp = Secp256k1::new();
        let src = source(ScriptType::P2pkh);
        let plan = default_plan(&[utxo('a', 0, 100_000)], 50_000, &src);
        let first = sign_plan(plan.clone(), &src, &secp).unwrap();
        let second = sign_plan(plan, &src, &secp).unwrap();
        assert_eq!(first.raw_hex, second.raw_hex);
    }

    #[test]
    fn signing_with_foreign_key_fails_verification() {
        let secp = Secp256k1::new();
        let owner = source(ScriptType::P2pkh);
        let plan = default_plan(&[utxo('a', 0, 100_000)], 50_000, &owner);

        let other_wif = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU74NMTptX4";
        let intruder = SourceKey::from_wallet(
            &SourceWallet::from_wif(other_wif),
            BtcNetwork::Mainnet,
            ScriptType::P2pkh,
            &secp,
        )
        .unwrap();

        match sign_plan(plan, &intruder, &secp) {
            Err(PaymentError::SigningError { input_index, .. }) => assert_eq!(input_index, 0),
            other => panic!("expected SigningError, got {other:?}"),
        }
    }

    #[test]
    fn malformed_utxo_txid_is_rejected() {
        let secp = Secp256k1::new();
        let src = source(ScriptType::P2pkh);
        let bad = UnspentOutput {
            txid: "zz".into(),
            vout: 0,
            value_sat: 100_000,
        };
        let plan = default_plan(&[bad], 50_000, &src);
        assert!(matches!(
            sign_plan(plan, &src, &secp),
            Err(PaymentError::InvalidUtxo { .. })
        ));
    }

    #[test]
    fn script_type_must_match_the_spent_output() {
        let secp = Secp256k1::new();
        let src = source(ScriptType::P2pkh);
        let mut plan = default_plan(&[utxo('a', 0, 100_000)], 50_000, &src);
        plan.inputs[0].script_type = ScriptType::P2wpkh;

        match sign_plan(plan, &src, &secp) {
            Err(PaymentError::SigningError { input_index, reason }) => {
                assert_eq!(input_index, 0);
                assert!(reason.contains("P2wpkh"));
            }
            other => panic!("expected SigningError, got {other:?}"),
        }
    }

    #[test]
    fn utxo_above_max_money_is_rejected() {
        let fees = FeeEstimator::default();
        let utxos = vec![utxo('a', 0, 1_000), utxo('b', 7, u64::MAX)];
        match select_utxos(&utxos, 50_000, &fees) {
            Err(PaymentError::InvalidUtxo { vout, .. }) => assert_eq!(vout, 7),
            other => panic!("expected InvalidUtxo, got {other:?}"),
        }
    }

    struct FixedUtxos(Vec<UnspentOutput>);

    #[async_trait::async_trait]
    impl UtxoSource for FixedUtxos {
        async fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
            assert_eq!(address, MAINNET_P2PKH);
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn builder_signs_from_fetched_utxos() {
        let source = Arc::new(FixedUtxos(vec![utxo('a', 2, 100_000)]));
        let builder = TransactionBuilder::new(&PaymentConfig::default(), source);
        let wallet = SourceWallet::from_wif(MAINNET_WIF);

        let signed = builder
            .build(&wallet, &PaymentRequest::new(DESTINATION, "0.0005"))
            .await
            .unwrap();
        assert_eq!(signed.plan.fee_sat, 22_600);
        assert_eq!(signed.tx.input[0].previous_output.vout, 2);
        assert_eq!(signed.tx.output.len(), 2);
    }

    #[tokio::test]
    async fn builder_reports_empty_utxo_set() {
        let builder =
            TransactionBuilder::new(&PaymentConfig::default(), Arc::new(FixedUtxos(vec![])));
        let wallet = SourceWallet::from_wif(MAINNET_WIF);

        let err = builder
            .build(&wallet, &PaymentRequest::new(DESTINATION, "0.0005"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::EmptyUtxoSet { .. }));
    }
}
