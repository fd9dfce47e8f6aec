use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::network::BtcNetwork;
use crate::types::SourceWallet;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Send a single-recipient Bitcoin payment and track its confirmation"
)]
pub struct CliArgs {
    /// JSON config file; flags below override its values
    #[clap(short, long, global = true, value_parser)]
    pub config: Option<PathBuf>,

    /// Network to use ("mainnet", "testnet", "signet", "regtest")
    #[clap(short, long, global = true)]
    pub network: Option<String>,

    /// Fee rate in satoshis per byte
    #[clap(long, global = true)]
    pub fee_rate: Option<u64>,

    /// Esplora API base URL
    #[clap(long, global = true)]
    pub api_url: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build, sign and broadcast a payment
    Send {
        /// Destination address
        #[clap(long)]
        to: String,

        /// Amount in BTC, e.g. 0.0005
        #[clap(long)]
        amount: String,

        /// File containing the source private key (WIF)
        #[clap(long, value_parser)]
        wif_file: Option<PathBuf>,

        /// Source private key (WIF); prefer --wif-file
        #[clap(long, env = "BTC_PAYMENT_WIF", hide_env_values = true)]
        wif: Option<String>,

        /// Keep running until the payment confirms
        #[clap(long)]
        watch: bool,
    },
    /// Poll an already broadcast transaction until it confirms
    Watch {
        #[clap(long)]
        txid: String,
    },
}

pub fn resolve_config(args: &CliArgs) -> Result<PaymentConfig> {
    let mut config = match &args.config {
        Some(path) => PaymentConfig::from_file(path)?,
        None => PaymentConfig::default(),
    };
    if let Some(network) = &args.network {
        config.network = network.parse::<BtcNetwork>()?;
    }
    if let Some(rate) = args.fee_rate {
        config.fee_rate_sat_per_byte = rate;
    }
    if let Some(url) = &args.api_url {
        config.api_base_url = Some(url.clone());
    }
    config.validate()?;
    Ok(config)
}

pub fn load_wallet(wif_file: Option<&PathBuf>, wif: Option<&String>) -> Result<SourceWallet> {
    match (wif_file, wif) {
        (Some(path), _) => Ok(SourceWallet::from_wif(fs::read_to_string(path)?)),
        (None, Some(wif)) => Ok(SourceWallet::from_wif(wif.as_str())),
        (None, None) => Err(PaymentError::Config(
            "no source key: pass --wif-file or set BTC_PAYMENT_WIF".into(),
        )),
    }
}
