use clap::Parser;

use btc_payment_relay::cli::{self, CliArgs, Command};
use btc_payment_relay::{
    MonitorEvent, MonitorHandle, MonitorState, PaymentError, PaymentRequest, PaymentService,
};

async fn watch_until_done(handle: MonitorHandle) -> MonitorState {
    tokio::select! {
        state = handle.finished() => state,
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted; stopping monitor for {}", handle.txid());
            handle.cancel();
            handle.finished().await
        }
    }
}

fn report(event: MonitorEvent) {
    match event {
        MonitorEvent::Confirmed { txid, confirmations } => {
            println!("Transaction {txid} confirmed with {confirmations} confirmations");
        }
        MonitorEvent::TimedOut { txid, attempts } => {
            println!("Transaction {txid} still unconfirmed after {attempts} polls");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), PaymentError> {
    env_logger::init();

    let args = CliArgs::parse();
    let config = cli::resolve_config(&args)?;
    log::info!("network {}, Esplora at {}", config.network, config.esplora_url());

    let service = PaymentService::esplora(&config)?;

    match &args.command {
        Command::Send { to, amount, wif_file, wif, watch } => {
            let wallet = cli::load_wallet(wif_file.as_ref(), wif.as_ref())?;
            let request = PaymentRequest::new(to.as_str(), amount.as_str());

            let record = service.send(&wallet, &request).await.inspect_err(|e| {
                log::error!("transaction failed: {e}");
            })?;
            println!("Transaction broadcast successful. TXID: {}", record.id);
            match serde_json::to_string_pretty(&record) {
                Ok(json) => println!("{json}"),
                Err(e) => log::warn!("could not render record: {e}"),
            }

            if *watch {
                let handle = service.monitor(&record.id, report);
                let state = watch_until_done(handle).await;
                log::info!("monitor finished: {:?}", state);
            }
        }
        Command::Watch { txid } => {
            let handle = service.monitor(txid, report);
            let state = watch_until_done(handle).await;
            log::info!("monitor finished: {:?}", state);
        }
    }

    Ok(())
}
