use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{CommandClient, StatusUpdate};
use shared::domain::{command_label, AccountId, ContractAddress};

mod loopback;

use loopback::{LoopbackEngine, LoopbackLedger, LoopbackWallet};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "0xC0FFEE0000000000000000000000000000000000")]
    contract_address: String,
    #[arg(long, default_value = "0xABC1234567890")]
    account: String,
    /// Command values to submit, each in 1..=7.
    #[arg(long, value_delimiter = ',', default_values_t = vec![1u8, 3, 7])]
    values: Vec<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let account = AccountId::new(args.account);
    let client = CommandClient::new_with_collaborators(
        ContractAddress::new(args.contract_address),
        Arc::new(LoopbackWallet::new(account.clone())),
        Arc::new(LoopbackEngine::new()),
        Arc::new(LoopbackLedger::new(account)),
    );

    let mut updates = client.subscribe_status();
    let status_printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if let StatusUpdate::Shown { status, message } = update {
                println!("  [{status:?}] {message}");
            }
        }
    });

    let state = client.sync_readiness().await?;
    println!("readiness gate: {state}");

    client.check_availability().await?;

    let mut submitted = Vec::new();
    for value in &args.values {
        let command = client.submit_command(*value).await?;
        println!("submitted {} (ciphertext on ledger)", command.id);
        submitted.push(command.id);
    }

    for id in &submitted {
        match client.disclose_command(id).await? {
            Some(value) => println!(
                "{id} -> {value} ({})",
                command_label(value).unwrap_or("Unknown command")
            ),
            None => println!("{id} -> verified by another caller; value follows on refresh"),
        }
    }

    client.reload().await?;
    let stats = client.stats().await;
    println!(
        "commands: {} total, {} verified, {} active users",
        stats.total, stats.verified, stats.active_users
    );

    status_printer.abort();
    Ok(())
}
