use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use primitive_types::U256;
use trustrefund_common::{
    api::TxOutcome,
    config::VERSION,
    crypto::{Address, TxHash},
    logger,
    ticket::IntentKind,
};
use trustrefund_wallet::{
    config::{LogConfig, NetworkConfig},
    contract::ContractClient,
    error::WalletError,
    orchestrator::{Session, Settlement, SharedOrchestrator, TransactionOrchestrator},
    provider::{ProviderGateway, WalletProvider},
    simulator::SimulatedLedger,
};

// Demo deployment: one park owner and one visitor wallet, recreated for each
// invocation of the CLI
const DEMO_OWNER: &str = "0x00000000000000000000000000000000000000aa";
const DEMO_VISITOR: &str = "0x00000000000000000000000000000000000000bb";

#[derive(Parser)]
#[clap(version = VERSION, about = "TrustRefund ticket wallet (in-memory demo ledger)")]
struct Args {
    #[clap(flatten)]
    network: NetworkConfig,
    #[clap(flatten)]
    log: LogConfig,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the connected account's ticket record and lifecycle state
    Status,
    /// Buy a ticket at the current on-chain price
    Buy,
    /// Record a visit for the connected account (signed by the park owner)
    MarkVisit {
        /// Visited Blue Moon Valley
        #[clap(long)]
        valley: bool,
        /// Used the shuttle bus
        #[clap(long)]
        shuttle: bool,
    },
    /// Request a full refund
    RefundFull,
    /// Request a partial refund
    RefundPartial,
    /// Drain the contract balance (signed by the park owner)
    EmergencyWithdraw,
    /// Walk the full buy -> visit -> refund lifecycle
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::setup_logger(args.log.log_level).context("failed to set up logger")?;

    let contract: Address = args
        .network
        .contract_address
        .parse()
        .context("invalid contract address")?;
    let owner: Address = DEMO_OWNER.parse().context("invalid owner address")?;
    let visitor: Address = DEMO_VISITOR.parse().context("invalid visitor address")?;
    let wait = Duration::from_secs(args.network.confirmation_timeout);

    // 1 ETN ticket, full price back after a valley visit, half otherwise
    let price = U256::exp10(18);
    let ledger = SimulatedLedger::new(contract, owner, price, price, price / 2u64);
    ledger.register_account(visitor, price * 10u64).await;

    let provider: Arc<dyn WalletProvider> = ledger.clone();
    let gateway = ProviderGateway::new(Some(provider));
    let account = gateway.connect().await?;
    info!("Connected to contract {} as {}", contract, account);

    let client = ContractClient::new(Arc::clone(&gateway), contract);
    let orchestrator = TransactionOrchestrator::new(Session {
        gateway: Arc::clone(&gateway),
        contract: Arc::clone(&client),
    });
    orchestrator.start().await;

    match args.command {
        Command::Status => {
            print_status(&orchestrator, &account).await?;
        }
        Command::Buy => {
            report(orchestrator.submit(IntentKind::Buy, wait).await)?;
        }
        Command::MarkVisit { valley, shuttle } => {
            // The park owner signs visit markings, not the visitor
            ledger.switch_account(Some(owner)).await;
            let handle = client.mark_visit(&account, valley, shuttle).await?;
            report_outcome(&orchestrator, handle, wait).await?;
            ledger.switch_account(Some(visitor)).await;
            print_status(&orchestrator, &account).await?;
        }
        Command::RefundFull => {
            report(orchestrator.submit(IntentKind::RefundFull, wait).await)?;
        }
        Command::RefundPartial => {
            report(orchestrator.submit(IntentKind::RefundPartial, wait).await)?;
        }
        Command::EmergencyWithdraw => {
            ledger.switch_account(Some(owner)).await;
            let handle = client.emergency_withdraw().await?;
            report_outcome(&orchestrator, handle, wait).await?;
            println!(
                "Contract balance is now {}",
                ledger.contract_balance().await
            );
        }
        Command::Demo => {
            report(orchestrator.submit(IntentKind::Buy, wait).await)?;
            print_status(&orchestrator, &account).await?;

            ledger.switch_account(Some(owner)).await;
            let handle = client.mark_visit(&account, true, true).await?;
            report_outcome(&orchestrator, handle, wait).await?;
            ledger.switch_account(Some(visitor)).await;
            print_status(&orchestrator, &account).await?;

            report(orchestrator.submit(IntentKind::RefundFull, wait).await)?;
            print_status(&orchestrator, &account).await?;
            println!("Visitor balance: {}", ledger.balance_of(&visitor).await);
        }
    }

    orchestrator.stop().await;
    Ok(())
}

async fn print_status(orchestrator: &SharedOrchestrator, account: &Address) -> Result<()> {
    let record = orchestrator.session().contract.tickets(account).await?;
    let state = orchestrator.refresh(account).await?;
    println!("Account:      {}", account);
    println!("State:        {}", state);
    println!("Amount paid:  {}", record.amount_paid);
    println!(
        "Visited:      valley={} shuttle={}",
        record.visited_blue_moon_valley, record.used_shuttle_bus
    );
    println!("Refunded:     {}", record.refunded);
    Ok(())
}

fn report(result: Result<Settlement, WalletError>) -> Result<()> {
    match result {
        Ok(settlement) => {
            println!(
                "Settled {}: state is now {}",
                settlement.handle, settlement.state
            );
            Ok(())
        }
        Err(e) => {
            // The kind stays visible so failures remain distinguishable
            error!("[{}] {}", e.kind(), e);
            Err(e.into())
        }
    }
}

async fn report_outcome(
    orchestrator: &SharedOrchestrator,
    handle: TxHash,
    wait: Duration,
) -> Result<()> {
    match orchestrator.await_confirmation(&handle, wait).await? {
        TxOutcome::Success => {
            println!("Settled {}", handle);
            Ok(())
        }
        TxOutcome::Reverted => Err(WalletError::TransactionReverted(handle).into()),
    }
}
