//! Administrative command line for the stelo ledger.
//!
//! Runs migrations, registers ledgers and wallets, posts transactions between
//! addresses, settles pending transactions and prints balances.

mod config;
mod logging;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Error, bail};
use log::info;
use pico_args::Arguments;
use serde_json::json;
use stelo_ledger::{
    LedgerManager,
    accounts::{CollateralRatio, CreateWalletInput, LedgerClass, Location, NewLedger, RoleCode},
    db::{Database, PgBackend},
    notify::NoopNotifier,
    transactions::{TxAsset, TxByAddressesInput, TxStatus},
};

use crate::config::AdminConfig;

const HELP: &str = "\
Administer a stelo ledger database

USAGE:
  stelo_admin [OPTIONS] <COMMAND> [ARGS]

COMMANDS:
  migrate                                  Apply pending schema migrations
  create-ledger  --name N --class C        Register a ledger (class: digital | item)
                 [--scale S] [--value V]
  create-wallet  --user U --role R         Create a wallet (role: dal | general | personal | warehouse)
                 [--address A] [--ratio X.XXX] [--x X --y Y]
  send           --from A --to B           Move an asset between two addresses
                 --ledger NAME --amount N
                 [--pending] [--memo M]
  finalize       --tx ID (--approve | --void)
                                           Settle a pending transaction
  balances       --address A               Print every account of a wallet

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  BASE_LEDGER_NAME         Currency ledger holding collateral [default: stelo]
  RUST_LOG                 Log filter [default: info,sqlx=warn]
  (A .env file in the working directory is loaded first)
";

#[derive(Debug)]
enum Command {
    Migrate,
    CreateLedger(NewLedger),
    CreateWallet(CreateWalletInput),
    Send {
        ledger: String,
        amount: i64,
        input: TxByAddressesInput,
    },
    Finalize {
        transaction_id: i64,
        target: TxStatus,
    },
    Balances {
        address: String,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Migrate => "migrate",
            Command::CreateLedger(_) => "create-ledger",
            Command::CreateWallet(_) => "create-wallet",
            Command::Send { .. } => "send",
            Command::Finalize { .. } => "finalize",
            Command::Balances { .. } => "balances",
        }
    }
}

fn parse_role(s: &str) -> Result<RoleCode, String> {
    RoleCode::from_name(s).ok_or_else(|| format!("unknown role {s:?}"))
}

fn parse_command(pargs: &mut Arguments) -> Result<Command, Error> {
    let Some(name) = pargs.subcommand()? else {
        bail!("missing command, see --help");
    };

    let command = match name.as_str() {
        "migrate" => Command::Migrate,
        "create-ledger" => Command::CreateLedger(NewLedger {
            name: pargs.value_from_str("--name")?,
            scale: pargs.opt_value_from_str("--scale")?.unwrap_or(0),
            class: pargs.value_from_str::<_, LedgerClass>("--class")?,
            value: pargs.opt_value_from_str("--value")?.unwrap_or(0),
        }),
        "create-wallet" => {
            let user_id: i64 = pargs.value_from_str("--user")?;
            let role = pargs.value_from_fn("--role", parse_role)?;
            let mut input = CreateWalletInput::new(user_id, role);
            input.address = pargs.opt_value_from_str("--address")?;
            if let Some(ratio) = pargs.opt_value_from_str::<_, CollateralRatio>("--ratio")? {
                input.collateral_ratio = ratio;
            }
            let x: Option<f64> = pargs.opt_value_from_str("--x")?;
            let y: Option<f64> = pargs.opt_value_from_str("--y")?;
            input.location = match (x, y) {
                (Some(x), Some(y)) => Some(Location { x, y }),
                (None, None) => None,
                _ => bail!("--x and --y must be given together"),
            };
            Command::CreateWallet(input)
        }
        "send" => {
            let sending_address = pargs.value_from_str("--from")?;
            let receiving_address = pargs.value_from_str("--to")?;
            let ledger = pargs.value_from_str("--ledger")?;
            let amount = pargs.value_from_str("--amount")?;
            let is_pending = pargs.contains("--pending");
            let memo = pargs.opt_value_from_str("--memo")?;
            Command::Send {
                ledger,
                amount,
                input: TxByAddressesInput {
                    sending_address,
                    receiving_address,
                    memo,
                    is_pending,
                    // filled in once the ledger is resolved
                    assets: Vec::new(),
                },
            }
        }
        "finalize" => {
            let transaction_id = pargs.value_from_str("--tx")?;
            let target = match (pargs.contains("--approve"), pargs.contains("--void")) {
                (true, false) => TxStatus::PostPending,
                (false, true) => TxStatus::VoidPending,
                _ => bail!("finalize needs exactly one of --approve or --void"),
            };
            Command::Finalize {
                transaction_id,
                target,
            }
        }
        "balances" => Command::Balances {
            address: pargs.value_from_str("--address")?,
        },
        other => bail!("unknown command {other:?}, see --help"),
    };
    Ok(command)
}

async fn run(
    db: &Database,
    manager: &LedgerManager<PgBackend>,
    command: Command,
) -> Result<serde_json::Value, Error> {
    let output = match command {
        Command::Migrate => {
            db.migrate().await.context("Migrations failed")?;
            json!({ "migrated": true })
        }
        Command::CreateLedger(ledger) => json!(manager.create_ledger(&ledger).await?),
        Command::CreateWallet(input) => json!(manager.create_wallet(&input).await?),
        Command::Send {
            ledger,
            amount,
            mut input,
        } => {
            let ledger = manager.get_ledger_by_name(&ledger).await?;
            input.assets.push(TxAsset {
                ledger_id: ledger.id,
                amount,
            });
            let id = manager.create_transaction_by_addresses(&input).await?;
            json!(manager.get_transaction(id).await?)
        }
        Command::Finalize {
            transaction_id,
            target,
        } => {
            manager.finalize_transaction(transaction_id, target).await?;
            json!(manager.get_transaction(transaction_id).await?)
        }
        Command::Balances { address } => {
            let wallet = manager.get_wallet_by_address(&address).await?;
            let balances = manager.get_balances(wallet.id).await?;
            json!({ "wallet": wallet, "balances": balances })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let command = parse_command(&mut pargs)?;
    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("unexpected arguments: {remaining:?}");
    }

    logging::init();

    let config = AdminConfig::from_env(database_url);
    config.validate()?;

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let manager = LedgerManager::new(db.backend(), Arc::new(NoopNotifier), config.ledger.clone());

    let name = command.name();
    let start = Instant::now();
    let result = run(&db, &manager, command).await;
    logging::log_command(name, start.elapsed().as_millis() as u64, result.is_ok());

    db.close().await;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
