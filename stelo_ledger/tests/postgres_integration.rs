//! Integration tests against PostgreSQL.
//!
//! Run with a reachable `DATABASE_URL` and `cargo test -- --ignored`. Every test
//! truncates the ledger tables, so they run serially.

use std::sync::Arc;

use serial_test::serial;
use stelo_ledger::accounts::{
    CollateralRatio, CreateWalletInput, LedgerClass, Location, NewLedger, RoleCode,
};
use stelo_ledger::db::{Database, DatabaseConfig, PgBackend};
use stelo_ledger::notify::NoopNotifier;
use stelo_ledger::transactions::{TxAsset, TxCode, TxInput, TxStatus};
use stelo_ledger::{LedgerConfig, LedgerError, LedgerManager};

/// Helper to create a migrated, empty database and a manager over it
async fn setup() -> (Database, LedgerManager<PgBackend>) {
    let config = DatabaseConfig {
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        ..DatabaseConfig::from_env()
    };
    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.migrate().await.expect("Migrations failed");

    sqlx::query(
        "TRUNCATE transfers, transactions, accounts, wallet_permissions, wallets, ledgers RESTART IDENTITY CASCADE",
    )
    .execute(db.pool())
    .await
    .expect("Failed to clean tables");

    let manager = LedgerManager::new(db.backend(), Arc::new(NoopNotifier), LedgerConfig::default());
    (db, manager)
}

async fn seed(manager: &LedgerManager<PgBackend>) -> (i64, i64, i64) {
    let stelo = manager
        .create_ledger(&NewLedger {
            name: "stelo".to_string(),
            scale: 2,
            class: LedgerClass::DigitalAsset,
            value: 0,
        })
        .await
        .unwrap();
    let dal = manager
        .create_wallet(&CreateWalletInput::new(0, RoleCode::Dal).with_address("SYSTEM"))
        .await
        .unwrap();
    let alice = manager
        .create_wallet(&CreateWalletInput::new(1, RoleCode::Personal).with_address("ALICE"))
        .await
        .unwrap();
    (stelo.id, dal.id, alice.id)
}

fn mint(stelo: i64, dal: i64, to: i64, amount: i64) -> TxInput {
    TxInput {
        debit_wallet_id: to,
        credit_wallet_id: dal,
        code: TxCode::SysToUser,
        memo: None,
        is_pending: false,
        assets: vec![TxAsset {
            ledger_id: stelo,
            amount,
        }],
    }
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_issuance_accumulates() {
    let (db, manager) = setup().await;
    let (stelo, dal, alice) = seed(&manager).await;

    manager.create_transaction(&mint(stelo, dal, alice, 500)).await.unwrap();
    manager.create_transaction(&mint(stelo, dal, alice, 300)).await.unwrap();

    let balances = manager.get_balances(alice).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].account.debits_posted, 800);
    assert_eq!(balances[0].available, 800);

    db.close().await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_unique_rules_map_to_ledger_errors() {
    let (db, manager) = setup().await;
    seed(&manager).await;

    let err = manager
        .create_wallet(&CreateWalletInput::new(1, RoleCode::Personal))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicatePersonalWallet(1)));

    let err = manager
        .create_wallet(&CreateWalletInput::new(9, RoleCode::General).with_address("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateAddress(_)));

    db.close().await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_concurrent_first_deposits() {
    let (db, manager) = setup().await;
    let (stelo, dal, alice) = seed(&manager).await;
    let first = mint(stelo, dal, alice, 30);
    let second = mint(stelo, dal, alice, 12);

    let (a, b) = tokio::join!(
        manager.create_transaction(&first),
        manager.create_transaction(&second),
    );
    // serializable isolation may reject one writer; it must leave no trace
    let committed: i64 = [a, b]
        .iter()
        .map(|r| match r {
            Ok(_) => 1,
            Err(LedgerError::Database(_)) => 0,
            Err(e) => panic!("unexpected error: {e}"),
        })
        .sum();
    assert!(committed >= 1);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM accounts WHERE wallet_id = $1 AND ledger_id = $2",
    )
    .bind(alice)
    .bind(stelo)
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(count, 1);

    db.close().await;
}

#[tokio::test]
#[serial]
#[ignore = "Requires database setup"]
async fn test_deposit_lock_and_settlement() {
    let (db, manager) = setup().await;
    let (stelo, dal, alice) = seed(&manager).await;
    let gem = manager
        .create_ledger(&NewLedger {
            name: "gem".to_string(),
            scale: 0,
            class: LedgerClass::InWorldItem,
            value: 5,
        })
        .await
        .unwrap();
    let depot = manager
        .create_wallet(
            &CreateWalletInput::warehouse(
                2,
                CollateralRatio::from_milli(200).unwrap(),
                Location { x: 1.5, y: -2.0 },
            )
            .with_address("DEPOT"),
        )
        .await
        .unwrap();

    manager.create_transaction(&mint(stelo, dal, alice, 10)).await.unwrap();
    manager
        .create_transaction(&TxInput {
            debit_wallet_id: depot.id,
            credit_wallet_id: alice,
            code: TxCode::Collateral,
            memo: None,
            is_pending: false,
            assets: vec![TxAsset {
                ledger_id: stelo,
                amount: 10,
            }],
        })
        .await
        .unwrap();

    let id = manager
        .create_transaction(&TxInput {
            debit_wallet_id: alice,
            credit_wallet_id: depot.id,
            code: TxCode::WarehouseTransfer,
            memo: Some("one gem".to_string()),
            is_pending: true,
            assets: vec![TxAsset {
                ledger_id: gem.id,
                amount: 1,
            }],
        })
        .await
        .unwrap();
    assert_eq!(manager.get_transfers(id).await.unwrap().len(), 2);

    manager
        .finalize_transaction(id, TxStatus::PostPending)
        .await
        .unwrap();
    let err = manager
        .finalize_transaction(id, TxStatus::VoidPending)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::TransactionNotPending(_)));
    assert_eq!(manager.get_transfers(id).await.unwrap().len(), 4);

    let fetched = manager.get_wallet_by_address("depot").await.unwrap();
    assert_eq!(fetched.location, Some(Location { x: 1.5, y: -2.0 }));
    assert_eq!(fetched.collateral_ratio.milli(), 200);

    db.close().await;
}
