//! # Stelo Ledger
//!
//! A double-entry ledger engine for a virtual economy. Every balance change is
//! a transfer between two accounts, each account is keyed by wallet, ledger
//! and role, and the role decides which side of a transfer increases the
//! account's natural balance.
//!
//! ## Architecture
//!
//! - **Accounts**: role table, ledger and wallet registries
//! - **Transactions**: transfer posting, classification, collateral locking and
//!   two-phase settlement
//! - **Storage**: the [`db::LedgerStore`] seam with PostgreSQL and in-memory
//!   implementations; each operation runs in one storage transaction
//! - **Notifications**: best-effort wallet events delivered after commit
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stelo_ledger::accounts::{CreateWalletInput, LedgerClass, NewLedger, RoleCode};
//! use stelo_ledger::db::MemoryBackend;
//! use stelo_ledger::notify::NoopNotifier;
//! use stelo_ledger::transactions::{TxAsset, TxCode, TxInput};
//! use stelo_ledger::{LedgerConfig, LedgerManager};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), stelo_ledger::LedgerError> {
//! let manager = LedgerManager::new(
//!     MemoryBackend::new(),
//!     Arc::new(NoopNotifier),
//!     LedgerConfig::default(),
//! );
//! let stelo = manager
//!     .create_ledger(&NewLedger {
//!         name: "stelo".to_string(),
//!         scale: 2,
//!         class: LedgerClass::DigitalAsset,
//!         value: 0,
//!     })
//!     .await?;
//! let system = manager.create_wallet(&CreateWalletInput::new(0, RoleCode::Dal)).await?;
//! let alice = manager.create_wallet(&CreateWalletInput::new(1, RoleCode::Personal)).await?;
//!
//! manager
//!     .create_transaction(&TxInput {
//!         debit_wallet_id: alice.id,
//!         credit_wallet_id: system.id,
//!         code: TxCode::SysToUser,
//!         memo: None,
//!         is_pending: false,
//!         assets: vec![TxAsset { ledger_id: stelo.id, amount: 500 }],
//!     })
//!     .await?;
//!
//! let balances = manager.get_balances(alice.id).await?;
//! assert_eq!(balances[0].available, 500);
//! # Ok(())
//! # }
//! ```

/// Ledgers, wallets, accounts and the role table.
pub mod accounts;

/// Engine configuration.
pub mod config;

/// Storage seam, PostgreSQL pool and in-memory backend.
pub mod db;

/// Error types.
pub mod errors;

/// Transaction-scoped entry point.
pub mod manager;

/// Wallet notifications.
pub mod notify;

/// Transfer posting, classification and settlement.
pub mod transactions;

pub use config::LedgerConfig;
pub use errors::{ErrorKind, LedgerError, LedgerResult};
pub use manager::{Balance, LedgerManager};
