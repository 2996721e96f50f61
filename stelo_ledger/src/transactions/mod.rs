//! Transactions and transfers.
//!
//! This module implements:
//! - Posting single-asset transfers with get-or-create and must-exist sides
//! - Transaction classification and role-pair code inference
//! - Collateral locking for warehouse deposits
//! - Two-phase settlement of pending transactions

pub mod classify;
pub mod collateral;
pub mod finalize;
pub mod models;
pub mod orchestrator;
pub mod transfer;

pub use classify::{LEGAL_PAIRS, infer_tx_code};
pub use collateral::collateral_needed;
pub use finalize::finalize_transaction;
pub use models::{
    NewTransaction, NewTransfer, Transaction, TransactionId, Transfer, TransferFlag, TransferId,
    TransferInput, TxAsset, TxByAddressesInput, TxCode, TxInput, TxStatus,
};
pub use orchestrator::{create_transaction, create_transaction_by_addresses};
pub use transfer::{post_side, post_transfer};
