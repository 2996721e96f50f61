//! Transaction and transfer data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountId, LedgerId, RoleCode, WalletId};

/// Transaction ID type
pub type TransactionId = i64;

/// Transfer ID type
pub type TransferId = i64;

/// Semantic code of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCode {
    /// System issuer to or from a user wallet
    SysToUser,
    /// Stelo into or out of warehouse collateral
    Collateral,
    /// Deposit into or withdrawal from a warehouse
    WarehouseTransfer,
    UserToUser,
    WarehouseToWarehouse,
}

impl TxCode {
    pub fn code(self) -> i16 {
        match self {
            TxCode::SysToUser => 0,
            TxCode::Collateral => 1,
            TxCode::WarehouseTransfer => 2,
            TxCode::UserToUser => 3,
            TxCode::WarehouseToWarehouse => 4,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(TxCode::SysToUser),
            1 => Some(TxCode::Collateral),
            2 => Some(TxCode::WarehouseTransfer),
            3 => Some(TxCode::UserToUser),
            4 => Some(TxCode::WarehouseToWarehouse),
            _ => None,
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Posted,
    Pending,
    /// Pending transaction approved
    PostPending,
    /// Pending transaction rejected
    VoidPending,
}

impl TxStatus {
    pub fn code(self) -> i16 {
        match self {
            TxStatus::Posted => 0,
            TxStatus::Pending => 1,
            TxStatus::PostPending => 2,
            TxStatus::VoidPending => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(TxStatus::Posted),
            1 => Some(TxStatus::Pending),
            2 => Some(TxStatus::PostPending),
            3 => Some(TxStatus::VoidPending),
            _ => None,
        }
    }
}

/// Transfer state flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFlag {
    None,
    /// Reservation, settled later by a PostPending or VoidPending transfer
    Pending,
    PostPending,
    VoidPending,
}

impl TransferFlag {
    pub fn code(self) -> i16 {
        match self {
            TransferFlag::None => 0,
            TransferFlag::Pending => 1,
            TransferFlag::PostPending => 2,
            TransferFlag::VoidPending => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(TransferFlag::None),
            1 => Some(TransferFlag::Pending),
            2 => Some(TransferFlag::PostPending),
            3 => Some(TransferFlag::VoidPending),
            _ => None,
        }
    }

    pub fn is_pending(self) -> bool {
        self == TransferFlag::Pending
    }
}

/// One asset movement requested inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAsset {
    pub ledger_id: LedgerId,
    pub amount: i64,
}

/// Transaction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub debit_wallet_id: WalletId,
    pub credit_wallet_id: WalletId,
    pub code: TxCode,
    pub memo: Option<String>,
    pub is_pending: bool,
    pub assets: Vec<TxAsset>,
}

/// Transaction request addressed by wallet addresses; the code is inferred
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxByAddressesInput {
    /// Wallet whose balance decreases (credited)
    pub sending_address: String,
    /// Wallet whose balance increases (debited)
    pub receiving_address: String,
    pub memo: Option<String>,
    pub is_pending: bool,
    pub assets: Vec<TxAsset>,
}

/// Transaction model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub debit_wallet_id: WalletId,
    pub credit_wallet_id: WalletId,
    pub code: TxCode,
    pub status: TxStatus,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction row to insert
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub debit_wallet_id: WalletId,
    pub credit_wallet_id: WalletId,
    pub code: TxCode,
    pub status: TxStatus,
    pub memo: Option<String>,
}

/// Transfer model (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub transaction_id: TransactionId,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    pub ledger_id: LedgerId,
    pub amount: i64,
    pub code: TxCode,
    pub flag: TransferFlag,
    /// Reserving transfer this one settles or voids
    pub pending_ref_id: Option<TransferId>,
    pub created_at: DateTime<Utc>,
}

/// Transfer row to insert
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub transaction_id: TransactionId,
    pub debit_account_id: AccountId,
    pub credit_account_id: AccountId,
    pub ledger_id: LedgerId,
    pub amount: i64,
    pub code: TxCode,
    pub flag: TransferFlag,
    pub pending_ref_id: Option<TransferId>,
}

/// Single-asset movement between two (wallet, role) pairs
#[derive(Debug, Clone, Copy)]
pub struct TransferInput {
    pub transaction_id: TransactionId,
    pub debit_wallet_id: WalletId,
    pub debit_role: RoleCode,
    pub credit_wallet_id: WalletId,
    pub credit_role: RoleCode,
    pub ledger_id: LedgerId,
    pub amount: i64,
    pub flag: TransferFlag,
    pub code: TxCode,
}
