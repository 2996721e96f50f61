//! Ledger error types.

use std::time::Duration;

use thiserror::Error;

use crate::accounts::{AccountId, LedgerId, RoleCode, UserId, WalletId};
use crate::db::timeouts::TimeoutError;
use crate::transactions::{TransactionId, TransferFlag, TransferId, TxStatus};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage deadline exceeded
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Wallet address fails the charset or length rules
    #[error("Invalid wallet address: {0:?}")]
    InvalidAddress(String),

    /// Wallet or ledger configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// User already owns a personal wallet
    #[error("User {0} already has a personal wallet")]
    DuplicatePersonalWallet(UserId),

    /// Wallet address already taken
    #[error("Wallet address {0} is already taken")]
    DuplicateAddress(String),

    /// Wallet not found by id
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// Wallet not found by address
    #[error("Wallet not found for address {0}")]
    AddressNotFound(String),

    /// Ledger not found by id
    #[error("Ledger not found: {0}")]
    LedgerNotFound(LedgerId),

    /// Ledger not found by name
    #[error("Ledger not found for name {0:?}")]
    LedgerNameNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Account row referenced by a transfer is gone
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Transaction carries no assets
    #[error("Transaction has no assets")]
    EmptyTransaction,

    /// A required pre-existing account is missing
    #[error("Invalid balance: no {role} account for wallet {wallet_id} on ledger {ledger_id}")]
    InvalidBalance {
        wallet_id: WalletId,
        ledger_id: LedgerId,
        role: RoleCode,
    },

    /// Account exists but cannot cover the movement
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        wallet_id: WalletId,
        ledger_id: LedgerId,
        available: i64,
        required: i64,
    },

    /// Counter arithmetic overflowed
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Malformed collateral transaction
    #[error("Invalid collateral transaction: {0}")]
    InvalidCollateralTx(&'static str),

    /// Malformed warehouse transfer
    #[error("Invalid warehouse transfer: {0}")]
    InvalidWarehouseTransfer(&'static str),

    /// Asset cannot be held by a warehouse
    #[error("Ledger {0} is not a depositable warehouse asset")]
    InvalidWarehouseAsset(LedgerId),

    /// User-to-user transaction between non-user wallets
    #[error("Invalid user to user transaction: {debit_role} -> {credit_role}")]
    InvalidUserToUser {
        debit_role: RoleCode,
        credit_role: RoleCode,
    },

    /// No legal transaction code for the role pair
    #[error("No transaction code for role pair {0} / {1}")]
    UnclassifiableTransaction(RoleCode, RoleCode),

    /// Transfers may only be posted as plain or pending
    #[error("Transfer flag {0:?} cannot be posted directly")]
    InvalidTransferFlag(TransferFlag),

    /// Finalize target is not a terminal pending status
    #[error("Invalid status to finalize transaction: {0:?}")]
    InvalidFinalizeStatus(TxStatus),

    /// Transaction was already finalized or never pending
    #[error("Transaction {0} is not pending")]
    TransactionNotPending(TransactionId),

    /// A pending transaction owns a non-pending transfer
    #[error("Unexpected non-pending transfer {0}")]
    UnexpectedNonPendingTransfer(TransferId),

    /// Stored row holds a value outside the known code tables
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Coarse classification used by callers to pick a retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Deterministic rejection, do not retry unmodified
    Validation,
    /// Business-logic balance rejection
    Balance,
    /// Lost a race or invoked twice, treat as already handled
    Concurrency,
    /// Data-integrity violation, alert
    Integrity,
    /// Storage fault, caller owns the retry policy
    Storage,
}

impl LedgerError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Database(_) | LedgerError::Timeout(_) => ErrorKind::Storage,
            LedgerError::InvalidBalance { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::BalanceOverflow => ErrorKind::Balance,
            LedgerError::TransactionNotPending(_) => ErrorKind::Concurrency,
            LedgerError::UnexpectedNonPendingTransfer(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::CorruptRow(_) => ErrorKind::Integrity,
            _ => ErrorKind::Validation,
        }
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::Timeout(_) => {
                "Internal server error".to_string()
            }
            LedgerError::CorruptRow(_) | LedgerError::AccountNotFound(_) => {
                "Internal ledger error".to_string()
            }
            LedgerError::InsufficientBalance { .. } => "Insufficient balance".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<TimeoutError> for LedgerError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(duration) => LedgerError::Timeout(duration),
            TimeoutError::Database(e) => LedgerError::Database(e),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::EmptyTransaction.kind(), ErrorKind::Validation);
        assert_eq!(
            LedgerError::InvalidBalance {
                wallet_id: 1,
                ledger_id: 1,
                role: RoleCode::Personal,
            }
            .kind(),
            ErrorKind::Balance
        );
        assert_eq!(
            LedgerError::TransactionNotPending(4).kind(),
            ErrorKind::Concurrency
        );
        assert_eq!(
            LedgerError::UnexpectedNonPendingTransfer(9).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            LedgerError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_client_message_hides_storage_details() {
        let err = LedgerError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");

        let err = LedgerError::InsufficientBalance {
            wallet_id: 12,
            ledger_id: 1,
            available: 3,
            required: 10,
        };
        assert_eq!(err.client_message(), "Insufficient balance");
    }

    #[test]
    fn test_timeout_conversion() {
        let err: LedgerError = TimeoutError::Timeout(Duration::from_secs(10)).into();
        assert!(matches!(err, LedgerError::Timeout(d) if d.as_secs() == 10));
    }
}
