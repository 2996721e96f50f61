//! Storage seam of the ledger engine.
//!
//! The engine never talks to a connection pool directly. Every top-level
//! operation obtains one [`LedgerStore`] from a [`LedgerBackend`], performs all
//! of its reads and writes through it, and commits it. Dropping a store without
//! committing rolls every write back.

use async_trait::async_trait;

use crate::accounts::{
    Account, AccountCounter, AccountId, AccountKey, Ledger, LedgerId, NewLedger, NewWallet,
    Permissions, UserId, Wallet, WalletId,
};
use crate::errors::LedgerResult;
use crate::transactions::{
    NewTransaction, NewTransfer, Transaction, TransactionId, Transfer, TransferId, TxStatus,
};

/// Row-level primitives executed inside one atomic storage transaction
#[async_trait]
pub trait LedgerStore: Send + Sized {
    /// Insert a ledger
    async fn insert_ledger(&mut self, ledger: &NewLedger) -> LedgerResult<Ledger>;

    /// Find ledger by ID
    async fn get_ledger(&mut self, id: LedgerId) -> LedgerResult<Option<Ledger>>;

    /// Find ledger by name
    async fn get_ledger_by_name(&mut self, name: &str) -> LedgerResult<Option<Ledger>>;

    /// Find every listed ledger that exists
    async fn get_ledgers(&mut self, ids: &[LedgerId]) -> LedgerResult<Vec<Ledger>>;

    /// All ledgers ordered by ID
    async fn list_ledgers(&mut self) -> LedgerResult<Vec<Ledger>>;

    /// Insert a wallet
    ///
    /// Fails with `DuplicateAddress` or `DuplicatePersonalWallet` when a
    /// uniqueness rule is violated.
    async fn insert_wallet(&mut self, wallet: &NewWallet) -> LedgerResult<Wallet>;

    /// Find wallet by ID
    async fn get_wallet(&mut self, id: WalletId) -> LedgerResult<Option<Wallet>>;

    /// Find wallet by address
    async fn get_wallet_by_address(&mut self, address: &str) -> LedgerResult<Option<Wallet>>;

    /// Personal wallet owned by a user, if any
    async fn find_personal_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<WalletId>>;

    /// Grant permissions on a wallet to a user, merging with existing grants
    async fn grant_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
        permissions: Permissions,
    ) -> LedgerResult<()>;

    /// Permissions a user holds on a wallet
    async fn get_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
    ) -> LedgerResult<Permissions>;

    /// Atomically add `amount` to one counter of an existing account.
    ///
    /// With `require_available` the update only applies when the account's
    /// available balance covers `amount`. Returns `None` when no row matched.
    async fn increment_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
        require_available: bool,
    ) -> LedgerResult<Option<AccountId>>;

    /// Insert an account seeded with `amount` in `counter`, or add to the
    /// existing row if a concurrent writer created it first
    async fn upsert_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
    ) -> LedgerResult<AccountId>;

    /// Find account by key
    async fn get_account(&mut self, key: &AccountKey) -> LedgerResult<Option<Account>>;

    /// Find account by ID
    async fn get_account_by_id(&mut self, id: AccountId) -> LedgerResult<Option<Account>>;

    /// All accounts of a wallet
    async fn get_wallet_accounts(&mut self, wallet_id: WalletId) -> LedgerResult<Vec<Account>>;

    /// Move `amount` out of a pending counter, into `posted` if given.
    ///
    /// Returns `false` when the account is missing or its pending counter is
    /// smaller than `amount`.
    async fn release_pending(
        &mut self,
        id: AccountId,
        pending: AccountCounter,
        posted: Option<AccountCounter>,
        amount: i64,
    ) -> LedgerResult<bool>;

    /// Insert a transaction
    async fn insert_transaction(&mut self, transaction: &NewTransaction)
    -> LedgerResult<TransactionId>;

    /// Find transaction by ID
    async fn get_transaction(&mut self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    /// Most recent transactions touching a wallet
    async fn get_wallet_transactions(
        &mut self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>>;

    /// Set `status = to` where `id` matches and `status = from`.
    ///
    /// Returns whether a row changed.
    async fn update_transaction_status(
        &mut self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> LedgerResult<bool>;

    /// Append a transfer
    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> LedgerResult<TransferId>;

    /// Transfers of a transaction ordered by ID
    async fn get_transfers_by_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Vec<Transfer>>;

    /// Commit every write made through this store
    async fn commit(self) -> LedgerResult<()>;
}

/// Source of atomic storage transactions
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    type Store: LedgerStore;

    /// Begin a storage transaction
    async fn begin(&self) -> LedgerResult<Self::Store>;
}
