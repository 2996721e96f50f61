//! Ledger manager, the entry point for callers of the engine.
//!
//! Every method runs in exactly one storage transaction. Notifications raised
//! while the transaction is open are buffered and delivered only after it
//! commits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accounts::registry::{self, CreateWalletInput};
use crate::accounts::{Account, Ledger, LedgerId, NewLedger, Permissions, UserId, Wallet, WalletId};
use crate::config::LedgerConfig;
use crate::db::{LedgerBackend, LedgerStore};
use crate::errors::{LedgerError, LedgerResult};
use crate::notify::{Notifier, Outbox};
use crate::transactions::{
    self, Transaction, TransactionId, Transfer, TransferId, TransferInput, TxByAddressesInput,
    TxInput, TxStatus,
};

/// Account together with its available balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub account: Account,
    pub available: i64,
}

/// Ledger manager
#[derive(Clone)]
pub struct LedgerManager<B: LedgerBackend> {
    backend: B,
    notifier: Arc<dyn Notifier>,
    config: LedgerConfig,
}

impl<B: LedgerBackend> LedgerManager<B> {
    /// Create a new ledger manager
    ///
    /// # Arguments
    ///
    /// * `backend` - Source of storage transactions
    /// * `notifier` - Receives wallet events after commit
    /// * `config` - Engine configuration
    pub fn new(backend: B, notifier: Arc<dyn Notifier>, config: LedgerConfig) -> Self {
        Self {
            backend,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn base_ledger(&self, store: &mut B::Store) -> LedgerResult<Ledger> {
        registry::get_ledger_by_name(store, &self.config.base_ledger_name).await
    }

    /// Register a ledger
    pub async fn create_ledger(&self, ledger: &NewLedger) -> LedgerResult<Ledger> {
        let mut store = self.backend.begin().await?;
        let created = registry::create_ledger(&mut store, ledger).await?;
        store.commit().await?;
        Ok(created)
    }

    /// Create a wallet
    pub async fn create_wallet(&self, input: &CreateWalletInput) -> LedgerResult<Wallet> {
        let mut store = self.backend.begin().await?;
        let wallet = registry::create_wallet(&mut store, input).await?;
        store.commit().await?;
        Ok(wallet)
    }

    /// Create a transaction between two wallets
    pub async fn create_transaction(&self, input: &TxInput) -> LedgerResult<TransactionId> {
        let mut store = self.backend.begin().await?;
        let base = self.base_ledger(&mut store).await?;
        let outbox = Outbox::new();
        let id = transactions::create_transaction(&mut store, &outbox, &base, input).await?;
        store.commit().await?;
        outbox.flush(self.notifier.as_ref());
        Ok(id)
    }

    /// Create a transaction between two addresses, inferring its code
    pub async fn create_transaction_by_addresses(
        &self,
        input: &TxByAddressesInput,
    ) -> LedgerResult<TransactionId> {
        let mut store = self.backend.begin().await?;
        let base = self.base_ledger(&mut store).await?;
        let outbox = Outbox::new();
        let id =
            transactions::create_transaction_by_addresses(&mut store, &outbox, &base, input)
                .await?;
        store.commit().await?;
        outbox.flush(self.notifier.as_ref());
        Ok(id)
    }

    /// Approve or reject a pending transaction
    pub async fn finalize_transaction(
        &self,
        transaction_id: TransactionId,
        target: TxStatus,
    ) -> LedgerResult<()> {
        let mut store = self.backend.begin().await?;
        let outbox = Outbox::new();
        transactions::finalize_transaction(&mut store, &outbox, transaction_id, target).await?;
        store.commit().await?;
        outbox.flush(self.notifier.as_ref());
        Ok(())
    }

    /// Post a single transfer outside the orchestrator, e.g. for seeding
    pub async fn post_transfer(&self, input: &TransferInput) -> LedgerResult<TransferId> {
        let mut store = self.backend.begin().await?;
        let id = transactions::post_transfer(&mut store, input).await?;
        store.commit().await?;
        Ok(id)
    }

    pub async fn get_wallet(&self, id: WalletId) -> LedgerResult<Wallet> {
        let mut store = self.backend.begin().await?;
        let wallet = registry::get_wallet(&mut store, id).await?;
        store.commit().await?;
        Ok(wallet)
    }

    pub async fn get_wallet_by_address(&self, address: &str) -> LedgerResult<Wallet> {
        let mut store = self.backend.begin().await?;
        let wallet = registry::get_wallet_by_address(&mut store, address).await?;
        store.commit().await?;
        Ok(wallet)
    }

    /// Every account of a wallet with its available balance
    pub async fn get_balances(&self, wallet_id: WalletId) -> LedgerResult<Vec<Balance>> {
        let mut store = self.backend.begin().await?;
        registry::get_wallet(&mut store, wallet_id).await?;
        let accounts = store.get_wallet_accounts(wallet_id).await?;
        store.commit().await?;

        Ok(accounts
            .into_iter()
            .map(|account| Balance {
                available: account.available_balance(),
                account,
            })
            .collect())
    }

    pub async fn get_ledger(&self, id: LedgerId) -> LedgerResult<Ledger> {
        let mut store = self.backend.begin().await?;
        let ledger = registry::get_ledger(&mut store, id).await?;
        store.commit().await?;
        Ok(ledger)
    }

    pub async fn get_ledger_by_name(&self, name: &str) -> LedgerResult<Ledger> {
        let mut store = self.backend.begin().await?;
        let ledger = registry::get_ledger_by_name(&mut store, name).await?;
        store.commit().await?;
        Ok(ledger)
    }

    pub async fn list_ledgers(&self) -> LedgerResult<Vec<Ledger>> {
        let mut store = self.backend.begin().await?;
        let ledgers = store.list_ledgers().await?;
        store.commit().await?;
        Ok(ledgers)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> LedgerResult<Transaction> {
        let mut store = self.backend.begin().await?;
        let transaction = store
            .get_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        store.commit().await?;
        Ok(transaction)
    }

    /// Transfers of a transaction, reservations and settlements alike
    pub async fn get_transfers(&self, transaction_id: TransactionId) -> LedgerResult<Vec<Transfer>> {
        let mut store = self.backend.begin().await?;
        let transfers = store.get_transfers_by_transaction(transaction_id).await?;
        store.commit().await?;
        Ok(transfers)
    }

    /// Most recent transactions touching a wallet, newest first
    pub async fn get_wallet_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut store = self.backend.begin().await?;
        let transactions = store.get_wallet_transactions(wallet_id, limit).await?;
        store.commit().await?;
        Ok(transactions)
    }

    pub async fn get_permissions(
        &self,
        wallet_id: WalletId,
        user_id: UserId,
    ) -> LedgerResult<Permissions> {
        let mut store = self.backend.begin().await?;
        let permissions = store.get_permissions(wallet_id, user_id).await?;
        store.commit().await?;
        Ok(permissions)
    }
}
