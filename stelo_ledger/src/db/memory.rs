//! In-memory ledger store.
//!
//! Each store holds the backend lock for its whole lifetime and works on a
//! private copy of the state, so transactions are serialised and a dropped
//! store leaves no trace. Used by tests and offline tooling.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::store::{LedgerBackend, LedgerStore};
use crate::accounts::{
    Account, AccountCounter, AccountId, AccountKey, Ledger, LedgerId, NewLedger, NewWallet,
    Permissions, RoleCode, UserId, Wallet, WalletId,
};
use crate::errors::{LedgerError, LedgerResult};
use crate::transactions::{
    NewTransaction, NewTransfer, Transaction, TransactionId, Transfer, TransferId, TxStatus,
};

/// Full ledger state
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub ledgers: Vec<Ledger>,
    pub wallets: Vec<Wallet>,
    pub permissions: HashMap<(WalletId, UserId), Permissions>,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub transfers: Vec<Transfer>,
}

impl MemoryState {
    fn next_id(len: usize) -> i64 {
        len as i64 + 1
    }

    fn account_mut(&mut self, key: &AccountKey) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.key() == *key)
    }
}

/// Backend over a shared in-memory state
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl LedgerBackend for MemoryBackend {
    type Store = MemoryLedgerStore;

    async fn begin(&self) -> LedgerResult<MemoryLedgerStore> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryLedgerStore { guard, working })
    }
}

/// Serialised in-memory transaction
pub struct MemoryLedgerStore {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryLedgerStore {
    /// Uncommitted state as seen by this transaction
    pub fn state(&self) -> &MemoryState {
        &self.working
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_ledger(&mut self, ledger: &NewLedger) -> LedgerResult<Ledger> {
        if self.working.ledgers.iter().any(|l| l.name == ledger.name) {
            return Err(LedgerError::InvalidConfiguration(format!(
                "ledger {:?} already exists",
                ledger.name
            )));
        }
        let row = Ledger {
            id: MemoryState::next_id(self.working.ledgers.len()),
            name: ledger.name.clone(),
            scale: ledger.scale,
            class: ledger.class,
            value: ledger.value,
            created_at: Utc::now(),
        };
        self.working.ledgers.push(row.clone());
        Ok(row)
    }

    async fn get_ledger(&mut self, id: LedgerId) -> LedgerResult<Option<Ledger>> {
        Ok(self.working.ledgers.iter().find(|l| l.id == id).cloned())
    }

    async fn get_ledger_by_name(&mut self, name: &str) -> LedgerResult<Option<Ledger>> {
        Ok(self.working.ledgers.iter().find(|l| l.name == name).cloned())
    }

    async fn get_ledgers(&mut self, ids: &[LedgerId]) -> LedgerResult<Vec<Ledger>> {
        Ok(self
            .working
            .ledgers
            .iter()
            .filter(|l| ids.contains(&l.id))
            .cloned()
            .collect())
    }

    async fn list_ledgers(&mut self) -> LedgerResult<Vec<Ledger>> {
        Ok(self.working.ledgers.clone())
    }

    async fn insert_wallet(&mut self, wallet: &NewWallet) -> LedgerResult<Wallet> {
        if self.working.wallets.iter().any(|w| w.address == wallet.address) {
            return Err(LedgerError::DuplicateAddress(wallet.address.clone()));
        }
        if let (RoleCode::Personal, Some(owner)) = (wallet.role, wallet.owner_user_id) {
            let taken = self
                .working
                .wallets
                .iter()
                .any(|w| w.role == RoleCode::Personal && w.owner_user_id == Some(owner));
            if taken {
                return Err(LedgerError::DuplicatePersonalWallet(owner));
            }
        }

        let row = Wallet {
            id: MemoryState::next_id(self.working.wallets.len()),
            address: wallet.address.clone(),
            role: wallet.role,
            collateral_ratio: wallet.collateral_ratio,
            location: wallet.location,
            owner_user_id: wallet.owner_user_id,
            created_at: Utc::now(),
        };
        self.working.wallets.push(row.clone());
        Ok(row)
    }

    async fn get_wallet(&mut self, id: WalletId) -> LedgerResult<Option<Wallet>> {
        Ok(self.working.wallets.iter().find(|w| w.id == id).cloned())
    }

    async fn get_wallet_by_address(&mut self, address: &str) -> LedgerResult<Option<Wallet>> {
        Ok(self
            .working
            .wallets
            .iter()
            .find(|w| w.address == address)
            .cloned())
    }

    async fn find_personal_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<WalletId>> {
        Ok(self
            .working
            .wallets
            .iter()
            .find(|w| w.role == RoleCode::Personal && w.owner_user_id == Some(user_id))
            .map(|w| w.id))
    }

    async fn grant_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
        permissions: Permissions,
    ) -> LedgerResult<()> {
        let entry = self
            .working
            .permissions
            .entry((wallet_id, user_id))
            .or_default();
        *entry = *entry | permissions;
        Ok(())
    }

    async fn get_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
    ) -> LedgerResult<Permissions> {
        Ok(self
            .working
            .permissions
            .get(&(wallet_id, user_id))
            .copied()
            .unwrap_or(Permissions::NONE))
    }

    async fn increment_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
        require_available: bool,
    ) -> LedgerResult<Option<AccountId>> {
        let Some(account) = self.working.account_mut(key) else {
            return Ok(None);
        };
        if require_available && account.available_balance() < amount {
            return Ok(None);
        }
        let value = account.counter_mut(counter);
        *value = value
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(Some(account.id))
    }

    async fn upsert_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
    ) -> LedgerResult<AccountId> {
        if let Some(id) = self.increment_account(key, counter, amount, false).await? {
            return Ok(id);
        }

        let mut account = Account {
            id: MemoryState::next_id(self.working.accounts.len()),
            wallet_id: key.wallet_id,
            ledger_id: key.ledger_id,
            role: key.role,
            debits_pending: 0,
            debits_posted: 0,
            credits_pending: 0,
            credits_posted: 0,
            created_at: Utc::now(),
        };
        *account.counter_mut(counter) = amount;
        let id = account.id;
        self.working.accounts.push(account);
        Ok(id)
    }

    async fn get_account(&mut self, key: &AccountKey) -> LedgerResult<Option<Account>> {
        Ok(self
            .working
            .accounts
            .iter()
            .find(|a| a.key() == *key)
            .cloned())
    }

    async fn get_account_by_id(&mut self, id: AccountId) -> LedgerResult<Option<Account>> {
        Ok(self.working.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn get_wallet_accounts(&mut self, wallet_id: WalletId) -> LedgerResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .working
            .accounts
            .iter()
            .filter(|a| a.wallet_id == wallet_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.ledger_id, a.role.code()));
        Ok(accounts)
    }

    async fn release_pending(
        &mut self,
        id: AccountId,
        pending: AccountCounter,
        posted: Option<AccountCounter>,
        amount: i64,
    ) -> LedgerResult<bool> {
        let Some(account) = self.working.accounts.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        if account.counter(pending) < amount {
            return Ok(false);
        }
        if let Some(posted) = posted {
            let value = account.counter_mut(posted);
            *value = value
                .checked_add(amount)
                .ok_or(LedgerError::BalanceOverflow)?;
        }
        *account.counter_mut(pending) -= amount;
        Ok(true)
    }

    async fn insert_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> LedgerResult<TransactionId> {
        let id = MemoryState::next_id(self.working.transactions.len());
        self.working.transactions.push(Transaction {
            id,
            debit_wallet_id: transaction.debit_wallet_id,
            credit_wallet_id: transaction.credit_wallet_id,
            code: transaction.code,
            status: transaction.status,
            memo: transaction.memo.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_transaction(&mut self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_wallet_transactions(
        &mut self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .rev()
            .filter(|t| t.debit_wallet_id == wallet_id || t.credit_wallet_id == wallet_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_transaction_status(
        &mut self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> LedgerResult<bool> {
        match self
            .working
            .transactions
            .iter_mut()
            .find(|t| t.id == id && t.status == from)
        {
            Some(transaction) => {
                transaction.status = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> LedgerResult<TransferId> {
        let id = MemoryState::next_id(self.working.transfers.len());
        self.working.transfers.push(Transfer {
            id,
            transaction_id: transfer.transaction_id,
            debit_account_id: transfer.debit_account_id,
            credit_account_id: transfer.credit_account_id,
            ledger_id: transfer.ledger_id,
            amount: transfer.amount,
            code: transfer.code,
            flag: transfer.flag,
            pending_ref_id: transfer.pending_ref_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_transfers_by_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Vec<Transfer>> {
        Ok(self
            .working
            .transfers
            .iter()
            .filter(|t| t.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn commit(self) -> LedgerResult<()> {
        let MemoryLedgerStore { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{CollateralRatio, LedgerClass};

    fn key(wallet_id: WalletId) -> AccountKey {
        AccountKey {
            wallet_id,
            ledger_id: 1,
            role: RoleCode::Personal,
        }
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let backend = MemoryBackend::new();

        let mut store = backend.begin().await.unwrap();
        store
            .insert_ledger(&NewLedger {
                name: "stelo".to_string(),
                scale: 2,
                class: LedgerClass::DigitalAsset,
                value: 0,
            })
            .await
            .unwrap();
        drop(store);

        assert!(backend.snapshot().await.ledgers.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_state() {
        let backend = MemoryBackend::new();

        let mut store = backend.begin().await.unwrap();
        store
            .upsert_account(&key(1), AccountCounter::DebitsPosted, 500)
            .await
            .unwrap();
        store.commit().await.unwrap();

        let state = backend.snapshot().await;
        assert_eq!(state.accounts.len(), 1);
        assert_eq!(state.accounts[0].debits_posted, 500);
    }

    #[tokio::test]
    async fn test_upsert_adds_to_existing_row() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        let first = store
            .upsert_account(&key(1), AccountCounter::DebitsPosted, 500)
            .await
            .unwrap();
        let second = store
            .upsert_account(&key(1), AccountCounter::DebitsPosted, 300)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.state().accounts.len(), 1);
        assert_eq!(store.state().accounts[0].debits_posted, 800);
    }

    #[tokio::test]
    async fn test_increment_with_available_guard() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();
        store
            .upsert_account(&key(1), AccountCounter::DebitsPosted, 100)
            .await
            .unwrap();

        let too_much = store
            .increment_account(&key(1), AccountCounter::CreditsPosted, 101, true)
            .await
            .unwrap();
        assert!(too_much.is_none());

        let covered = store
            .increment_account(&key(1), AccountCounter::CreditsPosted, 100, true)
            .await
            .unwrap();
        assert!(covered.is_some());

        let missing = store
            .increment_account(&key(2), AccountCounter::DebitsPosted, 1, false)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_release_pending_requires_reservation() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();
        let id = store
            .upsert_account(&key(1), AccountCounter::DebitsPending, 50)
            .await
            .unwrap();

        assert!(
            !store
                .release_pending(id, AccountCounter::DebitsPending, None, 51)
                .await
                .unwrap()
        );
        assert!(
            store
                .release_pending(
                    id,
                    AccountCounter::DebitsPending,
                    Some(AccountCounter::DebitsPosted),
                    50
                )
                .await
                .unwrap()
        );

        let account = store.get_account_by_id(id).await.unwrap().unwrap();
        assert_eq!(account.debits_pending, 0);
        assert_eq!(account.debits_posted, 50);
    }

    #[tokio::test]
    async fn test_wallet_uniqueness() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();
        let personal = NewWallet {
            address: "ALPHA".to_string(),
            role: RoleCode::Personal,
            collateral_ratio: CollateralRatio::ZERO,
            location: None,
            owner_user_id: Some(7),
        };
        store.insert_wallet(&personal).await.unwrap();

        let err = store.insert_wallet(&personal).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAddress(_)));

        let second = NewWallet {
            address: "BRAVO".to_string(),
            ..personal
        };
        let err = store.insert_wallet(&second).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicatePersonalWallet(7)));
    }

    #[tokio::test]
    async fn test_conditional_status_update() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();
        let id = store
            .insert_transaction(&NewTransaction {
                debit_wallet_id: 1,
                credit_wallet_id: 2,
                code: crate::transactions::TxCode::UserToUser,
                status: TxStatus::Pending,
                memo: None,
            })
            .await
            .unwrap();

        assert!(
            store
                .update_transaction_status(id, TxStatus::Pending, TxStatus::PostPending)
                .await
                .unwrap()
        );
        assert!(
            !store
                .update_transaction_status(id, TxStatus::Pending, TxStatus::VoidPending)
                .await
                .unwrap()
        );
    }
}
