//! Single-asset transfer posting.

use super::models::{NewTransfer, TransferFlag, TransferId, TransferInput};
use crate::accounts::{AccountCounter, AccountId, AccountKey, LedgerId, RoleCode, Side, WalletId};
use crate::db::LedgerStore;
use crate::errors::{LedgerError, LedgerResult};

/// Post one side of a transfer and return the touched account.
///
/// The side that increases the role's natural balance creates the account on
/// first use. The other side requires an existing account whose available
/// balance covers `amount`.
pub async fn post_side<S: LedgerStore>(
    store: &mut S,
    side: Side,
    wallet_id: WalletId,
    role: RoleCode,
    ledger_id: LedgerId,
    amount: i64,
    pending: bool,
) -> LedgerResult<AccountId> {
    let key = AccountKey {
        wallet_id,
        ledger_id,
        role,
    };
    let counter = AccountCounter::for_side(side, pending);

    if role.classification().creates_on(side) {
        if let Some(id) = store.increment_account(&key, counter, amount, false).await? {
            return Ok(id);
        }
        log::debug!(
            "Creating {} account for wallet {} on ledger {}",
            role,
            wallet_id,
            ledger_id
        );
        return store.upsert_account(&key, counter, amount).await;
    }

    if let Some(id) = store.increment_account(&key, counter, amount, true).await? {
        return Ok(id);
    }

    match store.get_account(&key).await? {
        None => Err(LedgerError::InvalidBalance {
            wallet_id,
            ledger_id,
            role,
        }),
        Some(account) => Err(LedgerError::InsufficientBalance {
            wallet_id,
            ledger_id,
            available: account.available_balance(),
            required: amount,
        }),
    }
}

/// Post a transfer between two (wallet, role) pairs
///
/// # Errors
///
/// * `LedgerError::InvalidAmount` - Amount is not positive
/// * `LedgerError::InvalidTransferFlag` - Flag is a settlement flag
/// * `LedgerError::InvalidBalance` - Must-exist account is missing
/// * `LedgerError::InsufficientBalance` - Must-exist account cannot cover the amount
pub async fn post_transfer<S: LedgerStore>(
    store: &mut S,
    input: &TransferInput,
) -> LedgerResult<TransferId> {
    if input.amount <= 0 {
        return Err(LedgerError::InvalidAmount(input.amount));
    }
    let pending = match input.flag {
        TransferFlag::None => false,
        TransferFlag::Pending => true,
        other => return Err(LedgerError::InvalidTransferFlag(other)),
    };

    let debit_account_id = post_side(
        store,
        Side::Debit,
        input.debit_wallet_id,
        input.debit_role,
        input.ledger_id,
        input.amount,
        pending,
    )
    .await?;
    let credit_account_id = post_side(
        store,
        Side::Credit,
        input.credit_wallet_id,
        input.credit_role,
        input.ledger_id,
        input.amount,
        pending,
    )
    .await?;

    store
        .insert_transfer(&NewTransfer {
            transaction_id: input.transaction_id,
            debit_account_id,
            credit_account_id,
            ledger_id: input.ledger_id,
            amount: input.amount,
            code: input.code,
            flag: input.flag,
            pending_ref_id: None,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LedgerBackend, MemoryBackend};
    use crate::transactions::TxCode;

    const LEDGER: LedgerId = 1;

    fn transfer(debit: (WalletId, RoleCode), credit: (WalletId, RoleCode), amount: i64) -> TransferInput {
        TransferInput {
            transaction_id: 1,
            debit_wallet_id: debit.0,
            debit_role: debit.1,
            credit_wallet_id: credit.0,
            credit_role: credit.1,
            ledger_id: LEDGER,
            amount,
            flag: TransferFlag::None,
            code: TxCode::SysToUser,
        }
    }

    fn key(wallet_id: WalletId, role: RoleCode) -> AccountKey {
        AccountKey {
            wallet_id,
            ledger_id: LEDGER,
            role,
        }
    }

    #[tokio::test]
    async fn test_increasing_sides_are_created() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        // mint: user debited, system credited
        post_transfer(
            &mut store,
            &transfer((2, RoleCode::Personal), (1, RoleCode::Dal), 500),
        )
        .await
        .unwrap();

        let user = store.get_account(&key(2, RoleCode::Personal)).await.unwrap().unwrap();
        let dal = store.get_account(&key(1, RoleCode::Dal)).await.unwrap().unwrap();
        assert_eq!(user.debits_posted, 500);
        assert_eq!(dal.credits_posted, 500);
        assert_eq!(user.available_balance(), 500);
        assert_eq!(dal.available_balance(), 500);
        assert_eq!(store.state().transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_decreasing_side_must_exist() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        let err = post_transfer(
            &mut store,
            &transfer((3, RoleCode::General), (2, RoleCode::Personal), 10),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidBalance {
                wallet_id: 2,
                role: RoleCode::Personal,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_decreasing_side_needs_available_balance() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        post_transfer(
            &mut store,
            &transfer((2, RoleCode::Personal), (1, RoleCode::Dal), 50),
        )
        .await
        .unwrap();

        let err = post_transfer(
            &mut store,
            &transfer((3, RoleCode::General), (2, RoleCode::Personal), 80),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                available: 50,
                required: 80,
                ..
            }
        ));

        post_transfer(
            &mut store,
            &transfer((3, RoleCode::General), (2, RoleCode::Personal), 50),
        )
        .await
        .unwrap();
        let sender = store.get_account(&key(2, RoleCode::Personal)).await.unwrap().unwrap();
        assert_eq!(sender.available_balance(), 0);
    }

    #[tokio::test]
    async fn test_pending_reserves_on_both_sides() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        post_transfer(
            &mut store,
            &transfer((2, RoleCode::Personal), (1, RoleCode::Dal), 100),
        )
        .await
        .unwrap();

        let mut reserve = transfer((3, RoleCode::General), (2, RoleCode::Personal), 60);
        reserve.flag = TransferFlag::Pending;
        post_transfer(&mut store, &reserve).await.unwrap();

        let sender = store.get_account(&key(2, RoleCode::Personal)).await.unwrap().unwrap();
        let receiver = store.get_account(&key(3, RoleCode::General)).await.unwrap().unwrap();
        assert_eq!(sender.credits_pending, 60);
        assert_eq!(sender.available_balance(), 40);
        assert_eq!(receiver.debits_pending, 60);
        // reservations are not spendable by the receiver
        assert_eq!(receiver.available_balance(), 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_amount_and_flag() {
        let backend = MemoryBackend::new();
        let mut store = backend.begin().await.unwrap();

        let err = post_transfer(
            &mut store,
            &transfer((2, RoleCode::Personal), (1, RoleCode::Dal), 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(0)));

        let mut settle = transfer((2, RoleCode::Personal), (1, RoleCode::Dal), 5);
        settle.flag = TransferFlag::PostPending;
        let err = post_transfer(&mut store, &settle).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransferFlag(TransferFlag::PostPending)
        ));
        assert!(store.state().accounts.is_empty());
    }
}
