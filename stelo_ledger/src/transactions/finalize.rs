//! Settlement of pending transactions.

use super::models::{NewTransfer, TransactionId, Transfer, TransferFlag, TxStatus};
use crate::accounts::{AccountCounter, AccountId};
use crate::accounts::registry::get_wallet;
use crate::db::LedgerStore;
use crate::errors::{LedgerError, LedgerResult};
use crate::notify::{LedgerEvent, Notifier, publish_best_effort};

async fn release<S: LedgerStore>(
    store: &mut S,
    account_id: AccountId,
    pending: AccountCounter,
    posted: Option<AccountCounter>,
    amount: i64,
) -> LedgerResult<()> {
    if store.release_pending(account_id, pending, posted, amount).await? {
        return Ok(());
    }
    match store.get_account_by_id(account_id).await? {
        None => Err(LedgerError::AccountNotFound(account_id)),
        Some(_) => Err(LedgerError::CorruptRow(format!(
            "account {account_id} holds less than {amount} in {}",
            pending.column()
        ))),
    }
}

async fn settle<S: LedgerStore>(
    store: &mut S,
    reservation: &Transfer,
    target: TxStatus,
) -> LedgerResult<()> {
    let (flag, post) = match target {
        TxStatus::PostPending => (TransferFlag::PostPending, true),
        _ => (TransferFlag::VoidPending, false),
    };

    release(
        store,
        reservation.debit_account_id,
        AccountCounter::DebitsPending,
        post.then_some(AccountCounter::DebitsPosted),
        reservation.amount,
    )
    .await?;
    release(
        store,
        reservation.credit_account_id,
        AccountCounter::CreditsPending,
        post.then_some(AccountCounter::CreditsPosted),
        reservation.amount,
    )
    .await?;

    store
        .insert_transfer(&NewTransfer {
            transaction_id: reservation.transaction_id,
            debit_account_id: reservation.debit_account_id,
            credit_account_id: reservation.credit_account_id,
            ledger_id: reservation.ledger_id,
            amount: reservation.amount,
            code: reservation.code,
            flag,
            pending_ref_id: Some(reservation.id),
        })
        .await?;
    Ok(())
}

/// Approve or reject a pending transaction
///
/// The `Pending -> target` status write is a single guarded update, so
/// concurrent or repeated calls succeed at most once.
///
/// # Errors
///
/// * `LedgerError::InvalidFinalizeStatus` - Target is not PostPending or VoidPending
/// * `LedgerError::TransactionNotFound` - No such transaction
/// * `LedgerError::TransactionNotPending` - Already finalized or never pending
/// * `LedgerError::UnexpectedNonPendingTransfer` - Stored transfers are inconsistent
pub async fn finalize_transaction<S: LedgerStore>(
    store: &mut S,
    notifier: &dyn Notifier,
    transaction_id: TransactionId,
    target: TxStatus,
) -> LedgerResult<()> {
    if !matches!(target, TxStatus::PostPending | TxStatus::VoidPending) {
        return Err(LedgerError::InvalidFinalizeStatus(target));
    }

    if !store
        .update_transaction_status(transaction_id, TxStatus::Pending, target)
        .await?
    {
        return match store.get_transaction(transaction_id).await? {
            None => Err(LedgerError::TransactionNotFound(transaction_id)),
            Some(_) => Err(LedgerError::TransactionNotPending(transaction_id)),
        };
    }

    let reservations: Vec<Transfer> = store
        .get_transfers_by_transaction(transaction_id)
        .await?
        .into_iter()
        .filter(|t| t.pending_ref_id.is_none())
        .collect();
    if let Some(t) = reservations.iter().find(|t| !t.flag.is_pending()) {
        return Err(LedgerError::UnexpectedNonPendingTransfer(t.id));
    }

    for reservation in &reservations {
        settle(store, reservation, target).await?;
    }

    let transaction = store
        .get_transaction(transaction_id)
        .await?
        .ok_or(LedgerError::TransactionNotFound(transaction_id))?;
    let debit = get_wallet(store, transaction.debit_wallet_id).await?;
    let credit = get_wallet(store, transaction.credit_wallet_id).await?;

    log::info!(
        "Finalized transaction {} as {:?} ({} transfers)",
        transaction_id,
        target,
        reservations.len()
    );

    let event = LedgerEvent::TransactionFinalized {
        transaction_id,
        status: target,
    };
    publish_best_effort(notifier, &debit.address, &event);
    if credit.id != debit.id {
        publish_best_effort(notifier, &credit.address, &event);
    }
    Ok(())
}
