//! Transaction creation.
//!
//! A transaction is validated as a whole before any transfer is posted. The
//! only transfer posted after the asset transfers is the collateral lock of a
//! warehouse deposit, which depends on the assets actually deposited.

use super::classify::infer_tx_code;
use super::collateral::collateral_needed;
use super::models::{
    NewTransaction, TransactionId, TransferFlag, TransferInput, TxAsset, TxByAddressesInput,
    TxCode, TxInput, TxStatus,
};
use super::transfer::post_transfer;
use crate::accounts::registry::{get_wallet, get_wallet_by_address};
use crate::accounts::{Ledger, LedgerId, RoleCode, Wallet};
use crate::db::LedgerStore;
use crate::errors::{LedgerError, LedgerResult};
use crate::notify::{LedgerEvent, Notifier, publish_best_effort};

/// Validated shape of a transaction, ready to post
#[derive(Debug)]
struct Plan {
    debit_role: RoleCode,
    credit_role: RoleCode,
    /// Collateral to lock on the credited warehouse
    lock: Option<i64>,
}

fn validate_assets(assets: &[TxAsset]) -> LedgerResult<()> {
    if assets.is_empty() {
        return Err(LedgerError::EmptyTransaction);
    }
    if let Some(asset) = assets.iter().find(|a| a.amount <= 0) {
        return Err(LedgerError::InvalidAmount(asset.amount));
    }
    Ok(())
}

/// Load every ledger referenced by the assets, in asset order
async fn load_ledgers<S: LedgerStore>(
    store: &mut S,
    assets: &[TxAsset],
) -> LedgerResult<Vec<Ledger>> {
    let ids: Vec<LedgerId> = assets.iter().map(|a| a.ledger_id).collect();
    let found = store.get_ledgers(&ids).await?;
    ids.iter()
        .map(|id| {
            found
                .iter()
                .find(|l| l.id == *id)
                .cloned()
                .ok_or(LedgerError::LedgerNotFound(*id))
        })
        .collect()
}

fn plan_collateral(
    base_ledger: &Ledger,
    assets: &[TxAsset],
    debit: &Wallet,
    credit: &Wallet,
) -> LedgerResult<Plan> {
    if assets.len() != 1 {
        return Err(LedgerError::InvalidCollateralTx(
            "collateral transactions carry exactly one asset",
        ));
    }
    if assets[0].ledger_id != base_ledger.id {
        return Err(LedgerError::InvalidCollateralTx(
            "collateral must be paid in the base ledger",
        ));
    }

    let (debit_role, credit_role) = match (debit.role, credit.role) {
        (RoleCode::Warehouse, RoleCode::Warehouse) => {
            return Err(LedgerError::InvalidCollateralTx(
                "only one wallet may be a warehouse",
            ));
        }
        (RoleCode::Warehouse, other) => (RoleCode::WarehouseCollateral, other),
        (other, RoleCode::Warehouse) => (other, RoleCode::WarehouseCollateral),
        _ => {
            return Err(LedgerError::InvalidCollateralTx(
                "one wallet must be a warehouse",
            ));
        }
    };

    Ok(Plan {
        debit_role,
        credit_role,
        lock: None,
    })
}

fn plan_warehouse_transfer(
    is_pending: bool,
    ledgers: &[Ledger],
    assets: &[TxAsset],
    debit: &Wallet,
    credit: &Wallet,
) -> LedgerResult<Plan> {
    if !is_pending {
        return Err(LedgerError::InvalidWarehouseTransfer(
            "warehouse transfers must be pending",
        ));
    }
    let debit_is_warehouse = debit.role == RoleCode::Warehouse;
    let credit_is_warehouse = credit.role == RoleCode::Warehouse;
    if debit_is_warehouse == credit_is_warehouse {
        return Err(LedgerError::InvalidWarehouseTransfer(
            "exactly one wallet must be a warehouse",
        ));
    }
    if let Some(ledger) = ledgers.iter().find(|l| !l.class.is_depositable()) {
        return Err(LedgerError::InvalidWarehouseAsset(ledger.id));
    }

    // deposits into the warehouse are backed by collateral
    let lock = if credit_is_warehouse {
        let items: Vec<(i64, i64)> = ledgers
            .iter()
            .zip(assets)
            .map(|(ledger, asset)| (ledger.value, asset.amount))
            .collect();
        let needed = collateral_needed(credit.collateral_ratio, &items)?;
        (needed >= 1).then_some(needed)
    } else {
        None
    };

    Ok(Plan {
        debit_role: debit.role,
        credit_role: credit.role,
        lock,
    })
}

/// Create a transaction and post its transfers
///
/// `base_ledger` is the currency ledger collateral is held in, resolved by the
/// caller.
///
/// # Errors
///
/// * `LedgerError::EmptyTransaction` / `LedgerError::InvalidAmount` - Bad asset list
/// * `LedgerError::InvalidCollateralTx` - Malformed collateral transaction
/// * `LedgerError::InvalidWarehouseTransfer` - Malformed warehouse transfer
/// * `LedgerError::InvalidWarehouseAsset` - Asset is not depositable
/// * `LedgerError::InvalidUserToUser` - Wallets are not both user wallets
/// * `LedgerError::InvalidBalance` - A must-exist account is missing
pub async fn create_transaction<S: LedgerStore>(
    store: &mut S,
    notifier: &dyn Notifier,
    base_ledger: &Ledger,
    input: &TxInput,
) -> LedgerResult<TransactionId> {
    validate_assets(&input.assets)?;
    let debit = get_wallet(store, input.debit_wallet_id).await?;
    let credit = get_wallet(store, input.credit_wallet_id).await?;
    let ledgers = load_ledgers(store, &input.assets).await?;

    let plan = match input.code {
        TxCode::Collateral => plan_collateral(base_ledger, &input.assets, &debit, &credit)?,
        TxCode::WarehouseTransfer => {
            plan_warehouse_transfer(input.is_pending, &ledgers, &input.assets, &debit, &credit)?
        }
        TxCode::WarehouseToWarehouse => {
            if debit.role != RoleCode::Warehouse || credit.role != RoleCode::Warehouse {
                return Err(LedgerError::InvalidWarehouseTransfer(
                    "both wallets must be warehouses",
                ));
            }
            Plan {
                debit_role: debit.role,
                credit_role: credit.role,
                lock: None,
            }
        }
        TxCode::UserToUser => {
            if !debit.role.is_user() || !credit.role.is_user() {
                return Err(LedgerError::InvalidUserToUser {
                    debit_role: debit.role,
                    credit_role: credit.role,
                });
            }
            Plan {
                debit_role: debit.role,
                credit_role: credit.role,
                lock: None,
            }
        }
        TxCode::SysToUser => Plan {
            debit_role: debit.role,
            credit_role: credit.role,
            lock: None,
        },
    };

    let status = if input.is_pending {
        TxStatus::Pending
    } else {
        TxStatus::Posted
    };
    let transaction_id = store
        .insert_transaction(&NewTransaction {
            debit_wallet_id: debit.id,
            credit_wallet_id: credit.id,
            code: input.code,
            status,
            memo: input.memo.clone(),
        })
        .await?;

    let flag = if input.is_pending {
        TransferFlag::Pending
    } else {
        TransferFlag::None
    };
    for asset in &input.assets {
        post_transfer(
            store,
            &TransferInput {
                transaction_id,
                debit_wallet_id: debit.id,
                debit_role: plan.debit_role,
                credit_wallet_id: credit.id,
                credit_role: plan.credit_role,
                ledger_id: asset.ledger_id,
                amount: asset.amount,
                flag,
                code: input.code,
            },
        )
        .await?;
    }

    if let Some(amount) = plan.lock {
        log::debug!(
            "Locking {} collateral on warehouse {} for transaction {}",
            base_ledger.format_amount(amount),
            credit.address,
            transaction_id
        );
        post_transfer(
            store,
            &TransferInput {
                transaction_id,
                debit_wallet_id: credit.id,
                debit_role: RoleCode::WarehouseCollateralLocked,
                credit_wallet_id: credit.id,
                credit_role: RoleCode::WarehouseCollateral,
                ledger_id: base_ledger.id,
                amount,
                flag: TransferFlag::Pending,
                code: input.code,
            },
        )
        .await?;
    }

    log::info!(
        "Created {:?} transaction {} ({} -> {}, {} assets, {:?})",
        input.code,
        transaction_id,
        credit.address,
        debit.address,
        input.assets.len(),
        status
    );

    let event = LedgerEvent::TransactionCreated {
        transaction_id,
        code: input.code,
        status,
    };
    publish_best_effort(notifier, &debit.address, &event);
    if credit.id != debit.id {
        publish_best_effort(notifier, &credit.address, &event);
    }

    Ok(transaction_id)
}

/// Create a transaction between two addresses, inferring its code.
///
/// The receiver is debited (its balance grows) and the sender is credited.
///
/// # Errors
///
/// * `LedgerError::AddressNotFound` - Either address is unknown
/// * `LedgerError::UnclassifiableTransaction` - Role pair has no legal code
/// * Any error of [`create_transaction`]
pub async fn create_transaction_by_addresses<S: LedgerStore>(
    store: &mut S,
    notifier: &dyn Notifier,
    base_ledger: &Ledger,
    input: &TxByAddressesInput,
) -> LedgerResult<TransactionId> {
    let sender = get_wallet_by_address(store, &input.sending_address).await?;
    let receiver = get_wallet_by_address(store, &input.receiving_address).await?;
    let code = infer_tx_code(sender.role, receiver.role)
        .ok_or(LedgerError::UnclassifiableTransaction(sender.role, receiver.role))?;

    create_transaction(
        store,
        notifier,
        base_ledger,
        &TxInput {
            debit_wallet_id: receiver.id,
            credit_wallet_id: sender.id,
            code,
            memo: input.memo.clone(),
            is_pending: input.is_pending,
            assets: input.assets.clone(),
        },
    )
    .await
}
