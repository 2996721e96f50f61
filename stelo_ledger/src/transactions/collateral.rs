//! Collateral requirement for warehouse deposits.

use crate::accounts::CollateralRatio;
use crate::errors::{LedgerError, LedgerResult};

/// Base-ledger units a warehouse must lock to back a deposit.
///
/// `items` holds `(unit value, amount)` per deposited asset. The product with
/// the ratio is truncated toward zero, never rounded.
pub fn collateral_needed(ratio: CollateralRatio, items: &[(i64, i64)]) -> LedgerResult<i64> {
    let mut total: i128 = 0;
    for &(value, amount) in items {
        total = i128::from(value)
            .checked_mul(i128::from(amount))
            .and_then(|worth| total.checked_add(worth))
            .ok_or(LedgerError::BalanceOverflow)?;
    }
    let needed = total
        .checked_mul(i128::from(ratio.milli()))
        .ok_or(LedgerError::BalanceOverflow)?
        / 1000;
    i64::try_from(needed).map_err(|_| LedgerError::BalanceOverflow)
}
