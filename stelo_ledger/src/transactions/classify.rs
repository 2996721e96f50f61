//! Transaction code inference from wallet role pairs.

use super::models::TxCode;
use crate::accounts::RoleCode;

/// Legal undirected role pairs and the code they produce.
///
/// Collateral transactions are never inferred; callers request them explicitly.
pub const LEGAL_PAIRS: [(RoleCode, RoleCode, TxCode); 7] = [
    (RoleCode::Dal, RoleCode::General, TxCode::SysToUser),
    (RoleCode::Dal, RoleCode::Personal, TxCode::SysToUser),
    (RoleCode::General, RoleCode::General, TxCode::UserToUser),
    (RoleCode::General, RoleCode::Personal, TxCode::UserToUser),
    (RoleCode::Personal, RoleCode::Personal, TxCode::UserToUser),
    (RoleCode::Personal, RoleCode::Warehouse, TxCode::WarehouseTransfer),
    (
        RoleCode::Warehouse,
        RoleCode::Warehouse,
        TxCode::WarehouseToWarehouse,
    ),
];

/// Code for an unordered pair of wallet roles, `None` if the pair is not legal
pub fn infer_tx_code(a: RoleCode, b: RoleCode) -> Option<TxCode> {
    LEGAL_PAIRS
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_unordered() {
        for (a, b, code) in LEGAL_PAIRS {
            assert_eq!(infer_tx_code(a, b), Some(code));
            assert_eq!(infer_tx_code(b, a), Some(code));
        }
    }

    #[test]
    fn test_illegal_pairs() {
        assert_eq!(infer_tx_code(RoleCode::Dal, RoleCode::Dal), None);
        assert_eq!(infer_tx_code(RoleCode::General, RoleCode::Warehouse), None);
        assert_eq!(infer_tx_code(RoleCode::Dal, RoleCode::Warehouse), None);
        assert_eq!(
            infer_tx_code(RoleCode::Personal, RoleCode::WarehouseCollateral),
            None
        );
    }

    #[test]
    fn test_never_infers_collateral() {
        let codes: Vec<TxCode> = LEGAL_PAIRS.iter().map(|(_, _, code)| *code).collect();
        assert!(!codes.contains(&TxCode::Collateral));
    }
}
