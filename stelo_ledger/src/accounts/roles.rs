//! Role codes and their normal-side classification.
//!
//! Every role is described once in [`ROLES`]. Adding a role means adding a
//! variant and one table row; posting logic only asks the table.

use serde::{Deserialize, Serialize};

/// Which side of a transfer increases an account's natural balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleClassification {
    /// Liability accounts: credits increase the balance
    CreditNormal,
    /// Asset accounts: debits increase the balance
    DebitNormal,
}

/// Side of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Debit,
    Credit,
}

impl RoleClassification {
    /// Whether posting on `side` may create the account.
    ///
    /// The increasing side of an account gets get-or-create semantics. The
    /// decreasing side requires the account to exist already.
    pub fn creates_on(self, side: Side) -> bool {
        matches!(
            (self, side),
            (RoleClassification::DebitNormal, Side::Debit)
                | (RoleClassification::CreditNormal, Side::Credit)
        )
    }

    /// Available balance for an account with the given counters
    pub fn available(
        self,
        debits_pending: i64,
        debits_posted: i64,
        credits_pending: i64,
        credits_posted: i64,
    ) -> i64 {
        match self {
            RoleClassification::DebitNormal => debits_posted - credits_pending - credits_posted,
            RoleClassification::CreditNormal => credits_posted - debits_pending - debits_posted,
        }
    }
}

/// Range a role code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleGroup {
    /// 0-99
    System,
    /// 100-199
    User,
    /// 200-299
    Warehouse,
}

/// Role code of a wallet or account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleCode {
    /// Digital asset liability (system issuer)
    Dal,
    General,
    Personal,
    /// Warehouse custody liability
    Warehouse,
    /// Free warehouse collateral
    WarehouseCollateral,
    /// Warehouse collateral locked against deposits
    WarehouseCollateralLocked,
}

/// Table row describing one role
#[derive(Debug)]
pub struct RoleSpec {
    pub role: RoleCode,
    pub code: i16,
    pub name: &'static str,
    pub classification: RoleClassification,
    pub group: RoleGroup,
    /// May be used as the role of a wallet (not only of an account)
    pub wallet_role: bool,
}

pub const ROLES: [RoleSpec; 6] = [
    RoleSpec {
        role: RoleCode::Dal,
        code: 0,
        name: "dal",
        classification: RoleClassification::CreditNormal,
        group: RoleGroup::System,
        wallet_role: true,
    },
    RoleSpec {
        role: RoleCode::General,
        code: 100,
        name: "general",
        classification: RoleClassification::DebitNormal,
        group: RoleGroup::User,
        wallet_role: true,
    },
    RoleSpec {
        role: RoleCode::Personal,
        code: 101,
        name: "personal",
        classification: RoleClassification::DebitNormal,
        group: RoleGroup::User,
        wallet_role: true,
    },
    RoleSpec {
        role: RoleCode::Warehouse,
        code: 200,
        name: "warehouse",
        classification: RoleClassification::CreditNormal,
        group: RoleGroup::Warehouse,
        wallet_role: true,
    },
    RoleSpec {
        role: RoleCode::WarehouseCollateral,
        code: 201,
        name: "warehouse_collateral",
        classification: RoleClassification::DebitNormal,
        group: RoleGroup::Warehouse,
        wallet_role: false,
    },
    RoleSpec {
        role: RoleCode::WarehouseCollateralLocked,
        code: 202,
        name: "warehouse_collateral_locked",
        classification: RoleClassification::DebitNormal,
        group: RoleGroup::Warehouse,
        wallet_role: false,
    },
];

impl RoleCode {
    pub fn spec(self) -> &'static RoleSpec {
        ROLES
            .iter()
            .find(|spec| spec.role == self)
            .expect("role table covers every RoleCode")
    }

    /// Numeric code as stored
    pub fn code(self) -> i16 {
        self.spec().code
    }

    pub fn from_code(code: i16) -> Option<Self> {
        ROLES.iter().find(|spec| spec.code == code).map(|spec| spec.role)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ROLES
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .map(|spec| spec.role)
    }

    pub fn classification(self) -> RoleClassification {
        self.spec().classification
    }

    pub fn group(self) -> RoleGroup {
        self.spec().group
    }

    /// General or personal wallet role
    pub fn is_user(self) -> bool {
        self.group() == RoleGroup::User
    }

    pub fn is_wallet_role(self) -> bool {
        self.spec().wallet_role
    }
}

impl std::fmt::Display for RoleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_role_has_a_unique_row() {
        for spec in &ROLES {
            assert_eq!(spec.role.spec().code, spec.code);
            assert_eq!(RoleCode::from_code(spec.code), Some(spec.role));
            assert_eq!(ROLES.iter().filter(|s| s.code == spec.code).count(), 1);
        }
    }

    #[test]
    fn test_groups_follow_code_ranges() {
        for spec in &ROLES {
            let expected = match spec.code {
                0..=99 => RoleGroup::System,
                100..=199 => RoleGroup::User,
                _ => RoleGroup::Warehouse,
            };
            assert_eq!(spec.group, expected, "{}", spec.name);
        }
    }

    #[test]
    fn test_liabilities_are_credit_normal() {
        assert_eq!(
            RoleCode::Dal.classification(),
            RoleClassification::CreditNormal
        );
        assert_eq!(
            RoleCode::Warehouse.classification(),
            RoleClassification::CreditNormal
        );
        assert_eq!(
            RoleCode::Personal.classification(),
            RoleClassification::DebitNormal
        );
        assert_eq!(
            RoleCode::WarehouseCollateralLocked.classification(),
            RoleClassification::DebitNormal
        );
    }

    #[test]
    fn test_creates_on_increasing_side_only() {
        let debit = RoleClassification::DebitNormal;
        let credit = RoleClassification::CreditNormal;
        assert!(debit.creates_on(Side::Debit));
        assert!(!debit.creates_on(Side::Credit));
        assert!(credit.creates_on(Side::Credit));
        assert!(!credit.creates_on(Side::Debit));
    }

    #[test]
    fn test_available_balance() {
        let debit = RoleClassification::DebitNormal;
        // pending debits are not yet available
        assert_eq!(debit.available(50, 500, 20, 100), 380);

        let credit = RoleClassification::CreditNormal;
        assert_eq!(credit.available(20, 100, 50, 500), 380);
    }

    #[test]
    fn test_user_codes() {
        assert!(RoleCode::General.is_user());
        assert!(RoleCode::Personal.is_user());
        assert!(!RoleCode::Dal.is_user());
        assert!(!RoleCode::Warehouse.is_user());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(RoleCode::from_name("WAREHOUSE"), Some(RoleCode::Warehouse));
        assert_eq!(RoleCode::from_name("dal"), Some(RoleCode::Dal));
        assert_eq!(RoleCode::from_name("bank"), None);
    }
}
