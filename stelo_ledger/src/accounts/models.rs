//! Ledger, wallet and account data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roles::{RoleClassification, RoleCode, Side};

/// Ledger ID type
pub type LedgerId = i64;

/// Wallet ID type
pub type WalletId = i64;

/// Account ID type
pub type AccountId = i64;

/// User ID type (users are owned by the auth layer)
pub type UserId = i64;

/// Asset classification of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerClass {
    /// Exists only on the platform, like stelo itself
    DigitalAsset,
    /// Exists in the game world and can sit in a warehouse
    InWorldItem,
}

impl LedgerClass {
    pub fn code(self) -> i16 {
        match self {
            LedgerClass::DigitalAsset => 0,
            LedgerClass::InWorldItem => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(LedgerClass::DigitalAsset),
            1 => Some(LedgerClass::InWorldItem),
            _ => None,
        }
    }

    /// Whether a warehouse may custody this asset
    pub fn is_depositable(self) -> bool {
        self == LedgerClass::InWorldItem
    }
}

impl std::str::FromStr for LedgerClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "digital" | "digital_asset" => Ok(LedgerClass::DigitalAsset),
            "item" | "in_world_item" => Ok(LedgerClass::InWorldItem),
            other => Err(format!("unknown ledger class {other:?}")),
        }
    }
}

/// Ledger model (registered asset type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: LedgerId,
    pub name: String,
    /// Decimal places of one whole unit
    pub scale: i16,
    pub class: LedgerClass,
    /// Collateral value of one unit, in base-ledger units
    pub value: i64,
    pub created_at: DateTime<Utc>,
}

impl Ledger {
    /// Render a raw amount with this ledger's decimal scale
    pub fn format_amount(&self, amount: i64) -> String {
        if self.scale <= 0 {
            return amount.to_string();
        }
        let divisor = 10_i64.pow(self.scale as u32);
        let sign = if amount < 0 { "-" } else { "" };
        let abs = amount.unsigned_abs();
        let whole = abs / divisor as u64;
        let frac = abs % divisor as u64;
        format!(
            "{sign}{whole}.{frac:0width$}",
            width = self.scale as usize
        )
    }
}

/// Ledger creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedger {
    pub name: String,
    pub scale: i16,
    pub class: LedgerClass,
    pub value: i64,
}

/// Warehouse collateral ratio with three decimal places (0.000 to 9.999)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollateralRatio(u16);

impl CollateralRatio {
    pub const MAX_MILLI: u16 = 9999;
    pub const ZERO: CollateralRatio = CollateralRatio(0);

    /// Build from thousandths, rejecting values above 9.999
    pub fn from_milli(milli: i64) -> Option<Self> {
        if (0..=i64::from(Self::MAX_MILLI)).contains(&milli) {
            Some(CollateralRatio(milli as u16))
        } else {
            None
        }
    }

    pub fn milli(self) -> u16 {
        self.0
    }
}

impl std::str::FromStr for CollateralRatio {
    type Err = String;

    /// Parses decimal notation such as `0.2` or `1.125`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() || frac.len() > 3 {
            return Err(format!("invalid collateral ratio {s:?}"));
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid collateral ratio {s:?}"));
        }
        let whole: i64 = whole
            .parse()
            .map_err(|_| format!("invalid collateral ratio {s:?}"))?;
        let frac_milli: i64 = format!("{frac:0<3}")
            .parse()
            .map_err(|_| format!("invalid collateral ratio {s:?}"))?;
        whole
            .checked_mul(1000)
            .and_then(|w| w.checked_add(frac_milli))
            .and_then(CollateralRatio::from_milli)
            .ok_or_else(|| format!("collateral ratio {s} is outside 0..=9.999"))
    }
}

impl std::fmt::Display for CollateralRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// Warehouse location in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

/// Wallet model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub address: String,
    pub role: RoleCode,
    /// Zero unless the wallet is a warehouse
    pub collateral_ratio: CollateralRatio,
    pub location: Option<Location>,
    /// Owning user for personal wallets
    pub owner_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Wallet row to insert (validated by the registry)
#[derive(Debug, Clone)]
pub struct NewWallet {
    pub address: String,
    pub role: RoleCode,
    pub collateral_ratio: CollateralRatio,
    pub location: Option<Location>,
    pub owner_user_id: Option<UserId>,
}

/// Unique key of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub wallet_id: WalletId,
    pub ledger_id: LedgerId,
    pub role: RoleCode,
}

/// Account model (per wallet, per ledger, per role balance)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub wallet_id: WalletId,
    pub ledger_id: LedgerId,
    pub role: RoleCode,
    pub debits_pending: i64,
    pub debits_posted: i64,
    pub credits_pending: i64,
    pub credits_posted: i64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn key(&self) -> AccountKey {
        AccountKey {
            wallet_id: self.wallet_id,
            ledger_id: self.ledger_id,
            role: self.role,
        }
    }

    /// Posted balance minus outgoing reservations, on the natural side
    pub fn available_balance(&self) -> i64 {
        self.role.classification().available(
            self.debits_pending,
            self.debits_posted,
            self.credits_pending,
            self.credits_posted,
        )
    }

    /// Posted balance on the natural side, ignoring reservations
    pub fn posted_balance(&self) -> i64 {
        match self.role.classification() {
            RoleClassification::DebitNormal => self.debits_posted - self.credits_posted,
            RoleClassification::CreditNormal => self.credits_posted - self.debits_posted,
        }
    }

    pub fn counter(&self, counter: AccountCounter) -> i64 {
        match counter {
            AccountCounter::DebitsPending => self.debits_pending,
            AccountCounter::DebitsPosted => self.debits_posted,
            AccountCounter::CreditsPending => self.credits_pending,
            AccountCounter::CreditsPosted => self.credits_posted,
        }
    }

    pub fn counter_mut(&mut self, counter: AccountCounter) -> &mut i64 {
        match counter {
            AccountCounter::DebitsPending => &mut self.debits_pending,
            AccountCounter::DebitsPosted => &mut self.debits_posted,
            AccountCounter::CreditsPending => &mut self.credits_pending,
            AccountCounter::CreditsPosted => &mut self.credits_posted,
        }
    }
}

/// One of the four running counters of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountCounter {
    DebitsPending,
    DebitsPosted,
    CreditsPending,
    CreditsPosted,
}

impl AccountCounter {
    pub fn for_side(side: Side, pending: bool) -> Self {
        match (side, pending) {
            (Side::Debit, true) => AccountCounter::DebitsPending,
            (Side::Debit, false) => AccountCounter::DebitsPosted,
            (Side::Credit, true) => AccountCounter::CreditsPending,
            (Side::Credit, false) => AccountCounter::CreditsPosted,
        }
    }

    /// Column name in the accounts table
    pub fn column(self) -> &'static str {
        match self {
            AccountCounter::DebitsPending => "debits_pending",
            AccountCounter::DebitsPosted => "debits_posted",
            AccountCounter::CreditsPending => "credits_pending",
            AccountCounter::CreditsPosted => "credits_posted",
        }
    }
}

/// Wallet permission flags granted to a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    /// Complete control of the wallet
    pub const ADMIN: Permissions = Permissions(1);
    /// Read account balances
    pub const READ_BALANCES: Permissions = Permissions(1 << 16);

    pub fn from_bits(bits: i64) -> Self {
        Permissions(bits as u64)
    }

    pub fn bits(self) -> i64 {
        self.0 as i64
    }

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Admin implies every other permission
    pub fn allows(self, other: Permissions) -> bool {
        self.contains(Permissions::ADMIN) || self.contains(other)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(role: RoleCode) -> Account {
        Account {
            id: 1,
            wallet_id: 1,
            ledger_id: 1,
            role,
            debits_pending: 0,
            debits_posted: 0,
            credits_pending: 0,
            credits_posted: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_collateral_ratio_parse() {
        assert_eq!("0.2".parse::<CollateralRatio>().unwrap().milli(), 200);
        assert_eq!("1.125".parse::<CollateralRatio>().unwrap().milli(), 1125);
        assert_eq!("9.999".parse::<CollateralRatio>().unwrap().milli(), 9999);
        assert_eq!("3".parse::<CollateralRatio>().unwrap().milli(), 3000);
        assert!("10".parse::<CollateralRatio>().is_err());
        assert!("0.2345".parse::<CollateralRatio>().is_err());
        assert!("-1".parse::<CollateralRatio>().is_err());
        assert!(".5".parse::<CollateralRatio>().is_err());
    }

    #[test]
    fn test_collateral_ratio_bounds() {
        assert!(CollateralRatio::from_milli(0).is_some());
        assert!(CollateralRatio::from_milli(9999).is_some());
        assert!(CollateralRatio::from_milli(10_000).is_none());
        assert!(CollateralRatio::from_milli(-1).is_none());
        assert_eq!(CollateralRatio::from_milli(250).unwrap().to_string(), "0.250");
    }

    #[test]
    fn test_available_balance_by_role() {
        let mut personal = account(RoleCode::Personal);
        personal.debits_posted = 800;
        personal.credits_pending = 100;
        assert_eq!(personal.available_balance(), 700);
        assert_eq!(personal.posted_balance(), 800);

        let mut dal = account(RoleCode::Dal);
        dal.credits_posted = 800;
        dal.debits_posted = 300;
        assert_eq!(dal.available_balance(), 500);
    }

    #[test]
    fn test_counter_for_side() {
        assert_eq!(
            AccountCounter::for_side(Side::Debit, true),
            AccountCounter::DebitsPending
        );
        assert_eq!(
            AccountCounter::for_side(Side::Credit, false),
            AccountCounter::CreditsPosted
        );
        let mut acc = account(RoleCode::General);
        *acc.counter_mut(AccountCounter::CreditsPending) += 7;
        assert_eq!(acc.counter(AccountCounter::CreditsPending), 7);
    }

    #[test]
    fn test_format_amount() {
        let ledger = Ledger {
            id: 1,
            name: "stelo".to_string(),
            scale: 2,
            class: LedgerClass::DigitalAsset,
            value: 0,
            created_at: Utc::now(),
        };
        assert_eq!(ledger.format_amount(12345), "123.45");
        assert_eq!(ledger.format_amount(5), "0.05");
        assert_eq!(ledger.format_amount(-150), "-1.50");
    }

    #[test]
    fn test_permissions() {
        let perms = Permissions::READ_BALANCES;
        assert!(perms.allows(Permissions::READ_BALANCES));
        assert!(!perms.allows(Permissions::ADMIN));
        assert!(Permissions::ADMIN.allows(Permissions::READ_BALANCES));
        let both = Permissions::ADMIN | Permissions::READ_BALANCES;
        assert_eq!(Permissions::from_bits(both.bits()), both);
    }

    #[test]
    fn test_ledger_class() {
        assert!(LedgerClass::InWorldItem.is_depositable());
        assert!(!LedgerClass::DigitalAsset.is_depositable());
        assert_eq!("item".parse::<LedgerClass>(), Ok(LedgerClass::InWorldItem));
        assert_eq!(LedgerClass::from_code(LedgerClass::DigitalAsset.code()), Some(LedgerClass::DigitalAsset));
    }
}
