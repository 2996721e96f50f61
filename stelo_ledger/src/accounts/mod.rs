//! Ledgers, wallets and accounts.
//!
//! This module implements:
//! - The role table deciding which side of a transfer increases an account
//! - Ledger and wallet data models
//! - Ledger and wallet registries (creation and lookup)

pub mod models;
pub mod registry;
pub mod roles;

pub use models::{
    Account, AccountCounter, AccountId, AccountKey, CollateralRatio, Ledger, LedgerClass,
    LedgerId, Location, NewLedger, NewWallet, Permissions, UserId, Wallet, WalletId,
};
pub use registry::{CreateWalletInput, generate_address, normalize_address};
pub use roles::{ROLES, RoleClassification, RoleCode, RoleGroup, RoleSpec, Side};
