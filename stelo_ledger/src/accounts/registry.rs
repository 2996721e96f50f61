//! Ledger and wallet registries.
//!
//! Ledgers are reference data created administratively. Wallets are created
//! once per actor; creation validates the address, role-specific settings and
//! the one-personal-wallet-per-user rule.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::models::{
    CollateralRatio, Ledger, LedgerId, Location, NewLedger, NewWallet, Permissions, UserId,
    Wallet, WalletId,
};
use super::roles::RoleCode;
use crate::db::LedgerStore;
use crate::errors::{LedgerError, LedgerResult};

/// Maximum wallet address length
pub const MAX_ADDRESS_LENGTH: usize = 16;

/// Length of generated addresses (20^9, about 512 billion variants)
pub const GENERATED_ADDRESS_LENGTH: usize = 9;

/// Letters that are hard to confuse with each other
pub const ADDRESS_ALPHABET: &[u8] = b"ABCDEFGHJKMNPRTUVWXY";

const MAX_ADDRESS_ATTEMPTS: usize = 8;

/// Highest decimal scale a ledger may use
pub const MAX_LEDGER_SCALE: i16 = 18;

/// Wallet creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletInput {
    /// User receiving admin permission on the wallet
    pub user_id: UserId,
    /// Requested address; generated when absent
    pub address: Option<String>,
    pub role: RoleCode,
    pub collateral_ratio: CollateralRatio,
    pub location: Option<Location>,
}

impl CreateWalletInput {
    pub fn new(user_id: UserId, role: RoleCode) -> Self {
        Self {
            user_id,
            address: None,
            role,
            collateral_ratio: CollateralRatio::ZERO,
            location: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn warehouse(user_id: UserId, collateral_ratio: CollateralRatio, location: Location) -> Self {
        Self {
            user_id,
            address: None,
            role: RoleCode::Warehouse,
            collateral_ratio,
            location: Some(location),
        }
    }
}

/// Upper-case an address and check it is 1 to 16 letters A-Z
pub fn normalize_address(raw: &str) -> LedgerResult<String> {
    let address = raw.trim().to_ascii_uppercase();
    if address.is_empty()
        || address.len() > MAX_ADDRESS_LENGTH
        || !address.bytes().all(|b| b.is_ascii_uppercase())
    {
        return Err(LedgerError::InvalidAddress(raw.to_string()));
    }
    Ok(address)
}

/// Random address from [`ADDRESS_ALPHABET`]
pub fn generate_address() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_ADDRESS_LENGTH)
        .map(|_| ADDRESS_ALPHABET[rng.random_range(0..ADDRESS_ALPHABET.len())] as char)
        .collect()
}

fn validate_role_settings(input: &CreateWalletInput) -> LedgerResult<()> {
    if !input.role.is_wallet_role() {
        return Err(LedgerError::InvalidConfiguration(format!(
            "{} is an account role, not a wallet role",
            input.role
        )));
    }
    if input.role != RoleCode::Warehouse {
        if input.collateral_ratio != CollateralRatio::ZERO {
            return Err(LedgerError::InvalidConfiguration(
                "collateral ratio only applies to warehouses".to_string(),
            ));
        }
        if input.location.is_some() {
            return Err(LedgerError::InvalidConfiguration(
                "location only applies to warehouses".to_string(),
            ));
        }
    }
    Ok(())
}

/// Create a wallet and grant its creator admin permission
///
/// # Errors
///
/// * `LedgerError::InvalidAddress` - Address fails charset or length rules
/// * `LedgerError::InvalidConfiguration` - Role settings are inconsistent
/// * `LedgerError::DuplicatePersonalWallet` - User already has a personal wallet
/// * `LedgerError::DuplicateAddress` - Requested address is taken
pub async fn create_wallet<S: LedgerStore>(
    store: &mut S,
    input: &CreateWalletInput,
) -> LedgerResult<Wallet> {
    validate_role_settings(input)?;

    let owner_user_id = if input.role == RoleCode::Personal {
        if store.find_personal_wallet(input.user_id).await?.is_some() {
            return Err(LedgerError::DuplicatePersonalWallet(input.user_id));
        }
        Some(input.user_id)
    } else {
        None
    };

    let address = match &input.address {
        Some(raw) => normalize_address(raw)?,
        None => {
            let mut candidate = generate_address();
            let mut attempts = 1;
            while store.get_wallet_by_address(&candidate).await?.is_some() {
                if attempts == MAX_ADDRESS_ATTEMPTS {
                    return Err(LedgerError::DuplicateAddress(candidate));
                }
                candidate = generate_address();
                attempts += 1;
            }
            candidate
        }
    };

    let wallet = store
        .insert_wallet(&NewWallet {
            address,
            role: input.role,
            collateral_ratio: input.collateral_ratio,
            location: input.location,
            owner_user_id,
        })
        .await?;

    store
        .grant_permissions(wallet.id, input.user_id, Permissions::ADMIN)
        .await?;

    log::info!(
        "Created {} wallet {} ({}) for user {}",
        wallet.role,
        wallet.id,
        wallet.address,
        input.user_id
    );
    Ok(wallet)
}

/// Register a new ledger
pub async fn create_ledger<S: LedgerStore>(store: &mut S, ledger: &NewLedger) -> LedgerResult<Ledger> {
    if ledger.name.trim().is_empty() {
        return Err(LedgerError::InvalidConfiguration(
            "ledger name must not be empty".to_string(),
        ));
    }
    if !(0..=MAX_LEDGER_SCALE).contains(&ledger.scale) {
        return Err(LedgerError::InvalidConfiguration(format!(
            "ledger scale {} is outside 0..={MAX_LEDGER_SCALE}",
            ledger.scale
        )));
    }
    if ledger.value < 0 {
        return Err(LedgerError::InvalidConfiguration(format!(
            "ledger value {} must not be negative",
            ledger.value
        )));
    }

    let created = store.insert_ledger(ledger).await?;
    log::info!("Created ledger {} ({})", created.id, created.name);
    Ok(created)
}

pub async fn get_ledger<S: LedgerStore>(store: &mut S, id: LedgerId) -> LedgerResult<Ledger> {
    store
        .get_ledger(id)
        .await?
        .ok_or(LedgerError::LedgerNotFound(id))
}

pub async fn get_ledger_by_name<S: LedgerStore>(store: &mut S, name: &str) -> LedgerResult<Ledger> {
    store
        .get_ledger_by_name(name)
        .await?
        .ok_or_else(|| LedgerError::LedgerNameNotFound(name.to_string()))
}

pub async fn get_wallet<S: LedgerStore>(store: &mut S, id: WalletId) -> LedgerResult<Wallet> {
    store
        .get_wallet(id)
        .await?
        .ok_or(LedgerError::WalletNotFound(id))
}

/// Find wallet by address; the lookup is case-insensitive
pub async fn get_wallet_by_address<S: LedgerStore>(
    store: &mut S,
    address: &str,
) -> LedgerResult<Wallet> {
    let normalized = normalize_address(address)?;
    store
        .get_wallet_by_address(&normalized)
        .await?
        .ok_or(LedgerError::AddressNotFound(normalized))
}
