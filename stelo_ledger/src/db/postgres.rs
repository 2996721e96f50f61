//! PostgreSQL implementation of the ledger store.
#![allow(clippy::needless_raw_string_hashes)]

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::store::{LedgerBackend, LedgerStore};
use super::timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_timeout};
use crate::accounts::{
    Account, AccountCounter, AccountId, AccountKey, CollateralRatio, Ledger, LedgerClass,
    LedgerId, Location, NewLedger, NewWallet, Permissions, RoleClassification, RoleCode, UserId,
    Wallet, WalletId,
};
use crate::errors::{LedgerError, LedgerResult};
use crate::transactions::{
    NewTransaction, NewTransfer, Transaction as LedgerTransaction, TransactionId, Transfer,
    TransferFlag, TransferId, TxCode, TxStatus,
};

const WALLET_COLUMNS: &str = "id, address, code, collateral_ratio_milli, location_x, location_y, owner_user_id, created_at";
const ACCOUNT_COLUMNS: &str = "id, wallet_id, ledger_id, code, debits_pending, debits_posted, credits_pending, credits_posted, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, debit_wallet_id, credit_wallet_id, code, status, memo, created_at";
const TRANSFER_COLUMNS: &str = "id, transaction_id, debit_account_id, credit_account_id, ledger_id, amount, code, flag, pending_ref_id, created_at";

/// Backend handing out PostgreSQL transactions from a pool
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    begin_timeout: Duration,
    serializable: bool,
}

impl PgBackend {
    /// Create a backend over a connection pool
    ///
    /// Transactions run at SERIALIZABLE isolation by default, which rules out
    /// write skew between collateral locks and concurrent ratio reads.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            begin_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            serializable: true,
        }
    }

    /// Use the database default isolation level (read committed)
    pub fn with_default_isolation(mut self) -> Self {
        self.serializable = false;
        self
    }

    /// Deadline for acquiring a connection and opening a transaction
    pub fn with_begin_timeout(mut self, timeout: Duration) -> Self {
        self.begin_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerBackend for PgBackend {
    type Store = PgLedgerStore;

    async fn begin(&self) -> LedgerResult<PgLedgerStore> {
        let mut tx = with_timeout(self.begin_timeout, self.pool.begin()).await?;
        if self.serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }
        Ok(PgLedgerStore { tx })
    }
}

/// Ledger store bound to one open PostgreSQL transaction
pub struct PgLedgerStore {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerStore {
    /// Wrap a transaction opened by the caller
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    /// Roll back explicitly (dropping the store has the same effect)
    pub async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> LedgerError {
    LedgerError::CorruptRow(format!("unknown {what} {value}"))
}

fn ledger_from_row(row: &PgRow) -> LedgerResult<Ledger> {
    let class: i16 = row.get("class");
    Ok(Ledger {
        id: row.get("id"),
        name: row.get("name"),
        scale: row.get("scale"),
        class: LedgerClass::from_code(class).ok_or_else(|| corrupt("ledger class", class))?,
        value: row.get("value"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn wallet_from_row(row: &PgRow) -> LedgerResult<Wallet> {
    let code: i16 = row.get("code");
    let ratio: i16 = row.get("collateral_ratio_milli");
    let location = match (
        row.get::<Option<f64>, _>("location_x"),
        row.get::<Option<f64>, _>("location_y"),
    ) {
        (Some(x), Some(y)) => Some(Location { x, y }),
        _ => None,
    };

    Ok(Wallet {
        id: row.get("id"),
        address: row.get("address"),
        role: RoleCode::from_code(code).ok_or_else(|| corrupt("role code", code))?,
        collateral_ratio: CollateralRatio::from_milli(i64::from(ratio))
            .ok_or_else(|| corrupt("collateral ratio", ratio))?,
        location,
        owner_user_id: row.get("owner_user_id"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn account_from_row(row: &PgRow) -> LedgerResult<Account> {
    let code: i16 = row.get("code");
    Ok(Account {
        id: row.get("id"),
        wallet_id: row.get("wallet_id"),
        ledger_id: row.get("ledger_id"),
        role: RoleCode::from_code(code).ok_or_else(|| corrupt("role code", code))?,
        debits_pending: row.get("debits_pending"),
        debits_posted: row.get("debits_posted"),
        credits_pending: row.get("credits_pending"),
        credits_posted: row.get("credits_posted"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn transaction_from_row(row: &PgRow) -> LedgerResult<LedgerTransaction> {
    let code: i16 = row.get("code");
    let status: i16 = row.get("status");
    Ok(LedgerTransaction {
        id: row.get("id"),
        debit_wallet_id: row.get("debit_wallet_id"),
        credit_wallet_id: row.get("credit_wallet_id"),
        code: TxCode::from_code(code).ok_or_else(|| corrupt("transaction code", code))?,
        status: TxStatus::from_code(status).ok_or_else(|| corrupt("transaction status", status))?,
        memo: row.get("memo"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn transfer_from_row(row: &PgRow) -> LedgerResult<Transfer> {
    let code: i16 = row.get("code");
    let flag: i16 = row.get("flag");
    Ok(Transfer {
        id: row.get("id"),
        transaction_id: row.get("transaction_id"),
        debit_account_id: row.get("debit_account_id"),
        credit_account_id: row.get("credit_account_id"),
        ledger_id: row.get("ledger_id"),
        amount: row.get("amount"),
        code: TxCode::from_code(code).ok_or_else(|| corrupt("transaction code", code))?,
        flag: TransferFlag::from_code(flag).ok_or_else(|| corrupt("transfer flag", flag))?,
        pending_ref_id: row.get("pending_ref_id"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

/// Name of the constraint a failed statement violated, if any
fn violated_constraint(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.constraint())
        .map(str::to_owned)
}

/// SQL predicate true when the account's available balance covers `$1`
fn available_covers(classification: RoleClassification) -> &'static str {
    match classification {
        RoleClassification::DebitNormal => "debits_posted - credits_pending - credits_posted >= $1",
        RoleClassification::CreditNormal => "credits_posted - debits_pending - debits_posted >= $1",
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_ledger(&mut self, ledger: &NewLedger) -> LedgerResult<Ledger> {
        let row = sqlx::query(
            r#"
            INSERT INTO ledgers (name, scale, class, value)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, scale, class, value, created_at
            "#,
        )
        .bind(&ledger.name)
        .bind(ledger.scale)
        .bind(ledger.class.code())
        .bind(ledger.value)
        .fetch_one(&mut *self.tx)
        .await;

        match row {
            Ok(row) => ledger_from_row(&row),
            Err(e) if violated_constraint(&e).as_deref() == Some("ledgers_name_key") => Err(
                LedgerError::InvalidConfiguration(format!("ledger {:?} already exists", ledger.name)),
            ),
            Err(e) => Err(LedgerError::Database(e)),
        }
    }

    async fn get_ledger(&mut self, id: LedgerId) -> LedgerResult<Option<Ledger>> {
        sqlx::query("SELECT id, name, scale, class, value, created_at FROM ledgers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| ledger_from_row(&row))
            .transpose()
    }

    async fn get_ledger_by_name(&mut self, name: &str) -> LedgerResult<Option<Ledger>> {
        sqlx::query(
            "SELECT id, name, scale, class, value, created_at FROM ledgers WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(|row| ledger_from_row(&row))
        .transpose()
    }

    async fn get_ledgers(&mut self, ids: &[LedgerId]) -> LedgerResult<Vec<Ledger>> {
        sqlx::query(
            "SELECT id, name, scale, class, value, created_at FROM ledgers WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?
        .iter()
        .map(ledger_from_row)
        .collect()
    }

    async fn list_ledgers(&mut self) -> LedgerResult<Vec<Ledger>> {
        sqlx::query("SELECT id, name, scale, class, value, created_at FROM ledgers ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(ledger_from_row)
            .collect()
    }

    async fn insert_wallet(&mut self, wallet: &NewWallet) -> LedgerResult<Wallet> {
        let sql = format!(
            r#"
            INSERT INTO wallets (address, code, collateral_ratio_milli, location_x, location_y, owner_user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {WALLET_COLUMNS}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(&wallet.address)
            .bind(wallet.role.code())
            .bind(wallet.collateral_ratio.milli() as i16)
            .bind(wallet.location.map(|l| l.x))
            .bind(wallet.location.map(|l| l.y))
            .bind(wallet.owner_user_id)
            .fetch_one(&mut *self.tx)
            .await;

        match result {
            Ok(row) => wallet_from_row(&row),
            Err(e) => {
                let constraint = violated_constraint(&e);
                Err(match constraint.as_deref() {
                    Some("wallets_address_key") => {
                        LedgerError::DuplicateAddress(wallet.address.clone())
                    }
                    Some("wallets_one_personal_per_owner") => {
                        LedgerError::DuplicatePersonalWallet(wallet.owner_user_id.unwrap_or_default())
                    }
                    _ => LedgerError::Database(e),
                })
            }
        }
    }

    async fn get_wallet(&mut self, id: WalletId) -> LedgerResult<Option<Wallet>> {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| wallet_from_row(&row))
            .transpose()
    }

    async fn get_wallet_by_address(&mut self, address: &str) -> LedgerResult<Option<Wallet>> {
        let sql = format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE address = $1");
        sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| wallet_from_row(&row))
            .transpose()
    }

    async fn find_personal_wallet(&mut self, user_id: UserId) -> LedgerResult<Option<WalletId>> {
        let row = sqlx::query("SELECT id FROM wallets WHERE owner_user_id = $1 AND code = $2")
            .bind(user_id)
            .bind(RoleCode::Personal.code())
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| r.get("id")))
    }

    async fn grant_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
        permissions: Permissions,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_permissions (wallet_id, user_id, permissions)
            VALUES ($1, $2, $3)
            ON CONFLICT (wallet_id, user_id)
            DO UPDATE SET
                permissions = wallet_permissions.permissions | EXCLUDED.permissions,
                updated_at = NOW()
            "#,
        )
        .bind(wallet_id)
        .bind(user_id)
        .bind(permissions.bits())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_permissions(
        &mut self,
        wallet_id: WalletId,
        user_id: UserId,
    ) -> LedgerResult<Permissions> {
        let row = sqlx::query(
            "SELECT permissions FROM wallet_permissions WHERE wallet_id = $1 AND user_id = $2",
        )
        .bind(wallet_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row
            .map(|r| Permissions::from_bits(r.get("permissions")))
            .unwrap_or(Permissions::NONE))
    }

    async fn increment_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
        require_available: bool,
    ) -> LedgerResult<Option<AccountId>> {
        let column = counter.column();
        let guard = if require_available {
            format!(" AND {}", available_covers(key.role.classification()))
        } else {
            String::new()
        };
        let sql = format!(
            "UPDATE accounts SET {column} = {column} + $1
             WHERE wallet_id = $2 AND ledger_id = $3 AND code = $4{guard}
             RETURNING id"
        );

        let row = sqlx::query(&sql)
            .bind(amount)
            .bind(key.wallet_id)
            .bind(key.ledger_id)
            .bind(key.role.code())
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|r| r.get("id")))
    }

    async fn upsert_account(
        &mut self,
        key: &AccountKey,
        counter: AccountCounter,
        amount: i64,
    ) -> LedgerResult<AccountId> {
        let seed = |c: AccountCounter| if c == counter { amount } else { 0 };

        // A concurrent first deposit turns the insert into an increment
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (wallet_id, ledger_id, code, debits_pending, debits_posted, credits_pending, credits_posted)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (wallet_id, ledger_id, code)
            DO UPDATE SET
                debits_pending = accounts.debits_pending + EXCLUDED.debits_pending,
                debits_posted = accounts.debits_posted + EXCLUDED.debits_posted,
                credits_pending = accounts.credits_pending + EXCLUDED.credits_pending,
                credits_posted = accounts.credits_posted + EXCLUDED.credits_posted
            RETURNING id
            "#,
        )
        .bind(key.wallet_id)
        .bind(key.ledger_id)
        .bind(key.role.code())
        .bind(seed(AccountCounter::DebitsPending))
        .bind(seed(AccountCounter::DebitsPosted))
        .bind(seed(AccountCounter::CreditsPending))
        .bind(seed(AccountCounter::CreditsPosted))
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("id"))
    }

    async fn get_account(&mut self, key: &AccountKey) -> LedgerResult<Option<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE wallet_id = $1 AND ledger_id = $2 AND code = $3"
        );
        sqlx::query(&sql)
            .bind(key.wallet_id)
            .bind(key.ledger_id)
            .bind(key.role.code())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn get_account_by_id(&mut self, id: AccountId) -> LedgerResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn get_wallet_accounts(&mut self, wallet_id: WalletId) -> LedgerResult<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE wallet_id = $1 ORDER BY ledger_id, code"
        );
        sqlx::query(&sql)
            .bind(wallet_id)
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(account_from_row)
            .collect()
    }

    async fn release_pending(
        &mut self,
        id: AccountId,
        pending: AccountCounter,
        posted: Option<AccountCounter>,
        amount: i64,
    ) -> LedgerResult<bool> {
        let p = pending.column();
        let sql = match posted {
            Some(posted) => {
                let q = posted.column();
                format!(
                    "UPDATE accounts SET {p} = {p} - $1, {q} = {q} + $1 WHERE id = $2 AND {p} >= $1"
                )
            }
            None => format!("UPDATE accounts SET {p} = {p} - $1 WHERE id = $2 AND {p} >= $1"),
        };

        let result = sqlx::query(&sql)
            .bind(amount)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> LedgerResult<TransactionId> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (debit_wallet_id, credit_wallet_id, code, status, memo)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(transaction.debit_wallet_id)
        .bind(transaction.credit_wallet_id)
        .bind(transaction.code.code())
        .bind(transaction.status.code())
        .bind(&transaction.memo)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("id"))
    }

    async fn get_transaction(
        &mut self,
        id: TransactionId,
    ) -> LedgerResult<Option<LedgerTransaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(|row| transaction_from_row(&row))
            .transpose()
    }

    async fn get_wallet_transactions(
        &mut self,
        wallet_id: WalletId,
        limit: i64,
    ) -> LedgerResult<Vec<LedgerTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE debit_wallet_id = $1 OR credit_wallet_id = $1
             ORDER BY id DESC
             LIMIT $2"
        );
        sqlx::query(&sql)
            .bind(wallet_id)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(transaction_from_row)
            .collect()
    }

    async fn update_transaction_status(
        &mut self,
        id: TransactionId,
        from: TxStatus,
        to: TxStatus,
    ) -> LedgerResult<bool> {
        let result = sqlx::query("UPDATE transactions SET status = $1 WHERE id = $2 AND status = $3")
            .bind(to.code())
            .bind(id)
            .bind(from.code())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> LedgerResult<TransferId> {
        let row = sqlx::query(
            r#"
            INSERT INTO transfers (transaction_id, debit_account_id, credit_account_id, ledger_id, amount, code, flag, pending_ref_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(transfer.transaction_id)
        .bind(transfer.debit_account_id)
        .bind(transfer.credit_account_id)
        .bind(transfer.ledger_id)
        .bind(transfer.amount)
        .bind(transfer.code.code())
        .bind(transfer.flag.code())
        .bind(transfer.pending_ref_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get("id"))
    }

    async fn get_transfers_by_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> LedgerResult<Vec<Transfer>> {
        let sql =
            format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE transaction_id = $1 ORDER BY id");
        sqlx::query(&sql)
            .bind(transaction_id)
            .fetch_all(&mut *self.tx)
            .await?
            .iter()
            .map(transfer_from_row)
            .collect()
    }

    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
