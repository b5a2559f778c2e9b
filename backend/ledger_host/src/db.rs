//! Database layer: migrations, hook state snapshots, atomic commits and the
//! transaction/payment logs.

use std::collections::BTreeSet;
use std::str::FromStr;

use crowdfund_hook::{HookError, MemoryState, StateKey, StateWrite};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::{debug, info};

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // an in-memory database lives and dies with its single connection
    let in_memory = url.contains(":memory:");
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────

/// A raw hook state row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StateRow {
    pub key: Vec<u8>,
    pub campaign_id: i64,
    pub value: Vec<u8>,
}

/// An invocation as written to the transaction log.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub campaign_id: u32,
    pub sender: String,
    pub amount: u64,
    pub mode: Option<&'static str>,
    pub payload: Vec<u8>,
    pub ledger_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub sender: String,
    pub amount: String,
    pub mode: Option<String>,
    pub payload: String,
    pub ledger_time: i64,
    pub accepted: bool,
    pub code: i64,
    pub message: Option<String>,
    pub result: Option<String>,
    pub fund_transaction_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub transaction_id: i64,
    pub campaign_id: i64,
    pub destination: String,
    pub amount: String,
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────
// Hook state reads
// ─────────────────────────────────────────────────────────

/// Load every record of one campaign into a snapshot the hook can read.
pub async fn load_snapshot(pool: &SqlitePool, campaign_id: u32) -> Result<MemoryState> {
    let rows: Vec<(Vec<u8>, Vec<u8>)> =
        sqlx::query_as("SELECT key, value FROM hook_state WHERE campaign_id = ?1")
            .bind(campaign_id as i64)
            .fetch_all(pool)
            .await?;
    debug!(campaign_id, records = rows.len(), "loaded campaign snapshot");

    let mut entries = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        let key = StateKey::from_slice(&key).ok_or_else(|| {
            HookError::CorruptRecord(format!("hook state key of {} bytes", key.len()))
        })?;
        entries.push((key, value));
    }
    Ok(MemoryState::from_entries(entries))
}

pub async fn campaign_ids(pool: &SqlitePool) -> Result<Vec<u32>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT DISTINCT campaign_id FROM hook_state ORDER BY campaign_id ASC")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id as u32).collect())
}

pub async fn all_state(pool: &SqlitePool) -> Result<Vec<StateRow>> {
    let rows = sqlx::query_as::<_, StateRow>(
        "SELECT key, campaign_id, value FROM hook_state ORDER BY campaign_id ASC, key ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Commit
// ─────────────────────────────────────────────────────────

/// Apply an accepted invocation in one SQL transaction: the hook state
/// writes, the transaction log row and the emitted payment, if any.
///
/// Writes that would grow the store past `capacity` entries roll the whole
/// transaction back with [`HookError::StorageFailure`].
pub async fn commit_accepted(
    pool: &SqlitePool,
    capacity: usize,
    tx_record: &NewTransaction,
    outcome: &crowdfund_hook::Outcome,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let (used,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hook_state")
        .fetch_one(&mut *tx)
        .await?;
    let mut new_keys = BTreeSet::new();
    for write in &outcome.writes {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM hook_state WHERE key = ?1")
            .bind(write.key.0.as_slice())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            new_keys.insert(write.key);
        }
    }
    if used as usize + new_keys.len() > capacity {
        return Err(HookError::StorageFailure(format!(
            "insufficient reserve: {used} entries used of {capacity}, {} new requested",
            new_keys.len()
        ))
        .into());
    }

    for StateWrite { key, value } in &outcome.writes {
        sqlx::query(
            r#"
            INSERT INTO hook_state (key, campaign_id, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value,
                                            updated_at = datetime('now')
            "#,
        )
        .bind(key.0.as_slice())
        .bind(key.campaign_id() as i64)
        .bind(value.as_slice())
        .execute(&mut *tx)
        .await?;
    }

    let transaction_id = sqlx::query(
        r#"
        INSERT INTO transactions
            (campaign_id, sender, amount, mode, payload, ledger_time, accepted, code,
             result, fund_transaction_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, 0, ?7, ?8)
        "#,
    )
    .bind(tx_record.campaign_id as i64)
    .bind(&tx_record.sender)
    .bind(tx_record.amount.to_string())
    .bind(tx_record.mode)
    .bind(hex::encode(&tx_record.payload))
    .bind(tx_record.ledger_time as i64)
    .bind(hex::encode(&outcome.result))
    .bind(outcome.fund_transaction_id.map(i64::from))
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(payment) = &outcome.emitted {
        sqlx::query(
            r#"
            INSERT INTO emitted_payments (transaction_id, campaign_id, destination, amount)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(transaction_id)
        .bind(payment.campaign_id as i64)
        .bind(payment.destination.to_string())
        .bind(payment.amount.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    debug!(
        transaction_id,
        writes = outcome.writes.len(),
        new_entries = new_keys.len(),
        "committed invocation"
    );
    Ok(transaction_id)
}

/// Log a rejected invocation. Nothing else is written.
pub async fn record_rejected(
    pool: &SqlitePool,
    tx_record: &NewTransaction,
    err: &HookError,
) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO transactions
            (campaign_id, sender, amount, mode, payload, ledger_time, accepted, code, message)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)
        "#,
    )
    .bind(tx_record.campaign_id as i64)
    .bind(&tx_record.sender)
    .bind(tx_record.amount.to_string())
    .bind(tx_record.mode)
    .bind(hex::encode(&tx_record.payload))
    .bind(tx_record.ledger_time as i64)
    .bind(err.code() as i64)
    .bind(err.to_string())
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

// ─────────────────────────────────────────────────────────
// Log reads
// ─────────────────────────────────────────────────────────

pub async fn get_transactions(pool: &SqlitePool) -> Result<Vec<TransactionRecord>> {
    let rows = sqlx::query_as::<_, TransactionRecord>(
        r#"
        SELECT id, campaign_id, sender, amount, mode, payload, ledger_time, accepted, code,
               message, result, fund_transaction_id, created_at
        FROM   transactions
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_payments(pool: &SqlitePool) -> Result<Vec<PaymentRecord>> {
    let rows = sqlx::query_as::<_, PaymentRecord>(
        r#"
        SELECT id, transaction_id, campaign_id, destination, amount, created_at
        FROM   emitted_payments
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
