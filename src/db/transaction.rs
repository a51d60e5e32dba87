use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};
use std::collections::HashSet;
use tracing::{debug, error, warn};
use crate::models::{now_millis, CursorPath, NormalizedTx, Transaction, TxType};

/// Which uniqueness key a batch is written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// Per-address mode, rows keyed by `(hash, address_id)`.
    Address(i64),
    /// Chain-wide mode, rows keyed by `(hash, currency)`.
    Network,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Commits a batch of normalized transactions as one storage transaction.
///
/// Replaying the same batch is a no-op: rows already present are skipped unless
/// the incoming row asks for `force_update`, in which case its fields are merged
/// into the existing row. Payments from a trusted source are stored as
/// `approved_payment`. On any error the whole batch is rolled back. In address
/// scope the address `updated` mark is bumped after a successful commit; a
/// failure there is logged and does not fail the stored batch.
pub async fn commit_batch(
    pool: &Pool<Sqlite>,
    net: &str,
    scope: BatchScope,
    transactions: &[NormalizedTx],
    trusted: &HashSet<String>,
) -> Result<CommitSummary, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let summary = match write_batch(&mut tx, net, scope, transactions, trusted).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Rolling back batch of {} transactions for {}: {}", transactions.len(), net, e);
            if let Err(rollback_err) = tx.rollback().await {
                error!("Rollback failed for {}: {}", net, rollback_err);
            }
            return Err(e);
        }
    };

    if let Err(e) = tx.commit().await {
        error!("Failed to commit batch for {}: {}", net, e);
        return Err(e);
    }

    if let BatchScope::Address(address_id) = scope {
        if let Err(e) = crate::db::address::touch(pool, address_id, now_millis()).await {
            warn!("Batch for {} stored but address {} was not marked synced: {}", net, address_id, e);
        }
    }

    debug!(
        "Committed batch for {}: {} inserted, {} updated, {} skipped",
        net, summary.inserted, summary.updated, summary.skipped
    );
    Ok(summary)
}

async fn write_batch(
    conn: &mut SqliteConnection,
    net: &str,
    scope: BatchScope,
    transactions: &[NormalizedTx],
    trusted: &HashSet<String>,
) -> Result<CommitSummary, sqlx::Error> {
    let mut summary = CommitSummary::default();

    for transaction in transactions {
        let tx_type = classify(transaction, trusted);
        let currency = transaction.currency.as_deref().unwrap_or(net);

        let existing: Option<i64> = match scope {
            BatchScope::Address(address_id) => {
                sqlx::query_scalar("SELECT id FROM transactions WHERE hash = ? AND address_id = ?")
                    .bind(&transaction.hash)
                    .bind(address_id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            BatchScope::Network => {
                sqlx::query_scalar(
                    "SELECT id FROM transactions WHERE hash = ? AND currency = ? AND address_id IS NULL",
                )
                .bind(&transaction.hash)
                .bind(currency)
                .fetch_optional(&mut *conn)
                .await?
            }
        };

        match existing {
            Some(id) if transaction.force_update => {
                sqlx::query(
                    r#"
                    UPDATE transactions SET
                        date = ?, value = ?, from_address = ?, from_alias = ?, to_address = ?,
                        fee = ?, type = ?, original_op_type = ?, comment = ?, path = ?, is_cancelled = ?
                    WHERE id = ?
                    "#,
                )
                .bind(transaction.date)
                .bind(transaction.value)
                .bind(&transaction.from)
                .bind(&transaction.from_alias)
                .bind(&transaction.to)
                .bind(transaction.fee)
                .bind(tx_type.as_str())
                .bind(&transaction.original_op_type)
                .bind(&transaction.comment)
                .bind(&transaction.path)
                .bind(transaction.is_cancelled)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                summary.updated += 1;
            }
            Some(_) => summary.skipped += 1,
            None => {
                let address_id = match scope {
                    BatchScope::Address(id) => Some(id),
                    BatchScope::Network => None,
                };

                sqlx::query(
                    r#"
                    INSERT INTO transactions
                    (address_id, net, currency, hash, date, value, from_address, from_alias, to_address,
                     fee, type, original_op_type, comment, path, is_cancelled)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(address_id)
                .bind(net)
                .bind(currency)
                .bind(&transaction.hash)
                .bind(transaction.date)
                .bind(transaction.value)
                .bind(&transaction.from)
                .bind(&transaction.from_alias)
                .bind(&transaction.to)
                .bind(transaction.fee)
                .bind(tx_type.as_str())
                .bind(&transaction.original_op_type)
                .bind(&transaction.comment)
                .bind(&transaction.path)
                .bind(transaction.is_cancelled)
                .execute(&mut *conn)
                .await?;
                summary.inserted += 1;
            }
        }
    }

    Ok(summary)
}

/// Write-time reclassification: a payment whose sender is operator-trusted
/// becomes an `approved_payment`.
pub fn classify(transaction: &NormalizedTx, trusted: &HashSet<String>) -> TxType {
    if transaction.tx_type == TxType::Payment && trusted.contains(&transaction.from) {
        TxType::ApprovedPayment
    } else {
        transaction.tx_type
    }
}

/// Paginated history of `(net, address)`, oldest first, plus the total row count.
///
/// Covers rows synced for the address itself and chain-wide rows it appears in.
/// Outgoing `supplement` rows are reported as `conclusion`.
pub async fn list_for_address(
    pool: &Pool<Sqlite>,
    net: &str,
    address: &str,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Transaction>, i64), sqlx::Error> {
    const SCOPE: &str = r#"
        FROM transactions
        WHERE id IN (
            SELECT MIN(id) FROM transactions
            WHERE net = ? AND (from_address = ? OR to_address = ?)
            GROUP BY hash
        )
    "#;

    let total_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {SCOPE}"))
        .bind(net)
        .bind(address)
        .bind(address)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        r#"SELECT id, address_id, net, currency, hash, date, value, from_address, from_alias, to_address,
                  fee, type, original_op_type, comment, path, is_cancelled
           {SCOPE}
           ORDER BY date ASC, id ASC
           LIMIT ? OFFSET ?"#
    ))
    .bind(net)
    .bind(address)
    .bind(address)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let transactions = rows
        .iter()
        .map(|row| {
            let mut transaction = from_row(row)?;
            if transaction.tx_type == TxType::Supplement && transaction.from == address {
                transaction.tx_type = TxType::Conclusion;
            }
            Ok(transaction)
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok((transactions, total_count))
}

fn from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let tx_type: String = row.try_get("type")?;
    let tx_type = tx_type
        .parse::<TxType>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Transaction {
        id: row.try_get("id")?,
        address_id: row.try_get("address_id")?,
        net: row.try_get("net")?,
        currency: row.try_get("currency")?,
        hash: row.try_get("hash")?,
        date: row.try_get("date")?,
        value: row.try_get("value")?,
        from: row.try_get("from_address")?,
        from_alias: row.try_get("from_alias")?,
        to: row.try_get("to_address")?,
        fee: row.try_get("fee")?,
        tx_type,
        original_op_type: row.try_get("original_op_type")?,
        comment: row.try_get("comment")?,
        path: row.try_get::<Option<CursorPath>, _>("path")?,
        is_cancelled: row.try_get("is_cancelled")?,
    })
}
