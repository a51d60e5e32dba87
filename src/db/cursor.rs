//! Cursor resolution: the minimal rows an adapter needs to resume a pull.
//!
//! Both lookups are pure reads keyed on `max(id)`, so the newest committed row
//! wins regardless of its `date`. `path` comes back exactly as it was written.

use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};
use crate::models::{Cursor, CursorPath, TxType};

/// One cursor per distinct `original_op_type` in the address history.
pub async fn resolve_address(pool: &Pool<Sqlite>, address_id: i64) -> Result<Vec<Cursor>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT t.original_op_type, t.path, t.type
           FROM transactions t
           JOIN (
               SELECT MAX(id) AS id FROM transactions
               WHERE address_id = ?
               GROUP BY original_op_type
           ) latest ON latest.id = t.id
           ORDER BY t.original_op_type"#,
    )
    .bind(address_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(cursor_from_row).collect()
}

/// The last chain-wide row committed for `net`, `None` before the first commit.
pub async fn resolve_network(pool: &Pool<Sqlite>, net: &str) -> Result<Option<Cursor>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT original_op_type, path, type
           FROM transactions
           WHERE net = ? AND address_id IS NULL
           ORDER BY id DESC
           LIMIT 1"#,
    )
    .bind(net)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(cursor_from_row).transpose()
}

fn cursor_from_row(row: &SqliteRow) -> Result<Cursor, sqlx::Error> {
    let tx_type: String = row.try_get("type")?;

    Ok(Cursor {
        original_op_type: row.try_get("original_op_type")?,
        path: row.try_get::<Option<CursorPath>, _>("path")?,
        tx_type: tx_type
            .parse::<TxType>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
    })
}
