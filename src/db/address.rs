// Address bookkeeping: lazy creation, user attachment, the round-robin lease,
// exchange classification and the service-address roster.

use sqlx::{Pool, Sqlite};
use crate::models::Address;

const ADDRESS_COLUMNS: &str =
    "a.id, a.address, a.net, a.currency, a.is_service, a.is_exchange, a.created, a.updated";

pub async fn find(pool: &Pool<Sqlite>, net: &str, address: &str) -> Result<Option<Address>, sqlx::Error> {
    let row = sqlx::query_as::<_, Address>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses a WHERE a.net = ? AND a.address = ?"
    ))
    .bind(net)
    .bind(address)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(mut address) => {
            address.user_ids = user_ids(pool, address.id).await?;
            Ok(Some(address))
        }
        None => Ok(None),
    }
}

/// Returns the `(net, address)` row, inserting it first if it has never been seen.
pub async fn find_or_create(
    pool: &Pool<Sqlite>,
    net: &str,
    currency: &str,
    address: &str,
    now: i64,
) -> Result<Address, sqlx::Error> {
    sqlx::query(
        "INSERT INTO addresses (address, net, currency, created) VALUES (?, ?, ?, ?)
         ON CONFLICT(net, address) DO NOTHING",
    )
    .bind(address)
    .bind(net)
    .bind(currency)
    .bind(now)
    .execute(pool)
    .await?;

    find(pool, net, address).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn attach_user(pool: &Pool<Sqlite>, address_id: i64, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO address_users (address_id, user_id) VALUES (?, ?)")
        .bind(address_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

async fn user_ids(pool: &Pool<Sqlite>, address_id: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT user_id FROM address_users WHERE address_id = ? ORDER BY user_id")
        .bind(address_id)
        .fetch_all(pool)
        .await
}

/// Deletes an address together with the rows synced for it. Returns whether it existed.
pub async fn remove(pool: &Pool<Sqlite>, net: &str, address: &str) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM addresses WHERE net = ? AND address = ?")
        .bind(net)
        .bind(address)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(id) = id else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM transactions WHERE address_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM address_users WHERE address_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM addresses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Picks the address the per-address driver should sync next: oldest `updated`
/// first, never-synced first of all. Exchange addresses sort as if they were
/// `exchange_delay_ms` fresher than they are. Service addresses nobody tracks are skipped.
pub async fn next_stale(
    pool: &Pool<Sqlite>,
    net: &str,
    exchange_delay_ms: i64,
) -> Result<Option<Address>, sqlx::Error> {
    sqlx::query_as::<_, Address>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses a
         WHERE a.net = ?
           AND (a.is_service = 0 OR EXISTS (SELECT 1 FROM address_users u WHERE u.address_id = a.id))
         ORDER BY COALESCE(a.updated, 0) + CASE WHEN a.is_exchange = 1 THEN ? ELSE 0 END ASC, a.id ASC
         LIMIT 1"
    ))
    .bind(net)
    .bind(exchange_delay_ms)
    .fetch_optional(pool)
    .await
}

/// Addresses a push-mode network should hold subscriptions for.
pub async fn trackable_for_net(pool: &Pool<Sqlite>, net: &str) -> Result<Vec<Address>, sqlx::Error> {
    sqlx::query_as::<_, Address>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses a
         WHERE a.net = ?
           AND (a.is_service = 0 OR EXISTS (SELECT 1 FROM address_users u WHERE u.address_id = a.id))
         ORDER BY a.id"
    ))
    .bind(net)
    .fetch_all(pool)
    .await
}

pub async fn addresses_for_user(pool: &Pool<Sqlite>, user_id: &str) -> Result<Vec<Address>, sqlx::Error> {
    sqlx::query_as::<_, Address>(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM addresses a
         JOIN address_users u ON u.address_id = a.id
         WHERE u.user_id = ?
         ORDER BY a.net, a.id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Bumps `updated`. Used both as the pre-work lease and as the post-commit mark.
pub async fn touch(pool: &Pool<Sqlite>, address_id: i64, now: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE addresses SET updated = ? WHERE id = ?")
        .bind(now)
        .bind(address_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn mark_exchange(pool: &Pool<Sqlite>, address_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE addresses SET is_exchange = 1 WHERE id = ?")
        .bind(address_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn service_addresses(pool: &Pool<Sqlite>, net: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT address FROM addresses WHERE net = ? AND is_service = 1 ORDER BY address")
        .bind(net)
        .fetch_all(pool)
        .await
}

/// `updated` of the most recently touched service address, `None` when the roster is empty.
pub async fn latest_service_update(pool: &Pool<Sqlite>, net: &str) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT MAX(updated) FROM addresses WHERE net = ? AND is_service = 1")
        .bind(net)
        .fetch_one(pool)
        .await
}

/// Upserts a freshly fetched roster: new entries are created as service
/// addresses, existing ones get `updated` bumped.
pub async fn upsert_service_addresses(
    pool: &Pool<Sqlite>,
    net: &str,
    currency: &str,
    roster: &[String],
    now: i64,
) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for address in roster {
        sqlx::query(
            "INSERT INTO addresses (address, net, currency, is_service, created, updated)
             VALUES (?, ?, ?, 1, ?, ?)
             ON CONFLICT(net, address) DO UPDATE SET is_service = 1, updated = excluded.updated",
        )
        .bind(address)
        .bind(net)
        .bind(currency)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(roster.len())
}
