//! Balance, reward and chart aggregation over the ledger.
//!
//! All sums are signed from the viewpoint of one address: a row whose `from`
//! is the address counts negative, anything else positive. Cancelled rows are
//! ignored, and rows sharing a hash (the same transfer synced under two tracked
//! addresses) are counted once.

pub mod chart;

use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use crate::db::address;
use crate::models::{ChartPoint, ChartSeries};

/// Whose activity a chart covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartScope {
    User(String),
    Address { net: String, address: String },
}

#[derive(Debug, Clone)]
pub struct ChartQuery {
    pub scope: ChartScope,
    pub date_from: i64,
    pub date_to: i64,
    /// Explicit bucket width in milliseconds; derived from the range when absent.
    pub bucket_width: Option<i64>,
    /// Densify the series. Only honored together with an explicit width.
    pub interpolate: bool,
}

const DISTINCT_ROWS: &str = r#"
    SELECT MIN(id) FROM transactions
    WHERE net = ? AND is_cancelled = 0 AND (from_address = ? OR to_address = ?)
"#;

pub async fn balance(pool: &Pool<Sqlite>, net: &str, address: &str) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        r#"SELECT TOTAL(CASE WHEN from_address = ? THEN -value ELSE value END)
           FROM transactions
           WHERE id IN ({DISTINCT_ROWS} GROUP BY hash)"#
    ))
    .bind(address)
    .bind(net)
    .bind(address)
    .bind(address)
    .fetch_one(pool)
    .await
}

/// Signed sum restricted to `payment` and `approved_payment` rows.
pub async fn reward(pool: &Pool<Sqlite>, net: &str, address: &str) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        r#"SELECT TOTAL(CASE WHEN from_address = ? THEN -value ELSE value END)
           FROM transactions
           WHERE id IN ({DISTINCT_ROWS} AND type IN ('payment', 'approved_payment') GROUP BY hash)"#
    ))
    .bind(address)
    .bind(net)
    .bind(address)
    .bind(address)
    .fetch_one(pool)
    .await
}

/// Signed volume per `floor(date / width)` bucket for one address, keyed by bucket start.
async fn bucket_volumes(
    pool: &Pool<Sqlite>,
    net: &str,
    address: &str,
    date_from: i64,
    date_to: i64,
    width: i64,
) -> Result<Vec<(i64, f64)>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"SELECT date / ? AS bucket,
                  TOTAL(CASE WHEN from_address = ? THEN -value ELSE value END) AS volume
           FROM transactions
           WHERE id IN ({DISTINCT_ROWS} AND date >= ? AND date <= ? GROUP BY hash)
           GROUP BY bucket
           ORDER BY bucket"#
    ))
    .bind(width)
    .bind(address)
    .bind(net)
    .bind(address)
    .bind(address)
    .bind(date_from)
    .bind(date_to)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get::<i64, _>("bucket")? * width, row.try_get::<f64, _>("volume")?)))
        .collect()
}

/// Time-bucketed signed volume, one series per network.
pub async fn chart(pool: &Pool<Sqlite>, query: &ChartQuery) -> Result<Vec<ChartSeries>, sqlx::Error> {
    let width = query
        .bucket_width
        .filter(|w| *w > 0)
        .unwrap_or_else(|| chart::default_bucket_width(query.date_from, query.date_to));

    let targets: Vec<(String, String)> = match &query.scope {
        ChartScope::Address { net, address } => vec![(net.clone(), address.clone())],
        ChartScope::User(user_id) => address::addresses_for_user(pool, user_id)
            .await?
            .into_iter()
            .map(|a| (a.net, a.address))
            .collect(),
    };

    let mut by_net: BTreeMap<String, BTreeMap<i64, f64>> = BTreeMap::new();
    for (net, address) in &targets {
        let buckets = by_net.entry(net.clone()).or_default();
        for (date, volume) in bucket_volumes(pool, net, address, query.date_from, query.date_to, width).await? {
            *buckets.entry(date).or_insert(0.0) += volume;
        }
    }

    let densify = query.interpolate && query.bucket_width.is_some();
    Ok(by_net
        .into_iter()
        .map(|(net, buckets)| {
            let mut points: Vec<ChartPoint> = buckets
                .into_iter()
                .map(|(date, value)| ChartPoint { date, value, interpolated: false })
                .collect();
            if densify {
                chart::interpolate_gaps(&mut points, width);
                chart::pad_to_range(&mut points, width, query.date_from, query.date_to);
            }
            ChartSeries { net, bucket_width: width, points }
        })
        .collect())
}
