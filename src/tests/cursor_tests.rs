use crate::{
    db::{address, cursor, transaction::{self, BatchScope}},
    models::{CursorPath, TxType},
    tests::support::*,
};
use std::collections::HashSet;

#[tokio::test]
async fn test_no_history_means_no_cursors() {
    let pool = pool().await;
    let alice = address::find_or_create(&pool, NET, "XTZ", ALICE, 0).await.unwrap();

    assert!(cursor::resolve_address(&pool, alice.id).await.unwrap().is_empty());
    assert!(cursor::resolve_network(&pool, NET).await.unwrap().is_none());
}

#[tokio::test]
async fn test_latest_row_per_operation_type_wins() {
    let pool = pool().await;
    let alice = address::find_or_create(&pool, NET, "XTZ", ALICE, 0).await.unwrap();

    let mut delegation = typed(tx("d1", 50, 0.0, ALICE, BAKER), TxType::Delegation);
    delegation.original_op_type = "delegation".to_string();
    delegation.path = Some(CursorPath::new("d-page-1"));

    let mut late_but_old = tx("t2", 10, 1.0, BOB, ALICE);
    late_but_old.path = Some(CursorPath::new("t-page-2"));

    let mut first = tx("t1", 99, 1.0, BOB, ALICE);
    first.path = Some(CursorPath::new("t-page-1"));

    // Insertion order, not date, decides which row is newest.
    transaction::commit_batch(
        &pool,
        NET,
        BatchScope::Address(alice.id),
        &[first, delegation, late_but_old],
        &HashSet::new(),
    )
    .await
    .unwrap();

    let cursors = cursor::resolve_address(&pool, alice.id).await.unwrap();
    assert_eq!(cursors.len(), 2);

    let delegation = cursors.iter().find(|c| c.original_op_type == "delegation").unwrap();
    assert_eq!(delegation.path.as_ref().map(CursorPath::as_str), Some("d-page-1"));
    assert_eq!(delegation.tx_type, TxType::Delegation);

    let transfers = cursors.iter().find(|c| c.original_op_type == "transaction").unwrap();
    assert_eq!(transfers.path.as_ref().map(CursorPath::as_str), Some("t-page-2"));
}

#[tokio::test]
async fn test_path_round_trips_verbatim() {
    let pool = pool().await;
    let alice = address::find_or_create(&pool, NET, "XTZ", ALICE, 0).await.unwrap();
    let raw = r#"{"block":"0xabc","index":7,"nested":{"shard":"ü"}}  "#;

    let mut row = tx("op1", 10, 1.0, BOB, ALICE);
    row.path = Some(CursorPath::new(raw));
    transaction::commit_batch(&pool, NET, BatchScope::Address(alice.id), &[row], &HashSet::new())
        .await
        .unwrap();

    let cursors = cursor::resolve_address(&pool, alice.id).await.unwrap();
    assert_eq!(cursors[0].path, Some(CursorPath::new(raw)));
}

#[tokio::test]
async fn test_network_cursor_ignores_per_address_rows() {
    let pool = pool().await;
    let alice = address::find_or_create(&pool, NET, "XTZ", ALICE, 0).await.unwrap();

    let mut chain_row = tx("c1", 10, 1.0, BOB, CAROL);
    chain_row.path = Some(CursorPath::new("block-10"));
    transaction::commit_batch(&pool, NET, BatchScope::Network, &[chain_row], &HashSet::new())
        .await
        .unwrap();

    let mut address_row = tx("a1", 20, 1.0, BOB, ALICE);
    address_row.path = Some(CursorPath::new("page-3"));
    transaction::commit_batch(&pool, NET, BatchScope::Address(alice.id), &[address_row], &HashSet::new())
        .await
        .unwrap();

    let position = cursor::resolve_network(&pool, NET).await.unwrap().unwrap();
    assert_eq!(position.path, Some(CursorPath::new("block-10")));
    assert!(cursor::resolve_network(&pool, "other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_network_cursor_includes_currency_overrides() {
    let pool = pool().await;
    let mut token = tx("t1", 10, 5.0, "sol1bob", "sol1carol");
    token.currency = Some("usdt".to_string());
    token.path = Some(CursorPath::new("{\"height\":7}"));

    let summary = transaction::commit_batch(&pool, "solana", BatchScope::Network, &[token], &HashSet::new())
        .await
        .unwrap();
    assert_eq!(summary.inserted, 1);

    let position = cursor::resolve_network(&pool, "solana").await.unwrap();
    assert_eq!(
        position.and_then(|c| c.path),
        Some(CursorPath::new("{\"height\":7}")),
        "A row with its own currency still advances the network cursor"
    );
    assert!(cursor::resolve_network(&pool, "usdt").await.unwrap().is_none());
}

#[test]
fn test_typed_cursor_encoding() {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Page {
        offset: u64,
    }

    let path = CursorPath::encode(&Page { offset: 12 }).unwrap();
    assert_eq!(path.as_str(), r#"{"offset":12}"#);
    assert_eq!(path.decode::<Page>().unwrap(), Page { offset: 12 });
    assert!(CursorPath::new("garbage").decode::<Page>().is_err());
}
