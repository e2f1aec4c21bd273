mod common;

use std::sync::Arc;

use spaceindex_core::{IndexerError, ListingStore, MarketService, NewListing};
use spaceindex_storage::InMemoryStorage;

use common::{listing, sync_loop, MockChain};

fn market(chain: &Arc<MockChain>, store: &Arc<InMemoryStorage>) -> MarketService {
    MarketService::new(chain.clone(), store.clone(), store.clone())
}

fn offer(space: &str, price: i64, seller: &str) -> NewListing {
    NewListing {
        space: space.into(),
        price,
        seller: seller.into(),
        signature: "c0ffee".into(),
    }
}

#[tokio::test]
async fn posted_listing_is_stored_at_synced_height() {
    let chain = MockChain::with_height(30);
    let store = Arc::new(InMemoryStorage::new());
    sync_loop(&chain, &store).run_pass().await.unwrap();
    chain.set_owner("alice", "S1");

    let stored = market(&chain, &store)
        .post_listing(offer("@alice", 1_000, "S1"))
        .await
        .unwrap();

    assert_eq!(stored.name, "alice");
    assert_eq!(stored.height, 30);
    assert!(stored.valid);
    assert!(stored.timestamp > 0);
    assert_eq!(chain.verify_calls(), vec!["alice".to_string()]);
    assert_eq!(
        store.valid_listing("alice").await.unwrap().unwrap().signature,
        vec![0xc0, 0xff, 0xee]
    );
}

#[tokio::test]
async fn oracle_rejection_stores_nothing() {
    let chain = MockChain::with_height(1);
    let store = Arc::new(InMemoryStorage::new());
    chain.set_owner("alice", "S2");

    let err = market(&chain, &store)
        .post_listing(offer("alice", 10, "S1"))
        .await
        .unwrap_err();

    assert!(matches!(err, IndexerError::ListingRejected { .. }));
    assert_eq!(store.listing_count().unwrap(), 0);
}

#[tokio::test]
async fn malformed_listing_never_reaches_oracle() {
    let chain = MockChain::with_height(1);
    let store = Arc::new(InMemoryStorage::new());

    let err = market(&chain, &store)
        .post_listing(offer("alice", -5, "S1"))
        .await
        .unwrap_err();

    assert!(matches!(err, IndexerError::InvalidListing { .. }));
    assert!(chain.verify_calls().is_empty());
}

#[tokio::test]
async fn oracle_outage_surfaces_transient_error() {
    let chain = MockChain::with_height(1);
    let store = Arc::new(InMemoryStorage::new());
    chain.set_oracle_down(true);

    let err = market(&chain, &store)
        .post_listing(offer("alice", 10, "S1"))
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(store.listing_count().unwrap(), 0);
}

#[tokio::test]
async fn lookup_returns_cheapest_valid_listing() {
    let chain = MockChain::with_height(1);
    let store = Arc::new(InMemoryStorage::new());
    let mut cheapest_but_stale = listing("bob", 5, "S1", 1);
    cheapest_but_stale.valid = false;
    store.insert_listing(&cheapest_but_stale).await.unwrap();
    store.insert_listing(&listing("bob", 40, "S1", 2)).await.unwrap();
    store.insert_listing(&listing("bob", 25, "S1", 3)).await.unwrap();

    let svc = market(&chain, &store);
    assert_eq!(svc.listing("@bob").await.unwrap().price, 25);
    assert_eq!(svc.listing("bob").await.unwrap().price, 25);

    let err = svc.listing("nobody").await.unwrap_err();
    assert!(matches!(err, IndexerError::NotFound(_)));
}

#[tokio::test]
async fn browse_returns_cheapest_listing_per_space() {
    let chain = MockChain::with_height(1);
    let store = Arc::new(InMemoryStorage::new());
    let svc = market(&chain, &store);

    assert!(matches!(svc.listings(None).await.unwrap_err(), IndexerError::NotFound(_)));

    for (i, name) in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"].iter().enumerate() {
        let mut l = listing(name, 100, "S1", i as u8);
        l.timestamp = 1_700_000_000 + i as i64;
        store.insert_listing(&l).await.unwrap();
    }
    let mut cheaper = listing("k", 60, "S1", 0x40);
    cheaper.timestamp = 1_600_000_000;
    store.insert_listing(&cheaper).await.unwrap();

    let page = svc.listings(None).await.unwrap();
    assert_eq!(page.len(), spaceindex_core::DEFAULT_LISTINGS_LIMIT as usize);
    assert_eq!(page[0].name, "j");
    assert!(page.iter().all(|l| l.name != "k"));

    let all = svc.listings(Some(50)).await.unwrap();
    assert_eq!(all.len(), 11);
    let k = all.iter().find(|l| l.name == "k").unwrap();
    assert_eq!(k.price, 60);
    assert_eq!(all.last().unwrap().name, "k");
}

#[tokio::test]
async fn health_reports_lag_behind_tip() {
    let chain = MockChain::with_height(10);
    let store = Arc::new(InMemoryStorage::new());
    let svc = market(&chain, &store);

    let empty = svc.health().await.unwrap();
    assert_eq!(empty.height, None);
    assert_eq!(empty.chain_height, 10);
    assert_eq!(empty.lag(), 11);

    sync_loop(&chain, &store).run_pass().await.unwrap();
    chain.extend_to(13);

    let health = svc.health().await.unwrap();
    assert_eq!(health.height, Some(10));
    assert_eq!(health.hash.as_deref(), Some(hex::encode(common::block_hash(10, 0)).as_str()));
    assert_eq!(health.chain_height, 13);
    assert_eq!(health.lag(), 3);
}
