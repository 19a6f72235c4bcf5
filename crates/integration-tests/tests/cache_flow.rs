//! End-to-end cache behaviour through a `Larder` handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use larder_core::{IdentitySignal, ItemId, StoreKey, UserId};
use larder_integration_tests::{FetchCounter, FlakyStore, Harness};
use larder_store::{
    CacheError, ConfigError, Larder, LarderConfig, ManualClock, OpenError, Origin, StoreEvent,
};
use serde_json::{Value, json};
use tokio::task::JoinSet;

const HOUR: Duration = Duration::from_secs(3600);

fn listings() -> Value {
    json!([{"id": "L1", "title": "Lamp"}, {"id": "L2", "title": "Chair"}])
}

#[tokio::test]
async fn test_hit_within_window_never_fetches() {
    let h = Harness::new();
    let key = StoreKey::new("listings");
    let fetch_a = FetchCounter::new();
    let fetch_b = FetchCounter::new();

    h.larder
        .cache()
        .resolve(&key, HOUR, fetch_a.ok(listings()))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(30 * 60));
    let second = h
        .larder
        .cache()
        .resolve(&key, HOUR, fetch_b.ok(json!([])))
        .await
        .unwrap();

    assert_eq!(fetch_a.calls(), 1);
    assert_eq!(fetch_b.calls(), 0);
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.value, listings());
}

#[tokio::test]
async fn test_expiry_boundary_refetches() {
    let h = Harness::new();
    let key = StoreKey::new("stats");
    let fetch = FetchCounter::new();

    h.larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(json!({"sales": 1})))
        .await
        .unwrap();
    h.clock.advance(HOUR);
    let resolved = h
        .larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(json!({"sales": 2})))
        .await
        .unwrap();

    assert_eq!(fetch.calls(), 2);
    assert_eq!(resolved.origin, Origin::Fetched);
    assert_eq!(
        h.larder.cache().peek(&key).unwrap().payload,
        json!({"sales": 2})
    );
}

#[tokio::test]
async fn test_reordered_list_is_not_rewritten() {
    let h = Harness::new();
    let key = StoreKey::new("listings");
    let fetch = FetchCounter::new();

    h.larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(json!([{"id": 1}, {"id": 2}])))
        .await
        .unwrap();
    let writes = h.store.writes();
    let written_at = h.larder.cache().peek(&key).unwrap().cached_at;

    h.clock.advance(HOUR * 2);
    h.larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(json!([{"id": 2}, {"id": 1}])))
        .await
        .unwrap();

    assert_eq!(h.store.writes(), writes);
    assert_eq!(h.larder.cache().peek(&key).unwrap().cached_at, written_at);
}

#[tokio::test]
async fn test_offline_serves_stale_then_unavailable_after_clear() {
    let h = Harness::new();
    let key = StoreKey::new("listings");
    let fetch = FetchCounter::new();

    h.larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(listings()))
        .await
        .unwrap();
    h.clock.advance(HOUR * 5);

    let stale = h
        .larder
        .cache()
        .resolve::<Value, _, _>(&key, HOUR, fetch.fail("offline"))
        .await
        .unwrap();
    assert_eq!(stale.origin, Origin::Stale);
    assert_eq!(stale.value, listings());
    assert!(stale.warning.as_ref().is_some_and(CacheError::is_stale_served));

    h.larder.cache().clear(&key).unwrap();
    let err = h
        .larder
        .cache()
        .resolve::<Value, _, _>(&key, HOUR, fetch.fail("offline"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Unavailable { .. }));
}

#[tokio::test]
async fn test_quota_recovery_spares_scoped_sets() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let guest = h.larder.identity(&IdentitySignal::anonymous());
    h.larder.toggle_wishlist(&guest, "7").unwrap();
    h.larder
        .cache()
        .resolve(&StoreKey::new("stats"), HOUR, fetch.ok(json!({"sales": 1})))
        .await
        .unwrap();

    h.store.fail_next_writes_with_quota(1);
    let resolved = h
        .larder
        .cache()
        .resolve(&StoreKey::new("listings"), HOUR, fetch.ok(listings()))
        .await
        .unwrap();

    assert_eq!(resolved.value, listings());
    assert!(h.larder.cache().peek(&StoreKey::new("listings")).is_some());
    assert!(h.larder.cache().peek(&StoreKey::new("stats")).is_none());
    assert!(h.larder.wishlist(&guest).unwrap().contains(&"7".into()));
}

#[test]
fn test_prefix_overlapping_set_keys_is_rejected() {
    let config = LarderConfig {
        key_prefix: "wish".to_string(),
        ..LarderConfig::default()
    };

    let err = Larder::with_store(
        config,
        Arc::new(FlakyStore::new()),
        Arc::new(ManualClock::default()),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        OpenError::Config(ConfigError::InvalidEnvVar(ref key, _)) if key == "LARDER_KEY_PREFIX"
    ));
}

#[tokio::test]
async fn test_quota_sweep_under_custom_prefix_spares_sets() {
    let h = Harness::with_config(LarderConfig {
        key_prefix: "wishlist:".to_string(),
        ..LarderConfig::default()
    });
    let fetch = FetchCounter::new();
    let guest = h.larder.identity(&IdentitySignal::anonymous());
    h.larder.toggle_wishlist(&guest, "7").unwrap();
    h.larder
        .cache()
        .resolve(&StoreKey::new("stats"), HOUR, fetch.ok(json!({"sales": 1})))
        .await
        .unwrap();

    h.store.fail_next_writes_with_quota(1);
    h.larder
        .cache()
        .resolve(&StoreKey::new("listings"), HOUR, fetch.ok(listings()))
        .await
        .unwrap();

    assert!(h.larder.cache().peek(&StoreKey::new("stats")).is_none());
    assert!(h.larder.wishlist(&guest).unwrap().contains(&ItemId::from("7")));
}

#[tokio::test]
async fn test_unserializable_value_is_an_error() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let key = StoreKey::new("grid");
    // JSON objects need string keys; tuple keys cannot be serialized.
    let grid: HashMap<(u8, u8), u8> = HashMap::from([((0, 1), 2)]);
    let writes = h.store.writes();

    let err = h
        .larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(grid))
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Serialization(_)));
    assert!(h.larder.cache().peek(&key).is_none());
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_store_one_whole_value() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let key = StoreKey::new("listings");
    let payloads: Vec<Value> = (0..8)
        .map(|i| json!([{"id": i, "title": format!("item {i}")}, {"id": i + 100}]))
        .collect();

    let mut tasks = JoinSet::new();
    for payload in payloads.clone() {
        let larder = h.larder.clone();
        let key = key.clone();
        let fetch = fetch.ok(payload);
        tasks.spawn(async move { larder.cache().resolve(&key, HOUR, fetch).await });
    }

    while let Some(joined) = tasks.join_next().await {
        let resolved = joined.unwrap().unwrap();
        assert!(payloads.contains(&resolved.value));
    }
    let stored = h.larder.cache().peek(&key).unwrap().payload;
    assert!(payloads.contains(&stored), "stored a partial value: {stored}");
}

#[tokio::test]
async fn test_persistent_write_failure_still_returns_value() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let key = StoreKey::new("listings");

    h.store.fail_next_writes_with_quota(2);
    let resolved = h
        .larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(listings()))
        .await
        .unwrap();
    assert_eq!(resolved.value, listings());
    assert!(h.larder.cache().peek(&key).is_none());

    h.store.fail_next_writes_with_io(1);
    let again = h
        .larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(listings()))
        .await
        .unwrap();
    assert_eq!(again.origin, Origin::Fetched);
    assert_eq!(fetch.calls(), 2);
}

#[tokio::test]
async fn test_notifications_are_shaped_before_storage() {
    let h = Harness::new();
    let key = StoreKey::new("notifications");
    let fetch = FetchCounter::new();
    let items: Vec<Value> = (0..25)
        .map(|i| json!({"id": i, "kind": "order", "body": "A very long message"}))
        .collect();

    let fetched = h
        .larder
        .cache()
        .resolve_with_policy(&key, fetch.ok(items))
        .await
        .unwrap();
    let stored = h.larder.cache().peek(&key).unwrap().payload;

    assert_eq!(fetched.value.len(), 25);
    let stored = stored.as_array().unwrap();
    assert_eq!(stored.len(), 10);
    assert!(stored.iter().all(|item| item.get("body").is_none()));
}

#[tokio::test]
async fn test_identity_normalization_in_cache_keys() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let guest_key = StoreKey::new("orders").with_identity(None);
    let user = UserId::parse("alice").unwrap();
    let user_key = StoreKey::new("orders").with_identity(Some(&user));

    assert_eq!(guest_key.to_string(), "orders:guest");
    assert_eq!(guest_key, StoreKey::new("orders").with_identity(None));

    h.larder
        .cache()
        .resolve(&guest_key, HOUR, fetch.ok(json!([])))
        .await
        .unwrap();
    h.larder
        .cache()
        .resolve(&user_key, HOUR, fetch.ok(json!([{"id": 1}])))
        .await
        .unwrap();

    assert_eq!(fetch.calls(), 2);
    assert_eq!(
        h.larder.cache().peek(&user_key).unwrap().payload,
        json!([{"id": 1}])
    );
}

#[tokio::test]
async fn test_subscribers_see_writes_and_clears() {
    let h = Harness::new();
    let fetch = FetchCounter::new();
    let key = StoreKey::new("stats");
    let mut events = h.larder.subscribe();

    h.larder
        .cache()
        .resolve(&key, HOUR, fetch.ok(json!({"sales": 3})))
        .await
        .unwrap();
    h.larder.cache().clear(&key).unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        StoreEvent::CacheWritten { ref key, .. } if key == "cache:stats"
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        StoreEvent::CacheCleared {
            key: "cache:stats".to_string()
        }
    );
}
