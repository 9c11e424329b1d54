//! Behaviour of the read-through and invalidation stages against stub
//! handlers with call-count instrumentation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pms_cache::codec::encode;
use pms_cache::{
    CacheDuration, CacheError, CachePolicy, CacheSettings, CacheStore, Cacheable, DispatchError,
    Handler, InvalidationBus, InvalidationEvent, Invalidating, ListKey, LocalStore, Mediator,
    Payload, Pipeline, Request, TieredCache, Tier, entity_key,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    name: String,
}

struct GetItem {
    id: u32,
    ttl: CacheDuration,
    key: Option<String>,
}

impl GetItem {
    fn new(id: u32) -> Self {
        Self {
            id,
            ttl: CacheDuration::from_mins(10),
            key: None,
        }
    }
}

impl Cacheable for GetItem {
    fn cache_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| entity_key("item", self.id))
    }

    fn cache_duration(&self) -> CacheDuration {
        self.ttl
    }
}

impl Request for GetItem {
    type Response = Item;

    fn name(&self) -> &'static str {
        "GetItem"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

struct ListItems {
    page: u32,
}

impl Cacheable for ListItems {
    fn cache_key(&self) -> String {
        ListKey::new("items", "v1").page(self.page, 10).build()
    }

    fn cache_duration(&self) -> CacheDuration {
        CacheDuration::from_mins(5)
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["items:v1".into()]
    }
}

impl Request for ListItems {
    type Response = Vec<Item>;

    fn name(&self) -> &'static str {
        "ListItems"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Read(self)
    }
}

struct RenameItem {
    id: u32,
    name: String,
}

impl Invalidating for RenameItem {
    fn cache_keys(&self) -> Vec<String> {
        vec![entity_key("item", self.id)]
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["items:v1".into()]
    }
}

impl Request for RenameItem {
    type Response = Item;

    fn name(&self) -> &'static str {
        "RenameItem"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

struct AddItem {
    id: u32,
}

impl Invalidating for AddItem {
    fn cache_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["items:v1".into()]
    }
}

impl Request for AddItem {
    type Response = usize;

    fn name(&self) -> &'static str {
        "AddItem"
    }

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::Invalidate(self)
    }
}

// =============================================================================
// Stub handler
// =============================================================================

#[derive(Default)]
struct Services {
    items: Mutex<HashMap<u32, String>>,
    reads: AtomicUsize,
    lists: AtomicUsize,
    writes: AtomicUsize,
}

impl Services {
    fn with_items(items: &[(u32, &str)]) -> Self {
        let services = Self::default();
        {
            let mut map = services.items.lock().unwrap();
            for (id, name) in items {
                map.insert(*id, name.to_string());
            }
        }
        services
    }
}

#[async_trait]
impl Handler<GetItem> for Services {
    type Error = String;

    async fn handle(&self, request: &GetItem, _: &CancellationToken) -> Result<Item, String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        items
            .get(&request.id)
            .map(|name| Item {
                id: request.id,
                name: name.clone(),
            })
            .ok_or_else(|| format!("item {} not found", request.id))
    }
}

#[async_trait]
impl Handler<ListItems> for Services {
    type Error = String;

    async fn handle(&self, _: &ListItems, _: &CancellationToken) -> Result<Vec<Item>, String> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        let mut out: Vec<Item> = items
            .iter()
            .map(|(id, name)| Item {
                id: *id,
                name: name.clone(),
            })
            .collect();
        out.sort_by_key(|item| item.id);
        Ok(out)
    }
}

#[async_trait]
impl Handler<RenameItem> for Services {
    type Error = String;

    async fn handle(&self, request: &RenameItem, _: &CancellationToken) -> Result<Item, String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.lock().unwrap();
        match items.get_mut(&request.id) {
            None => Err(format!("item {} not found", request.id)),
            // Unchanged rename persists nothing.
            Some(name) if *name == request.name => Err("Failed to update item.".to_string()),
            Some(name) => {
                *name = request.name.clone();
                Ok(Item {
                    id: request.id,
                    name: name.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl Handler<AddItem> for Services {
    type Error = String;

    async fn handle(&self, request: &AddItem, _: &CancellationToken) -> Result<usize, String> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .unwrap()
            .insert(request.id, format!("item-{}", request.id));
        Ok(1)
    }
}

// =============================================================================
// Test stores
// =============================================================================

/// An L2 that is always unreachable.
struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    fn tier(&self) -> Tier {
        Tier::L2
    }

    async fn get(&self, _: &str) -> Result<Option<Payload>, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set(&self, _: &str, _: Payload, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn remove(&self, _: &str) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn add_to_tag(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn take_tag_members(&self, _: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn ping(&self) -> bool {
        false
    }
}

/// An in-process L2 that records every operation it receives.
#[derive(Default)]
struct RecordingStore {
    inner: LocalStore,
    log: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn record(&self, op: String) {
        self.log.lock().unwrap().push(op);
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    fn tier(&self) -> Tier {
        Tier::L2
    }

    async fn get(&self, key: &str) -> Result<Option<Payload>, CacheError> {
        self.record(format!("get {key}"));
        Ok(self.inner.get_entry(key))
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.record(format!("set {key}"));
        self.inner.insert(key, value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.record(format!("remove {key}"));
        self.inner.remove_key(key);
        Ok(())
    }

    async fn add_to_tag(&self, tag: &str, key: &str, _: Duration) -> Result<(), CacheError> {
        self.record(format!("tag {tag} {key}"));
        self.inner.tag(tag, key);
        Ok(())
    }

    async fn take_tag_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        self.record(format!("take {tag}"));
        Ok(self.inner.drain_tag(tag))
    }
}

/// An in-process L2 whose first `remove` waits until released.
#[derive(Default)]
struct GatedStore {
    inner: LocalStore,
    gated: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl CacheStore for GatedStore {
    fn tier(&self) -> Tier {
        Tier::L2
    }

    async fn get(&self, key: &str) -> Result<Option<Payload>, CacheError> {
        Ok(self.inner.get_entry(key))
    }

    async fn set(&self, key: &str, value: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.inner.insert(key, value, ttl);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        if !self.gated.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.remove_key(key);
        Ok(())
    }

    async fn add_to_tag(&self, tag: &str, key: &str, _: Duration) -> Result<(), CacheError> {
        self.inner.tag(tag, key);
        Ok(())
    }

    async fn take_tag_members(&self, tag: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.inner.drain_tag(tag))
    }
}

#[derive(Default)]
struct RecordingBus {
    events: Mutex<Vec<InvalidationEvent>>,
}

#[async_trait]
impl InvalidationBus for RecordingBus {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), CacheError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn build(
    services: Services,
    l2: Option<Arc<dyn CacheStore>>,
    bus: Option<Arc<dyn InvalidationBus>>,
) -> (Mediator<Services>, Arc<TieredCache>) {
    let mut cache = TieredCache::local(CacheSettings::default());
    if let Some(l2) = l2 {
        cache = cache.with_shared(l2);
    }
    if let Some(bus) = bus {
        cache = cache.with_bus(bus);
    }
    let cache = Arc::new(cache);
    let mediator = Mediator::new(services, Pipeline::new(Arc::clone(&cache)));
    (mediator, cache)
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

// =============================================================================
// Read-through
// =============================================================================

#[tokio::test]
async fn test_second_identical_read_is_served_from_cache() {
    let l2 = Arc::new(RecordingStore::default());
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    let first = mediator.send(GetItem::new(1), &token()).await.unwrap();
    let second = mediator.send(GetItem::new(1), &token()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 1);
    assert!(cache.l1().contains("item:1"));
    assert!(l2.inner.contains("item:1"));

    let stats = cache.stats().snapshot();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.l1_hits, 1);
}

#[tokio::test]
async fn test_l1_hit_does_not_touch_l2() {
    let l2 = Arc::new(RecordingStore::default());
    let (mediator, _) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    let before = l2.log().len();
    mediator.send(GetItem::new(1), &token()).await.unwrap();

    assert_eq!(l2.log().len(), before);
}

#[tokio::test]
async fn test_empty_key_or_non_positive_ttl_always_invokes_handler() {
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), None, None);

    let requests: [fn() -> GetItem; 3] = [
        || GetItem {
            key: Some(String::new()),
            ..GetItem::new(1)
        },
        || GetItem {
            ttl: CacheDuration::ZERO,
            ..GetItem::new(1)
        },
        || GetItem {
            ttl: CacheDuration::from_secs(-30),
            ..GetItem::new(1)
        },
    ];
    for make in requests {
        mediator.send(make(), &token()).await.unwrap();
        mediator.send(make(), &token()).await.unwrap();
    }

    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 6);
    assert!(cache.l1().is_empty());
    assert_eq!(cache.stats().snapshot().bypasses, 6);
}

#[tokio::test]
async fn test_disabled_cache_bypasses_everything() {
    let settings = CacheSettings {
        enabled: false,
        ..Default::default()
    };
    let cache = Arc::new(TieredCache::local(settings));
    let mediator = Mediator::new(
        Services::with_items(&[(1, "alpha")]),
        Pipeline::new(Arc::clone(&cache)),
    );

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    mediator.send(GetItem::new(1), &token()).await.unwrap();

    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_l2_hit_is_promoted_into_l1() {
    let l2 = Arc::new(RecordingStore::default());
    let cached = Item {
        id: 1,
        name: "from-l2".into(),
    };
    l2.inner
        .insert("item:1", encode(&cached).unwrap(), Duration::from_secs(600));

    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);
    assert!(!cache.l1().contains("item:1"));

    let first = mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(first, cached);
    assert!(cache.l1().contains("item:1"));

    // With L2 emptied, the next read can only be served by L1.
    l2.inner.clear();
    let second = mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(second, cached);
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 0);

    let stats = cache.stats().snapshot();
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.l1_hits, 1);
}

#[tokio::test]
async fn test_unavailable_l2_degrades_to_handler() {
    let (mediator, cache) = build(
        Services::with_items(&[(1, "alpha")]),
        Some(Arc::new(FailingStore)),
        None,
    );

    let item = mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(item.name, "alpha");
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 1);

    // L1 still caches locally.
    mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 1);
    assert!(cache.stats().snapshot().backend_errors >= 2);
}

#[tokio::test]
async fn test_not_found_is_never_cached() {
    let (mediator, cache) = build(Services::default(), None, None);

    let err = mediator.send(GetItem::new(9), &token()).await.unwrap_err();
    assert_eq!(err.into_handler().as_deref(), Some("item 9 not found"));
    mediator.send(GetItem::new(9), &token()).await.unwrap_err();

    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 2);
    assert!(!cache.l1().contains("item:9"));
}

#[tokio::test]
async fn test_undecodable_entry_is_recomputed() {
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), None, None);
    cache
        .l1()
        .insert("item:1", Arc::new(vec![0xc1]), Duration::from_secs(60));

    let item = mediator.send(GetItem::new(1), &token()).await.unwrap();

    assert_eq!(item.name, "alpha");
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_read_skips_handler_and_cache() {
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), None, None);
    let cancel = token();
    cancel.cancel();

    let err = mediator.send(GetItem::new(1), &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 0);
    assert!(cache.l1().is_empty());
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn test_successful_mutation_invalidates_declared_key() {
    let l2 = Arc::new(RecordingStore::default());
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    mediator
        .send(
            RenameItem {
                id: 1,
                name: "beta".into(),
            },
            &token(),
        )
        .await
        .unwrap();

    assert!(!cache.l1().contains("item:1"));
    assert!(!l2.inner.contains("item:1"));

    let item = mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(item.name, "beta");
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_tag_invalidation_reaches_keys_never_named_explicitly() {
    let l2 = Arc::new(RecordingStore::default());
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    mediator.send(ListItems { page: 1 }, &token()).await.unwrap();
    mediator.send(ListItems { page: 2 }, &token()).await.unwrap();
    assert_eq!(mediator.services().lists.load(Ordering::SeqCst), 2);

    mediator.send(AddItem { id: 2 }, &token()).await.unwrap();

    let page1 = ListItems { page: 1 }.cache_key();
    assert!(!cache.l1().contains(&page1));
    assert!(!l2.inner.contains(&page1));

    let items = mediator.send(ListItems { page: 1 }, &token()).await.unwrap();
    assert_eq!(items.len(), 2);
    mediator.send(ListItems { page: 2 }, &token()).await.unwrap();
    assert_eq!(mediator.services().lists.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_untouched() {
    let l2 = Arc::new(RecordingStore::default());
    let bus = Arc::new(RecordingBus::default());
    let (mediator, cache) = build(
        Services::with_items(&[(1, "alpha")]),
        Some(l2.clone()),
        Some(bus.clone()),
    );

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    mediator.send(ListItems { page: 1 }, &token()).await.unwrap();

    // Renaming to the current name persists nothing.
    let err = mediator
        .send(
            RenameItem {
                id: 1,
                name: "alpha".into(),
            },
            &token(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Handler(ref msg) if msg == "Failed to update item."));

    let unknown = mediator
        .send(
            RenameItem {
                id: 7,
                name: "x".into(),
            },
            &token(),
        )
        .await
        .unwrap_err();
    assert!(matches!(unknown, DispatchError::Handler(_)));

    assert!(cache.l1().contains("item:1"));
    assert!(cache.l1().contains(&ListItems { page: 1 }.cache_key()));
    assert!(l2.inner.contains("item:1"));
    assert!(!l2.log().iter().any(|op| op.starts_with("remove") || op.starts_with("take")));
    assert!(bus.events.lock().unwrap().is_empty());

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(mediator.services().reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_keys_are_removed_before_tags() {
    let l2 = Arc::new(RecordingStore::default());
    let (mediator, _) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    mediator
        .send(
            RenameItem {
                id: 1,
                name: "beta".into(),
            },
            &token(),
        )
        .await
        .unwrap();

    let log = l2.log();
    let key_removal = log.iter().position(|op| op == "remove item:1").unwrap();
    let tag_take = log.iter().position(|op| op == "take items:v1").unwrap();
    let tag_removal = log.iter().position(|op| op == "remove items:v1").unwrap();
    assert!(key_removal < tag_take);
    assert!(tag_take < tag_removal);
}

#[tokio::test]
async fn test_value_promoted_during_l2_purge_is_dropped_from_l1() {
    let l2 = Arc::new(GatedStore::default());
    let stale = Item {
        id: 1,
        name: "alpha".into(),
    };
    l2.inner
        .insert("item:1", encode(&stale).unwrap(), Duration::from_secs(600));
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);

    let rename_token = token();
    let rename = mediator.send(
        RenameItem {
            id: 1,
            name: "beta".into(),
        },
        &rename_token,
    );
    let read_while_purging = async {
        l2.entered.notified().await;
        // L1 miss, L2 still holds the old value and promotes it.
        let item = mediator.send(GetItem::new(1), &token()).await.unwrap();
        assert!(cache.l1().contains("item:1"));
        l2.release.notify_one();
        item
    };
    let (renamed, during) = tokio::join!(rename, read_while_purging);

    assert_eq!(renamed.unwrap().name, "beta");
    assert_eq!(during, stale);
    assert!(!cache.l1().contains("item:1"));
    assert!(!l2.inner.contains("item:1"));
    let item = mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert_eq!(item.name, "beta");
}

#[tokio::test]
async fn test_cancelled_l2_purge_still_purges_l1() {
    let l2 = Arc::new(GatedStore::default());
    let (mediator, cache) = build(Services::with_items(&[(1, "alpha")]), Some(l2.clone()), None);
    mediator.send(GetItem::new(1), &token()).await.unwrap();
    assert!(cache.l1().contains("item:1"));

    let cancel = token();
    let rename = mediator.send(
        RenameItem {
            id: 1,
            name: "beta".into(),
        },
        &cancel,
    );
    let cancel_while_purging = async {
        l2.entered.notified().await;
        cancel.cancel();
    };
    let (renamed, ()) = tokio::join!(rename, cancel_while_purging);

    assert_eq!(renamed.unwrap().name, "beta");
    assert!(!cache.l1().contains("item:1"));
}

#[tokio::test]
async fn test_unavailable_l2_does_not_fail_mutation() {
    let (mediator, cache) = build(
        Services::with_items(&[(1, "alpha")]),
        Some(Arc::new(FailingStore)),
        None,
    );

    mediator.send(GetItem::new(1), &token()).await.unwrap();
    let renamed = mediator
        .send(
            RenameItem {
                id: 1,
                name: "beta".into(),
            },
            &token(),
        )
        .await
        .unwrap();

    assert_eq!(renamed.name, "beta");
    assert!(!cache.l1().contains("item:1"));
}

#[tokio::test]
async fn test_successful_mutation_is_broadcast() {
    let bus = Arc::new(RecordingBus::default());
    let (mediator, cache) = build(Services::default(), None, Some(bus.clone()));

    mediator.send(AddItem { id: 3 }, &token()).await.unwrap();

    let events = bus.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].origin, cache.origin());
    assert!(events[0].keys.is_empty());
    assert_eq!(events[0].tags, vec!["items:v1".to_string()]);
}

#[tokio::test]
async fn test_cancelled_mutation_does_not_run() {
    let (mediator, _) = build(Services::with_items(&[(1, "alpha")]), None, None);
    let cancel = token();
    cancel.cancel();

    let err = mediator.send(AddItem { id: 2 }, &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(mediator.services().writes.load(Ordering::SeqCst), 0);
}
