use super::persistence::Persistence;
use super::StoreBuilder;
use crate::error::{Result, StorageError, StoreError};
use crate::middleware::{Flow, Middleware, Pipeline};
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Result of a `set` or `update` call that was not rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// The value passed every middleware step and is now the current state.
    Committed,
    /// A middleware step halted the update. State is unchanged.
    Vetoed,
}

/// How a store's startup load from storage went.
#[derive(Clone, Debug)]
pub enum Hydration {
    /// No storage key configured.
    Skipped,
    /// Storage held no record; the initial value stands.
    Missing,
    /// The stored record replaced the initial value.
    Restored,
    /// Loading failed; the initial value stands.
    Failed(Arc<StoreError>),
}

impl Hydration {
    pub fn is_restored(&self) -> bool {
        matches!(self, Hydration::Restored)
    }
}

pub(crate) struct Inner<T: Send + 'static> {
    state: RwLock<T>,
    subscribers: RwLock<BTreeMap<usize, Subscriber<T>>>,
    next_subscriber: AtomicUsize,
    pipeline: RwLock<Pipeline<T>>,
    persistence: Option<Persistence<T>>,
    // Serializes state writes with their notification round.
    commit_lock: ReentrantMutex<()>,
    commits: AtomicU64,
    hydration: watch::Sender<Option<Hydration>>,
}

/// A reactive container for a single state value.
///
/// Every `set` walks the middleware pipeline, commits the result, notifies
/// subscribers and then, if a storage key is configured, writes the value
/// through to storage. Handles are cheap to clone and share one state.
///
/// # Examples
///
/// ```
/// use bolsa::Store;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = Store::new(0);
/// let _sub = store.subscribe(|n| println!("count is {n}"));
///
/// store.set(1).await.unwrap();
/// assert_eq!(store.get(), 1);
/// # });
/// ```
pub struct Store<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an in-memory store with no middleware and no persistence.
    pub fn new(initial: T) -> Self {
        StoreBuilder::new(initial).build()
    }

    /// Start configuring a store with middleware and persistence.
    pub fn builder(initial: T) -> StoreBuilder<T> {
        StoreBuilder::new(initial)
    }

    pub(crate) fn from_parts(
        initial: T,
        pipeline: Pipeline<T>,
        persistence: Option<Persistence<T>>,
    ) -> Self {
        let hydration = if persistence.is_some() {
            None
        } else {
            Some(Hydration::Skipped)
        };
        let (hydration, _) = watch::channel(hydration);

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(initial),
                subscribers: RwLock::new(BTreeMap::new()),
                next_subscriber: AtomicUsize::new(0),
                pipeline: RwLock::new(pipeline),
                persistence,
                commit_lock: ReentrantMutex::new(()),
                commits: AtomicU64::new(0),
                hydration,
            }),
        }
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Read state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Submit a new state value.
    ///
    /// Waits for hydration to finish, then runs the value through the
    /// middleware registered at this point. On success the value is committed
    /// and subscribers are notified before the storage write is issued. A
    /// storage failure is returned as `Err` but the commit stands.
    pub async fn set(&self, new_state: T) -> Result<Update> {
        self.ready().await;

        let pipeline = self.inner.pipeline.read().clone();
        match pipeline.run(new_state).await {
            Flow::Continue(state) => {
                self.commit(state).await?;
                Ok(Update::Committed)
            }
            Flow::Halt => Ok(Update::Vetoed),
            Flow::Abort(reason) => Err(StoreError::Aborted(reason)),
        }
    }

    /// Derive the next state from the current one and submit it.
    ///
    /// The closure edits a copy of the state as of this call. Concurrent
    /// updates are not merged: whichever pipeline resolves last wins.
    pub async fn update<F>(&self, f: F) -> Result<Update>
    where
        F: FnOnce(&mut T) + Send,
    {
        self.ready().await;

        let mut next = self.get();
        f(&mut next);
        self.set(next).await
    }

    /// Subscribe to state changes.
    ///
    /// The callback runs once right away with the current state, then after
    /// every commit. It stays registered until [`Subscription::unsubscribe`]
    /// is called; dropping the handle does not remove it. A panic in the
    /// first call is logged and the handle is still returned.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        let callback: Subscriber<T> = Arc::new(callback);

        let _commit = self.inner.commit_lock.lock();
        self.inner.subscribers.write().insert(id, Arc::clone(&callback));
        let current = self.get();
        if panic::catch_unwind(AssertUnwindSafe(|| callback(&current))).is_err() {
            error!("subscriber panicked on its initial call");
        }

        let owner: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription { id, owner }
    }

    /// Append a middleware step. Only updates submitted afterwards see it.
    pub fn use_middleware<M>(&self, step: M)
    where
        M: Middleware<T> + 'static,
    {
        self.inner.pipeline.write().push(step);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    pub fn storage_key(&self) -> Option<&str> {
        self.inner.persistence.as_ref().map(|p| p.key.as_str())
    }

    /// Wait until startup hydration has finished and report how it went.
    ///
    /// Resolves immediately for stores without a storage key.
    pub async fn ready(&self) -> Hydration {
        let mut outcome = self.inner.hydration.subscribe();
        let hydration = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|h| h.clone());
        hydration.unwrap_or(Hydration::Skipped)
    }

    /// Hydration outcome so far, or `None` while it is still running.
    pub fn hydration(&self) -> Option<Hydration> {
        self.inner.hydration.borrow().clone()
    }

    /// Load the persisted record into memory. Never fails: errors are logged
    /// and reported in the returned outcome, keeping the initial value.
    pub(crate) async fn hydrate(&self) -> Hydration {
        let guard = HydrationGuard {
            outcome: &self.inner.hydration,
            armed: true,
        };

        let outcome = match &self.inner.persistence {
            None => Hydration::Skipped,
            Some(persistence) => match persistence.read().await {
                Ok(Some(state)) => {
                    self.apply(&state);
                    info!(key = %persistence.key, "state restored from storage");
                    Hydration::Restored
                }
                Ok(None) => {
                    debug!(key = %persistence.key, "no stored state, keeping initial value");
                    Hydration::Missing
                }
                Err(e) => {
                    warn!(key = %persistence.key, error = %e, "hydration failed, keeping initial value");
                    Hydration::Failed(Arc::new(e))
                }
            },
        };

        guard.finish(outcome.clone());
        outcome
    }

    pub(crate) fn finish_hydration(&self, outcome: Hydration) {
        self.inner.hydration.send_replace(Some(outcome));
    }

    /// Spawn hydration on the ambient Tokio runtime.
    pub(crate) fn spawn_hydration(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move {
                    store.hydrate().await;
                });
            }
            Err(e) => {
                warn!(error = %e, "no async runtime, skipping hydration");
                let err = StorageError::Unavailable(format!("no async runtime: {e}"));
                self.finish_hydration(Hydration::Failed(Arc::new(err.into())));
            }
        }
    }

    /// Write the state and notify subscribers. Returns the commit's sequence number.
    fn apply(&self, state: &T) -> u64 {
        let _commit = self.inner.commit_lock.lock();

        let seq = self.inner.commits.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.state.write() = state.clone();
        debug!(seq, "state committed");

        self.notify(state);
        seq
    }

    /// Commit a value that made it through the pipeline, then persist it.
    async fn commit(&self, state: T) -> Result<()> {
        let seq = self.apply(&state);
        let Some(persistence) = &self.inner.persistence else {
            return Ok(());
        };

        let result = match persistence.seal(&state) {
            Ok(record) => persistence.write(seq, &record).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(key = %persistence.key, error = %e, "failed to persist committed state");
        }
        result
    }

    fn notify(&self, state: &T) {
        let subscribers: Vec<Subscriber<T>> =
            self.inner.subscribers.read().values().cloned().collect();

        for subscriber in subscribers {
            if panic::catch_unwind(AssertUnwindSafe(|| subscriber(state))).is_err() {
                error!("subscriber panicked during notification");
            }
        }
    }
}

impl<T: Send + 'static> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Store<T>
where
    T: fmt::Debug + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.read())
            .field("subscribers", &self.inner.subscribers.read().len())
            .field("pipeline", &*self.inner.pipeline.read())
            .field(
                "encrypted",
                &self.inner.persistence.as_ref().map(|p| p.is_encrypted()),
            )
            .finish()
    }
}

/// Create an in-memory store.
pub fn create_store<T>(initial: T) -> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    Store::new(initial)
}

/// Reports the hydration outcome even if the hydrating future unwinds or is
/// dropped, so `ready()` always resolves.
struct HydrationGuard<'a> {
    outcome: &'a watch::Sender<Option<Hydration>>,
    armed: bool,
}

impl HydrationGuard<'_> {
    fn finish(mut self, outcome: Hydration) {
        self.armed = false;
        self.outcome.send_replace(Some(outcome));
    }
}

impl Drop for HydrationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("hydration interrupted, keeping initial value");
            let err = Arc::new(StoreError::HydrationInterrupted);
            self.outcome.send_replace(Some(Hydration::Failed(err)));
        }
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: usize);
}

impl<T: Send + Sync + 'static> Detach for Inner<T> {
    fn detach(&self, id: usize) {
        self.subscribers.write().remove(&id);
    }
}

/// Handle returned by [`Store::subscribe`].
pub struct Subscription {
    id: usize,
    owner: Weak<dyn Detach>,
}

impl Subscription {
    /// Stop receiving notifications. Calling this again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.detach(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{AesGcmCipher, SecretKey};
    use crate::codec::{Codec, JsonCodec};
    use crate::storage::{MemoryStorage, StorageAdapter};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct AppState {
        count: usize,
        name: String,
    }

    fn app_state(count: usize) -> AppState {
        AppState {
            count,
            name: "test".to_string(),
        }
    }

    #[derive(Default)]
    struct CountingStorage {
        records: MemoryStorage,
        saves: AtomicUsize,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl StorageAdapter for CountingStorage {
        async fn save(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.records.save(key, value).await
        }

        async fn load(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.records.load(key).await
        }
    }

    struct FailingStorage;

    #[async_trait]
    impl StorageAdapter for FailingStorage {
        async fn save(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        async fn load(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("backend offline".to_string()))
        }
    }

    struct PanickingStorage;

    #[async_trait]
    impl StorageAdapter for PanickingStorage {
        async fn save(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Ok(())
        }

        async fn load(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            panic!("load blew up");
        }
    }

    struct StalledStorage;

    #[async_trait]
    impl StorageAdapter for StalledStorage {
        async fn save(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Ok(())
        }

        async fn load(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            std::future::pending().await
        }
    }

    /// Fails its first save. Records whether subscribers had already run when
    /// each save started.
    #[derive(Default)]
    struct OrderingStorage {
        records: MemoryStorage,
        notified: Arc<AtomicBool>,
        notified_at_save: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl StorageAdapter for OrderingStorage {
        async fn save(&self, key: &str, value: &str) -> std::result::Result<(), StorageError> {
            let first = {
                let mut seen = self.notified_at_save.lock();
                seen.push(self.notified.swap(false, Ordering::SeqCst));
                seen.len() == 1
            };
            if first {
                return Err(StorageError::Unavailable("first save rejected".to_string()));
            }
            self.records.save(key, value).await
        }

        async fn load(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            self.records.load(key).await
        }
    }

    #[tokio::test]
    async fn store_get_set() {
        let store = Store::new(app_state(0));
        assert_eq!(store.get().count, 0);

        let update = store
            .set(AppState {
                count: 42,
                name: "updated".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(update, Update::Committed);
        assert_eq!(store.get().count, 42);
        assert_eq!(store.get().name, "updated");
    }

    #[tokio::test]
    async fn store_update() {
        let store = Store::new(app_state(0));

        store.update(|state| state.count += 10).await.unwrap();
        assert_eq!(store.get().count, 10);
    }

    #[tokio::test]
    async fn store_subscribe() {
        let store = Store::new(app_state(0));
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let _sub = store.subscribe(move |_state| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Called once on subscribe
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        store.update(|state| state.count += 1).await.unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        store.update(|state| state.count += 1).await.unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let store = Store::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let sub = store.subscribe(move |n| seen_clone.lock().push(*n));
        store.set(1).await.unwrap();

        sub.unsubscribe();
        sub.unsubscribe();
        store.set(2).await.unwrap();

        assert_eq!(*seen.lock(), vec![0, 1]);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_after_store_dropped() {
        let store = Store::new(0);
        let sub = store.subscribe(|_| {});
        drop(store);

        sub.unsubscribe();
    }

    #[tokio::test]
    async fn veto_skips_commit_and_notification() {
        let store = Store::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = store.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.use_middleware(|_: i32| Flow::Halt);

        assert_eq!(store.set(5).await.unwrap(), Update::Vetoed);
        assert_eq!(store.get(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_is_reported() {
        let store = Store::new(0);
        store.use_middleware(|n: i32| {
            if n < 0 {
                Flow::Abort("negative".to_string())
            } else {
                Flow::Continue(n)
            }
        });

        let err = store.set(-1).await.unwrap_err();
        assert!(matches!(err, StoreError::Aborted(reason) if reason == "negative"));
        assert_eq!(store.get(), 0);
    }

    #[tokio::test]
    async fn middleware_transforms_value() {
        let store = Store::new(0);
        store.use_middleware(|n: i32| Flow::Continue(n.clamp(0, 10)));

        store.set(50).await.unwrap();
        assert_eq!(store.get(), 10);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_block_others() {
        let store = Store::new(0);
        let seen = Arc::new(AtomicUsize::new(0));

        let _bad = store.subscribe(|n: &i32| {
            if *n > 0 {
                panic!("subscriber failure");
            }
        });
        let seen_clone = seen.clone();
        let _good = store.subscribe(move |n| {
            seen_clone.store(*n as usize, Ordering::SeqCst);
        });

        store.set(3).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(store.get(), 3);
    }

    #[tokio::test]
    async fn subscriber_can_subscribe_during_notification() {
        let store = Store::new(0);
        let nested = Arc::new(Mutex::new(Vec::new()));

        let store_clone = store.clone();
        let nested_clone = nested.clone();
        let _outer = store.subscribe(move |n: &i32| {
            if *n == 1 {
                let _ = store_clone.subscribe({
                    let nested = nested_clone.clone();
                    move |m: &i32| nested.lock().push(*m)
                });
            }
        });

        store.set(1).await.unwrap();
        assert_eq!(*nested.lock(), vec![1]);
    }

    #[tokio::test]
    async fn store_without_key_skips_hydration() {
        let store = Store::builder(app_state(0))
            .encrypt(AesGcmCipher::new(&SecretKey::generate()))
            .build();

        assert!(matches!(store.hydration(), Some(Hydration::Skipped)));
        store.set(app_state(1)).await.unwrap();

        assert_eq!(store.storage_key(), None);
        assert_eq!(store.get(), app_state(1));
    }

    #[tokio::test]
    async fn storage_touched_only_on_hydrate_and_commit() {
        let storage = Arc::new(CountingStorage::default());
        let store = Store::builder(app_state(0))
            .persist_shared("k", storage.clone())
            .build_hydrated()
            .await;

        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
        assert_eq!(storage.saves.load(Ordering::SeqCst), 0);

        store.use_middleware(|s: AppState| if s.count > 1 { Flow::Halt } else { Flow::Continue(s) });
        store.set(app_state(1)).await.unwrap();
        store.set(app_state(2)).await.unwrap();

        assert_eq!(storage.saves.load(Ordering::SeqCst), 1);
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hydration_missing_keeps_initial() {
        let storage = Arc::new(CountingStorage::default());
        let store = Store::builder(app_state(7))
            .persist_shared("k", storage.clone())
            .build();

        assert!(matches!(store.ready().await, Hydration::Missing));
        assert_eq!(store.get(), app_state(7));
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
        assert_eq!(storage.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hydration_restores_and_notifies() {
        let storage = MemoryStorage::new();
        storage.insert("k", JsonCodec.encode(&app_state(42)).unwrap());

        let store = Store::builder(app_state(0))
            .persist("k", storage.clone())
            .build();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = store.subscribe(move |s: &AppState| seen_clone.lock().push(s.count));

        assert!(store.ready().await.is_restored());
        assert_eq!(store.get().count, 42);
        assert_eq!(seen.lock().last(), Some(&42));
    }

    #[tokio::test]
    async fn hydration_failure_is_reported_not_raised() {
        let store = Store::builder(app_state(3))
            .persist("k", FailingStorage)
            .build();

        match store.ready().await {
            Hydration::Failed(err) => {
                assert!(matches!(*err, StoreError::Storage(StorageError::Unavailable(_))))
            }
            other => panic!("unexpected hydration outcome: {other:?}"),
        }
        assert_eq!(store.get(), app_state(3));
    }

    #[tokio::test]
    async fn corrupt_record_keeps_initial() {
        let storage = MemoryStorage::new();
        storage.insert("k", "{\"count\": 4");

        let store = Store::builder(app_state(1))
            .persist("k", storage)
            .build_hydrated()
            .await;

        assert!(matches!(store.hydration(), Some(Hydration::Failed(_))));
        assert_eq!(store.get(), app_state(1));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_commit() {
        let store = Store::builder(app_state(0))
            .persist("k", FailingStorage)
            .build_hydrated()
            .await;

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let _sub = store.subscribe(move |s: &AppState| {
            seen_clone.store(s.count, Ordering::SeqCst);
        });

        let err = store.set(app_state(9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.get().count, 9);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn encrypted_write_through() {
        let key = SecretKey::generate();
        let storage = MemoryStorage::new();
        let store = Store::builder(app_state(0))
            .persist("k", storage.clone())
            .encrypt(AesGcmCipher::new(&key))
            .build_hydrated()
            .await;

        store.set(app_state(5)).await.unwrap();

        let record = storage.get("k").unwrap();
        assert!(!record.contains("count"));

        let reopened = Store::builder(app_state(0))
            .persist("k", storage)
            .encrypt(AesGcmCipher::new(&key))
            .build_hydrated()
            .await;
        assert_eq!(reopened.get(), app_state(5));
    }

    #[tokio::test]
    async fn set_waits_for_hydration() {
        let storage = MemoryStorage::new();
        storage.insert("k", "10");

        let store = Store::builder(0i32).persist("k", storage.clone()).build();
        store.update(|n| *n += 1).await.unwrap();

        assert_eq!(store.get(), 11);
        assert_eq!(storage.get("k").as_deref(), Some("11"));
    }

    #[tokio::test]
    async fn panicking_hydration_releases_set() {
        let store = Store::builder(5i32).persist("k", PanickingStorage).build();

        let update = tokio::time::timeout(Duration::from_secs(2), store.set(6))
            .await
            .expect("set stayed blocked on hydration")
            .unwrap();

        assert_eq!(update, Update::Committed);
        assert_eq!(store.get(), 6);
        match store.hydration() {
            Some(Hydration::Failed(err)) => {
                assert!(matches!(*err, StoreError::HydrationInterrupted))
            }
            other => panic!("unexpected hydration outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_hydration_reports_failure() {
        let store = Store::builder(1i32).persist("k", StalledStorage).build();
        assert!(store.hydration().is_none());

        let cancelled = tokio::time::timeout(Duration::from_millis(20), store.hydrate()).await;
        assert!(cancelled.is_err());

        assert!(matches!(
            store.ready().await,
            Hydration::Failed(ref err) if matches!(**err, StoreError::HydrationInterrupted)
        ));
        store.set(2).await.unwrap();
        assert_eq!(store.get(), 2);
    }

    #[tokio::test]
    async fn panicking_first_call_still_returns_handle() {
        let store = Store::new(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let sub = store.subscribe(move |_: &i32| {
            if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first call fails");
            }
        });
        assert_eq!(store.subscriber_count(), 1);

        store.set(1).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
        store.set(2).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn notify_precedes_save_and_failed_save_does_not_stick() {
        let storage = Arc::new(OrderingStorage::default());
        let store = Store::builder(0i32)
            .persist_shared("k", storage.clone())
            .build_hydrated()
            .await;

        let notified = storage.notified.clone();
        let _sub = store.subscribe(move |_: &i32| notified.store(true, Ordering::SeqCst));
        storage.notified.store(false, Ordering::SeqCst);

        let err = store.set(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(StorageError::Unavailable(_))));
        assert_eq!(store.get(), 1);
        assert_eq!(storage.records.get("k"), None);

        store.set(2).await.unwrap();
        assert_eq!(storage.records.get("k").as_deref(), Some("2"));
        assert_eq!(*storage.notified_at_save.lock(), vec![true, true]);
    }
}
