use chrono::{DateTime, Duration, Utc};
use safar_core::SharedClock;
use safar_shared::{IntegrityError, PersistedRecord};
use safar_store::PersistenceHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Static description of one kind of expiring selection.
#[derive(Debug, Clone)]
pub struct EntityKind {
    pub id: String,
    pub ttl: Duration,
    /// Key older builds wrote the bare value to. Still mirrored on `set` so
    /// that older readers keep working.
    pub legacy_key: Option<String>,
}

impl EntityKind {
    pub fn new(id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            id: id.into(),
            ttl,
            legacy_key: None,
        }
    }

    pub fn with_legacy_key(mut self, key: impl Into<String>) -> Self {
        self.legacy_key = Some(key.into());
        self
    }

    pub fn primary_key(&self) -> String {
        format!("entity:{}", self.id)
    }

    /// Rehydration order: the primary record first, then the legacy key.
    pub fn sources(&self) -> Vec<EntitySource> {
        let mut sources = vec![EntitySource::Primary(self.primary_key())];
        if let Some(key) = &self.legacy_key {
            sources.push(EntitySource::Legacy(key.clone()));
        }
        sources
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySource {
    Primary(String),
    Legacy(String),
}

/// Persisted shape of an expiring selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringEntity<T> {
    pub id: String,
    pub value: Option<T>,
    pub last_updated: DateTime<Utc>,
    pub manually_cleared: bool,
}

impl<T: PersistedRecord> PersistedRecord for ExpiringEntity<T> {
    fn validate(&self) -> Result<(), IntegrityError> {
        if self.id.is_empty() {
            return Err(IntegrityError::MissingField("id"));
        }
        match &self.value {
            Some(value) => value.validate(),
            None => Ok(()),
        }
    }
}

/// Time left before an entity expires, split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemainingTime {
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl RemainingTime {
    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }

    pub fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// One value with a TTL and a manual-clear flag.
///
/// Expiry is lazy: nothing happens when the TTL passes, the next read nulls
/// the value and persists that. A manual clear is sticky across reloads and
/// beats any legacy data found during rehydration.
pub struct ExpiringEntityStore<T> {
    kind: EntityKind,
    entity: ExpiringEntity<T>,
    persistence: PersistenceHandle,
    clock: SharedClock,
}

impl<T: PersistedRecord + Clone> ExpiringEntityStore<T> {
    pub fn new(kind: EntityKind, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        let entity = ExpiringEntity {
            id: kind.id.clone(),
            value: None,
            last_updated: clock.now(),
            manually_cleared: false,
        };
        Self {
            kind,
            entity,
            persistence,
            clock,
        }
    }

    pub async fn rehydrate(kind: EntityKind, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        let mut store = Self::new(kind, persistence, clock);

        for source in store.kind.sources() {
            match source {
                EntitySource::Primary(key) => {
                    let Some(record) = store.persistence.load::<ExpiringEntity<T>>(&key).await else {
                        continue;
                    };
                    if record.id != store.kind.id {
                        warn!(key = %key, stored = %record.id, "Ignoring entity stored under another id");
                        continue;
                    }

                    if record.manually_cleared {
                        let healed = record.value.is_some();
                        store.entity = ExpiringEntity { value: None, ..record };
                        if healed {
                            store.persist();
                        }
                        debug!(kind = %store.kind.id, "Entity stays cleared");
                        return store;
                    }

                    if record.value.is_some() {
                        store.entity = record;
                        // drops it now if it expired while the page was closed
                        store.is_valid();
                        return store;
                    }

                    store.entity = record;
                }
                EntitySource::Legacy(key) => {
                    if let Some(value) = store.persistence.load::<T>(&key).await {
                        store.migrate_legacy(value);
                    }
                    return store;
                }
            }
        }

        store
    }

    /// Brings a legacy value under the primary record. The value gets a fresh
    /// TTL window because the legacy format carried no timestamp.
    fn migrate_legacy(&mut self, value: T) {
        info!(kind = %self.kind.id, "Migrating legacy value into primary record");
        self.entity.value = Some(value);
        self.entity.manually_cleared = false;
        self.entity.last_updated = self.clock.now();
        self.persist();
    }

    pub fn set(&mut self, value: T) {
        if let Some(key) = &self.kind.legacy_key {
            self.persistence.schedule_save(key, &value);
        }
        self.entity.value = Some(value);
        self.entity.manually_cleared = false;
        self.entity.last_updated = self.clock.now();
        self.persist();
    }

    pub fn clear(&mut self) {
        self.entity.value = None;
        self.entity.manually_cleared = true;
        self.entity.last_updated = self.clock.now();
        self.persist();
        self.drop_legacy_mirror();
    }

    pub fn is_valid(&mut self) -> bool {
        if self.entity.manually_cleared || self.entity.value.is_none() {
            return false;
        }

        if self.clock.now() - self.entity.last_updated > self.kind.ttl {
            debug!(kind = %self.kind.id, "Entity expired, dropping value");
            self.entity.value = None;
            self.persist();
            self.drop_legacy_mirror();
            return false;
        }

        true
    }

    /// Current value, or `None` once cleared or expired.
    pub fn value(&mut self) -> Option<&T> {
        if self.is_valid() {
            self.entity.value.as_ref()
        } else {
            None
        }
    }

    pub fn remaining_time(&mut self) -> RemainingTime {
        if !self.is_valid() {
            return RemainingTime::default();
        }
        let left = self.kind.ttl - (self.clock.now() - self.entity.last_updated);
        RemainingTime::from_seconds(left.num_seconds().max(0) as u64)
    }

    pub fn is_manually_cleared(&self) -> bool {
        self.entity.manually_cleared
    }

    /// Snapshot of the record as it stands, without running the expiry check.
    pub fn entity(&self) -> &ExpiringEntity<T> {
        &self.entity
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    fn persist(&self) {
        self.persistence.schedule_save(&self.kind.primary_key(), &self.entity);
    }

    fn drop_legacy_mirror(&self) {
        if let Some(key) = &self.kind.legacy_key {
            self.persistence.schedule_clear(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use safar_core::{Clock, ManualClock};
    use safar_shared::City;
    use safar_store::{MemoryStore, PersistenceLayer, StorageBackend, StoreError, StoreResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Database-like tier that can be taken offline.
    #[derive(Default)]
    struct OutageStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl OutageStore {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("database offline".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StorageBackend for OutageStore {
        fn name(&self) -> &'static str {
            "outage"
        }
        async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.put(key, value).await
        }
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.check()?;
            self.inner.get(key).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }
    }

    fn setup() -> (ManualClock, PersistenceHandle) {
        let clock = ManualClock::new(Utc::now());
        let layer = PersistenceLayer::new(
            "test",
            vec![Arc::new(MemoryStore::new())],
            Arc::new(clock.clone()),
        );
        (clock, PersistenceHandle::spawn(Arc::new(layer)))
    }

    fn kind() -> EntityKind {
        EntityKind::new("city", Duration::seconds(86_400)).with_legacy_key("legacy:city")
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (clock, handle) = setup();
        let mut store = ExpiringEntityStore::new(kind(), handle, Arc::new(clock.clone()));
        store.set(City::new("11320000", "Tehran"));

        clock.advance(Duration::seconds(86_399));
        assert!(store.is_valid());
        assert_eq!(store.remaining_time(), RemainingTime::from_seconds(1));

        clock.advance(Duration::seconds(2));
        assert!(!store.is_valid());
        assert!(store.value().is_none());
        assert!(store.entity().value.is_none());
        assert!(store.remaining_time().is_zero());
        assert!(!store.is_manually_cleared());
    }

    #[tokio::test]
    async fn test_remaining_time_breakdown() {
        let (clock, handle) = setup();
        let mut store = ExpiringEntityStore::new(kind(), handle, Arc::new(clock.clone()));
        store.set(City::new("1", "Shiraz"));

        clock.advance(Duration::seconds(3_661));
        let left = store.remaining_time();
        assert_eq!((left.hours, left.minutes, left.seconds), (22, 58, 59));
        assert_eq!(left.to_string(), "22:58:59");
    }

    #[tokio::test]
    async fn test_clear_survives_rehydration_with_legacy_data() {
        let (clock, handle) = setup();
        let shared: SharedClock = Arc::new(clock.clone());
        let mut store = ExpiringEntityStore::new(kind(), handle.clone(), shared.clone());
        store.set(City::new("11320000", "Tehran"));
        store.clear();
        handle.flush().await;

        // an older build writes the legacy key behind our back
        handle.schedule_save("legacy:city", &City::new("21310000", "Isfahan"));
        handle.flush().await;

        let mut reloaded = ExpiringEntityStore::<City>::rehydrate(kind(), handle.clone(), shared).await;
        assert!(reloaded.is_manually_cleared());
        assert!(reloaded.value().is_none());
        assert!(!reloaded.is_valid());
    }

    #[tokio::test]
    async fn test_expiry_during_database_outage_stays_expired_after_recovery() {
        let clock = ManualClock::new(Utc::now());
        let database = Arc::new(OutageStore::default());
        let layer = PersistenceLayer::new(
            "test",
            vec![database.clone(), Arc::new(MemoryStore::new())],
            Arc::new(clock.clone()),
        );
        let handle = PersistenceHandle::spawn(Arc::new(layer));
        let shared: SharedClock = Arc::new(clock.clone());

        let mut store = ExpiringEntityStore::new(kind(), handle.clone(), shared.clone());
        store.set(City::new("1", "Tabriz"));
        handle.flush().await;

        clock.advance(Duration::hours(25));
        database.set_down(true);
        assert!(!store.is_valid());
        handle.flush().await;
        database.set_down(false);

        let mut reloaded = ExpiringEntityStore::<City>::rehydrate(kind(), handle.clone(), shared).await;
        assert!(reloaded.value().is_none());
        assert!(!reloaded.is_valid());
    }

    #[tokio::test]
    async fn test_legacy_value_migrates_with_fresh_window() {
        let (clock, handle) = setup();
        let shared: SharedClock = Arc::new(clock.clone());
        handle.schedule_save("legacy:city", &City::new("71360000", "Mashhad"));
        handle.flush().await;

        clock.advance(Duration::hours(30));
        let mut store = ExpiringEntityStore::<City>::rehydrate(kind(), handle.clone(), shared.clone()).await;
        assert_eq!(store.value().map(|c| c.code.as_str()), Some("71360000"));
        assert_eq!(store.entity().last_updated, clock.now());
        handle.flush().await;

        let primary = handle.load::<ExpiringEntity<City>>("entity:city").await.unwrap();
        assert_eq!(primary.value, Some(City::new("71360000", "Mashhad")));
    }

    #[tokio::test]
    async fn test_expired_value_is_not_resurrected_through_legacy() {
        let (clock, handle) = setup();
        let shared: SharedClock = Arc::new(clock.clone());
        let mut store = ExpiringEntityStore::new(kind(), handle.clone(), shared.clone());
        store.set(City::new("1", "Tabriz"));
        handle.flush().await;

        clock.advance(Duration::hours(25));
        let mut reloaded = ExpiringEntityStore::<City>::rehydrate(kind(), handle.clone(), shared.clone()).await;
        assert!(reloaded.value().is_none());
        handle.flush().await;

        let mut again = ExpiringEntityStore::<City>::rehydrate(kind(), handle.clone(), shared).await;
        assert!(again.value().is_none());
    }

    #[tokio::test]
    async fn test_set_after_clear_revives() {
        let (clock, handle) = setup();
        let mut store = ExpiringEntityStore::new(kind(), handle, Arc::new(clock));
        store.clear();
        store.set(City::new("2", "Yazd"));
        assert!(!store.is_manually_cleared());
        assert!(store.is_valid());
    }

    #[test]
    fn test_source_order() {
        assert_eq!(
            kind().sources(),
            vec![
                EntitySource::Primary("entity:city".into()),
                EntitySource::Legacy("legacy:city".into()),
            ]
        );
        assert_eq!(EntityKind::new("x", Duration::seconds(1)).sources().len(), 1);
    }
}
