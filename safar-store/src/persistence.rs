use chrono::{DateTime, Utc};
use safar_core::SharedClock;
use safar_shared::PersistedRecord;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::app_config::PersistenceConfig;
use crate::backend::StorageBackend;
use crate::database::SqliteStore;
use crate::memory::MemoryStore;
use crate::redis_repo::RedisStore;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a, T: ?Sized> {
    written_at: DateTime<Utc>,
    seq: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    tombstone: bool,
    payload: Option<&'a T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    written_at: DateTime<Utc>,
    #[serde(default)]
    seq: u64,
    #[serde(default)]
    tombstone: bool,
    #[serde(default)]
    payload: serde_json::Value,
}

/// What one tier holds for a key. A tombstone masks older copies left in
/// tiers that could not be reached when the key was cleared.
enum Stored<T> {
    Record(T),
    Tombstone,
}

/// Best-effort save/load/clear over an ordered list of storage tiers.
///
/// Saves go to the first tier that accepts them. Loads read every tier and
/// return the most recently written copy that passes validation, so a value
/// written to a fallback tier during an outage wins over the stale copy in a
/// recovered primary tier. Nothing here returns an error: failures are logged
/// and the in-memory state of the caller stays authoritative.
///
/// Writes from one layer are ordered by `(writtenAt, seq)`, so two writes in
/// the same clock tick still compare in issue order.
pub struct PersistenceLayer {
    namespace: String,
    tiers: Vec<Arc<dyn StorageBackend>>,
    clock: SharedClock,
    seq: AtomicU64,
}

impl PersistenceLayer {
    pub fn new(namespace: impl Into<String>, tiers: Vec<Arc<dyn StorageBackend>>, clock: SharedClock) -> Self {
        Self {
            namespace: namespace.into(),
            tiers,
            clock,
            seq: AtomicU64::new(0),
        }
    }

    /// Build the tier list from configuration: the database tier when it
    /// opens and migrates, then Redis when reachable, else process memory.
    pub async fn connect(config: &PersistenceConfig, clock: SharedClock) -> Self {
        let mut tiers: Vec<Arc<dyn StorageBackend>> = Vec::new();

        if let Some(url) = &config.database_url {
            match SqliteStore::new(url).await {
                Ok(db) => match db.migrate().await {
                    Ok(()) => tiers.push(Arc::new(db)),
                    Err(e) => warn!("Session database migration failed, skipping tier: {}", e),
                },
                Err(e) => warn!("Session database unavailable, skipping tier: {}", e),
            }
        }

        let mut kv_ready = false;
        if let Some(url) = &config.redis_url {
            match RedisStore::new(url).await {
                Ok(redis) => match redis.ping().await {
                    Ok(()) => {
                        tiers.push(Arc::new(redis));
                        kv_ready = true;
                    }
                    Err(e) => warn!("Redis unreachable, using in-memory key-value tier: {}", e),
                },
                Err(e) => warn!("Invalid Redis url, using in-memory key-value tier: {}", e),
            }
        }
        if !kv_ready {
            tiers.push(Arc::new(MemoryStore::new()));
        }

        let names: Vec<&str> = tiers.iter().map(|t| t.name()).collect();
        info!("Persistence tiers: {:?}", names);

        Self::new(config.namespace.clone(), tiers, clock)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn envelope<T: Serialize + ?Sized>(&self, key: &str, payload: Option<&T>) -> Option<String> {
        let envelope = EnvelopeRef {
            written_at: self.clock.now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            tombstone: payload.is_none(),
            payload,
        };
        match serde_json::to_string(&envelope) {
            Ok(body) => Some(body),
            Err(e) => {
                error!(key, "Failed to serialize record: {}", e);
                None
            }
        }
    }

    /// Returns whether any tier accepted the write.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let Some(body) = self.envelope(key, Some(value)) else {
            return false;
        };

        let scoped = self.scoped(key);
        for tier in &self.tiers {
            match tier.put(&scoped, &body).await {
                Ok(()) => {
                    debug!(key, tier = tier.name(), "Record saved");
                    return true;
                }
                Err(e) => warn!(key, tier = tier.name(), "Save failed, trying next tier: {}", e),
            }
        }

        error!(key, "Save failed on every persistence tier; keeping in-memory state only");
        false
    }

    /// Freshest valid copy across all tiers, or `None`. A tombstone that is
    /// fresher than every record hides them.
    pub async fn load<T: PersistedRecord>(&self, key: &str) -> Option<T> {
        let scoped = self.scoped(key);
        let mut best: Option<((DateTime<Utc>, u64), Stored<T>)> = None;

        for tier in &self.tiers {
            let raw = match tier.get(&scoped).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key, tier = tier.name(), "Load failed: {}", e);
                    continue;
                }
            };

            let Some((version, stored)) = decode::<T>(key, tier.name(), &raw) else {
                continue;
            };

            let fresher = best.as_ref().map_or(true, |(at, _)| version > *at);
            if fresher {
                best = Some((version, stored));
            }
        }

        match best {
            Some((_, Stored::Record(record))) => Some(record),
            Some((_, Stored::Tombstone)) | None => None,
        }
    }

    /// Removes the key from every tier. When a tier cannot be reached, a
    /// tombstone is written to the tiers that can, so the copy left behind
    /// does not come back once that tier recovers. Returns whether the key
    /// now reads as absent.
    pub async fn clear(&self, key: &str) -> bool {
        let scoped = self.scoped(key);
        let mut unreached = 0;
        for tier in &self.tiers {
            if let Err(e) = tier.delete(&scoped).await {
                warn!(key, tier = tier.name(), "Clear failed: {}", e);
                unreached += 1;
            }
        }
        if unreached == 0 {
            return true;
        }

        let Some(body) = self.envelope::<()>(key, None) else {
            return false;
        };
        let mut masked = false;
        for tier in &self.tiers {
            match tier.put(&scoped, &body).await {
                Ok(()) => {
                    debug!(key, tier = tier.name(), "Tombstone written");
                    masked = true;
                }
                Err(e) => warn!(key, tier = tier.name(), "Tombstone write failed: {}", e),
            }
        }
        if !masked {
            error!(key, "Clear failed on every persistence tier");
        }
        masked
    }
}

fn decode<T: PersistedRecord>(key: &str, tier: &str, raw: &str) -> Option<((DateTime<Utc>, u64), Stored<T>)> {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(key, tier, "Discarding malformed envelope: {}", e);
            return None;
        }
    };
    let version = (envelope.written_at, envelope.seq);
    if envelope.tombstone {
        return Some((version, Stored::Tombstone));
    }

    let record: T = match serde_json::from_value(envelope.payload) {
        Ok(record) => record,
        Err(e) => {
            warn!(key, tier, "Discarding record with unexpected shape: {}", e);
            return None;
        }
    };
    if let Err(e) = record.validate() {
        warn!(key, tier, "Discarding record that failed validation: {}", e);
        return None;
    }
    Some((version, Stored::Record(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::Duration;
    use safar_core::ManualClock;
    use safar_shared::IntegrityError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Ticket {
        number: u32,
    }

    impl PersistedRecord for Ticket {
        fn validate(&self) -> Result<(), IntegrityError> {
            if self.number == 0 {
                return Err(IntegrityError::Malformed("ticket number 0".into()));
            }
            Ok(())
        }
    }

    /// Memory tier that can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> StoreResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("flaky tier is down".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StorageBackend for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
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

    fn layer_with(tiers: Vec<Arc<dyn StorageBackend>>, clock: &ManualClock) -> PersistenceLayer {
        PersistenceLayer::new("test", tiers, Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_is_down() {
        let clock = ManualClock::new(Utc::now());
        let primary = Arc::new(FlakyStore::default());
        let fallback = Arc::new(MemoryStore::new());
        let layer = layer_with(vec![primary.clone(), fallback.clone()], &clock);

        primary.set_down(true);
        assert!(layer.save("ticket", &Ticket { number: 7 }).await);
        assert_eq!(fallback.len().await, 1);
        assert_eq!(layer.load::<Ticket>("ticket").await, Some(Ticket { number: 7 }));
    }

    #[tokio::test]
    async fn test_fresher_fallback_copy_wins_after_recovery() {
        let clock = ManualClock::new(Utc::now());
        let primary = Arc::new(FlakyStore::default());
        let fallback = Arc::new(MemoryStore::new());
        let layer = layer_with(vec![primary.clone(), fallback.clone()], &clock);

        assert!(layer.save("ticket", &Ticket { number: 1 }).await);

        primary.set_down(true);
        clock.advance(Duration::seconds(5));
        assert!(layer.save("ticket", &Ticket { number: 2 }).await);

        primary.set_down(false);
        assert_eq!(layer.load::<Ticket>("ticket").await, Some(Ticket { number: 2 }));
    }

    #[tokio::test]
    async fn test_save_reports_failure_when_every_tier_fails() {
        let clock = ManualClock::new(Utc::now());
        let only = Arc::new(FlakyStore::default());
        only.set_down(true);
        let layer = layer_with(vec![only], &clock);

        assert!(!layer.save("ticket", &Ticket { number: 3 }).await);
        assert_eq!(layer.load::<Ticket>("ticket").await, None);
    }

    #[tokio::test]
    async fn test_invalid_and_malformed_records_read_as_absent() {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryStore::new());
        let layer = layer_with(vec![store.clone()], &clock);

        layer.save("ticket", &Ticket { number: 0 }).await;
        assert_eq!(layer.load::<Ticket>("ticket").await, None);

        store.put("test:other", "{not json").await.unwrap();
        assert_eq!(layer.load::<Ticket>("other").await, None);

        store
            .put("test:shape", r#"{"writtenAt":"2024-01-01T00:00:00Z","payload":{"id":1}}"#)
            .await
            .unwrap();
        assert_eq!(layer.load::<Ticket>("shape").await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_from_every_tier() {
        let clock = ManualClock::new(Utc::now());
        let a = Arc::new(MemoryStore::new());
        let b = Arc::new(MemoryStore::new());
        let layer = layer_with(vec![a.clone(), b.clone()], &clock);

        b.put("test:ticket", r#"{"writtenAt":"2024-01-01T00:00:00Z","payload":{"number":9}}"#)
            .await
            .unwrap();
        layer.save("ticket", &Ticket { number: 4 }).await;

        assert!(layer.clear("ticket").await);
        assert!(a.is_empty().await);
        assert!(b.is_empty().await);
        assert_eq!(layer.load::<Ticket>("ticket").await, None);
    }

    #[tokio::test]
    async fn test_clear_during_outage_survives_recovery() {
        let clock = ManualClock::new(Utc::now());
        let primary = Arc::new(FlakyStore::default());
        let fallback = Arc::new(MemoryStore::new());
        let layer = layer_with(vec![primary.clone(), fallback.clone()], &clock);

        assert!(layer.save("ticket", &Ticket { number: 1 }).await);

        primary.set_down(true);
        assert!(layer.clear("ticket").await);

        primary.set_down(false);
        assert_eq!(layer.load::<Ticket>("ticket").await, None);

        // a later save still wins over the tombstone, even in the same tick
        assert!(layer.save("ticket", &Ticket { number: 2 }).await);
        assert_eq!(layer.load::<Ticket>("ticket").await, Some(Ticket { number: 2 }));
    }

    #[tokio::test]
    async fn test_clear_fails_when_no_tier_is_reachable() {
        let clock = ManualClock::new(Utc::now());
        let only = Arc::new(FlakyStore::default());
        let layer = layer_with(vec![only.clone()], &clock);
        layer.save("ticket", &Ticket { number: 1 }).await;

        only.set_down(true);
        assert!(!layer.clear("ticket").await);
    }

    #[tokio::test]
    async fn test_connect_without_urls_uses_memory_tier() {
        let clock = ManualClock::new(Utc::now());
        let layer = PersistenceLayer::connect(&PersistenceConfig::default(), Arc::new(clock)).await;
        assert_eq!(layer.tier_names(), vec!["memory"]);
    }

    #[tokio::test]
    async fn test_connect_with_database_url() {
        let clock = ManualClock::new(Utc::now());
        let config = PersistenceConfig {
            database_url: Some("sqlite::memory:".to_string()),
            ..PersistenceConfig::default()
        };
        let layer = PersistenceLayer::connect(&config, Arc::new(clock)).await;
        assert_eq!(layer.tier_names(), vec!["sqlite", "memory"]);

        assert!(layer.save("ticket", &Ticket { number: 5 }).await);
        assert_eq!(layer.load::<Ticket>("ticket").await, Some(Ticket { number: 5 }));
    }
}
