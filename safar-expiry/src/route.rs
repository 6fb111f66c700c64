use chrono::Duration;
use safar_core::signing::{route_signature, verify_route_signature};
use safar_core::SharedClock;
use safar_shared::{IntegrityError, PersistedRecord};
use safar_store::PersistenceHandle;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entity::{EntityKind, ExpiringEntityStore, RemainingTime};
use crate::ExpiryError;

pub const RETURN_ROUTE: &str = "return_route";

/// In-app path remembered before leaving for an external page (payment
/// gateway, login), with a corruption check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedRoute {
    pub path: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub signature: String,
}

impl SignedRoute {
    pub fn sign(path: impl Into<String>, timestamp: i64) -> Self {
        let path = path.into();
        let signature = route_signature(&path, timestamp);
        Self {
            path,
            timestamp,
            signature,
        }
    }

    pub fn verify(&self) -> Result<(), IntegrityError> {
        verify_route_signature(&self.path, self.timestamp, &self.signature)
    }
}

impl PersistedRecord for SignedRoute {
    fn validate(&self) -> Result<(), IntegrityError> {
        if self.path.is_empty() {
            return Err(IntegrityError::MissingField("path"));
        }
        if self.signature.is_empty() {
            return Err(IntegrityError::MissingField("signature"));
        }
        self.verify()
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains("://")
}

/// Single remembered return-to route. Reading does not consume it; the
/// caller calls `forget` once the navigation went through.
pub struct ReturnRouteStore {
    inner: ExpiringEntityStore<SignedRoute>,
    clock: SharedClock,
}

impl ReturnRouteStore {
    pub fn kind(ttl: Duration) -> EntityKind {
        EntityKind::new(RETURN_ROUTE, ttl).with_legacy_key("returnUrl")
    }

    pub fn new(ttl: Duration, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        Self {
            inner: ExpiringEntityStore::new(Self::kind(ttl), persistence, clock.clone()),
            clock,
        }
    }

    pub async fn rehydrate(ttl: Duration, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        Self {
            inner: ExpiringEntityStore::rehydrate(Self::kind(ttl), persistence, clock.clone()).await,
            clock,
        }
    }

    pub fn remember(&mut self, path: &str) -> Result<(), ExpiryError> {
        if !is_local_path(path) {
            warn!(path, "Refusing to remember a non-local return route");
            return Err(ExpiryError::NotLocalPath(path.to_string()));
        }
        let route = SignedRoute::sign(path, self.clock.now().timestamp_millis());
        info!(path, "Return route remembered");
        self.inner.set(route);
        Ok(())
    }

    /// Remembered path if it is still valid and intact. A route that fails
    /// its signature check is dropped.
    pub fn recall(&mut self) -> Option<String> {
        let route = self.inner.value()?.clone();
        if route.verify().is_err() {
            self.inner.clear();
            return None;
        }
        Some(route.path)
    }

    pub fn forget(&mut self) {
        self.inner.clear();
    }

    pub fn is_valid(&mut self) -> bool {
        self.inner.is_valid()
    }

    pub fn remaining_time(&mut self) -> RemainingTime {
        self.inner.remaining_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use safar_core::ManualClock;
    use safar_store::{MemoryStore, PersistenceLayer, StorageBackend};
    use std::sync::Arc;

    fn setup() -> (ManualClock, Arc<MemoryStore>, PersistenceHandle) {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(MemoryStore::new());
        let layer = PersistenceLayer::new("test", vec![store.clone()], Arc::new(clock.clone()));
        (clock, store, PersistenceHandle::spawn(Arc::new(layer)))
    }

    #[test]
    fn test_signed_route_wire_shape() {
        let route = SignedRoute::sign("/checkout", 1_700_000_000_000);
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["path"], "/checkout");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert!(route.validate().is_ok());
    }

    #[tokio::test]
    async fn test_recall_is_repeatable_until_forgotten() {
        let (clock, _store, handle) = setup();
        let mut routes = ReturnRouteStore::new(Duration::hours(24), handle, Arc::new(clock));

        routes.remember("/booking/42/passengers").unwrap();
        assert_eq!(routes.recall().as_deref(), Some("/booking/42/passengers"));
        assert_eq!(routes.recall().as_deref(), Some("/booking/42/passengers"));

        routes.forget();
        assert_eq!(routes.recall(), None);
    }

    #[tokio::test]
    async fn test_remember_refuses_external_targets() {
        let (clock, _store, handle) = setup();
        let mut routes = ReturnRouteStore::new(Duration::hours(24), handle, Arc::new(clock));

        assert!(routes.remember("https://evil.example/phish").is_err());
        assert!(routes.remember("//evil.example").is_err());
        assert_eq!(routes.recall(), None);
    }

    #[tokio::test]
    async fn test_tampered_route_is_discarded_on_reload() {
        let (clock, store, handle) = setup();
        let shared: SharedClock = Arc::new(clock);
        let mut routes = ReturnRouteStore::new(Duration::hours(24), handle.clone(), shared.clone());
        routes.remember("/checkout/payment").unwrap();
        handle.flush().await;

        for key in ["test:entity:return_route", "test:returnUrl"] {
            let raw = store.get(key).await.unwrap().unwrap();
            store
                .put(key, &raw.replace("/checkout/payment", "/admin/refunds"))
                .await
                .unwrap();
        }

        let mut reloaded = ReturnRouteStore::rehydrate(Duration::hours(24), handle, shared).await;
        assert_eq!(reloaded.recall(), None);
        assert!(!reloaded.is_valid());
    }

    #[tokio::test]
    async fn test_route_expires() {
        let (clock, _store, handle) = setup();
        let mut routes = ReturnRouteStore::new(Duration::hours(24), handle, Arc::new(clock.clone()));
        routes.remember("/checkout").unwrap();

        clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert_eq!(routes.recall(), None);
        assert!(routes.remaining_time().is_zero());
    }
}
