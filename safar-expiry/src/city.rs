use chrono::Duration;
use safar_core::SharedClock;
use safar_shared::City;
use safar_store::PersistenceHandle;

use crate::entity::{EntityKind, ExpiringEntityStore, RemainingTime};

pub const ORIGIN_CITY: &str = "origin_city";
pub const DESTINATION_CITY: &str = "destination_city";

/// Origin and destination picked on the search form.
pub struct CitySelectionStore {
    origin: ExpiringEntityStore<City>,
    destination: ExpiringEntityStore<City>,
}

impl CitySelectionStore {
    pub fn kinds(ttl: Duration) -> (EntityKind, EntityKind) {
        (
            EntityKind::new(ORIGIN_CITY, ttl).with_legacy_key("selectedOriginCity"),
            EntityKind::new(DESTINATION_CITY, ttl).with_legacy_key("selectedDestinationCity"),
        )
    }

    pub fn new(ttl: Duration, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        let (origin, destination) = Self::kinds(ttl);
        Self {
            origin: ExpiringEntityStore::new(origin, persistence.clone(), clock.clone()),
            destination: ExpiringEntityStore::new(destination, persistence, clock),
        }
    }

    pub async fn rehydrate(ttl: Duration, persistence: PersistenceHandle, clock: SharedClock) -> Self {
        let (origin, destination) = Self::kinds(ttl);
        Self {
            origin: ExpiringEntityStore::rehydrate(origin, persistence.clone(), clock.clone()).await,
            destination: ExpiringEntityStore::rehydrate(destination, persistence, clock).await,
        }
    }

    pub fn set_origin(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.origin.set(City::new(code, name));
    }

    pub fn set_destination(&mut self, code: impl Into<String>, name: impl Into<String>) {
        self.destination.set(City::new(code, name));
    }

    pub fn clear_origin(&mut self) {
        self.origin.clear();
    }

    pub fn clear_destination(&mut self) {
        self.destination.clear();
    }

    pub fn origin_city(&mut self) -> Option<City> {
        self.origin.value().cloned()
    }

    pub fn destination_city(&mut self) -> Option<City> {
        self.destination.value().cloned()
    }

    pub fn is_origin_valid(&mut self) -> bool {
        self.origin.is_valid()
    }

    pub fn is_destination_valid(&mut self) -> bool {
        self.destination.is_valid()
    }

    pub fn origin_remaining(&mut self) -> RemainingTime {
        self.origin.remaining_time()
    }

    pub fn destination_remaining(&mut self) -> RemainingTime {
        self.destination.remaining_time()
    }

    /// Periodic check: returns how many selections are still valid.
    pub fn revalidate(&mut self) -> usize {
        [self.origin.is_valid(), self.destination.is_valid()]
            .into_iter()
            .filter(|valid| *valid)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use safar_core::ManualClock;
    use safar_store::{MemoryStore, PersistenceLayer};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cleared_destination_stays_cleared_after_reload() {
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let layer = PersistenceLayer::new("test", vec![Arc::new(MemoryStore::new())], clock.clone());
        let handle = PersistenceHandle::spawn(Arc::new(layer));
        let ttl = Duration::hours(24);

        let mut cities = CitySelectionStore::new(ttl, handle.clone(), clock.clone());
        cities.set_origin("21310000", "اصفهان");
        cities.set_destination("11320000", "تهران");
        cities.clear_destination();
        handle.flush().await;

        let mut reloaded = CitySelectionStore::rehydrate(ttl, handle, clock).await;
        assert_eq!(reloaded.destination_city(), None);
        assert!(!reloaded.is_destination_valid());
        assert_eq!(reloaded.origin_city().map(|c| c.name), Some("اصفهان".to_string()));
        assert_eq!(reloaded.revalidate(), 1);
    }
}
