use safar_expiry::{CitySelectionStore, ReturnRouteStore};
use safar_store::app_config::RevalidationConfig;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Background ticker that re-checks expiring selections so that expired
/// values are nulled even while nobody reads them. Aborted on `stop` or drop.
pub struct RevalidationTask {
    handle: JoinHandle<()>,
}

impl RevalidationTask {
    pub fn spawn(
        cities: Arc<Mutex<CitySelectionStore>>,
        route: Arc<Mutex<ReturnRouteStore>>,
        config: &RevalidationConfig,
    ) -> Self {
        let city_period = config.city_interval();
        let route_period = config.route_interval();

        let handle = tokio::spawn(async move {
            let mut city_tick = interval(city_period);
            let mut route_tick = interval(route_period);
            city_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            route_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(?city_period, ?route_period, "Revalidation task started");
            loop {
                tokio::select! {
                    _ = city_tick.tick() => {
                        let valid = cities.lock().await.revalidate();
                        debug!(valid, "City selections revalidated");
                    }
                    _ = route_tick.tick() => {
                        let valid = route.lock().await.is_valid();
                        debug!(valid, "Return route revalidated");
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RevalidationTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
