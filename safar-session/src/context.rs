use async_trait::async_trait;
use safar_core::{credential_tag, CredentialProvider, SharedClock};
use safar_expiry::{CitySelectionStore, ReturnRouteStore};
use safar_flow::{FlowOrchestrator, FlowState, StepDefinition};
use safar_seating::{ClickOutcome, SeatSelectionEngine};
use safar_shared::{SeatId, SeatNumber, SeatState};
use safar_store::app_config::Config;
use safar_store::{PersistenceHandle, PersistenceLayer};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::guard::NavigationGuard;
use crate::revalidation::RevalidationTask;
use crate::{NavigationError, SessionError, SessionResult};

/// UI navigation collaborator.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, path: &str) -> Result<(), NavigationError>;
}

/// What a session is opened for: the ticket being seated and the wizard
/// driving the purchase.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ticket_id: String,
    pub flow_name: String,
    pub steps: Vec<StepDefinition>,
}

/// Everything one booking session owns. Built once, then passed around by
/// reference; there is no global instance.
pub struct SessionContext {
    config: Config,
    persistence: PersistenceHandle,
    seats: Mutex<SeatSelectionEngine>,
    cities: Arc<Mutex<CitySelectionStore>>,
    return_route: Arc<Mutex<ReturnRouteStore>>,
    flow: Mutex<FlowOrchestrator>,
    steps: Vec<StepDefinition>,
    guard: NavigationGuard,
    revalidation: RevalidationTask,
}

impl SessionContext {
    /// Connects the configured storage tiers and restores the session.
    pub async fn start(
        config: Config,
        clock: SharedClock,
        credentials: &dyn CredentialProvider,
        options: SessionOptions,
    ) -> Self {
        let layer = PersistenceLayer::connect(&config.persistence, clock.clone()).await;
        Self::with_layer(config, Arc::new(layer), clock, credentials, options).await
    }

    pub async fn with_layer(
        config: Config,
        layer: Arc<PersistenceLayer>,
        clock: SharedClock,
        credentials: &dyn CredentialProvider,
        options: SessionOptions,
    ) -> Self {
        let persistence = PersistenceHandle::spawn(layer);

        let token = match credentials.access_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "No access credential, continuing anonymously");
                None
            }
        };
        let user_tag = token.as_ref().map(credential_tag);

        let city_ttl = config.expiry.city_ttl();
        let route_ttl = config.expiry.return_route_ttl();

        let seats = SeatSelectionEngine::rehydrate(
            options.ticket_id.clone(),
            token,
            persistence.clone(),
            clock.clone(),
        )
        .await;
        let cities = CitySelectionStore::rehydrate(city_ttl, persistence.clone(), clock.clone()).await;
        let return_route = ReturnRouteStore::rehydrate(route_ttl, persistence.clone(), clock.clone()).await;

        let mut flow = FlowOrchestrator::rehydrate(
            options.flow_name.clone(),
            options.steps.clone(),
            persistence.clone(),
            clock,
        )
        .await;
        if user_tag.is_some() {
            flow = flow.with_user_tag(user_tag);
        }

        let cities = Arc::new(Mutex::new(cities));
        let return_route = Arc::new(Mutex::new(return_route));
        let revalidation = RevalidationTask::spawn(cities.clone(), return_route.clone(), &config.revalidation);
        let guard = NavigationGuard::new(config.navigation.guard_timeout());

        info!(
            ticket_id = %options.ticket_id,
            flow = %options.flow_name,
            tiers = ?persistence.layer().tier_names(),
            "Session started"
        );

        Self {
            config,
            persistence,
            seats: Mutex::new(seats),
            cities,
            return_route,
            flow: Mutex::new(flow),
            steps: options.steps,
            guard,
            revalidation,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn persistence(&self) -> &PersistenceHandle {
        &self.persistence
    }

    pub fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    pub fn max_selectable(&self) -> usize {
        self.config.seating.max_selectable
    }

    pub async fn seats(&self) -> MutexGuard<'_, SeatSelectionEngine> {
        self.seats.lock().await
    }

    pub async fn cities(&self) -> MutexGuard<'_, CitySelectionStore> {
        self.cities.lock().await
    }

    pub async fn return_route(&self) -> MutexGuard<'_, ReturnRouteStore> {
        self.return_route.lock().await
    }

    pub async fn flow(&self) -> MutexGuard<'_, FlowOrchestrator> {
        self.flow.lock().await
    }

    /// Seat click with the configured selection cap.
    pub async fn click_seat(
        &self,
        seat_id: SeatId,
        current_state: SeatState,
        seat_number: impl Into<SeatNumber>,
    ) -> ClickOutcome {
        let max = self.max_selectable();
        self.seats.lock().await.click(seat_id, current_state, seat_number, max)
    }

    /// Starts the wizard unless a restored session is still running. A
    /// finished session has already been archived, so a new one replaces it.
    pub async fn start_flow(&self) -> SessionResult<()> {
        let mut flow = self.flow.lock().await;
        match flow.state() {
            FlowState::NotStarted | FlowState::Completed => flow.initialize(self.steps.clone())?,
            FlowState::Running => debug!("Flow already running, keeping restored session"),
        }
        Ok(())
    }

    pub async fn remember_return_route(&self, path: &str) -> SessionResult<()> {
        self.return_route.lock().await.remember(path)?;
        Ok(())
    }

    /// Navigates back to the remembered route. The route is only forgotten
    /// once the navigator accepted it. `Ok(None)` means nothing valid was
    /// remembered.
    pub async fn return_to_remembered_route(&self, navigator: &dyn Navigator) -> SessionResult<Option<String>> {
        let Some(_permit) = self.guard.enter() else {
            return Err(SessionError::NavigationBusy);
        };

        let Some(path) = self.return_route.lock().await.recall() else {
            debug!("No return route remembered");
            return Ok(None);
        };

        if let Err(e) = navigator.navigate(&path).await {
            warn!(path = %path, error = %e, "Navigation to return route failed");
            return Err(e.into());
        }

        self.return_route.lock().await.forget();
        info!(path = %path, "Returned to remembered route");
        Ok(Some(path))
    }

    /// Stops background revalidation and waits for pending writes.
    pub async fn shutdown(&self) {
        self.revalidation.stop();
        self.persistence.flush().await;
        info!("Session shut down");
    }
}
