use chrono::{DateTime, Utc};
use safar_core::SharedClock;
use safar_shared::{Masked, Seat, SeatId, SeatNumber, SeatState};
use safar_store::PersistenceHandle;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::record::SeatSelectionRecord;

pub const SEAT_SELECTION_KEY: &str = "seat_selection";

/// Result of a seat tap. Every variant carries the state the UI should now
/// render; refusals carry the unchanged state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Changed(SeatState),
    /// Seat is reserved by someone else.
    Ignored(SeatState),
    /// Selection is full; the caller surfaces the capacity error.
    CapacityReached(SeatState),
}

impl ClickOutcome {
    pub fn state(self) -> SeatState {
        match self {
            ClickOutcome::Changed(s) | ClickOutcome::Ignored(s) | ClickOutcome::CapacityReached(s) => s,
        }
    }

    pub fn is_refused(self) -> bool {
        !matches!(self, ClickOutcome::Changed(_))
    }
}

/// Tentative seat selection for one checkout.
///
/// Mutations finish synchronously and then schedule a write; durability is
/// eventual.
pub struct SeatSelectionEngine {
    ticket_id: String,
    token: Option<Masked<String>>,
    seats: Vec<Seat>,
    last_updated: DateTime<Utc>,
    persisted_empty: bool,
    persistence: PersistenceHandle,
    clock: SharedClock,
}

impl SeatSelectionEngine {
    pub fn new(
        ticket_id: impl Into<String>,
        token: Option<Masked<String>>,
        persistence: PersistenceHandle,
        clock: SharedClock,
    ) -> Self {
        let last_updated = clock.now();
        Self {
            ticket_id: ticket_id.into(),
            token,
            seats: Vec::new(),
            last_updated,
            persisted_empty: false,
            persistence,
            clock,
        }
    }

    /// Restores the persisted selection for `ticket_id`. A selection stored
    /// for a different ticket is discarded and overwritten.
    pub async fn rehydrate(
        ticket_id: impl Into<String>,
        token: Option<Masked<String>>,
        persistence: PersistenceHandle,
        clock: SharedClock,
    ) -> Self {
        let mut engine = Self::new(ticket_id, token, persistence, clock);

        match engine.persistence.load::<SeatSelectionRecord>(SEAT_SELECTION_KEY).await {
            Some(record) if record.ticket_id == engine.ticket_id => {
                info!(
                    ticket_id = %engine.ticket_id,
                    seats = record.selected_seats.len(),
                    "Seat selection restored"
                );
                engine.persisted_empty = record.selected_seats.is_empty();
                engine.seats = record.selected_seats;
                engine.last_updated = record.last_updated;
                if engine.token.is_none() {
                    engine.token = record.token;
                }
            }
            Some(record) => {
                info!(
                    stored = %record.ticket_id,
                    current = %engine.ticket_id,
                    "Discarding seat selection of another ticket"
                );
                engine.persist();
            }
            None => {}
        }

        engine
    }

    pub fn click(
        &mut self,
        seat_id: SeatId,
        current_state: SeatState,
        seat_number: impl Into<SeatNumber>,
        max_selectable: usize,
    ) -> ClickOutcome {
        if current_state.is_reserved() {
            debug!(seat_id, "Click on reserved seat ignored");
            return ClickOutcome::Ignored(current_state);
        }

        let next = current_state.cycled();

        if next == SeatState::Default {
            self.seats.retain(|s| s.id != seat_id);
            self.persist();
            return ClickOutcome::Changed(next);
        }

        if let Some(seat) = self.seats.iter_mut().find(|s| s.id == seat_id) {
            seat.state = next;
        } else {
            if self.seats.len() >= max_selectable {
                info!(seat_id, max_selectable, "Seat selection is full");
                return ClickOutcome::CapacityReached(current_state);
            }
            self.seats.push(Seat::new(seat_id, seat_number, next));
        }

        self.persist();
        ClickOutcome::Changed(next)
    }

    /// Drops the seat whatever its state. Returns whether it was selected.
    pub fn remove(&mut self, seat_id: SeatId) -> bool {
        let before = self.seats.len();
        self.seats.retain(|s| s.id != seat_id);
        let removed = self.seats.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Server-driven correction for a seat in the selection; skips the cycle
    /// and the capacity check. `Default` removes the seat. Seats that are not
    /// selected have nothing to correct and are left alone.
    pub fn set_state(&mut self, seat_id: SeatId, state: SeatState) -> bool {
        if state == SeatState::Default {
            return self.remove(seat_id);
        }

        match self.seats.iter_mut().find(|s| s.id == seat_id) {
            Some(seat) if seat.state != state => {
                seat.state = state;
                self.persist();
                true
            }
            Some(_) => false,
            None => {
                debug!(seat_id, ?state, "Correction for unselected seat ignored");
                false
            }
        }
    }

    /// Empties the selection. A second consecutive call writes nothing.
    pub fn clear_all(&mut self) {
        if self.seats.is_empty() && self.persisted_empty {
            return;
        }
        self.seats.clear();
        self.persist();
    }

    /// Drops every selected seat that the latest seat map reports as taken,
    /// returning the dropped seats so the shopper can be told.
    pub fn reconcile_availability(&mut self, reserved: impl IntoIterator<Item = SeatId>) -> Vec<Seat> {
        let reserved: HashSet<SeatId> = reserved.into_iter().collect();
        let (lost, kept): (Vec<Seat>, Vec<Seat>) =
            self.seats.drain(..).partition(|s| reserved.contains(&s.id));
        self.seats = kept;

        if !lost.is_empty() {
            info!(count = lost.len(), "Selected seats taken by another booking");
            self.persist();
        }
        lost
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn selected_count(&self) -> usize {
        self.seats.len()
    }

    pub fn count_in_state(&self, state: SeatState) -> usize {
        self.seats.iter().filter(|s| s.state == state).count()
    }

    pub fn state_of(&self, seat_id: SeatId) -> SeatState {
        self.seats
            .iter()
            .find(|s| s.id == seat_id)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn to_record(&self) -> SeatSelectionRecord {
        SeatSelectionRecord {
            ticket_id: self.ticket_id.clone(),
            token: self.token.clone(),
            selected_seats: self.seats.clone(),
            last_updated: self.last_updated,
        }
    }

    fn persist(&mut self) {
        self.last_updated = self.clock.now();
        self.persisted_empty = self.seats.is_empty();
        self.persistence.schedule_save(SEAT_SELECTION_KEY, &self.to_record());
    }
}
