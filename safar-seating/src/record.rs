use chrono::{DateTime, Utc};
use safar_shared::{IntegrityError, Masked, PersistedRecord, Seat, SeatState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Persisted shape of a checkout's seat selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatSelectionRecord {
    pub ticket_id: String,
    pub token: Option<Masked<String>>,
    pub selected_seats: Vec<Seat>,
    pub last_updated: DateTime<Utc>,
}

impl PersistedRecord for SeatSelectionRecord {
    fn validate(&self) -> Result<(), IntegrityError> {
        if self.ticket_id.is_empty() {
            return Err(IntegrityError::MissingField("ticketId"));
        }

        let mut seen = HashSet::new();
        for seat in &self.selected_seats {
            if seat.state == SeatState::Default {
                return Err(IntegrityError::Malformed(format!(
                    "seat {} stored in default state",
                    seat.id
                )));
            }
            if !seen.insert(seat.id) {
                return Err(IntegrityError::Malformed(format!("seat {} stored twice", seat.id)));
            }
        }
        Ok(())
    }
}
