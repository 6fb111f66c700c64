pub mod record;
pub mod selection;

pub use record::SeatSelectionRecord;
pub use selection::{ClickOutcome, SeatSelectionEngine, SEAT_SELECTION_KEY};
