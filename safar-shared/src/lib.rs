pub mod models;
pub mod pii;
pub mod record;

pub use models::{City, Seat, SeatId, SeatNumber, SeatState};
pub use pii::Masked;
pub use record::{IntegrityError, PersistedRecord};
