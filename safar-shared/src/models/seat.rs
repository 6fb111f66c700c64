use serde::{Deserialize, Serialize};
use std::fmt;

pub type SeatId = i64;

/// Seat label as printed on the seat map. Operators use both plain numbers
/// and labels such as "12A", so both forms are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum SeatNumber {
    Number(i64),
    Label(String),
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatNumber::Number(n) => write!(f, "{}", n),
            SeatNumber::Label(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SeatNumber {
    fn from(value: i64) -> Self {
        SeatNumber::Number(value)
    }
}

impl From<&str> for SeatNumber {
    fn from(value: &str) -> Self {
        SeatNumber::Label(value.to_string())
    }
}

impl From<String> for SeatNumber {
    fn from(value: String) -> Self {
        SeatNumber::Label(value)
    }
}

/// Seat state as seen by the shopper.
///
/// `Reserved*` states come from the seat map and are terminal for the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SeatState {
    #[default]
    Default,
    SelectedMale,
    SelectedFemale,
    ReservedMale,
    ReservedFemale,
}

impl SeatState {
    pub fn is_reserved(self) -> bool {
        matches!(self, SeatState::ReservedMale | SeatState::ReservedFemale)
    }

    pub fn is_selected(self) -> bool {
        matches!(self, SeatState::SelectedMale | SeatState::SelectedFemale)
    }

    /// Next state in the click cycle `default -> male -> female -> default`.
    /// Reserved states map to themselves.
    pub fn cycled(self) -> Self {
        match self {
            SeatState::Default => SeatState::SelectedMale,
            SeatState::SelectedMale => SeatState::SelectedFemale,
            SeatState::SelectedFemale => SeatState::Default,
            reserved => reserved,
        }
    }
}

/// A seat currently held in the shopper's selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: SeatId,
    #[serde(rename = "seatNo")]
    pub seat_number: SeatNumber,
    pub state: SeatState,
}

impl Seat {
    pub fn new(id: SeatId, seat_number: impl Into<SeatNumber>, state: SeatState) -> Self {
        Self {
            id,
            seat_number: seat_number.into(),
            state,
        }
    }
}
