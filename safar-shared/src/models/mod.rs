pub mod city;
pub mod seat;

pub use city::City;
pub use seat::{Seat, SeatId, SeatNumber, SeatState};
