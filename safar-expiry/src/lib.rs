pub mod city;
pub mod entity;
pub mod route;

pub use city::{CitySelectionStore, DESTINATION_CITY, ORIGIN_CITY};
pub use entity::{EntityKind, EntitySource, ExpiringEntity, ExpiringEntityStore, RemainingTime};
pub use route::{ReturnRouteStore, SignedRoute, RETURN_ROUTE};

#[derive(Debug, thiserror::Error)]
pub enum ExpiryError {
    #[error("Not an in-app path: {0}")]
    NotLocalPath(String),
}
