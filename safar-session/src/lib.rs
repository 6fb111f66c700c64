pub mod context;
pub mod guard;
pub mod revalidation;
pub mod telemetry;

pub use context::{Navigator, SessionContext, SessionOptions};
pub use guard::{NavigationGuard, NavigationPermit};
pub use revalidation::RevalidationTask;

use safar_expiry::ExpiryError;
use safar_flow::FlowError;
use thiserror::Error;

/// Failure reported by the UI navigation collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Navigation rejected: {0}")]
    Rejected(String),
    #[error("Navigator unavailable")]
    Unavailable,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Another navigation is already in flight")]
    NavigationBusy,
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Route(#[from] ExpiryError),
    #[error(transparent)]
    Flow(#[from] FlowError),
}

pub type SessionResult<T> = Result<T, SessionError>;
