pub mod clock;
pub mod identity;
pub mod signing;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use identity::{credential_tag, CredentialProvider, StaticCredential};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Integrity check failed: {0}")]
    IntegrityError(#[from] safar_shared::IntegrityError),
    #[error("Identity unavailable: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
