//! Route signature digest.
//!
//! The digest only detects accidental corruption of a stored route. Every
//! input, including the constant, ships with the client, so anyone can forge
//! a valid signature. Do not use it to authorize anything.

use safar_shared::IntegrityError;
use sha2::{Digest, Sha256};

const ROUTE_SIGNATURE_SALT: &str = "safar.return-route.v1";

/// Order-sensitive digest of `path`, `timestamp` and the shared constant.
pub fn route_signature(path: &str, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.to_le_bytes());
    hasher.update(b"|");
    hasher.update(ROUTE_SIGNATURE_SALT.as_bytes());
    let digest = hasher.finalize();
    to_hex(&digest[..16])
}

pub fn verify_route_signature(path: &str, timestamp: i64, signature: &str) -> Result<(), IntegrityError> {
    if route_signature(path, timestamp) == signature {
        Ok(())
    } else {
        tracing::warn!(path, timestamp, "Route signature mismatch");
        Err(IntegrityError::SignatureMismatch)
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = route_signature("/checkout/passengers", 1_700_000_000_000);
        let b = route_signature("/checkout/passengers", 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_signature_depends_on_every_input() {
        let base = route_signature("/checkout", 10);
        assert_ne!(base, route_signature("/checkout/", 10));
        assert_ne!(base, route_signature("/checkout", 11));
    }

    #[test]
    fn test_verify_rejects_tampered_path() {
        let sig = route_signature("/checkout", 42);
        assert!(verify_route_signature("/checkout", 42, &sig).is_ok());
        assert_eq!(
            verify_route_signature("/admin", 42, &sig),
            Err(IntegrityError::SignatureMismatch)
        );
    }
}
