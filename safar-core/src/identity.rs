use async_trait::async_trait;
use safar_shared::Masked;
use sha2::{Digest, Sha256};

use crate::signing::to_hex;
use crate::{CoreError, CoreResult};

/// Identity collaborator. The session engine never inspects the credential,
/// it only stores it next to the data it tags.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self) -> CoreResult<Masked<String>>;
}

/// Short stable tag derived from a credential, used to mark persisted
/// sessions with their owner without copying the token into every record.
pub fn credential_tag(token: &Masked<String>) -> String {
    let digest = Sha256::digest(token.expose().as_bytes());
    to_hex(&digest[..6])
}

/// Fixed credential, for embedding and tests.
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn access_token(&self) -> CoreResult<Masked<String>> {
        match &self.token {
            Some(token) => {
                tracing::debug!("Supplying static access credential");
                Ok(Masked(token.clone()))
            }
            None => Err(CoreError::IdentityError("no access credential".to_string())),
        }
    }
}
