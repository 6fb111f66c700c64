use async_trait::async_trait;

use crate::StoreResult;

/// One storage tier. Values are opaque strings; the persistence layer owns
/// the envelope format and validation.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;
}
