/// Storage driver boundary
use crate::error::Result;
use crate::request::RedirectRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Derives the key an edge cache stores a path under (for S3, the bucket key).
pub trait EdgeKeyer: Send + Sync {
    fn edge_key(&self, path: &str) -> String;
}

#[async_trait]
pub trait StorageDriver: Send + Sync {
    fn name(&self) -> &str;

    /// URL the client can fetch `path` from, or `None` when the driver cannot redirect.
    async fn redirect_url(&self, request: &RedirectRequest, path: &str) -> Result<Option<String>>;

    /// Optional capability; drivers without it are passed through untouched.
    fn edge_keyer(&self) -> Option<&dyn EdgeKeyer> {
        None
    }
}

#[async_trait]
impl<D: StorageDriver + ?Sized> StorageDriver for Arc<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn redirect_url(&self, request: &RedirectRequest, path: &str) -> Result<Option<String>> {
        (**self).redirect_url(request, path).await
    }

    fn edge_keyer(&self) -> Option<&dyn EdgeKeyer> {
        (**self).edge_keyer()
    }
}
