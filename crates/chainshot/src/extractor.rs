//! Caller-supplied custom state extractors, run once per confirmed call.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::types::Receipt;

pub type ExtractorError = Box<dyn std::error::Error + Send + Sync>;

/// Derives a JSON value from the confirmed receipt of a call.
#[async_trait]
pub trait StateExtractor: Send + Sync {
    async fn extract(&self, receipt: &Receipt) -> Result<serde_json::Value, ExtractorError>;
}

/// Adapter for closures returning a future.
pub struct FnExtractor<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

/// Wrap `f` as a [`StateExtractor`]. The closure gets an owned receipt.
pub fn extractor_fn<F, Fut>(f: F) -> FnExtractor<F, Fut>
where
    F: Fn(Receipt) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ExtractorError>> + Send,
{
    FnExtractor {
        f,
        _fut: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> StateExtractor for FnExtractor<F, Fut>
where
    F: Fn(Receipt) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ExtractorError>> + Send,
{
    async fn extract(&self, receipt: &Receipt) -> Result<serde_json::Value, ExtractorError> {
        (self.f)(receipt.clone()).await
    }
}
