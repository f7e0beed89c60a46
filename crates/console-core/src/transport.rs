//! The transport contract.

use async_trait::async_trait;

use crate::error::TransportFailure;
use crate::request::ApiRequest;
use crate::response::RawResponse;

/// Performs exactly one network call per invocation.
///
/// Implementations honour `request.timeout` and report a missed deadline as
/// `TransportFailure::Timeout`. They never retry and never classify bodies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &ApiRequest) -> Result<RawResponse, TransportFailure>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn call(&self, request: &ApiRequest) -> Result<RawResponse, TransportFailure> {
        (**self).call(request).await
    }
}
