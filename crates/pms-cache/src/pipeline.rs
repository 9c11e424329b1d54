//! Request dispatch through the cache stages.
//!
//! The chain is fixed when the pipeline is built:
//!
//! ```text
//! invalidation stage → read-through stage → handler
//! ```
//!
//! Each stage only acts on requests whose [`CachePolicy`] selects it and
//! passes everything else straight to the next link.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cancel::cancellable;
use crate::descriptor::CachePolicy;
use crate::error::DispatchError;
use crate::invalidation::InvalidationCoordinator;
use crate::read_through::ReadThroughCoordinator;
use crate::tiered::TieredCache;

/// An operation with a declared result type.
pub trait Request: Send + Sync + 'static {
    type Response: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    fn cache_policy(&self) -> CachePolicy<'_> {
        CachePolicy::None
    }
}

/// Produces the response for one request type.
#[async_trait]
pub trait Handler<R: Request>: Send + Sync {
    type Error: Send;

    async fn handle(&self, request: &R, cancel: &CancellationToken) -> Result<R::Response, Self::Error>;
}

pub struct Pipeline {
    cache: Arc<TieredCache>,
    invalidation: InvalidationCoordinator,
    read_through: ReadThroughCoordinator,
}

impl Pipeline {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self {
            invalidation: InvalidationCoordinator::new(Arc::clone(&cache)),
            read_through: ReadThroughCoordinator::new(Arc::clone(&cache)),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub async fn dispatch<R, H>(
        &self,
        handler: &H,
        request: &R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, DispatchError<H::Error>>
    where
        R: Request,
        H: Handler<R>,
    {
        let policy = request.cache_policy();
        let span = tracing::debug_span!("dispatch", request = request.name(), policy = policy.kind());

        let handle = async {
            cancellable(cancel, handler.handle(request, cancel))
                .await?
                .map_err(DispatchError::Handler)
        };
        let read = async {
            match policy {
                CachePolicy::Read(descriptor) => self.read_through.run(descriptor, cancel, handle).await,
                _ => handle.await,
            }
        };
        let outer = async {
            match policy {
                CachePolicy::Invalidate(descriptor) => self.invalidation.run(descriptor, cancel, read).await,
                _ => read.await,
            }
        };
        outer.instrument(span).await
    }
}

/// Routes requests to the handler set `S` through a shared pipeline.
pub struct Mediator<S> {
    services: S,
    pipeline: Pipeline,
}

impl<S> Mediator<S>
where
    S: Send + Sync,
{
    pub fn new(services: S, pipeline: Pipeline) -> Self {
        Self { services, pipeline }
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn send<R>(
        &self,
        request: R,
        cancel: &CancellationToken,
    ) -> Result<R::Response, DispatchError<<S as Handler<R>>::Error>>
    where
        R: Request,
        S: Handler<R>,
    {
        self.pipeline.dispatch(&self.services, &request, cancel).await
    }
}
