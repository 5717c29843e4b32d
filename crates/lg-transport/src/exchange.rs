//! `HttpExchange` (async request/response) and `SpawningTransport`, which
//! turns any exchange into the callback-style [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::debug;

use crate::{Request, Response, ResponseCallback, Transport, TransportResult};

/// One request in, one response out.
#[async_trait]
pub trait HttpExchange: Send + Sync + 'static {
    async fn exchange(&self, request: Request) -> TransportResult<Response>;
}

/// Runs each request as its own task on `handle` and reports through the
/// callback when it finishes.
pub struct SpawningTransport<E> {
    exchange: Arc<E>,
    handle:   Handle,
}

impl<E: HttpExchange> SpawningTransport<E> {
    pub fn new(exchange: E, handle: Handle) -> Self {
        Self { exchange: Arc::new(exchange), handle }
    }

    /// Use the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn on_current(exchange: E) -> Self {
        Self::new(exchange, Handle::current())
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }
}

impl<E: HttpExchange> Transport for SpawningTransport<E> {
    fn execute(&self, request: Request, callback: Arc<dyn ResponseCallback>) {
        let exchange = Arc::clone(&self.exchange);
        self.handle.spawn(async move {
            let is_get = request.is_get();
            let method = request.method;
            match exchange.exchange(request).await {
                Ok(response) => {
                    debug!(%method, status = response.status, "exchange completed");
                    callback.completed(response, is_get);
                }
                Err(error) => {
                    debug!(%method, %error, "exchange failed");
                    callback.failed(error, is_get);
                }
            }
        });
    }
}
