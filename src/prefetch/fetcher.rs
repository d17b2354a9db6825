//! Tile download seam used by the worker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::resilience::{resilient_fetch, RetryOptions};
use crate::transport::{HttpRequest, HttpTransport};

/// Downloads one resource by URL.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Fetches tiles through the retry executor.
pub struct HttpTileFetcher {
    transport: Arc<dyn HttpTransport>,
    options: RetryOptions,
}

impl HttpTileFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, options: RetryOptions) -> Self {
        Self { transport, options }
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let request = HttpRequest::get(url);
        let response = resilient_fetch(self.transport.as_ref(), &request, &self.options, None)
            .await?
            .error_for_status(&self.options.service_name)?;
        Ok(response.body)
    }
}
