//! Connection establishment seam

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::Endpoint;
use crate::{Result, StreamError};

/// Opens byte streams to a transmitter.
///
/// The receiver only reads from the returned stream. Implementations bound
/// their own connect time; a returned error is always retried by the
/// supervisor.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncRead + Unpin + Send + 'static;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Stream>;
}

/// TCP transport with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpStream> {
        let addr = endpoint.to_string();
        trace!("Connecting to {} (timeout {:?})", addr, self.connect_timeout);

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| StreamError::Timeout { duration: self.connect_timeout })?
            .map_err(|e| StreamError::connect_failed(addr.clone(), e))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", addr, e);
        }
        Ok(stream)
    }
}
