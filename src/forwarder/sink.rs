//! JSON-lines push transport for forwarded frames

use futures::StreamExt;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ForwardMessage, Forwarder};
use crate::config::Endpoint;
use crate::types::UpdateRate;
use crate::{Result, StreamError};

/// Serves forwarded frames as newline-delimited JSON to any number of TCP
/// clients.
///
/// Each client gets its own subscription; a slow client only loses its own
/// frames. Clients never send anything; inbound bytes are ignored.
pub struct JsonLinesSink {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JsonLinesSink {
    pub async fn bind(endpoint: &Endpoint, forwarder: Forwarder, rate: UpdateRate) -> Result<Self> {
        let addr = endpoint.to_string();
        let listener =
            TcpListener::bind(&addr).await.map_err(|e| StreamError::bind_failed(addr.clone(), e))?;
        let local_addr =
            listener.local_addr().map_err(|e| StreamError::bind_failed(addr.clone(), e))?;
        info!("Forwarding frames as JSON lines on {} ({:?})", local_addr, rate);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, forwarder, rate, cancel.clone()));

        Ok(Self { local_addr, cancel, task: Some(task) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and disconnect every client.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("JSON-lines sink task failed: {}", e);
            }
        }
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    forwarder: Forwarder,
    rate: UpdateRate,
    cancel: CancellationToken,
) {
    let mut clients: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                debug!("JSON-lines client connected: {}", peer);
                // Subscribe before spawning so no frame published after accept is missed
                let messages = forwarder.messages(rate);
                let client_cancel = cancel.child_token();
                clients.retain(|handle| !handle.is_finished());
                clients.push(tokio::spawn(async move {
                    if let Err(e) = serve_client(socket, messages, client_cancel).await {
                        debug!("JSON-lines client {} dropped: {}", peer, e);
                    }
                }));
            }
            Err(e) => warn!("JSON-lines accept failed: {}", e),
        }
    }

    for client in clients {
        let _ = client.await;
    }
    debug!("JSON-lines sink stopped");
}

async fn serve_client(
    mut socket: TcpStream,
    mut messages: futures::stream::BoxStream<'static, ForwardMessage>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = messages.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let line = message.to_json_line()?;
        socket
            .write_all(line.as_bytes())
            .await
            .map_err(|e| StreamError::Write { source: e })?;
    }

    let _ = socket.shutdown().await;
    Ok(())
}
