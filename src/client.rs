//! One-shot TCP client.
//!
//! A client opens one connection, sends one framed message and waits a
//! bounded time for one framed response. Sending does not add the
//! sentinel; the caller is expected to terminate the payload.

use crate::error::ClientError;
use crate::receiver::{self, Reception};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error, trace};

/// Client bound to a single outbound connection.
#[derive(Debug)]
pub struct Client {
    stream: Option<TcpStream>,
    target: String,
}

impl Client {
    /// Connect to `host:port`.
    ///
    /// A failed connection is logged but still yields a client; every
    /// later call on it returns [`ClientError::NotConnected`]. Use
    /// [`Client::try_connect`] to get the error instead.
    pub async fn connect(host: &str, port: u16) -> Self {
        match Self::try_connect(host, port).await {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Server can not be found");
                Client {
                    stream: None,
                    target: format!("{host}:{port}"),
                }
            }
        }
    }

    /// Connect to `host:port`, failing if the server is unreachable.
    pub async fn try_connect(host: &str, port: u16) -> Result<Self, ClientError> {
        let target = format!("{host}:{port}");
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| ClientError::Connect {
                target: target.clone(),
                source,
            })?;
        debug!(target = %target, "Connected");

        Ok(Client {
            stream: Some(stream),
            target,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// `host:port` this client was created for.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Write `payload` as-is and return the number of bytes sent.
    pub async fn send_message(&mut self, payload: &str) -> Result<usize, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        trace!(target = %self.target, bytes = payload.len(), payload = %payload, "Sending");
        stream.write_all(payload.as_bytes()).await?;
        Ok(payload.len())
    }

    /// Wait up to `timeout_secs` seconds for a response frame.
    ///
    /// On timeout this returns [`receiver::TIMEOUT_PAYLOAD`] rather than
    /// an error. The connection stays open either way, but any part of the
    /// response that arrived before the deadline has been consumed and
    /// discarded. A later `listen` on the same client then returns only the
    /// remainder, which looks like a complete frame. After a timeout, prefer
    /// closing the client over listening again.
    pub async fn listen(&mut self, timeout_secs: u64) -> Result<String, ClientError> {
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let reception = receiver::receive(stream, timeout_secs).await?;
        if let Reception::TimedOut = reception {
            debug!(target = %self.target, timeout_secs, "Connection timed out");
        }
        Ok(reception.into_payload())
    }

    /// [`Client::listen`], then close the connection whatever the outcome.
    pub async fn listen_and_exit(mut self, timeout_secs: u64) -> Result<String, ClientError> {
        let result = self.listen(timeout_secs).await;
        self.close();
        result
    }

    /// Close the connection.
    pub fn close(self) {
        if self.stream.is_some() {
            debug!(target = %self.target, "Client closed");
        }
    }
}
