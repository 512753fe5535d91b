//! Bounded-time frame reads for the client.
//!
//! The read loop runs as a future that owns the partial payload. The caller
//! races it against an absolute deadline; if the deadline wins, the future
//! is dropped, which cancels the pending read and discards whatever had
//! arrived so far. The peer is not told about the cancellation.

use crate::error::FrameError;
use crate::frame;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Payload reported in place of a response when the deadline passes.
pub const TIMEOUT_PAYLOAD: &str = "-timeout<can not get message from orchestrator>";

/// Prefix shared by every timeout payload.
pub const TIMEOUT_PREFIX: &str = "-timeout<";

/// Terminal state of a timed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// A full frame arrived before the deadline.
    Completed(String),
    /// The deadline passed first and the read was cancelled.
    TimedOut,
}

impl Reception {
    /// Flatten into the wire-level payload, using [`TIMEOUT_PAYLOAD`] for
    /// a timeout.
    pub fn into_payload(self) -> String {
        match self {
            Reception::Completed(payload) => payload,
            Reception::TimedOut => TIMEOUT_PAYLOAD.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Reception::TimedOut)
    }
}

/// Returns true if `payload` is a timeout marker rather than a response.
pub fn is_timeout_payload(payload: &str) -> bool {
    payload.starts_with(TIMEOUT_PREFIX)
}

/// Read one frame from `reader`, giving up `timeout_secs` seconds from now.
pub async fn receive<R>(reader: &mut R, timeout_secs: u64) -> Result<Reception, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    // A deadline past the clock's range means no deadline at all.
    let Some(deadline) = Instant::now().checked_add(Duration::from_secs(timeout_secs)) else {
        return frame::read_frame(reader).await.map(Reception::Completed);
    };

    match timeout_at(deadline, frame::read_frame(reader)).await {
        Ok(Ok(payload)) => {
            debug!(bytes = payload.len(), "Received response");
            Ok(Reception::Completed(payload))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => {
            debug!(timeout_secs, "Receive timed out");
            Ok(Reception::TimedOut)
        }
    }
}
