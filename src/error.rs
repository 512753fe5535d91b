//! Error types shared by the listener, workers and client.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while setting up a listening socket.
///
/// Each variant corresponds to one setup step, so callers can tell an
/// occupied port apart from an exhausted file descriptor table.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("can not open socket: {0}")]
    Socket(#[source] io::Error),
    #[error("can not bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("can not set socket to listen: {0}")]
    Listen(#[source] io::Error),
}

/// Failures of the sentinel-framed read loop.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    /// The peer closed the stream before the sentinel arrived.
    #[error("connection closed after {received} bytes without a frame terminator")]
    UnexpectedEof { received: usize },
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Outcome of a server-side worker that did not complete its exchange.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("request frame: {0}")]
    Frame(#[from] FrameError),
    #[error("response write failed: {0}")]
    Io(#[from] io::Error),
    #[error("handler panicked")]
    HandlerPanicked,
    /// The worker task was cancelled by the runtime (e.g. on shutdown).
    #[error("worker task aborted")]
    Aborted,
}

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("can not connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("client is not connected")]
    NotConnected,
    #[error("send failed: {0}")]
    Io(#[from] io::Error),
    #[error("response frame: {0}")]
    Frame(#[from] FrameError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
