//! TCP listener and per-connection workers.
//!
//! The accept loop is strictly serial: one accept in flight at a time.
//! Every accepted connection is handed to its own spawned worker, which
//! reads one request frame, runs the handler, writes the response and closes
//! the connection. The listener never waits on workers and places no limit
//! on how many run at once; under a connection flood the number of live
//! workers is bounded only by the OS.

use crate::error::{ListenerError, WorkerError};
use crate::frame;
use crate::handler::Handler;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Maximum number of pending, not yet accepted connections.
pub const BACKLOG: i32 = 5;

/// A bound, listening socket plus the handler its workers share.
pub struct Listener {
    inner: TcpListener,
    handler: Handler,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind on all IPv4 addresses at `port`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(port: u16, handler: Handler) -> Result<Self, ListenerError> {
        Self::bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), handler)
    }

    /// Bind on a specific address.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind_addr(addr: SocketAddr, handler: Handler) -> Result<Self, ListenerError> {
        let std_listener = create_listener(addr)?;
        let local_addr = std_listener.local_addr().map_err(ListenerError::Socket)?;
        let inner = TcpListener::from_std(std_listener).map_err(ListenerError::Socket)?;

        info!(address = %local_addr, backlog = BACKLOG, "Listener bound");

        Ok(Listener {
            inner,
            handler,
            local_addr,
        })
    }

    /// Address the listener is bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept the next connection and spawn a worker for it.
    ///
    /// Returns `None` when the accept call fails; such failures are
    /// transient and the caller simply tries again.
    pub async fn accept_next(&self) -> Option<WorkerHandle> {
        match self.inner.accept().await {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "New connection");
                let handler = Arc::clone(&self.handler);
                let task = tokio::spawn(handle_connection(stream, peer, handler));
                Some(WorkerHandle { peer, task })
            }
            Err(e) if is_transient(&e) => {
                debug!(error = %e, "Accept interrupted");
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                None
            }
        }
    }

    /// Accept connections until the surrounding task is cancelled.
    ///
    /// Worker handles are dropped immediately; workers keep running
    /// detached.
    pub async fn run(&self) {
        info!(address = %self.local_addr, "Listener accepting connections");
        loop {
            self.accept_next().await;
        }
    }

    /// Release the listening socket.
    ///
    /// Workers already spawned keep their own connections.
    pub fn close(self) {
        info!(address = %self.local_addr, "Listener closed");
        drop(self.inner);
    }
}

/// Resolve `host` (an IP literal or a name) and `port` to the first
/// address to bind on.
pub async fn resolve_bind_addr(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{host} did not resolve to any address"),
            )
        })
}

/// Handle to one spawned worker.
///
/// Dropping it detaches the worker; awaiting [`WorkerHandle::join`] reports
/// how the exchange ended.
#[derive(Debug)]
pub struct WorkerHandle {
    peer: SocketAddr,
    task: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to finish.
    pub async fn join(self) -> Result<(), WorkerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WorkerError::HandlerPanicked),
            Err(_) => Err(WorkerError::Aborted),
        }
    }
}

/// Serve exactly one request/response exchange on `stream`.
///
/// The stream is owned here and dropped on every exit path, including a
/// handler panic, so each connection is closed exactly once.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Handler,
) -> Result<(), WorkerError> {
    let request = match frame::read_frame(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            debug!(peer = %peer, error = %e, "Failed to read request");
            return Err(e.into());
        }
    };
    trace!(peer = %peer, bytes = request.len(), request = %request, "Received request");

    // The handler is opaque and may block, so keep it off the I/O threads.
    let response = match tokio::task::spawn_blocking(move || handler(&request)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Handler failed, closing connection");
            return Err(WorkerError::HandlerPanicked);
        }
    };

    stream.write_all(response.as_bytes()).await?;
    trace!(peer = %peer, bytes = response.len(), response = %response, "Sent response");

    if let Err(e) = stream.shutdown().await {
        trace!(peer = %peer, error = %e, "Shutdown after response failed");
    }
    Ok(())
}

/// Create the listening socket with an explicit backlog.
fn create_listener(addr: SocketAddr) -> Result<std::net::TcpListener, ListenerError> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(ListenerError::Socket)?;

    socket
        .set_reuse_address(true)
        .and_then(|_| socket.set_nonblocking(true))
        .map_err(ListenerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| ListenerError::Bind { addr, source })?;
    socket.listen(BACKLOG).map_err(ListenerError::Listen)?;

    Ok(socket.into())
}

/// True for accept errors that only affect the connection being accepted.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler, strip_sentinel, HandlerKind};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_single_exchange() {
        let listener = Listener::bind_addr(loopback(), HandlerKind::Upper.build()).unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move { exchange(addr, b"hello>").await });
        let worker = listener.accept_next().await.unwrap();
        assert!(worker.peer_addr().ip().is_loopback());
        worker.join().await.unwrap();

        // read_to_end returning proves the worker closed the connection.
        assert_eq!(client.await.unwrap(), b"HELLO>");
        listener.close();
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let listener = Listener::bind_addr(loopback(), HandlerKind::Echo.build()).unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for part in [&b"spl"[..], b"it ", b"mess", b"age>"] {
                stream.write_all(part).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            response
        });

        let worker = listener.accept_next().await.unwrap();
        worker.join().await.unwrap();
        assert_eq!(client.await.unwrap(), b"split message>");
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let h = handler(|req| {
            if req.starts_with("boom") {
                panic!("handler fault");
            }
            format!("{}-ok>", strip_sentinel(req))
        });
        let listener = Listener::bind_addr(loopback(), h).unwrap();
        let addr = listener.local_addr();

        let faulty = tokio::spawn(async move { exchange(addr, b"boom>").await });
        let worker = listener.accept_next().await.unwrap();
        assert!(matches!(
            worker.join().await,
            Err(WorkerError::HandlerPanicked)
        ));
        // The faulted worker still closed its connection.
        assert!(faulty.await.unwrap().is_empty());

        let healthy = tokio::spawn(async move { exchange(addr, b"next>").await });
        let worker = listener.accept_next().await.unwrap();
        worker.join().await.unwrap();
        assert_eq!(healthy.await.unwrap(), b"next-ok>");
    }

    #[tokio::test]
    async fn test_slow_worker_does_not_block_accept() {
        let h = handler(|req| {
            if req.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(500));
            }
            req.to_string()
        });
        let listener = Listener::bind_addr(loopback(), h).unwrap();
        let addr = listener.local_addr();

        let slow = tokio::spawn(async move { exchange(addr, b"slow>").await });
        let slow_worker = listener.accept_next().await.unwrap();

        let fast = tokio::spawn(async move { exchange(addr, b"fast>").await });
        let fast_worker = listener.accept_next().await.unwrap();
        fast_worker.join().await.unwrap();
        assert_eq!(fast.await.unwrap(), b"fast>");
        assert!(!slow_worker.is_finished());

        slow_worker.join().await.unwrap();
        assert_eq!(slow.await.unwrap(), b"slow>");
    }

    #[tokio::test]
    async fn test_peer_closing_early_ends_worker() {
        let listener = Listener::bind_addr(loopback(), HandlerKind::Echo.build()).unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"partial").await.unwrap();
        });
        let worker = listener.accept_next().await.unwrap();
        client.await.unwrap();

        assert!(matches!(
            worker.join().await,
            Err(WorkerError::Frame(crate::error::FrameError::UnexpectedEof { received: 7 }))
        ));
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let first = Listener::bind_addr(loopback(), HandlerKind::Echo.build()).unwrap();
        let taken = first.local_addr();

        match Listener::bind_addr(taken, HandlerKind::Echo.build()) {
            Err(ListenerError::Bind { addr, .. }) => assert_eq!(addr, taken),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second bind on {taken} succeeded"),
        }
    }

    #[tokio::test]
    async fn test_close_after_serving_releases_port() {
        let listener = Listener::bind_addr(loopback(), HandlerKind::Echo.build()).unwrap();
        let addr = listener.local_addr();

        let mut workers = Vec::new();
        for i in 0..3 {
            let msg = format!("m{i}>");
            let client = tokio::spawn(async move { exchange(addr, msg.as_bytes()).await });
            workers.push(listener.accept_next().await.unwrap());
            assert_eq!(client.await.unwrap(), format!("m{i}>").as_bytes());
        }
        for worker in workers {
            worker.join().await.unwrap();
        }

        listener.close();
        assert!(TcpStream::connect(addr).await.is_err());
        let again = Listener::bind_addr(addr, HandlerKind::Echo.build()).unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[tokio::test]
    async fn test_run_serves_concurrent_clients() {
        let listener = Listener::bind_addr(loopback(), HandlerKind::Upper.build()).unwrap();
        let addr = listener.local_addr();
        let server = tokio::spawn(async move { listener.run().await });

        let clients: Vec<_> = (0..8)
            .map(|i| tokio::spawn(async move { exchange(addr, format!("c{i}>").as_bytes()).await }))
            .collect();
        for (i, client) in clients.into_iter().enumerate() {
            assert_eq!(client.await.unwrap(), format!("C{i}>").as_bytes());
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_resolve_bind_addr() {
        let v4 = resolve_bind_addr("0.0.0.0", 7657).await.unwrap();
        assert_eq!(v4, "0.0.0.0:7657".parse::<SocketAddr>().unwrap());

        let v6 = resolve_bind_addr("::", 7657).await.unwrap();
        assert_eq!(v6, "[::]:7657".parse::<SocketAddr>().unwrap());

        let named = resolve_bind_addr("localhost", 0).await.unwrap();
        assert!(named.ip().is_loopback());
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
