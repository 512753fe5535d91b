//! lwmsg: lightweight one-shot TCP messaging.
//!
//! Each TCP connection carries exactly one request frame and one response
//! frame, both terminated by a single `>` byte.
//!
//! - [`server::Listener`] accepts connections one at a time and spawns an
//!   isolated worker per connection that reads the request, calls the
//!   shared [`Handler`], writes the response and closes the connection.
//! - [`client::Client`] connects, sends one message and waits a bounded
//!   number of seconds for the response.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use lwmsg::{handler, Client, Listener};
//!
//! let listener = Listener::bind(7657, handler(|req| req.to_uppercase()))?;
//! tokio::spawn(async move { listener.run().await });
//!
//! let mut client = Client::connect("127.0.0.1", 7657).await;
//! client.send_message("hello>").await?;
//! assert_eq!(client.listen_and_exit(5).await?, "HELLO>");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod receiver;
pub mod server;

pub use client::Client;
pub use config::{DEFAULT_PORT, DEFAULT_TIMEOUT_SECS};
pub use error::{ClientError, ConfigError, FrameError, ListenerError, WorkerError};
pub use frame::{CHUNK_SIZE, SENTINEL};
pub use handler::{handler, Handler, HandlerKind};
pub use receiver::{Reception, TIMEOUT_PAYLOAD};
pub use server::{Listener, WorkerHandle, BACKLOG};
