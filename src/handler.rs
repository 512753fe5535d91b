//! Request handlers.
//!
//! A handler maps one request frame to one response frame. It is shared
//! read-only by every worker, so it must be `Send + Sync` and must not rely
//! on interior state being serialized across connections.

use crate::frame::SENTINEL;
use serde::Deserialize;
use std::sync::Arc;

/// Shared request handler: request text in, response text out.
///
/// The request includes its trailing sentinel. The response is written to
/// the peer verbatim, so it should end with the sentinel too.
pub type Handler = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Built-in handlers selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Reply with the request unchanged.
    #[default]
    Echo,
    /// Reply with the request body uppercased.
    Upper,
}

impl HandlerKind {
    pub fn build(self) -> Handler {
        match self {
            HandlerKind::Echo => handler(echo),
            HandlerKind::Upper => handler(upper),
        }
    }
}

fn echo(request: &str) -> String {
    request.to_string()
}

fn upper(request: &str) -> String {
    let body = strip_sentinel(request);
    let mut response = body.to_uppercase();
    response.push(SENTINEL as char);
    response
}

/// Request body without its trailing sentinel.
pub fn strip_sentinel(frame: &str) -> &str {
    frame.strip_suffix(SENTINEL as char).unwrap_or(frame)
}
