use std::time::Duration;

use crate::{Error, Result};

/// Configures how JSON handlers read request bodies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerOptions {
    /// Largest accepted request body in bytes; larger bodies get `413`.
    pub max_body_bytes: usize,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Configures a `reqwest` client built by [`build_client`].
///
/// The process-wide default client uses `ClientOptions::default()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Overall per-request timeout in milliseconds. `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
    /// How long idle pooled connections are kept, in milliseconds.
    pub pool_idle_timeout_ms: u64,
    /// Value of the `User-Agent` header, if any.
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            pool_idle_timeout_ms: 90_000,
            user_agent: None,
        }
    }
}

/// Builds a `reqwest` client from `options`.
pub fn build_client(options: &ClientOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_millis(options.pool_idle_timeout_ms));
    if let Some(timeout_ms) = options.timeout_ms {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(user_agent) = &options.user_agent {
        builder = builder.user_agent(user_agent);
    }
    builder.build().map_err(Error::other)
}
