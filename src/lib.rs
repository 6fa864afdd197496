//! `httpjson` removes the boilerplate of JSON request/response APIs over HTTP.
//!
//! Server side, [`handle_json`] turns a typed async function into an axum
//! handler:
//! - the request body is decoded from JSON (content type must be
//!   `application/json`, otherwise `400`),
//! - the handler receives a [`RequestContext`] whose [`Plumbing`] can set the
//!   success status and response headers,
//! - the result is encoded as JSON, and errors are mapped to a status through
//!   the [`HttpStatus`] capability ([`JsonError`] values become JSON bodies,
//!   everything else plain text).
//!
//! Client side, [`call_json`] builds a typed call that sends JSON through any
//! [`HttpClient`] and reports non-2xx responses as [`CallError`].
//! [`EditRequestClient`] lets a hook edit or veto each outgoing request.

mod client;
mod edit;
mod error;
mod options;
mod plumbing;
mod reply;
mod server;
mod status;

pub mod codec;

pub use client::{call_json, default_client, CallContext, Called, HttpClient, JsonCall, RawResponse};
pub use edit::{edit_request, EditRequestClient};
pub use error::{BoxError, Error, StatusCarrying};
pub use options::{build_client, ClientOptions, HandlerOptions};
pub use plumbing::{Plumbing, RequestContext};
pub use reply::{Reply, WithStatus};
pub use server::{check_method, handle_json, handle_json_with, ResponseFuture};
pub use status::{error_status, CallError, HttpStatus, JsonError, StatusError};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;
