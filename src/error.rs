use std::error::Error as StdError;

use http::StatusCode;

use crate::{
    client::RawResponse,
    status::{CallError, HttpStatus, JsonError, StatusError},
};

/// Boxed error used for opaque causes.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An error that also exposes [`HttpStatus`].
///
/// Blanket-implemented; it exists so such errors can be boxed into
/// [`Error::Custom`] while keeping both capabilities.
pub trait StatusCarrying: StdError + HttpStatus + Send + Sync + 'static {
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static);
}

impl<T> StatusCarrying for T
where
    T: StdError + HttpStatus + Send + Sync + 'static,
{
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }
}

/// Error type returned by this crate and accepted from handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error with an explicit HTTP status, reported as plain text.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// Error reported as a JSON response body.
    #[error(transparent)]
    Json(#[from] JsonError),
    /// Non-success response received from a peer.
    #[error(transparent)]
    Call(#[from] CallError),
    /// Caller-defined error that carries its own HTTP status.
    #[error("{0}")]
    Custom(Box<dyn StatusCarrying>),
    /// JSON encoding or decoding failure.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Failure while reading an inbound request body.
    #[error("request body error: {0}")]
    Body(axum::Error),
    /// Outbound request could not be built.
    #[error("invalid request: {0}")]
    Request(BoxError),
    /// Network or request execution error; no response was received.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// A success response whose body did not decode.
    #[error("invalid response body: {source}")]
    Response {
        source: serde_json::Error,
        response: RawResponse,
    },
    /// The call was cancelled through its [`CallContext`](crate::CallContext).
    #[error("request cancelled")]
    Cancelled,
    /// Any other error; reported with status 500 unless it wraps one of the
    /// status-carrying types of this crate.
    #[error("{0}")]
    Other(BoxError),
}

impl Error {
    /// Wraps a caller-defined error that exposes [`HttpStatus`].
    pub fn custom<E>(err: E) -> Self
    where
        E: StdError + HttpStatus + Send + Sync + 'static,
    {
        Self::Custom(Box::new(err))
    }

    /// Wraps an arbitrary error.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Returns the [`JsonError`] this error is or wraps, if any.
    pub fn as_json_error(&self) -> Option<&JsonError> {
        match self {
            Self::Json(err) => Some(err),
            Self::Status(err) => find_in_chain(err.cause()),
            Self::Custom(err) => find_in_chain(err.as_error()),
            Self::Other(err) => find_in_chain(&**err),
            _ => None,
        }
    }

    /// Returns the raw response when the error happened after one arrived.
    ///
    /// Set for non-success statuses ([`Error::Call`]) and for success bodies
    /// that did not decode ([`Error::Response`]).
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Self::Call(err) => Some(err.response()),
            Self::Response { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Returns the [`CallError`] if this is a non-success peer response.
    pub fn as_call_error(&self) -> Option<&CallError> {
        match self {
            Self::Call(err) => Some(err),
            _ => None,
        }
    }
}

impl HttpStatus for Error {
    fn http_status(&self) -> StatusCode {
        match self {
            Self::Status(err) => err.http_status(),
            Self::Json(err) => err.http_status(),
            Self::Call(err) => err.http_status(),
            Self::Custom(err) => err.http_status(),
            Self::Other(err) => chain_status(&**err),
            Self::Serde(_)
            | Self::Body(_)
            | Self::Request(_)
            | Self::Transport(_)
            | Self::Response { .. }
            | Self::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(crate) fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |err| (*err).source())
}

fn find_in_chain<'a, T>(err: &'a (dyn StdError + 'static)) -> Option<&'a T>
where
    T: StdError + 'static,
{
    chain(err).find_map(|err| err.downcast_ref::<T>())
}

/// Resolves the status of an opaque error by looking for a status-carrying
/// type of this crate anywhere in its source chain.
fn chain_status(err: &(dyn StdError + 'static)) -> StatusCode {
    chain(err)
        .find_map(|err| {
            if let Some(err) = err.downcast_ref::<StatusError>() {
                Some(err.http_status())
            } else if let Some(err) = err.downcast_ref::<JsonError>() {
                Some(err.http_status())
            } else if let Some(err) = err.downcast_ref::<CallError>() {
                Some(err.http_status())
            } else {
                err.downcast_ref::<Error>().map(HttpStatus::http_status)
            }
        })
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
