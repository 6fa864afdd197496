use std::{error::Error as StdError, fmt};

use axum::body::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::{client::RawResponse, error::BoxError};

/// Capability of values that know which HTTP status they should be reported with.
///
/// Implemented by [`StatusError`], [`JsonError`], [`CallError`] and the crate
/// [`Error`](crate::Error). External error types opt in by implementing this
/// trait and wrapping themselves with [`Error::custom`](crate::Error::custom).
pub trait HttpStatus {
    /// Status code to report.
    fn http_status(&self) -> StatusCode;
}

/// Returns the HTTP status appropriate for `err`.
///
/// `None` maps to `200 OK`; errors without a more specific status map to
/// `500 Internal Server Error`.
pub fn error_status<E>(err: Option<&E>) -> StatusCode
where
    E: HttpStatus + ?Sized,
{
    err.map_or(StatusCode::OK, HttpStatus::http_status)
}

/// An error paired with the HTTP status it should be reported with.
///
/// Reported as plain text: the response body is the display text of the cause.
#[derive(Debug)]
pub struct StatusError {
    code: StatusCode,
    cause: BoxError,
}

impl StatusError {
    /// Wraps `cause` with `code`.
    pub fn new(code: StatusCode, cause: impl Into<BoxError>) -> Self {
        Self {
            code,
            cause: cause.into(),
        }
    }

    /// Creates a status error from a plain message.
    pub fn msg(code: StatusCode, message: impl fmt::Display) -> Self {
        Self::new(code, message.to_string())
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl StdError for StatusError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.cause)
    }
}

impl HttpStatus for StatusError {
    fn http_status(&self) -> StatusCode {
        self.code
    }
}

/// Builds a [`StatusError`] from a status code and `format!` arguments.
///
/// ```
/// use httpjson::{status_error, StatusError};
/// use http::StatusCode;
///
/// let err: StatusError = status_error!(StatusCode::NOT_FOUND, "no user {}", 42);
/// assert_eq!(err.to_string(), "no user 42");
/// ```
#[macro_export]
macro_rules! status_error {
    ($code:expr, $($arg:tt)+) => {
        $crate::StatusError::msg($code, ::std::format!($($arg)+))
    };
}

/// An error whose response body is the JSON encoding of `value`.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonError {
    pub code: StatusCode,
    pub value: serde_json::Value,
}

impl JsonError {
    pub fn new(code: StatusCode, value: impl Into<serde_json::Value>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }

    /// Captures any serializable payload.
    pub fn from_serialize<T>(code: StatusCode, value: &T) -> Result<Self, serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        Ok(Self {
            code,
            value: serde_json::to_value(value)?,
        })
    }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_u16(), self.value)
    }
}

impl StdError for JsonError {}

impl HttpStatus for JsonError {
    fn http_status(&self) -> StatusCode {
        self.code
    }
}

/// Non-success response received by a [`JsonCall`](crate::JsonCall).
#[derive(Clone, Debug)]
pub struct CallError {
    response: RawResponse,
    text: String,
}

impl CallError {
    pub(crate) fn new(response: RawResponse) -> Self {
        Self {
            text: status_text(response.status),
            response,
        }
    }

    /// Status code of the response.
    pub fn code(&self) -> StatusCode {
        self.response.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Response body as drained, possibly short if reading it failed midway.
    pub fn body(&self) -> &Bytes {
        &self.response.body
    }

    /// Body as UTF-8 text, lossily converted.
    pub fn body_text(&self) -> String {
        self.response.body_text()
    }

    pub fn response(&self) -> &RawResponse {
        &self.response
    }

    pub fn into_response(self) -> RawResponse {
        self.response
    }
}

impl PartialEq for CallError {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code() && self.body() == other.body()
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl StdError for CallError {}

impl HttpStatus for CallError {
    fn http_status(&self) -> StatusCode {
        self.response.status
    }
}

/// Formats a status line such as `"418 I'm a teapot"`.
fn status_text(code: StatusCode) -> String {
    match code.canonical_reason() {
        Some(reason) => format!("{} {reason}", code.as_u16()),
        None => code.as_u16().to_string(),
    }
}
