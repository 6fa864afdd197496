use axum::{
    body::{self, Body},
    extract::Request,
    response::Response,
};
use http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    request::Parts,
    HeaderMap, HeaderValue, StatusCode,
};
use http_body_util::LengthLimitError;
use serde::{de::DeserializeOwned, Serialize};

use crate::{error, Error, HttpStatus, Result, StatusError};

/// The only media type accepted and produced by this crate.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of plain-text error responses.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Decodes the body of `request` as JSON.
///
/// The declared content type must be exactly [`JSON_CONTENT_TYPE`]; anything
/// else fails with status 400 before the body is read. At most `limit` bytes
/// are read; larger bodies fail with status 413. Malformed JSON is reported as
/// [`Error::Serde`].
pub async fn read_json<T>(request: Request, limit: usize) -> Result<(Parts, T)>
where
    T: DeserializeOwned,
{
    let (parts, body) = request.into_parts();
    if !has_json_content_type(&parts.headers) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            content_type = ?parts.headers.get(CONTENT_TYPE),
            "rejecting request with invalid content type"
        );
        return Err(StatusError::msg(StatusCode::BAD_REQUEST, "invalid content type").into());
    }

    let bytes = body::to_bytes(body, limit).await.map_err(|err| {
        if is_length_limit(&err) {
            Error::Status(StatusError::msg(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large",
            ))
        } else {
            Error::Body(err)
        }
    })?;

    let value = decode_body(&bytes)?;
    Ok((parts, value))
}

/// Serializes `value` and builds a response with `status`, the given headers
/// and a JSON content type.
///
/// A serialization failure is reported through [`error_response`] instead.
pub fn write_json_status<T>(headers: HeaderMap, status: StatusCode, value: &T) -> Response
where
    T: Serialize + ?Sized,
{
    match serde_json::to_vec(value) {
        Ok(data) => {
            let mut response = Response::new(Body::from(data));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(err) => error_response(headers, &Error::Serde(err)),
    }
}

/// Builds a plain-text response for `err`.
///
/// The body is the display text of the error followed by a newline; the status
/// is the one the error resolves to.
pub fn error_response(mut headers: HeaderMap, err: &Error) -> Response {
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_CONTENT_TYPE));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    let mut response = Response::new(Body::from(format!("{err}\n")));
    *response.status_mut() = err.http_status();
    *response.headers_mut() = headers;
    response
}

/// Encodes call parameters as a JSON request body.
pub fn encode_request<P>(params: &P) -> Result<Vec<u8>>
where
    P: Serialize + ?Sized,
{
    serde_json::to_vec(params).map_err(Error::Serde)
}

/// Decodes a JSON body without any content-type check.
pub fn decode_body<T>(body: &[u8]) -> std::result::Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body)
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes() == JSON_CONTENT_TYPE.as_bytes())
}

fn is_length_limit(err: &axum::Error) -> bool {
    error::chain(err).any(|err| err.is::<LengthLimitError>())
}
