use std::{future::Future, pin::Pin, sync::Arc};

use axum::{extract::Request, handler::Handler, response::Response};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::{codec, status_error, Error, HandlerOptions, Plumbing, Reply, RequestContext};

/// Future returned by the handlers this module builds.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Wraps a typed async function into an axum handler.
///
/// The request body is decoded from JSON into `P`, `handler` is called with a
/// [`RequestContext`] and the parameters, and the result is encoded as JSON.
///
/// - The success status is `200 OK` unless the handler changed it through the
///   plumbing; a result whose [`Reply::status`] is `Some` overrides both.
/// - If the error is or wraps a [`JsonError`](crate::JsonError), its value is
///   sent as a JSON body with its code. Any other error is sent as plain text
///   with the status it resolves to.
/// - Requests that fail to decode never reach the handler.
///
/// ```no_run
/// use axum::{routing::post, Router};
/// use httpjson::{handle_json, Error, RequestContext};
///
/// async fn add(_ctx: RequestContext, (a, b): (i64, i64)) -> Result<i64, Error> {
///     Ok(a + b)
/// }
///
/// let app: Router = Router::new().route("/add", post(handle_json(add)));
/// ```
pub fn handle_json<F, Fut, P, R, E>(
    handler: F,
) -> impl Fn(Request) -> ResponseFuture + Clone + Send + Sync + 'static
where
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Reply + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    handle_json_with(HandlerOptions::default(), handler)
}

/// Like [`handle_json`], with explicit [`HandlerOptions`].
pub fn handle_json_with<F, Fut, P, R, E>(
    options: HandlerOptions,
    handler: F,
) -> impl Fn(Request) -> ResponseFuture + Clone + Send + Sync + 'static
where
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Reply + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    let handler = Arc::new(handler);
    let limit = options.max_body_bytes;
    move |request: Request| -> ResponseFuture {
        let handler = Arc::clone(&handler);
        Box::pin(async move { serve_json(&*handler, request, limit).await })
    }
}

async fn serve_json<F, Fut, P, R, E>(handler: &F, request: Request, limit: usize) -> Response
where
    F: Fn(RequestContext, P) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    P: DeserializeOwned,
    R: Reply,
    E: Into<Error>,
{
    let (parts, params) = match codec::read_json::<P>(request, limit).await {
        Ok(decoded) => decoded,
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %err, "rejecting undecodable JSON request");
            return codec::error_response(HeaderMap::new(), &err);
        }
    };

    let plumbing = Plumbing::new(parts);
    let result = handler(RequestContext::new(plumbing.clone()), params).await;
    let (status, headers) = plumbing.take();

    match result {
        Ok(reply) => {
            let status = reply.status().unwrap_or(status);
            codec::write_json_status(headers, status, &reply)
        }
        Err(err) => {
            let err: Error = err.into();
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %err, "JSON handler failed");
            match err.as_json_error() {
                Some(json) => codec::write_json_status(headers, json.code, &json.value),
                None => codec::error_response(headers, &err),
            }
        }
    }
}

/// Wraps `handler` so that only requests with `method` reach it.
///
/// Other methods get `405 Method Not Allowed` with a plain-text body.
pub fn check_method<H, T>(
    method: Method,
    handler: H,
) -> impl Fn(Request) -> ResponseFuture + Clone + Send + Sync + 'static
where
    H: Handler<T, ()> + Sync,
    T: 'static,
{
    move |request: Request| -> ResponseFuture {
        if *request.method() != method {
            let err = Error::from(status_error!(
                StatusCode::METHOD_NOT_ALLOWED,
                "method {} not allowed",
                request.method()
            ));
            return Box::pin(std::future::ready(codec::error_response(
                HeaderMap::new(),
                &err,
            )));
        }
        Box::pin(handler.clone().call(request, ()))
    }
}
