use std::{
    fmt,
    marker::PhantomData,
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{build_client, codec, CallError, ClientOptions, Error, Result};

/// Capability of executing one HTTP request.
///
/// Implemented by `reqwest::Client`, by [`EditRequestClient`](crate::EditRequestClient)
/// and by shared handles to other implementations.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and returns the response head with an unread body.
    ///
    /// Errors mean no response was received.
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(Error::Transport)
    }
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Box<C> {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        (**self).execute(request).await
    }
}

/// Process-wide client used when a call is made without one.
///
/// Built once from `ClientOptions::default()` and shared by all callers.
pub fn default_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        build_client(&ClientOptions::default()).unwrap_or_else(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_err, "falling back to a stock reqwest client");
            reqwest::Client::default()
        })
    })
}

/// Cancellation and deadline carrier for a single call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the call with [`Error::Cancelled`] once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Asks the transport to give up after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// A response as received by a [`JsonCall`], with its body fully drained.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    /// Body as UTF-8 text, lossily converted.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Decoded result of a successful call together with the raw response.
#[derive(Clone, Debug)]
pub struct Called<R> {
    pub value: R,
    pub response: RawResponse,
}

impl<R> Called<R> {
    pub fn into_value(self) -> R {
        self.value
    }
}

/// A typed JSON call bound to one HTTP method and URL.
///
/// Built with [`call_json`].
pub struct JsonCall<P: ?Sized, R> {
    method: Method,
    url: String,
    types: PhantomData<fn(&P) -> R>,
}

/// Returns a [`JsonCall`] that sends `P` as JSON to `url` and decodes `R`.
pub fn call_json<P, R>(method: Method, url: impl Into<String>) -> JsonCall<P, R>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    JsonCall {
        method,
        url: url.into(),
        types: PhantomData,
    }
}

impl<P: ?Sized, R> Clone for JsonCall<P, R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            types: PhantomData,
        }
    }
}

impl<P: ?Sized, R> fmt::Debug for JsonCall<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCall")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish()
    }
}

impl<P, R> JsonCall<P, R>
where
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends `params` through `client`, or the [`default_client`] when `None`.
    ///
    /// - A 2xx response is decoded into `R`; an undecodable body is reported
    ///   as [`Error::Response`] with the raw response attached.
    /// - Any other status is reported as [`Error::Call`].
    /// - Failures before a response arrives are reported as they occurred
    ///   ([`Error::Serde`], [`Error::Request`], [`Error::Transport`], or the
    ///   client's own error).
    ///
    /// The response body is always read to the end.
    pub async fn call(
        &self,
        ctx: &CallContext,
        client: Option<&dyn HttpClient>,
        params: &P,
    ) -> Result<Called<R>> {
        let body = codec::encode_request(params)?;
        let request = self.build_request(ctx, body)?;
        let client = client.unwrap_or_else(|| default_client() as &dyn HttpClient);

        let exchange = async {
            let response = client.execute(request).await?;
            read_response(response).await
        };

        match &ctx.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                result = exchange => result,
            },
            None => exchange.await,
        }
    }

    fn build_request(&self, ctx: &CallContext, body: Vec<u8>) -> Result<reqwest::Request> {
        let request = http::Request::builder()
            .method(self.method.clone())
            .uri(&self.url)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static(codec::JSON_CONTENT_TYPE),
            )
            .body(body)
            .map_err(|err| Error::Request(err.into()))?;
        let mut request =
            reqwest::Request::try_from(request).map_err(|err| Error::Request(err.into()))?;
        *request.timeout_mut() = ctx.timeout;
        Ok(request)
    }
}

async fn read_response<R: DeserializeOwned>(mut response: reqwest::Response) -> Result<Called<R>> {
    let status = response.status();
    let headers = response.headers().clone();

    let mut body = Vec::new();
    let read_error = loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break None,
            Err(err) => break Some(err),
        }
    };
    let response = RawResponse {
        status,
        headers,
        body: Bytes::from(body),
    };

    if !status.is_success() {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            %status,
            body_len = response.body.len(),
            read_error = ?read_error.as_ref(),
            "JSON call returned non-success status"
        );
        return Err(CallError::new(response).into());
    }
    if let Some(err) = read_error {
        return Err(Error::Transport(err));
    }

    let decoded = codec::decode_body(&response.body);
    match decoded {
        Ok(value) => Ok(Called { value, response }),
        Err(source) => Err(Error::Response { source, response }),
    }
}
