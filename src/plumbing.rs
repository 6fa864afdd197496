use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::{request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Request-scoped side channel between a JSON handler and its adapter.
///
/// Lets a handler choose the success status and add response headers after
/// it has already produced its typed result. Cloning yields another handle to
/// the same request; plumbing is never shared between requests.
#[derive(Clone, Debug)]
pub struct Plumbing {
    state: Arc<Mutex<PlumbingState>>,
    request: Arc<Parts>,
}

#[derive(Debug)]
struct PlumbingState {
    status: StatusCode,
    headers: HeaderMap,
}

impl Plumbing {
    pub(crate) fn new(request: Parts) -> Self {
        Self {
            state: Arc::new(Mutex::new(PlumbingState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
            })),
            request: Arc::new(request),
        }
    }

    /// Sets the status of a successful response. Defaults to `200 OK`.
    pub fn set_response_status(&self, status: StatusCode) {
        self.lock().status = status;
    }

    /// Returns the pending success status.
    pub fn response_status(&self) -> StatusCode {
        self.lock().status
    }

    /// Sets a response header, replacing any previous values.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    /// Adds a response header value, keeping previous values.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.append(name, value);
    }

    /// Gives `edit` mutable access to the pending response headers.
    pub fn with_headers<T>(&self, edit: impl FnOnce(&mut HeaderMap) -> T) -> T {
        edit(&mut self.lock().headers)
    }

    /// Returns a copy of the pending response headers.
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    /// The inbound request head (method, URI, headers, extensions).
    pub fn request(&self) -> &Parts {
        &self.request
    }

    /// Removes the pending status and headers, leaving defaults behind.
    pub(crate) fn take(&self) -> (StatusCode, HeaderMap) {
        let mut state = self.lock();
        let status = std::mem::replace(&mut state.status, StatusCode::OK);
        (status, std::mem::take(&mut state.headers))
    }

    fn lock(&self) -> MutexGuard<'_, PlumbingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Execution context handed to every JSON handler invocation.
#[derive(Clone, Debug)]
pub struct RequestContext {
    plumbing: Plumbing,
}

impl RequestContext {
    pub(crate) fn new(plumbing: Plumbing) -> Self {
        Self { plumbing }
    }

    /// Plumbing of the request being served.
    pub fn plumbing(&self) -> &Plumbing {
        &self.plumbing
    }
}
