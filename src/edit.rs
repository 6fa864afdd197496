use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{HttpClient, Result};

type EditHook = dyn Fn(&mut reqwest::Request) -> Result<()> + Send + Sync;

/// Wraps an [`HttpClient`] with a hook that sees every outgoing request.
///
/// If the hook fails, its error is returned as-is and the request is never
/// sent. Otherwise the (possibly edited) request is forwarded to the wrapped
/// client. Without a hook, requests are forwarded unchanged.
#[derive(Clone)]
pub struct EditRequestClient<C> {
    client: C,
    edit: Option<Arc<EditHook>>,
}

impl<C> fmt::Debug for EditRequestClient<C>
where
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditRequestClient")
            .field("client", &self.client)
            .field("edit", &self.edit.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl<C> EditRequestClient<C> {
    /// Wraps `client` without a hook.
    pub fn new(client: C) -> Self {
        Self { client, edit: None }
    }

    /// Installs `edit` as the request hook, replacing any previous one.
    pub fn with_edit<F>(mut self, edit: F) -> Self
    where
        F: Fn(&mut reqwest::Request) -> Result<()> + Send + Sync + 'static,
    {
        self.edit = Some(Arc::new(edit));
        self
    }

    pub fn inner(&self) -> &C {
        &self.client
    }
}

/// Returns `client` wrapped so that `edit` runs on every request first.
pub fn edit_request<C, F>(client: C, edit: F) -> EditRequestClient<C>
where
    F: Fn(&mut reqwest::Request) -> Result<()> + Send + Sync + 'static,
{
    EditRequestClient::new(client).with_edit(edit)
}

#[async_trait]
impl<C: HttpClient> HttpClient for EditRequestClient<C> {
    async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        if let Some(edit) = &self.edit {
            if let Err(err) = edit(&mut request) {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %err, url = %request.url(), "request edit hook rejected request");
                return Err(err);
            }
        }
        self.client.execute(request).await
    }
}
