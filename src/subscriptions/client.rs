//! Client for the remote subscription manager's REST API.
//!
//! ```text
//! POST   {submgr}/subscriptions          create, returns SubscriptionResponse
//! DELETE {submgr}/subscriptions/{id}     delete
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::{Response, Url};
use tracing::debug;

use super::types::{SubscriptionError, SubscriptionParams, SubscriptionResponse};
use crate::error::AppError;

/// A boxed future returned by [`SubmgrClient`] calls.
pub type ClientFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SubscriptionError>> + Send + 'a>>;

/// The two calls the subscription manager core makes to the remote service.
pub trait SubmgrClient: Send + Sync {
    fn subscribe<'a>(&'a self, params: &'a SubscriptionParams) -> ClientFuture<'a, SubscriptionResponse>;

    fn unsubscribe<'a>(&'a self, subscription_id: &'a str) -> ClientFuture<'a, ()>;
}

/// reqwest-backed [`SubmgrClient`].
pub struct HttpSubmgrClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSubmgrClient {
    /// `base_url` is the REST root, e.g. `http://submgr:8088/ric/v1`.
    /// `timeout` bounds every call end to end.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Subscription(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn subscriptions_url(&self) -> String {
        format!("{}/subscriptions", self.base_url)
    }

    /// `{base}/subscriptions/{id}` with `id` percent-encoded as one segment.
    pub fn subscription_url(&self, subscription_id: &str) -> Result<Url, SubscriptionError> {
        let mut url = Url::parse(&self.subscriptions_url())
            .map_err(|e| SubscriptionError::RequestFailed(format!("invalid submgr url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SubscriptionError::RequestFailed("submgr url cannot take a path".into()))?
            .push(subscription_id);
        Ok(url)
    }
}

/// Pass 2xx responses through; turn anything else into `UnexpectedStatus`.
async fn check_status(resp: Response) -> Result<Response, SubscriptionError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SubscriptionError::UnexpectedStatus { status: status.as_u16(), body })
}

impl SubmgrClient for HttpSubmgrClient {
    fn subscribe<'a>(&'a self, params: &'a SubscriptionParams) -> ClientFuture<'a, SubscriptionResponse> {
        Box::pin(async move {
            let resp = self
                .http
                .post(self.subscriptions_url())
                .json(params)
                .send()
                .await
                .map_err(|e| SubscriptionError::RequestFailed(e.to_string()))?;
            debug!(status = %resp.status(), meid = %params.meid, "subscription create answered");

            let resp = check_status(resp).await?;
            resp.json::<SubscriptionResponse>()
                .await
                .map_err(|e| SubscriptionError::RequestFailed(format!("malformed response: {e}")))
        })
    }

    fn unsubscribe<'a>(&'a self, subscription_id: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move {
            let url = self.subscription_url(subscription_id)?;
            let resp = self
                .http
                .delete(url)
                .send()
                .await
                .map_err(|e| SubscriptionError::RequestFailed(e.to_string()))?;
            debug!(status = %resp.status(), %subscription_id, "subscription delete answered");

            check_status(resp).await?;
            Ok(())
        })
    }
}
