//! Request authorizer.
//!
//! [`ApiRequest`] is an owned, replayable description of an API call: it can
//! be stamped, transmitted, captured by the refresh coordinator and stamped
//! again with a renewed token without the caller rebuilding it.
//!
//! [`authorize`] is the pure stamping step applied right before every
//! transmission. It never blocks and never touches the network.

use crate::errors::ClientError;
use common::secret::{ExposeSecret, SecretString};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

// =============================================================================
// ApiRequest
// =============================================================================

/// An outgoing API call relative to the configured base URL.
#[derive(Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    retried: bool,
}

impl ApiRequest {
    /// Create a request for `path` (e.g. `/records`).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Internal` if `body` cannot be represented as JSON.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Internal(format!("failed to serialize request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set a header other than `Authorization`, which is owned by
    /// [`authorize`].
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name != AUTHORIZATION {
            self.headers.insert(name, value);
        }
        self
    }

    /// Mark the request as replayed after a renewal. A retried request that
    /// fails authorization again is never renewed for.
    #[must_use]
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }

    #[must_use]
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the request carries a bearer credential.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }

    /// Build the `reqwest` request against `base_url`.
    pub(crate) fn to_request_builder(
        &self,
        http: &reqwest::Client,
        base_url: &str,
    ) -> reqwest::RequestBuilder {
        let url = format!("{base_url}{}", self.path);
        let mut builder = http
            .request(self.method.clone(), url)
            .headers(self.headers.clone());
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if let Some(body) = &self.body {
            builder = builder.json(body);
        }
        builder
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("has_body", &self.body.is_some())
            .field("authenticated", &self.is_authenticated())
            .field("retried", &self.retried)
            .finish()
    }
}

// =============================================================================
// Authorization
// =============================================================================

/// Stamp `request` with the current access token.
///
/// With a token, `Authorization: Bearer <token>` replaces any previous value;
/// without one, the header is removed and the request goes out
/// unauthenticated. A token that cannot be carried in a header is treated as
/// absent, and the service answers 401 as it would for any bad token.
#[must_use]
pub fn authorize(mut request: ApiRequest, token: Option<&SecretString>) -> ApiRequest {
    request.headers.remove(AUTHORIZATION);

    let Some(token) = token else {
        return request;
    };

    match HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Err(_) => {
            debug!(
                target: "hv.authorizer",
                path = %request.path,
                "Access token is not a valid header value, sending unauthenticated"
            );
        }
    }
    request
}

// =============================================================================
// ApiResponse
// =============================================================================

/// A completed API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    status: u16,
    body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Read a `reqwest` response to completion.
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, ClientError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Self { status, body })
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidResponse` if the body does not parse as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ClientError::InvalidResponse(format!("failed to parse response body: {e}"))
        })
    }
}
