//! Authenticating HTTP transport and the content source built on it.
//!
//! [`AuthenticatingTransport`] is configured for exactly one source server.
//! Credentials are scoped host-wide (any path on `scheme://host:port`) and
//! the Basic scheme is registered in the auth cache up front, so the very
//! first request already carries the `Authorization` header instead of
//! waiting for a 401 challenge.

use crate::config::{JobConfiguration, TransportConfig};
use crate::error::{Error, Result, TransportError};
use crate::request::build_grab_url;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use url::Url;

/// Username/password pair for the source server
#[derive(Clone)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The host triple credentials and cached auth schemes are keyed on
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AuthScope {
    /// URL scheme
    pub scheme: String,
    /// Host name
    pub host: String,
    /// Port
    pub port: u16,
}

impl AuthScope {
    /// Scope covering every path on the URL's host
    pub fn for_url(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
        })
    }
}

/// Authentication schemes the transport can send preemptively
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthScheme {
    /// HTTP Basic
    Basic,
}

/// HTTP client bound to one source server and one credential pair
pub struct AuthenticatingTransport {
    client: reqwest::Client,
    credentials: HashMap<AuthScope, Credentials>,
    auth_cache: HashMap<AuthScope, AuthScheme>,
}

impl AuthenticatingTransport {
    /// Build a transport for `target`, installing `credentials` for its host
    pub fn new(config: &TransportConfig, target: &Url, credentials: Credentials) -> Result<Self> {
        let scope = AuthScope::for_url(target).ok_or_else(|| {
            Error::config("host", format!("grab URL {} has no host or port", target))
        })?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| TransportError::Request {
            url: target.to_string(),
            message: format!("failed to create HTTP client: {}", e),
        })?;

        let mut transport = Self {
            client,
            credentials: HashMap::new(),
            auth_cache: HashMap::new(),
        };
        transport.credentials.insert(scope.clone(), credentials);
        transport.auth_cache.insert(scope, AuthScheme::Basic);
        Ok(transport)
    }

    /// Whether a request to `url` will carry credentials on its first attempt
    pub fn authenticates_preemptively(&self, url: &Url) -> bool {
        AuthScope::for_url(url)
            .map(|scope| self.auth_cache.contains_key(&scope) && self.credentials.contains_key(&scope))
            .unwrap_or(false)
    }

    /// Send a GET and return the response with its body still unread
    ///
    /// Non-2xx responses are returned as [`TransportError::Status`].
    pub async fn execute(&self, url: Url) -> std::result::Result<reqwest::Response, TransportError> {
        let target = url.to_string();
        let mut request = self.client.get(url.clone());

        if let Some(scope) = AuthScope::for_url(&url)
            && let (Some(AuthScheme::Basic), Some(creds)) =
                (self.auth_cache.get(&scope), self.credentials.get(&scope))
        {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&target, e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %target, status = status.as_u16(), "source server rejected grab request");
            return Err(TransportError::Status {
                url: target,
                status: status.as_u16(),
            });
        }

        tracing::debug!(url = %target, status = status.as_u16(), "grab stream opened");
        Ok(response)
    }
}

/// Inbound byte stream bound to a job
#[async_trait]
pub trait InputStream: Send {
    /// Next chunk of the body, `None` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Release the stream; unread body data is discarded
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Where a job's content stream comes from
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Open the content stream for a job
    async fn open(&self, job: &JobConfiguration) -> Result<Box<dyn InputStream>>;
}

/// [`InputStream`] over a streamed HTTP response body
pub struct HttpInputStream {
    url: String,
    response: reqwest::Response,
}

impl HttpInputStream {
    /// Wrap a response whose body has not been read yet
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            url: response.url().to_string(),
            response,
        }
    }
}

#[async_trait]
impl InputStream for HttpInputStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .map_err(|e| Error::Transport(TransportError::from_reqwest(&self.url, e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping an unfinished body closes the underlying connection.
        tracing::debug!(url = %self.url, "closing grab stream");
        drop(self.response);
        Ok(())
    }
}

/// Production [`ContentSource`]: one authenticated GET per job
///
/// A fresh transport is built for every job from the shared
/// [`TransportConfig`], so credentials never leak between jobs.
pub struct HttpContentSource {
    config: TransportConfig,
}

impl HttpContentSource {
    /// Create a source using the given transport settings
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn open(&self, job: &JobConfiguration) -> Result<Box<dyn InputStream>> {
        let url = build_grab_url(job)?;
        let transport = AuthenticatingTransport::new(
            &self.config,
            &url,
            Credentials::new(&job.server_username, &job.server_password),
        )?;
        let response = transport.execute(url).await?;
        Ok(Box::new(HttpInputStream::new(response)))
    }
}
