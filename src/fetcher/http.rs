//! reqwest-backed transport
//!
//! The report server expects NTLM, a connection-bound handshake. Each NTLM
//! request therefore runs on a single-connection client so the NEGOTIATE,
//! CHALLENGE and AUTHENTICATE legs share one socket. Basic auth is kept for
//! servers or gateways that accept it. Proxy settings come from the usual
//! `HTTP_PROXY`/`HTTPS_PROXY` environment variables.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response, StatusCode};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::ntlm;
use super::{
    Credentials, FetchError, FetchResult, RemoteBody, RemoteMetadata, Transport,
};

/// Default TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("report-downloader/", env!("CARGO_PKG_VERSION"));

/// How credentials are presented to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// NTLMv2 challenge/response
    #[default]
    Ntlm,
    /// HTTP Basic on every request
    Basic,
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ntlm" => Ok(AuthScheme::Ntlm),
            "basic" => Ok(AuthScheme::Basic),
            _ => Err(format!("Invalid auth scheme: {s} (expected ntlm or basic)")),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthScheme::Ntlm => "ntlm",
            AuthScheme::Basic => "basic",
        })
    }
}

/// HTTP transport over [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    connect_timeout: Duration,
    scheme: AuthScheme,
    system_proxy: bool,
}

impl HttpTransport {
    /// NTLM transport with the given connect timeout
    ///
    /// No overall request timeout is set on the client; the download executor
    /// bounds each wait for data itself.
    pub fn new(connect_timeout: Duration) -> FetchResult<Self> {
        Ok(Self {
            client: build_client(connect_timeout, None, true)?,
            connect_timeout,
            scheme: AuthScheme::Ntlm,
            system_proxy: true,
        })
    }

    /// Connect directly, ignoring proxy environment variables
    pub fn without_system_proxy(mut self) -> FetchResult<Self> {
        self.system_proxy = false;
        self.client = build_client(self.connect_timeout, None, false)?;
        Ok(self)
    }

    /// Switch the authentication scheme
    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Active authentication scheme
    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    async fn send(&self, method: Method, url: &str, credentials: &Credentials) -> FetchResult<Response> {
        match self.scheme {
            AuthScheme::Basic => self
                .client
                .request(method, url)
                .basic_auth(credentials.username(), Some(credentials.secret()))
                .send()
                .await
                .map_err(classify_reqwest),
            AuthScheme::Ntlm => self.send_ntlm(method, url, credentials).await,
        }
    }

    async fn send_ntlm(&self, method: Method, url: &str, credentials: &Credentials) -> FetchResult<Response> {
        let client = build_client(self.connect_timeout, Some(1), self.system_proxy)?;

        let response = client
            .request(method.clone(), url)
            .header(AUTHORIZATION, ntlm::negotiate_header()?)
            .send()
            .await
            .map_err(classify_reqwest)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(challenge) = ntlm::challenge_from(response.headers()) else {
            debug!(url = %url, "Server did not offer an NTLM challenge");
            return Ok(response);
        };
        // Drain the 401 body so the connection goes back to the pool
        let _ = response.bytes().await;

        client
            .request(method, url)
            .header(AUTHORIZATION, ntlm::authenticate_header(&challenge, credentials)?)
            .send()
            .await
            .map_err(classify_reqwest)
    }
}

fn build_client(
    connect_timeout: Duration,
    idle_per_host: Option<usize>,
    system_proxy: bool,
) -> FetchResult<Client> {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT);
    if !system_proxy {
        builder = builder.no_proxy();
    }
    if let Some(idle) = idle_per_host {
        builder = builder.pool_max_idle_per_host(idle);
    }
    builder
        .build()
        .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))
}

fn classify_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        // reqwest does not report the configured duration
        FetchError::Timeout(Duration::ZERO)
    } else {
        FetchError::Network(err.to_string())
    }
}

fn check_status(response: &Response) -> FetchResult<()> {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("unknown status");
    match FetchError::from_status(status.as_u16(), reason) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteMetadata> {
        debug!(url = %url, "Probing remote metadata");
        let response = self.send(Method::HEAD, url, credentials).await?;
        check_status(&response)?;

        Ok(RemoteMetadata {
            content_length: response.content_length(),
        })
    }

    async fn open(&self, url: &str, credentials: &Credentials) -> FetchResult<RemoteBody> {
        debug!(url = %url, "Opening remote body");
        let response = self.send(Method::GET, url, credentials).await?;
        check_status(&response)?;

        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(classify_reqwest))
            .boxed();

        Ok(RemoteBody {
            content_length,
            chunks,
        })
    }
}
