//! Protocol-specific liveness probes.
//!
//! # Responsibilities
//! - HTTP: send a request derived from the target URL, judge the status
//! - TCP: connect, optionally exchange a payload, judge the reply
//!
//! # Design Decisions
//! - The whole probe is bounded by the configured timeout
//! - Redirect handling is delegated to the HTTP client's redirect policy
//! - Without an expected reply, a TCP probe never reads from the socket
//! - Oversized TCP payloads are dropped at construction with a warning

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use url::Url;

/// Largest accepted `send`/`expect` payload in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 65_535;

/// Why a probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("writing payload failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("reading reply failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("unexpected reply: expected {expected:?}, got {actual:?}")]
    ReplyMismatch { expected: String, actual: String },

    #[error("unexpected status {actual}{}", expected_suffix(.expected))]
    UnexpectedStatus { actual: u16, expected: Option<u16> },

    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

fn expected_suffix(expected: &Option<u16>) -> String {
    match expected {
        Some(code) => format!(" (expected {code})"),
        None => " (expected 2xx or 3xx)".to_string(),
    }
}

/// Settings of an HTTP probe.
#[derive(Debug, Clone)]
pub struct HttpProbeOptions {
    pub scheme: Option<String>,
    pub path: String,
    pub method: String,
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub headers: Vec<(String, String)>,
    pub expected_status: Option<u16>,
    pub follow_redirects: bool,
}

impl Default for HttpProbeOptions {
    fn default() -> Self {
        Self {
            scheme: None,
            path: "/".to_string(),
            method: "GET".to_string(),
            port: None,
            hostname: None,
            headers: Vec::new(),
            expected_status: None,
            follow_redirects: true,
        }
    }
}

/// HTTP request probe.
#[derive(Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
    method: reqwest::Method,
    options: HttpProbeOptions,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(options: HttpProbeOptions, timeout: Duration) -> Result<Self, ProbeError> {
        let method = reqwest::Method::from_bytes(options.method.to_uppercase().as_bytes())
            .map_err(|_| ProbeError::InvalidMethod(options.method.clone()))?;

        let redirect = if options.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            method,
            options,
            timeout,
        })
    }

    /// Health URL for a server URL: scheme and port overrides, configured path and query.
    pub fn probe_url(&self, target: &str) -> Result<Url, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(target).map_err(|e| invalid(&e.to_string()))?;
        if let Some(scheme) = &self.options.scheme {
            url.set_scheme(scheme)
                .map_err(|_| invalid("scheme override rejected"))?;
        }
        if let Some(port) = self.options.port {
            url.set_port(Some(port))
                .map_err(|_| invalid("port override rejected"))?;
        }

        let (path, query) = match self.options.path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.options.path.as_str(), None),
        };
        url.set_path(path);
        url.set_query(query);
        Ok(url)
    }

    pub async fn check(&self, target: &str) -> Result<(), ProbeError> {
        let url = self.probe_url(target)?;

        let mut request = self.client.request(self.method.clone(), url);
        for (name, value) in &self.options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(hostname) = &self.options.hostname {
            request = request.header(reqwest::header::HOST, hostname.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Request(e)
            }
        })?;

        let status = response.status().as_u16();
        let passed = match self.options.expected_status {
            Some(expected) => status == expected,
            None => (200..400).contains(&status),
        };
        if passed {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus {
                actual: status,
                expected: self.options.expected_status,
            })
        }
    }
}

/// TCP connect probe with optional payload exchange.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: Option<u16>,
    send: Option<Vec<u8>>,
    expect: Option<Vec<u8>>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(
        port: Option<u16>,
        send: Option<String>,
        expect: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            port,
            send: capped_payload("send", send),
            expect: capped_payload("expect", expect),
            timeout,
        }
    }

    /// Dial address for a server address, with the port override applied.
    pub fn probe_address(&self, target: &str) -> String {
        match (self.port, target.rsplit_once(':')) {
            (Some(port), Some((host, _))) => format!("{host}:{port}"),
            (Some(port), None) => format!("{target}:{port}"),
            (None, _) => target.to_string(),
        }
    }

    pub async fn check(&self, target: &str) -> Result<(), ProbeError> {
        let address = self.probe_address(target);
        match time::timeout(self.timeout, self.exchange(&address)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self, address: &str) -> Result<(), ProbeError> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(ProbeError::Connect)?;

        if let Some(payload) = &self.send {
            stream.write_all(payload).await.map_err(ProbeError::Write)?;
            stream.flush().await.map_err(ProbeError::Write)?;
        }

        if let Some(expected) = &self.expect {
            let mut reply = vec![0u8; expected.len()];
            stream
                .read_exact(&mut reply)
                .await
                .map_err(ProbeError::Read)?;
            if reply != *expected {
                return Err(ProbeError::ReplyMismatch {
                    expected: String::from_utf8_lossy(expected).into_owned(),
                    actual: String::from_utf8_lossy(&reply).into_owned(),
                });
            }
        }

        Ok(())
    }
}

fn capped_payload(kind: &str, payload: Option<String>) -> Option<Vec<u8>> {
    let payload = payload.filter(|p| !p.is_empty())?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        tracing::warn!(
            kind,
            size = payload.len(),
            max = MAX_PAYLOAD_SIZE,
            "TCP health check payload too large, ignoring it"
        );
        return None;
    }
    Some(payload.into_bytes())
}

/// A configured probe.
#[derive(Debug)]
pub enum Probe {
    Http(HttpProbe),
    Tcp(TcpProbe),
}

impl Probe {
    pub async fn check(&self, target: &str) -> Result<(), ProbeError> {
        match self {
            Probe::Http(probe) => probe.check(target).await,
            Probe::Tcp(probe) => probe.check(target).await,
        }
    }
}
