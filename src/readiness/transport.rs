//! HTTPS transport for the readiness probes
//!
//! Every probe trusts exactly the bundle it is handed (never the platform
//! roots) and may pin the request host to a concrete address so one
//! API server can be reached behind a shared service name.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Certificate, Client, Method};

use crate::error::ReasonedError;
use crate::Error;

/// Per-request timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method of a probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeMethod {
    /// HEAD
    Head,
    /// GET
    Get,
}

/// A single probe request
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeRequest {
    /// HEAD or GET
    pub method: ProbeMethod,
    /// Full `https://` URL
    pub url: String,
    /// PEM bundle to trust; the only trust roots used
    pub ca_bundle: Vec<u8>,
    /// Resolve this host to this address instead of using DNS
    pub resolve: Option<(String, SocketAddr)>,
}

/// The parts of a response the checks look at
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbeResponse {
    /// Numeric status code
    pub status: u16,
    /// Status line, e.g. "503 Service Unavailable"
    pub status_text: String,
    /// Response body (empty for HEAD)
    pub body: Vec<u8>,
}

impl ProbeResponse {
    /// True for 200 OK
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Sends probe requests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Send the request
    ///
    /// Transport setup failures carry `FailedTransport`, connection and
    /// protocol failures carry `FailedGet`. Any HTTP status is a success.
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ReasonedError>;
}

/// [`HttpProbe`] backed by reqwest with rustls
#[derive(Clone, Debug, Default)]
pub struct ReqwestProbe;

impl ReqwestProbe {
    fn client(request: &ProbeRequest) -> Result<Client, ReasonedError> {
        let certs = Certificate::from_pem_bundle(&request.ca_bundle).map_err(|e| {
            ReasonedError::new("FailedTransport", Error::http("failed to parse CA bundle", e))
        })?;

        let mut builder = Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none());
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
        if let Some((host, addr)) = &request.resolve {
            builder = builder.resolve(host, *addr);
        }

        builder.build().map_err(|e| {
            ReasonedError::new("FailedTransport", Error::http("failed to build transport", e))
        })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ReasonedError> {
        let client = Self::client(&request)?;
        let method = match request.method {
            ProbeMethod::Head => Method::HEAD,
            ProbeMethod::Get => Method::GET,
        };

        let response = client
            .request(method, &request.url)
            .send()
            .await
            .map_err(|e| ReasonedError::new("FailedGet", Error::http(format!("GET {}", request.url), e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                ReasonedError::new("FailedGet", Error::http("failed to read response body", e))
            })?
            .to_vec();

        Ok(ProbeResponse {
            status: status.as_u16(),
            status_text: status.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_counts_as_ok() {
        let ok = ProbeResponse {
            status: 200,
            ..Default::default()
        };
        assert!(ok.is_ok());
        let redirect = ProbeResponse {
            status: 302,
            ..Default::default()
        };
        assert!(!redirect.is_ok());
    }
}
