use std::error::Error;
use std::io;

use onvif_async::HttpClient;
use onvif_client_core::{HttpRequest, HttpResponse, TransportError, TransportErrorKind};
use reqwest::{Client, Identity};
use tracing::{debug, info, instrument};

use crate::config::ClientConfig;

/// [`HttpClient`] over a pooled reqwest client with native TLS.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// `identity` is a PKCS#12 archive and its passphrase, for mutual TLS.
    pub fn new(config: &ClientConfig, identity: Option<(&[u8], &str)>) -> Result<Self, TransportError> {
        info!(
            connect_timeout_ms = config.connect_timeout.as_millis(),
            accept_invalid_certs = config.accept_invalid_certs,
            client_identity = identity.is_some(),
            "initializing ReqwestHttpClient with native-tls"
        );

        let mut builder = Client::builder()
            .use_native_tls()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.clone());

        if let Some((der, passphrase)) = identity {
            let identity = Identity::from_pkcs12_der(der, passphrase).map_err(|error| {
                TransportError::with_source(TransportErrorKind::Tls, "unusable client certificate", error)
            })?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(|error| {
            TransportError::with_source(TransportErrorKind::Other, "failed to build HTTP client", error)
        })?;

        Ok(Self { client })
    }

    #[instrument(name = "http_request", level = "debug", skip_all, fields(url = %request.url))]
    async fn send_with_client(client: Client, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(
            headers_count = request.headers.len(),
            body_length = request.body.len(),
            "starting HTTP request"
        );

        let mut req_builder = client.post(&request.url).timeout(request.timeout);
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        let response = req_builder.body(request.body).send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body = response.text().await.map_err(classify)?;
        debug!(status, body_length = body.len(), "received HTTP response");

        Ok(HttpResponse { status, headers, body })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send_request(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        Self::send_with_client(self.client.clone(), request)
    }
}

/// Maps a reqwest failure onto the kinds the session retries on.
fn classify(error: reqwest::Error) -> TransportError {
    let kind = error_kind(
        error.source(),
        error.is_timeout(),
        error.is_connect(),
        error.is_request() || error.is_body(),
    );
    let message = error.to_string();
    TransportError::with_source(kind, message, error)
}

/// TLS failures are checked before the io error underneath them, so a failed handshake
/// is never mistaken for an unreachable device.
fn error_kind(
    source: Option<&(dyn Error + 'static)>,
    timeout: bool,
    connect: bool,
    transfer: bool,
) -> TransportErrorKind {
    if timeout {
        TransportErrorKind::Timeout
    } else if connect && mentions_tls(source) {
        TransportErrorKind::Tls
    } else if let Some(io_kind) = io_error_kind(source) {
        match io_kind {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionReset,
            io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            _ => TransportErrorKind::ConnectionFailed,
        }
    } else if connect {
        TransportErrorKind::ConnectionFailed
    } else if transfer {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    }
}

fn io_error_kind(mut source: Option<&(dyn Error + 'static)>) -> Option<io::ErrorKind> {
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
        source = current.source();
    }
    None
}

fn mentions_tls(mut source: Option<&(dyn Error + 'static)>) -> bool {
    while let Some(current) = source {
        let text = current.to_string().to_lowercase();
        if ["certificate", "handshake", "tls", "ssl"].iter().any(|word| text.contains(word)) {
            return true;
        }
        source = current.source();
    }
    false
}
