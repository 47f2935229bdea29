use std::sync::Arc;
use std::time::Duration;

use onvif_soap::SoapVersion;

/// A SOAP POST ready to be put on the wire by an `HttpClient`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Upper bound for the whole exchange; the client drops the request once it elapses.
    pub timeout: Duration,
}

impl HttpRequest {
    /// A POST of `body` with the content type and `SOAPAction` header for `version`.
    pub fn soap(url: impl Into<String>, version: SoapVersion, action: &str, body: String, timeout: Duration) -> Self {
        HttpRequest {
            url: url.into(),
            headers: vec![
                ("Content-Type".to_owned(), version.content_type(action)),
                ("SOAPAction".to_owned(), format!("\"{action}\"")),
            ],
            body,
            timeout,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body looks like a SOAP message. Devices send faults with 400 or 500,
    /// so those still have to be decoded.
    pub fn has_soap_body(&self) -> bool {
        let content_type = self.header("Content-Type").unwrap_or_default();
        let xml_type = content_type.contains("xml");
        let body = self.body.trim_start();
        (xml_type || content_type.is_empty()) && body.starts_with('<')
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    ConnectionFailed,
    ConnectionReset,
    Tls,
    HttpStatus(u16),
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Timeout => f.write_str("timeout"),
            TransportErrorKind::ConnectionFailed => f.write_str("connection failed"),
            TransportErrorKind::ConnectionReset => f.write_str("connection reset"),
            TransportErrorKind::Tls => f.write_str("TLS failure"),
            TransportErrorKind::HttpStatus(status) => write!(f, "HTTP status {status}"),
            TransportErrorKind::Other => f.write_str("transport failure"),
        }
    }
}

/// A failure below the SOAP layer, carrying the underlying cause when there is one.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        TransportError {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: TransportErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TransportError {
            kind,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        TransportError::new(
            TransportErrorKind::Timeout,
            format!("no response within {after:?}"),
        )
    }

    pub fn status(status: u16) -> Self {
        TransportError::new(
            TransportErrorKind::HttpStatus(status),
            format!("unexpected HTTP status {status}"),
        )
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}
