pub mod auth;
pub mod catalogue;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod endpoint;
pub mod http;
pub mod registry;
pub mod schema;
pub mod value;

pub use auth::Authenticator;
pub use config::{RetryPolicy, SessionConfig};
pub use credentials::{AuthMode, ClientCertificate, Credential};
pub use dispatcher::{OnvifError, OnvifErrorKind};
pub use endpoint::{DeviceEndpoint, ServiceEndpoint};
pub use http::{HttpRequest, HttpResponse, TransportError, TransportErrorKind};
pub use registry::{OperationHandle, Registry, SchemaError};
pub use value::{Structure, Value, XmlFragment, XsDateTime, XsDuration};

pub use onvif_soap::{SoapFault, SoapVersion};

/// Every failure a call can end with. Cloneable so a shared in-flight result can be
/// handed to each waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OnvifCoreError {
    #[error("unknown operation {service}.{operation}")]
    UnknownOperation { service: String, operation: String },

    #[error("missing required field `{path}`")]
    MissingRequiredField { path: String },

    #[error("`{value}` is not allowed for `{path}`, expected one of {allowed:?}")]
    InvalidEnumValue {
        path: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("invalid value for `{path}`, expected {expected}")]
    InvalidFieldValue { path: String, expected: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed {operation} response: {reason}")]
    MalformedResponse { operation: String, reason: String },

    #[error("device fault: {0}")]
    Onvif(#[from] OnvifError),

    #[error("device does not provide the {service} service")]
    ServiceUnavailable { service: String },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("call cancelled")]
    Cancelled,

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("XML error: {0}")]
    Xml(String),
}

impl From<onvif_soap::SoapError> for OnvifCoreError {
    fn from(error: onvif_soap::SoapError) -> Self {
        OnvifCoreError::Xml(error.to_string())
    }
}

impl From<onvif_xml::builder::XmlBuilderError> for OnvifCoreError {
    fn from(error: onvif_xml::builder::XmlBuilderError) -> Self {
        OnvifCoreError::Xml(error.to_string())
    }
}

impl OnvifCoreError {
    /// The device answered with a fault of this kind.
    pub fn is_onvif(&self, kind: OnvifErrorKind) -> bool {
        matches!(self, OnvifCoreError::Onvif(error) if error.kind == kind)
    }

    pub fn transport_kind(&self) -> Option<&TransportErrorKind> {
        match self {
            OnvifCoreError::Transport(error) => Some(&error.kind),
            _ => None,
        }
    }
}
