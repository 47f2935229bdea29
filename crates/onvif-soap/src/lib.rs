pub mod discovery;
pub mod envelope;
pub mod fault;
pub mod parsing;
pub mod security;
pub mod version;

pub use envelope::SoapEnvelope;
pub use fault::{FaultCode, SoapFault};
pub use parsing::{BodyContent, parse_body};
pub use security::UsernameToken;
pub use version::SoapVersion;

/// Namespace URIs shared by every ONVIF exchange.
pub mod ns {
    pub const SOAP12_ENVELOPE: &str = "http://www.w3.org/2003/05/soap-envelope";
    pub const SOAP11_ENVELOPE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const PASSWORD_DIGEST: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
    pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

    pub const ONVIF_ERROR: &str = "http://www.onvif.org/ver10/error";
    pub const ONVIF_SCHEMA: &str = "http://www.onvif.org/ver10/schema";
    pub const ONVIF_NETWORK: &str = "http://www.onvif.org/ver10/network/wsdl";

    pub const WS_ADDRESSING_2004: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
    pub const WS_DISCOVERY_2005: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";
}

#[derive(Debug, thiserror::Error)]
pub enum SoapError {
    #[error("XML parsing error: {0}")]
    Parse(#[from] onvif_xml::parser::Error),

    #[error("XML builder error: {0}")]
    Builder(#[from] onvif_xml::builder::XmlBuilderError),

    #[error("not a SOAP envelope: root element is {{{namespace}}}{name}")]
    NotAnEnvelope { namespace: String, name: String },

    #[error("SOAP envelope has no Body element")]
    MissingBody,

    #[error("invalid SOAP message: {0}")]
    Invalid(String),
}
