use crate::ns;

/// SOAP protocol version. ONVIF devices speak 1.2; some older firmware only answers 1.1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SoapVersion {
    Soap11,
    #[default]
    Soap12,
}

impl SoapVersion {
    pub fn envelope_namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => ns::SOAP11_ENVELOPE,
            SoapVersion::Soap12 => ns::SOAP12_ENVELOPE,
        }
    }

    pub fn from_envelope_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            ns::SOAP12_ENVELOPE => Some(SoapVersion::Soap12),
            ns::SOAP11_ENVELOPE => Some(SoapVersion::Soap11),
            _ => None,
        }
    }

    /// `Content-Type` for a request carrying `action`.
    ///
    /// SOAP 1.2 puts the action in the media type; SOAP 1.1 relies on the `SOAPAction` header alone.
    pub fn content_type(self, action: &str) -> String {
        match self {
            SoapVersion::Soap11 => "text/xml; charset=utf-8".to_owned(),
            SoapVersion::Soap12 => {
                format!("application/soap+xml; charset=utf-8; action=\"{action}\"")
            }
        }
    }
}
