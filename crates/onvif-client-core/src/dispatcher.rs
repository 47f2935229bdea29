//! Sans-IO halves of a call: [`prepare`] turns arguments into an HTTP request and
//! [`accept`] turns the HTTP response into a result. The async session sits in between.

use onvif_soap::{FaultCode, SoapFault, SoapVersion};
use onvif_xml::parser::QualifiedName;
use tracing::{debug, warn};

use crate::OnvifCoreError;
use crate::auth::Authenticator;
use crate::codec::{self, Decoded};
use crate::http::{HttpRequest, HttpResponse, TransportError, TransportErrorKind};
use crate::registry::OperationHandle;
use crate::value::Structure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnvifErrorKind {
    AuthError,
    InvalidArgument,
    ActionNotSupported,
    OutOfRange,
    Generic,
}

/// A SOAP fault (or HTTP authentication failure) classified for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnvifError {
    pub kind: OnvifErrorKind,
    pub code: FaultCode,
    /// The subcode that decided `kind`, or the deepest one for `Generic`, as sent.
    pub subcode: Option<QualifiedName>,
    /// Every subcode of the fault, outermost first.
    pub subcodes: Vec<QualifiedName>,
    pub reason: String,
    pub detail: Option<String>,
}

impl std::fmt::Display for OnvifError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({}", self.kind, self.code)?;
        if let Some(subcode) = &self.subcode {
            write!(f, "/{subcode}")?;
        }
        write!(f, ")")?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for OnvifError {}

impl OnvifError {
    /// HTTP 401/403 with nothing to decode.
    pub fn unauthorized(status: u16) -> Self {
        OnvifError {
            kind: OnvifErrorKind::AuthError,
            code: FaultCode::Sender,
            subcode: None,
            subcodes: Vec::new(),
            reason: format!("HTTP {status}"),
            detail: None,
        }
    }

    /// Local name of the reported subcode, e.g. `ActionNotSupported`.
    pub fn subcode_name(&self) -> Option<&str> {
        self.subcode.as_ref().map(|subcode| subcode.local_name.as_str())
    }

    /// Whether any subcode in the chain has this local name.
    pub fn has_subcode(&self, local_name: &str) -> bool {
        self.subcodes.iter().any(|subcode| subcode.local_name == local_name)
    }
}

impl From<SoapFault> for OnvifError {
    fn from(fault: SoapFault) -> Self {
        map_fault(fault)
    }
}

fn classify(local_name: &str) -> Option<OnvifErrorKind> {
    let kind = match local_name {
        "NotAuthorized" | "FailedAuthentication" | "InvalidSecurity" | "InvalidSecurityToken"
        | "SecurityTokenUnavailable" | "MessageExpired" | "FailedCheck" => OnvifErrorKind::AuthError,
        "ActionNotSupported" => OnvifErrorKind::ActionNotSupported,
        "OutOfRange" | "OutofRange" | "InvalidPosition" | "InvalidSpeed" | "InvalidTranslation"
        | "InvalidVelocity" => OnvifErrorKind::OutOfRange,
        "InvalidArgVal" | "InvalidArgs" | "InvalidArgument" => OnvifErrorKind::InvalidArgument,
        _ => return None,
    };
    Some(kind)
}

/// Classifies a fault by its subcodes, most specific first. SOAP 1.1 devices that put
/// the WS-Security code straight into `faultcode` are recognised too.
pub fn map_fault(fault: SoapFault) -> OnvifError {
    let matched = fault
        .subcodes
        .iter()
        .rev()
        .find_map(|subcode| classify(&subcode.local_name).map(|kind| (kind, subcode.clone())));

    let (kind, subcode) = match (matched, &fault.code) {
        (Some((kind, subcode)), _) => (kind, Some(subcode)),
        (None, FaultCode::Other(code)) => {
            let local = code.rsplit(':').next().unwrap_or(code);
            (
                classify(local).unwrap_or(OnvifErrorKind::Generic),
                fault.deepest_subcode().cloned(),
            )
        }
        (None, _) => (OnvifErrorKind::Generic, fault.deepest_subcode().cloned()),
    };

    OnvifError {
        kind,
        code: fault.code,
        subcode,
        subcodes: fault.subcodes,
        reason: fault.reason,
        detail: fault.detail,
    }
}

/// Encodes the call and wraps it in an authenticated HTTP request.
pub fn prepare(
    op: &OperationHandle,
    args: &Structure,
    xaddr: &str,
    authenticator: &Authenticator,
    version: SoapVersion,
    timeout: std::time::Duration,
) -> Result<HttpRequest, OnvifCoreError> {
    let headers = authenticator.security_headers(version);
    let body = codec::encode_request(op, args, version, headers)?;
    let request = HttpRequest::soap(xaddr, version, &op.descriptor.action, body, timeout);
    Ok(authenticator.authorize(request))
}

/// Turns the device's answer into a result. Faults are decoded whatever the status;
/// a 401 or 403 without a SOAP body is an authentication failure.
pub fn accept(op: &OperationHandle, response: &HttpResponse) -> Result<Structure, OnvifCoreError> {
    let status = response.status;

    if !response.has_soap_body() {
        if matches!(status, 401 | 403) {
            return Err(OnvifError::unauthorized(status).into());
        }
        if !response.is_success() {
            return Err(TransportError::status(status).into());
        }
    }

    match codec::decode_response(op, &response.body) {
        Ok(Decoded::Response(result)) => {
            if !response.is_success() {
                warn!(operation = %op.descriptor.name, status, "response body with error status");
            }
            Ok(result)
        }
        Ok(Decoded::Fault(fault)) => {
            debug!(operation = %op.descriptor.name, status, %fault, "device returned a fault");
            Err(map_fault(fault).into())
        }
        Err(error) if !response.is_success() => {
            debug!(operation = %op.descriptor.name, status, %error, "undecodable error response");
            if matches!(status, 401 | 403) {
                Err(OnvifError::unauthorized(status).into())
            } else {
                Err(TransportError::status(status).into())
            }
        }
        Err(error) => Err(error),
    }
}

const RELOCATION_SUBCODES: &[&str] = &["EndpointUnavailable", "DestinationUnreachable", "NoSuchService"];

/// Failures that suggest the cached XAddr no longer points at the service.
pub fn is_relocation(error: &OnvifCoreError) -> bool {
    match error {
        OnvifCoreError::Transport(transport) => matches!(
            transport.kind,
            TransportErrorKind::HttpStatus(404) | TransportErrorKind::ConnectionFailed
        ),
        OnvifCoreError::Onvif(fault) => RELOCATION_SUBCODES.iter().any(|name| fault.has_subcode(name)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::credentials::Credential;
    use crate::registry::Registry;

    const TER: &str = "http://www.onvif.org/ver10/error";

    fn fault(subcodes: &[&str]) -> SoapFault {
        SoapFault::builder()
            .code(FaultCode::Sender)
            .subcodes(
                subcodes
                    .iter()
                    .map(|local| QualifiedName {
                        lexical: format!("ter:{local}"),
                        namespace: Some(TER.to_owned()),
                        local_name: (*local).to_owned(),
                    })
                    .collect(),
            )
            .reason("failed")
            .build()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("Content-Type".into(), "application/soap+xml; charset=utf-8".into())],
            body: body.to_owned(),
        }
    }

    fn fault_envelope(subcode: &str) -> String {
        format!(
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:ter="{TER}"><SOAP-ENV:Body><SOAP-ENV:Fault><SOAP-ENV:Code><SOAP-ENV:Value>SOAP-ENV:Receiver</SOAP-ENV:Value><SOAP-ENV:Subcode><SOAP-ENV:Value>{subcode}</SOAP-ENV:Value></SOAP-ENV:Subcode></SOAP-ENV:Code><SOAP-ENV:Reason><SOAP-ENV:Text xml:lang="en">Optional Action Not Implemented</SOAP-ENV:Text></SOAP-ENV:Reason></SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"#
        )
    }

    #[test]
    fn deepest_known_subcode_wins() {
        let error = map_fault(fault(&["InvalidArgVal", "NoProfile"]));
        assert_eq!(error.kind, OnvifErrorKind::InvalidArgument);
        assert_eq!(error.subcode_name(), Some("InvalidArgVal"));

        let error = map_fault(fault(&["InvalidArgVal", "InvalidPosition"]));
        assert_eq!(error.kind, OnvifErrorKind::OutOfRange);

        let error = map_fault(fault(&["OperationProhibited", "NoSuchThing"]));
        assert_eq!(error.kind, OnvifErrorKind::Generic);
        assert_eq!(error.subcode.unwrap().lexical, "ter:NoSuchThing");

        let error = map_fault(fault(&["NotAuthorized"]));
        assert_eq!(error.kind, OnvifErrorKind::AuthError);
    }

    #[test]
    fn soap11_security_faultcode_is_auth_error() {
        let fault = SoapFault::builder()
            .code(FaultCode::Other("wsse:FailedAuthentication".into()))
            .reason("bad digest")
            .build();
        let error = map_fault(fault);
        assert_eq!(error.kind, OnvifErrorKind::AuthError);
        assert_eq!(error.to_string(), "AuthError (wsse:FailedAuthentication): bad digest");
    }

    #[test]
    fn action_not_supported_fault_is_mapped() {
        let registry = Registry::builtin().unwrap();
        let op = registry.lookup("device", "GetServices").unwrap();

        let err = accept(&op, &response(500, &fault_envelope("ter:ActionNotSupported"))).unwrap_err();
        assert!(err.is_onvif(OnvifErrorKind::ActionNotSupported), "{err}");

        let OnvifCoreError::Onvif(fault) = err else { unreachable!() };
        assert_eq!(fault.code, FaultCode::Receiver);
        let subcode = fault.subcode.unwrap();
        assert_eq!(subcode.lexical, "ter:ActionNotSupported");
        assert_eq!(subcode.namespace.as_deref(), Some(TER));
        assert_eq!(fault.reason, "Optional Action Not Implemented");
    }

    #[test]
    fn http_statuses_without_soap_body() {
        let registry = Registry::builtin().unwrap();
        let op = registry.lookup("device", "GetHostname").unwrap();

        let unauthorized = HttpResponse {
            status: 401,
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(accept(&op, &unauthorized).unwrap_err().is_onvif(OnvifErrorKind::AuthError));

        let not_found = HttpResponse {
            status: 404,
            headers: vec![("Content-Type".into(), "text/html".into())],
            body: "<html>not found</html>".into(),
        };
        let err = accept(&op, &not_found).unwrap_err();
        assert_eq!(err.transport_kind(), Some(&TransportErrorKind::HttpStatus(404)));
        assert!(is_relocation(&err));

        let garbage = response(200, "<s:Envelope");
        assert!(matches!(
            accept(&op, &garbage),
            Err(OnvifCoreError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn relocation_subcodes() {
        let error: OnvifCoreError = map_fault(fault(&["EndpointUnavailable"])).into();
        assert!(is_relocation(&error));

        let error: OnvifCoreError = map_fault(fault(&["ActionNotSupported"])).into();
        assert!(!is_relocation(&error));
        assert!(!is_relocation(&OnvifCoreError::Cancelled));
    }

    #[test]
    fn nested_relocation_subcode_is_seen_behind_a_classified_one() {
        let registry = Registry::builtin().unwrap();
        let op = registry.lookup("media", "GetProfiles").unwrap();
        let body = fault_envelope("ter:ActionNotSupported").replace(
            "</SOAP-ENV:Value></SOAP-ENV:Subcode>",
            "</SOAP-ENV:Value><SOAP-ENV:Subcode><SOAP-ENV:Value>ter:NoSuchService</SOAP-ENV:Value></SOAP-ENV:Subcode></SOAP-ENV:Subcode>",
        );

        let err = accept(&op, &response(500, &body)).unwrap_err();
        assert!(err.is_onvif(OnvifErrorKind::ActionNotSupported), "{err}");
        assert!(is_relocation(&err));

        let OnvifCoreError::Onvif(fault) = err else { unreachable!() };
        assert_eq!(fault.subcode_name(), Some("ActionNotSupported"));
        let chain: Vec<_> = fault.subcodes.iter().map(|s| s.lexical.as_str()).collect();
        assert_eq!(chain, ["ter:ActionNotSupported", "ter:NoSuchService"]);
    }

    #[test]
    fn prepare_builds_an_authenticated_request() {
        let registry = Registry::builtin().unwrap();
        let op = registry.lookup("ptz", "Stop").unwrap();
        let authenticator = Authenticator::new(Credential::new("admin", "secret"));

        let request = prepare(
            &op,
            &Structure::new().with("profileToken", "Profile_1"),
            "http://cam/onvif/ptz_service",
            &authenticator,
            SoapVersion::Soap12,
            Duration::from_secs(3),
        )
        .unwrap();

        assert_eq!(request.url, "http://cam/onvif/ptz_service");
        assert_eq!(request.timeout, Duration::from_secs(3));
        assert_eq!(
            request.header("SOAPAction"),
            Some(r#""http://www.onvif.org/ver20/ptz/wsdl/Stop""#)
        );
        assert!(request.body.contains("<wsse:UsernameToken>"));
        assert!(request.body.contains("<tptz:Stop><tptz:ProfileToken>Profile_1</tptz:ProfileToken></tptz:Stop>"));
    }
}
