use onvif_soap::{
    BodyContent, FaultCode, SoapVersion, discovery, ns, parse_body,
};
use onvif_xml::parser;

fn fault_of(xml: &str) -> (SoapVersion, onvif_soap::SoapFault) {
    let doc = parser::parse(xml).unwrap();
    let (version, content) = parse_body(&doc).unwrap();
    match content {
        BodyContent::Fault(fault) => (version, fault),
        other => panic!("expected a fault, got {other:?}"),
    }
}

#[test]
fn action_not_supported_fault() {
    let (version, fault) = fault_of(include_str!("resources/action_not_supported.xml"));

    assert_eq!(version, SoapVersion::Soap12);
    assert_eq!(fault.code, FaultCode::Receiver);

    let subcode = fault.deepest_subcode().unwrap();
    assert_eq!(subcode.lexical, "ter:ActionNotSupported");
    assert_eq!(subcode.namespace.as_deref(), Some(ns::ONVIF_ERROR));
    assert_eq!(fault.reason, "Optional Action Not Implemented");
}

#[test]
fn not_authorized_fault_keeps_detail() {
    let (_, fault) = fault_of(include_str!("resources/not_authorized.xml"));

    assert_eq!(fault.code, FaultCode::Sender);
    assert_eq!(fault.deepest_subcode().unwrap().local_name, "NotAuthorized");
    let detail = fault.detail.unwrap();
    assert!(detail.contains("requires authorization"), "{detail}");
}

#[test]
fn soap11_fault_reads_subcode_from_detail() {
    let (version, fault) = fault_of(include_str!("resources/soap11_fault.xml"));

    assert_eq!(version, SoapVersion::Soap11);
    assert_eq!(fault.code, FaultCode::Receiver);
    assert_eq!(fault.reason, "Internal error while reading profile");
    assert_eq!(fault.deepest_subcode().unwrap().local_name, "InvalidArgVal");
}

#[test]
fn probe_matches_are_extracted() {
    let matches = discovery::parse_probe_matches(include_str!("resources/probe_matches.xml")).unwrap();

    assert_eq!(matches.len(), 1);
    let device = &matches[0];
    assert_eq!(
        device.endpoint_reference,
        "urn:uuid:2419d68a-2dd2-21b2-a205-ec71db14c260"
    );
    assert_eq!(device.types, ["dn:NetworkVideoTransmitter", "tds:Device"]);
    assert_eq!(
        device.xaddrs,
        [
            "http://192.168.1.64/onvif/device_service",
            "http://[fe80::1]/onvif/device_service"
        ]
    );
    assert_eq!(device.scope_value("name"), Some("IPC-Lobby"));
    assert_eq!(device.scope_value("hardware"), Some("DS-2CD2143"));
    assert_eq!(device.scope_value("location"), None);
    assert_eq!(device.metadata_version, Some(10));
}

#[test]
fn probe_matches_rejects_other_payloads() {
    let xml = include_str!("resources/action_not_supported.xml");
    assert!(discovery::parse_probe_matches(xml).is_err());
}

#[test]
#[tracing_test::traced_test]
fn soap11_fault_without_code_is_tolerated() {
    let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault><faultstring>Busy</faultstring></s:Fault></s:Body></s:Envelope>"#;
    let (version, fault) = fault_of(xml);

    assert_eq!(version, SoapVersion::Soap11);
    assert_eq!(fault.code, FaultCode::Other(String::new()));
    assert_eq!(fault.reason, "Busy");
    assert!(fault.deepest_subcode().is_none());
    assert!(logs_contain("SOAP 1.1 fault without faultcode"));
}
