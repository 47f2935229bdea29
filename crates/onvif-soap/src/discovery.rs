//! WS-Discovery message helpers. Sending the probe (UDP multicast to
//! `239.255.255.250:3702`) is left to the caller.

use onvif_xml::builder::Element;
use onvif_xml::parser;
pub use uuid::Uuid;

use crate::{SoapEnvelope, SoapError, SoapVersion, ns};

pub const MULTICAST_ADDRESS: &str = "239.255.255.250:3702";
pub const DISCOVERY_TO: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
pub const PROBE_ACTION: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";
pub const NETWORK_VIDEO_TRANSMITTER: &str = "NetworkVideoTransmitter";

/// A `Probe` asking for `dn:NetworkVideoTransmitter` devices.
pub fn probe_message(message_id: Uuid) -> Result<String, SoapError> {
    let action = Element::new("Action")
        .set_namespace(ns::WS_ADDRESSING_2004)
        .set_text(PROBE_ACTION);
    let id = Element::new("MessageID")
        .set_namespace(ns::WS_ADDRESSING_2004)
        .set_text(format!("urn:uuid:{message_id}"));
    let to = Element::new("To")
        .set_namespace(ns::WS_ADDRESSING_2004)
        .set_text(DISCOVERY_TO);

    let types = Element::new("Types")
        .set_namespace(ns::WS_DISCOVERY_2005)
        .set_text(format!("dn:{NETWORK_VIDEO_TRANSMITTER}"));
    let probe = Element::new("Probe")
        .set_namespace(ns::WS_DISCOVERY_2005)
        .add_child(types);

    SoapEnvelope::builder()
        .version(SoapVersion::Soap12)
        .namespaces(vec![
            ("a".into(), ns::WS_ADDRESSING_2004.into()),
            ("d".into(), ns::WS_DISCOVERY_2005.into()),
            ("dn".into(), ns::ONVIF_NETWORK.into()),
        ])
        .headers(vec![action, id, to])
        .body(probe)
        .build()
        .to_xml_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeMatch {
    /// `wsa:EndpointReference/Address`, usually `urn:uuid:…`.
    pub endpoint_reference: String,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
    /// Device service addresses; the first reachable one is the device XAddr.
    pub xaddrs: Vec<String>,
    pub metadata_version: Option<u32>,
}

impl ProbeMatch {
    /// Value of an `onvif://www.onvif.org/<category>/<value>` scope, e.g. `name` or `hardware`.
    pub fn scope_value(&self, category: &str) -> Option<&str> {
        let prefix = format!("onvif://www.onvif.org/{category}/");
        self.scopes
            .iter()
            .find_map(|scope| scope.strip_prefix(prefix.as_str()))
    }
}

/// Extracts every `ProbeMatch` from a `ProbeMatches` reply.
pub fn parse_probe_matches(xml: &str) -> Result<Vec<ProbeMatch>, SoapError> {
    let document = parser::parse(xml)?;
    let (_, content) = crate::parse_body(&document)?;

    let crate::BodyContent::Payload(payload) = content else {
        return Err(SoapError::Invalid("ProbeMatches body is empty or a fault".to_owned()));
    };

    if payload.tag_name().name() != "ProbeMatches" {
        return Err(SoapError::Invalid(format!(
            "expected ProbeMatches, found {}",
            payload.tag_name().name()
        )));
    }

    let matches = parser::child_elements(payload)
        .filter(|n| n.tag_name().name() == "ProbeMatch")
        .map(|node| ProbeMatch {
            endpoint_reference: parser::find_child(node, "EndpointReference")
                .and_then(|epr| parser::find_child(epr, "Address"))
                .map(|a| parser::text_of(a).to_owned())
                .unwrap_or_default(),
            types: whitespace_list(node, "Types"),
            scopes: whitespace_list(node, "Scopes"),
            xaddrs: whitespace_list(node, "XAddrs"),
            metadata_version: parser::find_child(node, "MetadataVersion")
                .and_then(|n| parser::text_of(n).parse().ok()),
        })
        .collect();

    Ok(matches)
}

fn whitespace_list(node: parser::Node<'_, '_>, name: &str) -> Vec<String> {
    parser::find_child(node, name)
        .map(|n| parser::text_of(n).split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}
