use onvif_xml::parser::{self, Node, QualifiedName};
use tracing::warn;

use crate::{SoapError, SoapVersion};

/// Top-level SOAP fault code, normalised across SOAP 1.1 and 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultCode {
    VersionMismatch,
    MustUnderstand,
    DataEncodingUnknown,
    /// `env:Sender`, or `Client` in SOAP 1.1.
    Sender,
    /// `env:Receiver`, or `Server` in SOAP 1.1.
    Receiver,
    Other(String),
}

impl FaultCode {
    fn from_local_name(local_name: &str) -> Self {
        match local_name {
            "VersionMismatch" => FaultCode::VersionMismatch,
            "MustUnderstand" => FaultCode::MustUnderstand,
            "DataEncodingUnknown" => FaultCode::DataEncodingUnknown,
            "Sender" | "Client" => FaultCode::Sender,
            "Receiver" | "Server" => FaultCode::Receiver,
            other => FaultCode::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCode::VersionMismatch => f.write_str("VersionMismatch"),
            FaultCode::MustUnderstand => f.write_str("MustUnderstand"),
            FaultCode::DataEncodingUnknown => f.write_str("DataEncodingUnknown"),
            FaultCode::Sender => f.write_str("Sender"),
            FaultCode::Receiver => f.write_str("Receiver"),
            FaultCode::Other(other) => f.write_str(other),
        }
    }
}

/// A decoded `Fault` element.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct SoapFault {
    pub code: FaultCode,
    /// Subcodes outermost first, e.g. `[ter:InvalidArgVal, ter:NoProfile]`.
    #[builder(default)]
    pub subcodes: Vec<QualifiedName>,
    #[builder(default, setter(into))]
    pub reason: String,
    /// Raw inner XML of `Detail` (`detail` in SOAP 1.1).
    #[builder(default, setter(into, strip_option))]
    pub detail: Option<String>,
}

impl SoapFault {
    /// The most specific subcode, which is the one ONVIF devices use to say what went wrong.
    pub fn deepest_subcode(&self) -> Option<&QualifiedName> {
        self.subcodes.last()
    }

    pub fn parse(node: Node<'_, '_>, version: SoapVersion) -> Result<Self, SoapError> {
        match version {
            SoapVersion::Soap12 => parse_soap12(node),
            SoapVersion::Soap11 => Ok(parse_soap11(node)),
        }
    }
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        for subcode in &self.subcodes {
            write!(f, "/{subcode}")?;
        }
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

fn parse_soap12(node: Node<'_, '_>) -> Result<SoapFault, SoapError> {
    let code_node = parser::find_child(node, "Code")
        .ok_or_else(|| SoapError::Invalid("SOAP 1.2 fault without Code".to_owned()))?;
    let value = parser::find_child(code_node, "Value")
        .ok_or_else(|| SoapError::Invalid("fault Code without Value".to_owned()))?;
    let code = QualifiedName::resolve(value, parser::text_of(value));

    let mut subcodes = Vec::new();
    let mut current = code_node;
    while let Some(subcode) = parser::find_child(current, "Subcode") {
        if let Some(value) = parser::find_child(subcode, "Value") {
            subcodes.push(QualifiedName::resolve(value, parser::text_of(value)));
        }
        current = subcode;
    }

    let reason = parser::find_child(node, "Reason")
        .map(reason_text)
        .unwrap_or_default();

    let detail = parser::find_child(node, "Detail").map(|d| parser::inner_xml(d).trim().to_owned());

    Ok(SoapFault {
        code: FaultCode::from_local_name(&code.local_name),
        subcodes,
        reason,
        detail,
    })
}

/// Picks the English `Text`, else the first one.
fn reason_text(reason: Node<'_, '_>) -> String {
    let texts: Vec<_> = parser::child_elements(reason)
        .filter(|n| n.tag_name().name() == "Text")
        .collect();

    let english = texts.iter().find(|text| {
        parser::attribute_local(**text, "lang").is_some_and(|lang| lang.starts_with("en"))
    });

    english
        .or_else(|| texts.first())
        .map(|text| parser::text_of(*text).to_owned())
        .unwrap_or_default()
}

/// SOAP 1.1 faults keep everything in unqualified children.
fn parse_soap11(node: Node<'_, '_>) -> SoapFault {
    let code = parser::find_child(node, "faultcode").map_or_else(
        || {
            warn!("SOAP 1.1 fault without faultcode");
            FaultCode::Other(String::new())
        },
        |value| {
            let qname = QualifiedName::resolve(value, parser::text_of(value));
            // `Client.Authentication` style dotted codes keep only the leading class.
            let class = qname.local_name.split('.').next().unwrap_or_default();
            FaultCode::from_local_name(class)
        },
    );

    let reason = parser::find_child(node, "faultstring")
        .map(|n| parser::text_of(n).to_owned())
        .unwrap_or_default();

    let detail = parser::find_child(node, "detail").map(|d| parser::inner_xml(d).trim().to_owned());

    // ONVIF devices speaking 1.1 still put the ter: subcode in the detail, if anywhere.
    let subcodes = parser::find_child(node, "detail")
        .into_iter()
        .flat_map(|d| d.descendants())
        .filter(|n| n.is_element() && n.tag_name().name() == "Value")
        .map(|n| QualifiedName::resolve(n, parser::text_of(n)))
        .collect();

    SoapFault {
        code,
        subcodes,
        reason,
        detail,
    }
}
