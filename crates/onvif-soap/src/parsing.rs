use onvif_xml::parser::{self, Document, Node};
use tracing::trace;

use crate::{SoapError, SoapFault, SoapVersion};

/// What a response body carries.
#[derive(Debug)]
pub enum BodyContent<'a, 'input> {
    Fault(SoapFault),
    /// The first element child of `Body`.
    Payload(Node<'a, 'input>),
    /// `<Body/>`, as returned by one-way style operations.
    Empty,
}

/// Locates the body of a parsed envelope and classifies it.
///
/// The envelope version is taken from the document itself, so a SOAP 1.1 reply to a
/// SOAP 1.2 request is still understood.
pub fn parse_body<'a, 'input>(
    document: &'a Document<'input>,
) -> Result<(SoapVersion, BodyContent<'a, 'input>), SoapError> {
    let root = document.root_element();
    let namespace = root.tag_name().namespace().unwrap_or_default();

    let version = match SoapVersion::from_envelope_namespace(namespace) {
        Some(version) if root.tag_name().name() == "Envelope" => version,
        _ => {
            return Err(SoapError::NotAnEnvelope {
                namespace: namespace.to_owned(),
                name: root.tag_name().name().to_owned(),
            });
        }
    };

    let body = parser::find_child_ns(root, version.envelope_namespace(), "Body")
        .ok_or(SoapError::MissingBody)?;

    let Some(first) = parser::child_elements(body).next() else {
        trace!("empty SOAP body");
        return Ok((version, BodyContent::Empty));
    };

    let tag = first.tag_name();
    if tag.name() == "Fault" && tag.namespace() == Some(version.envelope_namespace()) {
        return Ok((version, BodyContent::Fault(SoapFault::parse(first, version)?)));
    }

    Ok((version, BodyContent::Payload(first)))
}
