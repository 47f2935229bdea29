use std::borrow::Cow;

use onvif_xml::builder::Element;

use crate::{SoapError, SoapVersion};

pub const ENVELOPE_PREFIX: &str = "s";

/// An outgoing SOAP envelope.
///
/// `namespaces` are declared on the `Envelope` element so every header block and the body
/// payload can refer to them; header blocks may still carry their own declarations.
#[derive(Debug, Clone, typed_builder::TypedBuilder)]
pub struct SoapEnvelope<'a> {
    #[builder(default)]
    pub version: SoapVersion,
    /// `(prefix, namespace URI)` pairs.
    #[builder(default)]
    pub namespaces: Vec<(Cow<'a, str>, Cow<'a, str>)>,
    #[builder(default)]
    pub headers: Vec<Element<'a>>,
    pub body: Element<'a>,
}

impl<'a> SoapEnvelope<'a> {
    pub fn into_element(self) -> Element<'a> {
        let env_ns = self.version.envelope_namespace();

        let mut envelope = Element::new("Envelope")
            .set_namespace(env_ns)
            .add_namespace_declaration(env_ns, Some(ENVELOPE_PREFIX));

        for (prefix, url) in self.namespaces {
            envelope = envelope.add_namespace_declaration(url, Some(prefix));
        }

        if !self.headers.is_empty() {
            let header = Element::new("Header")
                .set_namespace(env_ns)
                .add_children(self.headers);
            envelope = envelope.add_child(header);
        }

        let body = Element::new("Body")
            .set_namespace(env_ns)
            .add_child(self.body);

        envelope.add_child(body)
    }

    pub fn to_xml_string(self) -> Result<String, SoapError> {
        Ok(self.into_element().to_xml_string()?)
    }
}
