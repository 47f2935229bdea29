//! Namespace-aware XML writer used to produce SOAP envelopes.
//!
//! Elements carry their namespace URI; prefixes are resolved at write time from the
//! `xmlns` declarations in scope, so callers never format `alias:name` by hand.
mod attribute;
mod element;
mod namespace;

use std::{borrow::Cow, collections::HashMap};

pub use self::attribute::*;
pub use self::element::*;
pub use self::namespace::*;

pub type AliasMap<'a> = HashMap<Namespace<'a>, Option<Cow<'a, str>>>;

#[derive(Debug, thiserror::Error)]
pub enum XmlBuilderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    #[error("Missing alias map for attribute '{attr}' in namespace '{ns}'")]
    MissingAliasMapForAttribute { attr: String, ns: String },
    #[error("Namespace '{ns}' not declared for tag '{tag}'")]
    NamespaceNotDeclared { tag: String, ns: String },
    #[error("Namespace '{ns}' has no alias for tag '{tag}'")]
    NamespaceHasNoAlias { tag: String, ns: String },
}

pub trait NamespaceWrite<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        aliases: Option<&AliasMap<'a>>,
    ) -> Result<(), XmlBuilderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TT: &str = "http://www.onvif.org/ver10/schema";
    const TPTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";

    #[test]
    fn test_simple_xml() {
        assert_eq!(Element::new("root").to_xml_string().unwrap(), "<root/>");
    }

    #[test]
    fn test_xml_with_attributes() {
        let element = Element::new("PanTilt")
            .add_attribute(Attribute::new("x", "0.5"))
            .add_attribute(Attribute::new("y", "0"));

        let xml_string = element.to_xml_string().unwrap();
        assert_eq!(xml_string, r#"<PanTilt x="0.5" y="0"/>"#);
    }

    #[test]
    fn test_xml_with_namespaces() {
        let element = Element::new("ContinuousMove")
            .set_namespace(TPTZ)
            .add_namespace_declaration(TPTZ, Some("tptz"));

        let xml_string = element.to_xml_string().unwrap();
        assert_eq!(
            xml_string,
            format!(r#"<tptz:ContinuousMove xmlns:tptz="{TPTZ}"/>"#)
        );
    }

    #[test]
    fn test_inherited_namespace_declarations() {
        let pan_tilt = Element::new("PanTilt")
            .set_namespace(TT)
            .add_attribute(Attribute::new("x", "0.5"));
        let velocity = Element::new("Velocity").set_namespace(TPTZ).add_child(pan_tilt);
        let root = Element::new("ContinuousMove")
            .set_namespace(TPTZ)
            .add_namespace_declaration(TPTZ, Some("tptz"))
            .add_namespace_declaration(TT, Some("tt"))
            .add_child(velocity);

        let xml_string = root.to_xml_string().unwrap();
        assert_eq!(
            xml_string,
            format!(
                r#"<tptz:ContinuousMove xmlns:tptz="{TPTZ}" xmlns:tt="{TT}"><tptz:Velocity><tt:PanTilt x="0.5"/></tptz:Velocity></tptz:ContinuousMove>"#
            )
        );
    }

    #[test]
    fn test_namespace_override_in_child() {
        let child = Element::new("child")
            .set_namespace("http://example.com/ns1")
            .add_namespace_declaration("http://example.com/ns1", Some("override"));

        let root = Element::new("root")
            .add_namespace_declaration("http://example.com/ns1", Some("ns1"))
            .add_child(child);

        let xml_string = root.to_xml_string().unwrap();
        assert_eq!(
            xml_string,
            r#"<root xmlns:ns1="http://example.com/ns1"><override:child xmlns:override="http://example.com/ns1"/></root>"#
        );
    }

    #[test]
    fn test_default_namespace() {
        let element = Element::new("GetDeviceInformation")
            .set_namespace("http://www.onvif.org/ver10/device/wsdl")
            .add_namespace_declaration("http://www.onvif.org/ver10/device/wsdl", None::<&str>);

        assert_eq!(
            element.to_xml_string().unwrap(),
            r#"<GetDeviceInformation xmlns="http://www.onvif.org/ver10/device/wsdl"/>"#
        );
    }

    #[test]
    fn test_undeclared_namespace_is_an_error() {
        let element = Element::new("Envelope").set_namespace("http://www.w3.org/2003/05/soap-envelope");
        let result = element.to_xml_string();
        assert!(matches!(
            result,
            Err(XmlBuilderError::NamespaceNotDeclared { .. })
        ));
    }

    #[test]
    fn test_attribute_with_namespace() {
        let attr = Attribute::new("mustUnderstand", "1").set_namespace("http://example.com/env");
        let element = Element::new("Security")
            .add_namespace_declaration("http://example.com/env", Some("s"))
            .add_attribute(attr);

        assert_eq!(
            element.to_xml_string().unwrap(),
            r#"<Security xmlns:s="http://example.com/env" s:mustUnderstand="1"/>"#
        );
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let element = Element::new("Name")
            .add_attribute(Attribute::new("note", r#"a "quoted" <value>"#))
            .set_text("Tom & Jerry <cam>");

        assert_eq!(
            element.to_xml_string().unwrap(),
            r#"<Name note="a &quot;quoted&quot; &lt;value&gt;">Tom &amp; Jerry &lt;cam&gt;</Name>"#
        );
    }

    #[test]
    fn test_attribute_whitespace_survives_a_reparse() {
        let element = Element::new("Preset").add_attribute(Attribute::new("label", "Gate\tNorth\r\nLot 'B'"));
        let xml = element.to_xml_string().unwrap();
        assert_eq!(xml, r#"<Preset label="Gate&#9;North&#13;&#10;Lot &apos;B&apos;"/>"#);

        let doc = crate::parser::parse(&xml).unwrap();
        assert_eq!(doc.root_element().attribute("label"), Some("Gate\tNorth\r\nLot 'B'"));
    }

    #[test]
    fn test_namespace_urls_are_escaped() {
        let element = Element::new("Probe")
            .set_namespace("urn:vendor?a=1&b=2")
            .add_namespace_declaration("urn:vendor?a=1&b=2", Some("v"));
        assert_eq!(
            element.to_xml_string().unwrap(),
            r#"<v:Probe xmlns:v="urn:vendor?a=1&amp;b=2"/>"#
        );
    }

    #[test]
    fn test_raw_content_is_written_verbatim() {
        let element = Element::new("Extension").set_raw("<vendor:Zoom level=\"3\"/>");
        assert_eq!(
            element.to_xml_string().unwrap(),
            r#"<Extension><vendor:Zoom level="3"/></Extension>"#
        );
    }

    #[test]
    fn test_adding_child_overwrites_text() {
        let element = Element::new("container")
            .set_text("Initial text")
            .add_child(Element::new("item"));

        assert_eq!(
            element.to_xml_string().unwrap(),
            "<container><item/></container>"
        );
    }

    #[test]
    fn test_unicode_content() {
        let element = Element::new("Name").set_text("Caméra 世界");
        assert_eq!(element.to_xml_string().unwrap(), "<Name>Caméra 世界</Name>");
    }
}
