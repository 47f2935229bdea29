use std::borrow::Cow;

use quick_xml::escape::escape;

use crate::builder::{AliasMap, Namespace, NamespaceWrite, XmlBuilderError};

#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    name: Cow<'a, str>,
    /// Unescaped.
    value: Cow<'a, str>,
    namespace: Option<Namespace<'a>>,
}

impl<'a> Attribute<'a> {
    /// An attribute without a namespace prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use onvif_xml::builder::{Attribute, Element};
    /// let vector = Element::new("PanTilt")
    ///     .add_attribute(Attribute::new("x", "0.5"))
    ///     .add_attribute(Attribute::new("y", "-0.25"));
    /// assert_eq!(vector.to_xml_string().unwrap(), r#"<PanTilt x="0.5" y="-0.25"/>"#);
    /// ```
    pub fn new(name: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        Attribute {
            name: name.into(),
            value: value.into(),
            namespace: None,
        }
    }

    /// Prefixes the attribute with the alias `namespace` is declared under.
    pub fn set_namespace(mut self, namespace: impl Into<Namespace<'a>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl<'a> NamespaceWrite<'a> for Attribute<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        alias_map: Option<&AliasMap<'a>>,
    ) -> Result<(), XmlBuilderError> {
        let name = match (&self.namespace, alias_map) {
            (None, _) => Cow::Borrowed(self.name.as_ref()),
            (Some(ns), None) => {
                return Err(XmlBuilderError::MissingAliasMapForAttribute {
                    attr: self.name.to_string(),
                    ns: ns.url.to_string(),
                });
            }
            (Some(ns), Some(map)) => match map.get(ns) {
                Some(Some(alias)) => Cow::Owned(format!("{alias}:{}", self.name)),
                // Unprefixed attributes never pick up the default namespace.
                Some(None) => {
                    return Err(XmlBuilderError::NamespaceHasNoAlias {
                        tag: self.name.to_string(),
                        ns: ns.url.to_string(),
                    });
                }
                None => {
                    return Err(XmlBuilderError::NamespaceNotDeclared {
                        tag: self.name.to_string(),
                        ns: ns.url.to_string(),
                    });
                }
            },
        };

        w.write_fmt(format_args!(
            " {}=\"{}\"",
            name,
            attribute_value(&self.value)
        ))?;
        Ok(())
    }
}

/// Escapes markup and quotes, and writes tabs and line breaks as character references
/// so attribute-value normalisation on the reading side does not turn them into spaces.
fn attribute_value(value: &str) -> Cow<'_, str> {
    let escaped = escape(value);
    if !escaped.contains(['\t', '\n', '\r']) {
        return escaped;
    }
    Cow::Owned(
        escaped
            .replace('\t', "&#9;")
            .replace('\n', "&#10;")
            .replace('\r', "&#13;"),
    )
}
