use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};

use crate::builder::{AliasMap, Attribute, Namespace, NamespaceWrite, XmlBuilderError};

#[derive(Debug, Clone)]
pub enum Content<'a> {
    /// Character data, escaped on write.
    Text(Cow<'a, str>),
    /// Child elements.
    Elements(Vec<Element<'a>>),
    /// Pre-serialized XML written verbatim.
    Raw(Cow<'a, str>),

    None,
}

/// Represents an XML element.
#[derive(Debug, Clone)]
pub struct Element<'a> {
    /// The local name of the element.
    name: Cow<'a, str>,
    /// The namespace the element belongs to.
    namespace: Option<Namespace<'a>>,
    /// Namespace declarations (`xmlns:alias="url"`) carried by this element.
    declarations: Vec<(Namespace<'a>, Option<Cow<'a, str>>)>,
    /// The attributes of the element.
    attributes: Vec<Attribute<'a>>,
    content: Content<'a>,
}

impl<'a> Element<'a> {
    /// Creates a new instance of `Element` with the given name.
    ///
    /// # Example
    ///
    /// ```
    /// use onvif_xml::builder::Element;
    /// let element = Element::new("ProfileToken").set_text("Profile_1");
    /// assert_eq!(element.to_xml_string().unwrap(), "<ProfileToken>Profile_1</ProfileToken>");
    /// ```
    pub fn new(name: impl Into<Cow<'a, str>>) -> Self {
        Element {
            name: name.into(),
            namespace: None,
            declarations: Vec::new(),
            attributes: Vec::new(),
            content: Content::None,
        }
    }

    pub fn set_namespace(mut self, namespace: impl Into<Namespace<'a>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Declares `url` on this element, bound to `alias` or as the default namespace when `None`.
    pub fn add_namespace_declaration(
        mut self,
        url: impl Into<Cow<'a, str>>,
        alias: Option<impl Into<Cow<'a, str>>>,
    ) -> Self {
        self.declarations
            .push((Namespace::new(url), alias.map(Into::into)));
        self
    }

    pub fn add_attribute(mut self, attribute: Attribute<'a>) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds a child element. Any text or raw content is replaced.
    pub fn add_child(mut self, child: Element<'a>) -> Self {
        match self.content {
            Content::None | Content::Text(_) | Content::Raw(_) => {
                self.content = Content::Elements(vec![child]);
            }
            Content::Elements(ref mut children) => {
                children.push(child);
            }
        }
        self
    }

    pub fn add_children(mut self, children: impl IntoIterator<Item = Element<'a>>) -> Self {
        for child in children {
            self = self.add_child(child);
        }
        self
    }

    pub fn set_text(mut self, text: impl Into<Cow<'a, str>>) -> Self {
        self.content = Content::Text(text.into());
        self
    }

    /// Sets pre-serialized XML as the element content. The fragment is not validated.
    pub fn set_raw(mut self, xml: impl Into<Cow<'a, str>>) -> Self {
        self.content = Content::Raw(xml.into());
        self
    }

    pub fn to_xml_string(&self) -> Result<String, XmlBuilderError> {
        let mut buf = Vec::new();
        self.ns_write(&mut buf, None)?;
        Ok(String::from_utf8(buf)?)
    }

    fn qualified_name(&self, aliases: &AliasMap<'a>) -> Result<Cow<'_, str>, XmlBuilderError> {
        let Some(ns) = &self.namespace else {
            return Ok(Cow::Borrowed(self.name.as_ref()));
        };

        match aliases.get(ns) {
            Some(Some(alias)) => Ok(Cow::Owned(format!("{alias}:{}", self.name))),
            Some(None) => Ok(Cow::Borrowed(self.name.as_ref())),
            None => Err(XmlBuilderError::NamespaceNotDeclared {
                tag: self.name.to_string(),
                ns: ns.url.to_string(),
            }),
        }
    }
}

impl<'a> NamespaceWrite<'a> for Element<'a> {
    fn ns_write<W: std::io::Write>(
        &self,
        w: &mut W,
        aliases: Option<&AliasMap<'a>>,
    ) -> Result<(), XmlBuilderError> {
        // Scope inherited from the parent, extended by this element's own declarations.
        let scope: Cow<'_, AliasMap<'a>> = match (aliases, self.declarations.is_empty()) {
            (Some(parent), true) => Cow::Borrowed(parent),
            (parent, _) => {
                let mut map = parent.cloned().unwrap_or_default();
                for (ns, alias) in &self.declarations {
                    map.insert(ns.clone(), alias.clone());
                }
                Cow::Owned(map)
            }
        };

        let name = self.qualified_name(&scope)?;
        w.write_fmt(format_args!("<{name}"))?;

        for (ns, alias) in &self.declarations {
            match alias {
                Some(alias) => w.write_fmt(format_args!(" xmlns:{alias}=\"{}\"", escape(&*ns.url)))?,
                None => w.write_fmt(format_args!(" xmlns=\"{}\"", escape(&*ns.url)))?,
            }
        }

        for attribute in &self.attributes {
            attribute.ns_write(w, Some(&scope))?;
        }

        match &self.content {
            Content::None => w.write_all(b"/>")?,
            Content::Text(value) => {
                w.write_fmt(format_args!(">{}</{name}>", partial_escape(&**value)))?;
            }
            Content::Raw(xml) => {
                w.write_fmt(format_args!(">{xml}</{name}>"))?;
            }
            Content::Elements(children) => {
                w.write_all(b">")?;
                for child in children {
                    child.ns_write(w, Some(&scope))?;
                }
                w.write_fmt(format_args!("</{name}>"))?;
            }
        }

        Ok(())
    }
}
