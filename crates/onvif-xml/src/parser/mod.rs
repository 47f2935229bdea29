pub use roxmltree::*;

pub fn parse(xml: &str) -> Result<Document<'_>, roxmltree::Error> {
    roxmltree::Document::parse(xml).inspect_err(|error| {
        tracing::debug!(%error, length = xml.len(), "rejected XML document");
    })
}

/// Element children of `node`, skipping text, comments and processing instructions.
pub fn child_elements<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// First element child with the given local name, namespace ignored.
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    child_elements(node).find(|child| child.tag_name().name() == local_name)
}

/// Like [`find_child`] but also requires the namespace to match.
pub fn find_child_ns<'a, 'input>(
    node: Node<'a, 'input>,
    namespace: &str,
    local_name: &str,
) -> Option<Node<'a, 'input>> {
    child_elements(node).find(|child| {
        child.tag_name().name() == local_name && child.tag_name().namespace() == Some(namespace)
    })
}

/// Attribute value looked up by local name, whatever its namespace.
pub fn attribute_local<'a>(node: Node<'a, '_>, local_name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == local_name)
        .map(|attr| attr.value())
}

/// Trimmed text of an element, `""` when the element is empty.
pub fn text_of<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().map_or("", str::trim)
}

/// The source text between the start and end tags of `node`.
///
/// Namespace prefixes used inside the fragment are returned as written; declarations
/// made on ancestors are not copied in.
pub fn inner_xml<'input>(node: Node<'_, 'input>) -> &'input str {
    let input = node.document().input_text();
    match (node.first_child(), node.last_child()) {
        (Some(first), Some(last)) => &input[first.range().start..last.range().end],
        _ => "",
    }
}

/// A qualified name read from element content, such as a SOAP fault subcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// The value exactly as it appeared in the document, e.g. `ter:ActionNotSupported`.
    pub lexical: String,
    /// The namespace bound to the prefix at that point in the document.
    pub namespace: Option<String>,
    pub local_name: String,
}

impl QualifiedName {
    /// Resolves `lexical` against the namespace declarations in scope at `node`.
    pub fn resolve(node: Node<'_, '_>, lexical: &str) -> Self {
        let lexical = lexical.trim();
        let (prefix, local_name) = match lexical.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, lexical),
        };

        let namespace = node.lookup_namespace_uri(prefix).map(str::to_owned);

        QualifiedName {
            lexical: lexical.to_owned(),
            namespace,
            local_name: local_name.to_owned(),
        }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lexical)
    }
}
