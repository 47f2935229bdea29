use std::borrow::Cow;
use std::fmt;

/// A namespace URI. Aliases are assigned per document through an [`AliasMap`](super::AliasMap).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace<'a> {
    pub url: Cow<'a, str>,
}

impl<'a> Namespace<'a> {
    pub fn new(url: impl Into<Cow<'a, str>>) -> Self {
        Namespace { url: url.into() }
    }
}

impl fmt::Display for Namespace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl<'a> From<&'a str> for Namespace<'a> {
    fn from(url: &'a str) -> Self {
        Namespace::new(url)
    }
}

impl From<String> for Namespace<'_> {
    fn from(url: String) -> Self {
        Namespace::new(url)
    }
}
