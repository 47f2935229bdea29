use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// A dynamically typed operation argument or result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(XsDateTime),
    Duration(XsDuration),
    Binary(Vec<u8>),
    Struct(Structure),
    /// Occurrences of a repeated field, in document order.
    List(Vec<Value>),
    /// Content of an `xs:anyType` field, passed through untouched.
    Opaque(XmlFragment),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::DateTime(dt) => Some(dt.as_str()),
            Value::Duration(d) => Some(d.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Structure> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// A repeated field as a slice; a lone value is treated as a one-element list.
    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::DateTime(_) => "dateTime",
            Value::Duration(_) => "duration",
            Value::Binary(_) => "binary",
            Value::Struct(_) => "structure",
            Value::List(_) => "list",
            Value::Opaque(_) => "XML fragment",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<XsDateTime> for Value {
    fn from(value: XsDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<XsDuration> for Value {
    fn from(value: XsDuration) -> Self {
        Value::Duration(value)
    }
}

impl From<Structure> for Value {
    fn from(value: Structure) -> Self {
        Value::Struct(value)
    }
}

impl From<XmlFragment> for Value {
    fn from(value: XmlFragment) -> Self {
        Value::Opaque(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

/// Field values keyed by argument name (`profileToken`, `velocity`, …).
///
/// An absent key is the only representation of an absent optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure(BTreeMap<String, Value>);

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_struct(&self, key: &str) -> Option<&Structure> {
        self.get(key).and_then(Value::as_struct)
    }

    /// Occurrences of a repeated field, empty when absent.
    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key).map(Value::as_list).unwrap_or_default()
    }

    /// Follows a dotted key path, e.g. `systemDateAndTime.uTCDateTime`.
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut keys = path.split('.');
        let first = self.get(keys.next()?)?;
        keys.try_fold(first, |value, key| value.as_struct()?.get(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Structure {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Structure(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} lexical form {lexical:?}")]
pub struct LexicalError {
    pub kind: &'static str,
    pub lexical: String,
}

impl LexicalError {
    fn new(kind: &'static str, lexical: &str) -> Self {
        LexicalError {
            kind,
            lexical: lexical.to_owned(),
        }
    }
}

/// An `xs:dateTime` that keeps the exact text it was read from.
///
/// Devices echo back timestamps they chose themselves, so a value decoded from a response
/// encodes to the very same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XsDateTime {
    lexical: String,
}

impl XsDateTime {
    pub fn parse(lexical: &str) -> Result<Self, LexicalError> {
        let lexical = lexical.trim();
        let valid = DateTime::parse_from_rfc3339(lexical).is_ok()
            || NaiveDateTime::parse_from_str(lexical, "%Y-%m-%dT%H:%M:%S%.f").is_ok();

        if valid {
            Ok(XsDateTime {
                lexical: lexical.to_owned(),
            })
        } else {
            Err(LexicalError::new("xs:dateTime", lexical))
        }
    }

    pub fn from_utc(value: DateTime<Utc>) -> Self {
        XsDateTime {
            lexical: value.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.lexical
    }

    /// The instant in UTC. Values without a zone designator are taken as UTC.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.lexical)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&self.lexical, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
            .ok()
    }
}

impl std::fmt::Display for XsDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lexical)
    }
}

/// An `xs:duration` such as `PT5S` or `P1DT2H`, kept in its lexical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XsDuration {
    lexical: String,
}

impl XsDuration {
    pub fn parse(lexical: &str) -> Result<Self, LexicalError> {
        let lexical = lexical.trim();
        if parse_duration_parts(lexical).is_some() {
            Ok(XsDuration {
                lexical: lexical.to_owned(),
            })
        } else {
            Err(LexicalError::new("xs:duration", lexical))
        }
    }

    pub fn from_std(duration: std::time::Duration) -> Self {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();
        let lexical = if millis == 0 {
            format!("PT{secs}S")
        } else {
            format!("PT{secs}.{millis:03}S")
        };
        XsDuration { lexical }
    }

    pub fn as_str(&self) -> &str {
        &self.lexical
    }

    /// Converts to a `std` duration. Years and months have no fixed length, and negative
    /// durations have no `std` form, so both yield `None`.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        let parts = parse_duration_parts(&self.lexical)?;
        if parts.negative || parts.years != 0.0 || parts.months != 0.0 {
            return None;
        }
        let secs = parts.days * 86_400.0 + parts.hours * 3_600.0 + parts.minutes * 60.0 + parts.seconds;
        std::time::Duration::try_from_secs_f64(secs).ok()
    }
}

impl std::fmt::Display for XsDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lexical)
    }
}

#[derive(Debug, Default)]
struct DurationParts {
    negative: bool,
    years: f64,
    months: f64,
    days: f64,
    hours: f64,
    minutes: f64,
    seconds: f64,
}

fn parse_duration_parts(lexical: &str) -> Option<DurationParts> {
    let mut parts = DurationParts::default();
    let rest = match lexical.strip_prefix('-') {
        Some(rest) => {
            parts.negative = true;
            rest
        }
        None => lexical,
    };
    let rest = rest.strip_prefix('P')?;

    let (date, time) = match rest.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return None,
        None => (rest, None),
    };

    let mut any = false;
    let mut number = String::new();
    let mut order = 0;
    for c in date.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let (slot, rank) = match c {
            'Y' => (&mut parts.years, 1),
            'M' => (&mut parts.months, 2),
            'D' => (&mut parts.days, 3),
            _ => return None,
        };
        if number.is_empty() || rank <= order {
            return None;
        }
        *slot = number.parse().ok()?;
        number.clear();
        order = rank;
        any = true;
    }
    if !number.is_empty() {
        return None;
    }

    if let Some(time) = time {
        let mut order = 0;
        for c in time.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let (slot, rank) = match c {
                'H' => (&mut parts.hours, 1),
                'M' => (&mut parts.minutes, 2),
                'S' => (&mut parts.seconds, 3),
                _ => return None,
            };
            // Only seconds may carry a fraction.
            if number.is_empty() || rank <= order || (rank != 3 && number.contains('.')) {
                return None;
            }
            *slot = number.parse().ok()?;
            number.clear();
            order = rank;
            any = true;
        }
        if !number.is_empty() {
            return None;
        }
    }

    any.then_some(parts)
}

/// Pre-serialized XML content of an `xs:anyType` field.
///
/// Decoded fragments remember the namespace bindings that were in scope in the response,
/// since prefixes inside the fragment usually refer to declarations on the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlFragment {
    xml: String,
    namespaces: Vec<(Option<String>, String)>,
}

impl XmlFragment {
    pub fn new(xml: impl Into<String>) -> Self {
        XmlFragment {
            xml: xml.into(),
            namespaces: Vec::new(),
        }
    }

    pub(crate) fn with_namespaces(xml: impl Into<String>, namespaces: Vec<(Option<String>, String)>) -> Self {
        XmlFragment {
            xml: xml.into(),
            namespaces,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    /// `(prefix, URI)` bindings in scope where the fragment was read; `None` is the default namespace.
    pub fn namespaces(&self) -> &[(Option<String>, String)] {
        &self.namespaces
    }

    /// The fragment wrapped in a `<fragment>` root that re-declares the captured
    /// namespaces, so it can be parsed on its own.
    pub fn to_document(&self) -> String {
        let mut doc = String::from("<fragment");
        for (prefix, uri) in &self.namespaces {
            let uri = onvif_xml::escape::escape(uri.as_str());
            match prefix {
                Some(prefix) => doc.push_str(&format!(" xmlns:{prefix}=\"{uri}\"")),
                None => doc.push_str(&format!(" xmlns=\"{uri}\"")),
            }
        }
        doc.push('>');
        doc.push_str(&self.xml);
        doc.push_str("</fragment>");
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_time_keeps_lexical_form() {
        for lexical in [
            "2024-05-01T10:00:00Z",
            "2024-05-01T10:00:00.120Z",
            "2024-05-01T12:00:00+02:00",
            "2024-05-01T10:00:00",
        ] {
            let parsed = XsDateTime::parse(lexical).unwrap();
            assert_eq!(parsed.as_str(), lexical);
        }

        let offset = XsDateTime::parse("2024-05-01T12:00:00+02:00").unwrap();
        let utc = XsDateTime::parse("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(offset.to_utc(), utc.to_utc());

        assert!(XsDateTime::parse("yesterday").is_err());
        assert!(XsDateTime::parse("2024-13-01T10:00:00Z").is_err());
    }

    #[test]
    fn duration_forms() {
        assert_eq!(
            XsDuration::parse("PT5S").unwrap().to_std(),
            Some(std::time::Duration::from_secs(5))
        );
        assert_eq!(
            XsDuration::parse("P1DT2H30M0.5S").unwrap().to_std(),
            Some(std::time::Duration::from_millis(95_400_500))
        );
        assert_eq!(XsDuration::parse("P1Y").unwrap().to_std(), None);
        assert_eq!(XsDuration::parse("-PT1M").unwrap().to_std(), None);
        assert_eq!(XsDuration::parse("PT1M").unwrap().as_str(), "PT1M");

        for invalid in ["P", "PT", "5S", "P1H", "PT1.5M", "PT5S1", "P2D1Y"] {
            assert!(XsDuration::parse(invalid).is_err(), "{invalid}");
        }

        assert_eq!(
            XsDuration::from_std(std::time::Duration::from_millis(1500)).as_str(),
            "PT1.500S"
        );
        assert_eq!(XsDuration::from_std(std::time::Duration::from_secs(60)).as_str(), "PT60S");
    }

    #[test]
    fn structure_access() {
        let velocity = Structure::new().with(
            "panTilt",
            Structure::new().with("x", 0.5).with("y", 0.0),
        );
        let args = Structure::new()
            .with("profileToken", "Profile_1")
            .with("velocity", velocity)
            .with("tokens", vec!["a", "b"]);

        assert_eq!(args.get_str("profileToken"), Some("Profile_1"));
        assert_eq!(args.path("velocity.panTilt.x").and_then(Value::as_f64), Some(0.5));
        assert_eq!(args.path("velocity.zoom"), None);
        assert_eq!(args.get_list("tokens").len(), 2);
        assert_eq!(args.get_list("profileToken").len(), 1);
        assert!(args.get_list("missing").is_empty());
    }

    #[test]
    fn fragment_document_redeclares_namespaces() {
        let fragment = XmlFragment::with_namespaces(
            r#"<tt:Item Name="x"/>"#,
            vec![(Some("tt".to_owned()), "http://www.onvif.org/ver10/schema".to_owned())],
        );
        let doc = fragment.to_document();
        assert!(onvif_xml::parser::parse(&doc).is_ok());
        assert!(onvif_xml::parser::parse(fragment.as_str()).is_err());
    }
}
