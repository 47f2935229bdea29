//! Serde model of the schema dictionary, the static description of ONVIF services,
//! their types and operations that the registry compiles into descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Dictionary {
    /// Preferred prefix for each namespace, `prefix -> URI`.
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
    /// Types shared by every service, usually `http://www.onvif.org/ver10/schema`.
    #[serde(default)]
    pub common: TypeSet,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

impl Dictionary {
    pub fn from_json(json: &str) -> Result<Self, crate::SchemaError> {
        serde_json::from_str(json).map_err(|e| crate::SchemaError::Json(e.to_string()))
    }

    pub fn prefix_of(&self, namespace: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(_, uri)| uri.as_str() == namespace)
            .map(|(prefix, _)| prefix.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypeSet {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
    /// Simple type aliases, `name -> target type`, e.g. `ReferenceToken -> xs:string`.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceDefinition {
    /// Registry key, matched case-insensitively.
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypeDefinition {
    pub name: String,
    /// Base type whose fields come first.
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldDefinition {
    /// XML element or attribute name exactly as in the schema.
    pub name: String,
    /// Argument key; derived from `name` when absent (`ProfileToken` -> `profileToken`).
    #[serde(default)]
    pub key: Option<String>,
    /// `xs:*` primitive, enum, alias or struct type name; `xs:anyType` for opaque content.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub occurs: Occurs,
    #[serde(default)]
    pub attribute: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Occurs {
    #[default]
    Required,
    Optional,
    /// `minOccurs="0" maxOccurs="unbounded"`.
    Repeated,
    /// `minOccurs="1" maxOccurs="unbounded"`.
    OneOrMore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationDefinition {
    pub name: String,
    #[serde(default)]
    pub input: Vec<FieldDefinition>,
    #[serde(default)]
    pub output: Vec<FieldDefinition>,
    /// Overrides the `Get*` naming rule used to decide whether a call may be retried.
    #[serde(default)]
    pub idempotent: Option<bool>,
    /// SOAP action; defaults to `<service namespace>/<name>`.
    #[serde(default)]
    pub action: Option<String>,
}

/// Argument key for an XML name: the leading capital run is lowercased,
/// keeping the last capital when it starts the next word.
///
/// `ProfileToken` -> `profileToken`, `PTZConfiguration` -> `ptzConfiguration`, `URI` -> `uri`.
pub fn argument_key(xml_name: &str) -> String {
    let chars: Vec<char> = xml_name.chars().collect();
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();

    let lower_until = match upper_run {
        0 => 0,
        n if n == chars.len() => n,
        1 => 1,
        n if chars[n].is_lowercase() => n - 1,
        n => n,
    };

    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i < lower_until {
                c.to_ascii_lowercase()
            } else {
                *c
            }
        })
        .collect()
}
