//! Descriptor-driven translation between [`Structure`] arguments and SOAP bodies.
//!
//! Encoding walks the request fields in declared order; decoding walks the response fields
//! and looks only at the elements they name, so anything else a device sends is ignored.

use std::borrow::Cow;

use base64::Engine;
use onvif_soap::{BodyContent, SoapEnvelope, SoapFault, SoapVersion, parse_body};
use onvif_xml::builder::{Attribute, Element};
use onvif_xml::parser::{self, Node};
use tracing::{trace, warn};

use crate::OnvifCoreError;
use crate::registry::{
    Cardinality, FieldDescriptor, FieldKind, OperationHandle, Placement, PrimitiveKind, ServiceSchema,
    TypeDescriptor,
};
use crate::value::{Structure, Value, XmlFragment, XsDateTime, XsDuration};

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Response(Structure),
    Fault(SoapFault),
}

/// The complete request envelope for `op`. `headers` go into `Header` as given.
pub fn encode_request(
    op: &OperationHandle,
    args: &Structure,
    version: SoapVersion,
    headers: Vec<Element<'static>>,
) -> Result<String, OnvifCoreError> {
    let body = encode_body(op, args)?;
    let namespaces = op
        .schema
        .namespaces()
        .iter()
        .map(|(prefix, uri)| (Cow::Owned(prefix.clone()), Cow::Owned(uri.clone())))
        .collect();

    let envelope = SoapEnvelope::builder()
        .version(version)
        .namespaces(namespaces)
        .headers(headers)
        .body(body)
        .build();

    Ok(envelope.to_xml_string()?)
}

/// The operation element that goes into `Body`, e.g. `<tptz:ContinuousMove>`.
pub fn encode_body(op: &OperationHandle, args: &Structure) -> Result<Element<'static>, OnvifCoreError> {
    let root = Element::new(op.descriptor.name.clone()).set_namespace(op.descriptor.namespace.clone());
    Encoder { schema: &op.schema }.fields(root, op.request_type(), args, "")
}

pub fn decode_response(op: &OperationHandle, xml: &str) -> Result<Decoded, OnvifCoreError> {
    let decoder = Decoder {
        schema: &op.schema,
        operation: &op.descriptor.name,
    };

    let document = parser::parse(xml).map_err(|e| decoder.malformed(e.to_string()))?;
    let (version, body) = parse_body(&document).map_err(|e| decoder.malformed(e.to_string()))?;
    trace!(operation = %op.descriptor.name, ?version, "decoding response");

    let response_type = op.response_type();
    match body {
        BodyContent::Fault(fault) => Ok(Decoded::Fault(fault)),
        BodyContent::Empty => {
            if let Some(field) = response_type.fields.iter().find(|f| f.cardinality.is_required()) {
                return Err(decoder.malformed(format!(
                    "empty body, missing required field `{}`",
                    field.key
                )));
            }
            Ok(Decoded::Response(Structure::new()))
        }
        BodyContent::Payload(node) => {
            let name = node.tag_name().name();
            if name != op.descriptor.response_name {
                return Err(decoder.malformed(format!(
                    "expected {}, found {name}",
                    op.descriptor.response_name
                )));
            }
            decoder.fields(response_type, node, "").map(Decoded::Response)
        }
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn invalid(path: &str, expected: impl Into<String>) -> OnvifCoreError {
    OnvifCoreError::InvalidFieldValue {
        path: path.to_owned(),
        expected: expected.into(),
    }
}

struct Encoder<'s> {
    schema: &'s ServiceSchema,
}

impl Encoder<'_> {
    fn fields(
        &self,
        mut element: Element<'static>,
        ty: &TypeDescriptor,
        args: &Structure,
        path: &str,
    ) -> Result<Element<'static>, OnvifCoreError> {
        for key in args.keys() {
            if !ty.fields.iter().any(|field| field.key == key) {
                warn!(field = %join(path, key), r#type = %ty.name, "ignoring argument unknown to the schema");
            }
        }

        for field in &ty.fields {
            let field_path = join(path, &field.key);
            let Some(value) = args.get(&field.key) else {
                if field.cardinality.is_required() {
                    return Err(OnvifCoreError::MissingRequiredField { path: field_path });
                }
                continue;
            };

            if field.cardinality.is_repeated() {
                let items = match value {
                    Value::List(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                if items.is_empty() && field.cardinality == Cardinality::OneOrMore {
                    return Err(OnvifCoreError::MissingRequiredField { path: field_path });
                }
                for (index, item) in items.iter().enumerate() {
                    element = element.add_child(self.element(field, item, &format!("{field_path}[{index}]"))?);
                }
                continue;
            }

            if matches!(value, Value::List(_)) {
                return Err(invalid(&field_path, "a single value"));
            }

            element = match field.placement {
                Placement::Attribute => element.add_attribute(Attribute::new(
                    field.xml_name.clone(),
                    simple_lexical(&field.kind, value, &field_path)?,
                )),
                Placement::Element => element.add_child(self.element(field, value, &field_path)?),
            };
        }

        Ok(element)
    }

    /// Child elements take the namespace of the type that declares them.
    fn element(
        &self,
        field: &FieldDescriptor,
        value: &Value,
        path: &str,
    ) -> Result<Element<'static>, OnvifCoreError> {
        let element = Element::new(field.xml_name.clone()).set_namespace(field.namespace.clone());

        match &field.kind {
            FieldKind::Struct(id) => {
                let Value::Struct(nested) = value else {
                    return Err(invalid(path, "a structure"));
                };
                self.fields(element, self.schema.type_descriptor(*id), nested, path)
            }
            FieldKind::Opaque => {
                let Value::Opaque(fragment) = value else {
                    return Err(invalid(path, "an XML fragment"));
                };
                Ok(self.opaque(element, fragment))
            }
            kind => Ok(element.set_text(simple_lexical(kind, value, path)?)),
        }
    }

    /// Writes the fragment verbatim, re-declaring the bindings it was read under unless
    /// the envelope already declares them.
    fn opaque(&self, mut element: Element<'static>, fragment: &XmlFragment) -> Element<'static> {
        for (prefix, uri) in fragment.namespaces() {
            let on_envelope = self
                .schema
                .namespaces()
                .iter()
                .any(|(p, u)| Some(p) == prefix.as_ref() && u == uri);
            let soap = SoapVersion::from_envelope_namespace(uri).is_some();
            if on_envelope || soap {
                continue;
            }
            element = element.add_namespace_declaration(uri.clone(), prefix.clone());
        }
        element.set_raw(fragment.as_str().to_owned())
    }
}

fn simple_lexical(kind: &FieldKind, value: &Value, path: &str) -> Result<String, OnvifCoreError> {
    match kind {
        FieldKind::Enum { name, values } => {
            let Some(text) = value.as_str() else {
                return Err(invalid(path, format!("a {name} value")));
            };
            if values.iter().any(|allowed| allowed == text) {
                Ok(text.to_owned())
            } else {
                Err(OnvifCoreError::InvalidEnumValue {
                    path: path.to_owned(),
                    value: text.to_owned(),
                    allowed: values.to_vec(),
                })
            }
        }
        FieldKind::Primitive(primitive) => primitive_lexical(*primitive, value).ok_or_else(|| {
            invalid(
                path,
                format!("{}, got {}", primitive.xsd_name(), value.kind_name()),
            )
        }),
        FieldKind::Struct(_) | FieldKind::Opaque => Err(invalid(path, "a simple value")),
    }
}

/// Canonical XSD text for `value`, or `None` when it does not fit `kind`.
/// Text is accepted for every primitive once it parses as one.
fn primitive_lexical(kind: PrimitiveKind, value: &Value) -> Option<String> {
    let text = |check: fn(&str) -> bool| match value {
        Value::Text(text) if check(text.trim()) => Some(text.trim().to_owned()),
        _ => None,
    };

    match kind {
        PrimitiveKind::String => match value {
            Value::Text(text) => Some(text.clone()),
            _ => None,
        },
        PrimitiveKind::Boolean => match value {
            Value::Bool(b) => Some(b.to_string()),
            _ => text(|t| matches!(t, "true" | "false" | "1" | "0")),
        },
        PrimitiveKind::Int => match value {
            Value::Int(i) => i32::try_from(*i).ok().map(|i| i.to_string()),
            _ => text(|t| t.parse::<i32>().is_ok()),
        },
        PrimitiveKind::UnsignedInt => match value {
            Value::Int(i) => u32::try_from(*i).ok().map(|i| i.to_string()),
            _ => text(|t| t.parse::<u32>().is_ok()),
        },
        PrimitiveKind::Long => match value {
            Value::Int(i) => Some(i.to_string()),
            _ => text(|t| t.parse::<i64>().is_ok()),
        },
        PrimitiveKind::Float | PrimitiveKind::Double => match value {
            Value::Float(f) => Some(format_float(*f)),
            Value::Int(i) => Some(i.to_string()),
            _ => text(|t| parse_float(t).is_some()),
        },
        PrimitiveKind::DateTime => match value {
            Value::DateTime(dt) => Some(dt.as_str().to_owned()),
            _ => text(|t| XsDateTime::parse(t).is_ok()),
        },
        PrimitiveKind::Duration => match value {
            Value::Duration(d) => Some(d.as_str().to_owned()),
            _ => text(|t| XsDuration::parse(t).is_ok()),
        },
        PrimitiveKind::Base64Binary => match value {
            Value::Binary(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            _ => text(|t| decode_base64(t).is_some()),
        },
    }
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value == f64::INFINITY {
        "INF".to_owned()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_owned()
    } else {
        value.to_string()
    }
}

/// Parses the XSD float forms; Rust's own `inf` and `nan` spellings are rejected.
fn parse_float(text: &str) -> Option<f64> {
    match text.trim() {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        other
            if !other.is_empty()
                && other
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')) =>
        {
            other.parse().ok()
        }
        _ => None,
    }
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact).ok()
}

struct Decoder<'s> {
    schema: &'s ServiceSchema,
    operation: &'s str,
}

impl Decoder<'_> {
    fn malformed(&self, reason: String) -> OnvifCoreError {
        OnvifCoreError::MalformedResponse {
            operation: self.operation.to_owned(),
            reason,
        }
    }

    fn fields(&self, ty: &TypeDescriptor, node: Node<'_, '_>, path: &str) -> Result<Structure, OnvifCoreError> {
        let mut result = Structure::new();

        for field in &ty.fields {
            let field_path = join(path, &field.key);

            let value = match field.placement {
                Placement::Attribute => parser::attribute_local(node, &field.xml_name)
                    .map(|raw| self.simple(&field.kind, raw, &field_path))
                    .transpose()?,
                Placement::Element => {
                    let mut occurrences = parser::child_elements(node)
                        .filter(|child| child.tag_name().name() == field.xml_name);

                    if field.cardinality.is_repeated() {
                        let items = occurrences
                            .enumerate()
                            .map(|(index, child)| self.element(field, child, &format!("{field_path}[{index}]")))
                            .collect::<Result<Vec<_>, _>>()?;
                        (!items.is_empty()).then_some(Value::List(items))
                    } else {
                        occurrences
                            .next()
                            .map(|child| self.element(field, child, &field_path))
                            .transpose()?
                    }
                }
            };

            match value {
                Some(value) => {
                    result.insert(field.key.clone(), value);
                }
                None if field.cardinality.is_required() => {
                    return Err(self.malformed(format!("missing required field `{field_path}`")));
                }
                None => {}
            }
        }

        Ok(result)
    }

    fn element(&self, field: &FieldDescriptor, node: Node<'_, '_>, path: &str) -> Result<Value, OnvifCoreError> {
        match &field.kind {
            FieldKind::Struct(id) => self
                .fields(self.schema.type_descriptor(*id), node, path)
                .map(Value::Struct),
            FieldKind::Opaque => Ok(Value::Opaque(capture_fragment(node))),
            kind => self.simple(kind, node.text().unwrap_or_default(), path),
        }
    }

    fn simple(&self, kind: &FieldKind, raw: &str, path: &str) -> Result<Value, OnvifCoreError> {
        match kind {
            FieldKind::Enum { name, values } => {
                let text = raw.trim();
                if !values.iter().any(|allowed| allowed == text) {
                    warn!(field = %path, value = %text, r#enum = %name, "value outside the known enumeration");
                }
                Ok(Value::Text(text.to_owned()))
            }
            FieldKind::Primitive(primitive) => primitive_value(*primitive, raw).ok_or_else(|| {
                self.malformed(format!(
                    "`{path}`: {:?} is not a valid {}",
                    raw.trim(),
                    primitive.xsd_name()
                ))
            }),
            FieldKind::Struct(_) | FieldKind::Opaque => {
                Err(self.malformed(format!("`{path}` is not a simple value")))
            }
        }
    }
}

fn primitive_value(kind: PrimitiveKind, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match kind {
        PrimitiveKind::String => Some(Value::Text(raw.to_owned())),
        PrimitiveKind::Boolean => match trimmed {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        PrimitiveKind::Int | PrimitiveKind::UnsignedInt | PrimitiveKind::Long => {
            trimmed.parse().ok().map(Value::Int)
        }
        PrimitiveKind::Float | PrimitiveKind::Double => parse_float(trimmed).map(Value::Float),
        PrimitiveKind::DateTime => XsDateTime::parse(trimmed).ok().map(Value::DateTime),
        PrimitiveKind::Duration => XsDuration::parse(trimmed).ok().map(Value::Duration),
        PrimitiveKind::Base64Binary => decode_base64(raw).map(Value::Binary),
    }
}

/// The element's content plus every namespace binding in scope at it.
fn capture_fragment(node: Node<'_, '_>) -> XmlFragment {
    let namespaces = node
        .namespaces()
        .filter(|ns| ns.name() != Some("xml"))
        .map(|ns| (ns.name().map(str::to_owned), ns.uri().to_owned()))
        .collect();
    XmlFragment::with_namespaces(parser::inner_xml(node), namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    const TPTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
    const TT: &str = "http://www.onvif.org/ver10/schema";
    const VELOCITY_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";

    fn op(service: &str, operation: &str) -> OperationHandle {
        Registry::builtin().unwrap().lookup(service, operation).unwrap()
    }

    fn continuous_move_args() -> Structure {
        Structure::new().with("profileToken", "Profile_1").with(
            "velocity",
            Structure::new().with(
                "panTilt",
                Structure::new()
                    .with("x", 0.5)
                    .with("y", 0.0)
                    .with("space", VELOCITY_SPACE),
            ),
        )
    }

    fn envelope(body: &str) -> String {
        format!(
            r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:tt="{TT}" xmlns:tptz="{TPTZ}" xmlns:tds="http://www.onvif.org/ver10/device/wsdl"><env:Body>{body}</env:Body></env:Envelope>"#
        )
    }

    #[test]
    fn continuous_move_request() {
        let op = op("PTZ", "ContinuousMove");
        let xml = encode_request(&op, &continuous_move_args(), SoapVersion::Soap12, Vec::new()).unwrap();

        assert_eq!(
            xml,
            format!(
                r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tptz="{TPTZ}" xmlns:tt="{TT}"><s:Body><tptz:ContinuousMove><tptz:ProfileToken>Profile_1</tptz:ProfileToken><tptz:Velocity><tt:PanTilt x="0.5" y="0" space="{VELOCITY_SPACE}"/></tptz:Velocity></tptz:ContinuousMove></s:Body></s:Envelope>"#
            )
        );
    }

    #[test]
    fn inherited_fields_are_written_in_their_base_namespace() {
        let json = r#"{
            "namespaces": { "tt": "http://www.onvif.org/ver10/schema" },
            "common": { "namespace": "http://www.onvif.org/ver10/schema",
                        "types": [ { "name": "Base", "fields": [ { "name": "Name", "type": "xs:string" } ] } ] },
            "services": [ { "name": "s", "namespace": "urn:s", "prefix": "sv",
                "types": [ { "name": "Derived", "extends": "tt:Base", "fields": [ { "name": "Extra", "type": "xs:string" } ] } ],
                "operations": [ { "name": "SetThing", "input": [ { "name": "Thing", "type": "Derived" } ] } ] } ] }"#;
        let registry =
            Registry::from_dictionary(&crate::schema::Dictionary::from_json(json).unwrap()).unwrap();
        let op = registry.lookup("s", "SetThing").unwrap();
        let args = Structure::new().with("thing", Structure::new().with("name", "n").with("extra", "e"));

        let xml = encode_request(&op, &args, SoapVersion::Soap12, Vec::new()).unwrap();
        assert!(xml.contains(&format!(r#"xmlns:sv="urn:s" xmlns:tt="{TT}""#)), "{xml}");
        assert!(
            xml.contains("<sv:SetThing><sv:Thing><tt:Name>n</tt:Name><sv:Extra>e</sv:Extra></sv:Thing></sv:SetThing>"),
            "{xml}"
        );
    }

    #[test]
    fn enum_outside_allowed_set_is_rejected() {
        let op = op("device", "GetCapabilities");
        let args = Structure::new().with("category", vec!["Media", "Everything"]);

        let err = encode_body(&op, &args).unwrap_err();
        match err {
            OnvifCoreError::InvalidEnumValue { path, value, allowed } => {
                assert_eq!(path, "category[1]");
                assert_eq!(value, "Everything");
                assert!(allowed.contains(&"PTZ".to_owned()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let op = op("ptz", "ContinuousMove");

        let args = Structure::new().with("profileToken", "Profile_1");
        assert!(matches!(
            encode_body(&op, &args),
            Err(OnvifCoreError::MissingRequiredField { path }) if path == "velocity"
        ));

        let args = Structure::new().with("profileToken", "Profile_1").with(
            "velocity",
            Structure::new().with("panTilt", Structure::new().with("y", 0.0)),
        );
        assert!(matches!(
            encode_body(&op, &args),
            Err(OnvifCoreError::MissingRequiredField { path }) if path == "velocity.panTilt.x"
        ));

        let mut args = continuous_move_args();
        args.insert("profileToken", 7);
        assert!(matches!(
            encode_body(&op, &args),
            Err(OnvifCoreError::InvalidFieldValue { path, .. }) if path == "profileToken"
        ));

        let op = self::op("accesscontrol", "GetAccessPoints");
        let args = Structure::new().with("token", Vec::<Value>::new());
        assert!(matches!(
            encode_body(&op, &args),
            Err(OnvifCoreError::MissingRequiredField { path }) if path == "token"
        ));
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_arguments_are_ignored_with_a_warning() {
        let op = op("ptz", "Stop");
        let args = Structure::new().with("profileToken", "Profile_1").with("speed", 3);

        let xml = encode_request(&op, &args, SoapVersion::Soap12, Vec::new()).unwrap();
        assert!(xml.contains("<tptz:Stop><tptz:ProfileToken>Profile_1</tptz:ProfileToken></tptz:Stop>"));
        assert!(logs_contain("ignoring argument unknown to the schema"));
    }

    #[test]
    fn special_floats_and_escaping() {
        let op = op("ptz", "RelativeMove");
        let args = Structure::new().with("profileToken", "A&B <1>").with(
            "translation",
            Structure::new()
                .with("panTilt", Structure::new().with("x", f64::INFINITY).with("y", f64::NAN))
                .with("zoom", Structure::new().with("x", "-INF")),
        );

        let xml = encode_request(&op, &args, SoapVersion::Soap12, Vec::new()).unwrap();
        assert!(xml.contains("<tptz:ProfileToken>A&amp;B &lt;1&gt;</tptz:ProfileToken>"));
        assert!(xml.contains(r#"<tt:PanTilt x="INF" y="NaN"/>"#));
        assert!(xml.contains(r#"<tt:Zoom x="-INF"/>"#));

        let bad = Structure::new().with("profileToken", "p").with(
            "translation",
            Structure::new().with("zoom", Structure::new().with("x", "inf")),
        );
        assert!(encode_body(&op, &bad).is_err());
    }

    #[test]
    fn request_round_trips_through_the_decoder() {
        let op = op("ptz", "ContinuousMove");
        let mut args = continuous_move_args();
        args.insert("timeout", XsDuration::parse("PT1.5S").unwrap());

        let xml = encode_request(&op, &args, SoapVersion::Soap12, Vec::new()).unwrap();
        let document = parser::parse(&xml).unwrap();
        let (_, BodyContent::Payload(payload)) = parse_body(&document).unwrap() else {
            panic!("request has a payload");
        };

        let decoder = Decoder {
            schema: &op.schema,
            operation: "ContinuousMove",
        };
        let decoded = decoder.fields(op.request_type(), payload, "").unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn status_response_decodes_and_keeps_lexical_time() {
        let op = op("ptz", "GetStatus");
        let xml = envelope(
            r#"<tptz:GetStatusResponse><tptz:PTZStatus>
                <tt:Position><tt:PanTilt x="0.25" y="-1" space="urn:space"/><tt:Zoom x="0"/></tt:Position>
                <tt:MoveStatus><tt:PanTilt>IDLE</tt:PanTilt><tt:Zoom>MOVING</tt:Zoom></tt:MoveStatus>
                <tt:UtcTime>2024-03-01T12:00:00.120+01:00</tt:UtcTime>
                <tt:VendorExtra>ignored</tt:VendorExtra>
            </tptz:PTZStatus></tptz:GetStatusResponse>"#,
        );

        let Decoded::Response(response) = decode_response(&op, &xml).unwrap() else {
            panic!("expected a response");
        };

        let status = response.get_struct("ptzStatus").unwrap();
        assert_eq!(
            status.path("position.panTilt.y").and_then(Value::as_f64),
            Some(-1.0)
        );
        assert_eq!(status.path("moveStatus.zoom").and_then(Value::as_str), Some("MOVING"));
        assert_eq!(
            status.get("utcTime").and_then(Value::as_str),
            Some("2024-03-01T12:00:00.120+01:00")
        );
        assert!(!status.contains_key("error"));
        assert!(!status.contains_key("vendorExtra"));
    }

    #[test]
    fn missing_required_response_field_is_malformed() {
        let op = op("device", "GetDeviceInformation");
        let xml = envelope(
            "<tds:GetDeviceInformationResponse><tds:Manufacturer>Acme</tds:Manufacturer></tds:GetDeviceInformationResponse>",
        );

        let err = decode_response(&op, &xml).unwrap_err();
        assert!(
            matches!(&err, OnvifCoreError::MalformedResponse { operation, reason }
                if operation == "GetDeviceInformation" && reason.contains("`model`")),
            "{err}"
        );

        let wrong = envelope("<tds:GetHostnameResponse/>");
        assert!(matches!(
            decode_response(&op, &wrong),
            Err(OnvifCoreError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn empty_repeated_field_is_absent() {
        let op = op("media", "GetProfiles");
        let xml = envelope(r#"<trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl"/>"#);

        let Decoded::Response(response) = decode_response(&op, &xml).unwrap() else {
            panic!("expected a response");
        };
        assert!(response.is_empty());
        assert!(response.get_list("profiles").is_empty());
    }

    #[tracing_test::traced_test]
    #[test]
    fn unknown_enum_value_is_accepted() {
        let op = op("ptz", "GetStatus");
        let xml = envelope(
            r#"<tptz:GetStatusResponse><tptz:PTZStatus><tt:MoveStatus><tt:PanTilt>BRAKING</tt:PanTilt></tt:MoveStatus><tt:UtcTime>2024-03-01T12:00:00Z</tt:UtcTime></tptz:PTZStatus></tptz:GetStatusResponse>"#,
        );

        let Decoded::Response(response) = decode_response(&op, &xml).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(
            response.path("ptzStatus.moveStatus.panTilt").and_then(Value::as_str),
            Some("BRAKING")
        );
        assert!(logs_contain("value outside the known enumeration"));
    }

    #[test]
    fn opaque_content_keeps_namespaces_and_re_encodes() {
        let op = op("device", "GetServices");
        let xml = envelope(&format!(
            r#"<tds:GetServicesResponse><tds:Service>
                <tds:Namespace>{TPTZ}</tds:Namespace>
                <tds:XAddr>http://10.0.0.5/onvif/ptz_service</tds:XAddr>
                <tds:Capabilities><tptz:Capabilities MoveStatus="true" StatusPosition="true"/></tds:Capabilities>
                <tds:Version><tt:Major>2</tt:Major><tt:Minor>50</tt:Minor></tds:Version>
            </tds:Service></tds:GetServicesResponse>"#
        ));

        let Decoded::Response(response) = decode_response(&op, &xml).unwrap() else {
            panic!("expected a response");
        };
        let service = response.get_list("service")[0].as_struct().unwrap();
        assert_eq!(service.path("version.minor").and_then(Value::as_i64), Some(50));

        let Some(Value::Opaque(fragment)) = service.get("capabilities") else {
            panic!("capabilities should be opaque");
        };
        assert_eq!(
            fragment.as_str(),
            r#"<tptz:Capabilities MoveStatus="true" StatusPosition="true"/>"#
        );

        let document = fragment.to_document();
        let parsed = parser::parse(&document).unwrap();
        let capabilities = parser::find_child_ns(parsed.root_element(), TPTZ, "Capabilities").unwrap();
        assert_eq!(parser::attribute_local(capabilities, "MoveStatus"), Some("true"));

        let encoder = Encoder { schema: &op.schema };
        let service_type = op
            .response_type()
            .fields
            .first()
            .and_then(|field| match field.kind {
                FieldKind::Struct(id) => Some(op.schema.type_descriptor(id)),
                _ => None,
            })
            .unwrap();
        let field = service_type.fields.iter().find(|f| f.key == "capabilities").unwrap();
        let element = encoder
            .element(field, &Value::Opaque(fragment.clone()), "capabilities")
            .unwrap()
            .add_namespace_declaration("http://www.onvif.org/ver10/device/wsdl", Some("tds"));
        let written = element.to_xml_string().unwrap();
        assert!(written.contains(&format!(r#"xmlns:tptz="{TPTZ}""#)), "{written}");
        assert!(written.contains(r#"<tptz:Capabilities MoveStatus="true" StatusPosition="true"/>"#));
    }

    #[test]
    fn fault_short_circuits() {
        let op = op("ptz", "GetPresets");
        let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:ter="http://www.onvif.org/ver10/error">
            <env:Body><env:Fault>
                <env:Code><env:Value>env:Sender</env:Value>
                    <env:Subcode><env:Value>ter:InvalidArgVal</env:Value>
                        <env:Subcode><env:Value>ter:NoProfile</env:Value></env:Subcode>
                    </env:Subcode>
                </env:Code>
                <env:Reason><env:Text xml:lang="en">No such profile</env:Text></env:Reason>
            </env:Fault></env:Body></env:Envelope>"#;

        let Decoded::Fault(fault) = decode_response(&op, xml).unwrap() else {
            panic!("expected a fault");
        };
        assert_eq!(fault.reason, "No such profile");
        assert_eq!(fault.deepest_subcode().unwrap().local_name, "NoProfile");
    }

    #[test]
    fn primitive_forms() {
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-0.0), "-0");
        assert_eq!(format_float(f64::NEG_INFINITY), "-INF");
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert!(parse_float("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_float("nan"), None);
        assert_eq!(parse_float("infinity"), None);

        assert_eq!(
            primitive_lexical(PrimitiveKind::Int, &Value::Int(i64::from(i32::MAX) + 1)),
            None
        );
        assert_eq!(primitive_lexical(PrimitiveKind::UnsignedInt, &Value::Int(-1)), None);
        assert_eq!(
            primitive_lexical(PrimitiveKind::Boolean, &Value::Bool(true)).as_deref(),
            Some("true")
        );
        assert_eq!(
            primitive_lexical(PrimitiveKind::Base64Binary, &Value::Binary(b"onvif".to_vec())).as_deref(),
            Some("b252aWY=")
        );
        assert_eq!(
            primitive_value(PrimitiveKind::Base64Binary, "b252\n aWY="),
            Some(Value::Binary(b"onvif".to_vec()))
        );
        assert_eq!(primitive_value(PrimitiveKind::Boolean, " 1 "), Some(Value::Bool(true)));
        assert_eq!(primitive_value(PrimitiveKind::Int, "x"), None);
    }
}
