use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use onvif_soap::envelope::ENVELOPE_PREFIX;
use tracing::{debug, info, warn};

use crate::OnvifCoreError;
use crate::schema::{
    Dictionary, EnumDefinition, FieldDefinition, Occurs, ServiceDefinition, TypeDefinition, TypeSet,
    argument_key,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid dictionary: {0}")]
    Json(String),

    #[error("{service}: unknown type `{name}`")]
    UnknownType { service: String, name: String },

    #[error("{service}: unknown namespace prefix in `{name}`")]
    UnknownPrefix { service: String, name: String },

    #[error("{service}: inheritance cycle through `{name}`")]
    InheritanceCycle { service: String, name: String },

    #[error("{service}: alias cycle through `{name}`")]
    AliasCycle { service: String, name: String },

    #[error("{service}: attribute `{field}` of `{owner}` must have a simple type")]
    AttributeNotSimple {
        service: String,
        owner: String,
        field: String,
    },

    #[error("{service}: operation `{operation}` is defined twice")]
    DuplicateOperation { service: String, operation: String },

    #[error("{service}: type `{name}` is defined twice")]
    DuplicateType { service: String, name: String },
}

/// Index into a service's type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Boolean,
    Int,
    UnsignedInt,
    Long,
    Float,
    Double,
    DateTime,
    Duration,
    Base64Binary,
}

impl PrimitiveKind {
    fn from_xsd(local_name: &str) -> Option<Self> {
        let kind = match local_name {
            "string" | "token" | "normalizedString" | "anyURI" | "QName" | "NCName" | "Name"
            | "language" | "ID" | "IDREF" | "date" | "time" | "hexBinary" => PrimitiveKind::String,
            "boolean" => PrimitiveKind::Boolean,
            "int" | "integer" | "short" | "byte" | "unsignedShort" | "unsignedByte"
            | "nonNegativeInteger" | "positiveInteger" => PrimitiveKind::Int,
            "unsignedInt" => PrimitiveKind::UnsignedInt,
            "long" | "unsignedLong" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" | "decimal" => PrimitiveKind::Double,
            "dateTime" => PrimitiveKind::DateTime,
            "duration" => PrimitiveKind::Duration,
            "base64Binary" => PrimitiveKind::Base64Binary,
            _ => return None,
        };
        Some(kind)
    }

    pub fn xsd_name(self) -> &'static str {
        match self {
            PrimitiveKind::String => "xs:string",
            PrimitiveKind::Boolean => "xs:boolean",
            PrimitiveKind::Int => "xs:int",
            PrimitiveKind::UnsignedInt => "xs:unsignedInt",
            PrimitiveKind::Long => "xs:long",
            PrimitiveKind::Float => "xs:float",
            PrimitiveKind::Double => "xs:double",
            PrimitiveKind::DateTime => "xs:dateTime",
            PrimitiveKind::Duration => "xs:duration",
            PrimitiveKind::Base64Binary => "xs:base64Binary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    Enum { name: String, values: Arc<[String]> },
    Struct(TypeId),
    /// `xs:anyType`: pre-serialized XML in, raw XML out.
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Required,
    Optional,
    Repeated,
    OneOrMore,
}

impl Cardinality {
    pub fn is_required(self) -> bool {
        matches!(self, Cardinality::Required | Cardinality::OneOrMore)
    }

    pub fn is_repeated(self) -> bool {
        matches!(self, Cardinality::Repeated | Cardinality::OneOrMore)
    }
}

impl From<Occurs> for Cardinality {
    fn from(occurs: Occurs) -> Self {
        match occurs {
            Occurs::Required => Cardinality::Required,
            Occurs::Optional => Cardinality::Optional,
            Occurs::Repeated => Cardinality::Repeated,
            Occurs::OneOrMore => Cardinality::OneOrMore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Element,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: String,
    pub xml_name: String,
    /// Namespace of the type that declares the field. Inherited fields keep their base
    /// type's namespace.
    pub namespace: String,
    pub cardinality: Cardinality,
    pub placement: Placement,
    pub kind: FieldKind,
}

/// A structure with its `extends` chain already flattened, base fields first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub namespace: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub service: String,
    pub namespace: String,
    pub name: String,
    pub response_name: String,
    pub action: String,
    pub request: TypeId,
    pub response: TypeId,
    pub idempotent: bool,
}

/// The compiled form of one service: its operations and the type table they index into.
#[derive(Debug)]
pub struct ServiceSchema {
    name: String,
    namespace: String,
    /// `(prefix, URI)` pairs to declare on envelopes for this service.
    namespaces: Vec<(String, String)>,
    types: Vec<TypeDescriptor>,
    operations: HashMap<String, Arc<OperationDescriptor>>,
}

impl ServiceSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn type_descriptor(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.0]
    }

    pub fn operation(&self, name: &str) -> Option<&Arc<OperationDescriptor>> {
        self.operations.get(name)
    }

    pub fn operations(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values().map(|op| &**op)
    }

    /// Every type in the table, request and response wrappers included.
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }
}

/// An operation together with the schema its type ids belong to.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    pub schema: Arc<ServiceSchema>,
    pub descriptor: Arc<OperationDescriptor>,
}

impl OperationHandle {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn service(&self) -> &str {
        &self.descriptor.service
    }

    pub fn request_type(&self) -> &TypeDescriptor {
        self.schema.type_descriptor(self.descriptor.request)
    }

    pub fn response_type(&self) -> &TypeDescriptor {
        self.schema.type_descriptor(self.descriptor.response)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    services: HashMap<String, Arc<ServiceSchema>>,
    by_namespace: HashMap<String, String>,
}

/// Compiled descriptors for every known service, keyed by lowercased service name.
///
/// Writes replace a whole service at once; readers holding an `Arc<ServiceSchema>` keep
/// the version they looked up.
#[derive(Debug, Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dictionary(dictionary: &Dictionary) -> Result<Self, SchemaError> {
        let registry = Self::new();
        registry.load(dictionary)?;
        Ok(registry)
    }

    /// The registry for the embedded catalogue.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_dictionary(&crate::catalogue::builtin_dictionary()?)
    }

    /// Compiles every service of `dictionary` and registers them. Nothing is registered
    /// if any service fails to compile.
    pub fn load(&self, dictionary: &Dictionary) -> Result<(), SchemaError> {
        let compiled = dictionary
            .services
            .iter()
            .map(|service| compile_service(dictionary, service))
            .collect::<Result<Vec<_>, _>>()?;

        for schema in compiled {
            self.register(schema);
        }
        Ok(())
    }

    /// Adds or replaces a service.
    pub fn register(&self, schema: ServiceSchema) {
        let key = schema.name.to_lowercase();
        info!(
            service = %key,
            namespace = %schema.namespace,
            operations = schema.operations.len(),
            "registering service"
        );

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(previous) = state.services.get(&key).cloned() {
            state.by_namespace.remove(&previous.namespace);
        }
        state
            .by_namespace
            .insert(schema.namespace.clone(), key.clone());
        state.services.insert(key, Arc::new(schema));
    }

    pub fn service(&self, name: &str) -> Option<Arc<ServiceSchema>> {
        self.read().services.get(&name.to_lowercase()).cloned()
    }

    /// Registry name of the service using `namespace`, if any.
    pub fn service_for_namespace(&self, namespace: &str) -> Option<String> {
        self.read().by_namespace.get(namespace).cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn lookup(&self, service: &str, operation: &str) -> Result<OperationHandle, OnvifCoreError> {
        let unknown = || OnvifCoreError::UnknownOperation {
            service: service.to_owned(),
            operation: operation.to_owned(),
        };

        let schema = self.service(service).ok_or_else(unknown)?;
        let descriptor = schema.operation(operation).cloned().ok_or_else(unknown)?;

        Ok(OperationHandle { schema, descriptor })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Service,
    Common,
}

enum Resolved<'d> {
    Primitive(PrimitiveKind),
    Enum(Scope, &'d EnumDefinition),
    Struct(Scope, &'d TypeDefinition),
    Opaque,
}

struct Compiler<'d> {
    dictionary: &'d Dictionary,
    service: &'d ServiceDefinition,
    types: Vec<Option<TypeDescriptor>>,
    ids: HashMap<(Scope, &'d str), TypeId>,
    enums: HashMap<(Scope, &'d str), Arc<[String]>>,
}

fn compile_service(
    dictionary: &Dictionary,
    service: &ServiceDefinition,
) -> Result<ServiceSchema, SchemaError> {
    let mut compiler = Compiler {
        dictionary,
        service,
        types: Vec::new(),
        ids: HashMap::new(),
        enums: HashMap::new(),
    };
    compiler.check_duplicates()?;

    let mut operations = HashMap::new();
    for operation in &service.operations {
        let response_name = format!("{}Response", operation.name);
        let request = compiler.synthesize(&operation.name, &operation.input)?;
        let response = compiler.synthesize(&response_name, &operation.output)?;

        let descriptor = OperationDescriptor {
            service: service.name.to_lowercase(),
            namespace: service.namespace.clone(),
            name: operation.name.clone(),
            response_name,
            action: operation
                .action
                .clone()
                .unwrap_or_else(|| format!("{}/{}", service.namespace, operation.name)),
            request,
            response,
            idempotent: operation
                .idempotent
                .unwrap_or_else(|| operation.name.starts_with("Get")),
        };

        if operations
            .insert(operation.name.clone(), Arc::new(descriptor))
            .is_some()
        {
            return Err(SchemaError::DuplicateOperation {
                service: service.name.clone(),
                operation: operation.name.clone(),
            });
        }
    }

    let types: Vec<TypeDescriptor> = compiler.types.into_iter().flatten().collect();
    let namespaces = declared_namespaces(dictionary, service, &types);

    debug!(
        service = %service.name,
        types = types.len(),
        "compiled service schema"
    );

    Ok(ServiceSchema {
        name: service.name.to_lowercase(),
        namespace: service.namespace.clone(),
        namespaces,
        types,
        operations,
    })
}

/// Prefixes the envelope and the WS-Security header bind themselves.
const RESERVED_PREFIXES: &[&str] = &[ENVELOPE_PREFIX, "wsse", "wsu"];

/// Service prefix first, then every other namespace used by the table. Namespaces
/// the dictionary gives no prefix for, or only a reserved one, get `ns1`, `ns2`, ….
fn declared_namespaces(
    dictionary: &Dictionary,
    service: &ServiceDefinition,
    types: &[TypeDescriptor],
) -> Vec<(String, String)> {
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut seen = HashSet::new();
    let mut generated = 0;

    let service_ns = std::iter::once(service.namespace.as_str());
    let used = types.iter().flat_map(|t| {
        std::iter::once(t.namespace.as_str()).chain(t.fields.iter().map(|f| f.namespace.as_str()))
    });

    for namespace in service_ns.chain(used) {
        if !seen.insert(namespace) {
            continue;
        }

        let explicit = if namespace == service.namespace {
            service.prefix.as_deref()
        } else {
            None
        };

        let preferred = explicit
            .or_else(|| dictionary.prefix_of(namespace))
            .filter(|prefix| !RESERVED_PREFIXES.contains(prefix));

        let prefix = match preferred {
            Some(prefix) => prefix.to_owned(),
            None => loop {
                generated += 1;
                let candidate = format!("ns{generated}");
                if !dictionary.namespaces.contains_key(&candidate)
                    && !namespaces.iter().any(|(p, _)| *p == candidate)
                {
                    warn!(%namespace, prefix = %candidate, "namespace has no prefix, generated one");
                    break candidate;
                }
            },
        };
        namespaces.push((prefix, namespace.to_owned()));
    }

    namespaces
}

impl<'d> Compiler<'d> {
    fn error_unknown(&self, name: &str) -> SchemaError {
        SchemaError::UnknownType {
            service: self.service.name.clone(),
            name: name.to_owned(),
        }
    }

    fn type_set(&self, scope: Scope) -> TypeSetView<'d> {
        match scope {
            Scope::Service => TypeSetView {
                types: &self.service.types,
                enums: &self.service.enums,
                aliases: &self.service.aliases,
                namespace: &self.service.namespace,
            },
            Scope::Common => TypeSetView::from(&self.dictionary.common),
        }
    }

    fn check_duplicates(&self) -> Result<(), SchemaError> {
        for scope in [Scope::Service, Scope::Common] {
            let set = self.type_set(scope);
            let mut names = HashSet::new();
            let all = set
                .types
                .iter()
                .map(|t| t.name.as_str())
                .chain(set.enums.iter().map(|e| e.name.as_str()))
                .chain(set.aliases.keys().map(String::as_str));
            for name in all {
                if !names.insert(name) {
                    return Err(SchemaError::DuplicateType {
                        service: self.service.name.clone(),
                        name: name.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolves a type reference seen from `scope`. Unprefixed names look in the
    /// service first and then in the common set; common types never see service types.
    fn resolve(&self, scope: Scope, reference: &'d str) -> Result<Resolved<'d>, SchemaError> {
        let mut current_scope = scope;
        let mut current = reference;
        let mut visited = HashSet::new();

        loop {
            if !visited.insert((current_scope, current)) {
                return Err(SchemaError::AliasCycle {
                    service: self.service.name.clone(),
                    name: reference.to_owned(),
                });
            }

            let (scopes, local) = match current.split_once(':') {
                Some(("xs" | "xsd", local)) => {
                    return match local {
                        "anyType" | "any" => Ok(Resolved::Opaque),
                        _ => PrimitiveKind::from_xsd(local)
                            .map(Resolved::Primitive)
                            .ok_or_else(|| self.error_unknown(current)),
                    };
                }
                Some((prefix, local)) => (vec![self.scope_for_prefix(prefix, current)?], local),
                None if current == "any" => return Ok(Resolved::Opaque),
                None => match current_scope {
                    Scope::Service => (vec![Scope::Service, Scope::Common], current),
                    Scope::Common => (vec![Scope::Common], current),
                },
            };

            let mut alias_target = None;
            for candidate in scopes {
                let set = self.type_set(candidate);
                if let Some(def) = set.types.iter().find(|t| t.name == local) {
                    return Ok(Resolved::Struct(candidate, def));
                }
                if let Some(def) = set.enums.iter().find(|e| e.name == local) {
                    return Ok(Resolved::Enum(candidate, def));
                }
                if let Some(target) = set.aliases.get(local) {
                    alias_target = Some((candidate, target.as_str()));
                    break;
                }
            }

            match alias_target {
                Some((alias_scope, target)) => {
                    current_scope = alias_scope;
                    current = target;
                }
                None => return Err(self.error_unknown(reference)),
            }
        }
    }

    fn scope_for_prefix(&self, prefix: &str, name: &str) -> Result<Scope, SchemaError> {
        let namespace = if self.service.prefix.as_deref() == Some(prefix) {
            Some(self.service.namespace.as_str())
        } else {
            self.dictionary.namespaces.get(prefix).map(String::as_str)
        };

        match namespace {
            Some(ns) if ns == self.service.namespace => Ok(Scope::Service),
            Some(ns) if ns == self.dictionary.common.namespace => Ok(Scope::Common),
            _ => Err(SchemaError::UnknownPrefix {
                service: self.service.name.clone(),
                name: name.to_owned(),
            }),
        }
    }

    fn struct_id(&mut self, scope: Scope, def: &'d TypeDefinition) -> Result<TypeId, SchemaError> {
        if let Some(id) = self.ids.get(&(scope, def.name.as_str())) {
            return Ok(*id);
        }

        // Reserve the slot before compiling fields so recursive references resolve to it.
        let id = TypeId(self.types.len());
        self.types.push(None);
        self.ids.insert((scope, def.name.as_str()), id);

        let chain = self.inheritance_chain(scope, def)?;
        let mut fields = Vec::new();
        for (owner_scope, owner) in chain {
            for field in &owner.fields {
                fields.push(self.field(owner_scope, &owner.name, field)?);
            }
        }

        self.types[id.0] = Some(TypeDescriptor {
            name: def.name.clone(),
            namespace: self.type_set(scope).namespace.to_owned(),
            fields,
        });
        Ok(id)
    }

    /// `def` and its ancestors, root ancestor first.
    fn inheritance_chain(
        &self,
        scope: Scope,
        def: &'d TypeDefinition,
    ) -> Result<Vec<(Scope, &'d TypeDefinition)>, SchemaError> {
        let mut chain = vec![(scope, def)];
        let mut seen = HashSet::from([(scope, def.name.as_str())]);

        let (mut current_scope, mut current) = (scope, def);
        while let Some(base) = current.extends.as_deref() {
            let Resolved::Struct(base_scope, base_def) = self.resolve(current_scope, base)? else {
                return Err(self.error_unknown(base));
            };
            if !seen.insert((base_scope, base_def.name.as_str())) {
                return Err(SchemaError::InheritanceCycle {
                    service: self.service.name.clone(),
                    name: def.name.clone(),
                });
            }
            chain.push((base_scope, base_def));
            (current_scope, current) = (base_scope, base_def);
        }

        chain.reverse();
        Ok(chain)
    }

    fn field(
        &mut self,
        scope: Scope,
        owner: &str,
        field: &'d FieldDefinition,
    ) -> Result<FieldDescriptor, SchemaError> {
        let kind = match self.resolve(scope, &field.type_name)? {
            Resolved::Primitive(kind) => FieldKind::Primitive(kind),
            Resolved::Enum(enum_scope, def) => {
                let values = self
                    .enums
                    .entry((enum_scope, def.name.as_str()))
                    .or_insert_with(|| def.values.clone().into())
                    .clone();
                FieldKind::Enum {
                    name: def.name.clone(),
                    values,
                }
            }
            Resolved::Struct(struct_scope, def) => FieldKind::Struct(self.struct_id(struct_scope, def)?),
            Resolved::Opaque => FieldKind::Opaque,
        };

        let cardinality = Cardinality::from(field.occurs);
        let placement = if field.attribute {
            let simple = matches!(kind, FieldKind::Primitive(_) | FieldKind::Enum { .. });
            if !simple || cardinality.is_repeated() {
                return Err(SchemaError::AttributeNotSimple {
                    service: self.service.name.clone(),
                    owner: owner.to_owned(),
                    field: field.name.clone(),
                });
            }
            Placement::Attribute
        } else {
            Placement::Element
        };

        Ok(FieldDescriptor {
            key: field
                .key
                .clone()
                .unwrap_or_else(|| argument_key(&field.name)),
            xml_name: field.name.clone(),
            namespace: self.type_set(scope).namespace.to_owned(),
            cardinality,
            placement,
            kind,
        })
    }

    /// Request and response wrappers are anonymous types in the service namespace.
    fn synthesize(&mut self, name: &str, fields: &'d [FieldDefinition]) -> Result<TypeId, SchemaError> {
        let compiled = fields
            .iter()
            .map(|field| self.field(Scope::Service, name, field))
            .collect::<Result<Vec<_>, _>>()?;

        let id = TypeId(self.types.len());
        self.types.push(Some(TypeDescriptor {
            name: name.to_owned(),
            namespace: self.service.namespace.clone(),
            fields: compiled,
        }));
        Ok(id)
    }
}

struct TypeSetView<'d> {
    types: &'d [TypeDefinition],
    enums: &'d [EnumDefinition],
    aliases: &'d std::collections::BTreeMap<String, String>,
    namespace: &'d str,
}

impl<'d> From<&'d TypeSet> for TypeSetView<'d> {
    fn from(set: &'d TypeSet) -> Self {
        TypeSetView {
            types: &set.types,
            enums: &set.enums,
            aliases: &set.aliases,
            namespace: &set.namespace,
        }
    }
}
