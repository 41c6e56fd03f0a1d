//! Type system for the execution engine.
//!
//! Schemas are assembled in code with [`SchemaBuilder`]; type references are
//! written in GraphQL notation (`"[Task!]!"`) and checked when the schema is
//! built.

use hgql_syntax::{OperationKind, Type};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Names of the built-in scalar types.
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A reference to a type: named, list or non-null.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    /// Creates a named type reference.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Wraps a type in a list.
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    /// Wraps a type in non-null.
    pub fn non_null(inner: Self) -> Self {
        Self::NonNull(Box::new(inner))
    }

    /// Parses GraphQL type notation such as `[ID!]!`.
    pub fn parse(notation: &str) -> Option<Self> {
        let notation = notation.trim();
        if let Some(inner) = notation.strip_suffix('!') {
            return match Self::parse(inner)? {
                Self::NonNull(_) => None,
                inner => Some(Self::non_null(inner)),
            };
        }
        if let Some(inner) = notation.strip_prefix('[') {
            let inner = inner.strip_suffix(']')?;
            return Some(Self::list(Self::parse(inner)?));
        }
        is_valid_name(notation).then(|| Self::named(notation))
    }

    /// Converts a type from a variable definition.
    pub fn from_ast(ty: &Type) -> Self {
        match ty {
            Type::Named(name) => Self::named(name.as_str()),
            Type::List(inner, _) => Self::list(Self::from_ast(inner)),
            Type::NonNull(inner, _) => Self::non_null(Self::from_ast(inner)),
        }
    }

    /// Returns the innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.base_name(),
        }
    }

    /// Returns true if this is a non-null type.
    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// Returns the type with an outer non-null removed.
    pub fn nullable(&self) -> &Self {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Enum,
    InputObject,
}

impl TypeKind {
    /// Object and interface types have fields to select.
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::Object | Self::Interface)
    }

    /// Scalars and enums are selected without subfields.
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Scalar | Self::Enum)
    }

    /// Types usable for arguments and variables.
    pub const fn is_input(self) -> bool {
        matches!(self, Self::Scalar | Self::Enum | Self::InputObject)
    }

    /// Types usable as field results.
    pub const fn is_output(self) -> bool {
        !matches!(self, Self::InputObject)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::InputObject => "input object",
        };
        f.write_str(s)
    }
}

/// An argument or input object field.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

/// A field of an object or interface type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDefinition>,
}

/// A named type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    pub fields: IndexMap<String, FieldDefinition>,
    pub input_fields: IndexMap<String, InputValueDefinition>,
    pub interfaces: Vec<String>,
    pub enum_values: Vec<String>,
}

impl TypeDefinition {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: IndexMap::new(),
            input_fields: IndexMap::new(),
            interfaces: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    /// Finds a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Returns true if this type declares the interface.
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

/// A built schema.
#[derive(Debug, Clone)]
pub struct Schema {
    types: IndexMap<String, TypeDefinition>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Finds a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Returns all named types.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Returns the root type for an operation kind, if the schema has one.
    pub fn root_type(&self, kind: OperationKind) -> Option<&TypeDefinition> {
        let name = match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }?;
        self.get_type(name)
    }

    /// Returns true if an object of type `object_name` can appear where
    /// `abstract_type` is expected.
    pub fn is_possible_type(&self, abstract_type: &TypeDefinition, object_name: &str) -> bool {
        match abstract_type.kind {
            TypeKind::Object => abstract_type.name == object_name,
            TypeKind::Interface => self
                .get_type(object_name)
                .is_some_and(|t| t.kind == TypeKind::Object && t.implements(&abstract_type.name)),
            _ => false,
        }
    }

    /// Returns true if a fragment with `condition` applies to objects of
    /// `object_type`.
    pub fn fragment_applies(&self, object_type: &TypeDefinition, condition: &str) -> bool {
        object_type.name == condition || object_type.implements(condition)
    }

    /// Returns true if the two composite types share at least one possible
    /// object type.
    pub fn types_overlap(&self, a: &TypeDefinition, b: &TypeDefinition) -> bool {
        if a.name == b.name {
            return true;
        }
        self.types
            .values()
            .filter(|t| t.kind == TypeKind::Object)
            .any(|t| self.is_possible_type(a, &t.name) && self.is_possible_type(b, &t.name))
    }
}

/// Error returned when a schema definition is inconsistent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid schema: {}", .errors.join("; "))]
pub struct SchemaError {
    pub errors: Vec<String>,
}

/// Builder for [`Schema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDefinition>,
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    errors: Vec<String>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a builder holding the built-in scalars.
    pub fn new() -> Self {
        let mut builder = Self {
            types: IndexMap::new(),
            query_type: None,
            mutation_type: None,
            subscription_type: None,
            errors: Vec::new(),
        };
        for scalar in BUILTIN_SCALARS {
            builder.add(TypeDefinition::new(scalar, TypeKind::Scalar), Vec::new());
        }
        builder
    }

    fn add(&mut self, definition: TypeDefinition, errors: Vec<String>) {
        self.errors.extend(errors);
        if self.types.contains_key(&definition.name) {
            self.errors
                .push(format!("Type \"{}\" is defined more than once", definition.name));
            return;
        }
        self.types.insert(definition.name.clone(), definition);
    }

    fn typed(
        mut self,
        name: &str,
        kind: TypeKind,
        build: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        let builder = build(TypeBuilder::new(TypeDefinition::new(name, kind)));
        self.add(builder.definition, builder.errors);
        self
    }

    /// Adds a custom scalar. Values of custom scalars pass through unchanged.
    #[must_use]
    pub fn scalar(mut self, name: &str) -> Self {
        self.add(TypeDefinition::new(name, TypeKind::Scalar), Vec::new());
        self
    }

    /// Adds an enum type.
    #[must_use]
    pub fn enum_type(mut self, name: &str, values: &[&str]) -> Self {
        let mut definition = TypeDefinition::new(name, TypeKind::Enum);
        definition.enum_values = values.iter().map(|v| (*v).to_string()).collect();
        self.add(definition, Vec::new());
        self
    }

    /// Adds an object type.
    #[must_use]
    pub fn object(self, name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.typed(name, TypeKind::Object, build)
    }

    /// Adds an interface type.
    #[must_use]
    pub fn interface(self, name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.typed(name, TypeKind::Interface, build)
    }

    /// Adds an input object type.
    #[must_use]
    pub fn input_object(self, name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.typed(name, TypeKind::InputObject, build)
    }

    /// Sets the query root type. Defaults to `Query`.
    #[must_use]
    pub fn query(mut self, name: &str) -> Self {
        self.query_type = Some(name.to_string());
        self
    }

    /// Sets the mutation root type. Defaults to `Mutation` when defined.
    #[must_use]
    pub fn mutation(mut self, name: &str) -> Self {
        self.mutation_type = Some(name.to_string());
        self
    }

    /// Sets the subscription root type. Defaults to `Subscription` when
    /// defined.
    #[must_use]
    pub fn subscription(mut self, name: &str) -> Self {
        self.subscription_type = Some(name.to_string());
        self
    }

    /// Checks every type reference and builds the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut errors = self.errors;
        let types = self.types;

        let default_root = |explicit: Option<String>, name: &str| {
            explicit.or_else(|| types.contains_key(name).then(|| name.to_string()))
        };
        let query_type = self.query_type.unwrap_or_else(|| "Query".to_string());
        let mutation_type = default_root(self.mutation_type, "Mutation");
        let subscription_type = default_root(self.subscription_type, "Subscription");

        for root in std::iter::once(&query_type)
            .chain(mutation_type.as_ref())
            .chain(subscription_type.as_ref())
        {
            match types.get(root) {
                Some(t) if t.kind == TypeKind::Object => {}
                Some(_) => errors.push(format!("Root type \"{root}\" must be an object type")),
                None => errors.push(format!("Root type \"{root}\" is not defined")),
            }
        }

        let check_ref = |errors: &mut Vec<String>, owner: &str, ty: &TypeRef, input: bool| {
            match types.get(ty.base_name()) {
                None => errors.push(format!("{owner} refers to unknown type \"{ty}\"")),
                Some(t) if input && !t.kind.is_input() => {
                    errors.push(format!("{owner} must have an input type, found \"{ty}\""));
                }
                Some(t) if !input && !t.kind.is_output() => {
                    errors.push(format!("{owner} must have an output type, found \"{ty}\""));
                }
                Some(_) => {}
            }
        };

        for definition in types.values() {
            for field in definition.fields.values() {
                let owner = format!("{}.{}", definition.name, field.name);
                check_ref(&mut errors, &owner, &field.ty, false);
                for arg in field.arguments.values() {
                    check_ref(&mut errors, &format!("{owner}({})", arg.name), &arg.ty, true);
                }
            }
            for input in definition.input_fields.values() {
                let owner = format!("{}.{}", definition.name, input.name);
                check_ref(&mut errors, &owner, &input.ty, true);
            }
            for interface in &definition.interfaces {
                match types.get(interface) {
                    Some(i) if i.kind == TypeKind::Interface => {
                        for name in i.fields.keys() {
                            if !definition.fields.contains_key(name) {
                                errors.push(format!(
                                    "{} must define field \"{name}\" of interface \"{interface}\"",
                                    definition.name
                                ));
                            }
                        }
                    }
                    _ => errors.push(format!(
                        "{} implements \"{interface}\" which is not an interface",
                        definition.name
                    )),
                }
            }
        }

        if !errors.is_empty() {
            return Err(SchemaError { errors });
        }

        Ok(Schema {
            types,
            query_type,
            mutation_type,
            subscription_type,
        })
    }
}

/// Builder for the fields of one type.
#[derive(Debug)]
pub struct TypeBuilder {
    definition: TypeDefinition,
    errors: Vec<String>,
}

impl TypeBuilder {
    fn new(definition: TypeDefinition) -> Self {
        Self {
            definition,
            errors: Vec::new(),
        }
    }

    fn type_ref(&mut self, owner: &str, notation: &str) -> TypeRef {
        TypeRef::parse(notation).unwrap_or_else(|| {
            self.errors.push(format!(
                "{}.{owner} has an invalid type \"{notation}\"",
                self.definition.name
            ));
            TypeRef::named(notation)
        })
    }

    /// Declares that this type implements an interface.
    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.definition.interfaces.push(interface.to_string());
        self
    }

    /// Adds a field without arguments.
    #[must_use]
    pub fn field(self, name: &str, ty: &str) -> Self {
        self.field_with(name, ty, |f| f)
    }

    /// Adds a field and declares its arguments.
    #[must_use]
    pub fn field_with(
        mut self,
        name: &str,
        ty: &str,
        build: impl FnOnce(FieldBuilder) -> FieldBuilder,
    ) -> Self {
        let ty = self.type_ref(name, ty);
        let builder = build(FieldBuilder {
            definition: FieldDefinition {
                name: name.to_string(),
                ty,
                arguments: IndexMap::new(),
            },
            errors: Vec::new(),
        });
        self.errors.extend(builder.errors);
        self.definition
            .fields
            .insert(name.to_string(), builder.definition);
        self
    }

    /// Adds an input object field.
    #[must_use]
    pub fn input_field(self, name: &str, ty: &str) -> Self {
        self.input_field_inner(name, ty, None)
    }

    /// Adds an input object field with a default value.
    #[must_use]
    pub fn input_field_with_default(self, name: &str, ty: &str, default: Value) -> Self {
        self.input_field_inner(name, ty, Some(default))
    }

    fn input_field_inner(mut self, name: &str, ty: &str, default_value: Option<Value>) -> Self {
        let ty = self.type_ref(name, ty);
        self.definition.input_fields.insert(
            name.to_string(),
            InputValueDefinition {
                name: name.to_string(),
                ty,
                default_value,
            },
        );
        self
    }
}

/// Builder for the arguments of one field.
#[derive(Debug)]
pub struct FieldBuilder {
    definition: FieldDefinition,
    errors: Vec<String>,
}

impl FieldBuilder {
    /// Adds an argument.
    #[must_use]
    pub fn argument(self, name: &str, ty: &str) -> Self {
        self.argument_inner(name, ty, None)
    }

    /// Adds an argument with a default value.
    #[must_use]
    pub fn argument_with_default(self, name: &str, ty: &str, default: Value) -> Self {
        self.argument_inner(name, ty, Some(default))
    }

    fn argument_inner(mut self, name: &str, ty: &str, default_value: Option<Value>) -> Self {
        let ty = TypeRef::parse(ty).unwrap_or_else(|| {
            self.errors.push(format!(
                "{}({name}) has an invalid type \"{ty}\"",
                self.definition.name
            ));
            TypeRef::named(ty)
        });
        self.definition.arguments.insert(
            name.to_string(),
            InputValueDefinition {
                name: name.to_string(),
                ty,
                default_value,
            },
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<Schema, SchemaError> {
        Schema::builder()
            .interface("Node", |t| t.field("id", "ID!"))
            .object("Task", |t| {
                t.implements("Node")
                    .field("id", "ID!")
                    .field("title", "String")
            })
            .object("Query", |t| {
                t.field("tasks", "[Task!]!")
                    .field_with("node", "Node", |f| f.argument("id", "ID!"))
            })
            .build()
    }

    #[test]
    fn test_type_ref_parse() {
        let ty = TypeRef::parse("[Task!]!").unwrap();
        assert_eq!(ty.to_string(), "[Task!]!");
        assert_eq!(ty.base_name(), "Task");
        assert!(ty.is_non_null());
        assert_eq!(ty.nullable().to_string(), "[Task!]");

        assert!(TypeRef::parse("Task!!").is_none());
        assert!(TypeRef::parse("[Task").is_none());
        assert!(TypeRef::parse("1Task").is_none());
    }

    #[test]
    fn test_build_sample_schema() {
        let schema = sample().unwrap();
        let query = schema.root_type(OperationKind::Query).unwrap();
        assert_eq!(query.name, "Query");
        assert!(schema.root_type(OperationKind::Mutation).is_none());

        let node = schema.get_type("Node").unwrap();
        assert!(schema.is_possible_type(node, "Task"));
        assert!(!schema.is_possible_type(node, "Query"));
    }

    #[test]
    fn test_build_reports_unknown_types() {
        let error = Schema::builder()
            .object("Query", |t| t.field("missing", "Missing"))
            .build()
            .unwrap_err();
        assert_eq!(error.errors, vec!["Query.missing refers to unknown type \"Missing\""]);
    }

    #[test]
    fn test_build_reports_missing_interface_fields() {
        let error = Schema::builder()
            .interface("Node", |t| t.field("id", "ID!"))
            .object("Query", |t| t.implements("Node").field("name", "String"))
            .build()
            .unwrap_err();
        assert_eq!(
            error.errors,
            vec!["Query must define field \"id\" of interface \"Node\""]
        );
    }

    #[test]
    fn test_build_rejects_input_type_as_output() {
        let error = Schema::builder()
            .input_object("Filter", |t| t.input_field("id", "ID"))
            .object("Query", |t| t.field("filter", "Filter"))
            .build()
            .unwrap_err();
        assert_eq!(error.errors.len(), 1);
    }
}
