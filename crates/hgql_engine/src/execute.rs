//! Selection set execution.
//!
//! Execution is synchronous and runs on the caller's thread. Field errors
//! are collected and the field is nulled; a null in a non-null position
//! propagates to the nearest nullable parent.

use crate::coerce::{as_int, ast_to_json, coerce_argument_values};
use crate::error::{GraphQLError, PathSegment};
use crate::executor::Executor;
use crate::resolver::{FieldContext, ObjectValue, Resolved, ResolverError, ResolverResult};
use crate::response::Response;
use crate::schema::{Schema, TypeDefinition, TypeKind, TypeRef};
use hgql_syntax::{Directive, Document, Field, OperationDefinition, Selection, SelectionSet};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};

/// Fields grouped by response key, in selection order.
pub(crate) type GroupedFields<'a> = IndexMap<&'a str, Vec<&'a Field>>;

/// A null in a non-null position, bubbling up to a nullable parent.
struct NullPropagation;

/// State of one operation execution.
pub(crate) struct Execution<'a> {
    executor: &'a Executor,
    schema: &'a Schema,
    document: &'a Document,
    variables: &'a Map<String, Value>,
    errors: Vec<GraphQLError>,
}

impl<'a> Execution<'a> {
    pub(crate) fn new(
        executor: &'a Executor,
        document: &'a Document,
        variables: &'a Map<String, Value>,
    ) -> Self {
        Self {
            executor,
            schema: executor.schema(),
            document,
            variables,
            errors: Vec::new(),
        }
    }

    /// Executes an operation against a root object.
    pub(crate) fn execute_operation(
        mut self,
        operation: &'a OperationDefinition,
        root_type: &'a TypeDefinition,
        root: &ObjectValue,
    ) -> Response {
        let mut path = Vec::new();
        let data = match self.execute_selection_set(
            root_type,
            &[&operation.selection_set],
            root,
            &mut path,
        ) {
            Ok(fields) => Value::Object(fields),
            Err(NullPropagation) => Value::Null,
        };
        Response {
            data: Some(data),
            errors: self.errors,
        }
    }

    /// Collects the root fields of an operation, honoring `@skip` and
    /// `@include`.
    pub(crate) fn root_fields(
        &self,
        root_type: &TypeDefinition,
        operation: &'a OperationDefinition,
    ) -> GroupedFields<'a> {
        let mut fields = GroupedFields::new();
        let mut visited = FxHashSet::default();
        self.collect_fields(root_type, &operation.selection_set, &mut fields, &mut visited);
        fields
    }

    fn collect_fields(
        &self,
        object_type: &TypeDefinition,
        selection_set: &'a SelectionSet,
        fields: &mut GroupedFields<'a>,
        visited: &mut FxHashSet<&'a str>,
    ) {
        for selection in &selection_set.selections {
            if !self.should_include(selection.directives()) {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    fields.entry(field.response_key()).or_default().push(field);
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    if !visited.insert(name) {
                        continue;
                    }
                    let Some(fragment) = self.document.fragment(name) else {
                        continue;
                    };
                    if self
                        .schema
                        .fragment_applies(object_type, fragment.type_condition.as_str())
                    {
                        self.collect_fields(object_type, &fragment.selection_set, fields, visited);
                    }
                }
                Selection::InlineFragment(inline) => {
                    let applies = inline.type_condition.as_ref().map_or(true, |condition| {
                        self.schema.fragment_applies(object_type, condition.as_str())
                    });
                    if applies {
                        self.collect_fields(object_type, &inline.selection_set, fields, visited);
                    }
                }
            }
        }
    }

    fn should_include(&self, directives: &[Directive]) -> bool {
        let condition = |name: &str| {
            directives
                .iter()
                .find(|d| d.name.as_str() == name)
                .and_then(|d| d.arguments.iter().find(|a| a.name.as_str() == "if"))
                .and_then(|a| ast_to_json(&a.value, self.variables).as_bool())
        };
        condition("skip") != Some(true) && condition("include") != Some(false)
    }

    fn execute_selection_set(
        &mut self,
        object_type: &'a TypeDefinition,
        selection_sets: &[&'a SelectionSet],
        parent: &ObjectValue,
        path: &mut Vec<PathSegment>,
    ) -> Result<Map<String, Value>, NullPropagation> {
        let mut grouped = GroupedFields::new();
        let mut visited = FxHashSet::default();
        for selection_set in selection_sets {
            self.collect_fields(object_type, selection_set, &mut grouped, &mut visited);
        }

        let mut result = Map::new();
        for (key, fields) in grouped {
            path.push(PathSegment::Field(key.to_string()));
            let value = self.execute_field(object_type, parent, &fields, path);
            path.pop();
            result.insert(key.to_string(), value?);
        }
        Ok(result)
    }

    fn execute_field(
        &mut self,
        object_type: &'a TypeDefinition,
        parent: &ObjectValue,
        fields: &[&'a Field],
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, NullPropagation> {
        let Some(field) = fields.first() else {
            return Ok(Value::Null);
        };
        let name = field.name.as_str();
        if name == "__typename" {
            return Ok(Value::String(object_type.name.clone()));
        }
        let Some(definition) = object_type.field(name) else {
            return Ok(Value::Null);
        };

        let resolved = coerce_argument_values(
            self.schema,
            &definition.arguments,
            &field.arguments,
            self.variables,
        )
        .map_err(ResolverError::Custom)
        .and_then(|args| self.resolve_field(object_type, parent, name, &args));

        let resolved = resolved.unwrap_or_else(|error| {
            self.field_error(error.to_string(), field, path);
            Resolved::Null
        });

        let owner = format!("{}.{}", object_type.name, name);
        self.complete_value(&definition.ty, &owner, fields, resolved, path)
    }

    fn resolve_field(
        &self,
        object_type: &TypeDefinition,
        parent: &ObjectValue,
        name: &str,
        args: &Map<String, Value>,
    ) -> ResolverResult {
        match self.executor.resolvers().get(&object_type.name, name) {
            Some(resolver) => (**resolver)(&FieldContext {
                parent,
                field_name: name,
                args,
                executor: self.executor,
            }),
            None => Ok(parent.property(name).cloned().into()),
        }
    }

    fn complete_value(
        &mut self,
        ty: &TypeRef,
        owner: &str,
        fields: &[&'a Field],
        resolved: Resolved,
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, NullPropagation> {
        let TypeRef::NonNull(inner) = ty else {
            return Ok(self
                .complete_inner(ty, owner, fields, resolved, path)
                .unwrap_or(Value::Null));
        };

        let value = self.complete_inner(inner, owner, fields, resolved, path)?;
        if value.is_null() {
            if !self.has_error_at(path) {
                if let Some(field) = fields.first() {
                    self.field_error(
                        format!("Cannot return null for non-nullable field {owner}."),
                        field,
                        path,
                    );
                }
            }
            return Err(NullPropagation);
        }
        Ok(value)
    }

    fn complete_inner(
        &mut self,
        ty: &TypeRef,
        owner: &str,
        fields: &[&'a Field],
        resolved: Resolved,
        path: &mut Vec<PathSegment>,
    ) -> Result<Value, NullPropagation> {
        if resolved.is_null() {
            return Ok(Value::Null);
        }
        let Some(field) = fields.first().copied() else {
            return Ok(Value::Null);
        };

        match ty {
            TypeRef::NonNull(_) => self.complete_value(ty, owner, fields, resolved, path),
            TypeRef::List(item_type) => {
                let items = match resolved {
                    Resolved::List(items) => items,
                    Resolved::Value(Value::Array(values)) => {
                        values.into_iter().map(Resolved::Value).collect()
                    }
                    _ => {
                        self.field_error(
                            format!("Expected a list value for field {owner}."),
                            field,
                            path,
                        );
                        return Ok(Value::Null);
                    }
                };

                let mut completed = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    let value = self.complete_value(item_type, owner, fields, item, path);
                    path.pop();
                    completed.push(value?);
                }
                Ok(Value::Array(completed))
            }
            TypeRef::Named(name) => {
                let schema = self.schema;
                let Some(definition) = schema.get_type(name) else {
                    return Ok(Value::Null);
                };
                if definition.kind.is_leaf() {
                    return Ok(self.complete_leaf(definition, owner, field, resolved, path));
                }

                let object = match resolved {
                    Resolved::Object(object) => object,
                    Resolved::Value(value @ Value::Object(_)) => {
                        let type_name = if definition.kind == TypeKind::Object {
                            definition.name.clone()
                        } else {
                            value
                                .get("__typename")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string()
                        };
                        ObjectValue::new(type_name, value)
                    }
                    _ => {
                        self.field_error(
                            format!("Expected an object value for field {owner}."),
                            field,
                            path,
                        );
                        return Ok(Value::Null);
                    }
                };

                let runtime_type = schema.get_type(object.type_name()).filter(|t| {
                    t.kind == TypeKind::Object && schema.is_possible_type(definition, &t.name)
                });
                let Some(runtime_type) = runtime_type else {
                    self.field_error(
                        format!(
                            "Runtime object type \"{}\" is not a possible type for \"{name}\".",
                            object.type_name()
                        ),
                        field,
                        path,
                    );
                    return Ok(Value::Null);
                };

                let selection_sets: Vec<&'a SelectionSet> = fields
                    .iter()
                    .filter_map(|f| f.selection_set.as_ref())
                    .collect();
                self.execute_selection_set(runtime_type, &selection_sets, &object, path)
                    .map(Value::Object)
            }
        }
    }

    fn complete_leaf(
        &mut self,
        definition: &TypeDefinition,
        owner: &str,
        field: &Field,
        resolved: Resolved,
        path: &[PathSegment],
    ) -> Value {
        let Resolved::Value(value) = resolved else {
            self.field_error(format!("Expected a leaf value for field {owner}."), field, path);
            return Value::Null;
        };

        let serialized = match definition.kind {
            TypeKind::Enum => match &value {
                Value::String(s) if definition.enum_values.contains(s) => Ok(value),
                _ => Err(format!(
                    "Enum \"{}\" cannot represent value: {value}",
                    definition.name
                )),
            },
            _ => serialize_scalar(&definition.name, value),
        };

        serialized.unwrap_or_else(|message| {
            self.field_error(message, field, path);
            Value::Null
        })
    }

    fn has_error_at(&self, path: &[PathSegment]) -> bool {
        self.errors.last().is_some_and(|e| e.path == path)
    }

    fn field_error(&mut self, message: String, field: &Field, path: &[PathSegment]) {
        self.errors.push(
            GraphQLError::new(message)
                .at(self.document, field.span)
                .with_path(path.to_vec()),
        );
    }
}

/// Serializes a resolved leaf value as a scalar of the given type.
fn serialize_scalar(name: &str, value: Value) -> Result<Value, String> {
    match name {
        "Int" => as_int(&value)
            .map(|i| Value::Number(i.into()))
            .ok_or_else(|| format!("Int cannot represent non-integer value: {value}")),
        "Float" => match value {
            Value::Number(_) => Ok(value),
            _ => Err(format!("Float cannot represent non numeric value: {value}")),
        },
        "String" => match value {
            Value::String(_) => Ok(value),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(format!("String cannot represent value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
        },
        "ID" => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        _ => Ok(value),
    }
}
