//! Input coercion for variables and field arguments.

use crate::error::GraphQLError;
use crate::schema::{InputValueDefinition, Schema, TypeKind, TypeRef};
use hgql_syntax::{Argument, Document, OperationDefinition, Value as AstValue};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

/// Coerces the raw variables of a request against the operation's variable
/// definitions, applying defaults.
pub fn coerce_variable_values(
    schema: &Schema,
    document: &Document,
    operation: &OperationDefinition,
    inputs: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<GraphQLError>> {
    let mut coerced = Map::new();
    let mut errors = Vec::new();

    for definition in &operation.variables {
        let name = definition.name.as_str();
        let ty = TypeRef::from_ast(&definition.ty);

        let result = match (inputs.get(name), &definition.default_value) {
            (Some(value), _) => coerce_input(schema, value, &ty)
                .map(Some)
                .map_err(|reason| format!("Variable \"${name}\" got invalid value {value}; {reason}")),
            (None, Some(default)) => value_from_ast(schema, default, &ty, &Map::new())
                .map(Some)
                .map_err(|reason| format!("Variable \"${name}\" has invalid default value; {reason}")),
            (None, None) if ty.is_non_null() => Err(format!(
                "Variable \"${name}\" of required type \"{ty}\" was not provided."
            )),
            (None, None) => Ok(None),
        };

        match result {
            Ok(Some(value)) => {
                coerced.insert(name.to_string(), value);
            }
            Ok(None) => {}
            Err(message) => errors.push(GraphQLError::new(message).at(document, definition.span)),
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}

/// Coerces the arguments of a field or directive against their definitions.
pub fn coerce_argument_values(
    schema: &Schema,
    definitions: &IndexMap<String, InputValueDefinition>,
    arguments: &[Argument],
    variables: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut coerced = Map::new();

    for definition in definitions.values() {
        // An argument bound to an unset variable counts as not provided.
        let provided = arguments
            .iter()
            .find(|a| a.name.as_str() == definition.name)
            .filter(|a| match &a.value {
                AstValue::Variable(v) => variables.contains_key(v.as_str()),
                _ => true,
            });

        match provided {
            Some(argument) => {
                let value = value_from_ast(schema, &argument.value, &definition.ty, variables)
                    .map_err(|reason| {
                        format!("Argument \"{}\" has invalid value: {reason}", definition.name)
                    })?;
                coerced.insert(definition.name.clone(), value);
            }
            None => {
                if let Some(default) = &definition.default_value {
                    coerced.insert(definition.name.clone(), default.clone());
                } else if definition.ty.is_non_null() {
                    return Err(format!(
                        "Argument \"{}\" of required type \"{}\" was not provided.",
                        definition.name, definition.ty
                    ));
                }
            }
        }
    }

    Ok(coerced)
}

/// Coerces a literal from the document, substituting variables.
pub fn value_from_ast(
    schema: &Schema,
    value: &AstValue,
    ty: &TypeRef,
    variables: &Map<String, Value>,
) -> Result<Value, String> {
    coerce_input(schema, &ast_to_json(value, variables), ty)
}

/// Converts a literal to JSON. Unset variables become null.
pub fn ast_to_json(value: &AstValue, variables: &Map<String, Value>) -> Value {
    match value {
        AstValue::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Value::Null),
        AstValue::Int(i, _) => Value::Number((*i).into()),
        AstValue::Float(f, _) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        AstValue::String(s, _) => Value::String(s.clone()),
        AstValue::Boolean(b, _) => Value::Bool(*b),
        AstValue::Null(_) => Value::Null,
        AstValue::Enum(name) => Value::String(name.value.clone()),
        AstValue::List(items, _) => {
            Value::Array(items.iter().map(|v| ast_to_json(v, variables)).collect())
        }
        AstValue::Object(fields, _) => Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.value.clone(), ast_to_json(v, variables)))
                .collect(),
        ),
    }
}

/// Coerces a JSON input value to a type.
pub fn coerce_input(schema: &Schema, value: &Value, ty: &TypeRef) -> Result<Value, String> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                Err(format!("Expected non-nullable type \"{ty}\" not to be null."))
            } else {
                coerce_input(schema, value, inner)
            }
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input(schema, item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_input(schema, single, inner)?])),
        },
        TypeRef::Named(name) => {
            let Some(definition) = schema.get_type(name) else {
                return Err(format!("Unknown type \"{name}\"."));
            };
            match definition.kind {
                TypeKind::Scalar => coerce_scalar(name, value),
                TypeKind::Enum => match value {
                    Value::String(s) if definition.enum_values.contains(s) => Ok(value.clone()),
                    _ => Err(format!("Value {value} does not exist in \"{name}\" enum.")),
                },
                TypeKind::InputObject => {
                    let Value::Object(fields) = value else {
                        return Err(format!("Expected type \"{name}\" to be an object."));
                    };
                    if let Some(unknown) = fields
                        .keys()
                        .find(|key| !definition.input_fields.contains_key(*key))
                    {
                        return Err(format!(
                            "Field \"{unknown}\" is not defined by type \"{name}\"."
                        ));
                    }

                    let mut coerced = Map::new();
                    for field in definition.input_fields.values() {
                        match fields.get(&field.name) {
                            Some(v) => {
                                let v = coerce_input(schema, v, &field.ty)
                                    .map_err(|e| format!("In field \"{}\": {e}", field.name))?;
                                coerced.insert(field.name.clone(), v);
                            }
                            None => {
                                if let Some(default) = &field.default_value {
                                    coerced.insert(field.name.clone(), default.clone());
                                } else if field.ty.is_non_null() {
                                    return Err(format!(
                                        "Field \"{name}.{}\" of required type \"{}\" was not provided.",
                                        field.name, field.ty
                                    ));
                                }
                            }
                        }
                    }
                    Ok(Value::Object(coerced))
                }
                TypeKind::Object | TypeKind::Interface => {
                    Err(format!("Type \"{name}\" is not an input type."))
                }
            }
        }
    }
}

fn coerce_scalar(name: &str, value: &Value) -> Result<Value, String> {
    match name {
        "Int" => as_int(value)
            .map(|i| Value::Number(i.into()))
            .ok_or_else(|| format!("Int cannot represent non-integer value: {value}")),
        "Float" => match value {
            Value::Number(_) => Ok(value.clone()),
            _ => Err(format!("Float cannot represent non numeric value: {value}")),
        },
        "String" => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(format!("String cannot represent a non string value: {value}")),
        },
        "Boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(format!("Boolean cannot represent a non boolean value: {value}")),
        },
        "ID" => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::String(n.to_string())),
            _ => Err(format!("ID cannot represent value: {value}")),
        },
        _ => Ok(value.clone()),
    }
}

/// Reads a 32-bit integer, accepting integral floats.
pub(crate) fn as_int(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .filter(|f| *f >= f64::from(i32::MIN) && *f <= f64::from(i32::MAX))
                    .map(|f| f as i32)
            }),
        _ => None,
    }
}
