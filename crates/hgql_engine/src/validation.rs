//! Document validation against a schema.
//!
//! Covers the rules needed to execute safely: field and argument existence,
//! leaf and composite selections, fragment names, type conditions and
//! cycles, operation naming, single root field subscriptions, variable
//! definitions and usage, plus a selection depth limit.

use crate::coerce::{ast_to_json, coerce_input};
use crate::error::GraphQLError;
use crate::schema::{Schema, TypeDefinition, TypeRef};
use hgql_core::Span;
use hgql_syntax::{
    Argument, Directive, Document, FragmentDefinition, Name, OperationDefinition, OperationKind,
    Selection, SelectionSet,
};
use rustc_hash::FxHashSet;
use serde_json::Map;

/// Directives the executor understands.
const KNOWN_DIRECTIVES: [&str; 2] = ["skip", "include"];

/// Validates a document and returns every error found.
pub fn validate(schema: &Schema, document: &Document, max_depth: usize) -> Vec<GraphQLError> {
    let mut validator = Validator {
        schema,
        document,
        max_depth,
        errors: Vec::new(),
    };
    validator.check_operation_names();
    validator.check_fragments();
    for operation in document.operations() {
        validator.check_operation(operation);
    }
    validator.errors
}

struct Validator<'a> {
    schema: &'a Schema,
    document: &'a Document,
    max_depth: usize,
    errors: Vec<GraphQLError>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, message: String, span: Span) {
        self.errors
            .push(GraphQLError::new(message).at(self.document, span));
    }

    fn check_operation_names(&mut self) {
        let operations: Vec<&OperationDefinition> = self.document.operations().collect();
        let mut seen = FxHashSet::default();

        for operation in &operations {
            match &operation.name {
                Some(name) => {
                    if !seen.insert(name.as_str()) {
                        self.error(
                            format!("There can be only one operation named \"{name}\"."),
                            name.span,
                        );
                    }
                }
                None if operations.len() > 1 => self.error(
                    "This anonymous operation must be the only defined operation.".to_string(),
                    operation.span,
                ),
                None => {}
            }
        }
    }

    fn check_fragments(&mut self) {
        let mut seen = FxHashSet::default();
        let fragments: Vec<&'a FragmentDefinition> = self.document.fragments().collect();

        for fragment in &fragments {
            if !seen.insert(fragment.name.as_str()) {
                self.error(
                    format!("There can be only one fragment named \"{}\".", fragment.name),
                    fragment.name.span,
                );
            }
            if let Some(ty) = self.composite_condition(&fragment.type_condition) {
                self.check_directives(&fragment.directives);
                self.check_selection_set(&fragment.selection_set, ty);
            }
        }

        for fragment in &fragments {
            if self.spreads_into_itself(fragment) {
                self.error(
                    format!("Cannot spread fragment \"{}\" within itself.", fragment.name),
                    fragment.span,
                );
            }
        }
    }

    /// Resolves a type condition, reporting unknown or non composite types.
    fn composite_condition(&mut self, condition: &Name) -> Option<&'a TypeDefinition> {
        match self.schema.get_type(condition.as_str()) {
            Some(ty) if ty.kind.is_composite() => Some(ty),
            Some(_) => {
                self.error(
                    format!("Fragment cannot condition on non composite type \"{condition}\"."),
                    condition.span,
                );
                None
            }
            None => {
                self.error(format!("Unknown type \"{condition}\"."), condition.span);
                None
            }
        }
    }

    fn spreads_into_itself(&self, fragment: &FragmentDefinition) -> bool {
        let target = fragment.name.as_str();
        let mut visited = FxHashSet::default();
        let mut stack = Vec::new();
        collect_spreads(&fragment.selection_set, &mut stack);

        while let Some(name) = stack.pop() {
            if name == target {
                return true;
            }
            if visited.insert(name) {
                if let Some(next) = self.document.fragment(name) {
                    collect_spreads(&next.selection_set, &mut stack);
                }
            }
        }
        false
    }

    fn check_directives(&mut self, directives: &[Directive]) {
        for directive in directives {
            if !KNOWN_DIRECTIVES.contains(&directive.name.as_str()) {
                self.error(
                    format!("Unknown directive \"@{}\".", directive.name),
                    directive.span,
                );
            } else if !directive.arguments.iter().any(|a| a.name.as_str() == "if") {
                self.error(
                    format!(
                        "Directive \"@{}\" argument \"if\" of type \"Boolean!\" is required, but it was not provided.",
                        directive.name
                    ),
                    directive.span,
                );
            }
        }
    }

    fn check_selection_set(&mut self, selection_set: &SelectionSet, parent: &'a TypeDefinition) {
        for selection in &selection_set.selections {
            self.check_directives(selection.directives());

            match selection {
                Selection::Field(field) => {
                    let name = field.name.as_str();
                    if name == "__typename" {
                        if field.selection_set.is_some() {
                            self.error(
                                "Field \"__typename\" must not have a selection since type \"String!\" has no subfields.".to_string(),
                                field.span,
                            );
                        }
                        continue;
                    }

                    let Some(definition) = parent.field(name) else {
                        self.error(
                            format!("Cannot query field \"{name}\" on type \"{}\".", parent.name),
                            field.name.span,
                        );
                        continue;
                    };

                    self.check_arguments(
                        &format!("{}.{name}", parent.name),
                        definition,
                        &field.arguments,
                        field.span,
                    );

                    let Some(field_type) = self.schema.get_type(definition.ty.base_name()) else {
                        continue;
                    };
                    match (&field.selection_set, field_type.kind.is_leaf()) {
                        (Some(_), true) => self.error(
                            format!(
                                "Field \"{name}\" must not have a selection since type \"{}\" has no subfields.",
                                definition.ty
                            ),
                            field.span,
                        ),
                        (None, false) => self.error(
                            format!(
                                "Field \"{name}\" of type \"{}\" must have a selection of subfields. Did you mean \"{name} {{ ... }}\"?",
                                definition.ty
                            ),
                            field.span,
                        ),
                        (Some(selection_set), false) => {
                            self.check_selection_set(selection_set, field_type);
                        }
                        (None, true) => {}
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(fragment) = self.document.fragment(spread.name.as_str()) else {
                        self.error(
                            format!("Unknown fragment \"{}\".", spread.name),
                            spread.name.span,
                        );
                        continue;
                    };
                    if let Some(condition) = self.schema.get_type(fragment.type_condition.as_str()) {
                        if condition.kind.is_composite() && !self.schema.types_overlap(parent, condition) {
                            self.error(
                                format!(
                                    "Fragment \"{}\" cannot be spread here as objects of type \"{}\" can never be of type \"{}\".",
                                    spread.name, parent.name, condition.name
                                ),
                                spread.span,
                            );
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    let ty = match &inline.type_condition {
                        None => parent,
                        Some(condition) => {
                            let Some(ty) = self.composite_condition(condition) else {
                                continue;
                            };
                            if !self.schema.types_overlap(parent, ty) {
                                self.error(
                                    format!(
                                        "Fragment cannot be spread here as objects of type \"{}\" can never be of type \"{}\".",
                                        parent.name, ty.name
                                    ),
                                    inline.span,
                                );
                                continue;
                            }
                            ty
                        }
                    };
                    self.check_selection_set(&inline.selection_set, ty);
                }
            }
        }
    }

    fn check_arguments(
        &mut self,
        owner: &str,
        definition: &crate::schema::FieldDefinition,
        arguments: &[Argument],
        span: Span,
    ) {
        let mut seen = FxHashSet::default();
        for argument in arguments {
            let name = argument.name.as_str();
            if !seen.insert(name) {
                self.error(
                    format!("There can be only one argument named \"{name}\"."),
                    argument.span,
                );
            }
            let Some(argument_definition) = definition.arguments.get(name) else {
                self.error(
                    format!("Unknown argument \"{name}\" on field \"{owner}\"."),
                    argument.span,
                );
                continue;
            };

            // Literals without variables can be checked up front.
            let mut has_variables = false;
            argument.value.for_each_variable(&mut |_| has_variables = true);
            if !has_variables {
                let value = ast_to_json(&argument.value, &Map::new());
                if let Err(reason) = coerce_input(self.schema, &value, &argument_definition.ty) {
                    self.error(
                        format!("Argument \"{name}\" has invalid value {value}: {reason}"),
                        argument.value.span(),
                    );
                }
            }
        }

        for argument_definition in definition.arguments.values() {
            let required =
                argument_definition.ty.is_non_null() && argument_definition.default_value.is_none();
            if required && !seen.contains(argument_definition.name.as_str()) {
                self.error(
                    format!(
                        "Field \"{owner}\" argument \"{}\" of type \"{}\" is required, but it was not provided.",
                        argument_definition.name, argument_definition.ty
                    ),
                    span,
                );
            }
        }
    }

    fn check_operation(&mut self, operation: &'a OperationDefinition) {
        let Some(root_type) = self.schema.root_type(operation.kind) else {
            self.error(
                format!("Schema is not configured to execute {} operation.", operation.kind),
                operation.span,
            );
            return;
        };

        self.check_directives(&operation.directives);
        self.check_variable_definitions(operation);
        self.check_selection_set(&operation.selection_set, root_type);

        if operation.kind == OperationKind::Subscription {
            let mut visited = FxHashSet::default();
            let count = self.count_root_fields(&operation.selection_set, &mut visited);
            if count != 1 {
                let message = match &operation.name {
                    Some(name) => {
                        format!("Subscription \"{name}\" must select only one top level field.")
                    }
                    None => "Anonymous Subscription must select only one top level field.".to_string(),
                };
                self.error(message, operation.selection_set.span);
            }
        }

        self.check_variable_usage(operation);

        let mut visiting = Vec::new();
        let depth = self.depth(&operation.selection_set, 0, &mut visiting);
        if depth > self.max_depth {
            self.error(
                format!(
                    "Query depth limit of {} exceeded, found depth of at least {depth}.",
                    self.max_depth
                ),
                operation.span,
            );
        }
    }

    fn check_variable_definitions(&mut self, operation: &OperationDefinition) {
        let mut seen = FxHashSet::default();
        for definition in &operation.variables {
            let name = definition.name.as_str();
            if !seen.insert(name) {
                self.error(
                    format!("There can be only one variable named \"${name}\"."),
                    definition.span,
                );
            }
            let ty = TypeRef::from_ast(&definition.ty);
            match self.schema.get_type(ty.base_name()) {
                None => self.error(
                    format!("Unknown type \"{}\".", ty.base_name()),
                    definition.ty.span(),
                ),
                Some(t) if !t.kind.is_input() => self.error(
                    format!("Variable \"${name}\" cannot be non-input type \"{ty}\"."),
                    definition.ty.span(),
                ),
                Some(_) => {}
            }
            if let Some(default) = &definition.default_value {
                let value = ast_to_json(default, &Map::new());
                if let Err(reason) = coerce_input(self.schema, &value, &ty) {
                    self.error(
                        format!("Variable \"${name}\" has invalid default value {value}: {reason}"),
                        default.span(),
                    );
                }
            }
        }
    }

    fn check_variable_usage(&mut self, operation: &'a OperationDefinition) {
        let mut used: Vec<&'a Name> = Vec::new();
        let mut visited = FxHashSet::default();
        for directive in &operation.directives {
            collect_directive_variables(directive, &mut used);
        }
        self.collect_variables(&operation.selection_set, &mut used, &mut visited);

        let defined: FxHashSet<&str> = operation.variables.iter().map(|v| v.name.as_str()).collect();

        let mut reported = FxHashSet::default();
        for name in &used {
            if !defined.contains(name.as_str()) && reported.insert(name.as_str()) {
                let message = match &operation.name {
                    Some(op) => {
                        format!("Variable \"${name}\" is not defined by operation \"{op}\".")
                    }
                    None => format!("Variable \"${name}\" is not defined."),
                };
                self.error(message, name.span);
            }
        }

        for definition in &operation.variables {
            let name = definition.name.as_str();
            if !used.iter().any(|u| u.as_str() == name) {
                let message = match &operation.name {
                    Some(op) => format!("Variable \"${name}\" is never used in operation \"{op}\"."),
                    None => format!("Variable \"${name}\" is never used."),
                };
                self.error(message, definition.span);
            }
        }
    }

    fn collect_variables(
        &self,
        selection_set: &'a SelectionSet,
        used: &mut Vec<&'a Name>,
        visited: &mut FxHashSet<&'a str>,
    ) {
        for selection in &selection_set.selections {
            for directive in selection.directives() {
                collect_directive_variables(directive, used);
            }
            match selection {
                Selection::Field(field) => {
                    for argument in &field.arguments {
                        argument.value.for_each_variable(&mut |name| used.push(name));
                    }
                    if let Some(selection_set) = &field.selection_set {
                        self.collect_variables(selection_set, used, visited);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if visited.insert(spread.name.as_str()) {
                        if let Some(fragment) = self.document.fragment(spread.name.as_str()) {
                            for directive in &fragment.directives {
                                collect_directive_variables(directive, used);
                            }
                            self.collect_variables(&fragment.selection_set, used, visited);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.collect_variables(&inline.selection_set, used, visited);
                }
            }
        }
    }

    fn count_root_fields(
        &self,
        selection_set: &'a SelectionSet,
        visited: &mut FxHashSet<&'a str>,
    ) -> usize {
        let mut keys = FxHashSet::default();
        self.root_field_keys(selection_set, visited, &mut keys);
        keys.len()
    }

    fn root_field_keys(
        &self,
        selection_set: &'a SelectionSet,
        visited: &mut FxHashSet<&'a str>,
        keys: &mut FxHashSet<&'a str>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    keys.insert(field.response_key());
                }
                Selection::FragmentSpread(spread) => {
                    if visited.insert(spread.name.as_str()) {
                        if let Some(fragment) = self.document.fragment(spread.name.as_str()) {
                            self.root_field_keys(&fragment.selection_set, visited, keys);
                        }
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.root_field_keys(&inline.selection_set, visited, keys);
                }
            }
        }
    }

    /// Returns the deepest selection level below `selection_set`, stopping
    /// early once the limit is exceeded.
    fn depth(
        &self,
        selection_set: &'a SelectionSet,
        level: usize,
        visiting: &mut Vec<&'a str>,
    ) -> usize {
        if level > self.max_depth {
            return level;
        }
        let mut max = level;
        for selection in &selection_set.selections {
            let depth = match selection {
                Selection::Field(field) => match &field.selection_set {
                    Some(inner) => self.depth(inner, level + 1, visiting),
                    None => level + 1,
                },
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    match self.document.fragment(name) {
                        Some(fragment) if !visiting.contains(&name) => {
                            visiting.push(name);
                            let depth = self.depth(&fragment.selection_set, level, visiting);
                            visiting.pop();
                            depth
                        }
                        _ => level,
                    }
                }
                Selection::InlineFragment(inline) => {
                    self.depth(&inline.selection_set, level, visiting)
                }
            };
            max = max.max(depth);
            if max > self.max_depth {
                break;
            }
        }
        max
    }
}

fn collect_directive_variables<'a>(directive: &'a Directive, used: &mut Vec<&'a Name>) {
    for argument in &directive.arguments {
        argument.value.for_each_variable(&mut |name| used.push(name));
    }
}

fn collect_spreads<'a>(selection_set: &'a SelectionSet, out: &mut Vec<&'a str>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(inner) = &field.selection_set {
                    collect_spreads(inner, out);
                }
            }
            Selection::FragmentSpread(spread) => out.push(spread.name.as_str()),
            Selection::InlineFragment(inline) => collect_spreads(&inline.selection_set, out),
        }
    }
}
