//! Recursive descent parser for GraphQL executable documents.
//!
//! Parsing stops at the first syntax error: the resulting diagnostic bag then
//! holds exactly one error, matching how GraphQL services report syntax
//! errors.

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};
use hgql_core::{diagnostics::codes, DiagnosticBag, LineIndex, Position, Span};

/// Parser for executable documents.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    source: &'a str,
    current: Token,
    last_end: u32,
    failed: bool,
    diagnostics: DiagnosticBag,
}

/// Result of parsing.
pub struct ParseResult {
    pub document: Document,
    pub diagnostics: DiagnosticBag,
}

/// A document that failed to parse.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Syntax Error: {message} ({}:{})", .position.line, .position.column)]
pub struct SyntaxError {
    pub message: String,
    pub position: Position,
    pub span: Span,
}

/// Parses a source string into a document, collecting diagnostics.
pub fn parse(source: &str) -> ParseResult {
    let mut parser = Parser::new(source);
    let document = parser.parse_document();
    ParseResult {
        document,
        diagnostics: parser.diagnostics,
    }
}

/// Parses a source string, failing on the first syntax error.
pub fn parse_document(source: &str) -> Result<Document, SyntaxError> {
    let result = parse(source);
    let first = result
        .diagnostics
        .errors()
        .next()
        .map(|error| SyntaxError {
            message: error.message.clone(),
            position: result.document.position(error.span),
            span: error.span,
        });
    match first {
        Some(error) => Err(error),
        None => Ok(result.document),
    }
}

impl<'a> Parser<'a> {
    /// Creates a new parser.
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            source,
            current,
            last_end: 0,
            failed: false,
            diagnostics: DiagnosticBag::new(),
        }
    }

    #[inline]
    fn at(&self) -> TokenKind {
        self.current.kind
    }

    #[inline]
    fn at_kind(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true while the parser may keep consuming tokens.
    #[inline]
    fn open(&self) -> bool {
        !self.failed && !self.at_kind(TokenKind::Eof)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.at_kind(TokenKind::Name) && self.current_text() == keyword
    }

    fn advance(&mut self) {
        self.last_end = self.current.span.end;
        self.current = self.lexer.next_token();
    }

    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.at_kind(kind) {
            self.advance();
            true
        } else {
            self.error_expected(&kind.to_string());
            false
        }
    }

    fn current_text(&self) -> &'a str {
        self.lexer.span_text(self.current.span)
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.last_end.max(start))
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>) {
        if !self.failed {
            self.failed = true;
            self.diagnostics.error(code, message, self.current.span);
        }
    }

    fn error_expected(&mut self, expected: &str) {
        let message = match self.at() {
            TokenKind::Eof => format!("Expected {expected}, found end of input."),
            TokenKind::Error => {
                format!("Unexpected character sequence \"{}\".", self.current_text())
            }
            found => format!("Expected {expected}, found {found} \"{}\".", self.current_text()),
        };
        let code = if self.at_kind(TokenKind::Eof) {
            codes::UNEXPECTED_EOF
        } else {
            codes::UNEXPECTED_TOKEN
        };
        self.error(code, message);
    }

    /// Parses a document.
    pub fn parse_document(&mut self) -> Document {
        let start = self.current.span.start;
        let mut definitions = Vec::new();

        while self.open() {
            if let Some(def) = self.parse_definition() {
                definitions.push(def);
            }
        }

        if definitions.is_empty() {
            self.error_expected("definition");
        }

        Document {
            definitions,
            span: self.span_from(start),
            line_index: LineIndex::new(self.source),
        }
    }

    fn parse_definition(&mut self) -> Option<Definition> {
        if self.at_kind(TokenKind::LBrace) {
            return Some(Definition::Operation(self.parse_operation()));
        }

        if self.at_kind(TokenKind::Name) {
            let text = self.current_text();
            if OperationKind::from_keyword(text).is_some() {
                return Some(Definition::Operation(self.parse_operation()));
            }
            if text == "fragment" {
                return Some(Definition::Fragment(self.parse_fragment_definition()));
            }
        }

        self.error_expected("definition");
        None
    }

    fn parse_name(&mut self) -> Name {
        let span = self.current.span;
        if self.at_kind(TokenKind::Name) {
            let value = self.current_text();
            self.advance();
            Name::new(value, span)
        } else {
            self.error_expected("name");
            Name::new("", span)
        }
    }

    fn parse_operation(&mut self) -> OperationDefinition {
        let start = self.current.span.start;

        if self.at_kind(TokenKind::LBrace) {
            let selection_set = self.parse_selection_set();
            return OperationDefinition {
                kind: OperationKind::Query,
                name: None,
                variables: Vec::new(),
                directives: Vec::new(),
                selection_set,
                span: self.span_from(start),
            };
        }

        let kind = OperationKind::from_keyword(self.current_text()).unwrap_or(OperationKind::Query);
        self.advance();

        let name = if self.at_kind(TokenKind::Name) {
            Some(self.parse_name())
        } else {
            None
        };

        let variables = if self.at_kind(TokenKind::LParen) {
            self.parse_variable_definitions()
        } else {
            Vec::new()
        };

        let directives = self.parse_directives(false);
        let selection_set = self.parse_selection_set();

        OperationDefinition {
            kind,
            name,
            variables,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_variable_definitions(&mut self) -> Vec<VariableDefinition> {
        self.advance(); // (
        let mut vars = Vec::new();
        while !self.at_kind(TokenKind::RParen) && self.open() {
            vars.push(self.parse_variable_definition());
        }
        if vars.is_empty() {
            self.error_expected("variable definition");
        }
        self.expect(TokenKind::RParen);
        vars
    }

    fn parse_variable_definition(&mut self) -> VariableDefinition {
        let start = self.current.span.start;
        self.expect(TokenKind::Dollar);
        let name = self.parse_name();
        self.expect(TokenKind::Colon);
        let ty = self.parse_type();

        let default_value = if self.at_kind(TokenKind::Eq) {
            self.advance();
            Some(self.parse_value(true))
        } else {
            None
        };

        // Directives on variable definitions are accepted and ignored.
        self.parse_directives(true);

        VariableDefinition {
            name,
            ty,
            default_value,
            span: self.span_from(start),
        }
    }

    fn parse_type(&mut self) -> Type {
        let start = self.current.span.start;

        let ty = if self.at_kind(TokenKind::LBracket) {
            self.advance();
            let inner = self.parse_type();
            self.expect(TokenKind::RBracket);
            Type::List(Box::new(inner), self.span_from(start))
        } else {
            Type::Named(self.parse_name())
        };

        if self.at_kind(TokenKind::Bang) {
            self.advance();
            Type::NonNull(Box::new(ty), self.span_from(start))
        } else {
            ty
        }
    }

    fn parse_directives(&mut self, is_const: bool) -> Vec<Directive> {
        let mut directives = Vec::new();
        while self.at_kind(TokenKind::At) && !self.failed {
            let start = self.current.span.start;
            self.advance(); // @
            let name = self.parse_name();
            let arguments = if self.at_kind(TokenKind::LParen) {
                self.parse_arguments(is_const)
            } else {
                Vec::new()
            };
            directives.push(Directive {
                name,
                arguments,
                span: self.span_from(start),
            });
        }
        directives
    }

    fn parse_arguments(&mut self, is_const: bool) -> Vec<Argument> {
        self.advance(); // (
        let mut args = Vec::new();
        while !self.at_kind(TokenKind::RParen) && self.open() {
            let start = self.current.span.start;
            let name = self.parse_name();
            self.expect(TokenKind::Colon);
            let value = self.parse_value(is_const);
            args.push(Argument {
                name,
                value,
                span: self.span_from(start),
            });
        }
        if args.is_empty() {
            self.error_expected("argument");
        }
        self.expect(TokenKind::RParen);
        args
    }

    fn parse_value(&mut self, is_const: bool) -> Value {
        let start = self.current.span.start;

        match self.at() {
            TokenKind::Dollar if !is_const => {
                self.advance();
                Value::Variable(self.parse_name())
            }
            TokenKind::IntValue => {
                let text = self.current_text();
                match text.parse::<i64>() {
                    Ok(value) => {
                        self.advance();
                        Value::Int(value, self.span_from(start))
                    }
                    Err(_) => {
                        self.error(
                            codes::INVALID_NUMBER,
                            format!("Integer \"{text}\" is out of range."),
                        );
                        Value::Null(self.current.span)
                    }
                }
            }
            TokenKind::FloatValue => {
                let text = self.current_text();
                match text.parse::<f64>() {
                    Ok(value) => {
                        self.advance();
                        Value::Float(value, self.span_from(start))
                    }
                    Err(_) => {
                        self.error(codes::INVALID_NUMBER, format!("Invalid number \"{text}\"."));
                        Value::Null(self.current.span)
                    }
                }
            }
            TokenKind::StringValue => {
                let text = self.current_text();
                match unescape(&text[1..text.len() - 1]) {
                    Ok(value) => {
                        self.advance();
                        Value::String(value, self.span_from(start))
                    }
                    Err(message) => {
                        self.error(codes::INVALID_STRING, message);
                        Value::Null(self.current.span)
                    }
                }
            }
            TokenKind::BlockStringValue => {
                let text = self.current_text();
                let value = block_string_value(&text[3..text.len() - 3]);
                self.advance();
                Value::String(value, self.span_from(start))
            }
            TokenKind::Name => {
                let name = self.parse_name();
                match name.as_str() {
                    "true" => Value::Boolean(true, name.span),
                    "false" => Value::Boolean(false, name.span),
                    "null" => Value::Null(name.span),
                    _ => Value::Enum(name),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let mut values = Vec::new();
                while !self.at_kind(TokenKind::RBracket) && self.open() {
                    values.push(self.parse_value(is_const));
                }
                self.expect(TokenKind::RBracket);
                Value::List(values, self.span_from(start))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.at_kind(TokenKind::RBrace) && self.open() {
                    let name = self.parse_name();
                    self.expect(TokenKind::Colon);
                    let value = self.parse_value(is_const);
                    fields.push((name, value));
                }
                self.expect(TokenKind::RBrace);
                Value::Object(fields, self.span_from(start))
            }
            TokenKind::Dollar => {
                self.error(
                    codes::INVALID_SYNTAX,
                    "Unexpected variable in constant value.",
                );
                Value::Null(self.current.span)
            }
            _ => {
                self.error_expected("value");
                Value::Null(self.current.span)
            }
        }
    }

    fn parse_fragment_definition(&mut self) -> FragmentDefinition {
        let start = self.current.span.start;
        self.advance(); // fragment

        if self.at_keyword("on") {
            self.error(codes::INVALID_SYNTAX, "Unexpected name \"on\".");
        }
        let name = self.parse_name();
        if self.at_keyword("on") {
            self.advance();
        } else {
            self.error_expected("\"on\"");
        }
        let type_condition = self.parse_name();
        let directives = self.parse_directives(false);
        let selection_set = self.parse_selection_set();

        FragmentDefinition {
            name,
            type_condition,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }

    fn parse_selection_set(&mut self) -> SelectionSet {
        let start = self.current.span.start;
        if !self.expect(TokenKind::LBrace) {
            return SelectionSet::default();
        }

        let mut selections = Vec::new();
        while !self.at_kind(TokenKind::RBrace) && self.open() {
            selections.push(self.parse_selection());
        }
        if selections.is_empty() {
            self.error_expected("selection");
        }
        self.expect(TokenKind::RBrace);

        SelectionSet {
            selections,
            span: self.span_from(start),
        }
    }

    fn parse_selection(&mut self) -> Selection {
        if !self.at_kind(TokenKind::Spread) {
            return Selection::Field(self.parse_field());
        }

        let start = self.current.span.start;
        self.advance(); // ...

        if self.at_keyword("on") {
            self.advance();
            let type_condition = Some(self.parse_name());
            let directives = self.parse_directives(false);
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else if self.at_kind(TokenKind::LBrace) || self.at_kind(TokenKind::At) {
            let directives = self.parse_directives(false);
            let selection_set = self.parse_selection_set();
            Selection::InlineFragment(InlineFragment {
                type_condition: None,
                directives,
                selection_set,
                span: self.span_from(start),
            })
        } else {
            let name = self.parse_name();
            let directives = self.parse_directives(false);
            Selection::FragmentSpread(FragmentSpread {
                name,
                directives,
                span: self.span_from(start),
            })
        }
    }

    fn parse_field(&mut self) -> Field {
        let start = self.current.span.start;

        let first_name = self.parse_name();
        let (alias, name) = if self.at_kind(TokenKind::Colon) {
            self.advance();
            (Some(first_name), self.parse_name())
        } else {
            (None, first_name)
        };

        let arguments = if self.at_kind(TokenKind::LParen) {
            self.parse_arguments(false)
        } else {
            Vec::new()
        };

        let directives = self.parse_directives(false);

        let selection_set = if self.at_kind(TokenKind::LBrace) {
            Some(self.parse_selection_set())
        } else {
            None
        };

        Field {
            alias,
            name,
            arguments,
            directives,
            selection_set,
            span: self.span_from(start),
        }
    }
}

/// Decodes the escape sequences of a quoted string body.
fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("Invalid Unicode escape sequence \"\\u{hex}\"."))?;
                out.push(code);
            }
            Some(other) => return Err(format!("Invalid character escape sequence \"\\{other}\".")),
            None => return Err("Unterminated string.".to_string()),
        }
    }

    Ok(out)
}

/// Computes the value of a block string: common indentation and blank
/// leading/trailing lines are removed.
fn block_string_value(raw: &str) -> String {
    let raw = raw.replace("\\\"\"\"", "\"\"\"");
    let lines: Vec<&str> = raw.lines().collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut dedented: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                *line
            } else {
                line.get(common_indent..).unwrap_or("")
            }
        })
        .collect();

    while dedented.first().is_some_and(|line| line.trim().is_empty()) {
        dedented.remove(0);
    }
    while dedented.last().is_some_and(|line| line.trim().is_empty()) {
        dedented.pop();
    }

    dedented.join("\n")
}
