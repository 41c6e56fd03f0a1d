//! Core utilities for hgql.
//!
//! This crate provides foundational types shared by the query parser and the
//! execution engine:
//! - `span`: Source location tracking and line/column mapping
//! - `diagnostics`: Error reporting

pub mod diagnostics;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSeverity, SourceReport};
pub use span::{LineIndex, Position, Span};
