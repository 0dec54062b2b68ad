//! Condition expressions as the in-memory store reads them.
//!
//! Covers the grammar the compiler emits plus the usual extras found in
//! hand-written conditions:
//!
//! ```text
//! condition := or
//! or        := and ("OR" and)*
//! and       := not ("AND" not)*
//! not       := "NOT" not | primary
//! primary   := "(" condition ")"
//!            | function "(" operand ("," operand)* ")"
//!            | operand comparator operand
//!            | operand "BETWEEN" operand "AND" operand
//! operand   := path | ":" name
//! ```
//!
//! Keywords and function names are case-insensitive. Paths may be dotted
//! (`meta.author`) to reach into nested maps.

pub mod ast;
pub mod evaluator;
pub mod number;
pub mod parser;

pub use ast::{Comparator, Condition, Function, Operand};
pub use evaluator::EvalContext;
pub use parser::{ExpressionError, parse_condition};
