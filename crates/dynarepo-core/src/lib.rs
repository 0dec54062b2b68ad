//! Typed, schema-validated repositories over a partition/sort-key store.
//!
//! The crate has two halves:
//!
//! - [`compiler`] turns a declarative map of attribute name to
//!   [`AttributeExpression`] into a key or filter condition string plus its
//!   bound parameter values.
//! - [`repository`] binds a [`StorageClient`], a table name and a [`Schema`]
//!   and exposes `put`, `get` and lazily paginated `query`/`scan` streams
//!   that only ever yield schema-validated values.
//!
//! [`memory::MemoryClient`] is an in-process storage client that evaluates
//! the compiled conditions itself; the `aws` feature adds a DynamoDB adapter.
#![allow(missing_docs, clippy::doc_markdown, clippy::module_name_repetitions)]

#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expression;
pub mod memory;
pub mod paginate;
pub mod repository;
pub mod schema;

pub use client::{StorageClient, StoreFuture};
pub use compiler::{
    AttributeExpression, CompareOperator, CompiledCondition, KeyConditions, compile_filter_condition,
    compile_key_condition,
};
pub use config::RepositoryConfig;
pub use error::{CompileError, RepositoryError};
pub use repository::{QueryOptions, Repository, ScanOptions};
pub use schema::{Issue, Key, Schema, SchemaViolation};
