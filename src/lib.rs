//! # ProvQL
//!
//! A declarative graph-query compiler for a content-addressed provenance
//! graph: it turns a language-neutral, JSON-serialisable description of a
//! multi-hop traversal — "give me the inputs of the inputs of this
//! calculation, filtered on an attribute, projected as a JSON sub-path" —
//! into a single relational query against a polymorphic node table, joined
//! through link, closure-path, and group-membership edge tables.
//!
//! ## Pipeline
//!
//! ```text
//! query-help (serde_json::Value)
//!     ↓
//! [Parser]                  → QuerySpec (spec::QuerySpec)
//!     ↓
//! [Edge Resolver]            → (target vertex, join kind) per non-initial vertex
//!     ↓
//! [Filter Compiler]          → backend-native boolean expressions
//!     ↓
//! [Query Emitter]            → a query plan against the backend (emitter::EmittedQuery)
//!     ↓
//! backend (Session / QueryHandle)
//!     ↓
//! [Result Adapter]           → rows / dicts
//!     ↓
//! caller
//! ```
//!
//! The [`counter_query`] module sits alongside this pipeline as a second,
//! independent specification-and-subtraction primitive
//! (`except_if_input_to`), rather than a pipeline stage of its own.
//!
//! ## Usage
//!
//! ```rust
//! use provql::backend::memory::{MemoryExpressionBuilder, MemoryStore, MemorySession, Row, SimpleAliasFactory};
//! use provql::config::Config;
//! use provql::registry::{ClassTag, Registry};
//! use provql::value::Value;
//! use provql::QueryBuilder;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(
//!     Registry::builder()
//!         .node_class(ClassTag::new("Calc"), "process.calculation.")
//!         .node_class(ClassTag::new("Structure"), "data.structure.")
//!         .build(),
//! );
//!
//! let mut store = MemoryStore::new();
//! store.insert_row(
//!     "db_dbnode",
//!     Row::from_iter([
//!         ("id".to_string(), Value::Int(1)),
//!         ("type".to_string(), Value::Str("process.calculation.".to_string())),
//!     ]),
//! );
//!
//! let mut builder = QueryBuilder::new(
//!     &json!({"path": [{"cls": "Calc", "label": "c"}], "project": {"c": ["id"]}}),
//!     registry,
//!     Box::new(MemorySession::new(store)),
//!     Box::new(SimpleAliasFactory::new()),
//!     Box::new(MemoryExpressionBuilder),
//!     Config::default(),
//! )
//! .unwrap();
//!
//! let row = builder.first().unwrap().unwrap();
//! assert_eq!(row[0], Value::Int(1));
//! ```
//!
//! ## Module organisation
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | `Value`, the JSON-serialisable scalar model shared by filters/projections |
//! | [`registry`] | class → discriminator → table mapping, edge table set |
//! | [`spec`] | the normalised `QuerySpec` AST, plus chained builder helpers |
//! | [`parser`] | query-help document → `QuerySpec` |
//! | [`edge_resolver`] | edge descriptor → `(target vertex, join kind)` |
//! | [`filter`] | `FilterNode` → backend-native boolean expression |
//! | [`emitter`] | `QuerySpec` → backend query plan |
//! | [`backend`] | the four collaborator traits, plus an in-memory reference backend |
//! | [`result`] | reshapes executed rows into dicts / terminal operations |
//! | [`counter_query`] | `except_if_input_to` / `EXCEPT`-based pending-inputs primitive |
//! | [`config`] | hierarchical configuration (batch size, validation strictness, logging) |
//! | [`error`] | the unified `QbError` taxonomy |
//!
//! [`QueryBuilder`] (in [`builder`]) is the facade tying all of the above
//! together; it is what a host ORM actually constructs and chains calls on.

pub mod backend;
pub mod builder;
pub mod config;
pub mod counter_query;
pub mod edge_resolver;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod parser;
pub mod registry;
pub mod result;
pub mod spec;
pub mod value;

pub use builder::QueryBuilder;
pub use error::{BackendError, FilterError, ProjectionError, QbError, QbResult, SpecError};
pub use registry::{ClassTag, Registry, RegistryBuilder, TableRef};
pub use spec::QuerySpec;
pub use value::Value;
