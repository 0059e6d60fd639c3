//! # Backend Contract
//!
//! The only language/backend-dependent boundary in the crate: four
//! collaborator traits an actual relational/ORM layer implements, plus an
//! in-memory reference backend used by the test suite and doctests. The
//! compiler (parser, edge resolver, filter compiler, emitter) never talks to
//! a concrete store directly — it only ever holds `&dyn` trait objects.

pub mod memory;

use crate::error::BackendError;
use crate::registry::TableRef;
use crate::value::Value;
use std::fmt::Debug;

/// An opaque handle to one aliased occurrence of a table in the query under
/// construction. Two aliases of the same table are never equal.
pub trait AliasHandle: Debug {
    /// Stable identity used by the emitter to thread a vertex's alias
    /// through joins, filters, and projections.
    fn id(&self) -> usize;

    /// Lets a concrete backend recover its own alias representation from
    /// the trait object (e.g. to look up which table it names).
    fn as_any(&self) -> &dyn std::any::Any;

    /// A handle is referenced from several places at once: once to seed
    /// `Session::query`, and again for every `join`/`filter`/`project` call
    /// that touches it. `AliasHandle` isn't `Clone` (it isn't `Sized`), so
    /// this is how a caller gets a second owned handle to the same alias.
    fn box_clone(&self) -> Box<dyn AliasHandle>;
}

/// Type-erased backend-native boolean/scalar expression, built up by
/// [`ExpressionBuilder`] and consumed by [`QueryHandle::filter`]. Concrete
/// backends downcast it back to their own expression type.
pub type BoxedExpr = Box<dyn std::any::Any>;

/// Builds scalar/boolean expressions against an aliased table. Implemented
/// by the backend; the filter compiler only ever calls through this trait.
pub trait ExpressionBuilder {
    /// A real column on `alias`, e.g. `alias.id` or `alias.attributes`.
    fn column(&self, alias: &dyn AliasHandle, name: &str) -> BoxedExpr;

    /// Descend into a JSONB column by the given path segments.
    fn json_descent(&self, expr: BoxedExpr, path: &[String]) -> BoxedExpr;

    fn literal(&self, value: &Value) -> BoxedExpr;

    fn eq(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn lt(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn gt(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn le(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn ge(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn like(&self, lhs: BoxedExpr, pattern: BoxedExpr) -> BoxedExpr;
    fn ilike(&self, lhs: BoxedExpr, pattern: BoxedExpr) -> BoxedExpr;
    fn in_list(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn contains(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn has_key(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn of_length(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn longer(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;
    fn shorter(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr;

    fn not(&self, expr: BoxedExpr) -> BoxedExpr;
    fn and(&self, exprs: Vec<BoxedExpr>) -> BoxedExpr;
    fn or(&self, exprs: Vec<BoxedExpr>) -> BoxedExpr;
}

/// Mints a fresh alias for a table; the emitter calls this once per vertex
/// in path order.
pub trait AliasFactory {
    fn new_alias(&mut self, table: &TableRef) -> Box<dyn AliasHandle>;
}

/// What a label projects onto, in path order, handed to
/// [`QueryHandle::project`].
#[derive(Debug, Clone)]
pub enum ProjectionTarget {
    Star,
    Column(String),
    JsonPath(String, Vec<String>),
}

/// One side of a two-step join, as described in the emitter's join table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEdge {
    Link,
    ClosurePath,
    GroupNodes,
    ComputerForeignKey,
}

/// A query plan under construction. Built incrementally by the emitter,
/// terminally consumed by `execute`.
pub trait QueryHandle: Debug {
    fn join(
        &mut self,
        edge: JoinEdge,
        left: &dyn AliasHandle,
        left_column: &str,
        right: &dyn AliasHandle,
        right_column: &str,
    ) -> Result<(), BackendError>;

    fn filter(&mut self, expr: BoxedExpr) -> Result<(), BackendError>;

    fn project(&mut self, alias: &dyn AliasHandle, target: ProjectionTarget) -> Result<usize, BackendError>;

    fn order_by(&mut self, alias: &dyn AliasHandle, column: &str) -> Result<(), BackendError>;

    fn limit(&mut self, n: i64) -> Result<(), BackendError>;

    /// Run the query, yielding rows in batches of `batch_size`. Each row is
    /// positional, matching the order `project` was called in.
    fn execute(&self, batch_size: usize) -> Result<Vec<Vec<Value>>, BackendError>;
}

/// Opens query handles against a live connection/session. Implemented by
/// the host application's persistence layer; [`memory::MemorySession`] is
/// the in-memory stand-in used for tests.
pub trait Session {
    fn query(&self, seed: Box<dyn AliasHandle>) -> Box<dyn QueryHandle>;
}
