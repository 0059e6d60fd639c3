//! Error Taxonomy
//!
//! Four error categories, matching the phases of the compile pipeline:
//! malformed input (`SpecError`), bad filter operators (`FilterError`),
//! bad projections (`ProjectionError`), and anything the backend itself
//! raises (`BackendError`). All of them fold into [`QbError`].

use thiserror::Error;

/// Malformed query-help, raised eagerly during parsing, before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("unknown top-level key '{key}', valid keys are: {valid}")]
    UnknownTopLevelKey { key: String, valid: String },

    #[error("vertex specifies both 'cls' and 'type'; exactly one is allowed")]
    ClsAndTypeBothGiven,

    #[error("vertex specifies neither 'cls' nor 'type'")]
    ClsOrTypeMissing,

    #[error("'{0}' cannot be resolved to a node or group class")]
    NotAClass(String),

    #[error("label '{0}' is not unique")]
    DuplicateLabel(String),

    #[error("vertex has more than one edge keyword: '{first}' and '{second}'")]
    MultipleEdgeKeywords { first: String, second: String },

    #[error("direction 0 is not a valid edge descriptor")]
    ZeroDirection,

    #[error("edge target index {index} is out of range (vertex at position {at})")]
    TargetIndexOutOfRange { index: i64, at: usize },

    #[error("unknown target label '{0}'")]
    UnknownTargetLabel(String),

    #[error("class '{0}' is bound to more than one label; use an explicit label or index")]
    AmbiguousClassTarget(String),

    #[error("unknown label '{0}' referenced in {context}")]
    UnknownLabel { label: String, context: &'static str },

    #[error("filters for vertex '{0}' must be a JSON object")]
    FiltersNotAnObject(String),

    #[error("'path' must be present and non-empty")]
    EmptyPath,

    #[error("malformed filter tree: {0}")]
    MalformedFilter(String),

    #[error("malformed order_by entry: {0}")]
    MalformedOrderBy(String),
}

/// Invalid operator usage discovered while lowering a filter tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{op}' requires a list value, got {got}")]
    ExpectedSequence { op: String, got: String },

    #[error("operator '{op}' requires an integer value, got {got}")]
    ExpectedInt { op: String, got: String },

    #[error("column '{0}' cannot be resolved on the aliased table")]
    UnknownColumn(String),
}

/// Projection references a column the registry doesn't know about, or a
/// counter-query label projected as something other than `"*"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("unknown column '{0}' in projection")]
    UnknownColumn(String),

    #[error("label '{label}' projects {spec:?}; counter-query labels must project \"*\" only")]
    NonStarInCounterQuery { label: String, spec: String },
}

/// Wraps whatever the expression builder or session collaborator raises.
#[derive(Error, Debug)]
#[error("backend error: {0}")]
pub struct BackendError(pub String);

/// Unified error type for every fallible public entry point.
#[derive(Error, Debug)]
pub enum QbError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type QbResult<T> = Result<T, QbError>;
