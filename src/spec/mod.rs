//! # Specification AST
//!
//! The in-memory, serde round-trippable representation of a parsed
//! query-help document: a traversal path, per-label filters and
//! projections, an `ORDER BY` clause, and an optional limit. Built by
//! [`crate::parser::parse`], consumed once by [`crate::emitter`].
//!
//! ```text
//! query-help (JSON) -> parser::parse -> QuerySpec -> emitter::emit -> handle
//! ```

pub mod builders;

use crate::registry::ClassTag;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where an edge descriptor's target vertex is named from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Label(String),
    Index(usize),
    Class(String),
}

/// One of the edge kinds a non-initial vertex may declare, or the signed
/// `direction` fallback that the edge resolver turns into one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDescriptor {
    InputOf(Target),
    OutputOf(Target),
    AncestorOf(Target),
    DescendantOf(Target),
    GroupOf(Target),
    MemberOf(Target),
    UsedBy(Target),
    Direction(i64),
}

impl EdgeDescriptor {
    /// The query-help keyword this descriptor was (or would be) spelled
    /// with, used in error messages and in the "more than one edge keyword"
    /// check.
    pub fn keyword(&self) -> &'static str {
        match self {
            EdgeDescriptor::InputOf(_) => "input_of",
            EdgeDescriptor::OutputOf(_) => "output_of",
            EdgeDescriptor::AncestorOf(_) => "ancestor_of",
            EdgeDescriptor::DescendantOf(_) => "descendant_of",
            EdgeDescriptor::GroupOf(_) => "group_of",
            EdgeDescriptor::MemberOf(_) => "member_of",
            EdgeDescriptor::UsedBy(_) => "used_by",
            EdgeDescriptor::Direction(_) => "direction",
        }
    }
}

/// A single vertex in the declared traversal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub label: String,
    /// Dot-separated discriminator prefix, or one of the sentinels
    /// `"group"` / `"computer"` / `"node"`.
    pub type_discriminator: String,
    /// The class this vertex was bound from, if any (dropped to its
    /// discriminator string on `to_json`).
    pub bound_class: Option<ClassTag>,
    /// `None` only for the first vertex in the path.
    pub edge: Option<EdgeDescriptor>,
}

/// Comparison/containment operators recognised inside a column's operator
/// map. Any of them may be individually negated with a `~` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Eq,
    In,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    ILike,
    Contains,
    HasKey,
    OfLength,
    Longer,
    Shorter,
}

impl Op {
    pub fn from_str(s: &str) -> Option<Op> {
        Some(match s {
            "==" => Op::Eq,
            "in" => Op::In,
            "<" => Op::Lt,
            ">" => Op::Gt,
            "<=" => Op::Le,
            ">=" => Op::Ge,
            "like" => Op::Like,
            "ilike" => Op::ILike,
            "contains" => Op::Contains,
            "has_key" => Op::HasKey,
            "of_length" => Op::OfLength,
            "longer" => Op::Longer,
            "shorter" => Op::Shorter,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::In => "in",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Le => "<=",
            Op::Ge => ">=",
            Op::Like => "like",
            Op::ILike => "ilike",
            Op::Contains => "contains",
            Op::HasKey => "has_key",
            Op::OfLength => "of_length",
            Op::Longer => "longer",
            Op::Shorter => "shorter",
        }
    }
}

/// A dotted path whose first segment names a real column and remaining
/// segments descend into a JSONB value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPath {
    pub column: String,
    pub json_path: Vec<String>,
}

impl ColumnPath {
    pub fn parse(dotted: &str) -> ColumnPath {
        let mut segments = dotted.split('.');
        let column = segments.next().unwrap_or(dotted).to_string();
        ColumnPath {
            column,
            json_path: segments.map(str::to_string).collect(),
        }
    }

    pub fn to_dotted(&self) -> String {
        if self.json_path.is_empty() {
            self.column.clone()
        } else {
            format!("{}.{}", self.column, self.json_path.join("."))
        }
    }
}

/// A single `(operator, negated, value)` predicate attached to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub op: Op,
    pub negated: bool,
    pub value: Value,
}

/// The recursive filter tree: leaves carry a column and its predicates,
/// `And`/`Or` combine sub-trees. Implicit conjunction (sibling keys at the
/// same object level in the source document) is folded into `And` at parse
/// time; by the time a tree reaches the filter compiler it is always one of
/// these three explicit shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    Leaf {
        column: ColumnPath,
        predicates: Vec<Predicate>,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
}

impl FilterNode {
    pub fn leaf(column: ColumnPath, op: Op, negated: bool, value: Value) -> FilterNode {
        FilterNode::Leaf {
            column,
            predicates: vec![Predicate { op, negated, value }],
        }
    }
}

/// One entry in a label's ordered projection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionSpec {
    /// Project the full entity row.
    Star,
    Column(String),
    JsonPath(String, Vec<String>),
}

impl ProjectionSpec {
    pub fn parse(spec: &str) -> ProjectionSpec {
        if spec == "*" {
            return ProjectionSpec::Star;
        }
        let mut segments = spec.split('.');
        let head = segments.next().unwrap_or(spec).to_string();
        let rest: Vec<String> = segments.map(str::to_string).collect();
        if rest.is_empty() {
            ProjectionSpec::Column(head)
        } else {
            ProjectionSpec::JsonPath(head, rest)
        }
    }

    pub fn to_dotted(&self) -> String {
        match self {
            ProjectionSpec::Star => "*".to_string(),
            ProjectionSpec::Column(c) => c.clone(),
            ProjectionSpec::JsonPath(head, rest) => format!("{head}.{}", rest.join(".")),
        }
    }
}

/// `{label: [columns...]}`, columns applied in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub label: String,
    pub columns: Vec<String>,
}

/// The fully parsed, normalised query specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub path: Vec<Vertex>,
    pub filters: IndexMap<String, FilterNode>,
    pub projections: IndexMap<String, Vec<ProjectionSpec>>,
    pub order_by: Vec<OrderEntry>,
    pub limit: Option<i64>,
}

impl QuerySpec {
    pub fn new() -> QuerySpec {
        QuerySpec {
            path: Vec::new(),
            filters: IndexMap::new(),
            projections: IndexMap::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.path.iter().position(|v| v.label == label)
    }

    /// `to_json`/`from_json` are just serde's `serde_json::to_value`/
    /// `serde_json::from_value` here: `Vertex::bound_class` already carries
    /// nothing more than the discriminator-bearing `ClassTag`, which
    /// serialises as a plain string, so the derived `Serialize` impl already
    /// produces the provenance-storable form described in the distilled
    /// specification.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("QuerySpec always serialises")
    }

    pub fn from_json(json: &serde_json::Value) -> Result<QuerySpec, serde_json::Error> {
        serde_json::from_value(json.clone())
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec::new()
    }
}
