//! # Parser / Normaliser
//!
//! Consumes a query-help document — a bare path list, a single vertex, or a
//! full `{"path": ..., "project": ..., "filters": ..., "order_by": ...,
//! "limit": ...}` document — and produces a normalised [`QuerySpec`]: label
//! assignment and uniqueness, class↔label binding, auto-labelling, and
//! injection of the implicit type-discriminator filter for class-typed
//! vertices.
//!
//! ```text
//! query-help (JSON) -> [Parser] -> QuerySpec -> Edge Resolver + Filter Compiler
//! ```

use crate::error::SpecError;
use crate::registry::{ClassTag, Registry, SENTINEL_COMPUTER, SENTINEL_GROUP, SENTINEL_NODE};
use crate::spec::{ColumnPath, FilterNode, Op, OrderEntry, Predicate, ProjectionSpec, QuerySpec, Target, Vertex};
use crate::value::Value as QbValue;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

const TOP_LEVEL_KEYS: &[&str] = &["path", "project", "filters", "limit", "order_by"];
const EDGE_KEYWORDS: &[&str] = &[
    "input_of",
    "output_of",
    "ancestor_of",
    "descendant_of",
    "group_of",
    "member_of",
    "used_by",
    "direction",
];

/// Parse a query-help document into a [`QuerySpec`].
#[tracing::instrument(skip_all)]
pub fn parse(query_help: &Json, registry: &Registry) -> Result<QuerySpec, SpecError> {
    let doc = wrap_as_document(query_help);
    let obj = doc.as_object().expect("wrap_as_document always returns an object");

    for key in obj.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            return Err(SpecError::UnknownTopLevelKey {
                key: key.clone(),
                valid: TOP_LEVEL_KEYS.join(", "),
            });
        }
    }

    let path_json = obj
        .get("path")
        .and_then(Json::as_array)
        .cloned()
        .filter(|p| !p.is_empty())
        .ok_or(SpecError::EmptyPath)?;

    let mut spec = QuerySpec::new();
    let mut raw_filters: IndexMap<String, Map<String, Json>> = IndexMap::new();
    let mut raw_projections: IndexMap<String, Vec<ProjectionSpec>> = IndexMap::new();

    for raw_vertex in path_json.iter() {
        parse_vertex(raw_vertex, registry, &mut spec, &mut raw_filters, &mut raw_projections)?;
    }

    // Top-level filters merge after vertex-local filters, with top-level
    // entries winning on key collision within a label's column map.
    if let Some(top_filters) = obj.get("filters") {
        let top_filters = top_filters
            .as_object()
            .ok_or_else(|| SpecError::FiltersNotAnObject("<top level>".to_string()))?;
        for (label, filter_spec) in top_filters {
            if spec.label_index(label).is_none() {
                return Err(SpecError::UnknownLabel {
                    label: label.clone(),
                    context: "filters",
                });
            }
            let filter_obj = filter_spec
                .as_object()
                .ok_or_else(|| SpecError::FiltersNotAnObject(label.clone()))?;
            let entry = raw_filters.entry(label.clone()).or_default();
            for (k, v) in filter_obj {
                entry.insert(k.clone(), v.clone());
            }
        }
    }

    // Top-level projections *replace* whatever a vertex declared locally.
    if let Some(top_project) = obj.get("project") {
        let top_project = top_project
            .as_object()
            .ok_or_else(|| SpecError::MalformedOrderBy("project must be an object".to_string()))?;
        for (label, spec_json) in top_project {
            if spec.label_index(label).is_none() {
                return Err(SpecError::UnknownLabel {
                    label: label.clone(),
                    context: "project",
                });
            }
            raw_projections.insert(label.clone(), parse_projection_value(spec_json));
        }
    }

    for (label, raw) in raw_filters {
        if raw.is_empty() {
            continue;
        }
        let node = parse_filter_tree(&Json::Object(raw))?;
        spec.filters.insert(label, node);
    }
    for (label, projections) in raw_projections {
        if !projections.is_empty() {
            spec.projections.insert(label, projections);
        }
    }

    if let Some(limit) = obj.get("limit") {
        if !limit.is_null() {
            spec.limit = Some(
                limit
                    .as_i64()
                    .ok_or_else(|| SpecError::MalformedOrderBy("limit must be an integer".to_string()))?,
            );
        }
    }

    if let Some(order_by) = obj.get("order_by") {
        spec.order_by = parse_order_by(order_by)?;
    }

    Ok(spec)
}

fn wrap_as_document(query_help: &Json) -> Json {
    match query_help {
        Json::Object(obj) if obj.contains_key("path") => query_help.clone(),
        Json::Array(_) => {
            let mut doc = Map::new();
            doc.insert("path".to_string(), query_help.clone());
            Json::Object(doc)
        }
        // A single bare vertex (object without "path", or a bare string).
        _ => {
            let mut doc = Map::new();
            doc.insert("path".to_string(), Json::Array(vec![query_help.clone()]));
            Json::Object(doc)
        }
    }
}

fn parse_vertex(
    raw: &Json,
    registry: &Registry,
    spec: &mut QuerySpec,
    raw_filters: &mut IndexMap<String, Map<String, Json>>,
    raw_projections: &mut IndexMap<String, Vec<ProjectionSpec>>,
) -> Result<(), SpecError> {
    let index = spec.path.len();

    // Rule 1: a bare string is `{type: <string>}`.
    let mut obj = match raw {
        Json::String(s) => {
            let mut m = Map::new();
            m.insert("type".to_string(), Json::String(s.clone()));
            m
        }
        Json::Object(m) => m.clone(),
        other => {
            return Err(SpecError::MalformedFilter(format!(
                "vertex must be a string or object, got {other}"
            )))
        }
    };

    let cls = obj.remove("cls").and_then(|v| v.as_str().map(str::to_string));
    let ty = obj.remove("type").and_then(|v| v.as_str().map(str::to_string));

    // Rule 2/3: exactly one of cls/type; cls must resolve through the registry.
    let (type_discriminator, bound_class) = match (cls, ty) {
        (Some(_), Some(_)) => return Err(SpecError::ClsAndTypeBothGiven),
        (None, None) => return Err(SpecError::ClsOrTypeMissing),
        (Some(cls_name), None) => {
            let class = ClassTag::new(cls_name.clone());
            if registry.is_group_class(&class) {
                (SENTINEL_GROUP.to_string(), Some(class))
            } else if let Some(discriminator) = registry.discriminator(&class) {
                (discriminator.to_string(), Some(class))
            } else {
                return Err(SpecError::NotAClass(cls_name));
            }
        }
        (None, Some(type_str)) => (type_str, None),
    };

    // Rule 4: label assignment.
    let explicit_label = obj.remove("label").and_then(|v| v.as_str().map(str::to_string));
    let autolabel = obj
        .remove("autolabel")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    // A `cls`-bound vertex defaults to the last dot-segment (`"Structure"`);
    // a bare type-string vertex defaults to the *full* discriminator
    // (`"data.structure."`), matching the source's `label = type[:]`.
    let label_base: &str = match &bound_class {
        Some(_) => Registry::label_hint(&type_discriminator),
        None => &type_discriminator,
    };
    let label = match explicit_label {
        Some(l) => {
            if spec.label_index(&l).is_some() {
                return Err(SpecError::DuplicateLabel(l));
            }
            l
        }
        None if autolabel => mint_label(spec, label_base),
        None => {
            let candidate = label_base.to_string();
            if spec.label_index(&candidate).is_some() {
                return Err(SpecError::DuplicateLabel(candidate));
            }
            candidate
        }
    };

    // Rule 5: vertex-local filters merge into the per-label raw filter map.
    if let Some(filters_json) = obj.remove("filters") {
        let filters_obj = filters_json
            .as_object()
            .ok_or_else(|| SpecError::FiltersNotAnObject(label.clone()))?;
        let entry = raw_filters.entry(label.clone()).or_default();
        for (k, v) in filters_obj {
            entry.insert(k.clone(), v.clone());
        }
    }

    // Rule 6: vertex-local projections append to the per-label list.
    if let Some(project_json) = obj.remove("project") {
        raw_projections
            .entry(label.clone())
            .or_default()
            .extend(parse_projection_value(&project_json));
    }

    // Rule 7: implicit type-discriminator filter, injected *after* the
    // vertex-local filters merge so it overrides a user-supplied "type" key,
    // and *before* top-level filters merge so a top-level "type" key can in
    // turn override it.
    if !matches!(type_discriminator.as_str(), SENTINEL_COMPUTER | SENTINEL_GROUP) {
        let prefix = type_discriminator.trim_end_matches('.');
        if !prefix.is_empty() {
            let mut like = Map::new();
            like.insert("like".to_string(), Json::String(format!("{prefix}%")));
            raw_filters
                .entry(label.clone())
                .or_default()
                .insert("type".to_string(), Json::Object(like));
        } else if type_discriminator != SENTINEL_NODE {
            return Err(SpecError::MalformedFilter(format!(
                "type '{type_discriminator}' yields no discriminator filter and is not the bare 'node' sentinel"
            )));
        }
    }

    // Rule 8: remaining keys are edge keywords.
    let mut edge_keyword: Option<(String, Json)> = None;
    for keyword in EDGE_KEYWORDS {
        if let Some(value) = obj.remove(*keyword) {
            if let Some((first, _)) = &edge_keyword {
                return Err(SpecError::MultipleEdgeKeywords {
                    first: first.clone(),
                    second: (*keyword).to_string(),
                });
            }
            edge_keyword = Some(((*keyword).to_string(), value));
        }
    }
    if !obj.is_empty() {
        let unknown: Vec<&str> = obj.keys().map(String::as_str).collect();
        return Err(SpecError::MalformedFilter(format!(
            "unrecognised vertex key(s): {}",
            unknown.join(", ")
        )));
    }

    let edge = if index == 0 {
        None
    } else {
        Some(build_edge_descriptor(edge_keyword, spec)?)
    };

    spec.path.push(Vertex {
        label,
        type_discriminator,
        bound_class,
        edge,
    });
    Ok(())
}

fn mint_label(spec: &QuerySpec, base: &str) -> String {
    let mut n = 1usize;
    loop {
        let candidate = format!("{base}_{n}");
        if spec.label_index(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

fn build_edge_descriptor(
    edge_keyword: Option<(String, Json)>,
    spec: &QuerySpec,
) -> Result<crate::spec::EdgeDescriptor, SpecError> {
    use crate::spec::EdgeDescriptor;

    let Some((keyword, value)) = edge_keyword else {
        return Ok(EdgeDescriptor::Direction(1));
    };

    if keyword == "direction" {
        let d = value
            .as_i64()
            .ok_or_else(|| SpecError::MalformedFilter("direction must be an integer".to_string()))?;
        if d == 0 {
            return Err(SpecError::ZeroDirection);
        }
        return Ok(EdgeDescriptor::Direction(d));
    }

    let target = parse_target(&value, spec)?;
    Ok(match keyword.as_str() {
        "input_of" => EdgeDescriptor::InputOf(target),
        "output_of" => EdgeDescriptor::OutputOf(target),
        "ancestor_of" => EdgeDescriptor::AncestorOf(target),
        "descendant_of" => EdgeDescriptor::DescendantOf(target),
        "group_of" => EdgeDescriptor::GroupOf(target),
        "member_of" => EdgeDescriptor::MemberOf(target),
        "used_by" => EdgeDescriptor::UsedBy(target),
        other => unreachable!("unrecognised edge keyword {other} slipped past EDGE_KEYWORDS"),
    })
}

/// A string target is resolved against labels already in the path first
/// (they are known, since the path is built left to right) and otherwise
/// treated as a class name, left for the edge resolver to bind against
/// `Vertex::bound_class`.
fn parse_target(value: &Json, spec: &QuerySpec) -> Result<Target, SpecError> {
    match value {
        Json::String(s) => {
            if spec.label_index(s).is_some() {
                Ok(Target::Label(s.clone()))
            } else {
                Ok(Target::Class(s.clone()))
            }
        }
        Json::Number(n) => {
            let i = n
                .as_i64()
                .ok_or_else(|| SpecError::MalformedFilter("edge target index must be an integer".to_string()))?;
            if i < 0 {
                return Err(SpecError::TargetIndexOutOfRange { index: i, at: spec.path.len() });
            }
            Ok(Target::Index(i as usize))
        }
        other => Err(SpecError::MalformedFilter(format!(
            "edge target must be a label, class name, or index, got {other}"
        ))),
    }
}

fn parse_projection_value(value: &Json) -> Vec<ProjectionSpec> {
    match value {
        Json::Array(items) => items
            .iter()
            .filter_map(Json::as_str)
            .map(ProjectionSpec::parse)
            .collect(),
        Json::String(s) => vec![ProjectionSpec::parse(s)],
        _ => Vec::new(),
    }
}

fn parse_order_by(value: &Json) -> Result<Vec<OrderEntry>, SpecError> {
    let entries = match value {
        Json::Array(items) => items.clone(),
        Json::Object(_) => vec![value.clone()],
        _ => return Err(SpecError::MalformedOrderBy("order_by must be an object or array of objects".to_string())),
    };
    let mut result = Vec::new();
    for entry in entries {
        let obj = entry
            .as_object()
            .ok_or_else(|| SpecError::MalformedOrderBy("each order_by entry must be an object".to_string()))?;
        for (label, cols) in obj {
            let columns = match cols {
                Json::Array(items) => items
                    .iter()
                    .filter_map(Json::as_str)
                    .map(str::to_string)
                    .collect(),
                Json::String(s) => vec![s.clone()],
                _ => {
                    return Err(SpecError::MalformedOrderBy(
                        "order_by columns must be a string or array of strings".to_string(),
                    ))
                }
            };
            result.push(OrderEntry {
                label: label.clone(),
                columns,
            });
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------
// Filter-tree construction, shared between document-level parsing above
// and the discriminator-filter injection used by the chained builders in
// `spec::builders`.
// ---------------------------------------------------------------------

/// Parse a top-level filter-tree object: keys are either `and`/`or`
/// (combining full sub-trees) or column paths (whose value is an operator
/// map). Multiple sibling keys form an implicit conjunction.
fn parse_filter_tree(value: &Json) -> Result<FilterNode, SpecError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SpecError::MalformedFilter("filter tree must be an object".to_string()))?;

    let mut children = Vec::new();
    for (key, val) in obj {
        match key.as_str() {
            "and" => children.push(FilterNode::And(parse_filter_sequence(val)?)),
            "or" => children.push(FilterNode::Or(parse_filter_sequence(val)?)),
            column_key => {
                let column = ColumnPath::parse(column_key);
                let opmap = val
                    .as_object()
                    .ok_or_else(|| SpecError::MalformedFilter(format!("filter for '{column_key}' must be an operator map")))?;
                children.push(parse_operator_map(&column, opmap)?);
            }
        }
    }
    Ok(simplify_and(children))
}

fn parse_filter_sequence(value: &Json) -> Result<Vec<FilterNode>, SpecError> {
    let items = value
        .as_array()
        .ok_or_else(|| SpecError::MalformedFilter("'and'/'or' must map to a sequence of sub-filters".to_string()))?;
    items.iter().map(parse_filter_tree).collect()
}

/// Parse a single column's operator map. Keys are operator names (optionally
/// `~`-prefixed for negation) or nested `and`/`or` combining predicates over
/// the *same* column.
fn parse_operator_map(column: &ColumnPath, obj: &Map<String, Json>) -> Result<FilterNode, SpecError> {
    let mut children = Vec::new();
    for (key, val) in obj {
        match key.as_str() {
            "and" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| SpecError::MalformedFilter("'and' must map to a sequence of operator maps".to_string()))?;
                let mut sub = Vec::new();
                for item in items {
                    let item_obj = item
                        .as_object()
                        .ok_or_else(|| SpecError::MalformedFilter("nested 'and' item must be an operator map".to_string()))?;
                    sub.push(parse_operator_map(column, item_obj)?);
                }
                children.push(FilterNode::And(sub));
            }
            "or" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| SpecError::MalformedFilter("'or' must map to a sequence of operator maps".to_string()))?;
                let mut sub = Vec::new();
                for item in items {
                    let item_obj = item
                        .as_object()
                        .ok_or_else(|| SpecError::MalformedFilter("nested 'or' item must be an operator map".to_string()))?;
                    sub.push(parse_operator_map(column, item_obj)?);
                }
                children.push(FilterNode::Or(sub));
            }
            op_key => {
                let (negated, bare_key) = match op_key.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, op_key),
                };
                let op = Op::from_str(bare_key)
                    .ok_or_else(|| SpecError::MalformedFilter(format!("unknown operator '{op_key}'")))?;
                let value = QbValue::from_json(val);
                children.push(FilterNode::Leaf {
                    column: column.clone(),
                    predicates: vec![Predicate { op, negated, value }],
                });
            }
        }
    }
    Ok(simplify_and(children))
}

fn simplify_and(mut children: Vec<FilterNode>) -> FilterNode {
    if children.len() == 1 {
        children.pop().unwrap()
    } else {
        FilterNode::And(children)
    }
}

/// Used by [`crate::spec::builders`] to inject a `type LIKE "<prefix>%"`
/// filter for a freshly-appended chained-builder vertex, which (unlike a
/// parsed document) has no vertex-local or top-level filters to merge with.
pub(crate) fn inject_discriminator_filter(spec: &mut QuerySpec, label: &str, prefix: &str) {
    let leaf = FilterNode::leaf(
        ColumnPath {
            column: "type".to_string(),
            json_path: Vec::new(),
        },
        Op::Like,
        false,
        QbValue::Str(format!("{prefix}%")),
    );
    spec.filters.insert(label.to_string(), leaf);
}
