//! # Query Emitter
//!
//! Orchestrates alias minting, two-step join emission, filter attachment,
//! projection ordering, `ORDER BY`, and `LIMIT` against a live
//! [`Session`]/[`ExpressionBuilder`] pair. The only component that talks to
//! the [`Registry`] and the backend collaborator traits in the same
//! function.

use crate::backend::{AliasFactory, AliasHandle, ExpressionBuilder, JoinEdge, ProjectionTarget, QueryHandle, Session};
use crate::edge_resolver::{self, JoinKind};
use crate::error::{QbError, SpecError};
use crate::filter;
use crate::registry::{Registry, TableRef};
use crate::spec::{ProjectionSpec, QuerySpec};
use std::collections::HashSet;

/// The two-step join emitted for each non-initial vertex, reproduced
/// verbatim from the join-kind table; `used_by` is the only kind with no
/// intermediate table.
///
/// | join_kind     | intermediate table | pred A                      | pred B                              |
/// |---------------|---------------------|-------------------------------|----------------------------------------|
/// | output_of     | node-link           | link.input_id  = target.id    | link.output_id = alias\[i\].id         |
/// | input_of      | node-link           | link.output_id = target.id    | link.input_id  = alias\[i\].id         |
/// | descendant_of | closure-path        | path.parent_id = target.id    | path.child_id  = alias\[i\].id         |
/// | ancestor_of   | closure-path        | path.child_id  = target.id    | path.parent_id = alias\[i\].id         |
/// | member_of     | group-nodes         | gn.dbgroup_id  = target.id    | gn.dbnode_id   = alias\[i\].id         |
/// | group_of      | group-nodes         | gn.dbnode_id   = target.id    | gn.dbgroup_id  = alias\[i\].id         |
/// | used_by       | (no intermediate)   | —                              | alias\[i\].id = target.dbcomputer_id   |
pub const JOIN_KIND_TABLE: () = ();

/// Result of [`emit`]: a handle ready for `execute`, plus where each
/// label's projections landed in each result row. Consumed by the result
/// adapter.
#[derive(Debug)]
pub struct EmittedQuery {
    pub handle: Box<dyn QueryHandle>,
    /// `(label, projection spec, position)` in emission order.
    pub layout: Vec<(String, ProjectionSpec, usize)>,
}

/// Lower a [`QuerySpec`] into a backend query plan: mint an alias per
/// vertex, emit joins in path order, attach filters, assign projections,
/// then `ORDER BY`/`LIMIT`.
pub fn emit(
    spec: &QuerySpec,
    registry: &Registry,
    factory: &mut dyn AliasFactory,
    session: &dyn Session,
    eb: &dyn ExpressionBuilder,
) -> Result<EmittedQuery, QbError> {
    verify_unique_labels(spec)?;

    let aliases: Vec<Box<dyn AliasHandle>> = spec
        .path
        .iter()
        .map(|vertex| factory.new_alias(registry.table_for(&vertex.type_discriminator)))
        .collect();

    let mut handle = session.query(aliases[0].box_clone());

    for (i, (target_index, kind)) in edge_resolver::resolve_all(spec)?.into_iter().enumerate() {
        let vertex_index = i + 1;
        emit_join(
            handle.as_mut(),
            factory,
            registry,
            kind,
            aliases[target_index].as_ref(),
            aliases[vertex_index].as_ref(),
        )?;
    }

    for (i, vertex) in spec.path.iter().enumerate() {
        if let Some(node) = spec.filters.get(&vertex.label) {
            let expr = filter::compile(aliases[i].as_ref(), node, eb)?;
            handle.filter(expr)?;
        }
    }

    let mut layout = Vec::new();
    let mut any_projected = false;
    for (i, vertex) in spec.path.iter().enumerate() {
        if let Some(specs) = spec.projections.get(&vertex.label) {
            any_projected = true;
            for projection in specs {
                let position = handle.project(aliases[i].as_ref(), projection_target(projection))?;
                layout.push((vertex.label.clone(), projection.clone(), position));
            }
        }
    }
    if !any_projected {
        let last = spec.path.len() - 1;
        let position = handle.project(aliases[last].as_ref(), ProjectionTarget::Star)?;
        layout.push((spec.path[last].label.clone(), ProjectionSpec::Star, position));
    }

    for entry in &spec.order_by {
        let index = spec.label_index(&entry.label).ok_or_else(|| {
            SpecError::UnknownLabel { label: entry.label.clone(), context: "order_by" }
        })?;
        for column in &entry.columns {
            handle.order_by(aliases[index].as_ref(), column)?;
        }
    }

    if let Some(limit) = spec.limit {
        handle.limit(limit)?;
    }

    Ok(EmittedQuery { handle, layout })
}

fn verify_unique_labels(spec: &QuerySpec) -> Result<(), SpecError> {
    let mut seen = HashSet::with_capacity(spec.path.len());
    for vertex in &spec.path {
        if !seen.insert(vertex.label.as_str()) {
            return Err(SpecError::DuplicateLabel(vertex.label.clone()));
        }
    }
    Ok(())
}

fn projection_target(spec: &ProjectionSpec) -> ProjectionTarget {
    match spec {
        ProjectionSpec::Star => ProjectionTarget::Star,
        ProjectionSpec::Column(c) => ProjectionTarget::Column(c.clone()),
        ProjectionSpec::JsonPath(head, rest) => ProjectionTarget::JsonPath(head.clone(), rest.clone()),
    }
}

type JoinShape = (TableRef, JoinEdge, &'static str, &'static str, &'static str, &'static str);

fn two_step_shape(kind: JoinKind, registry: &Registry) -> Option<JoinShape> {
    let edge_tables = registry.edge_tables();
    Some(match kind {
        JoinKind::OutputOf => (edge_tables.link.clone(), JoinEdge::Link, "id", "input_id", "output_id", "id"),
        JoinKind::InputOf => (edge_tables.link.clone(), JoinEdge::Link, "id", "output_id", "input_id", "id"),
        JoinKind::DescendantOf => {
            (edge_tables.closure_path.clone(), JoinEdge::ClosurePath, "id", "parent_id", "child_id", "id")
        }
        JoinKind::AncestorOf => {
            (edge_tables.closure_path.clone(), JoinEdge::ClosurePath, "id", "child_id", "parent_id", "id")
        }
        JoinKind::MemberOf => {
            (edge_tables.group_nodes.clone(), JoinEdge::GroupNodes, "id", "dbgroup_id", "dbnode_id", "id")
        }
        JoinKind::GroupOf => {
            (edge_tables.group_nodes.clone(), JoinEdge::GroupNodes, "id", "dbnode_id", "dbgroup_id", "id")
        }
        JoinKind::UsedBy => return None,
    })
}

fn emit_join(
    handle: &mut dyn QueryHandle,
    factory: &mut dyn AliasFactory,
    registry: &Registry,
    kind: JoinKind,
    target_alias: &dyn AliasHandle,
    vertex_alias: &dyn AliasHandle,
) -> Result<(), QbError> {
    match two_step_shape(kind, registry) {
        None => {
            // `used_by`: alias[i].id = target.dbcomputer_id, no intermediate table.
            handle.join(JoinEdge::ComputerForeignKey, target_alias, "dbcomputer_id", vertex_alias, "id")?;
        }
        Some((table, edge, target_col_a, intermediate_col_a, intermediate_col_b, vertex_col_b)) => {
            let intermediate = factory.new_alias(&table);
            handle.join(edge, target_alias, target_col_a, intermediate.as_ref(), intermediate_col_a)?;
            handle.join(edge, intermediate.as_ref(), intermediate_col_b, vertex_alias, vertex_col_b)?;
        }
    }
    Ok(())
}
