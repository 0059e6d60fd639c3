//! # Edge Resolver
//!
//! Turns a vertex's [`EdgeDescriptor`](crate::spec::EdgeDescriptor) into a
//! concrete `(target_vertex_index, JoinKind)` pair. Index and label targets
//! are resolved directly; class targets are resolved against every binding
//! seen so far in the path, and a class bound to more than one label is an
//! ambiguity error rather than a silent pick-the-first.

use crate::error::SpecError;
use crate::spec::{EdgeDescriptor, QuerySpec, Target};

/// The join edge chosen for a non-initial vertex, independent of whichever
/// keyword (or `direction` fallback) the query-help spelled it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    InputOf,
    OutputOf,
    AncestorOf,
    DescendantOf,
    GroupOf,
    MemberOf,
    UsedBy,
}

/// Resolve `path[index]`'s edge descriptor to `(target_index, kind)`.
/// `index` must be `> 0`; the first vertex has no edge to resolve.
pub fn resolve(path: &[crate::spec::Vertex], index: usize) -> Result<(usize, JoinKind), SpecError> {
    let vertex = &path[index];
    let edge = vertex.edge.as_ref().expect("non-initial vertex always carries an edge descriptor");

    let (target, kind) = match edge {
        EdgeDescriptor::InputOf(t) => (t, JoinKind::InputOf),
        EdgeDescriptor::OutputOf(t) => (t, JoinKind::OutputOf),
        EdgeDescriptor::AncestorOf(t) => (t, JoinKind::AncestorOf),
        EdgeDescriptor::DescendantOf(t) => (t, JoinKind::DescendantOf),
        EdgeDescriptor::GroupOf(t) => (t, JoinKind::GroupOf),
        EdgeDescriptor::MemberOf(t) => (t, JoinKind::MemberOf),
        EdgeDescriptor::UsedBy(t) => (t, JoinKind::UsedBy),
        EdgeDescriptor::Direction(d) => return resolve_direction(*d, index),
    };
    let target_index = resolve_target(path, target, index)?;
    Ok((target_index, kind))
}

fn resolve_direction(d: i64, index: usize) -> Result<(usize, JoinKind), SpecError> {
    if d == 0 {
        return Err(SpecError::ZeroDirection);
    }
    let magnitude = d.unsigned_abs() as usize;
    let target_index = index
        .checked_sub(magnitude)
        .ok_or(SpecError::TargetIndexOutOfRange { index: -(magnitude as i64), at: index })?;
    let kind = if d > 0 { JoinKind::OutputOf } else { JoinKind::InputOf };
    Ok((target_index, kind))
}

fn resolve_target(path: &[crate::spec::Vertex], target: &Target, index: usize) -> Result<usize, SpecError> {
    match target {
        Target::Index(i) => {
            if *i < index {
                Ok(*i)
            } else {
                Err(SpecError::TargetIndexOutOfRange { index: *i as i64, at: index })
            }
        }
        Target::Label(label) => {
            path[..index]
                .iter()
                .position(|v| &v.label == label)
                .ok_or_else(|| SpecError::UnknownTargetLabel(label.clone()))
        }
        Target::Class(class_name) => {
            let matches: Vec<usize> = path[..index]
                .iter()
                .enumerate()
                .filter(|(_, v)| v.bound_class.as_ref().map(|c| &c.0 == class_name).unwrap_or(false))
                .map(|(i, _)| i)
                .collect();
            match matches.len() {
                0 => Err(SpecError::UnknownTargetLabel(class_name.clone())),
                1 => Ok(matches[0]),
                _ => Err(SpecError::AmbiguousClassTarget(class_name.clone())),
            }
        }
    }
}

/// Resolve every non-initial vertex in `spec.path`, in path order.
pub fn resolve_all(spec: &QuerySpec) -> Result<Vec<(usize, JoinKind)>, SpecError> {
    (1..spec.path.len()).map(|i| resolve(&spec.path, i)).collect()
}
