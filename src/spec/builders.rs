//! Chained builder operations for extending an already-parsed [`super::QuerySpec`]:
//! `inputs`, `outputs`, `children`, `parents`. Each appends one auto-labelled
//! vertex joined to the path's current last vertex, mirroring the fluent
//! `QueryBuilder.inputs()`/`.outputs()` style the distilled specification
//! describes.
//!
//! ```rust
//! use provql::registry::{Registry, ClassTag};
//! use provql::spec::QuerySpec;
//! use provql::spec::builders::append_outputs;
//!
//! let registry = Registry::builder()
//!     .node_class(ClassTag::new("Relax"), "process.calculation.relax.")
//!     .node_class(ClassTag::new("Structure"), "data.structure.")
//!     .build();
//!
//! let mut spec = QuerySpec::new();
//! // ... spec.path already has a "relax" vertex ...
//! # spec.path.push(provql::spec::Vertex {
//! #     label: "relax".to_string(),
//! #     type_discriminator: "process.calculation.relax.".to_string(),
//! #     bound_class: Some(ClassTag::new("Relax")),
//! #     edge: None,
//! # });
//! let label = append_outputs(&mut spec, &registry, ClassTag::new("Structure")).unwrap();
//! assert_eq!(label, "structure_1");
//! ```

use crate::error::SpecError;
use crate::registry::{ClassTag, Registry};
use crate::spec::{EdgeDescriptor, QuerySpec, Target, Vertex};

fn mint_label(spec: &QuerySpec, discriminator: &str) -> String {
    let hint = Registry::label_hint(discriminator);
    let mut n = 1usize;
    loop {
        let candidate = format!("{hint}_{n}");
        if spec.label_index(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

fn last_label(spec: &QuerySpec) -> Result<String, SpecError> {
    spec.path
        .last()
        .map(|v| v.label.clone())
        .ok_or(SpecError::EmptyPath)
}

fn append(
    spec: &mut QuerySpec,
    registry: &Registry,
    class: ClassTag,
    edge: impl FnOnce(Target) -> EdgeDescriptor,
) -> Result<String, SpecError> {
    let join_to = last_label(spec)?;
    let discriminator = registry
        .discriminator(&class)
        .map(str::to_string)
        .ok_or_else(|| SpecError::NotAClass(class.0.clone()))?;
    let label = mint_label(spec, &discriminator);

    if !matches!(discriminator.as_str(), "computer" | "group") {
        let prefix: String = discriminator.trim_end_matches('.').to_string();
        if !prefix.is_empty() {
            crate::parser::inject_discriminator_filter(spec, &label, &prefix);
        }
    }

    spec.path.push(Vertex {
        label: label.clone(),
        type_discriminator: discriminator,
        bound_class: Some(class),
        edge: Some(edge(Target::Label(join_to))),
    });
    Ok(label)
}

/// Join to the inputs of the current last vertex (`input_of: <last>`).
pub fn append_inputs(
    spec: &mut QuerySpec,
    registry: &Registry,
    class: ClassTag,
) -> Result<String, SpecError> {
    append(spec, registry, class, EdgeDescriptor::InputOf)
}

/// Join to the outputs of the current last vertex (`output_of: <last>`).
pub fn append_outputs(
    spec: &mut QuerySpec,
    registry: &Registry,
    class: ClassTag,
) -> Result<String, SpecError> {
    append(spec, registry, class, EdgeDescriptor::OutputOf)
}

/// Join to the descendants of the current last vertex (`descendant_of: <last>`).
pub fn append_children(
    spec: &mut QuerySpec,
    registry: &Registry,
    class: ClassTag,
) -> Result<String, SpecError> {
    append(spec, registry, class, EdgeDescriptor::DescendantOf)
}

/// Join to the ancestors of the current last vertex (`ancestor_of: <last>`).
pub fn append_parents(
    spec: &mut QuerySpec,
    registry: &Registry,
    class: ClassTag,
) -> Result<String, SpecError> {
    append(spec, registry, class, EdgeDescriptor::AncestorOf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builder()
            .node_class(ClassTag::new("Relax"), "process.calculation.relax.")
            .node_class(ClassTag::new("Structure"), "data.structure.")
            .build()
    }

    #[test]
    fn chained_outputs_auto_labels_and_injects_discriminator() {
        let registry = registry();
        let mut spec = QuerySpec::new();
        spec.path.push(Vertex {
            label: "relax".to_string(),
            type_discriminator: "process.calculation.relax.".to_string(),
            bound_class: Some(ClassTag::new("Relax")),
            edge: None,
        });

        let label = append_outputs(&mut spec, &registry, ClassTag::new("Structure")).unwrap();
        assert_eq!(label, "structure_1");
        assert!(spec.filters.contains_key(&label));
        match &spec.path[1].edge {
            Some(EdgeDescriptor::OutputOf(Target::Label(target))) => assert_eq!(target, "relax"),
            other => panic!("unexpected edge: {other:?}"),
        }
    }

    #[test]
    fn repeated_children_calls_mint_distinct_labels() {
        let registry = registry();
        let mut spec = QuerySpec::new();
        spec.path.push(Vertex {
            label: "relax".to_string(),
            type_discriminator: "process.calculation.relax.".to_string(),
            bound_class: Some(ClassTag::new("Relax")),
            edge: None,
        });
        let first = append_children(&mut spec, &registry, ClassTag::new("Structure")).unwrap();
        let second = append_children(&mut spec, &registry, ClassTag::new("Structure")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn empty_path_is_rejected() {
        let registry = registry();
        let mut spec = QuerySpec::new();
        let err = append_inputs(&mut spec, &registry, ClassTag::new("Structure")).unwrap_err();
        assert_eq!(err, SpecError::EmptyPath);
    }
}
