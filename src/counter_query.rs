//! # Counter-query / Exclusion
//!
//! `except_if_input_to` builds a second specification over a calculation
//! class, joined to each of the main path's projected labels as an output,
//! so that subtracting its rows from the main query's rows leaves only the
//! entities *not yet* consumed as an input to any instance of that
//! calculation — the "pending inputs" primitive.

use crate::error::ProjectionError;
use crate::registry::{ClassTag, Registry, SENTINEL_NODE};
use crate::spec::{EdgeDescriptor, ProjectionSpec, QuerySpec, Target, Vertex};
use crate::value::Value;
use std::collections::HashSet;

/// The main specification paired with the counter specification built
/// against it. Both are emitted and executed independently; [`except`]
/// then subtracts one result set from the other.
#[derive(Debug, Clone)]
pub struct CounterQuery {
    pub main: QuerySpec,
    pub counter: QuerySpec,
}

/// Build the counter query for `except_if_input_to(calc)` against `main`.
/// Every label `main` projects (or the default last-vertex `"*"` if it
/// projects nothing at all) must project exactly `["*"]`, since the
/// subtraction compares whole projected entities.
pub fn except_if_input_to(main: &QuerySpec, registry: &Registry, calc: ClassTag) -> Result<CounterQuery, ProjectionError> {
    let projected = projected_labels(main);
    for label in &projected {
        if let Some(specs) = main.projections.get(label) {
            if specs.as_slice() != [ProjectionSpec::Star] {
                return Err(ProjectionError::NonStarInCounterQuery {
                    label: label.clone(),
                    spec: format!("{specs:?}"),
                });
            }
        }
    }

    let mut counter = main.clone();
    counter.order_by.clear();
    counter.limit = None;

    // The discriminator filter is only injected when `calc` resolves to a
    // concrete subclass; an unregistered class falls back to its bare name
    // as the discriminator, same as the compiler does for any unrecognised
    // discriminator string.
    let discriminator = registry.discriminator(&calc).map(str::to_string).unwrap_or_else(|| calc.0.clone());

    for label in &projected {
        // Projections on the original labels get reset to exactly "*":
        // the validation above only rejects a *declared* non-"*"
        // projection, so a label that fell under the default (no entry in
        // `main.projections` at all) needs one added here.
        counter.projections.insert(label.clone(), vec![ProjectionSpec::Star]);

        let calc_label = mint_calc_label(&counter, &discriminator);
        if discriminator != SENTINEL_NODE {
            let prefix = discriminator.trim_end_matches('.').to_string();
            if !prefix.is_empty() {
                crate::parser::inject_discriminator_filter(&mut counter, &calc_label, &prefix);
            }
        }
        counter.path.push(Vertex {
            label: calc_label,
            type_discriminator: discriminator.clone(),
            bound_class: Some(calc.clone()),
            // `calc.id = link.output_id`, `alias.id = link.input_id`: the
            // calc alias is emitted as `output_of` the already-present
            // label, i.e. the label is an input to it.
            edge: Some(EdgeDescriptor::OutputOf(Target::Label(label.clone()))),
        });
        // The calc column itself is never projected; only its join
        // narrows which rows of `label` survive.
    }

    Ok(CounterQuery { main: main.clone(), counter })
}

/// The labels a spec actually projects: its declared `projections` keys,
/// or the default last-vertex `"*"` the emitter falls back to when nothing
/// was declared at all.
fn projected_labels(spec: &QuerySpec) -> Vec<String> {
    if spec.projections.is_empty() {
        spec.path.last().map(|v| vec![v.label.clone()]).unwrap_or_default()
    } else {
        spec.projections.keys().cloned().collect()
    }
}

fn mint_calc_label(spec: &QuerySpec, discriminator: &str) -> String {
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

/// `main.except(counter)`: rows of `main_rows` whose key doesn't appear in
/// `counter_rows`, deduplicated — matching SQL `EXCEPT`'s set semantics
/// rather than a bag-preserving subtraction.
pub fn except(main_rows: Vec<Vec<Value>>, counter_rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let excluded: HashSet<String> = counter_rows.iter().map(|row| row_key(row)).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in main_rows {
        let key = row_key(&row);
        if !excluded.contains(&key) && seen.insert(key) {
            out.push(row);
        }
    }
    out
}

fn row_key(row: &[Value]) -> String {
    serde_json::to_string(&row.iter().map(Value::to_json).collect::<Vec<_>>()).expect("row values always serialise")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryExpressionBuilder, MemoryStore, MemorySession, Row, SimpleAliasFactory};
    use crate::emitter;
    use crate::parser;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::builder()
            .node_class(ClassTag::new("Structure"), "data.structure.")
            .node_class(ClassTag::new("CalcX"), "process.calculation.calcx.")
            .build()
    }

    #[test]
    fn non_star_projection_is_rejected() {
        let registry = registry();
        let query_help = json!({"path": [{"cls": "Structure", "label": "s"}], "project": {"s": ["id"]}});
        let main = parser::parse(&query_help, &registry).unwrap();
        let err = except_if_input_to(&main, &registry, ClassTag::new("CalcX")).unwrap_err();
        assert!(matches!(err, ProjectionError::NonStarInCounterQuery { .. }));
    }

    #[test]
    fn s6_pending_structures_excludes_those_already_consumed() {
        // S6: three structures, two of which are inputs to a CalcX instance;
        // except_if_input_to(CalcX) should return exactly the third.
        let registry = registry();
        let query_help = json!({"path": [{"cls": "Structure", "label": "s"}], "project": {"s": ["*"]}});
        let main_spec = parser::parse(&query_help, &registry).unwrap();
        let counter_query = except_if_input_to(&main_spec, &registry, ClassTag::new("CalcX")).unwrap();

        let mut store = MemoryStore::new();
        for id in [1, 2, 3] {
            store.insert_row(
                "db_dbnode",
                Row::from_iter([
                    ("id".to_string(), Value::Int(id)),
                    ("type".to_string(), Value::Str("data.structure.".to_string())),
                ]),
            );
        }
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(100)),
                ("type".to_string(), Value::Str("process.calculation.calcx.".to_string())),
            ]),
        );
        store.insert_row(
            "db_dblink",
            Row::from_iter([
                ("input_id".to_string(), Value::Int(1)),
                ("output_id".to_string(), Value::Int(100)),
            ]),
        );
        store.insert_row(
            "db_dblink",
            Row::from_iter([
                ("input_id".to_string(), Value::Int(2)),
                ("output_id".to_string(), Value::Int(100)),
            ]),
        );

        let session = MemorySession::new(store);
        let eb = MemoryExpressionBuilder;

        let mut main_factory = SimpleAliasFactory::new();
        let main_emitted = emitter::emit(&counter_query.main, &registry, &mut main_factory, &session, &eb).unwrap();
        let main_rows = main_emitted.handle.execute(100).unwrap();

        let mut counter_factory = SimpleAliasFactory::new();
        let counter_emitted =
            emitter::emit(&counter_query.counter, &registry, &mut counter_factory, &session, &eb).unwrap();
        let counter_rows = counter_emitted.handle.execute(100).unwrap();

        let pending = except(main_rows, counter_rows);
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0][0],
            Value::Map(vec![
                ("id".to_string(), Value::Int(3)),
                ("type".to_string(), Value::Str("data.structure.".to_string())),
            ])
        );
    }
}
