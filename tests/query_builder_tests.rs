//! End-to-end scenarios against the [`provql::QueryBuilder`] facade and the
//! in-memory reference backend, covering the named concrete scenarios (S1,
//! S2, S3, S8) that exercise more than one module at once.

use provql::backend::memory::{MemoryExpressionBuilder, MemoryStore, MemorySession, Row, SimpleAliasFactory};
use provql::config::Config;
use provql::registry::{ClassTag, Registry};
use provql::value::Value;
use provql::QueryBuilder;
use serde_json::json;
use std::sync::Arc;

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .node_class(ClassTag::new("Calc"), "process.calculation.")
            .node_class(ClassTag::new("Structure"), "data.structure.")
            .build(),
    )
}

fn structure_row(id: i64, cell: i64) -> Row {
    Row::from_iter([
        ("id".to_string(), Value::Int(id)),
        ("type".to_string(), Value::Str("data.structure.".to_string())),
        ("attributes".to_string(), Value::Map(vec![("cell".to_string(), Value::Int(cell))])),
    ])
}

fn builder(query_help: &serde_json::Value, registry: Arc<Registry>, store: MemoryStore) -> QueryBuilder {
    QueryBuilder::new(
        query_help,
        registry,
        Box::new(MemorySession::new(store)),
        Box::new(SimpleAliasFactory::new()),
        Box::new(MemoryExpressionBuilder),
        Config::default(),
    )
    .unwrap()
}

#[test]
fn s1_single_vertex_discriminator_string_executes_against_the_node_table() {
    let mut store = MemoryStore::new();
    store.insert_row("db_dbnode", structure_row(1, 3));
    store.insert_row("db_dbnode", Row::from_iter([
        ("id".to_string(), Value::Int(2)),
        ("type".to_string(), Value::Str("process.calculation.".to_string())),
    ]));

    let mut qb = builder(&json!({"path": ["data.structure."]}), registry(), store);
    let rows = qb.all().unwrap();
    // Only the structure row survives the injected `type LIKE "data.structure.%"` filter.
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::Map(vec![
        ("id".to_string(), Value::Int(1)),
        ("type".to_string(), Value::Str("data.structure.".to_string())),
        ("attributes".to_string(), Value::Map(vec![("cell".to_string(), Value::Int(3))])),
    ]));
}

#[test]
fn s2_output_of_join_via_chained_builder_call() {
    let mut store = MemoryStore::new();
    store.insert_row("db_dbnode", Row::from_iter([
        ("id".to_string(), Value::Int(1)),
        ("type".to_string(), Value::Str("process.calculation.".to_string())),
    ]));
    store.insert_row("db_dbnode", structure_row(2, 5));
    store.insert_row("db_dblink", Row::from_iter([
        ("input_id".to_string(), Value::Int(1)),
        ("output_id".to_string(), Value::Int(2)),
    ]));

    let registry = registry();
    let mut qb = builder(&json!({"path": [{"cls": "Calc", "label": "c"}]}), registry.clone(), store);
    qb.outputs(ClassTag::new("Structure")).unwrap();
    let rows = qb.all().unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn s3_nested_or_and_filter_over_a_json_path_matches_expected_rows() {
    let mut store = MemoryStore::new();
    store.insert_row("db_dbnode", structure_row(1, 1)); // cell < 3 -> matches first disjunct
    store.insert_row("db_dbnode", structure_row(2, 4)); // neither disjunct
    store.insert_row("db_dbnode", structure_row(3, 6)); // 5 < cell < 7 -> matches second disjunct
    store.insert_row("db_dbnode", structure_row(4, 9)); // neither disjunct

    let query_help = json!({
        "path": [{"type": "data.structure.", "label": "s"}],
        "filters": {
            "s": {
                "attributes.cell": {
                    "or": [
                        {"<": 3},
                        {">": 5, "<": 7}
                    ]
                }
            }
        },
        "project": {"s": ["id"]}
    });
    let mut qb = builder(&query_help, registry(), store);
    let mut ids: Vec<i64> = qb.all().unwrap().into_iter().map(|row| row[0].as_int().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn s8_limit_returns_a_prefix_of_the_unlimited_result_under_the_same_order() {
    let mut store = MemoryStore::new();
    for id in [3, 1, 2] {
        store.insert_row("db_dbnode", structure_row(id, 0));
    }
    let registry = registry();

    let unlimited_help = json!({
        "path": [{"type": "data.structure.", "label": "s"}],
        "project": {"s": ["id"]},
        "order_by": {"s": "id"}
    });
    let mut unlimited = builder(&unlimited_help, registry.clone(), {
        let mut s = MemoryStore::new();
        for id in [3, 1, 2] {
            s.insert_row("db_dbnode", structure_row(id, 0));
        }
        s
    });
    let all_rows = unlimited.all().unwrap();

    let limited_help = json!({
        "path": [{"type": "data.structure.", "label": "s"}],
        "project": {"s": ["id"]},
        "order_by": {"s": "id"},
        "limit": 2
    });
    let mut limited = builder(&limited_help, registry, store);
    let limited_rows = limited.all().unwrap();

    assert_eq!(limited_rows.len(), 2);
    assert_eq!(limited_rows, all_rows[..2]);
}

#[test]
fn chained_mutation_after_build_invalidates_the_memoised_handle() {
    let mut store = MemoryStore::new();
    store.insert_row("db_dbnode", Row::from_iter([
        ("id".to_string(), Value::Int(1)),
        ("type".to_string(), Value::Str("process.calculation.".to_string())),
    ]));
    store.insert_row("db_dbnode", structure_row(2, 0));
    store.insert_row("db_dblink", Row::from_iter([
        ("input_id".to_string(), Value::Int(1)),
        ("output_id".to_string(), Value::Int(2)),
    ]));

    let registry = registry();
    let mut qb = builder(&json!({"path": [{"cls": "Calc", "label": "c"}], "project": {"c": ["id"]}}), registry, store);
    let before = qb.all().unwrap();
    assert_eq!(before, vec![vec![Value::Int(1)]]);

    // Mutating after the handle is built must be reflected in the next call,
    // not silently served from the stale cached plan.
    qb.outputs(ClassTag::new("Structure")).unwrap();
    let after = qb.all().unwrap();
    assert_eq!(after.len(), 1);
    assert_ne!(after, before);
}
