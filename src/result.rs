//! # Result Adapter
//!
//! Reshapes the positional rows [`QueryHandle::execute`](crate::backend::QueryHandle::execute)
//! returns into `label -> {projection_spec -> Value}` dictionaries, and
//! provides the small set of terminal operations (`first`, `all`,
//! `distinct`, `iter`, `as_dicts`) the query builder exposes to callers.

use crate::emitter::EmittedQuery;
use crate::error::QbResult;
use crate::spec::ProjectionSpec;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Converts a `"*"`-projected row into whatever high-level entity type the
/// host application wants (its ORM-backed node/group/computer wrapper,
/// typically). The adapter itself never interprets row contents beyond
/// this seam.
pub trait EntityFactory {
    fn wrap(&self, label: &str, row: Value) -> Value;
}

/// Used when the caller has no richer entity type: `"*"` rows pass through
/// as plain [`Value::Map`]s.
#[derive(Debug, Default)]
pub struct IdentityEntityFactory;

impl EntityFactory for IdentityEntityFactory {
    fn wrap(&self, _label: &str, row: Value) -> Value {
        row
    }
}

/// One result row reshaped into per-label projection dictionaries.
pub type RowDict = IndexMap<String, IndexMap<String, Value>>;

/// Terminal operations over an [`EmittedQuery`]. Every method re-executes
/// against the backend rather than draining a cached one-shot generator,
/// so callers mutating the builder between calls will see the new plan —
/// this is documented, not defended against, since a builder mutation
/// already invalidates and rebuilds the memoised handle before the next
/// adapter call can run.
pub struct ResultAdapter<'a> {
    query: &'a EmittedQuery,
    default_batch_size: usize,
}

impl<'a> ResultAdapter<'a> {
    pub fn new(query: &'a EmittedQuery, default_batch_size: usize) -> ResultAdapter<'a> {
        ResultAdapter { query, default_batch_size }
    }

    /// The first row, or `None` if the query matched nothing.
    pub fn first(&self) -> QbResult<Option<Vec<Value>>> {
        Ok(self.query.handle.execute(1)?.into_iter().next())
    }

    /// Every row, executed in one unbatched call.
    pub fn all(&self) -> QbResult<Vec<Vec<Value>>> {
        Ok(self.query.handle.execute(usize::MAX)?)
    }

    /// Every row with exact duplicates removed, first-seen order preserved.
    pub fn distinct(&self) -> QbResult<Vec<Vec<Value>>> {
        let rows = self.all()?;
        let mut seen = HashSet::with_capacity(rows.len());
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let key = serde_json::to_string(&row.iter().map(Value::to_json).collect::<Vec<_>>())
                .expect("row values always serialise");
            if seen.insert(key) {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Every row, executed in batches of `batch` (or
    /// [`Config::default_batch_size`](crate::config::Config::default_batch_size)
    /// when `None`). The in-memory reference backend has no I/O to chunk,
    /// so batching only changes how many round trips a real backend makes,
    /// never the result.
    pub fn iter(&self, batch: Option<usize>) -> QbResult<std::vec::IntoIter<Vec<Value>>> {
        let batch_size = batch.unwrap_or(self.default_batch_size).max(1);
        Ok(self.query.handle.execute(batch_size)?.into_iter())
    }

    /// Every row, reshaped into `{label: {spec_key: Value}}`, `"*"`
    /// positions converted through `factory`.
    pub fn as_dicts(&self, factory: &dyn EntityFactory) -> QbResult<Vec<RowDict>> {
        let rows = self.all()?;
        Ok(rows.iter().map(|row| reshape(&self.query.layout, row, factory)).collect())
    }
}

fn reshape(layout: &[(String, ProjectionSpec, usize)], row: &[Value], factory: &dyn EntityFactory) -> RowDict {
    let mut dict: RowDict = IndexMap::new();
    for (label, spec, position) in layout {
        let raw = row.get(*position).cloned().unwrap_or(Value::Null);
        let value = if matches!(spec, ProjectionSpec::Star) { factory.wrap(label, raw) } else { raw };
        dict.entry(label.clone()).or_default().insert(spec.to_dotted(), value);
    }
    dict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryExpressionBuilder, MemoryStore, MemorySession, Row, SimpleAliasFactory};
    use crate::emitter;
    use crate::parser;
    use crate::registry::{ClassTag, Registry};
    use serde_json::json;

    fn two_calc_query() -> (Registry, MemoryStore, crate::spec::QuerySpec) {
        let registry = Registry::builder().node_class(ClassTag::new("Calc"), "process.calculation.").build();
        let query_help = json!({"path": [{"cls": "Calc", "label": "c"}], "project": {"c": ["id", "*"]}});
        let spec = parser::parse(&query_help, &registry).unwrap();

        let mut store = MemoryStore::new();
        for id in [1, 2] {
            store.insert_row(
                "db_dbnode",
                Row::from_iter([
                    ("id".to_string(), Value::Int(id)),
                    ("type".to_string(), Value::Str("process.calculation.".to_string())),
                ]),
            );
        }
        (registry, store, spec)
    }

    #[test]
    fn first_returns_the_first_row_only() {
        let (registry, store, spec) = two_calc_query();
        let session = MemorySession::new(store);
        let mut factory = SimpleAliasFactory::new();
        let eb = MemoryExpressionBuilder;
        let emitted = emitter::emit(&spec, &registry, &mut factory, &session, &eb).unwrap();
        let adapter = ResultAdapter::new(&emitted, 100);
        let row = adapter.first().unwrap().unwrap();
        assert_eq!(row[0], Value::Int(1));
    }

    #[test]
    fn as_dicts_groups_by_label_and_keys_by_projection() {
        let (registry, store, spec) = two_calc_query();
        let session = MemorySession::new(store);
        let mut factory = SimpleAliasFactory::new();
        let eb = MemoryExpressionBuilder;
        let emitted = emitter::emit(&spec, &registry, &mut factory, &session, &eb).unwrap();
        let adapter = ResultAdapter::new(&emitted, 100);
        let dicts = adapter.as_dicts(&IdentityEntityFactory).unwrap();
        assert_eq!(dicts.len(), 2);
        assert_eq!(dicts[0]["c"]["id"], Value::Int(1));
        assert!(matches!(dicts[0]["c"]["*"], Value::Map(_)));
    }

    #[test]
    fn distinct_collapses_duplicate_rows() {
        let (registry, _store, _spec) = two_calc_query();
        let mut store = MemoryStore::new();
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(7)),
                ("type".to_string(), Value::Str("process.calculation.".to_string())),
            ]),
        );
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(7)),
                ("type".to_string(), Value::Str("process.calculation.".to_string())),
            ]),
        );
        let query_help = json!({"path": [{"cls": "Calc", "label": "c"}], "project": {"c": ["id"]}});
        let spec = parser::parse(&query_help, &registry).unwrap();
        let session = MemorySession::new(store);
        let mut factory = SimpleAliasFactory::new();
        let eb = MemoryExpressionBuilder;
        let emitted = emitter::emit(&spec, &registry, &mut factory, &session, &eb).unwrap();
        let adapter = ResultAdapter::new(&emitted, 100);
        assert_eq!(adapter.all().unwrap().len(), 2);
        assert_eq!(adapter.distinct().unwrap(), vec![vec![Value::Int(7)]]);
    }
}
