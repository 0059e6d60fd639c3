//! # In-memory reference backend
//!
//! A small nested-loop join engine over [`IndexMap`]-shaped rows, used by
//! the test suite and doctests so the compiler's output can be exercised
//! without a real relational store. Not tuned for anything beyond
//! correctness: every join is a linear scan.

use crate::backend::{AliasFactory, AliasHandle, BoxedExpr, ExpressionBuilder, JoinEdge, ProjectionTarget, QueryHandle, Session};
use crate::error::BackendError;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

pub type Row = IndexMap<String, Value>;

/// A fixed set of named tables, each a list of rows. Seeded directly by
/// tests; never mutated once wrapped in a [`MemorySession`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore { tables: HashMap::new() }
    }

    pub fn insert_row(&mut self, table: &str, row: Row) {
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct MemoryAliasHandle {
    id: usize,
    table: String,
}

impl MemoryAliasHandle {
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl AliasHandle for MemoryAliasHandle {
    fn id(&self) -> usize {
        self.id
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn box_clone(&self) -> Box<dyn AliasHandle> {
        Box::new(self.clone())
    }
}

/// Mints [`MemoryAliasHandle`]s with sequential ids. Independent of any
/// particular [`MemorySession`]; the emitter owns one per `emit` call.
#[derive(Debug, Default)]
pub struct SimpleAliasFactory {
    next: usize,
}

impl SimpleAliasFactory {
    pub fn new() -> SimpleAliasFactory {
        SimpleAliasFactory::default()
    }
}

impl AliasFactory for SimpleAliasFactory {
    fn new_alias(&mut self, table: &crate::registry::TableRef) -> Box<dyn AliasHandle> {
        let id = self.next;
        self.next += 1;
        Box::new(MemoryAliasHandle { id, table: table.0.clone() })
    }
}

/// The expression tree a [`MemoryExpressionBuilder`] actually builds;
/// [`BoxedExpr`] values are this type downcast through `dyn Any`.
#[derive(Debug, Clone)]
enum MemoryExpr {
    Column(usize, String),
    JsonDescent(Box<MemoryExpr>, Vec<String>),
    Literal(Value),
    Eq(Box<MemoryExpr>, Box<MemoryExpr>),
    Lt(Box<MemoryExpr>, Box<MemoryExpr>),
    Gt(Box<MemoryExpr>, Box<MemoryExpr>),
    Le(Box<MemoryExpr>, Box<MemoryExpr>),
    Ge(Box<MemoryExpr>, Box<MemoryExpr>),
    Like(Box<MemoryExpr>, Box<MemoryExpr>),
    ILike(Box<MemoryExpr>, Box<MemoryExpr>),
    In(Box<MemoryExpr>, Box<MemoryExpr>),
    Contains(Box<MemoryExpr>, Box<MemoryExpr>),
    HasKey(Box<MemoryExpr>, Box<MemoryExpr>),
    OfLength(Box<MemoryExpr>, Box<MemoryExpr>),
    Longer(Box<MemoryExpr>, Box<MemoryExpr>),
    Shorter(Box<MemoryExpr>, Box<MemoryExpr>),
    Not(Box<MemoryExpr>),
    And(Vec<MemoryExpr>),
    Or(Vec<MemoryExpr>),
}

fn downcast(expr: BoxedExpr) -> MemoryExpr {
    *expr
        .downcast::<MemoryExpr>()
        .expect("BoxedExpr passed to MemoryExpressionBuilder must originate from it")
}

fn boxed(expr: MemoryExpr) -> BoxedExpr {
    Box::new(expr)
}

/// The reference [`ExpressionBuilder`]: no SQL, just an AST the query
/// handle below walks directly against in-memory rows.
#[derive(Debug, Default)]
pub struct MemoryExpressionBuilder;

impl ExpressionBuilder for MemoryExpressionBuilder {
    fn column(&self, alias: &dyn AliasHandle, name: &str) -> BoxedExpr {
        boxed(MemoryExpr::Column(alias.id(), name.to_string()))
    }

    fn json_descent(&self, expr: BoxedExpr, path: &[String]) -> BoxedExpr {
        boxed(MemoryExpr::JsonDescent(Box::new(downcast(expr)), path.to_vec()))
    }

    fn literal(&self, value: &Value) -> BoxedExpr {
        boxed(MemoryExpr::Literal(value.clone()))
    }

    fn eq(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Eq(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn lt(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Lt(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn gt(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Gt(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn le(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Le(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn ge(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Ge(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn like(&self, lhs: BoxedExpr, pattern: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Like(Box::new(downcast(lhs)), Box::new(downcast(pattern))))
    }
    fn ilike(&self, lhs: BoxedExpr, pattern: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::ILike(Box::new(downcast(lhs)), Box::new(downcast(pattern))))
    }
    fn in_list(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::In(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn contains(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Contains(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn has_key(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::HasKey(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn of_length(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::OfLength(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn longer(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Longer(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }
    fn shorter(&self, lhs: BoxedExpr, rhs: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Shorter(Box::new(downcast(lhs)), Box::new(downcast(rhs))))
    }

    fn not(&self, expr: BoxedExpr) -> BoxedExpr {
        boxed(MemoryExpr::Not(Box::new(downcast(expr))))
    }
    fn and(&self, exprs: Vec<BoxedExpr>) -> BoxedExpr {
        boxed(MemoryExpr::And(exprs.into_iter().map(downcast).collect()))
    }
    fn or(&self, exprs: Vec<BoxedExpr>) -> BoxedExpr {
        boxed(MemoryExpr::Or(exprs.into_iter().map(downcast).collect()))
    }
}

type Tuple = HashMap<usize, Row>;

fn eval_value(expr: &MemoryExpr, tuple: &Tuple) -> Value {
    match expr {
        MemoryExpr::Column(alias_id, name) => tuple
            .get(alias_id)
            .and_then(|row| row.get(name))
            .cloned()
            .unwrap_or(Value::Null),
        MemoryExpr::JsonDescent(inner, path) => {
            let mut current = eval_value(inner, tuple);
            for segment in path {
                current = match &current {
                    Value::Map(entries) => entries
                        .iter()
                        .find(|(k, _)| k == segment)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null),
                    Value::List(items) => segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                };
            }
            current
        }
        MemoryExpr::Literal(v) => v.clone(),
        _ => Value::Null,
    }
}

fn eval_bool(expr: &MemoryExpr, tuple: &Tuple) -> bool {
    match expr {
        MemoryExpr::Eq(l, r) => eval_value(l, tuple) == eval_value(r, tuple),
        MemoryExpr::Lt(l, r) => compare(eval_value(l, tuple), eval_value(r, tuple)) == Some(std::cmp::Ordering::Less),
        MemoryExpr::Gt(l, r) => compare(eval_value(l, tuple), eval_value(r, tuple)) == Some(std::cmp::Ordering::Greater),
        MemoryExpr::Le(l, r) => matches!(
            compare(eval_value(l, tuple), eval_value(r, tuple)),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        MemoryExpr::Ge(l, r) => matches!(
            compare(eval_value(l, tuple), eval_value(r, tuple)),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        MemoryExpr::Like(l, r) => like_match(&eval_value(l, tuple), &eval_value(r, tuple), false),
        MemoryExpr::ILike(l, r) => like_match(&eval_value(l, tuple), &eval_value(r, tuple), true),
        MemoryExpr::In(l, r) => {
            let needle = eval_value(l, tuple);
            match eval_value(r, tuple) {
                Value::List(items) => items.contains(&needle),
                _ => false,
            }
        }
        MemoryExpr::Contains(l, r) => match (eval_value(l, tuple), eval_value(r, tuple)) {
            (Value::List(items), Value::List(wanted)) => wanted.iter().all(|w| items.contains(w)),
            (Value::Map(entries), Value::Map(wanted)) => {
                wanted.iter().all(|(k, v)| entries.iter().any(|(ek, ev)| ek == k && ev == v))
            }
            _ => false,
        },
        MemoryExpr::HasKey(l, r) => match (eval_value(l, tuple), eval_value(r, tuple)) {
            (Value::Map(entries), Value::Str(key)) => entries.iter().any(|(k, _)| k == &key),
            _ => false,
        },
        MemoryExpr::OfLength(l, r) => sequence_len(&eval_value(l, tuple)) == eval_value(r, tuple).as_int(),
        MemoryExpr::Longer(l, r) => {
            sequence_len(&eval_value(l, tuple)).zip(eval_value(r, tuple).as_int()).is_some_and(|(a, b)| a > b)
        }
        MemoryExpr::Shorter(l, r) => {
            sequence_len(&eval_value(l, tuple)).zip(eval_value(r, tuple).as_int()).is_some_and(|(a, b)| a < b)
        }
        MemoryExpr::Not(inner) => !eval_bool(inner, tuple),
        MemoryExpr::And(items) => items.iter().all(|e| eval_bool(e, tuple)),
        MemoryExpr::Or(items) => items.iter().any(|e| eval_bool(e, tuple)),
        MemoryExpr::Column(..) | MemoryExpr::JsonDescent(..) | MemoryExpr::Literal(_) => {
            matches!(eval_value(expr, tuple), Value::Bool(true))
        }
    }
}

fn sequence_len(value: &Value) -> Option<i64> {
    match value {
        Value::List(items) => Some(items.len() as i64),
        Value::Str(s) => Some(s.chars().count() as i64),
        Value::Map(entries) => Some(entries.len() as i64),
        _ => None,
    }
}

fn compare(a: Value, b: Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
        (Value::Int(a), Value::Float(b)) => (a as f64).partial_cmp(&b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(b as f64)),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(&b),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

fn like_match(value: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::Str(value), Value::Str(pattern)) = (value, pattern) else {
        return false;
    };
    let (value, pattern) = if case_insensitive {
        (value.to_lowercase(), pattern.to_lowercase())
    } else {
        (value.clone(), pattern.clone())
    };
    // `%` is the only SQL LIKE wildcard this backend needs to support.
    match (pattern.strip_suffix('%'), pattern.strip_prefix('%')) {
        (Some(prefix), _) if !prefix.contains('%') => value.starts_with(prefix),
        (_, Some(suffix)) if !suffix.contains('%') => value.ends_with(suffix),
        _ => value == pattern,
    }
}

/// The in-progress query: a set of "tuples" (alias id -> matched row),
/// narrowed by `join`/`filter` and reshaped by `project`/`order_by`/`limit`.
#[derive(Debug)]
pub struct MemoryQueryHandle {
    store: Arc<MemoryStore>,
    tuples: Vec<Tuple>,
    projections: Vec<(usize, ProjectionTarget)>,
    order: Vec<(usize, String)>,
    limit: Option<i64>,
}

impl MemoryQueryHandle {
    fn seed(store: Arc<MemoryStore>, alias: &MemoryAliasHandle) -> MemoryQueryHandle {
        let tuples = store
            .rows(&alias.table)
            .iter()
            .map(|row| {
                let mut t = Tuple::new();
                t.insert(alias.id(), row.clone());
                t
            })
            .collect();
        MemoryQueryHandle { store, tuples, projections: Vec::new(), order: Vec::new(), limit: None }
    }

    fn as_memory_alias<'a>(alias: &'a dyn AliasHandle) -> &'a MemoryAliasHandle {
        alias
            .as_any()
            .downcast_ref::<MemoryAliasHandle>()
            .expect("MemoryQueryHandle only accepts MemoryAliasHandle")
    }
}

impl QueryHandle for MemoryQueryHandle {
    fn join(
        &mut self,
        _edge: JoinEdge,
        left: &dyn AliasHandle,
        left_column: &str,
        right: &dyn AliasHandle,
        right_column: &str,
    ) -> Result<(), BackendError> {
        let right_alias = Self::as_memory_alias(right);
        let right_rows = self.store.rows(&right_alias.table).to_vec();
        let left_id = left.id();
        let right_id = right.id();

        let mut joined = Vec::new();
        for tuple in &self.tuples {
            let Some(left_row) = tuple.get(&left_id) else { continue };
            let Some(left_value) = left_row.get(left_column) else { continue };
            for right_row in &right_rows {
                if right_row.get(right_column) == Some(left_value) {
                    let mut next = tuple.clone();
                    next.insert(right_id, right_row.clone());
                    joined.push(next);
                }
            }
        }
        self.tuples = joined;
        Ok(())
    }

    fn filter(&mut self, expr: BoxedExpr) -> Result<(), BackendError> {
        let expr = downcast(expr);
        self.tuples.retain(|t| eval_bool(&expr, t));
        Ok(())
    }

    fn project(&mut self, alias: &dyn AliasHandle, target: ProjectionTarget) -> Result<usize, BackendError> {
        let position = self.projections.len();
        self.projections.push((alias.id(), target));
        Ok(position)
    }

    fn order_by(&mut self, alias: &dyn AliasHandle, column: &str) -> Result<(), BackendError> {
        self.order.push((alias.id(), column.to_string()));
        Ok(())
    }

    fn limit(&mut self, n: i64) -> Result<(), BackendError> {
        self.limit = Some(n);
        Ok(())
    }

    fn execute(&self, batch_size: usize) -> Result<Vec<Vec<Value>>, BackendError> {
        let _ = batch_size; // the in-memory backend has no I/O to chunk.
        let mut tuples = self.tuples.clone();
        for (alias_id, column) in self.order.iter().rev() {
            tuples.sort_by(|a, b| {
                let av = a.get(alias_id).and_then(|r| r.get(column)).cloned().unwrap_or(Value::Null);
                let bv = b.get(alias_id).and_then(|r| r.get(column)).cloned().unwrap_or(Value::Null);
                compare(av, bv).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        if let Some(limit) = self.limit {
            tuples.truncate(limit.max(0) as usize);
        }
        let rows = tuples
            .iter()
            .map(|tuple| {
                self.projections
                    .iter()
                    .map(|(alias_id, target)| {
                        let row = tuple.get(alias_id).cloned().unwrap_or_default();
                        match target {
                            ProjectionTarget::Star => Value::Map(row.into_iter().collect()),
                            ProjectionTarget::Column(name) => row.get(name).cloned().unwrap_or(Value::Null),
                            ProjectionTarget::JsonPath(head, rest) => {
                                let mut current = row.get(head).cloned().unwrap_or(Value::Null);
                                for segment in rest {
                                    current = match &current {
                                        Value::Map(entries) => entries
                                            .iter()
                                            .find(|(k, _)| k == segment)
                                            .map(|(_, v)| v.clone())
                                            .unwrap_or(Value::Null),
                                        Value::List(items) => segment
                                            .parse::<usize>()
                                            .ok()
                                            .and_then(|i| items.get(i).cloned())
                                            .unwrap_or(Value::Null),
                                        _ => Value::Null,
                                    };
                                }
                                current
                            }
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

/// Opens [`MemoryQueryHandle`]s against a shared, read-only [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemorySession {
    store: Arc<MemoryStore>,
}

impl MemorySession {
    pub fn new(store: MemoryStore) -> MemorySession {
        MemorySession { store: Arc::new(store) }
    }
}

impl Session for MemorySession {
    fn query(&self, seed: Box<dyn AliasHandle>) -> Box<dyn QueryHandle> {
        let alias = MemoryQueryHandle::as_memory_alias(seed.as_ref()).clone();
        Box::new(MemoryQueryHandle::seed(Arc::clone(&self.store), &alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_two_linked_nodes() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(1)),
                ("type".to_string(), Value::Str("process.calculation.".to_string())),
            ]),
        );
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(2)),
                ("type".to_string(), Value::Str("data.structure.".to_string())),
            ]),
        );
        store.insert_row(
            "db_dblink",
            Row::from_iter([
                ("input_id".to_string(), Value::Int(1)),
                ("output_id".to_string(), Value::Int(2)),
            ]),
        );
        store
    }

    #[test]
    fn join_narrows_to_matching_rows_only() {
        let store = store_with_two_linked_nodes();
        let session = MemorySession::new(store);
        let mut factory = SimpleAliasFactory::new();
        let calc_alias = factory.new_alias(&crate::registry::TableRef::new("db_dbnode"));
        let link_alias = factory.new_alias(&crate::registry::TableRef::new("db_dblink"));
        let structure_alias = factory.new_alias(&crate::registry::TableRef::new("db_dbnode"));

        let mut handle = session.query(calc_alias.box_clone());
        handle
            .join(JoinEdge::Link, calc_alias.as_ref(), "id", link_alias.as_ref(), "input_id")
            .unwrap();
        handle
            .join(JoinEdge::Link, link_alias.as_ref(), "output_id", structure_alias.as_ref(), "id")
            .unwrap();
        handle.project(structure_alias.as_ref(), ProjectionTarget::Column("type".to_string())).unwrap();
        let rows = handle.execute(100).unwrap();
        assert_eq!(rows, vec![vec![Value::Str("data.structure.".to_string())]]);
    }

    #[test]
    fn like_prefix_pattern_matches_discriminator() {
        let eb = MemoryExpressionBuilder;
        let expr = eb.like(
            eb.literal(&Value::Str("data.structure.".to_string())),
            eb.literal(&Value::Str("data.%".to_string())),
        );
        let expr = downcast(expr);
        assert!(eval_bool(&expr, &Tuple::new()));
    }

    #[test]
    fn contains_over_array_requires_every_rhs_element_present() {
        let eb = MemoryExpressionBuilder;
        let column = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let superset = eb.contains(eb.literal(&column), eb.literal(&Value::List(vec![Value::Int(1), Value::Int(2)])));
        assert!(eval_bool(&downcast(superset), &Tuple::new()));

        let missing = eb.contains(eb.literal(&column), eb.literal(&Value::List(vec![Value::Int(1), Value::Int(9)])));
        assert!(!eval_bool(&downcast(missing), &Tuple::new()));
    }

    #[test]
    fn contains_over_object_requires_every_rhs_entry_present() {
        let eb = MemoryExpressionBuilder;
        let column = Value::Map(vec![("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]);
        let present = eb.contains(eb.literal(&column), eb.literal(&Value::Map(vec![("a".to_string(), Value::Int(1))])));
        assert!(eval_bool(&downcast(present), &Tuple::new()));

        let mismatched_value =
            eb.contains(eb.literal(&column), eb.literal(&Value::Map(vec![("a".to_string(), Value::Int(9))])));
        assert!(!eval_bool(&downcast(mismatched_value), &Tuple::new()));
    }
}
