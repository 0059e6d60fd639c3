//! # Filter Compiler
//!
//! Lowers a [`FilterNode`] tree into a backend-native boolean expression.
//! Implicit-and sibling folding already happened at parse time (see
//! [`crate::parser`]); by the time a tree reaches here it is always one of
//! the three explicit shapes `Leaf`/`And`/`Or`.

use crate::backend::{AliasHandle, BoxedExpr, ExpressionBuilder};
use crate::error::FilterError;
use crate::spec::{FilterNode, Op, Predicate};
use crate::value::Value;

/// Compile `node` into a single boolean expression against `alias`.
pub fn compile(alias: &dyn AliasHandle, node: &FilterNode, eb: &dyn ExpressionBuilder) -> Result<BoxedExpr, FilterError> {
    match node {
        FilterNode::Leaf { column, predicates } => {
            let rebuild_column = || {
                let base = eb.column(alias, &column.column);
                if column.json_path.is_empty() {
                    base
                } else {
                    eb.json_descent(base, &column.json_path)
                }
            };
            compile_leaf(eb, rebuild_column, predicates)
        }
        FilterNode::And(children) => {
            let compiled: Vec<BoxedExpr> = children
                .iter()
                .map(|c| compile(alias, c, eb))
                .collect::<Result<_, _>>()?;
            Ok(eb.and(compiled))
        }
        FilterNode::Or(children) => {
            let compiled: Vec<BoxedExpr> = children
                .iter()
                .map(|c| compile(alias, c, eb))
                .collect::<Result<_, _>>()?;
            Ok(eb.or(compiled))
        }
    }
}

/// A leaf's predicates fold together with `AND`: `{"<": 5, ">": 1}` means
/// `column < 5 AND column > 1`. Each predicate may independently be negated.
/// `BoxedExpr` is move-only, so a fresh column reference is built per
/// predicate via `rebuild_column` rather than shared.
fn compile_leaf(
    eb: &dyn ExpressionBuilder,
    rebuild_column: impl Fn() -> BoxedExpr,
    predicates: &[Predicate],
) -> Result<BoxedExpr, FilterError> {
    let mut compiled = Vec::with_capacity(predicates.len());
    for predicate in predicates {
        let expr = compile_predicate(eb, rebuild_column(), predicate)?;
        compiled.push(if predicate.negated { eb.not(expr) } else { expr });
    }
    if compiled.len() == 1 {
        Ok(compiled.pop().expect("checked len == 1"))
    } else {
        Ok(eb.and(compiled))
    }
}

fn compile_predicate(eb: &dyn ExpressionBuilder, column: BoxedExpr, predicate: &Predicate) -> Result<BoxedExpr, FilterError> {
    let rhs = eb.literal(&predicate.value);
    Ok(match predicate.op {
        Op::Eq => eb.eq(column, rhs),
        Op::Lt => eb.lt(column, rhs),
        Op::Gt => eb.gt(column, rhs),
        Op::Le => eb.le(column, rhs),
        Op::Ge => eb.ge(column, rhs),
        Op::Like => eb.like(column, rhs),
        Op::ILike => eb.ilike(column, rhs),
        Op::In => {
            require_sequence(&predicate.value, "in")?;
            eb.in_list(column, rhs)
        }
        Op::Contains => {
            require_sequence_or_map(&predicate.value, "contains")?;
            eb.contains(column, rhs)
        }
        Op::HasKey => eb.has_key(column, rhs),
        Op::OfLength => {
            require_int(&predicate.value, "of_length")?;
            eb.of_length(column, rhs)
        }
        Op::Longer => {
            require_int(&predicate.value, "longer")?;
            eb.longer(column, rhs)
        }
        Op::Shorter => {
            require_int(&predicate.value, "shorter")?;
            eb.shorter(column, rhs)
        }
    })
}

fn require_sequence(value: &Value, op: &str) -> Result<(), FilterError> {
    if value.as_sequence().is_some() {
        Ok(())
    } else {
        Err(FilterError::ExpectedSequence { op: op.to_string(), got: value.to_string() })
    }
}

/// `contains` accepts a list RHS (array element-set containment) or a map RHS
/// (JSON object containment), unlike `in` which only ever takes a list.
fn require_sequence_or_map(value: &Value, op: &str) -> Result<(), FilterError> {
    if value.as_sequence().is_some() || matches!(value, Value::Map(_)) {
        Ok(())
    } else {
        Err(FilterError::ExpectedSequence { op: op.to_string(), got: value.to_string() })
    }
}

fn require_int(value: &Value, op: &str) -> Result<(), FilterError> {
    if value.as_int().is_some() {
        Ok(())
    } else {
        Err(FilterError::ExpectedInt { op: op.to_string(), got: value.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryExpressionBuilder, MemoryStore, MemorySession, Row, SimpleAliasFactory};
    use crate::backend::{AliasFactory, ProjectionTarget, QueryHandle, Session};
    use crate::registry::TableRef;
    use crate::spec::ColumnPath;

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(1)),
                ("attributes".to_string(), Value::Map(vec![("cell".to_string(), Value::Int(3))])),
            ]),
        );
        store.insert_row(
            "db_dbnode",
            Row::from_iter([
                ("id".to_string(), Value::Int(2)),
                ("attributes".to_string(), Value::Map(vec![("cell".to_string(), Value::Int(10))])),
            ]),
        );
        store
    }

    fn run_filter(node: &FilterNode) -> Vec<Value> {
        let store = seeded_store();
        let session = MemorySession::new(store);
        let mut factory = SimpleAliasFactory::new();
        let alias = factory.new_alias(&TableRef::new("db_dbnode"));
        let eb = MemoryExpressionBuilder;
        let expr = compile(alias.as_ref(), node, &eb).unwrap();
        let mut handle = session.query(alias.box_clone());
        handle.filter(expr).unwrap();
        handle.project(alias.as_ref(), ProjectionTarget::Column("id".to_string())).unwrap();
        handle.execute(100).unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn leaf_lt_keeps_only_matching_row() {
        let node = FilterNode::leaf(
            ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
            Op::Lt,
            false,
            Value::Int(5),
        );
        assert_eq!(run_filter(&node), vec![Value::Int(1)]);
    }

    #[test]
    fn negation_duality_is_the_exact_complement() {
        let positive = FilterNode::leaf(
            ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
            Op::Lt,
            false,
            Value::Int(5),
        );
        let negated = FilterNode::leaf(
            ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
            Op::Lt,
            true,
            Value::Int(5),
        );
        let mut both: Vec<Value> = run_filter(&positive);
        both.extend(run_filter(&negated));
        both.sort_by_key(|v| v.as_int().unwrap());
        assert_eq!(both, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn in_with_non_sequence_rhs_is_a_filter_error() {
        let mut factory = SimpleAliasFactory::new();
        let alias = factory.new_alias(&TableRef::new("db_dbnode"));
        let eb = MemoryExpressionBuilder;
        let node = FilterNode::leaf(
            ColumnPath { column: "id".to_string(), json_path: vec![] },
            Op::In,
            false,
            Value::Int(1),
        );
        let err = compile(alias.as_ref(), &node, &eb).unwrap_err();
        assert!(matches!(err, FilterError::ExpectedSequence { .. }));
    }

    #[test]
    fn of_length_with_non_int_rhs_is_a_filter_error() {
        let mut factory = SimpleAliasFactory::new();
        let alias = factory.new_alias(&TableRef::new("db_dbnode"));
        let eb = MemoryExpressionBuilder;
        let node = FilterNode::leaf(
            ColumnPath { column: "attributes".to_string(), json_path: vec![] },
            Op::OfLength,
            false,
            Value::Str("not-a-length".to_string()),
        );
        let err = compile(alias.as_ref(), &node, &eb).unwrap_err();
        assert!(matches!(err, FilterError::ExpectedInt { .. }));
    }

    #[test]
    fn and_tree_requires_every_child_true() {
        let node = FilterNode::And(vec![
            FilterNode::leaf(ColumnPath { column: "id".to_string(), json_path: vec![] }, Op::Ge, false, Value::Int(1)),
            FilterNode::leaf(
                ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
                Op::Lt,
                false,
                Value::Int(5),
            ),
        ]);
        assert_eq!(run_filter(&node), vec![Value::Int(1)]);
    }

    #[test]
    fn or_tree_requires_any_child_true() {
        let node = FilterNode::Or(vec![
            FilterNode::leaf(
                ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
                Op::Eq,
                false,
                Value::Int(3),
            ),
            FilterNode::leaf(
                ColumnPath { column: "attributes".to_string(), json_path: vec!["cell".to_string()] },
                Op::Eq,
                false,
                Value::Int(10),
            ),
        ]);
        let mut ids = run_filter(&node);
        ids.sort_by_key(|v| v.as_int().unwrap());
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
    }
}
