//! # Facade / `QueryBuilder`
//!
//! The chainable, stateful entry point a host ORM wires up: parses the
//! initial query-help document, exposes `inputs`/`outputs`/`children`/
//! `parents` to extend the path, `build`/`reset` to make the {unbuilt,
//! built} state explicit, and the terminal operations
//! (`first`/`all`/`distinct`/`iter`/`as_dicts`) plus `except_if_input_to`
//! for the pending-inputs counter-query.

use crate::backend::{AliasFactory, ExpressionBuilder, Session};
use crate::config::Config;
use crate::counter_query::{self, CounterQuery};
use crate::emitter::{self, EmittedQuery};
use crate::error::QbResult;
use crate::parser;
use crate::registry::{ClassTag, Registry};
use crate::result::{EntityFactory, ResultAdapter, RowDict};
use crate::spec::builders as spec_builders;
use crate::spec::QuerySpec;
use crate::value::Value;
use std::sync::Arc;

/// The memoised handle's lifecycle: explicit rather than an `Option` probed
/// with `is_some()`, so a reader can see the two states named.
enum State {
    Unbuilt,
    Built(EmittedQuery),
}

/// Not `Sync`: a built handle is a live, stateful query plan against a
/// specific session, and the builder mutates it in place. Concurrent callers
/// hold independent instances, each owning its own session/factory/
/// expression-builder trio.
pub struct QueryBuilder {
    registry: Arc<Registry>,
    session: Box<dyn Session>,
    factory: Box<dyn AliasFactory>,
    expression_builder: Box<dyn ExpressionBuilder>,
    config: Config,
    spec: QuerySpec,
    state: State,
}

impl QueryBuilder {
    /// Parse `query_help` against `registry` and seed a builder ready for
    /// chained `inputs`/`outputs`/`children`/`parents` calls.
    pub fn new(
        query_help: &serde_json::Value,
        registry: Arc<Registry>,
        session: Box<dyn Session>,
        factory: Box<dyn AliasFactory>,
        expression_builder: Box<dyn ExpressionBuilder>,
        config: Config,
    ) -> QbResult<QueryBuilder> {
        let spec = parser::parse(query_help, &registry)?;
        Ok(QueryBuilder { registry, session, factory, expression_builder, config, spec, state: State::Unbuilt })
    }

    /// The normalised specification as parsed and extended so far. Exposed
    /// for callers that want to inspect or re-serialise it (e.g. to persist
    /// a saved query), never mutated directly — use the chained append
    /// methods instead so the cached handle stays consistent.
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    fn invalidate(&mut self) {
        self.state = State::Unbuilt;
    }

    /// Append a vertex joined to the inputs of the current last vertex.
    pub fn inputs(&mut self, class: ClassTag) -> QbResult<&mut Self> {
        spec_builders::append_inputs(&mut self.spec, &self.registry, class)?;
        self.invalidate();
        Ok(self)
    }

    /// Append a vertex joined to the outputs of the current last vertex.
    pub fn outputs(&mut self, class: ClassTag) -> QbResult<&mut Self> {
        spec_builders::append_outputs(&mut self.spec, &self.registry, class)?;
        self.invalidate();
        Ok(self)
    }

    /// Append a vertex joined to the descendants of the current last vertex.
    pub fn children(&mut self, class: ClassTag) -> QbResult<&mut Self> {
        spec_builders::append_children(&mut self.spec, &self.registry, class)?;
        self.invalidate();
        Ok(self)
    }

    /// Append a vertex joined to the ancestors of the current last vertex.
    pub fn parents(&mut self, class: ClassTag) -> QbResult<&mut Self> {
        spec_builders::append_parents(&mut self.spec, &self.registry, class)?;
        self.invalidate();
        Ok(self)
    }

    /// Lower the current specification into a query plan, memoising the
    /// result. A no-op if already built; chained mutation since the last
    /// build already invalidated the cache, so this re-emits.
    #[tracing::instrument(skip(self), fields(vertices = self.spec.path.len()))]
    pub fn build(&mut self) -> QbResult<&EmittedQuery> {
        if matches!(self.state, State::Unbuilt) {
            let emitted = emitter::emit(
                &self.spec,
                &self.registry,
                self.factory.as_mut(),
                self.session.as_ref(),
                self.expression_builder.as_ref(),
            )?;
            self.state = State::Built(emitted);
        }
        match &self.state {
            State::Built(emitted) => Ok(emitted),
            State::Unbuilt => unreachable!("just built above"),
        }
    }

    /// Drop the memoised handle. Chained mutation after a `build()` already
    /// does this implicitly; exposed for callers that want to force a
    /// re-plan without changing the specification (e.g. after the backend
    /// session reconnects).
    pub fn reset(&mut self) {
        self.invalidate();
    }

    fn result_adapter(&mut self) -> QbResult<ResultAdapter<'_>> {
        let batch_size = self.config.execution.default_batch_size;
        let emitted = self.build()?;
        Ok(ResultAdapter::new(emitted, batch_size))
    }

    /// Run `op` against a freshly-built handle, invalidating the memoised
    /// handle on failure so a backend error during execution doesn't leave a
    /// stale plan behind for the next call to silently reuse.
    fn run<T>(&mut self, op: impl FnOnce(&ResultAdapter<'_>) -> QbResult<T>) -> QbResult<T> {
        let result = self.result_adapter().and_then(|adapter| op(&adapter));
        if result.is_err() {
            self.invalidate();
        }
        result
    }

    pub fn first(&mut self) -> QbResult<Option<Vec<Value>>> {
        self.run(ResultAdapter::first)
    }

    pub fn all(&mut self) -> QbResult<Vec<Vec<Value>>> {
        self.run(ResultAdapter::all)
    }

    pub fn distinct(&mut self) -> QbResult<Vec<Vec<Value>>> {
        self.run(ResultAdapter::distinct)
    }

    pub fn iter(&mut self, batch: Option<usize>) -> QbResult<std::vec::IntoIter<Vec<Value>>> {
        self.run(|adapter| adapter.iter(batch))
    }

    pub fn as_dicts(&mut self, factory: &dyn EntityFactory) -> QbResult<Vec<RowDict>> {
        self.run(|adapter| adapter.as_dicts(factory))
    }

    /// Build the counter specification for `except_if_input_to(calc)`
    /// against the current specification, without executing either side.
    /// Run both through their own [`QueryBuilder`] (or [`emitter::emit`]
    /// directly) and subtract with [`counter_query::except`].
    pub fn except_if_input_to(&self, calc: ClassTag) -> QbResult<CounterQuery> {
        Ok(counter_query::except_if_input_to(&self.spec, &self.registry, calc)?)
    }
}
