//! The embedding facade (C9 wiring): a [`Store`] owns the atom table and
//! quad store (C1/C2), and turns SPARQL source text into results by
//! running it through the parser (C4/C5), the planner (C7) and the
//! evaluator (C6/C8/C9) in sequence. [`Transaction`] exposes the same
//! surface against a single `apply` batch, giving callers the store's
//! only multi-statement atomic unit.

use oxrdf::{GraphName, Quad, QuadRef};
use spareval::{
    EngineError, QueryEvaluator, QueryOptions, QueryResults, Statistics, UpdateEvaluator,
    UpdateSummary,
};
use spargebra::algebra::{Query as AlgebraQuery, Update as AlgebraUpdate};
use spargebra::{parse_query, parse_update};

use crate::config::StoreConfig;
use crate::error::Error;
use crate::loader::HttpGraphLoader;
use crate::service::HttpServiceExecutor;

/// An embedded, in-process SPARQL 1.1 store.
///
/// `Store` is `Send + Sync`; wrap it in an `Arc` to share one instance
/// across threads. The quad store's snapshot isolation means a query
/// running on one thread never observes a write concurrently committed
/// on another as partial.
pub struct Store {
    quads: spareval::QuadStore,
    config: StoreConfig,
    loader: HttpGraphLoader,
    service: HttpServiceExecutor,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            quads: spareval::QuadStore::new(),
            loader: HttpGraphLoader::new(config.clone()),
            service: HttpServiceExecutor::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs a SPARQL 1.1 query: `SELECT`, `ASK`, `CONSTRUCT` or `DESCRIBE`.
    pub fn query(&self, query: &str) -> Result<QueryResults, Error> {
        self.query_opt(query, QueryOptions::default())
    }

    pub fn query_opt(&self, query: &str, options: QueryOptions) -> Result<QueryResults, Error> {
        let parsed = parse_query(query)?;
        let optimized = self.optimize_query(&parsed.query, &parsed.source, &parsed.prologue);
        let planned = spargebra::ParsedQuery {
            source: parsed.source,
            prologue: parsed.prologue,
            query: optimized,
        };
        Ok(QueryEvaluator::with_options(&self.quads, &self.service, options).execute(&planned)?)
    }

    /// Runs a SPARQL 1.1 update: `INSERT`/`DELETE`/`LOAD`/`CLEAR`/`DROP`/`CREATE`.
    pub fn update(&self, update: &str) -> Result<UpdateSummary, Error> {
        self.update_opt(update, QueryOptions::default())
    }

    pub fn update_opt(&self, update: &str, options: QueryOptions) -> Result<UpdateSummary, Error> {
        if !self.config.allow_updates {
            return Err(Error::UpdatesDisabled);
        }
        let parsed = parse_update(update)?;
        let optimized = self.optimize_update(&parsed.update, &parsed.source, &parsed.prologue);
        let planned = spargebra::ParsedUpdate {
            source: parsed.source,
            prologue: parsed.prologue,
            update: optimized,
        };
        Ok(
            UpdateEvaluator::with_collaborators(&self.quads, &self.service, &self.loader, options)
                .execute(&planned)?,
        )
    }

    fn optimize_query(&self, query: &AlgebraQuery, source: &str, prologue: &spargebra::Prologue) -> AlgebraQuery {
        let stats = self.statistics();
        sparopt::optimize_query(query, source, prologue, self.quads.atoms(), &stats)
    }

    fn optimize_update(
        &self,
        update: &AlgebraUpdate,
        source: &str,
        prologue: &spargebra::Prologue,
    ) -> AlgebraUpdate {
        let stats = self.statistics();
        sparopt::optimize_update(update, source, prologue, self.quads.atoms(), &stats)
    }

    pub fn statistics(&self) -> Statistics {
        self.quads.statistics()
    }

    /// Adds a quad to the store. Returns `true` if it was not already present.
    pub fn insert<'a>(&self, quad: impl Into<QuadRef<'a>>) -> Result<bool, Error> {
        let quad = quad.into().into_owned();
        let n = self
            .quads
            .apply(std::slice::from_ref(&quad), &[])
            .map_err(|e| Error::Query(EngineError::Storage(e.0)))?;
        Ok(n > 0)
    }

    /// Removes a quad from the store. Returns `true` if it was present.
    pub fn remove<'a>(&self, quad: impl Into<QuadRef<'a>>) -> Result<bool, Error> {
        let quad = quad.into().into_owned();
        let n = self
            .quads
            .apply(&[], std::slice::from_ref(&quad))
            .map_err(|e| Error::Query(EngineError::Storage(e.0)))?;
        Ok(n > 0)
    }

    pub fn clear_graph(&self, graph: &GraphName) -> Result<(), Error> {
        self.quads
            .clear_graph(graph)
            .map_err(|e| Error::Query(EngineError::Storage(e.0)))?;
        Ok(())
    }

    pub fn clear(&self) {
        self.quads.clear_all();
    }

    pub fn len(&self) -> usize {
        self.quads.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.snapshot().is_empty()
    }

    /// Runs `f` against a [`Transaction`] and commits every quad it staged
    /// in one atomic [`spareval::QuadStore::apply`] call when `f` returns
    /// `Ok`. Nothing staged is visible to any other reader until commit.
    pub fn transaction<T, E: From<Error>>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut txn = Transaction {
            store: self,
            inserts: Vec::new(),
            deletes: Vec::new(),
        };
        let result = f(&mut txn)?;
        txn.commit().map_err(E::from)?;
        Ok(result)
    }
}

/// A batch of inserts and deletes staged against a [`Store`], committed
/// atomically when the enclosing `Store::transaction` closure returns `Ok`.
pub struct Transaction<'a> {
    store: &'a Store,
    inserts: Vec<Quad>,
    deletes: Vec<Quad>,
}

impl Transaction<'_> {
    pub fn insert<'b>(&mut self, quad: impl Into<QuadRef<'b>>) {
        self.inserts.push(quad.into().into_owned());
    }

    pub fn remove<'b>(&mut self, quad: impl Into<QuadRef<'b>>) {
        self.deletes.push(quad.into().into_owned());
    }

    fn commit(self) -> Result<usize, Error> {
        self.store
            .quads
            .apply(&self.inserts, &self.deletes)
            .map_err(|e| Error::Query(EngineError::Storage(e.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{NamedNode, Term};

    fn quad(n: u32) -> Quad {
        Quad::new(
            NamedNode::new(format!("http://example.com/s{n}")).unwrap(),
            NamedNode::new("http://example.com/p").unwrap(),
            Term::NamedNode(NamedNode::new(format!("http://example.com/o{n}")).unwrap()),
            GraphName::DefaultGraph,
        )
    }

    #[test]
    fn insert_is_idempotent_and_tracked_by_len() {
        let store = Store::new();
        assert!(store.is_empty());
        assert!(store.insert(quad(1).as_ref()).unwrap());
        assert!(!store.insert(quad(1).as_ref()).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_reports_whether_the_quad_was_present() {
        let store = Store::new();
        store.insert(quad(1).as_ref()).unwrap();
        assert!(store.remove(quad(1).as_ref()).unwrap());
        assert!(!store.remove(quad(1).as_ref()).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_empties_the_store() {
        let store = Store::new();
        store.insert(quad(1).as_ref()).unwrap();
        store.insert(quad(2).as_ref()).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn update_rejected_when_disabled() {
        let mut config = StoreConfig::default();
        config.allow_updates = false;
        let store = Store::with_config(config);
        let result = store.update("INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }");
        assert!(matches!(result, Err(Error::UpdatesDisabled)));
    }

    #[test]
    fn transaction_commits_all_staged_quads_together() {
        let store = Store::new();
        store
            .transaction(|txn| -> Result<(), Error> {
                txn.insert(quad(1).as_ref());
                txn.insert(quad(2).as_ref());
                Ok(())
            })
            .unwrap();
        assert_eq!(store.len(), 2);
    }
}
