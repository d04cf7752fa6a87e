//! Graph store backed by oxigraph.
//!
//! Each call runs on a short-lived worker thread so the caller can stop
//! waiting after the configured bound. A timed-out statement keeps running in
//! the background; nothing is assumed about whether it was applied.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use oxigraph::model::Term as OxTerm;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;

use crate::error::{StoreError, StoreResult};

use super::{GraphStore, Row, Term};

/// SPARQL store over an in-memory or on-disk oxigraph instance.
#[derive(Clone)]
pub struct OxigraphStore {
    store: Store,
    timeout: Duration,
}

impl OxigraphStore {
    /// Create a new in-memory store (no persistence).
    pub fn in_memory(timeout: Duration) -> StoreResult<Self> {
        let store = Store::new().map_err(|e| StoreError::Open {
            message: format!("failed to create oxigraph store: {e}"),
        })?;
        Ok(Self { store, timeout })
    }

    /// Open or create a persistent store at the given path.
    pub fn open(path: &Path, timeout: Duration) -> StoreResult<Self> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Open {
            message: format!("failed to create oxigraph directory {}: {e}", path.display()),
        })?;
        let store = Store::open(path).map_err(|e| StoreError::Open {
            message: format!("failed to open oxigraph store at {}: {e}", path.display()),
        })?;
        Ok(Self { store, timeout })
    }

    /// Number of quads across all graphs.
    pub fn quad_count(&self) -> StoreResult<usize> {
        self.store.len().map_err(|e| StoreError::Sparql {
            operation: "count".into(),
            message: e.to_string(),
        })
    }

    /// Run `work` against the store on a worker thread, waiting at most `self.timeout`.
    fn bounded<T, F>(&self, operation: &'static str, text: &str, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store, &str) -> StoreResult<T> + Send + 'static,
    {
        let store = self.store.clone();
        let text = text.to_string();
        let (tx, rx) = mpsc::channel();

        std::thread::Builder::new()
            .name(format!("pidgraph-{operation}"))
            .spawn(move || {
                let result = work(&store, &text);
                // Release the handle before replying so a reopen never races it.
                drop(store);
                // The receiver is gone once the caller timed out.
                let _ = tx.send(result);
            })
            .map_err(|e| StoreError::Sparql {
                operation: operation.into(),
                message: format!("failed to spawn store worker: {e}"),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::Timeout {
                operation: operation.into(),
                waited_ms: self.timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(StoreError::Sparql {
                operation: operation.into(),
                message: "store worker exited without a result".into(),
            }),
        }
    }
}

fn convert_term(term: &OxTerm) -> Term {
    match term {
        OxTerm::NamedNode(node) => Term::Iri(node.as_str().to_string()),
        OxTerm::BlankNode(node) => Term::Blank(node.as_str().to_string()),
        OxTerm::Literal(literal) => Term::Literal {
            value: literal.value().to_string(),
            datatype: literal.datatype().as_str().to_string(),
            language: literal.language().map(str::to_string),
        },
        #[allow(unreachable_patterns)]
        other => Term::Blank(other.to_string()),
    }
}

fn run_select(store: &Store, query: &str) -> StoreResult<Vec<Row>> {
    let results = store.query(query).map_err(|e| StoreError::Sparql {
        operation: "select".into(),
        message: e.to_string(),
    })?;

    match results {
        QueryResults::Solutions(solutions) => {
            let mut rows = Vec::new();
            for solution in solutions {
                let solution = solution.map_err(|e| StoreError::Sparql {
                    operation: "select".into(),
                    message: format!("solution error: {e}"),
                })?;
                let mut row = Row::new();
                for (var, term) in solution.iter() {
                    row.bind(var.as_str(), convert_term(term));
                }
                rows.push(row);
            }
            Ok(rows)
        }
        QueryResults::Boolean(_) => Err(StoreError::UnexpectedResult {
            operation: "select".into(),
            message: "got a boolean, expected solutions".into(),
        }),
        QueryResults::Graph(_) => Err(StoreError::UnexpectedResult {
            operation: "select".into(),
            message: "got a graph, expected solutions".into(),
        }),
    }
}

fn run_ask(store: &Store, query: &str) -> StoreResult<bool> {
    let results = store.query(query).map_err(|e| StoreError::Sparql {
        operation: "ask".into(),
        message: e.to_string(),
    })?;
    match results {
        QueryResults::Boolean(b) => Ok(b),
        _ => Err(StoreError::UnexpectedResult {
            operation: "ask".into(),
            message: "expected boolean result from ASK query".into(),
        }),
    }
}

fn run_update(store: &Store, update: &str) -> StoreResult<()> {
    store.update(update).map_err(|e| StoreError::Sparql {
        operation: "update".into(),
        message: e.to_string(),
    })
}

impl GraphStore for OxigraphStore {
    fn select(&self, query: &str) -> StoreResult<Vec<Row>> {
        tracing::trace!(query, "sparql select");
        self.bounded("select", query, run_select)
    }

    fn ask(&self, query: &str) -> StoreResult<bool> {
        tracing::trace!(query, "sparql ask");
        self.bounded("ask", query, run_ask)
    }

    fn update(&self, update: &str) -> StoreResult<()> {
        tracing::trace!(update, "sparql update");
        self.bounded("update", update, run_update)
    }
}

impl std::fmt::Debug for OxigraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OxigraphStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}
