//! Graph Partition Accessor: the I/O boundary to the external graph store.
//!
//! - [`GraphStore`]: SPARQL read/update contract, no domain policy
//! - [`OxigraphStore`]: bundled implementation over `oxigraph`, with a bounded wait per call
//! - [`sparql`]: statement builders (escaping, `INSERT DATA` / `DELETE DATA` blocks)
//!
//! Statements name their partitions explicitly with `GRAPH <iri>`; the
//! accessor never validates catalog invariants.

pub mod oxi;
pub mod sparql;

use std::collections::BTreeMap;

use crate::config::GraphsConfig;
use crate::error::StoreResult;

pub use oxi::OxigraphStore;

/// Parameterized read/update access to a SPARQL-capable store.
pub trait GraphStore: Send + Sync {
    /// Run a `SELECT` query and return its solutions.
    fn select(&self, query: &str) -> StoreResult<Vec<Row>>;

    /// Run an `ASK` query.
    fn ask(&self, query: &str) -> StoreResult<bool>;

    /// Run an update (`INSERT`/`DELETE`). Either applies or fails.
    fn update(&self, update: &str) -> StoreResult<()>;
}

/// An RDF term as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        datatype: String,
        language: Option<String>,
    },
    Blank(String),
}

impl Term {
    /// Lexical value: the IRI, the literal's value or the blank label.
    pub fn value(&self) -> &str {
        match self {
            Self::Iri(v) | Self::Blank(v) => v,
            Self::Literal { value, .. } => value,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }
}

/// One solution of a `SELECT` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    bindings: BTreeMap<String, Term>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style binding, mostly for tests.
    pub fn with(mut self, var: &str, term: Term) -> Self {
        self.bindings.insert(var.to_string(), term);
        self
    }

    pub fn bind(&mut self, var: impl Into<String>, term: Term) {
        self.bindings.insert(var.into(), term);
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    /// Lexical value of a bound variable.
    pub fn str(&self, var: &str) -> Option<&str> {
        self.get(var).map(Term::value)
    }

    /// Value of a variable bound to an IRI.
    pub fn iri(&self, var: &str) -> Option<&str> {
        self.get(var).and_then(Term::as_iri)
    }
}

/// The lifecycle-state and audit partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Draft,
    Published,
    Historic,
    LinkHistory,
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Historic => write!(f, "historic"),
            Self::LinkHistory => write!(f, "link-history"),
        }
    }
}

/// Resolves [`Partition`]s to their configured graph IRIs.
#[derive(Debug, Clone)]
pub struct Partitions {
    graphs: GraphsConfig,
}

impl Partitions {
    pub fn new(graphs: GraphsConfig) -> Self {
        Self { graphs }
    }

    pub fn iri(&self, partition: Partition) -> &str {
        match partition {
            Partition::Draft => &self.graphs.draft,
            Partition::Published => &self.graphs.published,
            Partition::Historic => &self.graphs.historic,
            Partition::LinkHistory => &self.graphs.link_history,
        }
    }

    /// Map a graph IRI back to its partition.
    pub fn partition_of(&self, graph: &str) -> Option<Partition> {
        [
            Partition::Draft,
            Partition::Published,
            Partition::Historic,
            Partition::LinkHistory,
        ]
        .into_iter()
        .find(|p| self.iri(*p) == graph)
    }
}
