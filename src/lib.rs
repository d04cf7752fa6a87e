// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # pidgraph
//!
//! A resource lifecycle and version-chain engine for a PID-based metadata
//! catalog, stored as RDF named graphs.
//!
//! ## Architecture
//!
//! - **Store** (`store`): oxigraph behind the [`store::GraphStore`] trait, one named graph per partition
//! - **Resources** (`resource`): materialization of instances from triples, request validation
//! - **Lifecycle** (`lifecycle`): create, edit, publish, mark/unmark deleted, delete draft, purge
//! - **Version chains** (`chain`): `hasLaterVersion` lineages ordered with petgraph
//! - **Revisions** (`revision`): added/removed diffs persisted per publish
//! - **Links** (`link`): typed links between published resources plus the history ledger
//! - **Locking** (`lock`): per-PID exclusive locks, all-or-nothing
//!
//! ## Library usage
//!
//! ```no_run
//! use pidgraph::catalog::{Catalog, View};
//! use pidgraph::config::CatalogConfig;
//! use pidgraph::pid::PidUri;
//! use pidgraph::resource::ResourceRequest;
//!
//! let mut config = CatalogConfig::default();
//! config.directory.persons.push("alice".into());
//! let catalog = Catalog::open(config).unwrap();
//!
//! let pid = PidUri::parse("https://pid.example.org/7").unwrap();
//! catalog
//!     .create_resource(&ResourceRequest::new(pid.clone()).with_label("Orders"), "alice")
//!     .unwrap();
//! catalog.publish_resource(&pid, "alice").unwrap();
//! let latest = catalog.resource(&pid, View::Latest).unwrap();
//! assert_eq!(latest.label(), Some("Orders"));
//! ```

pub mod catalog;
pub mod chain;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod link;
pub mod lock;
pub mod pid;
pub mod resource;
pub mod revision;
pub mod store;
pub mod vocab;
