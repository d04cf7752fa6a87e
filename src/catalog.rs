//! The catalog facade: every caller-facing operation, with locking and logging.
//!
//! ```no_run
//! use pidgraph::catalog::Catalog;
//! use pidgraph::config::CatalogConfig;
//! use pidgraph::pid::PidUri;
//! use pidgraph::resource::ResourceRequest;
//!
//! let mut config = CatalogConfig::default();
//! config.directory.persons.push("alice".into());
//! let catalog = Catalog::open(config).unwrap();
//!
//! let pid = PidUri::parse("https://pid.example.org/42").unwrap();
//! let request = ResourceRequest::new(pid.clone()).with_label("Sales").with_version("1");
//! catalog.create_resource(&request, "alice").unwrap();
//! let published = catalog.publish_resource(&pid, "alice").unwrap();
//! assert_eq!(published.versions.len(), 1);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::VersionChain;
use crate::config::CatalogConfig;
use crate::directory::{ActorDirectory, StaticDirectory};
use crate::error::{CatalogResult, ErrorKind, ResourceError, RuleError};
use crate::lifecycle::LifecycleManager;
use crate::link::{LinkHistoryRecord, LinkManager};
use crate::lock::LockCoordinator;
use crate::pid::{LinkType, PidUri};
use crate::resource::{Resource, ResourceReader, ResourceRequest, VersionSummary};
use crate::revision::{Revision, RevisionEngine, RevisionSummary};
use crate::store::{GraphStore, OxigraphStore, Partition, Partitions};

/// Shared handles every manager works with.
pub struct CatalogContext {
    pub store: Arc<dyn GraphStore>,
    pub partitions: Partitions,
    pub config: CatalogConfig,
    pub directory: Arc<dyn ActorDirectory>,
}

impl CatalogContext {
    pub fn new(
        config: CatalogConfig,
        store: Arc<dyn GraphStore>,
        directory: Arc<dyn ActorDirectory>,
    ) -> Self {
        Self {
            partitions: Partitions::new(config.graphs.clone()),
            store,
            config,
            directory,
        }
    }

    /// Graph IRI of a partition.
    pub fn graph(&self, partition: Partition) -> &str {
        self.partitions.iri(partition)
    }

    pub fn require_known(&self, actor: &str) -> CatalogResult<()> {
        if self.directory.is_known(actor) {
            Ok(())
        } else {
            Err(RuleError::UnknownActor {
                actor: actor.to_string(),
            }
            .into())
        }
    }
}

impl std::fmt::Debug for CatalogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogContext")
            .field("partitions", &self.partitions)
            .field("id_namespace", &self.config.id_namespace)
            .finish()
    }
}

/// Which lifecycle instance a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Draft,
    Published,
    /// The draft when one is pending, the published instance otherwise.
    #[default]
    Latest,
}

/// Entry point for all catalog operations.
pub struct Catalog {
    ctx: Arc<CatalogContext>,
    locks: LockCoordinator,
    reader: ResourceReader,
    chain: VersionChain,
    lifecycle: LifecycleManager,
    links: LinkManager,
    revisions: RevisionEngine,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("ctx", &self.ctx)
            .field("locked", &self.locks.len())
            .finish()
    }
}

impl Catalog {
    /// Open a catalog on the store described by `config`.
    pub fn open(config: CatalogConfig) -> CatalogResult<Self> {
        config.validate()?;
        let timeout = config.store.timeout();
        let store = match &config.store.data_dir {
            Some(dir) => OxigraphStore::open(dir, timeout)?,
            None => OxigraphStore::in_memory(timeout)?,
        };
        let directory = StaticDirectory::from_config(&config.directory);
        tracing::info!(
            data_dir = ?config.store.data_dir,
            persons = directory.len(),
            "catalog opened"
        );
        Ok(Self::with_store(config, Arc::new(store), Arc::new(directory)))
    }

    /// Build a catalog over an existing store and directory.
    pub fn with_store(
        config: CatalogConfig,
        store: Arc<dyn GraphStore>,
        directory: Arc<dyn ActorDirectory>,
    ) -> Self {
        let ctx = Arc::new(CatalogContext::new(config, store, directory));
        Self {
            locks: LockCoordinator::new(),
            reader: ResourceReader::new(Arc::clone(&ctx)),
            chain: VersionChain::new(Arc::clone(&ctx)),
            lifecycle: LifecycleManager::new(Arc::clone(&ctx)),
            links: LinkManager::new(Arc::clone(&ctx)),
            revisions: RevisionEngine::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.ctx.store
    }

    /// Graph IRI of a partition.
    pub fn graph(&self, partition: Partition) -> &str {
        self.ctx.graph(partition)
    }

    /// The lock coordinator; exposed so callers can observe contention.
    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    // -- lifecycle -----------------------------------------------------------

    pub fn create_resource(&self, request: &ResourceRequest, actor: &str) -> CatalogResult<Resource> {
        let mut locks = self.locks.acquire("create", [&request.pid_uri])?;
        let result = self.lifecycle.create(request, actor, &mut locks);
        finish("create", &request.pid_uri, actor, result)
    }

    pub fn edit_resource(&self, request: &ResourceRequest, actor: &str) -> CatalogResult<Resource> {
        let mut locks = self.locks.acquire("edit", [&request.pid_uri])?;
        let result = self.lifecycle.edit(request, actor, &mut locks);
        finish("edit", &request.pid_uri, actor, result)
    }

    pub fn publish_resource(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        let mut locks = self.locks.acquire("publish", [pid_uri])?;
        let result = self.lifecycle.publish(pid_uri, actor, &mut locks);
        finish("publish", pid_uri, actor, result)
    }

    pub fn mark_deleted(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        let _locks = self.locks.acquire("mark-deleted", [pid_uri])?;
        let result = self.lifecycle.mark_deleted(pid_uri, actor);
        finish("mark-deleted", pid_uri, actor, result)
    }

    pub fn unmark_deleted(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        let _locks = self.locks.acquire("unmark-deleted", [pid_uri])?;
        let result = self.lifecycle.unmark_deleted(pid_uri, actor);
        finish("unmark-deleted", pid_uri, actor, result)
    }

    pub fn delete_draft(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Option<Resource>> {
        let mut locks = self.locks.acquire("delete-draft", [pid_uri])?;
        let result = self.lifecycle.delete_draft(pid_uri, actor, &mut locks);
        finish("delete-draft", pid_uri, actor, result)
    }

    pub fn purge(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<()> {
        let mut locks = self.locks.acquire("purge", [pid_uri])?;
        let result = self.lifecycle.purge(pid_uri, actor, &mut locks);
        finish("purge", pid_uri, actor, result)
    }

    /// Attach `new_pid` to the lineage of `existing_pid`.
    pub fn link_version(
        &self,
        existing_pid: &PidUri,
        new_pid: &PidUri,
        actor: &str,
    ) -> CatalogResult<Resource> {
        let mut locks = self.locks.acquire("link-version", [existing_pid, new_pid])?;
        let result = self
            .lifecycle
            .link_version(existing_pid, new_pid, actor, &mut locks);
        finish("link-version", new_pid, actor, result)
    }

    // -- links ---------------------------------------------------------------

    /// `link_type` may be a full IRI or a local name in the catalog namespace.
    pub fn add_link(
        &self,
        source_pid: &PidUri,
        link_type: &str,
        target_pid: &PidUri,
        actor: &str,
    ) -> CatalogResult<Resource> {
        let link_type = LinkType::resolve(link_type, &self.ctx.config.link_types)?;
        let _locks = self.locks.acquire("add-link", [source_pid, target_pid])?;
        let result = self
            .links
            .add_link(source_pid, &link_type, target_pid, actor);
        finish("add-link", source_pid, actor, result)
    }

    pub fn remove_link(
        &self,
        source_pid: &PidUri,
        link_type: &str,
        target_pid: &PidUri,
        inverse: bool,
        actor: &str,
    ) -> CatalogResult<Resource> {
        let link_type = LinkType::resolve(link_type, &self.ctx.config.link_types)?;
        let _locks = self.locks.acquire("remove-link", [source_pid, target_pid])?;
        let result = self
            .links
            .remove_link(source_pid, &link_type, target_pid, inverse, actor);
        finish("remove-link", source_pid, actor, result)
    }

    /// Ledger records touching `pid_uri`, most recent first.
    pub fn link_history(&self, pid_uri: &PidUri) -> CatalogResult<Vec<LinkHistoryRecord>> {
        self.links.ledger().query(pid_uri)
    }

    /// Ledger records for links from `start_pid` to `end_pid`, most recent first.
    pub fn link_history_between(
        &self,
        start_pid: &PidUri,
        end_pid: &PidUri,
    ) -> CatalogResult<Vec<LinkHistoryRecord>> {
        self.links.ledger().query_between(start_pid, end_pid)
    }

    // -- reads ---------------------------------------------------------------

    /// Materialize one lifecycle instance with its lineage resolved.
    pub fn resource(&self, pid_uri: &PidUri, view: View) -> CatalogResult<Resource> {
        let resource = match view {
            View::Draft => self.reader.load_pid(pid_uri, Partition::Draft)?,
            View::Published => self.reader.load_pid(pid_uri, Partition::Published)?,
            View::Latest => {
                let located = self.reader.locate(pid_uri)?;
                match (&located.draft, &located.published) {
                    (Some(id), _) => self.reader.load(id, Partition::Draft)?,
                    (None, Some(id)) => self.reader.load(id, Partition::Published)?,
                    (None, None) => {
                        return Err(ResourceError::NotFound {
                            pid_uri: pid_uri.to_string(),
                        }
                        .into());
                    }
                }
            }
        };
        self.lifecycle.with_versions(resource)
    }

    /// The lineage of `pid_uri`, earliest first.
    pub fn versions(&self, pid_uri: &PidUri) -> CatalogResult<Vec<VersionSummary>> {
        self.chain.resolve(pid_uri)
    }

    pub fn revisions(&self, pid_uri: &PidUri) -> CatalogResult<Vec<RevisionSummary>> {
        self.revisions.revisions(pid_uri)
    }

    pub fn revision(&self, pid_uri: &PidUri, number: u32) -> CatalogResult<Revision> {
        self.revisions.revision(pid_uri, number)
    }
}

/// Log the outcome of an operation and pass it through.
fn finish<T>(operation: &str, pid_uri: &PidUri, actor: &str, result: CatalogResult<T>) -> CatalogResult<T> {
    match &result {
        Ok(_) => tracing::info!(operation, pid = %pid_uri, actor, "operation completed"),
        Err(e) if e.is_store_failure() => tracing::error!(
            operation,
            pid = %pid_uri,
            actor,
            error = %e,
            "store failure aborted operation; partitions may need re-checking"
        ),
        Err(e) if e.kind() == ErrorKind::InconsistentState => tracing::error!(
            operation,
            pid = %pid_uri,
            error = %e,
            "stored state breaks lifecycle exclusivity"
        ),
        Err(e) => tracing::debug!(operation, pid = %pid_uri, kind = %e.kind(), error = %e, "operation rejected"),
    }
    result
}
