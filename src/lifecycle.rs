//! Lifecycle Transition Manager: create, edit, publish, mark/unmark deleted,
//! discard drafts and purge.
//!
//! Every transition is a fixed sequence of store updates. Instances are
//! written and removed with exact `INSERT DATA` / `DELETE DATA` of their
//! triple set, so a repeated step never applies twice. Callers hold the PID
//! lock for the whole sequence.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::catalog::CatalogContext;
use crate::chain::{ChainPlan, VersionChain, check_distinct_version};
use crate::error::{CatalogResult, ResourceError, RuleError};
use crate::link::LinkManager;
use crate::lock::LockSet;
use crate::pid::{PidUri, ResourceId};
use crate::resource::{LifecycleStatus, Located, Resource, ResourceReader, ResourceRequest};
use crate::revision::{self, RevisionEngine, RevisionKind};
use crate::store::Partition;
use crate::store::sparql::{
    Node, Triple, delete_data, delete_predicate, insert_data, iri, replace_predicate,
    repoint_references, sequence,
};
use crate::vocab;

#[derive(Clone)]
pub struct LifecycleManager {
    ctx: Arc<CatalogContext>,
    reader: ResourceReader,
    chain: VersionChain,
    revisions: RevisionEngine,
    links: LinkManager,
}

impl LifecycleManager {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        Self {
            reader: ResourceReader::new(Arc::clone(&ctx)),
            chain: VersionChain::new(Arc::clone(&ctx)),
            revisions: RevisionEngine::new(Arc::clone(&ctx)),
            links: LinkManager::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    /// Write a new resource into the draft partition.
    ///
    /// With a previous version the new draft is placed in that resource's
    /// lineage; the placement is decided before anything is written.
    pub fn create(
        &self,
        request: &ResourceRequest,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<Resource> {
        request.validate(&self.ctx.config.link_types, self.ctx.config.max_nesting_depth)?;
        self.ctx.require_known(actor)?;
        let pid_uri = &request.pid_uri;

        if self.reader.locate(pid_uri)?.exists() {
            return Err(RuleError::AlreadyExists {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        let plan = match &request.previous_version {
            Some(previous) => Some(self.chain.plan(previous, pid_uri, request.version(), locks)?),
            None => None,
        };

        let mut draft = Resource::draft(
            ResourceId::mint(&self.ctx.config.id_namespace),
            request,
            &self.ctx.config.id_namespace,
        );
        draft.stamp_change(actor, Utc::now());
        self.ctx
            .store
            .update(&insert_data(self.ctx.graph(Partition::Draft), &draft.to_triples()))?;
        tracing::debug!(pid = %pid_uri, id = %draft.id, "draft inserted");

        if let Some(plan) = &plan {
            self.chain.apply(plan)?;
        }
        self.with_versions(self.reader.load(&draft.id, Partition::Draft)?)
    }

    /// Replace the draft of an existing resource, leaving the published
    /// instance untouched.
    pub fn edit(
        &self,
        request: &ResourceRequest,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<Resource> {
        request.validate(&self.ctx.config.link_types, self.ctx.config.max_nesting_depth)?;
        self.ctx.require_known(actor)?;
        let pid_uri = &request.pid_uri;

        let located = self.require_exists(pid_uri)?;
        let published = self.load_optional(located.published.as_ref(), Partition::Published)?;
        if published
            .as_ref()
            .is_some_and(|p| p.lifecycle_status == LifecycleStatus::MarkedForDeletion)
        {
            return Err(RuleError::MarkedForDeletion {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        let draft = self.load_optional(located.draft.as_ref(), Partition::Draft)?;

        // Lineage checks against the other members.
        let lineage = self.chain.resolve(pid_uri)?;
        locks.extend(lineage.iter().map(|m| &m.pid_uri))?;
        let chained = lineage.iter().any(|m| m.pid_uri != *pid_uri);
        match request.version() {
            Some(version) => check_distinct_version(&lineage, pid_uri, version)?,
            None if chained => {
                return Err(RuleError::MissingVersion {
                    pid_uri: pid_uri.to_string(),
                }
                .into());
            }
            None => {}
        }
        let plan = match &request.previous_version {
            Some(previous) if lineage.iter().any(|m| m.pid_uri == *previous) => None,
            Some(_) if chained => {
                return Err(RuleError::AlreadyInChain {
                    pid_uri: pid_uri.to_string(),
                }
                .into());
            }
            Some(previous) => Some(self.chain.plan(previous, pid_uri, request.version(), locks)?),
            None => None,
        };

        let base = draft.as_ref().or(published.as_ref());
        let id = match &draft {
            Some(d) => d.id.clone(),
            None => ResourceId::mint(&self.ctx.config.id_namespace),
        };
        let mut next = Resource::draft(id, request, &self.ctx.config.id_namespace);
        next.later_version = base.and_then(|b| b.later_version.clone());
        next.stamp_change(actor, Utc::now());

        let draft_graph = self.ctx.graph(Partition::Draft);
        let mut operations = Vec::new();
        if let Some(old) = &draft {
            operations.push(self.drop_instance(old, Partition::Draft));
        }
        if let Some(p) = &published {
            // The draft now carries the chain pointer in the draft partition.
            operations.push(delete_predicate(draft_graph, p.id.as_str(), vocab::HAS_LATER_VERSION));
        }
        operations.push(insert_data(draft_graph, &next.to_triples()));
        self.ctx.store.update(&sequence(&operations))?;
        tracing::debug!(pid = %pid_uri, id = %next.id, "draft written");

        if let Some(plan) = &plan {
            self.chain.apply(plan)?;
        }
        self.with_versions(self.reader.load(&next.id, Partition::Draft)?)
    }

    /// Promote the draft to the published partition.
    ///
    /// An earlier published instance is diffed into a revision, copied to the
    /// historic partition and removed; references to it are re-pointed to the
    /// new published id, which is the draft's id.
    pub fn publish(
        &self,
        pid_uri: &PidUri,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<Resource> {
        self.ctx.require_known(actor)?;
        let located = self.require_exists(pid_uri)?;
        let Some(draft_id) = &located.draft else {
            return Err(RuleError::NotDraft {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        };
        let draft = self.reader.load(draft_id, Partition::Draft)?;
        let previous = self.load_optional(located.published.as_ref(), Partition::Published)?;

        let group = previous
            .as_ref()
            .and_then(Resource::consumer_group)
            .or_else(|| draft.consumer_group());
        if !self.ctx.directory.is_authorized(actor, group) {
            return Err(RuleError::Unauthorized {
                actor: actor.to_string(),
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }

        // Re-pointing rewrites triples of every resource referring to the old
        // id, and of the lineage neighbours.
        if let Some(old) = &previous {
            let referrers: Vec<&PidUri> = old
                .links
                .values()
                .chain(old.inbound_properties.values())
                .flatten()
                .filter_map(|end| end.pid_uri.as_ref())
                .collect();
            locks.extend(referrers)?;
        }
        let lineage = self.chain.resolve(pid_uri)?;
        locks.extend(lineage.iter().map(|m| &m.pid_uri))?;
        let later = match lineage
            .iter()
            .position(|m| m.pid_uri == *pid_uri)
            .and_then(|i| lineage.get(i + 1))
        {
            Some(member) => Some(self.reader.locate(&member.pid_uri)?),
            None => None,
        };

        let now = Utc::now();
        let mut next = draft.with_status(LifecycleStatus::Published);
        next.links.clear();
        next.inbound_properties.clear();
        next.later_version = later
            .as_ref()
            .and_then(|l| l.id_for(Partition::Published))
            .cloned();
        next.stamp_change(actor, now);

        let draft_graph = self.ctx.graph(Partition::Draft);
        let published_graph = self.ctx.graph(Partition::Published);

        match &previous {
            Some(old) => {
                for (link_type, end) in old.outbound_links() {
                    next.add_outbound_link(link_type, end.clone());
                }
                let delta = revision::diff(old, &next)?;
                self.revisions
                    .persist(&next, &delta, RevisionKind::Update, actor, now)?;

                let historic = old.with_status(LifecycleStatus::Historic);
                self.ctx.store.update(&sequence(&[
                    insert_data(self.ctx.graph(Partition::Historic), &historic.to_triples()),
                    self.drop_instance(old, Partition::Published),
                ]))?;
                tracing::debug!(pid = %pid_uri, id = %old.id, "previous published state moved to historic");
            }
            None => {
                self.revisions.persist(
                    &next,
                    &revision::initial(&next),
                    RevisionKind::Initial,
                    actor,
                    now,
                )?;
            }
        }

        let mut operations = vec![self.drop_instance(&draft, Partition::Draft)];
        if let Some(old) = &previous {
            operations.push(delete_predicate(draft_graph, old.id.as_str(), vocab::HAS_LATER_VERSION));
        }
        operations.push(delete_predicate(published_graph, next.id.as_str(), vocab::HAS_LATER_VERSION));
        operations.push(insert_data(published_graph, &next.to_triples()));
        // With the draft gone, the draft partition keeps the edge on the
        // published id.
        if let Some(target) = later.as_ref().and_then(|l| l.id_for(Partition::Draft)) {
            operations.push(insert_data(
                draft_graph,
                &[Triple::new(
                    next.id.as_str(),
                    vocab::HAS_LATER_VERSION,
                    Node::iri(target.as_str()),
                )],
            ));
        }
        self.ctx.store.update(&sequence(&operations))?;

        if let Some(old) = &previous {
            self.ctx.store.update(&sequence(&[
                repoint_references(draft_graph, old.id.as_str(), next.id.as_str()),
                repoint_references(published_graph, old.id.as_str(), next.id.as_str()),
            ]))?;
        }
        self.sweep_identifiers()?;

        tracing::debug!(pid = %pid_uri, id = %next.id, "draft published");
        self.with_versions(self.reader.load(&next.id, Partition::Published)?)
    }

    /// Set the published instance to `MarkedForDeletion`.
    pub fn mark_deleted(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        let published = self.published_without_draft(pid_uri, actor)?;
        if published.lifecycle_status == LifecycleStatus::MarkedForDeletion {
            return Err(RuleError::AlreadyInState {
                pid_uri: pid_uri.to_string(),
                state: LifecycleStatus::MarkedForDeletion.to_string(),
            }
            .into());
        }

        let graph = self.ctx.graph(Partition::Published);
        let id = published.id.as_str();
        let mut operations = vec![
            replace_predicate(
                graph,
                id,
                vocab::HAS_LIFECYCLE_STATUS,
                &Node::iri(LifecycleStatus::MarkedForDeletion.iri()),
            ),
            replace_predicate(graph, id, vocab::HAS_CHANGE_REQUESTER, &Node::literal(actor)),
        ];
        operations.extend(stamp_statements(graph, id, actor, Utc::now()));
        self.ctx.store.update(&sequence(&operations))?;
        self.with_versions(self.reader.load(&published.id, Partition::Published)?)
    }

    /// Return a `MarkedForDeletion` resource to `Published`.
    pub fn unmark_deleted(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        let published = self.published_without_draft(pid_uri, actor)?;
        if published.lifecycle_status == LifecycleStatus::Published {
            return Err(RuleError::AlreadyInState {
                pid_uri: pid_uri.to_string(),
                state: LifecycleStatus::Published.to_string(),
            }
            .into());
        }

        let graph = self.ctx.graph(Partition::Published);
        let id = published.id.as_str();
        let mut operations = vec![
            replace_predicate(
                graph,
                id,
                vocab::HAS_LIFECYCLE_STATUS,
                &Node::iri(LifecycleStatus::Published.iri()),
            ),
            delete_predicate(graph, id, vocab::HAS_CHANGE_REQUESTER),
        ];
        operations.extend(stamp_statements(graph, id, actor, Utc::now()));
        self.ctx.store.update(&sequence(&operations))?;
        self.with_versions(self.reader.load(&published.id, Partition::Published)?)
    }

    /// Discard the pending draft.
    ///
    /// Returns the published instance that remains, or `None` when the
    /// resource only existed as a draft and is now gone.
    pub fn delete_draft(
        &self,
        pid_uri: &PidUri,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<Option<Resource>> {
        self.ctx.require_known(actor)?;
        let located = self.require_exists(pid_uri)?;
        let Some(draft_id) = &located.draft else {
            return Err(RuleError::NotDraft {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        };
        let draft = self.reader.load(draft_id, Partition::Draft)?;
        let draft_graph = self.ctx.graph(Partition::Draft);

        match &located.published {
            Some(published_id) => {
                let published = self.reader.load(published_id, Partition::Published)?;
                let mut operations = vec![
                    self.drop_instance(&draft, Partition::Draft),
                    repoint_references(draft_graph, draft.id.as_str(), published_id.as_str()),
                    repoint_references(
                        self.ctx.graph(Partition::Published),
                        draft.id.as_str(),
                        published_id.as_str(),
                    ),
                ];
                if let Some(later) = &published.later_version {
                    operations.push(insert_data(
                        draft_graph,
                        &[Triple::new(
                            published_id.as_str(),
                            vocab::HAS_LATER_VERSION,
                            Node::iri(later.as_str()),
                        )],
                    ));
                }
                self.ctx.store.update(&sequence(&operations))?;
                tracing::debug!(pid = %pid_uri, "draft discarded, published state kept");
                Ok(Some(self.with_versions(published)?))
            }
            None => {
                self.chain.detach(pid_uri, locks)?;
                self.ctx
                    .store
                    .update(&self.drop_instance(&draft, Partition::Draft))?;
                tracing::debug!(pid = %pid_uri, "draft-only resource discarded");
                Ok(None)
            }
        }
    }

    /// Remove a `MarkedForDeletion` resource for good.
    ///
    /// Its links are removed (ledger records closed, not deleted), it leaves
    /// its lineage, and its published and historic instances are deleted.
    /// Revision documents stay.
    pub fn purge(&self, pid_uri: &PidUri, actor: &str, locks: &mut LockSet<'_>) -> CatalogResult<()> {
        let published = self.published_without_draft(pid_uri, actor)?;
        if published.lifecycle_status != LifecycleStatus::MarkedForDeletion {
            return Err(RuleError::NotMarkedForDeletion {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        if !self
            .ctx
            .directory
            .is_authorized(actor, published.consumer_group())
        {
            return Err(RuleError::Unauthorized {
                actor: actor.to_string(),
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }

        self.links.remove_all(&published, actor, locks)?;
        self.chain.detach(pid_uri, locks)?;

        let mut operations = Vec::new();
        for id in self.reader.historic_ids(pid_uri)? {
            let historic = self.reader.load(&id, Partition::Historic)?;
            operations.push(self.drop_instance(&historic, Partition::Historic));
        }
        let published = self.reader.load(&published.id, Partition::Published)?;
        operations.push(self.drop_instance(&published, Partition::Published));
        operations.push(delete_predicate(
            self.ctx.graph(Partition::Draft),
            published.id.as_str(),
            vocab::HAS_LATER_VERSION,
        ));
        self.ctx.store.update(&sequence(&operations))?;
        tracing::debug!(pid = %pid_uri, "resource purged");
        Ok(())
    }

    /// Attach an existing, unchained resource to the lineage of `existing`.
    pub fn link_version(
        &self,
        existing: &PidUri,
        new_pid: &PidUri,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<Resource> {
        self.ctx.require_known(actor)?;
        let located = self.require_exists(new_pid)?;
        let current = match &located.draft {
            Some(id) => self.reader.load(id, Partition::Draft)?,
            None => self.reader.load_pid(new_pid, Partition::Published)?,
        };
        if current.lifecycle_status == LifecycleStatus::MarkedForDeletion {
            return Err(RuleError::MarkedForDeletion {
                pid_uri: new_pid.to_string(),
            }
            .into());
        }
        if self.chain.resolve(new_pid)?.len() > 1 {
            return Err(RuleError::AlreadyInChain {
                pid_uri: new_pid.to_string(),
            }
            .into());
        }

        let plan: ChainPlan = self.chain.plan(existing, new_pid, current.version(), locks)?;
        self.chain.apply(&plan)?;
        let partition = match current.lifecycle_status {
            LifecycleStatus::Draft => Partition::Draft,
            _ => Partition::Published,
        };
        self.with_versions(self.reader.load(&current.id, partition)?)
    }

    /// Fill `versions` from the resolved lineage.
    pub fn with_versions(&self, mut resource: Resource) -> CatalogResult<Resource> {
        resource.versions = self.chain.resolve(&resource.pid_uri)?;
        Ok(resource)
    }

    fn require_exists(&self, pid_uri: &PidUri) -> CatalogResult<Located> {
        let located = self.reader.locate(pid_uri)?;
        if !located.exists() {
            return Err(ResourceError::NotFound {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        Ok(located)
    }

    fn load_optional(
        &self,
        id: Option<&ResourceId>,
        partition: Partition,
    ) -> CatalogResult<Option<Resource>> {
        id.map(|id| self.reader.load(id, partition)).transpose()
    }

    /// The published instance, for transitions that require no pending draft.
    fn published_without_draft(&self, pid_uri: &PidUri, actor: &str) -> CatalogResult<Resource> {
        self.ctx.require_known(actor)?;
        let located = self.require_exists(pid_uri)?;
        let Some(id) = &located.published else {
            return Err(RuleError::NotPublished {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        };
        if located.draft.is_some() {
            return Err(RuleError::PendingDraft {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        self.reader.load(id, Partition::Published)
    }

    /// Exact removal of an instance, plus any chain pointer left on its id.
    fn drop_instance(&self, resource: &Resource, partition: Partition) -> String {
        let graph = self.ctx.graph(partition);
        sequence(&[
            delete_data(graph, &resource.to_triples()),
            delete_predicate(graph, resource.id.as_str(), vocab::HAS_LATER_VERSION),
        ])
    }

    /// Remove identifier nodes left in the draft partition that nothing
    /// references any more.
    fn sweep_identifiers(&self) -> CatalogResult<()> {
        let g = iri(self.ctx.graph(Partition::Draft));
        self.ctx.store.update(&format!(
            "DELETE {{ GRAPH {g} {{ ?n ?p ?o }} }}\n\
             WHERE {{ GRAPH {g} {{\n\
               ?n a {class} ; ?p ?o .\n\
               FILTER NOT EXISTS {{ ?x ?y ?n }}\n\
             }} }}",
            class = iri(vocab::PERMANENT_IDENTIFIER),
        ))?;
        Ok(())
    }
}

/// Replace the last-change stamp of `subject` in place.
fn stamp_statements(graph: &str, subject: &str, actor: &str, at: DateTime<Utc>) -> Vec<String> {
    vec![
        replace_predicate(graph, subject, vocab::LAST_CHANGE_USER, &Node::literal(actor)),
        replace_predicate(
            graph,
            subject,
            vocab::LAST_CHANGE_DATE_TIME,
            &Node::literal(at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        ),
    ]
}
