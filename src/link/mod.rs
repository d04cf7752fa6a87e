//! Link Manager: typed, directed links between published resources.
//!
//! A link is one triple `sourceId linkType targetId` in the published
//! partition plus a record in the [`history`] ledger.

pub mod history;

use std::sync::Arc;

use chrono::Utc;

use crate::catalog::CatalogContext;
use crate::error::{CatalogResult, ResourceError, RuleError};
use crate::lock::LockSet;
use crate::pid::{LinkType, PidUri};
use crate::resource::{LifecycleStatus, LinkDirection, Resource, ResourceReader};
use crate::store::Partition;
use crate::store::sparql::{Node, Triple, delete_data, insert_data, iri};

pub use history::{Counterpart, Endpoint, LinkHistoryLedger, LinkHistoryRecord, LinkStatus};

#[derive(Clone)]
pub struct LinkManager {
    ctx: Arc<CatalogContext>,
    reader: ResourceReader,
    ledger: LinkHistoryLedger,
}

impl LinkManager {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        Self {
            reader: ResourceReader::new(Arc::clone(&ctx)),
            ledger: LinkHistoryLedger::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn ledger(&self) -> &LinkHistoryLedger {
        &self.ledger
    }

    /// Add `source -[link_type]-> target` and record it.
    ///
    /// Returns the source resource with the new link.
    pub fn add_link(
        &self,
        source_pid: &PidUri,
        link_type: &LinkType,
        target_pid: &PidUri,
        actor: &str,
    ) -> CatalogResult<Resource> {
        if source_pid == target_pid {
            return Err(RuleError::SelfLink {
                pid_uri: source_pid.to_string(),
            }
            .into());
        }
        self.ctx.require_known(actor)?;

        let source = self.published(source_pid)?;
        let target = self.published(target_pid)?;
        if source.has_outbound_link(link_type.as_str(), &target.id) {
            return Err(RuleError::LinkExists {
                source_pid: source_pid.to_string(),
                link_type: link_type.to_string(),
                target_pid: target_pid.to_string(),
            }
            .into());
        }

        let edge = link_triple(&source, link_type, &target);
        self.ctx
            .store
            .update(&insert_data(self.ctx.graph(Partition::Published), &[edge]))?;
        self.ledger.record_created(
            Endpoint {
                id: &source.id,
                pid_uri: source_pid,
            },
            link_type,
            Endpoint {
                id: &target.id,
                pid_uri: target_pid,
            },
            actor,
            Utc::now(),
        )?;

        tracing::info!(source = %source_pid, link_type = %link_type, target = %target_pid, actor, "link added");
        self.reader.load(&source.id, Partition::Published)
    }

    /// Remove `source -[link_type]-> target` and close its ledger record.
    ///
    /// Returns the target when `inverse` is set (the caller removed the link
    /// from the target's side), the source otherwise.
    pub fn remove_link(
        &self,
        source_pid: &PidUri,
        link_type: &LinkType,
        target_pid: &PidUri,
        inverse: bool,
        actor: &str,
    ) -> CatalogResult<Resource> {
        self.ctx.require_known(actor)?;
        let source = self.published(source_pid)?;
        let target = self.published(target_pid)?;

        let edge = link_triple(&source, link_type, &target);
        let published = self.ctx.graph(Partition::Published);
        let present = self.ctx.store.ask(&format!(
            "ASK {{ GRAPH {} {{ {} {} {} }} }}",
            iri(published),
            iri(&edge.subject),
            iri(&edge.predicate),
            edge.object.render()
        ))?;
        if !present {
            return Err(RuleError::LinkMissing {
                source_pid: source_pid.to_string(),
                link_type: link_type.to_string(),
                target_pid: target_pid.to_string(),
            }
            .into());
        }

        self.ctx.store.update(&delete_data(published, &[edge]))?;
        self.ledger
            .close(source_pid, link_type, target_pid, actor, Utc::now())?;

        tracing::info!(source = %source_pid, link_type = %link_type, target = %target_pid, actor, "link removed");
        let primary = if inverse { &target } else { &source };
        self.reader.load(&primary.id, Partition::Published)
    }

    /// Remove every link touching `resource`, closing each ledger record.
    ///
    /// Locks the PID URIs of all counterparts first.
    pub fn remove_all(
        &self,
        resource: &Resource,
        actor: &str,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<usize> {
        let counterparts: Vec<&PidUri> = resource
            .links
            .values()
            .flatten()
            .filter_map(|end| end.pid_uri.as_ref())
            .collect();
        locks.extend(counterparts)?;

        let mut edges = Vec::new();
        let mut closing = Vec::new();
        for (link_type, ends) in &resource.links {
            let Ok(link_type) = LinkType::resolve(link_type, &self.ctx.config.link_types) else {
                continue;
            };
            for end in ends {
                let (subject, object) = match end.direction {
                    LinkDirection::Outbound => (&resource.id, &end.id),
                    LinkDirection::Inbound => (&end.id, &resource.id),
                };
                edges.push(Triple::new(
                    subject.as_str(),
                    link_type.as_str(),
                    Node::iri(object.as_str()),
                ));
                if let Some(other) = &end.pid_uri {
                    let (start, finish) = match end.direction {
                        LinkDirection::Outbound => (resource.pid_uri.clone(), other.clone()),
                        LinkDirection::Inbound => (other.clone(), resource.pid_uri.clone()),
                    };
                    closing.push((start, link_type.clone(), finish));
                }
            }
        }
        if edges.is_empty() {
            return Ok(0);
        }

        self.ctx
            .store
            .update(&delete_data(self.ctx.graph(Partition::Published), &edges))?;
        let at = Utc::now();
        for (start, link_type, end) in &closing {
            self.ledger.close(start, link_type, end, actor, at)?;
        }
        tracing::debug!(pid = %resource.pid_uri, removed = edges.len(), "links removed");
        Ok(edges.len())
    }

    /// The published instance of `pid_uri`, which must be in `Published` state.
    fn published(&self, pid_uri: &PidUri) -> CatalogResult<Resource> {
        let located = self.reader.locate(pid_uri)?;
        if !located.exists() {
            return Err(ResourceError::NotFound {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        let Some(id) = &located.published else {
            return Err(RuleError::NotPublished {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        };
        let resource = self.reader.load(id, Partition::Published)?;
        if resource.lifecycle_status != LifecycleStatus::Published {
            return Err(RuleError::NotPublished {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        Ok(resource)
    }
}

fn link_triple(source: &Resource, link_type: &LinkType, target: &Resource) -> Triple {
    Triple::new(
        source.id.as_str(),
        link_type.as_str(),
        Node::iri(target.id.as_str()),
    )
}
