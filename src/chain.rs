//! Version Chain Manager: the `HasLaterVersion` lineage of a resource.
//!
//! Chain edges connect instance ids. Each edge is written into both the draft
//! and the published partition, using in each the endpoint's id in that
//! partition (or its other live id when it has none there). Resolution works
//! on PID URIs: it walks the edges over the merged draft+published view,
//! collapses instance ids to their PID URI and orders the PIDs with a
//! topological sort. Labels only decide where a new member is inserted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::catalog::CatalogContext;
use crate::error::{CatalogResult, ResourceError, RuleError};
use crate::lock::LockSet;
use crate::pid::{PidUri, ResourceId};
use crate::resource::version::compare_versions;
use crate::resource::{LifecycleStatus, Located, ResourceReader, VersionSummary};
use crate::store::Partition;
use crate::store::sparql::{Node, Triple, delete_data, insert_data, iri, sequence, values};
use crate::vocab;

/// Where a new member enters a lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainPlan {
    /// After the latest member.
    Append { tail: PidUri, new: PidUri },
    /// Before the earliest member.
    Prepend { head: PidUri, new: PidUri },
    /// Between two adjacent members; their edge is replaced.
    Between {
        before: PidUri,
        after: PidUri,
        new: PidUri,
    },
}

impl ChainPlan {
    pub fn new_member(&self) -> &PidUri {
        match self {
            Self::Append { new, .. } | Self::Prepend { new, .. } | Self::Between { new, .. } => {
                new
            }
        }
    }
}

#[derive(Clone)]
pub struct VersionChain {
    ctx: Arc<CatalogContext>,
    reader: ResourceReader,
}

impl VersionChain {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        let reader = ResourceReader::new(Arc::clone(&ctx));
        Self { ctx, reader }
    }

    /// Resolve the lineage of `pid_uri`, earliest first.
    ///
    /// For each member the draft instance wins over the published one, so a
    /// pending draft supersedes its published state in the listing. Members
    /// without a version label are left out.
    pub fn resolve(&self, pid_uri: &PidUri) -> CatalogResult<Vec<VersionSummary>> {
        if !self.reader.locate(pid_uri)?.exists() {
            return Err(ResourceError::NotFound {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }

        let rows = self.ctx.store.select(&self.lineage_query(pid_uri))?;
        let mut members = BTreeSet::new();
        let mut edges = BTreeSet::new();
        for row in &rows {
            let Some(member) = row.iri("memberPid").and_then(|v| PidUri::parse(v).ok()) else {
                continue;
            };
            if let Some(later) = row.iri("laterPid").and_then(|v| PidUri::parse(v).ok()) {
                if later != member {
                    members.insert(later.clone());
                    edges.insert((member.clone(), later));
                }
            }
            members.insert(member);
        }

        let ordered = order_members(pid_uri, &members, &edges)?;
        let summaries = self.summaries(&ordered)?;
        tracing::debug!(pid = %pid_uri, members = ordered.len(), "resolved version chain");
        Ok(ordered
            .into_iter()
            .filter_map(|pid| summaries.get(&pid).cloned())
            .collect())
    }

    /// Decide where `new_pid` (labelled `new_version`) enters the lineage of
    /// `existing`, locking every current member of that lineage.
    pub fn plan(
        &self,
        existing: &PidUri,
        new_pid: &PidUri,
        new_version: Option<&str>,
        locks: &mut LockSet<'_>,
    ) -> CatalogResult<ChainPlan> {
        let first = self.resolve(existing)?;
        locks.extend(first.iter().map(|m| &m.pid_uri))?;
        // Re-read under the member locks; nothing can join or leave now.
        let chain = self.resolve(existing)?;
        locks.extend(chain.iter().map(|m| &m.pid_uri))?;

        if chain.is_empty() {
            return Err(RuleError::NoVersionHistory {
                pid_uri: existing.to_string(),
            }
            .into());
        }
        if chain.iter().any(|m| m.pid_uri == *new_pid) {
            return Err(RuleError::AlreadyInChain {
                pid_uri: new_pid.to_string(),
            }
            .into());
        }
        let version = new_version.ok_or_else(|| RuleError::MissingVersion {
            pid_uri: new_pid.to_string(),
        })?;
        check_distinct_version(&chain, new_pid, version)?;

        let position = chain
            .iter()
            .position(|m| compare_versions(&m.version, version).is_gt());
        let new = new_pid.clone();
        let plan = match position {
            None => ChainPlan::Append {
                tail: chain[chain.len() - 1].pid_uri.clone(),
                new,
            },
            Some(0) => ChainPlan::Prepend {
                head: chain[0].pid_uri.clone(),
                new,
            },
            Some(i) => ChainPlan::Between {
                before: chain[i - 1].pid_uri.clone(),
                after: chain[i].pid_uri.clone(),
                new,
            },
        };
        tracing::debug!(anchor = %existing, ?plan, "planned chain insertion");
        Ok(plan)
    }

    /// Write the edges of a plan.
    pub fn apply(&self, plan: &ChainPlan) -> CatalogResult<()> {
        match plan {
            ChainPlan::Append { tail, new } => {
                let (tail, new) = (self.reader.locate(tail)?, self.reader.locate(new)?);
                self.ctx.store.update(&self.edge_update(&[], &[(&tail, &new)]))?;
            }
            ChainPlan::Prepend { head, new } => {
                let (head, new) = (self.reader.locate(head)?, self.reader.locate(new)?);
                self.ctx.store.update(&self.edge_update(&[], &[(&new, &head)]))?;
            }
            ChainPlan::Between { before, after, new } => {
                let before = self.reader.locate(before)?;
                let after = self.reader.locate(after)?;
                let new = self.reader.locate(new)?;
                self.ctx.store.update(&self.edge_update(
                    &[(&before, &after)],
                    &[(&before, &new), (&new, &after)],
                ))?;
            }
        }
        tracing::debug!(?plan, "applied chain insertion");
        Ok(())
    }

    /// Take `pid_uri` out of its lineage, bridging its neighbours.
    pub fn detach(&self, pid_uri: &PidUri, locks: &mut LockSet<'_>) -> CatalogResult<()> {
        let first = self.resolve(pid_uri)?;
        locks.extend(first.iter().map(|m| &m.pid_uri))?;
        let chain = self.resolve(pid_uri)?;
        locks.extend(chain.iter().map(|m| &m.pid_uri))?;

        let Some(idx) = chain.iter().position(|m| m.pid_uri == *pid_uri) else {
            return Ok(());
        };
        let member = self.reader.locate(pid_uri)?;
        let previous = match idx.checked_sub(1) {
            Some(i) => Some(self.reader.locate(&chain[i].pid_uri)?),
            None => None,
        };
        let next = match chain.get(idx + 1) {
            Some(m) => Some(self.reader.locate(&m.pid_uri)?),
            None => None,
        };

        let mut removed = Vec::new();
        let mut added = Vec::new();
        if let Some(previous) = &previous {
            removed.push((previous, &member));
        }
        if let Some(next) = &next {
            removed.push((&member, next));
        }
        if let (Some(previous), Some(next)) = (&previous, &next) {
            added.push((previous, next));
        }
        if removed.is_empty() {
            return Ok(());
        }
        self.ctx.store.update(&self.edge_update(&removed, &added))?;
        tracing::debug!(pid = %pid_uri, "detached from version chain");
        Ok(())
    }

    /// One update removing every id-level edge of `removed` and adding
    /// `added` in both lifecycle partitions.
    fn edge_update(&self, removed: &[(&Located, &Located)], added: &[(&Located, &Located)]) -> String {
        let mut operations = Vec::new();
        for partition in [Partition::Draft, Partition::Published] {
            let graph = self.ctx.graph(partition);

            let stale: Vec<Triple> = removed
                .iter()
                .flat_map(|(from, to)| {
                    from.ids().into_iter().flat_map(move |a| {
                        to.ids()
                            .into_iter()
                            .map(move |b| later_version_edge(a.as_str(), b.as_str()))
                    })
                })
                .collect();
            if !stale.is_empty() {
                operations.push(delete_data(graph, &stale));
            }

            let fresh: Vec<Triple> = added
                .iter()
                .filter_map(|(from, to)| {
                    let (a, b) = (from.id_for(partition)?, to.id_for(partition)?);
                    Some(later_version_edge(a.as_str(), b.as_str()))
                })
                .collect();
            if !fresh.is_empty() {
                operations.push(insert_data(graph, &fresh));
            }
        }
        sequence(&operations)
    }

    fn lineage_query(&self, pid_uri: &PidUri) -> String {
        format!(
            "SELECT DISTINCT ?memberPid ?laterPid\n\
             FROM {draft}\n\
             FROM {published}\n\
             WHERE {{\n\
               ?anchor {pid_p} {pid} .\n\
               ?anchor ({later}|^{later})* ?member .\n\
               ?member {pid_p} ?memberPid .\n\
               OPTIONAL {{ ?member {later} ?next . ?next {pid_p} ?laterPid }}\n\
             }}",
            draft = iri(self.ctx.graph(Partition::Draft)),
            published = iri(self.ctx.graph(Partition::Published)),
            pid_p = iri(vocab::HAS_PID_URI),
            pid = iri(pid_uri.as_str()),
            later = iri(vocab::HAS_LATER_VERSION),
        )
    }

    fn summaries(&self, pids: &[PidUri]) -> CatalogResult<BTreeMap<PidUri, VersionSummary>> {
        if pids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let draft_graph = self.ctx.graph(Partition::Draft);
        let query = format!(
            "SELECT ?g ?id ?pid ?status ?version WHERE {{\n\
               {graphs}\n\
               {pids}\n\
               GRAPH ?g {{\n\
                 ?id {pid_p} ?pid ; {status_p} ?status .\n\
                 OPTIONAL {{ ?id {version_p} ?version }}\n\
               }}\n\
             }}",
            graphs = values("g", &[draft_graph, self.ctx.graph(Partition::Published)]),
            pids = values("pid", pids),
            pid_p = iri(vocab::HAS_PID_URI),
            status_p = iri(vocab::HAS_LIFECYCLE_STATUS),
            version_p = iri(vocab::HAS_VERSION),
        );

        let mut out: BTreeMap<PidUri, VersionSummary> = BTreeMap::new();
        for row in self.ctx.store.select(&query)? {
            let (Some(graph), Some(id), Some(pid), Some(status), Some(version)) = (
                row.iri("g"),
                row.iri("id"),
                row.iri("pid"),
                row.iri("status").and_then(LifecycleStatus::from_iri),
                row.str("version"),
            ) else {
                continue;
            };
            let summary = VersionSummary {
                id: ResourceId::parse(id)?,
                pid_uri: PidUri::parse(pid)?,
                version: version.to_string(),
                lifecycle_status: status,
            };
            let from_draft = graph == draft_graph;
            match out.get(&summary.pid_uri) {
                Some(existing) if existing.lifecycle_status == LifecycleStatus::Draft => {}
                Some(_) if !from_draft => {}
                _ => {
                    out.insert(summary.pid_uri.clone(), summary);
                }
            }
        }
        Ok(out)
    }
}

fn later_version_edge(from: &str, to: &str) -> Triple {
    Triple::new(from, vocab::HAS_LATER_VERSION, Node::iri(to))
}

/// Reject `version` when another member of `chain` carries the same label.
pub fn check_distinct_version(
    chain: &[VersionSummary],
    pid_uri: &PidUri,
    version: &str,
) -> CatalogResult<()> {
    match chain
        .iter()
        .find(|m| m.pid_uri != *pid_uri && compare_versions(&m.version, version).is_eq())
    {
        Some(clash) => Err(RuleError::IdenticalVersion {
            version: version.to_string(),
            pid_uri: clash.pid_uri.to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Order PID-level chain members from earliest to latest.
///
/// The edges must form a single path: no cycle, no member with two
/// predecessors or successors, one earliest member.
fn order_members(
    anchor: &PidUri,
    members: &BTreeSet<PidUri>,
    edges: &BTreeSet<(PidUri, PidUri)>,
) -> CatalogResult<Vec<PidUri>> {
    let broken = |reason: String| RuleError::BrokenChain {
        pid_uri: anchor.to_string(),
        reason,
    };

    let mut graph: DiGraph<PidUri, ()> = DiGraph::new();
    let index: BTreeMap<&PidUri, NodeIndex> = members
        .iter()
        .map(|pid| (pid, graph.add_node(pid.clone())))
        .collect();
    for (from, to) in edges {
        if let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) {
            graph.add_edge(a, b, ());
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        broken(format!("cycle through {}", graph[cycle.node_id()]))
    })?;
    for node in graph.node_indices() {
        if graph.neighbors_directed(node, Direction::Outgoing).count() > 1 {
            return Err(broken(format!("{} has several later versions", graph[node])).into());
        }
        if graph.neighbors_directed(node, Direction::Incoming).count() > 1 {
            return Err(broken(format!("{} has several earlier versions", graph[node])).into());
        }
    }
    let earliest = graph.externals(Direction::Incoming).count();
    if earliest > 1 {
        return Err(broken(format!("{earliest} earliest members")).into());
    }

    Ok(sorted.into_iter().map(|idx| graph[idx].clone()).collect())
}
