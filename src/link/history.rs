//! Link History Ledger: append-only audit trail of link events.
//!
//! One record per created link. Removing the link flips that same record to
//! `Deleted` and stamps who and when; records are never removed. Records are
//! matched by endpoint PID URIs rather than instance ids, since publishing
//! gives a resource a new id while its links carry over.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogContext;
use crate::error::{CatalogResult, StoreError};
use crate::pid::{LinkType, PidUri, ResourceId};
use crate::store::sparql::{Node, Triple, insert_data, iri, values};
use crate::store::{Partition, Row};
use crate::vocab;

/// State of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Created,
    Deleted,
}

impl LinkStatus {
    fn iri(self) -> &'static str {
        match self {
            Self::Created => vocab::LINK_CREATED,
            Self::Deleted => vocab::LINK_DELETED,
        }
    }
}

/// Display details of the resource on the other end of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterpart {
    pub pid_uri: PidUri,
    pub label: Option<String>,
    pub resource_type: Option<String>,
}

/// One link creation event and, once removed, its deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHistoryRecord {
    pub id: ResourceId,
    pub link_start: ResourceId,
    pub link_end: ResourceId,
    pub start_pid: PidUri,
    pub end_pid: PidUri,
    pub link_type: String,
    pub status: LinkStatus,
    pub author: String,
    pub date_created: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub date_deleted: Option<DateTime<Utc>>,
    /// Filled in by [`LinkHistoryLedger::query`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart: Option<Counterpart>,
}

impl LinkHistoryRecord {
    /// The timestamp records are ordered by.
    pub fn last_event(&self) -> DateTime<Utc> {
        self.date_deleted.unwrap_or(self.date_created)
    }
}

/// One endpoint of a link: instance id and PID URI.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub id: &'a ResourceId,
    pub pid_uri: &'a PidUri,
}

fn timestamp(at: DateTime<Utc>) -> Node {
    Node::typed(at.to_rfc3339_opts(SecondsFormat::Micros, true), vocab::XSD_DATE_TIME)
}

#[derive(Clone)]
pub struct LinkHistoryLedger {
    ctx: Arc<CatalogContext>,
}

impl LinkHistoryLedger {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        Self { ctx }
    }

    fn graph(&self) -> &str {
        self.ctx.graph(Partition::LinkHistory)
    }

    /// Append a `Created` record.
    pub fn record_created(
        &self,
        start: Endpoint<'_>,
        link_type: &LinkType,
        end: Endpoint<'_>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> CatalogResult<LinkHistoryRecord> {
        let record = LinkHistoryRecord {
            id: ResourceId::mint(&self.ctx.config.id_namespace),
            link_start: start.id.clone(),
            link_end: end.id.clone(),
            start_pid: start.pid_uri.clone(),
            end_pid: end.pid_uri.clone(),
            link_type: link_type.to_string(),
            status: LinkStatus::Created,
            author: actor.to_string(),
            date_created: at,
            deleted_by: None,
            date_deleted: None,
            counterpart: None,
        };

        let id = record.id.as_str();
        let triples = vec![
            Triple::new(id, vocab::RDF_TYPE, Node::iri(vocab::LINK_HISTORY)),
            Triple::new(id, vocab::LINK_START, Node::iri(record.link_start.as_str())),
            Triple::new(id, vocab::LINK_END, Node::iri(record.link_end.as_str())),
            Triple::new(id, vocab::LINK_START_PID, Node::iri(record.start_pid.as_str())),
            Triple::new(id, vocab::LINK_END_PID, Node::iri(record.end_pid.as_str())),
            Triple::new(id, vocab::LINK_TYPE, Node::iri(&record.link_type)),
            Triple::new(id, vocab::LINK_STATUS, Node::iri(LinkStatus::Created.iri())),
            Triple::new(id, vocab::AUTHOR, Node::literal(actor)),
            Triple::new(id, vocab::DATE_CREATED, timestamp(at)),
        ];
        self.ctx.store.update(&insert_data(self.graph(), &triples))?;
        tracing::debug!(record = %record.id, start = %record.start_pid, end = %record.end_pid, "link history record created");
        Ok(record)
    }

    /// Flip the open record(s) for `(start, end, type)` to `Deleted`.
    ///
    /// Links created before the ledger existed have no record; closing them is
    /// a no-op. Returns the number of records closed.
    pub fn close(
        &self,
        start_pid: &PidUri,
        link_type: &LinkType,
        end_pid: &PidUri,
        actor: &str,
        at: DateTime<Utc>,
    ) -> CatalogResult<usize> {
        let g = iri(self.graph());
        let open = format!(
            "SELECT ?r WHERE {{ GRAPH {g} {{\n\
               ?r a {record} ; {start_p} {start} ; {end_p} {end} ;\n\
                  {type_p} {link_type} ; {status_p} {created} .\n\
             }} }}",
            record = iri(vocab::LINK_HISTORY),
            start_p = iri(vocab::LINK_START_PID),
            start = iri(start_pid.as_str()),
            end_p = iri(vocab::LINK_END_PID),
            end = iri(end_pid.as_str()),
            type_p = iri(vocab::LINK_TYPE),
            link_type = iri(link_type.as_str()),
            status_p = iri(vocab::LINK_STATUS),
            created = iri(vocab::LINK_CREATED),
        );
        let records: Vec<String> = self
            .ctx
            .store
            .select(&open)?
            .iter()
            .filter_map(|row| row.iri("r").map(str::to_string))
            .collect();

        if records.is_empty() {
            tracing::warn!(
                start = %start_pid,
                end = %end_pid,
                link_type = %link_type,
                "no open link history record; ledger unchanged"
            );
            return Ok(0);
        }

        let update = format!(
            "DELETE {{ GRAPH {g} {{ ?r {status_p} {created} }} }}\n\
             INSERT {{ GRAPH {g} {{ ?r {status_p} {deleted} ; {by_p} {actor} ; {date_p} {at} }} }}\n\
             WHERE {{ {records} GRAPH {g} {{ ?r {status_p} {created} }} }}",
            status_p = iri(vocab::LINK_STATUS),
            created = iri(vocab::LINK_CREATED),
            deleted = iri(LinkStatus::Deleted.iri()),
            by_p = iri(vocab::DELETED_BY),
            actor = Node::literal(actor).render(),
            date_p = iri(vocab::DATE_DELETED),
            at = timestamp(at).render(),
            records = values("r", &records),
        );
        self.ctx.store.update(&update)?;
        tracing::debug!(start = %start_pid, end = %end_pid, closed = records.len(), "link history record closed");
        Ok(records.len())
    }

    /// Every record touching `pid_uri`, most recent event first, each with
    /// the other endpoint's label and type.
    pub fn query(&self, pid_uri: &PidUri) -> CatalogResult<Vec<LinkHistoryRecord>> {
        let filter = format!(
            "FILTER(?startPid = {pid} || ?endPid = {pid})",
            pid = iri(pid_uri.as_str())
        );
        let mut records = self.select_records(&filter)?;
        let others: BTreeSet<PidUri> = records
            .iter()
            .map(|r| {
                if r.start_pid == *pid_uri {
                    r.end_pid.clone()
                } else {
                    r.start_pid.clone()
                }
            })
            .collect();
        let details = self.counterparts(&others)?;
        for record in &mut records {
            let other = if record.start_pid == *pid_uri {
                &record.end_pid
            } else {
                &record.start_pid
            };
            record.counterpart = Some(details.get(other).cloned().unwrap_or_else(|| Counterpart {
                pid_uri: other.clone(),
                label: None,
                resource_type: None,
            }));
        }
        Ok(records)
    }

    /// Records for links from `start_pid` to `end_pid`, most recent first.
    pub fn query_between(
        &self,
        start_pid: &PidUri,
        end_pid: &PidUri,
    ) -> CatalogResult<Vec<LinkHistoryRecord>> {
        let filter = format!(
            "FILTER(?startPid = {} && ?endPid = {})",
            iri(start_pid.as_str()),
            iri(end_pid.as_str())
        );
        let mut records = self.select_records(&filter)?;
        let details = self.counterparts(&BTreeSet::from([end_pid.clone()]))?;
        for record in &mut records {
            record.counterpart = details.get(end_pid).cloned();
        }
        Ok(records)
    }

    fn select_records(&self, filter: &str) -> CatalogResult<Vec<LinkHistoryRecord>> {
        let query = format!(
            "SELECT ?r ?start ?end ?startPid ?endPid ?type ?status ?author ?created ?deletedBy ?deleted\n\
             WHERE {{ GRAPH {g} {{\n\
               ?r a {record} ;\n\
                  {start_p} ?start ; {end_p} ?end ;\n\
                  {start_pid_p} ?startPid ; {end_pid_p} ?endPid ;\n\
                  {type_p} ?type ; {status_p} ?status ;\n\
                  {author_p} ?author ; {created_p} ?created .\n\
               OPTIONAL {{ ?r {by_p} ?deletedBy }}\n\
               OPTIONAL {{ ?r {deleted_p} ?deleted }}\n\
               {filter}\n\
             }} }}",
            g = iri(self.graph()),
            record = iri(vocab::LINK_HISTORY),
            start_p = iri(vocab::LINK_START),
            end_p = iri(vocab::LINK_END),
            start_pid_p = iri(vocab::LINK_START_PID),
            end_pid_p = iri(vocab::LINK_END_PID),
            type_p = iri(vocab::LINK_TYPE),
            status_p = iri(vocab::LINK_STATUS),
            author_p = iri(vocab::AUTHOR),
            created_p = iri(vocab::DATE_CREATED),
            by_p = iri(vocab::DELETED_BY),
            deleted_p = iri(vocab::DATE_DELETED),
        );

        let mut records = self
            .ctx
            .store
            .select(&query)?
            .iter()
            .map(parse_record)
            .collect::<CatalogResult<Vec<_>>>()?;
        records.sort_by(|a, b| {
            b.last_event()
                .cmp(&a.last_event())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Label and type of each PID URI, published state preferred.
    fn counterparts(&self, pids: &BTreeSet<PidUri>) -> CatalogResult<BTreeMap<PidUri, Counterpart>> {
        if pids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let pids: Vec<&PidUri> = pids.iter().collect();
        let published_graph = self.ctx.graph(Partition::Published);
        let query = format!(
            "SELECT ?g ?pid ?label ?type WHERE {{\n\
               {graphs}\n\
               {pids}\n\
               GRAPH ?g {{\n\
                 ?id {pid_p} ?pid .\n\
                 OPTIONAL {{ ?id {label_p} ?label }}\n\
                 OPTIONAL {{ ?id {type_p} ?type }}\n\
               }}\n\
             }}",
            graphs = values(
                "g",
                &[published_graph, self.ctx.graph(Partition::Draft), self.ctx.graph(Partition::Historic)]
            ),
            pids = values("pid", &pids),
            pid_p = iri(vocab::HAS_PID_URI),
            label_p = iri(vocab::HAS_LABEL),
            type_p = iri(vocab::RDF_TYPE),
        );

        let mut out: BTreeMap<PidUri, Counterpart> = BTreeMap::new();
        for row in self.ctx.store.select(&query)? {
            let Some(pid) = row.iri("pid").and_then(|v| PidUri::parse(v).ok()) else {
                continue;
            };
            let preferred = row.iri("g") == Some(published_graph);
            if out.contains_key(&pid) && !preferred {
                continue;
            }
            let entry = out.entry(pid.clone()).or_insert_with(|| Counterpart {
                pid_uri: pid,
                label: None,
                resource_type: None,
            });
            if entry.label.is_none() || preferred {
                if let Some(label) = row.str("label") {
                    entry.label = Some(label.to_string());
                }
            }
            if entry.resource_type.is_none() || preferred {
                if let Some(t) = row.iri("type") {
                    entry.resource_type = Some(t.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn parse_time(value: &str) -> CatalogResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::UnexpectedResult {
                operation: "select".into(),
                message: format!("invalid ledger timestamp {value:?}: {e}"),
            }
            .into()
        })
}

fn required<'r>(row: &'r Row, var: &str) -> CatalogResult<&'r str> {
    row.str(var).ok_or_else(|| {
        StoreError::UnexpectedResult {
            operation: "select".into(),
            message: format!("ledger row without ?{var}"),
        }
        .into()
    })
}

fn parse_record(row: &Row) -> CatalogResult<LinkHistoryRecord> {
    let status = if required(row, "status")? == vocab::LINK_DELETED {
        LinkStatus::Deleted
    } else {
        LinkStatus::Created
    };
    Ok(LinkHistoryRecord {
        id: ResourceId::parse(required(row, "r")?)?,
        link_start: ResourceId::parse(required(row, "start")?)?,
        link_end: ResourceId::parse(required(row, "end")?)?,
        start_pid: PidUri::parse(required(row, "startPid")?)?,
        end_pid: PidUri::parse(required(row, "endPid")?)?,
        link_type: required(row, "type")?.to_string(),
        status,
        author: required(row, "author")?.to_string(),
        date_created: parse_time(required(row, "created")?)?,
        deleted_by: row.str("deletedBy").map(str::to_string),
        date_deleted: row.str("deleted").map(parse_time).transpose()?,
        counterpart: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_roundtrip_through_rfc3339() {
        let at = Utc::now();
        let Node::Typed { value, datatype } = timestamp(at) else {
            panic!("expected typed literal");
        };
        assert_eq!(datatype, vocab::XSD_DATE_TIME);
        let parsed = parse_time(&value).unwrap();
        assert_eq!(parsed.timestamp_micros(), at.timestamp_micros());
    }

    #[test]
    fn last_event_prefers_deletion() {
        let created = Utc::now();
        let mut record = LinkHistoryRecord {
            id: ResourceId::parse("urn:h:1").unwrap(),
            link_start: ResourceId::parse("urn:r:1").unwrap(),
            link_end: ResourceId::parse("urn:r:2").unwrap(),
            start_pid: PidUri::parse("pid:1").unwrap(),
            end_pid: PidUri::parse("pid:2").unwrap(),
            link_type: vocab::term("isCopyOf"),
            status: LinkStatus::Created,
            author: "alice".into(),
            date_created: created,
            deleted_by: None,
            date_deleted: None,
            counterpart: None,
        };
        assert_eq!(record.last_event(), created);
        let deleted = created + chrono::Duration::seconds(5);
        record.date_deleted = Some(deleted);
        assert_eq!(record.last_event(), deleted);
    }
}
