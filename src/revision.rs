//! Revision Diff Engine: property deltas between successive published states.
//!
//! Every publish writes a revision document `<id>Rev<n>` describing what
//! changed. The added side lives in graph `<id>Rev<n>_added`, the removed side
//! in `<id>Rev<n>_removed`; an empty side is not written. Revision numbers
//! count per PID URI, across the instance ids a resource goes through.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogContext;
use crate::error::{CatalogResult, ResourceError, RuleError};
use crate::pid::PidUri;
use crate::resource::{PropertyMap, Resource, ResourceReader, Value};
use crate::store::sparql::{Node, Triple, insert_data, iri, sequence};
use crate::vocab;

/// Added and removed property values between two states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionDiff {
    pub added: PropertyMap,
    pub removed: PropertyMap,
}

impl RevisionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Why a revision was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionKind {
    /// First publish: every property counts as added.
    Initial,
    /// Republish over an earlier published state.
    Update,
}

impl RevisionKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Update => "update",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "initial" => Self::Initial,
            _ => Self::Update,
        }
    }
}

/// Header of a stored revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub number: u32,
    pub kind: RevisionKind,
    /// Subject IRI of the revision document.
    pub document: String,
    pub pid_uri: PidUri,
    pub author: String,
    pub date_created: String,
    pub has_added: bool,
    pub has_removed: bool,
}

/// A stored revision with both diff sides loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub summary: RevisionSummary,
    pub diff: RevisionDiff,
}

/// Compare two states of the same resource key by key.
///
/// Values are compared by content fingerprint, so nested entities minted
/// separately but describing the same thing are equal. Bookkeeping
/// predicates are ignored.
pub fn diff(old: &Resource, new: &Resource) -> CatalogResult<RevisionDiff> {
    if old.pid_uri != new.pid_uri {
        return Err(RuleError::PidMismatch {
            old_pid: old.pid_uri.to_string(),
            new_pid: new.pid_uri.to_string(),
        }
        .into());
    }
    Ok(diff_properties(&old.properties, &new.properties))
}

pub fn diff_properties(old: &PropertyMap, new: &PropertyMap) -> RevisionDiff {
    let mut out = RevisionDiff::default();
    let keys: Vec<&str> = old
        .keys()
        .chain(new.keys().filter(|k| !old.contains(k)))
        .filter(|k| !vocab::DIFF_IGNORED.contains(k))
        .collect();

    for key in keys {
        let before = old.get(key).unwrap_or(&[]);
        let after = new.get(key).unwrap_or(&[]);
        let before_prints: HashSet<String> = before.iter().map(Value::fingerprint).collect();
        let after_prints: HashSet<String> = after.iter().map(Value::fingerprint).collect();

        for value in after {
            if !before_prints.contains(&value.fingerprint()) {
                out.added.insert(key, value.clone());
            }
        }
        for value in before {
            if !after_prints.contains(&value.fingerprint()) {
                out.removed.insert(key, value.clone());
            }
        }
    }
    out
}

/// All content properties of `resource` as an initial revision.
pub fn initial(resource: &Resource) -> RevisionDiff {
    diff_properties(&PropertyMap::new(), &resource.properties)
}

#[derive(Clone)]
pub struct RevisionEngine {
    ctx: Arc<CatalogContext>,
    reader: ResourceReader,
}

impl RevisionEngine {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        let reader = ResourceReader::new(Arc::clone(&ctx));
        Self { ctx, reader }
    }

    /// Persist `diff` as the next revision of `published`.
    ///
    /// Returns `None` when there is nothing to record.
    pub fn persist(
        &self,
        published: &Resource,
        diff: &RevisionDiff,
        kind: RevisionKind,
        actor: &str,
        at: DateTime<Utc>,
    ) -> CatalogResult<Option<RevisionSummary>> {
        if diff.is_empty() {
            tracing::debug!(pid = %published.pid_uri, "no property changes, no revision written");
            return Ok(None);
        }
        let number = self.latest_number(&published.pid_uri)? + 1;
        let document = format!("{}Rev{number}", published.id);
        let date_created = at.to_rfc3339_opts(SecondsFormat::Micros, true);

        let header = vec![
            Triple::new(&document, vocab::RDF_TYPE, Node::iri(vocab::REVISION)),
            Triple::new(&document, vocab::HAS_PID_URI, Node::iri(published.pid_uri.as_str())),
            Triple::new(
                &document,
                vocab::REVISION_NUMBER,
                Node::typed(number.to_string(), vocab::XSD_INTEGER),
            ),
            Triple::new(&document, vocab::REVISION_KIND, Node::literal(kind.as_str())),
            Triple::new(&document, vocab::AUTHOR, Node::literal(actor)),
            Triple::new(
                &document,
                vocab::DATE_CREATED,
                Node::typed(date_created.clone(), vocab::XSD_DATE_TIME),
            ),
        ];

        let mut operations = Vec::new();
        for (side, properties) in [("added", &diff.added), ("removed", &diff.removed)] {
            if properties.is_empty() {
                continue;
            }
            let mut triples = header.clone();
            properties.collect_triples(&document, &mut triples);
            operations.push(insert_data(&format!("{document}_{side}"), &triples));
        }
        self.ctx.store.update(&sequence(&operations))?;

        tracing::debug!(
            pid = %published.pid_uri,
            revision = number,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "revision written"
        );
        Ok(Some(RevisionSummary {
            number,
            kind,
            document,
            pid_uri: published.pid_uri.clone(),
            author: actor.to_string(),
            date_created,
            has_added: !diff.added.is_empty(),
            has_removed: !diff.removed.is_empty(),
        }))
    }

    /// Highest revision number recorded for `pid_uri`, 0 when none.
    fn latest_number(&self, pid_uri: &PidUri) -> CatalogResult<u32> {
        Ok(self
            .revisions(pid_uri)?
            .last()
            .map(|r| r.number)
            .unwrap_or(0))
    }

    /// Revision headers of `pid_uri`, oldest first.
    pub fn revisions(&self, pid_uri: &PidUri) -> CatalogResult<Vec<RevisionSummary>> {
        let query = format!(
            "SELECT ?g ?doc ?n ?kind ?author ?created WHERE {{\n\
               GRAPH ?g {{\n\
                 ?doc a {revision} ;\n\
                   {pid_p} {pid} ;\n\
                   {number_p} ?n ;\n\
                   {kind_p} ?kind ;\n\
                   {author_p} ?author ;\n\
                   {created_p} ?created .\n\
               }}\n\
             }}",
            revision = iri(vocab::REVISION),
            pid_p = iri(vocab::HAS_PID_URI),
            pid = iri(pid_uri.as_str()),
            number_p = iri(vocab::REVISION_NUMBER),
            kind_p = iri(vocab::REVISION_KIND),
            author_p = iri(vocab::AUTHOR),
            created_p = iri(vocab::DATE_CREATED),
        );

        let mut by_number: BTreeMap<u32, RevisionSummary> = BTreeMap::new();
        for row in self.ctx.store.select(&query)? {
            let (Some(graph), Some(document), Some(number)) = (
                row.iri("g"),
                row.iri("doc"),
                row.str("n").and_then(|n| n.parse::<u32>().ok()),
            ) else {
                continue;
            };
            let summary = by_number.entry(number).or_insert_with(|| RevisionSummary {
                number,
                kind: RevisionKind::parse(row.str("kind").unwrap_or_default()),
                document: document.to_string(),
                pid_uri: pid_uri.clone(),
                author: row.str("author").unwrap_or_default().to_string(),
                date_created: row.str("created").unwrap_or_default().to_string(),
                has_added: false,
                has_removed: false,
            });
            if graph.ends_with("_added") {
                summary.has_added = true;
            } else if graph.ends_with("_removed") {
                summary.has_removed = true;
            }
        }
        Ok(by_number.into_values().collect())
    }

    /// Load revision `number` of `pid_uri` with both diff sides.
    pub fn revision(&self, pid_uri: &PidUri, number: u32) -> CatalogResult<Revision> {
        let summary = self
            .revisions(pid_uri)?
            .into_iter()
            .find(|r| r.number == number)
            .ok_or_else(|| ResourceError::NotInPartition {
                pid_uri: pid_uri.to_string(),
                partition: format!("revision {number}"),
            })?;

        let mut diff = RevisionDiff::default();
        if summary.has_added {
            diff.added = self.load_side(&summary.document, "added")?;
        }
        if summary.has_removed {
            diff.removed = self.load_side(&summary.document, "removed")?;
        }
        Ok(Revision { summary, diff })
    }

    fn load_side(&self, document: &str, side: &str) -> CatalogResult<PropertyMap> {
        let graph = format!("{document}_{side}");
        let Some(entity) = self.reader.load_entity(document, &graph)? else {
            return Ok(PropertyMap::new());
        };
        Ok(strip_header(entity.properties))
    }
}

/// Drop the revision header from a loaded document.
fn strip_header(properties: PropertyMap) -> PropertyMap {
    let mut out = PropertyMap::new();
    for (predicate, values) in properties.iter() {
        if matches!(
            predicate,
            vocab::HAS_PID_URI
                | vocab::REVISION_NUMBER
                | vocab::REVISION_KIND
                | vocab::AUTHOR
                | vocab::DATE_CREATED
        ) {
            continue;
        }
        for value in values {
            if predicate == vocab::RDF_TYPE && value.as_iri() == Some(vocab::REVISION) {
                continue;
            }
            out.insert(predicate, value.clone());
        }
    }
    out
}
