//! Resource Materializer: flat `(subject, predicate, object)` rows → [`Resource`].
//!
//! Rows are grouped by subject into an arena. Nested entities are resolved by
//! bounded recursion over that arena (never by following live pointers), so a
//! cyclic graph cannot cause unbounded traversal. Output order follows the
//! first-seen order of predicates in the input rows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::catalog::CatalogContext;
use crate::error::{CatalogResult, ResourceError};
use crate::pid::{PidUri, ResourceId};
use crate::store::sparql::{iri, values};
use crate::store::{Partition, Row, Term};
use crate::vocab;

use super::{Entity, LifecycleStatus, LinkDirection, LinkRef, PropertyMap, Resource, Value};

const DIR_OUT: &str = "out";
const DIR_IN: &str = "in";

/// One outbound statement in the arena.
struct Statement<'r> {
    predicate: &'r str,
    object: &'r Term,
    object_pid: Option<&'r str>,
}

/// Rows grouped by subject, in first-seen order.
struct Arena<'r> {
    subjects: HashMap<&'r str, Vec<Statement<'r>>>,
    inbound: Vec<(&'r str, &'r str, Option<&'r str>)>,
}

impl<'r> Arena<'r> {
    fn build(rows: &'r [Row]) -> Self {
        let mut subjects: HashMap<&str, Vec<Statement>> = HashMap::new();
        let mut inbound = Vec::new();

        for row in rows {
            let (Some(subject), Some(predicate), Some(object)) =
                (row.iri("s"), row.iri("p"), row.get("o"))
            else {
                continue;
            };
            let ref_pid = row.iri("refPid");
            if row.str("dir") == Some(DIR_IN) {
                inbound.push((predicate, subject, ref_pid));
                continue;
            }
            if matches!(object, Term::Blank(_)) {
                continue;
            }
            let statements = subjects.entry(subject).or_default();
            // DISTINCT rows can still repeat a statement with different aux columns.
            if statements
                .iter()
                .any(|s| s.predicate == predicate && s.object == object)
            {
                continue;
            }
            statements.push(Statement {
                predicate,
                object,
                object_pid: ref_pid,
            });
        }

        Self { subjects, inbound }
    }
}

/// Turns row sets into resources and entities.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'a> {
    link_types: &'a [String],
    max_depth: usize,
}

impl<'a> Materializer<'a> {
    pub fn new(link_types: &'a [String], max_depth: usize) -> Self {
        Self {
            link_types,
            max_depth,
        }
    }

    fn is_link(&self, predicate: &str) -> bool {
        self.link_types.iter().any(|t| t == predicate)
    }

    /// Build the resource rooted at `id`, or `None` when the rows do not
    /// describe a resource (no PID URI or no lifecycle status).
    pub fn resource(&self, id: &ResourceId, rows: &[Row]) -> Option<Resource> {
        let arena = Arena::build(rows);
        let root = arena.subjects.get(id.as_str())?;

        let mut pid_uri = None;
        let mut status = None;
        let mut later_version = None;
        let mut properties = PropertyMap::new();
        let mut links: BTreeMap<String, Vec<LinkRef>> = BTreeMap::new();

        for statement in root {
            match statement.predicate {
                vocab::HAS_PID_URI => {
                    pid_uri = statement
                        .object
                        .as_iri()
                        .and_then(|v| PidUri::parse(v).ok());
                }
                vocab::HAS_LIFECYCLE_STATUS => {
                    status = statement.object.as_iri().and_then(LifecycleStatus::from_iri);
                }
                vocab::HAS_LATER_VERSION => {
                    if later_version.is_none() {
                        later_version = statement
                            .object
                            .as_iri()
                            .and_then(|v| ResourceId::parse(v).ok());
                    }
                }
                p if self.is_link(p) => {
                    let Some(target) = statement
                        .object
                        .as_iri()
                        .and_then(|v| ResourceId::parse(v).ok())
                    else {
                        continue;
                    };
                    links.entry(p.to_string()).or_default().push(LinkRef {
                        direction: LinkDirection::Outbound,
                        id: target,
                        pid_uri: statement.object_pid.and_then(|v| PidUri::parse(v).ok()),
                    });
                }
                p => {
                    if let Some(value) = self.value(&arena, statement.object, self.max_depth) {
                        properties.insert(p, value);
                    }
                }
            }
        }

        let mut inbound_properties: BTreeMap<String, Vec<LinkRef>> = BTreeMap::new();
        for (predicate, subject, subject_pid) in &arena.inbound {
            if *predicate == vocab::HAS_LATER_VERSION {
                continue;
            }
            let Ok(source) = ResourceId::parse(subject) else {
                continue;
            };
            let end = LinkRef {
                direction: LinkDirection::Inbound,
                id: source,
                pid_uri: subject_pid.and_then(|v| PidUri::parse(v).ok()),
            };
            let target = if self.is_link(predicate) {
                &mut links
            } else {
                &mut inbound_properties
            };
            let ends = target.entry(predicate.to_string()).or_default();
            if !ends.contains(&end) {
                ends.push(end);
            }
        }

        Some(Resource {
            id: id.clone(),
            pid_uri: pid_uri?,
            lifecycle_status: status?,
            properties,
            later_version,
            links,
            inbound_properties,
            versions: Vec::new(),
        })
    }

    /// Build a plain entity rooted at `id` (used for revision documents).
    pub fn entity(&self, id: &str, rows: &[Row]) -> Option<Entity> {
        let arena = Arena::build(rows);
        arena.subjects.get(id)?;
        Some(self.entity_at(&arena, id, self.max_depth))
    }

    fn entity_at(&self, arena: &Arena<'_>, id: &str, budget: usize) -> Entity {
        let mut properties = PropertyMap::new();
        if let Some(statements) = arena.subjects.get(id) {
            for statement in statements {
                if let Some(value) = self.value(arena, statement.object, budget) {
                    properties.insert(statement.predicate, value);
                }
            }
        }
        Entity {
            id: id.to_string(),
            properties,
        }
    }

    fn value(&self, arena: &Arena<'_>, object: &Term, budget: usize) -> Option<Value> {
        match object {
            Term::Literal {
                value,
                language: Some(language),
                ..
            } => Some(Value::tagged(value.as_str(), language.as_str())),
            Term::Literal { value, datatype, .. } if datatype == vocab::XSD_STRING => {
                Some(Value::Literal(value.clone()))
            }
            Term::Literal { value, datatype, .. } => {
                Some(Value::typed(value.as_str(), datatype.as_str()))
            }
            Term::Iri(node) if budget > 0 && arena.subjects.contains_key(node.as_str()) => {
                Some(Value::Nested(self.entity_at(arena, node, budget - 1)))
            }
            Term::Iri(node) => Some(Value::Iri(node.clone())),
            Term::Blank(_) => None,
        }
    }
}

/// Where the instances of one PID URI live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub pid_uri: PidUri,
    pub draft: Option<ResourceId>,
    pub published: Option<ResourceId>,
}

impl Located {
    pub fn exists(&self) -> bool {
        self.draft.is_some() || self.published.is_some()
    }

    /// Id in `partition`, falling back to the other lifecycle partition.
    pub fn id_for(&self, partition: Partition) -> Option<&ResourceId> {
        match partition {
            Partition::Draft => self.draft.as_ref().or(self.published.as_ref()),
            _ => self.published.as_ref().or(self.draft.as_ref()),
        }
    }

    /// Every live id of this PID URI.
    pub fn ids(&self) -> Vec<&ResourceId> {
        self.draft.iter().chain(self.published.iter()).collect()
    }
}

/// Reads resources out of the lifecycle partitions.
#[derive(Clone)]
pub struct ResourceReader {
    ctx: Arc<CatalogContext>,
}

impl ResourceReader {
    pub fn new(ctx: Arc<CatalogContext>) -> Self {
        Self { ctx }
    }

    fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.ctx.config.link_types, self.ctx.config.max_nesting_depth)
    }

    /// Find the draft and published ids of a PID URI.
    pub fn locate(&self, pid_uri: &PidUri) -> CatalogResult<Located> {
        let draft_graph = self.ctx.graph(Partition::Draft);
        let published_graph = self.ctx.graph(Partition::Published);
        let query = format!(
            "SELECT ?g ?id WHERE {{ {graphs} GRAPH ?g {{ ?id {pid_p} {pid} }} }}",
            graphs = values("g", &[draft_graph, published_graph]),
            pid_p = iri(vocab::HAS_PID_URI),
            pid = iri(pid_uri.as_str()),
        );
        let rows = self.ctx.store.select(&query)?;

        let mut draft = Vec::new();
        let mut published = Vec::new();
        for row in &rows {
            let (Some(graph), Some(id)) = (row.iri("g"), row.iri("id")) else {
                continue;
            };
            let id = ResourceId::parse(id)?;
            if graph == draft_graph {
                draft.push(id);
            } else {
                published.push(id);
            }
        }

        Ok(Located {
            pid_uri: pid_uri.clone(),
            draft: single(pid_uri, Partition::Draft, draft)?,
            published: single(pid_uri, Partition::Published, published)?,
        })
    }

    /// Ids of the historic instances of a PID URI.
    pub fn historic_ids(&self, pid_uri: &PidUri) -> CatalogResult<Vec<ResourceId>> {
        let query = format!(
            "SELECT DISTINCT ?id WHERE {{ GRAPH {g} {{ ?id {pid_p} {pid} }} }}",
            g = iri(self.ctx.graph(Partition::Historic)),
            pid_p = iri(vocab::HAS_PID_URI),
            pid = iri(pid_uri.as_str()),
        );
        self.ctx
            .store
            .select(&query)?
            .iter()
            .filter_map(|row| row.iri("id"))
            .map(|id| ResourceId::parse(id).map_err(Into::into))
            .collect()
    }

    /// Materialize the instance `id` from `partition`.
    pub fn load(&self, id: &ResourceId, partition: Partition) -> CatalogResult<Resource> {
        let graph = self.ctx.graph(partition);
        let rows = self.ctx.store.select(&self.resource_query(id.as_str(), graph))?;
        self.materializer()
            .resource(id, &rows)
            .ok_or_else(|| {
                ResourceError::IdNotFound {
                    id: id.to_string(),
                    partition: partition.to_string(),
                }
                .into()
            })
    }

    /// Materialize the `partition` instance of a PID URI.
    pub fn load_pid(&self, pid_uri: &PidUri, partition: Partition) -> CatalogResult<Resource> {
        let located = self.locate(pid_uri)?;
        if !located.exists() {
            return Err(ResourceError::NotFound {
                pid_uri: pid_uri.to_string(),
            }
            .into());
        }
        let id = match partition {
            Partition::Draft => located.draft.as_ref(),
            _ => located.published.as_ref(),
        };
        let id = id.ok_or_else(|| ResourceError::NotInPartition {
            pid_uri: pid_uri.to_string(),
            partition: partition.to_string(),
        })?;
        self.load(id, partition)
    }

    /// Materialize a plain entity document from an arbitrary graph.
    pub fn load_entity(&self, id: &str, graph: &str) -> CatalogResult<Option<Entity>> {
        let rows = self.ctx.store.select(&self.resource_query(id, graph))?;
        Ok(self.materializer().entity(id, &rows))
    }

    /// Rows for `id` and its nested entities (up to the nesting cap) in
    /// `graph`, plus inbound references, each object/subject enriched with
    /// its PID URI when it is a resource.
    fn resource_query(&self, id: &str, graph: &str) -> String {
        let g = iri(graph);
        let root = iri(id);
        let status = iri(vocab::HAS_LIFECYCLE_STATUS);
        let pid = iri(vocab::HAS_PID_URI);
        let pid_graphs = values(
            "rg",
            &[
                self.ctx.graph(Partition::Draft),
                self.ctx.graph(Partition::Published),
                self.ctx.graph(Partition::Historic),
            ],
        );

        let mut outbound = format!("{{ GRAPH {g} {{ {root} ?p ?o }} BIND({root} AS ?s) }}\n");
        for depth in 1..=self.ctx.config.max_nesting_depth {
            // <root> ?h1 ?n1 . ?n1 ?h2 ?n2 ... ?n(k-1) ?hk ?s . ?s ?p ?o
            let mut path = String::new();
            let mut filters = String::new();
            let mut previous = root.clone();
            for hop in 1..=depth {
                let node = if hop == depth {
                    "?s".to_string()
                } else {
                    format!("?n{hop}")
                };
                path.push_str(&format!("{previous} ?h{hop} {node} . "));
                filters.push_str(&format!(
                    "FILTER(isIRI({node})) FILTER NOT EXISTS {{ GRAPH {g} {{ {node} {status} ?st{hop} }} }} "
                ));
                previous = node;
            }
            outbound.push_str(&format!(
                "UNION {{ GRAPH {g} {{ {path}?s ?p ?o }} {filters}}}\n"
            ));
        }

        format!(
            "SELECT DISTINCT ?s ?p ?o ?refPid ?dir WHERE {{\n\
             {{ {{ {outbound} }}\n\
               BIND(\"{DIR_OUT}\" AS ?dir)\n\
               OPTIONAL {{ {pid_graphs} GRAPH ?rg {{ ?o {pid} ?refPid }} }} }}\n\
             UNION\n\
             {{ GRAPH {g} {{ ?s ?p {root} }}\n\
               BIND({root} AS ?o)\n\
               BIND(\"{DIR_IN}\" AS ?dir)\n\
               OPTIONAL {{ {pid_graphs} GRAPH ?rg {{ ?s {pid} ?refPid }} }} }}\n\
             }}"
        )
    }
}

fn single(
    pid_uri: &PidUri,
    partition: Partition,
    mut ids: Vec<ResourceId>,
) -> CatalogResult<Option<ResourceId>> {
    match ids.len() {
        0 | 1 => Ok(ids.pop()),
        count => Err(ResourceError::Ambiguous {
            pid_uri: pid_uri.to_string(),
            partition: partition.to_string(),
            count,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri_term(v: &str) -> Term {
        Term::Iri(v.into())
    }

    fn lit(v: &str) -> Term {
        Term::Literal {
            value: v.into(),
            datatype: "http://www.w3.org/2001/XMLSchema#string".into(),
            language: None,
        }
    }

    fn out(s: &str, p: &str, o: Term) -> Row {
        Row::new()
            .with("s", iri_term(s))
            .with("p", iri_term(p))
            .with("o", o)
            .with("dir", lit(DIR_OUT))
    }

    fn base_rows(id: &str) -> Vec<Row> {
        vec![
            out(id, vocab::HAS_PID_URI, iri_term("pid:1")),
            out(id, vocab::HAS_LIFECYCLE_STATUS, iri_term(vocab::STATUS_PUBLISHED)),
        ]
    }

    fn link_types() -> Vec<String> {
        vec![vocab::term("isCopyOf")]
    }

    #[test]
    fn literals_keep_datatype_and_language() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        let size = Term::Literal {
            value: "42".into(),
            datatype: "http://www.w3.org/2001/XMLSchema#integer".into(),
            language: None,
        };
        let title = Term::Literal {
            value: "Umsatz".into(),
            datatype: "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString".into(),
            language: Some("de".into()),
        };
        rows.push(out("urn:r:1", "urn:size", size));
        rows.push(out("urn:r:1", "urn:title", title));

        let types = link_types();
        let resource = Materializer::new(&types, 4).resource(&id, &rows).unwrap();
        assert_eq!(
            resource.properties.get("urn:size").unwrap(),
            [Value::typed("42", vocab::XSD_INTEGER)]
        );
        assert_eq!(
            resource.properties.get("urn:title").unwrap(),
            [Value::tagged("Umsatz", "de")]
        );

        let rendered: Vec<String> = resource
            .to_triples()
            .iter()
            .filter(|t| t.predicate.starts_with("urn:"))
            .map(|t| t.object.render())
            .collect();
        assert!(rendered.contains(&format!("\"42\"^^<{}>", vocab::XSD_INTEGER)));
        assert!(rendered.contains(&"\"Umsatz\"@de".to_string()));
    }

    #[test]
    fn groups_properties_and_status() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        rows.push(out("urn:r:1", vocab::HAS_LABEL, lit("Sales")));
        rows.push(out("urn:r:1", vocab::HAS_VERSION, lit("2")));

        let types = link_types();
        let resource = Materializer::new(&types, 4).resource(&id, &rows).unwrap();
        assert_eq!(resource.pid_uri.as_str(), "pid:1");
        assert_eq!(resource.lifecycle_status, LifecycleStatus::Published);
        assert_eq!(resource.label(), Some("Sales"));
        assert_eq!(resource.version(), Some("2"));
        assert!(!resource.properties.contains(vocab::HAS_PID_URI));
    }

    #[test]
    fn resolves_nested_entities() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        rows.push(out("urn:r:1", "urn:endpoint", iri_term("urn:e:1")));
        rows.push(out("urn:e:1", "urn:url", lit("https://x")));

        let types = link_types();
        let resource = Materializer::new(&types, 4).resource(&id, &rows).unwrap();
        let Value::Nested(entity) = &resource.properties.get("urn:endpoint").unwrap()[0] else {
            panic!("expected nested entity");
        };
        assert_eq!(entity.id, "urn:e:1");
        assert_eq!(entity.properties.first_literal("urn:url"), Some("https://x"));
    }

    #[test]
    fn cyclic_entities_stop_at_depth_cap() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        rows.push(out("urn:r:1", "urn:next", iri_term("urn:e:a")));
        rows.push(out("urn:e:a", "urn:next", iri_term("urn:e:b")));
        rows.push(out("urn:e:b", "urn:next", iri_term("urn:e:a")));

        let types = link_types();
        let resource = Materializer::new(&types, 2).resource(&id, &rows).unwrap();
        assert_eq!(resource.properties.nesting_depth(), 2);

        let Value::Nested(a) = &resource.properties.get("urn:next").unwrap()[0] else {
            panic!("expected nested a");
        };
        let Value::Nested(b) = &a.properties.get("urn:next").unwrap()[0] else {
            panic!("expected nested b");
        };
        assert_eq!(b.properties.get("urn:next").unwrap()[0], Value::iri("urn:e:a"));
    }

    #[test]
    fn links_prefer_resolved_pid() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        rows.push(
            out("urn:r:1", &vocab::term("isCopyOf"), iri_term("urn:r:2"))
                .with("refPid", iri_term("pid:2")),
        );
        rows.push(
            Row::new()
                .with("s", iri_term("urn:r:3"))
                .with("p", iri_term(&vocab::term("isCopyOf")))
                .with("o", iri_term("urn:r:1"))
                .with("refPid", iri_term("pid:3"))
                .with("dir", lit(DIR_IN)),
        );
        rows.push(
            Row::new()
                .with("s", iri_term("urn:r:0"))
                .with("p", iri_term(vocab::HAS_LATER_VERSION))
                .with("o", iri_term("urn:r:1"))
                .with("dir", lit(DIR_IN)),
        );

        let types = link_types();
        let resource = Materializer::new(&types, 4).resource(&id, &rows).unwrap();
        let ends = &resource.links[&vocab::term("isCopyOf")];
        assert_eq!(ends.len(), 2);
        assert_eq!(ends[0].direction, LinkDirection::Outbound);
        assert_eq!(ends[0].display_uri(), "pid:2");
        assert_eq!(ends[1].direction, LinkDirection::Inbound);
        assert_eq!(ends[1].display_uri(), "pid:3");
        assert!(resource.inbound_properties.is_empty());
    }

    #[test]
    fn missing_pid_is_not_a_resource() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let rows = vec![out("urn:r:1", vocab::HAS_LABEL, lit("x"))];
        let types = link_types();
        assert!(Materializer::new(&types, 4).resource(&id, &rows).is_none());
    }

    #[test]
    fn output_is_deterministic_for_fixed_rows() {
        let id = ResourceId::parse("urn:r:1").unwrap();
        let mut rows = base_rows("urn:r:1");
        rows.push(out("urn:r:1", "urn:b", lit("1")));
        rows.push(out("urn:r:1", "urn:a", lit("2")));
        rows.push(out("urn:r:1", "urn:b", lit("3")));

        let types = link_types();
        let m = Materializer::new(&types, 4);
        let first = m.resource(&id, &rows).unwrap();
        let second = m.resource(&id, &rows).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.properties.keys().collect::<Vec<_>>(), vec!["urn:b", "urn:a"]);
    }
}
