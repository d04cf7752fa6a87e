//! The `Resource` aggregate and its building blocks.
//!
//! A resource is one lifecycle-state instance (draft, published, historic) of a
//! conceptual record identified by its [`PidUri`]. Its triples live in exactly
//! one partition; [`Resource::to_triples`] reproduces them so a state can be
//! deleted or moved with exact `DELETE DATA` / `INSERT DATA` statements.

pub mod materialize;
pub mod version;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CatalogResult, ResourceError, RuleError};
use crate::pid::{PidUri, ResourceId};
use crate::store::sparql::{Node, Triple};
use crate::vocab;

pub use materialize::{Located, Materializer, ResourceReader};

/// Lifecycle state of a resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStatus {
    Draft,
    Published,
    MarkedForDeletion,
    Historic,
}

impl LifecycleStatus {
    pub fn iri(self) -> &'static str {
        match self {
            Self::Draft => vocab::STATUS_DRAFT,
            Self::Published => vocab::STATUS_PUBLISHED,
            Self::MarkedForDeletion => vocab::STATUS_MARKED_FOR_DELETION,
            Self::Historic => vocab::STATUS_HISTORIC,
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            vocab::STATUS_DRAFT => Some(Self::Draft),
            vocab::STATUS_PUBLISHED => Some(Self::Published),
            vocab::STATUS_MARKED_FOR_DELETION => Some(Self::MarkedForDeletion),
            vocab::STATUS_HISTORIC => Some(Self::Historic),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "Draft"),
            Self::Published => write!(f, "Published"),
            Self::MarkedForDeletion => write!(f, "MarkedForDeletion"),
            Self::Historic => write!(f, "Historic"),
        }
    }
}

/// A property value: a literal, a reference to another node, or a nested entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Literal(String),
    /// Literal with a datatype other than `xsd:string`.
    Typed { value: String, datatype: String },
    /// Language-tagged string.
    Tagged { value: String, language: String },
    Iri(String),
    Nested(Entity),
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Typed {
            value: value.into(),
            datatype: datatype.into(),
        }
    }

    pub fn tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Tagged {
            value: value.into(),
            language: language.into(),
        }
    }

    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri(value.into())
    }

    /// Lexical form of any literal value.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(v) | Self::Typed { value: v, .. } | Self::Tagged { value: v, .. } => {
                Some(v)
            }
            _ => None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(v) => Some(v),
            _ => None,
        }
    }

    /// Content key that ignores nested entity ids.
    ///
    /// Two values with the same fingerprint describe the same content even when
    /// their nested entities were minted separately.
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Literal(v) => format!("L{v:?}"),
            Self::Typed { value, datatype } => format!("L{value:?}^^<{datatype}>"),
            Self::Tagged { value, language } => {
                format!("L{value:?}@{}", language.to_ascii_lowercase())
            }
            Self::Iri(v) => format!("I<{v}>"),
            Self::Nested(entity) => entity.fingerprint(),
        }
    }
}

/// A nested sub-entity (e.g. a distribution endpoint) owned by a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entity {
    /// IRI of the node. Empty for entities not yet written.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl Entity {
    pub fn new(properties: PropertyMap) -> Self {
        Self {
            id: String::new(),
            properties,
        }
    }

    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = self
            .properties
            .iter()
            .flat_map(|(p, values)| values.iter().map(move |v| format!("{p}={}", v.fingerprint())))
            .collect();
        parts.sort();
        format!("N{{{}}}", parts.join(";"))
    }

    fn collect_triples(&self, out: &mut Vec<Triple>) {
        self.properties.collect_triples(&self.id, out);
    }

    fn depth(&self) -> usize {
        1 + self.properties.nesting_depth()
    }
}

/// Ordered multimap of predicate → values; keeps first-seen predicate order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyMap {
    entries: Vec<(String, Vec<Value>)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `predicate`.
    pub fn insert(&mut self, predicate: impl Into<String>, value: Value) {
        let predicate = predicate.into();
        match self.entries.iter_mut().find(|(p, _)| *p == predicate) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((predicate, vec![value])),
        }
    }

    /// Replace all values of `predicate`.
    pub fn set(&mut self, predicate: impl Into<String>, values: Vec<Value>) {
        let predicate = predicate.into();
        match self.entries.iter_mut().find(|(p, _)| *p == predicate) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((predicate, values)),
        }
    }

    pub fn remove(&mut self, predicate: &str) -> Option<Vec<Value>> {
        let idx = self.entries.iter().position(|(p, _)| p == predicate)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn get(&self, predicate: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(p, _)| p == predicate)
            .map(|(_, v)| v.as_slice())
    }

    /// First literal value of `predicate`.
    pub fn first_literal(&self, predicate: &str) -> Option<&str> {
        self.get(predicate)?.iter().find_map(Value::as_literal)
    }

    /// First IRI value of `predicate`.
    pub fn first_iri(&self, predicate: &str) -> Option<&str> {
        self.get(predicate)?.iter().find_map(Value::as_iri)
    }

    pub fn contains(&self, predicate: &str) -> bool {
        self.get(predicate).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries.iter().map(|(p, v)| (p.as_str(), v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deepest chain of nested entities below this map (0 = only literals/IRIs).
    pub fn nesting_depth(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|(_, values)| values.iter())
            .map(|v| match v {
                Value::Nested(entity) => entity.depth(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Give every nested entity a fresh id under `namespace`.
    ///
    /// Entity nodes belong to exactly one instance, so ids read back from
    /// another instance are never reused.
    pub fn assign_entity_ids(&mut self, namespace: &str) {
        for (_, values) in &mut self.entries {
            for value in values.iter_mut() {
                if let Value::Nested(entity) = value {
                    entity.id = ResourceId::mint(namespace).into();
                    entity.properties.assign_entity_ids(namespace);
                }
            }
        }
    }

    /// Triples for `subject`, including nested entity subtrees.
    pub fn collect_triples(&self, subject: &str, out: &mut Vec<Triple>) {
        for (predicate, values) in &self.entries {
            for value in values {
                let object = match value {
                    Value::Literal(v) => Node::literal(v.clone()),
                    Value::Typed { value, datatype } => Node::typed(value.clone(), datatype),
                    Value::Tagged { value, language } => Node::tagged(value.clone(), language),
                    Value::Iri(v) => Node::iri(v.clone()),
                    Value::Nested(entity) => {
                        entity.collect_triples(out);
                        Node::iri(entity.id.clone())
                    }
                };
                out.push(Triple::new(subject, predicate.clone(), object));
            }
        }
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (predicate, values) in &self.entries {
            map.serialize_entry(predicate, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PropertyMapVisitor;

        impl<'de> Visitor<'de> for PropertyMapVisitor {
            type Value = PropertyMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of predicate IRI to a list of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PropertyMap, A::Error> {
                let mut map = PropertyMap::new();
                while let Some((predicate, values)) = access.next_entry::<String, Vec<Value>>()? {
                    for value in values {
                        map.insert(predicate.clone(), value);
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(PropertyMapVisitor)
    }
}

/// Which side of a link the counterpart sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkDirection {
    Outbound,
    Inbound,
}

/// One end of a link as seen from a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub direction: LinkDirection,
    /// Internal id of the counterpart instance.
    pub id: ResourceId,
    /// Counterpart's PID URI when it resolves.
    pub pid_uri: Option<PidUri>,
}

impl LinkRef {
    /// The PID URI when known, the raw id otherwise.
    pub fn display_uri(&self) -> &str {
        self.pid_uri
            .as_ref()
            .map(PidUri::as_str)
            .unwrap_or_else(|| self.id.as_str())
    }
}

/// Summary of one member of a version chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub id: ResourceId,
    pub pid_uri: PidUri,
    pub version: String,
    pub lifecycle_status: LifecycleStatus,
}

/// One lifecycle-state instance of a catalog resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub pid_uri: PidUri,
    pub lifecycle_status: LifecycleStatus,
    /// Content properties; excludes the PID, status, chain pointer and links.
    pub properties: PropertyMap,
    /// Target of this instance's `HasLaterVersion` edge.
    pub later_version: Option<ResourceId>,
    /// Link type → link ends, both directions.
    pub links: BTreeMap<String, Vec<LinkRef>>,
    /// Inbound predicate → referring instances (non-link, non-chain predicates).
    pub inbound_properties: BTreeMap<String, Vec<LinkRef>>,
    /// Resolved version chain, earliest first. Empty until resolved.
    #[serde(default)]
    pub versions: Vec<VersionSummary>,
}

impl Resource {
    /// Build a fresh draft instance from a validated request.
    pub fn draft(id: ResourceId, request: &ResourceRequest, entity_namespace: &str) -> Self {
        let mut properties = request.properties.clone();
        properties.assign_entity_ids(entity_namespace);
        Self {
            id,
            pid_uri: request.pid_uri.clone(),
            lifecycle_status: LifecycleStatus::Draft,
            properties,
            later_version: None,
            links: BTreeMap::new(),
            inbound_properties: BTreeMap::new(),
            versions: Vec::new(),
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.properties.first_literal(vocab::HAS_VERSION)
    }

    pub fn label(&self) -> Option<&str> {
        self.properties.first_literal(vocab::HAS_LABEL)
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.properties.first_iri(vocab::RDF_TYPE)
    }

    pub fn consumer_group(&self) -> Option<&str> {
        self.properties
            .get(vocab::HAS_CONSUMER_GROUP)?
            .iter()
            .find_map(|v| v.as_literal().or_else(|| v.as_iri()))
    }

    /// Copy with a different lifecycle status.
    pub fn with_status(&self, status: LifecycleStatus) -> Self {
        Self {
            lifecycle_status: status,
            ..self.clone()
        }
    }

    /// Stamp the actor and time of the latest change.
    pub fn stamp_change(&mut self, actor: &str, at: chrono::DateTime<chrono::Utc>) {
        self.properties
            .set(vocab::LAST_CHANGE_USER, vec![Value::literal(actor)]);
        self.properties.set(
            vocab::LAST_CHANGE_DATE_TIME,
            vec![Value::literal(at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))],
        );
    }

    /// Outbound links as `(link type, end)` pairs.
    pub fn outbound_links(&self) -> impl Iterator<Item = (&str, &LinkRef)> {
        self.links.iter().flat_map(|(link_type, ends)| {
            ends.iter()
                .filter(|end| end.direction == LinkDirection::Outbound)
                .map(move |end| (link_type.as_str(), end))
        })
    }

    pub fn has_outbound_link(&self, link_type: &str, target: &ResourceId) -> bool {
        self.outbound_links()
            .any(|(t, end)| t == link_type && end.id == *target)
    }

    /// Add an outbound link end unless it is already present.
    pub fn add_outbound_link(&mut self, link_type: &str, end: LinkRef) {
        let ends = self.links.entry(link_type.to_string()).or_default();
        if !ends
            .iter()
            .any(|e| e.direction == LinkDirection::Outbound && e.id == end.id)
        {
            ends.push(end);
        }
    }

    /// Every triple of this instance with it (or a nested entity) as subject.
    pub fn to_triples(&self) -> Vec<Triple> {
        let id = self.id.as_str();
        let mut out = vec![
            Triple::new(id, vocab::HAS_PID_URI, Node::iri(self.pid_uri.as_str())),
            Triple::new(id, vocab::HAS_LIFECYCLE_STATUS, Node::iri(self.lifecycle_status.iri())),
        ];
        self.properties.collect_triples(id, &mut out);
        if let Some(later) = &self.later_version {
            out.push(Triple::new(id, vocab::HAS_LATER_VERSION, Node::iri(later.as_str())));
        }
        for (link_type, end) in self.outbound_links() {
            out.push(Triple::new(id, link_type, Node::iri(end.id.as_str())));
        }
        out
    }
}

/// Caller payload for creating or editing a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub pid_uri: PidUri,
    #[serde(default)]
    pub properties: PropertyMap,
    /// PID URI of an existing resource this one is a version of.
    #[serde(default)]
    pub previous_version: Option<PidUri>,
}

impl ResourceRequest {
    pub fn new(pid_uri: PidUri) -> Self {
        Self {
            pid_uri,
            properties: PropertyMap::new(),
            previous_version: None,
        }
    }

    pub fn with_property(mut self, predicate: impl Into<String>, value: Value) -> Self {
        self.properties.insert(predicate, value);
        self
    }

    pub fn with_type(self, type_iri: &str) -> Self {
        self.with_property(vocab::RDF_TYPE, Value::iri(type_iri))
    }

    pub fn with_label(self, label: &str) -> Self {
        self.with_property(vocab::HAS_LABEL, Value::literal(label))
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.properties
            .set(vocab::HAS_VERSION, vec![Value::literal(version)]);
        self
    }

    pub fn with_consumer_group(self, group: &str) -> Self {
        self.with_property(vocab::HAS_CONSUMER_GROUP, Value::literal(group))
    }

    pub fn with_previous_version(mut self, previous: PidUri) -> Self {
        self.previous_version = Some(previous);
        self
    }

    pub fn version(&self) -> Option<&str> {
        self.properties.first_literal(vocab::HAS_VERSION)
    }

    /// Reject reserved predicates, link predicates, malformed IRIs and
    /// nesting deeper than the materializer can read back.
    pub fn validate(&self, link_types: &[String], max_depth: usize) -> CatalogResult<()> {
        validate_properties(&self.properties, link_types)?;
        if self.properties.nesting_depth() > max_depth {
            return Err(RuleError::InvalidRequest {
                message: format!("nested entities deeper than {max_depth} levels"),
            }
            .into());
        }
        if self.previous_version.as_ref() == Some(&self.pid_uri) {
            return Err(RuleError::InvalidRequest {
                message: "a resource cannot be its own previous version".into(),
            }
            .into());
        }
        Ok(())
    }
}

fn validate_properties(properties: &PropertyMap, link_types: &[String]) -> CatalogResult<()> {
    for (predicate, values) in properties.iter() {
        ResourceId::parse(predicate)?;
        if vocab::is_reserved(predicate) || link_types.iter().any(|t| t == predicate) {
            return Err(RuleError::InvalidRequest {
                message: format!("predicate {predicate} is managed by the catalog"),
            }
            .into());
        }
        for value in values {
            match value {
                Value::Literal(_) => {}
                Value::Typed { value, datatype } => {
                    oxigraph::model::NamedNode::new(datatype.as_str()).map_err(|e| {
                        ResourceError::InvalidFormat {
                            value: format!("{value}^^{datatype}"),
                            reason: e.to_string(),
                        }
                    })?;
                }
                Value::Tagged { value, language } => {
                    oxigraph::model::Literal::new_language_tagged_literal(
                        value.as_str(),
                        language.as_str(),
                    )
                    .map_err(|e| ResourceError::InvalidFormat {
                        value: format!("{value}@{language}"),
                        reason: e.to_string(),
                    })?;
                }
                Value::Iri(iri) => {
                    oxigraph::model::NamedNode::new(iri.as_str()).map_err(|e| {
                        ResourceError::InvalidFormat {
                            value: iri.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                }
                Value::Nested(entity) => validate_properties(&entity.properties, link_types)?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PidUri {
        PidUri::parse(s).unwrap()
    }

    fn nested(props: &[(&str, &str)]) -> Value {
        let mut map = PropertyMap::new();
        for (p, v) in props {
            map.insert(*p, Value::literal(*v));
        }
        Value::Nested(Entity::new(map))
    }

    #[test]
    fn property_map_keeps_first_seen_order() {
        let mut map = PropertyMap::new();
        map.insert("urn:b", Value::literal("1"));
        map.insert("urn:a", Value::literal("2"));
        map.insert("urn:b", Value::literal("3"));
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["urn:b", "urn:a"]);
        assert_eq!(map.get("urn:b").unwrap().len(), 2);
    }

    #[test]
    fn property_map_json_preserves_order() {
        let json = r#"{"urn:z":[{"literal":"1"}],"urn:a":[{"iri":"urn:x"}]}"#;
        let map: PropertyMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["urn:z", "urn:a"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), json);
    }

    #[test]
    fn fingerprint_ignores_entity_ids() {
        let mut a = nested(&[("urn:p", "x")]);
        let b = nested(&[("urn:p", "x")]);
        if let Value::Nested(e) = &mut a {
            e.id = "urn:entity:1".into();
        }
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), nested(&[("urn:p", "y")]).fingerprint());
    }

    #[test]
    fn draft_assigns_entity_ids_and_emits_triples() {
        let request = ResourceRequest::new(pid("pid:1"))
            .with_label("Sales")
            .with_version("1")
            .with_property("urn:endpoint", nested(&[("urn:url", "https://x")]));
        let id = ResourceId::mint("urn:res:");
        let draft = Resource::draft(id.clone(), &request, "urn:ent:");

        let Value::Nested(entity) = &draft.properties.get("urn:endpoint").unwrap()[0] else {
            panic!("expected nested entity");
        };
        assert!(entity.id.starts_with("urn:ent:"));

        let triples = draft.to_triples();
        assert!(triples.iter().any(|t| t.subject == entity.id && t.predicate == "urn:url"));
        assert!(triples.iter().any(|t| t.predicate == vocab::HAS_LIFECYCLE_STATUS
            && t.object == Node::iri(vocab::STATUS_DRAFT)));
        assert_eq!(draft.version(), Some("1"));
        assert_eq!(draft.label(), Some("Sales"));
    }

    #[test]
    fn validate_rejects_reserved_and_link_predicates() {
        let links = vec![vocab::term("isCopyOf")];
        let request = ResourceRequest::new(pid("pid:1"))
            .with_property(vocab::HAS_LIFECYCLE_STATUS, Value::iri(vocab::STATUS_PUBLISHED));
        assert!(request.validate(&links, 4).is_err());

        let request = ResourceRequest::new(pid("pid:1"))
            .with_property(vocab::term("isCopyOf"), Value::iri("pid:2"));
        assert!(request.validate(&links, 4).is_err());

        let request = ResourceRequest::new(pid("pid:1")).with_property("relative", Value::literal("x"));
        assert!(request.validate(&links, 4).is_err());
    }

    #[test]
    fn validate_caps_nesting_depth() {
        let mut value = nested(&[("urn:leaf", "x")]);
        for _ in 0..4 {
            let mut map = PropertyMap::new();
            map.insert("urn:child", value);
            value = Value::Nested(Entity::new(map));
        }
        let request = ResourceRequest::new(pid("pid:1")).with_property("urn:root", value);
        assert_eq!(request.properties.nesting_depth(), 5);
        assert!(request.validate(&[], 4).is_err());
        request.validate(&[], 5).unwrap();
    }

    #[test]
    fn status_iri_roundtrip() {
        for status in [
            LifecycleStatus::Draft,
            LifecycleStatus::Published,
            LifecycleStatus::MarkedForDeletion,
            LifecycleStatus::Historic,
        ] {
            assert_eq!(LifecycleStatus::from_iri(status.iri()), Some(status));
        }
    }
}
