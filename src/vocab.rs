//! Ontology terms used by the catalog.
//!
//! Predicates the catalog manages itself are "reserved": callers cannot set
//! them through a resource request.

/// Namespace of the catalog ontology.
pub const NS: &str = "https://pidgraph.dev/ontology#";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

pub const HAS_PID_URI: &str = "https://pidgraph.dev/ontology#hasPidUri";
pub const HAS_LIFECYCLE_STATUS: &str = "https://pidgraph.dev/ontology#hasLifecycleStatus";
pub const HAS_VERSION: &str = "https://pidgraph.dev/ontology#hasVersion";
pub const HAS_LATER_VERSION: &str = "https://pidgraph.dev/ontology#hasLaterVersion";
pub const HAS_LABEL: &str = "https://pidgraph.dev/ontology#hasLabel";
pub const HAS_CONSUMER_GROUP: &str = "https://pidgraph.dev/ontology#hasConsumerGroup";
pub const HAS_CHANGE_REQUESTER: &str = "https://pidgraph.dev/ontology#hasChangeRequester";
pub const LAST_CHANGE_USER: &str = "https://pidgraph.dev/ontology#lastChangeUser";
pub const LAST_CHANGE_DATE_TIME: &str = "https://pidgraph.dev/ontology#lastChangeDateTime";

pub const STATUS_DRAFT: &str = "https://pidgraph.dev/ontology#draft";
pub const STATUS_PUBLISHED: &str = "https://pidgraph.dev/ontology#published";
pub const STATUS_MARKED_FOR_DELETION: &str = "https://pidgraph.dev/ontology#markedForDeletion";
pub const STATUS_HISTORIC: &str = "https://pidgraph.dev/ontology#historic";

/// Class of PID-scoped identifier nodes swept after publishing.
pub const PERMANENT_IDENTIFIER: &str = "https://pidgraph.dev/ontology#PermanentIdentifier";

// Link history ledger
pub const LINK_HISTORY: &str = "https://pidgraph.dev/ontology#LinkHistory";
pub const LINK_START: &str = "https://pidgraph.dev/ontology#linkStart";
pub const LINK_END: &str = "https://pidgraph.dev/ontology#linkEnd";
pub const LINK_START_PID: &str = "https://pidgraph.dev/ontology#linkStartPid";
pub const LINK_END_PID: &str = "https://pidgraph.dev/ontology#linkEndPid";
pub const LINK_TYPE: &str = "https://pidgraph.dev/ontology#linkType";
pub const LINK_STATUS: &str = "https://pidgraph.dev/ontology#linkStatus";
pub const LINK_CREATED: &str = "https://pidgraph.dev/ontology#created";
pub const LINK_DELETED: &str = "https://pidgraph.dev/ontology#deleted";
pub const AUTHOR: &str = "https://pidgraph.dev/ontology#author";
pub const DATE_CREATED: &str = "https://pidgraph.dev/ontology#dateCreated";
pub const DELETED_BY: &str = "https://pidgraph.dev/ontology#deletedBy";
pub const DATE_DELETED: &str = "https://pidgraph.dev/ontology#dateDeleted";

// Revisions
pub const REVISION: &str = "https://pidgraph.dev/ontology#Revision";
pub const REVISION_NUMBER: &str = "https://pidgraph.dev/ontology#revisionNumber";
pub const REVISION_KIND: &str = "https://pidgraph.dev/ontology#revisionKind";

/// Local names of the link types allowed out of the box.
pub const DEFAULT_LINK_TYPES: &[&str] = &[
    "isCopyOf",
    "isDerivedFrom",
    "isPartOf",
    "isSuccessorOf",
    "isRelatedTo",
];

/// Predicates that only the catalog writes.
pub const RESERVED: &[&str] = &[
    HAS_PID_URI,
    HAS_LIFECYCLE_STATUS,
    HAS_LATER_VERSION,
    HAS_CHANGE_REQUESTER,
    LAST_CHANGE_USER,
    LAST_CHANGE_DATE_TIME,
];

/// Bookkeeping predicates that never count as a content change.
pub const DIFF_IGNORED: &[&str] = &[
    HAS_CHANGE_REQUESTER,
    LAST_CHANGE_USER,
    LAST_CHANGE_DATE_TIME,
];

/// Expand a local name into the catalog namespace.
pub fn term(local: &str) -> String {
    format!("{NS}{local}")
}

pub fn is_reserved(predicate: &str) -> bool {
    RESERVED.contains(&predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_live_in_namespace() {
        for iri in [HAS_PID_URI, HAS_LATER_VERSION, STATUS_HISTORIC, LINK_DELETED, REVISION] {
            assert!(iri.starts_with(NS), "{iri}");
        }
        assert_eq!(term("isCopyOf"), "https://pidgraph.dev/ontology#isCopyOf");
    }
}
