//! Rich diagnostic error types for the pidgraph catalog.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`CatalogError`] wraps them all and
//! exposes [`CatalogError::kind`] so callers can map failures onto the
//! caller-facing taxonomy without matching every variant.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for catalog operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias used across the crate.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Coarse classification of a [`CatalogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    BusinessRuleViolation,
    Locked,
    StoreCommunication,
    /// Stored state breaks lifecycle exclusivity; needs repair, not a retry.
    InconsistentState,
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::InvalidFormat => write!(f, "invalid-format"),
            Self::BusinessRuleViolation => write!(f, "business-rule-violation"),
            Self::Locked => write!(f, "locked"),
            Self::StoreCommunication => write!(f, "store-communication"),
            Self::InconsistentState => write!(f, "inconsistent-state"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl CatalogError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(_) => ErrorKind::StoreCommunication,
            Self::Resource(ResourceError::InvalidFormat { .. }) => ErrorKind::InvalidFormat,
            Self::Resource(ResourceError::Ambiguous { .. }) => ErrorKind::InconsistentState,
            Self::Resource(_) => ErrorKind::NotFound,
            Self::Rule(_) => ErrorKind::BusinessRuleViolation,
            Self::Lock(_) => ErrorKind::Locked,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the failure came from talking to the graph store.
    pub fn is_store_failure(&self) -> bool {
        self.kind() == ErrorKind::StoreCommunication
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("failed to open graph store: {message}")]
    #[diagnostic(
        code(pidgraph::store::open),
        help(
            "The oxigraph store could not be created. Check that the data directory \
             exists, is writable, and is not held open by another process."
        )
    )]
    Open { message: String },

    #[error("SPARQL {operation} failed: {message}")]
    #[diagnostic(
        code(pidgraph::store::sparql),
        help(
            "The graph store rejected or failed to evaluate the statement. \
             Earlier steps of the running transition may already be applied; \
             re-read the resource state before retrying."
        )
    )]
    Sparql { operation: String, message: String },

    #[error("SPARQL {operation} timed out after {waited_ms} ms")]
    #[diagnostic(
        code(pidgraph::store::timeout),
        help(
            "The store did not answer within the configured bound (`store.timeout_ms`). \
             The statement may or may not have been applied; re-check state before retrying."
        )
    )]
    Timeout { operation: String, waited_ms: u64 },

    #[error("unexpected {operation} result: {message}")]
    #[diagnostic(
        code(pidgraph::store::unexpected_result),
        help("The store returned a result shape that does not match the statement kind.")
    )]
    UnexpectedResult { operation: String, message: String },
}

/// Result type for graph store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Resource errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ResourceError {
    #[error("no resource with PID URI {pid_uri}")]
    #[diagnostic(
        code(pidgraph::resource::not_found),
        help("Neither the draft nor the published partition holds a resource with this PID URI.")
    )]
    NotFound { pid_uri: String },

    #[error("no {partition} instance of {pid_uri}")]
    #[diagnostic(
        code(pidgraph::resource::not_in_partition),
        help("The resource exists, but not in the requested lifecycle view.")
    )]
    NotInPartition { pid_uri: String, partition: String },

    #[error("resource id {id} has no triples in the {partition} partition")]
    #[diagnostic(
        code(pidgraph::resource::id_not_found),
        help("The id was resolved earlier in this operation but its triples are gone.")
    )]
    IdNotFound { id: String, partition: String },

    #[error("invalid identifier \"{value}\": {reason}")]
    #[diagnostic(
        code(pidgraph::resource::invalid_format),
        help("PID URIs, resource ids, predicates and link types must be absolute IRIs.")
    )]
    InvalidFormat { value: String, reason: String },

    #[error("{count} {partition} instances share PID URI {pid_uri}")]
    #[diagnostic(
        code(pidgraph::resource::ambiguous),
        help(
            "Each PID URI may have at most one draft and one published instance. \
             The partitions were modified outside the catalog and need manual repair."
        )
    )]
    Ambiguous {
        pid_uri: String,
        partition: String,
        count: usize,
    },
}

// ---------------------------------------------------------------------------
// Business rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("a resource with PID URI {pid_uri} already exists")]
    #[diagnostic(
        code(pidgraph::rule::already_exists),
        help("Use `edit` to change an existing resource.")
    )]
    AlreadyExists { pid_uri: String },

    #[error("{pid_uri} has no draft to publish")]
    #[diagnostic(
        code(pidgraph::rule::not_draft),
        help("Only a resource in Draft state can be published. Edit it first.")
    )]
    NotDraft { pid_uri: String },

    #[error("{pid_uri} is not published")]
    #[diagnostic(
        code(pidgraph::rule::not_published),
        help("Links and deletion marks only apply to resources in Published state.")
    )]
    NotPublished { pid_uri: String },

    #[error("{pid_uri} has a pending draft")]
    #[diagnostic(
        code(pidgraph::rule::pending_draft),
        help("Publish or discard the draft before changing the published lifecycle state.")
    )]
    PendingDraft { pid_uri: String },

    #[error("{pid_uri} is already {state}")]
    #[diagnostic(
        code(pidgraph::rule::already_in_state),
        help("The requested transition would not change the lifecycle state.")
    )]
    AlreadyInState { pid_uri: String, state: String },

    #[error("{pid_uri} is marked for deletion")]
    #[diagnostic(
        code(pidgraph::rule::marked_for_deletion),
        help("Unmark the resource before editing it.")
    )]
    MarkedForDeletion { pid_uri: String },

    #[error("{pid_uri} is not marked for deletion")]
    #[diagnostic(
        code(pidgraph::rule::not_marked),
        help("Only resources marked for deletion can be purged.")
    )]
    NotMarkedForDeletion { pid_uri: String },

    #[error("cannot link {pid_uri} to itself")]
    #[diagnostic(
        code(pidgraph::rule::self_link),
        help("Links must connect two different resources.")
    )]
    SelfLink { pid_uri: String },

    #[error("link type {link_type} is not allowed")]
    #[diagnostic(
        code(pidgraph::rule::link_type),
        help("Allowed link types are configured under `link_types`.")
    )]
    DisallowedLinkType { link_type: String },

    #[error("{source_pid} already links to {target_pid} via {link_type}")]
    #[diagnostic(
        code(pidgraph::rule::link_exists),
        help("The link is already active; nothing to add.")
    )]
    LinkExists {
        source_pid: String,
        link_type: String,
        target_pid: String,
    },

    #[error("{source_pid} does not link to {target_pid} via {link_type}")]
    #[diagnostic(
        code(pidgraph::rule::link_missing),
        help("Check the link direction; use `inverse` when removing from the target side.")
    )]
    LinkMissing {
        source_pid: String,
        link_type: String,
        target_pid: String,
    },

    #[error("unknown actor \"{actor}\"")]
    #[diagnostic(
        code(pidgraph::rule::unknown_actor),
        help("The actor must be listed under `directory.persons`.")
    )]
    UnknownActor { actor: String },

    #[error("\"{actor}\" may not change {pid_uri}")]
    #[diagnostic(
        code(pidgraph::rule::unauthorized),
        help("The actor must be a member of the resource's consumer group or an admin.")
    )]
    Unauthorized { actor: String, pid_uri: String },

    #[error("cannot diff {old_pid} against {new_pid}")]
    #[diagnostic(
        code(pidgraph::rule::pid_mismatch),
        help("Revisions are computed between two states of the same PID URI.")
    )]
    PidMismatch { old_pid: String, new_pid: String },

    #[error("cannot link resources with identical version \"{version}\" ({pid_uri})")]
    #[diagnostic(
        code(pidgraph::rule::identical_version),
        help("Every member of a version chain needs a distinct version label.")
    )]
    IdenticalVersion { version: String, pid_uri: String },

    #[error("{pid_uri} has no version history")]
    #[diagnostic(
        code(pidgraph::rule::no_version_history),
        help("The anchor resource needs a version label before others can be chained to it.")
    )]
    NoVersionHistory { pid_uri: String },

    #[error("{pid_uri} has no version label")]
    #[diagnostic(
        code(pidgraph::rule::missing_version),
        help("Set a version property on the resource before adding it to a lineage.")
    )]
    MissingVersion { pid_uri: String },

    #[error("{pid_uri} already belongs to a version chain")]
    #[diagnostic(
        code(pidgraph::rule::already_chained),
        help("A resource can only be attached to a lineage while it stands alone.")
    )]
    AlreadyInChain { pid_uri: String },

    #[error("version chain of {pid_uri} is inconsistent: {reason}")]
    #[diagnostic(
        code(pidgraph::rule::broken_chain),
        help(
            "The HasLaterVersion edges do not form a single path. \
             The partitions were modified outside the catalog and need manual repair."
        )
    )]
    BrokenChain { pid_uri: String, reason: String },

    #[error("invalid resource request: {message}")]
    #[diagnostic(
        code(pidgraph::rule::invalid_request),
        help("Reserved predicates are managed by the catalog and cannot be set directly.")
    )]
    InvalidRequest { message: String },
}

// ---------------------------------------------------------------------------
// Lock errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LockError {
    #[error("{pid_uri} is locked by a concurrent {held_by} operation")]
    #[diagnostic(
        code(pidgraph::lock::locked),
        help("Another operation on this resource is in progress. Retry shortly.")
    )]
    Locked { pid_uri: String, held_by: String },
}

/// Result type for lock acquisition.
pub type LockResult<T> = std::result::Result<T, LockError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(pidgraph::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(pidgraph::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(pidgraph::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config field `{field}` is not a valid IRI: {value}")]
    #[diagnostic(
        code(pidgraph::config::invalid_iri),
        help("Graph names, namespaces and link types must be absolute IRIs.")
    )]
    InvalidIri { field: String, value: String },

    #[error("config field `{field}` is invalid: {message}")]
    #[diagnostic(code(pidgraph::config::invalid))]
    Invalid { field: String, message: String },
}
