//! Version chain tests: placement by version label, edge maintenance across
//! lifecycle transitions, and the chain rules.

use pidgraph::catalog::{Catalog, View};
use pidgraph::config::CatalogConfig;
use pidgraph::error::{CatalogError, RuleError};
use pidgraph::pid::PidUri;
use pidgraph::resource::{LifecycleStatus, ResourceRequest};
use pidgraph::store::Partition;
use pidgraph::vocab;

fn test_catalog() -> Catalog {
    let mut config = CatalogConfig::default();
    config.directory.persons = vec!["alice".into()];
    Catalog::open(config).unwrap()
}

fn pid(s: &str) -> PidUri {
    PidUri::parse(s).unwrap()
}

fn versioned(pid_uri: &PidUri, version: &str) -> ResourceRequest {
    ResourceRequest::new(pid_uri.clone())
        .with_label(&format!("Sales {version}"))
        .with_version(version)
}

fn lineage(catalog: &Catalog, pid_uri: &PidUri) -> Vec<String> {
    catalog
        .versions(pid_uri)
        .unwrap()
        .into_iter()
        .map(|m| m.version)
        .collect()
}

#[test]
fn chain_is_ordered_by_version_not_insertion() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));

    catalog.create_resource(&versioned(&c, "3"), "alice").unwrap();
    catalog
        .create_resource(&versioned(&a, "1").with_previous_version(c.clone()), "alice")
        .unwrap();
    let middle = catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();

    assert_eq!(lineage(&catalog, &a), ["1", "2", "3"]);
    assert_eq!(lineage(&catalog, &c), ["1", "2", "3"]);
    let pids: Vec<PidUri> = middle.versions.iter().map(|m| m.pid_uri.clone()).collect();
    assert_eq!(pids, [a, b, c]);
}

#[test]
fn natural_version_ordering() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));

    catalog.create_resource(&versioned(&a, "1.2"), "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "1.10").with_previous_version(a.clone()), "alice")
        .unwrap();
    catalog
        .create_resource(&versioned(&c, "1.9").with_previous_version(b.clone()), "alice")
        .unwrap();

    assert_eq!(lineage(&catalog, &a), ["1.2", "1.9", "1.10"]);
}

#[test]
fn insertion_between_replaces_direct_edge() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));

    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    let first = catalog.publish_resource(&a, "alice").unwrap();
    let last = catalog
        .create_resource(&versioned(&c, "3").with_previous_version(a.clone()), "alice")
        .unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();

    assert_eq!(lineage(&catalog, &b), ["1", "2", "3"]);
    let direct = catalog
        .store()
        .ask(&format!(
            "ASK {{ GRAPH ?g {{ <{}> <{}> <{}> }} }}",
            first.id,
            vocab::HAS_LATER_VERSION,
            last.id
        ))
        .unwrap();
    assert!(!direct);
}

#[test]
fn identical_version_is_rejected() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1.0"), "alice").unwrap();

    let err = catalog
        .create_resource(&versioned(&b, "1.0").with_previous_version(a.clone()), "alice")
        .unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::IdenticalVersion { .. })));
    // Nothing was written for the rejected resource.
    assert!(catalog.resource(&b, View::Latest).is_err());
}

#[test]
fn anchor_without_version_has_no_history() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog
        .create_resource(&ResourceRequest::new(a.clone()).with_label("Unversioned"), "alice")
        .unwrap();

    let err = catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::NoVersionHistory { .. })));
}

#[test]
fn new_member_needs_a_version() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();

    let req = ResourceRequest::new(b.clone())
        .with_label("No version")
        .with_previous_version(a.clone());
    let err = catalog.create_resource(&req, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::MissingVersion { .. })));
}

#[test]
fn publishing_members_keeps_the_chain() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.publish_resource(&a, "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();
    catalog.publish_resource(&b, "alice").unwrap();

    // Republish the earlier member under a new id.
    let edit = ResourceRequest::new(a.clone())
        .with_label("Sales 1 corrected")
        .with_version("1");
    let draft = catalog.edit_resource(&edit, "alice").unwrap();
    assert_eq!(draft.versions[0].lifecycle_status, LifecycleStatus::Draft);
    let republished = catalog.publish_resource(&a, "alice").unwrap();

    let versions = catalog.versions(&b).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].pid_uri, a);
    assert_eq!(versions[0].id, republished.id);
    assert!(versions.iter().all(|m| m.lifecycle_status == LifecycleStatus::Published));

    let later = catalog.resource(&a, View::Published).unwrap().later_version;
    assert_eq!(later, Some(catalog.resource(&b, View::Published).unwrap().id));
}

#[test]
fn edit_rejects_clashing_version() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();

    let err = catalog.edit_resource(&versioned(&b, "1"), "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::IdenticalVersion { .. })));

    let unversioned = ResourceRequest::new(b.clone()).with_label("Dropped version");
    let err = catalog.edit_resource(&unversioned, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::MissingVersion { .. })));
}

#[test]
fn edit_can_attach_a_standalone_resource() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.create_resource(&versioned(&b, "2"), "alice").unwrap();

    let edited = catalog
        .edit_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();
    assert_eq!(edited.versions.len(), 2);
    assert_eq!(lineage(&catalog, &a), ["1", "2"]);
}

#[test]
fn discarding_a_middle_draft_bridges_neighbours() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.publish_resource(&a, "alice").unwrap();
    catalog
        .create_resource(&versioned(&c, "3").with_previous_version(a.clone()), "alice")
        .unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();

    assert!(catalog.delete_draft(&b, "alice").unwrap().is_none());
    assert_eq!(lineage(&catalog, &a), ["1", "3"]);
    assert_eq!(lineage(&catalog, &c), ["1", "3"]);
}

#[test]
fn link_version_attaches_standalone_resources() {
    let catalog = test_catalog();
    let (a, x, y) = (pid("pid:a"), pid("pid:x"), pid("pid:y"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.publish_resource(&a, "alice").unwrap();
    catalog.create_resource(&versioned(&x, "0.9"), "alice").unwrap();
    catalog.publish_resource(&x, "alice").unwrap();

    let linked = catalog.link_version(&a, &x, "alice").unwrap();
    assert_eq!(linked.lifecycle_status, LifecycleStatus::Published);
    let order: Vec<PidUri> = linked.versions.iter().map(|m| m.pid_uri.clone()).collect();
    assert_eq!(order, [x.clone(), a.clone()]);

    // A member of a lineage cannot be attached again.
    catalog.create_resource(&versioned(&y, "5"), "alice").unwrap();
    let err = catalog.link_version(&y, &x, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::AlreadyInChain { .. })));

    let err = catalog.link_version(&a, &a, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::AlreadyInChain { .. })));
}

#[test]
fn purge_removes_member_and_bridges_chain() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.publish_resource(&a, "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();
    catalog.publish_resource(&b, "alice").unwrap();
    catalog
        .create_resource(&versioned(&c, "3").with_previous_version(b.clone()), "alice")
        .unwrap();
    catalog.publish_resource(&c, "alice").unwrap();

    catalog.mark_deleted(&b, "alice").unwrap();
    catalog.purge(&b, "alice").unwrap();

    assert_eq!(lineage(&catalog, &a), ["1", "3"]);
    let leftovers = catalog
        .store()
        .select(&format!(
            "SELECT ?s WHERE {{ GRAPH <{}> {{ ?s <{}> <{}> }} }}",
            catalog.graph(Partition::Published),
            vocab::HAS_PID_URI,
            b
        ))
        .unwrap();
    assert!(leftovers.is_empty());
}

fn edges_in(catalog: &Catalog, partition: Partition) -> usize {
    catalog
        .store()
        .select(&format!(
            "SELECT ?s ?o WHERE {{ GRAPH <{}> {{ ?s <{}> ?o }} }}",
            catalog.graph(partition),
            vocab::HAS_LATER_VERSION
        ))
        .unwrap()
        .len()
}

#[test]
fn republishing_an_earlier_member_keeps_edges_in_both_partitions() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog.publish_resource(&a, "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();
    let b_published = catalog.publish_resource(&b, "alice").unwrap();
    assert_eq!(edges_in(&catalog, Partition::Draft), 1);
    assert_eq!(edges_in(&catalog, Partition::Published), 1);

    let edit = ResourceRequest::new(a.clone())
        .with_label("Sales 1 corrected")
        .with_version("1");
    catalog.edit_resource(&edit, "alice").unwrap();
    let a_new = catalog.publish_resource(&a, "alice").unwrap();

    assert_eq!(edges_in(&catalog, Partition::Draft), 1);
    assert_eq!(edges_in(&catalog, Partition::Published), 1);
    for partition in [Partition::Draft, Partition::Published] {
        let edge = catalog
            .store()
            .ask(&format!(
                "ASK {{ GRAPH <{}> {{ <{}> <{}> <{}> }} }}",
                catalog.graph(partition),
                a_new.id,
                vocab::HAS_LATER_VERSION,
                b_published.id
            ))
            .unwrap();
        assert!(edge, "missing edge in {partition:?}");
    }
}

#[test]
fn publishing_an_earlier_member_points_at_the_later_published_id() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    catalog.create_resource(&versioned(&a, "1"), "alice").unwrap();
    catalog
        .create_resource(&versioned(&b, "2").with_previous_version(a.clone()), "alice")
        .unwrap();
    let b_published = catalog.publish_resource(&b, "alice").unwrap();
    let a_published = catalog.publish_resource(&a, "alice").unwrap();

    assert_eq!(a_published.later_version, Some(b_published.id));
    assert_eq!(edges_in(&catalog, Partition::Draft), 1);
    assert_eq!(edges_in(&catalog, Partition::Published), 1);
    assert_eq!(lineage(&catalog, &b), ["1", "2"]);
}
