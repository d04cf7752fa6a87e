//! Link manager and link history ledger tests.

use pidgraph::catalog::{Catalog, View};
use pidgraph::config::CatalogConfig;
use pidgraph::error::{CatalogError, RuleError};
use pidgraph::link::LinkStatus;
use pidgraph::pid::PidUri;
use pidgraph::resource::{LinkDirection, ResourceRequest};
use pidgraph::vocab;

fn test_catalog() -> Catalog {
    let mut config = CatalogConfig::default();
    config.directory.persons = vec!["alice".into(), "bob".into()];
    Catalog::open(config).unwrap()
}

fn pid(s: &str) -> PidUri {
    PidUri::parse(s).unwrap()
}

fn published(catalog: &Catalog, pid_uri: &PidUri, label: &str) {
    let req = ResourceRequest::new(pid_uri.clone())
        .with_type("https://pidgraph.dev/ontology#Table")
        .with_label(label)
        .with_version("1");
    catalog.create_resource(&req, "alice").unwrap();
    catalog.publish_resource(pid_uri, "alice").unwrap();
}

fn derived_from() -> String {
    vocab::term("isDerivedFrom")
}

#[test]
fn add_link_connects_published_resources() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");

    let source = catalog.add_link(&a, "isDerivedFrom", &b, "alice").unwrap();
    let ends = &source.links[&derived_from()];
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].direction, LinkDirection::Outbound);
    assert_eq!(ends[0].pid_uri.as_ref(), Some(&b));

    let target = catalog.resource(&b, View::Published).unwrap();
    let inbound = &target.links[&derived_from()];
    assert_eq!(inbound[0].direction, LinkDirection::Inbound);
    assert_eq!(inbound[0].pid_uri.as_ref(), Some(&a));

    let history = catalog.link_history(&a).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LinkStatus::Created);
    assert_eq!(history[0].start_pid, a);
    assert_eq!(history[0].end_pid, b);
    assert_eq!(history[0].author, "alice");
    let counterpart = history[0].counterpart.as_ref().unwrap();
    assert_eq!(counterpart.label.as_deref(), Some("Customers"));
}

#[test]
fn full_iri_link_type_is_accepted() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");

    let source = catalog.add_link(&a, &derived_from(), &b, "alice").unwrap();
    assert!(source.has_outbound_link(&derived_from(), &catalog.resource(&b, View::Published).unwrap().id));
}

#[test]
fn remove_link_closes_the_same_record() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");
    catalog.add_link(&a, "isDerivedFrom", &b, "alice").unwrap();

    let source = catalog
        .remove_link(&a, "isDerivedFrom", &b, false, "bob")
        .unwrap();
    assert_eq!(source.pid_uri, a);
    assert!(source.links.get(&derived_from()).is_none_or(|ends| ends.is_empty()));

    let history = catalog.link_history_between(&a, &b).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LinkStatus::Deleted);
    assert_eq!(history[0].deleted_by.as_deref(), Some("bob"));
    assert!(history[0].date_deleted.is_some());

    // Re-adding opens a second record; the newest comes first.
    catalog.add_link(&a, "isDerivedFrom", &b, "alice").unwrap();
    let history = catalog.link_history(&b).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, LinkStatus::Created);
    assert_eq!(history[1].status, LinkStatus::Deleted);
}

#[test]
fn inverse_removal_returns_target() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");
    catalog.add_link(&a, "isPartOf", &b, "alice").unwrap();

    let target = catalog
        .remove_link(&a, "isPartOf", &b, true, "alice")
        .unwrap();
    assert_eq!(target.pid_uri, b);
}

#[test]
fn link_rules() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");
    catalog
        .create_resource(&ResourceRequest::new(c.clone()).with_label("Draft only"), "alice")
        .unwrap();

    let err = catalog.add_link(&a, "isCopyOf", &a, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::SelfLink { .. })));
    assert!(catalog.resource(&a, View::Published).unwrap().links.is_empty());

    let err = catalog.add_link(&a, "likes", &b, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::DisallowedLinkType { .. })));

    let err = catalog.add_link(&a, "isPartOf", &c, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::NotPublished { .. })));

    let err = catalog.remove_link(&a, "isPartOf", &b, false, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::LinkMissing { .. })));

    catalog.add_link(&a, "isPartOf", &b, "alice").unwrap();
    let err = catalog.add_link(&a, "isPartOf", &b, "alice").unwrap_err();
    assert!(matches!(err, CatalogError::Rule(RuleError::LinkExists { .. })));

    // Nothing but the one successful add reached the ledger.
    assert_eq!(catalog.link_history(&a).unwrap().len(), 1);
}

#[test]
fn links_follow_republished_instances() {
    let catalog = test_catalog();
    let (a, b) = (pid("pid:a"), pid("pid:b"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");
    catalog.add_link(&a, "isDerivedFrom", &b, "alice").unwrap();

    // Republish the target: the source's link is re-pointed to the new id.
    let edit = ResourceRequest::new(b.clone())
        .with_label("Customers v2")
        .with_version("1");
    catalog.edit_resource(&edit, "alice").unwrap();
    let b_new = catalog.publish_resource(&b, "alice").unwrap();

    let source = catalog.resource(&a, View::Published).unwrap();
    assert!(source.has_outbound_link(&derived_from(), &b_new.id));

    // Republish the source: its outbound link is carried over.
    let edit = ResourceRequest::new(a.clone())
        .with_label("Orders v2")
        .with_version("1");
    catalog.edit_resource(&edit, "alice").unwrap();
    let a_new = catalog.publish_resource(&a, "alice").unwrap();
    assert!(a_new.has_outbound_link(&derived_from(), &b_new.id));

    // The ledger record is still open and closes by PID.
    catalog
        .remove_link(&a, "isDerivedFrom", &b, false, "alice")
        .unwrap();
    let history = catalog.link_history_between(&a, &b).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, LinkStatus::Deleted);
}

#[test]
fn purge_closes_links_of_both_directions() {
    let catalog = test_catalog();
    let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));
    published(&catalog, &a, "Orders");
    published(&catalog, &b, "Customers");
    published(&catalog, &c, "Invoices");
    catalog.add_link(&a, "isDerivedFrom", &b, "alice").unwrap();
    catalog.add_link(&b, "isRelatedTo", &c, "alice").unwrap();

    catalog.mark_deleted(&b, "alice").unwrap();
    catalog.purge(&b, "alice").unwrap();

    let source = catalog.resource(&a, View::Published).unwrap();
    assert!(source.links.get(&derived_from()).is_none_or(|ends| ends.is_empty()));

    let history = catalog.link_history(&b).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.status == LinkStatus::Deleted));
}
