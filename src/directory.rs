//! Actor directory: who may act on the catalog.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::DirectoryConfig;

/// Lookup of persons and their consumer-group memberships.
pub trait ActorDirectory: Send + Sync {
    /// Whether `actor` is a recognised person.
    fn is_known(&self, actor: &str) -> bool;

    /// Whether `actor` may change resources owned by `group`.
    ///
    /// `None` means the resource declares no owning group.
    fn is_authorized(&self, actor: &str, group: Option<&str>) -> bool;
}

/// Directory loaded once from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    persons: BTreeSet<String>,
    admins: BTreeSet<String>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl StaticDirectory {
    pub fn from_config(config: &DirectoryConfig) -> Self {
        let admins: BTreeSet<String> = config.admins.iter().cloned().collect();
        let groups: BTreeMap<String, BTreeSet<String>> = config
            .groups
            .iter()
            .map(|(group, members)| (group.clone(), members.iter().cloned().collect()))
            .collect();
        // Admins and group members are persons even if not listed separately.
        let persons = config
            .persons
            .iter()
            .chain(admins.iter())
            .chain(groups.values().flatten())
            .cloned()
            .collect();
        Self {
            persons,
            admins,
            groups,
        }
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }
}

impl ActorDirectory for StaticDirectory {
    fn is_known(&self, actor: &str) -> bool {
        self.persons.contains(actor)
    }

    fn is_authorized(&self, actor: &str, group: Option<&str>) -> bool {
        if !self.is_known(actor) {
            return false;
        }
        if self.admins.contains(actor) {
            return true;
        }
        match group {
            None => true,
            Some(group) => self
                .groups
                .get(group)
                .is_some_and(|members| members.contains(actor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        let mut config = DirectoryConfig {
            persons: vec!["alice".into(), "bob".into()],
            admins: vec!["root".into()],
            ..Default::default()
        };
        config
            .groups
            .insert("finance".into(), vec!["alice".into(), "carol".into()]);
        StaticDirectory::from_config(&config)
    }

    #[test]
    fn members_of_groups_are_known() {
        let dir = directory();
        assert!(dir.is_known("alice"));
        assert!(dir.is_known("carol"));
        assert!(dir.is_known("root"));
        assert!(!dir.is_known("mallory"));
        assert_eq!(dir.len(), 4);
    }

    #[test]
    fn authorization_follows_group_membership() {
        let dir = directory();
        assert!(dir.is_authorized("alice", Some("finance")));
        assert!(!dir.is_authorized("bob", Some("finance")));
        assert!(dir.is_authorized("bob", None));
        assert!(dir.is_authorized("root", Some("finance")));
        assert!(!dir.is_authorized("mallory", None));
        assert!(!dir.is_authorized("alice", Some("unknown-group")));
    }
}
