//! Catalog configuration, persisted as TOML.
//!
//! Named graph partitions, the id namespace, the link-type allow-list and the
//! actor directory are all resolved from here rather than hard-coded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::vocab;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Prefix for minted resource, entity and ledger-record ids.
    #[serde(default = "default_id_namespace")]
    pub id_namespace: String,
    /// Named graph partitions.
    #[serde(default)]
    pub graphs: GraphsConfig,
    /// Graph store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Maximum nesting depth resolved when materializing a resource.
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
    /// Allowed link predicates (full IRIs).
    #[serde(default = "default_link_types")]
    pub link_types: Vec<String>,
    /// Known persons and group memberships.
    #[serde(default)]
    pub directory: DirectoryConfig,
}

/// IRIs of the named graph partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphsConfig {
    #[serde(default = "default_draft_graph")]
    pub draft: String,
    #[serde(default = "default_published_graph")]
    pub published: String,
    #[serde(default = "default_historic_graph")]
    pub historic: String,
    #[serde(default = "default_link_history_graph")]
    pub link_history: String,
}

/// Graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// On-disk oxigraph directory. `None` keeps everything in memory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Bound on every read/update call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Persons recognised as actors and their group memberships.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub persons: Vec<String>,
    /// Persons allowed to act on resources of any consumer group.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Consumer group → member persons.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

fn default_id_namespace() -> String {
    "https://pidgraph.dev/resource/".into()
}
fn default_draft_graph() -> String {
    "https://pidgraph.dev/graph/draft".into()
}
fn default_published_graph() -> String {
    "https://pidgraph.dev/graph/published".into()
}
fn default_historic_graph() -> String {
    "https://pidgraph.dev/graph/historic".into()
}
fn default_link_history_graph() -> String {
    "https://pidgraph.dev/graph/link-history".into()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_nesting_depth() -> usize {
    4
}
fn default_link_types() -> Vec<String> {
    vocab::DEFAULT_LINK_TYPES
        .iter()
        .map(|local| vocab::term(local))
        .collect()
}

impl Default for GraphsConfig {
    fn default() -> Self {
        Self {
            draft: default_draft_graph(),
            published: default_published_graph(),
            historic: default_historic_graph(),
            link_history: default_link_history_graph(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            id_namespace: default_id_namespace(),
            graphs: GraphsConfig::default(),
            store: StoreConfig::default(),
            max_nesting_depth: default_max_nesting_depth(),
            link_types: default_link_types(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CatalogConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check that every IRI-valued field parses and the partitions are distinct.
    pub fn validate(&self) -> ConfigResult<()> {
        check_iri("id_namespace", &self.id_namespace)?;
        check_iri("graphs.draft", &self.graphs.draft)?;
        check_iri("graphs.published", &self.graphs.published)?;
        check_iri("graphs.historic", &self.graphs.historic)?;
        check_iri("graphs.link_history", &self.graphs.link_history)?;
        for link_type in &self.link_types {
            check_iri("link_types", link_type)?;
        }

        let mut names = vec![
            &self.graphs.draft,
            &self.graphs.published,
            &self.graphs.historic,
            &self.graphs.link_history,
        ];
        names.sort();
        names.dedup();
        if names.len() != 4 {
            return Err(ConfigError::Invalid {
                field: "graphs".into(),
                message: "partition graph names must be distinct".into(),
            });
        }

        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "store.timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_nesting_depth".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn check_iri(field: &str, value: &str) -> ConfigResult<()> {
    oxigraph::model::NamedNode::new(value)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidIri {
            field: field.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CatalogConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_nesting_depth, 4);
        assert_eq!(config.store.timeout(), Duration::from_secs(10));
        assert!(config.link_types.iter().any(|t| t.ends_with("isCopyOf")));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: CatalogConfig = toml::from_str(
            r#"
            max_nesting_depth = 2

            [directory]
            persons = ["alice"]

            [directory.groups]
            data-office = ["alice"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_nesting_depth, 2);
        assert_eq!(config.graphs, GraphsConfig::default());
        assert_eq!(config.directory.groups["data-office"], vec!["alice"]);
    }

    #[test]
    fn duplicate_partitions_rejected() {
        let mut config = CatalogConfig::default();
        config.graphs.historic = config.graphs.published.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn relative_link_type_rejected() {
        let mut config = CatalogConfig::default();
        config.link_types.push("isCopyOf".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIri { .. })
        ));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pidgraph.toml");
        let mut config = CatalogConfig::default();
        config.directory.persons.push("bob".into());
        config.save(&path).unwrap();

        let loaded = CatalogConfig::load(&path).unwrap();
        assert_eq!(loaded.directory.persons, vec!["bob"]);
        assert_eq!(loaded.graphs, config.graphs);
    }
}
