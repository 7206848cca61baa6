//! Pattern Registry
//!
//! Artifact kinds map to either a single path template or a nested tree of
//! templates (e.g. `fastqc` with sub-kinds `raw`, `trimmed`, `aligned`).
//! Key order is the declaration order and is preserved everywhere a tree is
//! walked.
//!
//! # Example YAML Format
//!
//! ```yaml
//! trimmed: "{sample_dir}/{sample}/{sample}.trimmed.fastq.gz"
//! fastqc:
//!   raw: "{sample_dir}/{sample}/fastqc/{sample}_fastqc.zip"
//!   trimmed: "{sample_dir}/{sample}/fastqc/{sample}.trimmed_fastqc.zip"
//! ```

use std::collections::HashSet;

use log::debug;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{PipelineError, Result};

/// A node of a pattern tree: a template leaf or an ordered mapping of
/// sub-kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternNode {
    Leaf(String),
    Node(Vec<(String, PatternNode)>),
}

impl PatternNode {
    /// Creates a template leaf.
    pub fn leaf(template: impl Into<String>) -> Self {
        Self::Leaf(template.into())
    }

    /// Creates a mapping node, keeping the given key order.
    pub fn node<K, I>(children: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PatternNode)>,
    {
        Self::Node(children.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the direct child with the given key.
    pub fn get(&self, key: &str) -> Option<&PatternNode> {
        match self {
            Self::Leaf(_) => None,
            Self::Node(children) => children.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        }
    }

    /// Resolves a dotted path (`fastqc.raw`) below this node.
    pub fn lookup(&self, path: &str) -> Option<&PatternNode> {
        path.split('.').try_fold(self, |node, key| node.get(key))
    }

    /// Parses a pattern tree from a YAML value.
    ///
    /// Strings become leaves, mappings become nodes; anything else is
    /// rejected.
    pub fn from_yaml(value: &Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) => Ok(Self::Leaf(s.clone())),
            Value::Mapping(map) => {
                let mut children = Vec::with_capacity(map.len());
                for (key, child) in map {
                    let key = key
                        .as_str()
                        .ok_or_else(|| format!("pattern keys must be strings, found {:?}", key))?;
                    if children.iter().any(|(k, _): &(String, PatternNode)| k == key) {
                        return Err(format!("duplicate pattern key '{}'", key));
                    }
                    let node = Self::from_yaml(child).map_err(|e| format!("{}: {}", key, e))?;
                    children.push((key.to_string(), node));
                }
                Ok(Self::Node(children))
            }
            other => Err(format!(
                "expected a template string or a mapping, found {:?}",
                other
            )),
        }
    }
}

impl From<&str> for PatternNode {
    fn from(template: &str) -> Self {
        Self::leaf(template)
    }
}

impl<'de> Deserialize<'de> for PatternNode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_yaml(&value).map_err(de::Error::custom)
    }
}

impl Serialize for PatternNode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Leaf(t) => serializer.serialize_str(t),
            Self::Node(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (key, child) in children {
                    map.serialize_entry(key, child)?;
                }
                map.end()
            }
        }
    }
}

/// Immutable set of artifact-kind patterns for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternRegistry {
    kinds: Vec<(String, PatternNode)>,
}

/// Collects registrations before the registry is frozen.
#[derive(Debug, Default)]
pub struct PatternRegistryBuilder {
    kinds: Vec<(String, PatternNode)>,
}

impl PatternRegistryBuilder {
    /// Registers an artifact kind. Placeholders are not checked here; a bad
    /// template only fails when it is filled.
    pub fn register(mut self, kind: impl Into<String>, pattern: impl Into<PatternNode>) -> Self {
        self.kinds.push((kind.into(), pattern.into()));
        self
    }

    /// Freezes the registry. Registering the same kind twice is an error.
    pub fn build(self) -> Result<PatternRegistry> {
        let mut seen = HashSet::new();
        for (kind, _) in &self.kinds {
            if kind.is_empty() || kind.contains('.') {
                return Err(PipelineError::Definition(format!(
                    "invalid artifact kind name '{}'",
                    kind
                )));
            }
            if !seen.insert(kind.as_str()) {
                return Err(PipelineError::Definition(format!(
                    "artifact kind '{}' registered twice",
                    kind
                )));
            }
        }
        debug!("Pattern registry frozen with {} kinds", self.kinds.len());
        Ok(PatternRegistry { kinds: self.kinds })
    }
}

impl PatternRegistry {
    pub fn builder() -> PatternRegistryBuilder {
        PatternRegistryBuilder::default()
    }

    /// Builds a registry from a YAML pattern tree whose top-level keys are
    /// artifact kinds.
    pub fn from_node(node: PatternNode) -> Result<Self> {
        match node {
            PatternNode::Node(children) => children
                .into_iter()
                .fold(Self::builder(), |b, (kind, pattern)| b.register(kind, pattern))
                .build(),
            PatternNode::Leaf(t) => Err(PipelineError::Definition(format!(
                "pattern registry must be a mapping of kinds, found template '{}'",
                t
            ))),
        }
    }

    /// Resolves a kind or a dotted sub-kind path.
    pub fn lookup(&self, path: &str) -> Result<&PatternNode> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let node = self
            .kinds
            .iter()
            .find(|(k, _)| k == head)
            .map(|(_, v)| v)
            .ok_or_else(|| PipelineError::UnknownKind(path.to_string()))?;

        match rest {
            None => Ok(node),
            Some(rest) => node
                .lookup(rest)
                .ok_or_else(|| PipelineError::UnknownKind(path.to_string())),
        }
    }

    /// Kind names in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fastqc() -> PatternNode {
        PatternNode::node([
            ("raw", PatternNode::leaf("{d}/{sample}_raw.zip")),
            ("trimmed", PatternNode::leaf("{d}/{sample}_trimmed.zip")),
        ])
    }

    #[test]
    fn test_node_lookup_dotted() {
        let tree = PatternNode::node([("fastqc", fastqc())]);
        assert_eq!(
            tree.lookup("fastqc.trimmed"),
            Some(&PatternNode::leaf("{d}/{sample}_trimmed.zip"))
        );
        assert!(tree.lookup("fastqc.aligned").is_none());
    }

    #[test]
    fn test_node_keeps_key_order() {
        match fastqc() {
            PatternNode::Node(children) => {
                let keys: Vec<_> = children.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["raw", "trimmed"]);
            }
            PatternNode::Leaf(_) => panic!("expected a node"),
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = PatternRegistry::builder()
            .register("bam", "{d}/{sample}.bam")
            .register("fastqc", fastqc())
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["bam", "fastqc"]);
        assert!(matches!(registry.lookup("bam"), Ok(PatternNode::Leaf(_))));
        assert!(matches!(registry.lookup("fastqc.raw"), Ok(PatternNode::Leaf(_))));
        assert!(matches!(
            registry.lookup("fastqc.unknown"),
            Err(PipelineError::UnknownKind(_))
        ));
        assert!(matches!(registry.lookup("vcf"), Err(PipelineError::UnknownKind(_))));
    }

    #[test]
    fn test_registry_rejects_duplicate_kind() {
        let result = PatternRegistry::builder()
            .register("bam", "{d}/{sample}.bam")
            .register("bam", "{d}/{sample}.sorted.bam")
            .build();
        assert!(matches!(result, Err(PipelineError::Definition(_))));
    }

    #[test]
    fn test_registry_accepts_unfillable_template() {
        // Placeholder validation happens at fill time.
        let registry = PatternRegistry::builder()
            .register("odd", "{nowhere}/{sample}.txt")
            .build();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_yaml_preserves_key_order() {
        let yaml = r#"
zeta: "{d}/z.txt"
alpha:
  second: "{d}/{sample}.2"
  first: "{d}/{sample}.1"
"#;
        let node: PatternNode = serde_yaml::from_str(yaml).unwrap();
        let registry = PatternRegistry::from_node(node).unwrap();

        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert_eq!(
            registry.lookup("alpha").unwrap(),
            &PatternNode::node([
                ("second", PatternNode::leaf("{d}/{sample}.2")),
                ("first", PatternNode::leaf("{d}/{sample}.1")),
            ])
        );
    }

    #[test]
    fn test_yaml_rejects_non_string_leaf() {
        let result: std::result::Result<PatternNode, _> = serde_yaml::from_str("kind: 42");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_shape() {
        let tree = PatternNode::node([("fastqc", fastqc()), ("bam", PatternNode::leaf("x.bam"))]);
        let yaml = serde_yaml::to_string(&tree).unwrap();
        let back: PatternNode = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, tree);
    }
}
