//! Parameter Filling and Flattening
//!
//! Expands pattern trees against a parameter set into concrete path
//! collections of the same shape, and collapses those collections back into
//! a single ordered list of paths.
//!
//! Ordering is part of the contract: a leaf fills to one path per sample in
//! sample order, and flattening walks keys in declaration order.

use log::debug;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::pattern::PatternNode;
use super::template::{extract_placeholders, has_placeholders, substitute, SAMPLE};
use crate::error::{PipelineError, Result};

/// Concrete values available for filling.
///
/// Sample identifiers are kept unique and in input order. Any other
/// parameter (directory roots, stage names) is a named list of values; a
/// directory root is simply a list of one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    samples: Vec<String>,
    values: Vec<(String, Vec<String>)>,
}

impl ParameterSet {
    /// Creates a parameter set for the given samples.
    ///
    /// Repeated sample identifiers are dropped, keeping the first.
    pub fn new<I, S>(samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for sample in samples {
            let sample = sample.into();
            if !unique.contains(&sample) {
                unique.push(sample);
            }
        }
        Self {
            samples: unique,
            values: Vec::new(),
        }
    }

    /// Sets a single-valued parameter such as a directory root.
    pub fn with_root(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_values(name, vec![value.into()])
    }

    /// Sets a multi-valued parameter. Replaces an earlier value of the same
    /// name.
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        let name = name.into();
        self.values.retain(|(n, _)| *n != name);
        self.values.push((name, values));
        self
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Returns the values supplied for a placeholder name.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        if name == SAMPLE {
            return Some(self.samples.as_slice());
        }
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Returns a single-valued parameter.
    pub fn root(&self, name: &str) -> Option<&str> {
        match self.values(name) {
            Some([value]) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// A pattern tree with every template replaced by its concrete paths.
#[derive(Debug, Clone, PartialEq)]
pub enum FilledNode {
    Leaf(Vec<String>),
    Node(Vec<(String, FilledNode)>),
}

impl FilledNode {
    /// Returns the direct child with the given key.
    pub fn get(&self, key: &str) -> Option<&FilledNode> {
        match self {
            Self::Leaf(_) => None,
            Self::Node(children) => children.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        }
    }

    /// Resolves a dotted path (`fastqc.raw`) below this node.
    pub fn lookup(&self, path: &str) -> Option<&FilledNode> {
        path.split('.').try_fold(self, |node, key| node.get(key))
    }

    /// All paths below this node; see [`flatten`].
    pub fn paths(&self) -> Vec<String> {
        flatten(self)
    }

    /// Checks that this tree has the same keys and nesting as `pattern`.
    pub fn same_shape(&self, pattern: &PatternNode) -> bool {
        match (self, pattern) {
            (Self::Leaf(_), PatternNode::Leaf(_)) => true,
            (Self::Node(filled), PatternNode::Node(patterns)) => {
                filled.len() == patterns.len()
                    && filled
                        .iter()
                        .zip(patterns)
                        .all(|((fk, fv), (pk, pv))| fk == pk && fv.same_shape(pv))
            }
            _ => false,
        }
    }
}

impl From<Vec<String>> for FilledNode {
    fn from(paths: Vec<String>) -> Self {
        Self::Leaf(paths)
    }
}

impl Serialize for FilledNode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Leaf(paths) => paths.serialize(serializer),
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

/// Fills every template in `node` against `params`, preserving shape.
///
/// Fails on the first template that uses a placeholder with no value; no
/// partial tree is returned.
///
/// # Example
/// ```
/// use seqplan::workflow::{fill, flatten, ParameterSet, PatternNode};
///
/// let params = ParameterSet::new(["s1", "s2"]).with_root("root", "/data");
/// let filled = fill(&PatternNode::leaf("{root}/{sample}.bam"), &params).unwrap();
/// assert_eq!(flatten(&filled), vec!["/data/s1.bam", "/data/s2.bam"]);
/// ```
pub fn fill(node: &PatternNode, params: &ParameterSet) -> Result<FilledNode> {
    match node {
        PatternNode::Leaf(template) => Ok(FilledNode::Leaf(fill_template(template, params)?)),
        PatternNode::Node(children) => children
            .iter()
            .map(|(key, child)| fill(child, params).map(|filled| (key.clone(), filled)))
            .collect::<Result<Vec<_>>>()
            .map(FilledNode::Node),
    }
}

/// Expands one template into concrete paths.
///
/// The expansion is the cartesian product over the template's placeholders
/// in first-appearance order, leftmost varying slowest. A template with only
/// single-valued placeholders yields exactly one path.
pub fn fill_template(template: &str, params: &ParameterSet) -> Result<Vec<String>> {
    // Literal paths (external inputs such as a fixed config) pass through.
    if !has_placeholders(template) {
        return Ok(vec![template.to_string()]);
    }

    let names = extract_placeholders(template);

    let mut paths = vec![template.to_string()];
    for name in &names {
        let values = params
            .values(name)
            .ok_or_else(|| PipelineError::MissingPlaceholder {
                template: template.to_string(),
                name: name.clone(),
            })?;

        paths = paths
            .iter()
            .flat_map(|partial| values.iter().map(move |v| substitute(partial, name, v)))
            .collect();
    }

    debug!("Filled '{}' into {} paths", template, paths.len());
    Ok(paths)
}

/// Collapses a filled tree into one ordered sequence of paths.
///
/// Leaves are returned unchanged; nodes are flattened child by child in key
/// order. Duplicates are kept.
pub fn flatten(node: &FilledNode) -> Vec<String> {
    match node {
        FilledNode::Leaf(paths) => paths.clone(),
        FilledNode::Node(children) => children.iter().flat_map(|(_, v)| flatten(v)).collect(),
    }
}
