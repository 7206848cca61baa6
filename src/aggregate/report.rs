//! Multi-Report Inputs
//!
//! The combined report is rendered by an external tool. All this side does
//! is hand it a complete, duplicate-free list of artifact paths together
//! with one fixed configuration document.

use std::collections::HashSet;
use std::io::Write;

use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::workflow::{flatten, FilledNode, ResolvedRule};

/// Name of the report rule input carrying the configuration document.
pub const CONFIG_INPUT: &str = "config";

/// Drops repeated paths, keeping the first occurrence of each.
pub fn dedup_paths<I>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Flattens and merges several filled collections into one unique list,
/// in collection order.
pub fn union_paths<'a, I>(collections: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a FilledNode>,
{
    dedup_paths(collections.into_iter().flat_map(flatten))
}

/// Arguments for one invocation of the report generator.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiReport {
    pub inputs: Vec<String>,
    pub config: String,
    pub output: String,
}

impl MultiReport {
    /// Assembles the report job from a resolved report rule.
    ///
    /// The input named [`CONFIG_INPUT`] must carry exactly one path; every
    /// other input is merged into the deduplicated artifact list. The rule
    /// must declare exactly one output path.
    pub fn from_rule(rule: &ResolvedRule) -> Result<Self> {
        let config = rule
            .inputs
            .iter()
            .find(|i| i.name == CONFIG_INPUT)
            .ok_or_else(|| {
                PipelineError::Definition(format!(
                    "report rule '{}' has no '{}' input",
                    rule.name, CONFIG_INPUT
                ))
            })?;

        let config = match config.paths.as_slice() {
            [path] => path.clone(),
            other => {
                return Err(PipelineError::Definition(format!(
                    "report rule '{}': '{}' must be a single path, found {}",
                    rule.name,
                    CONFIG_INPUT,
                    other.len()
                )))
            }
        };

        let output = match rule.output_paths().as_slice() {
            [path] => path.clone(),
            other => {
                return Err(PipelineError::Definition(format!(
                    "report rule '{}' must declare one output, found {}",
                    rule.name,
                    other.len()
                )))
            }
        };

        let collections: Vec<FilledNode> = rule
            .inputs
            .iter()
            .filter(|i| i.name != CONFIG_INPUT)
            .map(|i| FilledNode::from(i.paths.clone()))
            .collect();
        let inputs = union_paths(&collections);

        debug!(
            "Report '{}': {} input paths, {} after deduplication",
            rule.name,
            collections.iter().map(|c| flatten(c).len()).sum::<usize>(),
            inputs.len()
        );
        info!("Report '{}' collects {} artifacts", rule.name, inputs.len());

        Ok(Self {
            inputs,
            config,
            output,
        })
    }

    /// Writes the artifact list one path per line, the format report tools
    /// accept as a file list.
    pub fn write_file_list<W: Write>(&self, mut writer: W) -> Result<()> {
        for path in &self.inputs {
            writeln!(writer, "{}", path)?;
        }
        Ok(())
    }
}
