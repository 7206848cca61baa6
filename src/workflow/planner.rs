//! Build Planning
//!
//! Works out which rules a set of requested targets needs:
//! - Maps each target path to the rule producing it
//! - Walks dependency edges backwards to collect upstream rules
//! - Clamps per-rule thread hints to the available execution slots

use std::collections::HashSet;

use log::{debug, info, warn};

use super::graph::{ResolvedRule, RuleGraph};
use crate::error::{PipelineError, Result};

/// One rule in a build plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRule<'g> {
    pub rule: &'g ResolvedRule,
    /// Thread hint after clamping to the slot limit
    pub threads: usize,
    /// Requested targets this rule produces directly
    pub requested: Vec<String>,
}

/// The rules needed for a set of targets, in topological order.
#[derive(Debug, Clone)]
pub struct BuildPlan<'g> {
    rules: Vec<PlannedRule<'g>>,
    max_threads: usize,
}

impl<'g> BuildPlan<'g> {
    /// Plans the rules required to produce `targets`.
    ///
    /// # Arguments
    ///
    /// * `graph` - A built rule graph
    /// * `targets` - Concrete paths requested by the caller
    /// * `max_threads` - Upper bound for any single rule's thread hint
    ///
    /// A target that no rule declares fails with
    /// [`PipelineError::UnknownTarget`].
    pub fn for_targets(
        graph: &'g RuleGraph,
        targets: &[String],
        max_threads: usize,
    ) -> Result<Self> {
        let max_threads = max_threads.max(1);

        let mut needed: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for target in targets {
            let producer = graph
                .producer_of(target)
                .ok_or_else(|| PipelineError::UnknownTarget(target.clone()))?;
            if needed.insert(producer.name.as_str()) {
                stack.push(producer.name.as_str());
            }
        }

        while let Some(name) = stack.pop() {
            for dep in graph.dependencies(name).unwrap_or_default() {
                if needed.insert(dep.as_str()) {
                    debug!("'{}' pulls in upstream rule '{}'", name, dep);
                    stack.push(dep.as_str());
                }
            }
        }

        let requested: HashSet<&str> = targets.iter().map(String::as_str).collect();

        let rules: Vec<PlannedRule<'g>> = graph
            .rules()
            .iter()
            .filter(|r| needed.contains(r.name.as_str()))
            .map(|rule| {
                if rule.threads > max_threads {
                    warn!(
                        "Rule '{}' asks for {} threads, clamping to {}",
                        rule.name, rule.threads, max_threads
                    );
                }
                PlannedRule {
                    rule,
                    threads: rule.threads.clamp(1, max_threads),
                    requested: rule
                        .output_paths()
                        .into_iter()
                        .filter(|p| requested.contains(p.as_str()))
                        .collect(),
                }
            })
            .collect();

        info!(
            "Planned {} of {} rules for {} targets",
            rules.len(),
            graph.len(),
            targets.len()
        );

        Ok(Self { rules, max_threads })
    }

    /// Planned rules in dependency order.
    pub fn rules(&self) -> &[PlannedRule<'g>] {
        &self.rules
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.iter().any(|p| p.rule.name == name)
    }

    /// Sum of clamped thread hints; an upper bound on slots the plan can use.
    pub fn total_threads(&self) -> usize {
        self.rules.iter().map(|p| p.threads).sum()
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Default slot limit: the number of logical CPUs.
pub fn default_max_threads() -> usize {
    num_cpus::get()
}
