//! Rule Graph Construction
//!
//! Building happens in two phases:
//! 1. Rules are declared in any order; references to other rules' outputs
//!    are kept by name.
//! 2. [`RuleGraphBuilder::build`] fills every output, indexes the concrete
//!    paths, resolves references into dependency edges and sorts the rules
//!    topologically.
//!
//! Besides explicit references, an input path that is some rule's declared
//! output also creates an edge. Paths nobody produces are source files.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info, warn};
use serde::Serialize;

use super::fill::{fill, flatten, FilledNode, ParameterSet};
use super::model::{Directive, Rule, RuleInput};
use crate::error::{PipelineError, Result};

/// A rule input with its references resolved to concrete paths.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    pub name: String,
    pub paths: Vec<String>,
    /// Rule whose output this input names, if it was a reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_rule: Option<String>,
}

/// A rule after the graph has been built.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResolvedRule {
    pub name: String,
    pub inputs: Vec<ResolvedInput>,
    /// Named outputs as a filled tree keyed by output name
    pub outputs: FilledNode,
    pub threads: usize,
    /// Written as a one-key map (`adapter: {id: ..}`), never as a YAML tag
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub directive: Directive,
    /// Rules that must finish first, in topological order
    pub dependencies: Vec<String>,
}

impl ResolvedRule {
    /// Every concrete output path of this rule.
    pub fn output_paths(&self) -> Vec<String> {
        flatten(&self.outputs)
    }

    /// Every concrete input path of this rule.
    pub fn input_paths(&self) -> Vec<String> {
        self.inputs.iter().flat_map(|i| i.paths.iter().cloned()).collect()
    }
}

/// Collects rule declarations until the graph is built.
#[derive(Debug, Default)]
pub struct RuleGraphBuilder {
    rules: Vec<Rule>,
}

impl RuleGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a rule. References are not checked until [`build`].
    ///
    /// [`build`]: RuleGraphBuilder::build
    pub fn declare(&mut self, rule: Rule) -> &mut Self {
        debug!("Declared rule '{}'", rule.name);
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolves all declarations into an acyclic graph.
    ///
    /// Performs the following checks:
    /// 1. Rule names are unique
    /// 2. No concrete output path is declared twice
    /// 3. Every reference names a declared rule and output
    /// 4. The dependency edges contain no cycle
    pub fn build(&self, params: &ParameterSet) -> Result<RuleGraph> {
        info!("Building rule graph from {} declarations", self.rules.len());

        if self.rules.is_empty() {
            return Err(PipelineError::Definition(
                "pipeline declares no rules".to_string(),
            ));
        }

        let mut by_name: HashMap<&str, usize> = HashMap::new();
        for (idx, rule) in self.rules.iter().enumerate() {
            if by_name.insert(rule.name.as_str(), idx).is_some() {
                return Err(PipelineError::DuplicateRule(rule.name.clone()));
            }
        }

        let outputs = self.fill_outputs(params)?;
        let producers = index_producers(&self.rules, &outputs)?;

        let mut inputs: Vec<Vec<ResolvedInput>> = Vec::with_capacity(self.rules.len());
        let mut edges: Vec<BTreeSet<usize>> = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let mut resolved = Vec::with_capacity(rule.inputs.len());
            let mut deps = BTreeSet::new();

            for (input_name, input) in &rule.inputs {
                let (paths, from_rule) = match input {
                    RuleInput::Paths(node) => (flatten(node), None),
                    RuleInput::Pattern(pattern) => (flatten(&fill(pattern, params)?), None),
                    RuleInput::Output { rule: target, output } => {
                        let dangling = || PipelineError::DanglingReference {
                            rule: rule.name.clone(),
                            input: input_name.clone(),
                            reference: input.describe(),
                        };

                        let target_idx = *by_name.get(target.as_str()).ok_or_else(dangling)?;
                        let paths = match output {
                            None => flatten(&outputs[target_idx]),
                            Some(out) => flatten(
                                outputs[target_idx].get(out).ok_or_else(dangling)?,
                            ),
                        };
                        deps.insert(target_idx);
                        (paths, Some(target.clone()))
                    }
                };

                for path in &paths {
                    if let Some(&producer) = producers.get(path.as_str()) {
                        deps.insert(producer);
                    }
                }

                resolved.push(ResolvedInput {
                    name: input_name.clone(),
                    paths,
                    from_rule,
                });
            }

            if rule.outputs.is_empty() {
                warn!("Rule '{}' declares no outputs", rule.name);
            }

            inputs.push(resolved);
            edges.push(deps);
        }

        let declared_outputs = producers.len();
        let order = topological_order(&self.rules, &edges)?;

        let mut rules = Vec::with_capacity(order.len());
        let mut taken_inputs: Vec<Option<Vec<ResolvedInput>>> =
            inputs.into_iter().map(Some).collect();
        let mut taken_outputs: Vec<Option<FilledNode>> = outputs.into_iter().map(Some).collect();
        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();

        for &idx in &order {
            let rule = &self.rules[idx];
            let mut deps: Vec<usize> = edges[idx].iter().copied().collect();
            deps.sort_by_key(|d| position[d]);

            rules.push(ResolvedRule {
                name: rule.name.clone(),
                inputs: taken_inputs[idx].take().unwrap_or_default(),
                outputs: taken_outputs[idx]
                    .take()
                    .unwrap_or(FilledNode::Node(Vec::new())),
                threads: rule.threads,
                directive: rule.directive.clone(),
                dependencies: deps.iter().map(|&d| self.rules[d].name.clone()).collect(),
            });
        }

        let edge_count: usize = edges.iter().map(|e| e.len()).sum();
        info!(
            "Rule graph built: {} rules, {} dependency edges, {} declared outputs",
            rules.len(),
            edge_count,
            declared_outputs
        );

        Ok(RuleGraph::from_sorted(rules))
    }

    /// Fills each rule's named outputs into one node keyed by output name.
    fn fill_outputs(&self, params: &ParameterSet) -> Result<Vec<FilledNode>> {
        self.rules
            .iter()
            .map(|rule| {
                rule.outputs
                    .iter()
                    .map(|(name, pattern)| fill(pattern, params).map(|f| (name.clone(), f)))
                    .collect::<Result<Vec<_>>>()
                    .map(FilledNode::Node)
            })
            .collect()
    }
}

/// Maps every concrete output path to the index of the rule producing it.
fn index_producers<'a>(
    rules: &'a [Rule],
    outputs: &'a [FilledNode],
) -> Result<HashMap<&'a str, usize>> {
    let mut producers: HashMap<&str, usize> = HashMap::new();

    for (idx, filled) in outputs.iter().enumerate() {
        for path in filled_paths(filled) {
            if let Some(&other) = producers.get(path) {
                if other == idx {
                    return Err(PipelineError::OutputCollision {
                        rule: rules[idx].name.clone(),
                        path: path.to_string(),
                    });
                }
                return Err(PipelineError::AmbiguousOutput {
                    path: path.to_string(),
                    first: rules[other].name.clone(),
                    second: rules[idx].name.clone(),
                });
            }
            producers.insert(path, idx);
        }
    }

    Ok(producers)
}

/// Borrowing counterpart of [`flatten`].
fn filled_paths(node: &FilledNode) -> Vec<&str> {
    match node {
        FilledNode::Leaf(paths) => paths.iter().map(String::as_str).collect(),
        FilledNode::Node(children) => children.iter().flat_map(|(_, v)| filled_paths(v)).collect(),
    }
}

/// Orders rules so dependencies come first, using Kahn's algorithm.
///
/// Among rules that are ready at the same time, declaration order wins.
/// Rules left over once no rule is ready sit on a cycle (or behind one).
fn topological_order(rules: &[Rule], edges: &[BTreeSet<usize>]) -> Result<Vec<usize>> {
    let mut in_degree: Vec<usize> = edges.iter().map(|deps| deps.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); rules.len()];
    for (idx, deps) in edges.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(idx);
        }
    }

    let mut ready: BTreeSet<usize> = (0..rules.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(rules.len());

    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != rules.len() {
        let sorted: HashSet<usize> = order.iter().copied().collect();
        let stuck: Vec<String> = (0..rules.len())
            .filter(|i| !sorted.contains(i))
            .map(|i| rules[i].name.clone())
            .collect();
        return Err(PipelineError::Cycle { rules: stuck });
    }

    debug!(
        "Topological order: {:?}",
        order.iter().map(|&i| &rules[i].name).collect::<Vec<_>>()
    );

    Ok(order)
}

/// A validated, acyclic set of rules in topological order.
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct RuleGraph {
    rules: Vec<ResolvedRule>,
    index: HashMap<String, usize>,
    producers: HashMap<String, usize>,
}

impl RuleGraph {
    fn from_sorted(rules: Vec<ResolvedRule>) -> Self {
        let index = rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();

        let mut producers = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            for path in rule.output_paths() {
                producers.insert(path, i);
            }
        }

        Self {
            rules,
            index,
            producers,
        }
    }

    /// Rules in topological order.
    pub fn rules(&self) -> &[ResolvedRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&ResolvedRule> {
        self.index.get(name).map(|&i| &self.rules[i])
    }

    /// The rule declaring `path` as an output.
    pub fn producer_of(&self, path: &str) -> Option<&ResolvedRule> {
        self.producers.get(path).map(|&i| &self.rules[i])
    }

    /// Direct upstream rules of `name`.
    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.rule(name).map(|r| r.dependencies.as_slice())
    }

    /// Direct downstream rules of `name`, in topological order.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.dependencies.iter().any(|d| d == name))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Rules with no dependencies (entry points).
    pub fn root_rules(&self) -> Vec<&ResolvedRule> {
        self.rules.iter().filter(|r| r.dependencies.is_empty()).collect()
    }

    /// Rules nothing depends on (exit points).
    pub fn leaf_rules(&self) -> Vec<&ResolvedRule> {
        self.rules
            .iter()
            .filter(|r| self.dependents(&r.name).is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
