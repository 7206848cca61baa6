//! Pipeline Definition Parser
//!
//! Loads pipeline definitions from YAML files and exports resolved rule
//! declarations for the external execution engine.
//!
//! # Definition format
//!
//! ```yaml
//! patterns:
//!   reads: "{sample_dir}/{sample}/{sample}.fastq.gz"
//!   trimmed: "{sample_dir}/{sample}/{sample}.trimmed.fastq.gz"
//! rules:
//!   - name: trim_reads
//!     inputs:
//!       reads: {pattern: reads}
//!     outputs:
//!       reads: trimmed
//!     threads: 4
//!     directive: {adapter: bio/cutadapt/se, params: "-q 20"}
//! targets: [trimmed]
//! ```
//!
//! Inputs are `{pattern: kind}`, `{paths: [...]}` or
//! `{rule: name, output: name}` (`output` optional). Outputs map an output
//! name to a kind path. The directive is exactly one of `adapter`, `shell`
//! or `delegate`.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::fill::FilledNode;
use super::graph::{ResolvedRule, RuleGraph, RuleGraphBuilder};
use super::model::{Directive, Rule, RuleInput};
use super::pattern::{PatternNode, PatternRegistry};
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;

fn default_threads() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    patterns: PatternNode,
    rules: Vec<RuleSpec>,
    #[serde(default)]
    targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    name: String,
    // Mappings keep declaration order.
    #[serde(default)]
    inputs: Mapping,
    #[serde(default)]
    outputs: Mapping,
    #[serde(default = "default_threads")]
    threads: usize,
    directive: DirectiveSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputSpec {
    pattern: Option<String>,
    paths: Option<Vec<String>>,
    rule: Option<String>,
    output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectiveSpec {
    adapter: Option<String>,
    params: Option<String>,
    shell: Option<String>,
    delegate: Option<String>,
}

impl DirectiveSpec {
    fn into_directive(self, rule: &str) -> Result<Directive> {
        match (self.adapter, self.shell, self.delegate) {
            (Some(id), None, None) => Ok(Directive::Adapter {
                id,
                params: self.params,
            }),
            (None, Some(cmd), None) if self.params.is_none() => Ok(Directive::Shell(cmd)),
            (None, None, Some(name)) if self.params.is_none() => Ok(Directive::Delegate(name)),
            _ => Err(PipelineError::Definition(format!(
                "rule '{}': directive must be exactly one of adapter, shell or delegate \
                 (params only with adapter)",
                rule
            ))),
        }
    }
}

impl InputSpec {
    fn into_input(self, rule: &str, name: &str, registry: &PatternRegistry) -> Result<RuleInput> {
        match (self.pattern, self.paths, self.rule) {
            (Some(kind), None, None) if self.output.is_none() => {
                Ok(RuleInput::Pattern(registry.lookup(&kind)?.clone()))
            }
            (None, Some(paths), None) if self.output.is_none() => {
                Ok(RuleInput::Paths(FilledNode::from(paths)))
            }
            (None, None, Some(target)) => Ok(RuleInput::Output {
                rule: target,
                output: self.output,
            }),
            _ => Err(PipelineError::Definition(format!(
                "rule '{}': input '{}' must be exactly one of pattern, paths or rule",
                rule, name
            ))),
        }
    }
}

fn mapping_key(key: &Value, rule: &str) -> Result<String> {
    key.as_str().map(str::to_string).ok_or_else(|| {
        PipelineError::Definition(format!(
            "rule '{}': input and output names must be strings, found {:?}",
            rule, key
        ))
    })
}

fn build_rule(spec: RuleSpec, registry: &PatternRegistry) -> Result<Rule> {
    let directive = spec.directive.into_directive(&spec.name)?;
    let mut rule = Rule::new(spec.name.as_str(), directive).with_threads(spec.threads);

    if rule.name.is_empty() {
        return Err(PipelineError::Definition("rule name must not be empty".to_string()));
    }

    for (key, value) in spec.inputs {
        let name = mapping_key(&key, &rule.name)?;
        let input: InputSpec = serde_yaml::from_value(value).map_err(|e| {
            PipelineError::Definition(format!("rule '{}': input '{}': {}", rule.name, name, e))
        })?;
        let input = input.into_input(&rule.name, &name, registry)?;
        rule = rule.with_input(name, input);
    }

    for (key, value) in spec.outputs {
        let name = mapping_key(&key, &rule.name)?;
        let kind = value.as_str().ok_or_else(|| {
            PipelineError::Definition(format!(
                "rule '{}': output '{}' must name an artifact kind",
                rule.name, name
            ))
        })?;
        let pattern = registry.lookup(kind)?.clone();
        rule = rule.with_output(name, pattern);
    }

    debug!(
        "Parsed rule '{}': {} inputs, {} outputs",
        rule.name,
        rule.inputs.len(),
        rule.outputs.len()
    );
    Ok(rule)
}

/// Parses a pipeline definition from YAML text.
///
/// Artifact kinds named by inputs, outputs and targets must exist in the
/// definition's `patterns`; rule references are checked when the graph is
/// built.
pub fn parse_pipeline(content: &str) -> Result<Pipeline> {
    let file: DefinitionFile = serde_yaml::from_str(content)?;

    let registry = PatternRegistry::from_node(file.patterns)?;

    let mut rules = RuleGraphBuilder::new();
    for spec in file.rules {
        rules.declare(build_rule(spec, &registry)?);
    }

    for target in &file.targets {
        registry.lookup(target)?;
    }

    info!(
        "Parsed {} artifact kinds, {} rules, {} target kinds",
        registry.len(),
        rules.len(),
        file.targets.len()
    );

    Ok(Pipeline::new(registry, rules, file.targets))
}

/// Loads a pipeline definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use seqplan::workflow::parser::load_pipeline;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = load_pipeline("pipeline.yaml")?;
///     println!("{} rules", pipeline.declarations().len());
///     Ok(())
/// }
/// ```
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<Pipeline> {
    let path = path.as_ref();
    info!("Loading pipeline definition from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::Definition(format!(
            "failed to read pipeline definition '{}': {}",
            path.display(),
            e
        ))
    })?;

    debug!("YAML content loaded ({} bytes)", content.len());
    parse_pipeline(&content)
}

/// Output format for exported declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Yaml,
    Json,
}

impl ExportFormat {
    /// `.json` files get JSON, everything else YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

#[derive(Serialize)]
struct Declarations<'a> {
    generator: &'a str,
    version: &'a str,
    generated_at: String,
    targets: &'a [String],
    rules: &'a [ResolvedRule],
}

/// Renders resolved rule declarations for the external engine.
pub fn render_declarations(
    graph: &RuleGraph,
    targets: &[String],
    format: ExportFormat,
) -> Result<String> {
    let doc = Declarations {
        generator: crate::APP_NAME,
        version: crate::VERSION,
        generated_at: Utc::now().to_rfc3339(),
        targets,
        rules: graph.rules(),
    };

    Ok(match format {
        ExportFormat::Json => serde_json::to_string_pretty(&doc)?,
        ExportFormat::Yaml => serde_yaml::to_string(&doc)?,
    })
}

/// Writes resolved rule declarations to a file.
///
/// # Arguments
///
/// * `graph` - The built rule graph
/// * `targets` - Terminal target set
/// * `path` - Output file; the extension picks the format
pub fn export_declarations(
    graph: &RuleGraph,
    targets: &[String],
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let content = render_declarations(graph, targets, ExportFormat::from_path(path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    info!(
        "Exported {} rule declarations to: {}",
        graph.len(),
        path.display()
    );
    Ok(())
}
