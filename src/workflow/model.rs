//! Rule Data Model
//!
//! A rule is a named processing step: named inputs, named outputs, an
//! execution directive for the external engine and a thread hint.
//!
//! Inputs either carry paths (already filled, or a pattern filled when the
//! graph is built) or name another rule's declared output. Naming an output
//! is what creates a dependency edge; see [`crate::workflow::graph`].

use serde::Serialize;

use super::fill::FilledNode;
use super::pattern::PatternNode;

/// What a rule input points at.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleInput {
    /// Concrete paths taken from a filled target tree.
    Paths(FilledNode),
    /// A pattern filled against the parameter set at build time.
    Pattern(PatternNode),
    /// Outputs of another rule, all of them when `output` is `None`.
    Output { rule: String, output: Option<String> },
}

impl RuleInput {
    /// References every output of `rule`.
    pub fn rule(rule: impl Into<String>) -> Self {
        Self::Output {
            rule: rule.into(),
            output: None,
        }
    }

    /// References one named output of `rule`.
    pub fn output(rule: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Output {
            rule: rule.into(),
            output: Some(output.into()),
        }
    }

    /// Human-readable form used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Paths(_) => "<paths>".to_string(),
            Self::Pattern(_) => "<pattern>".to_string(),
            Self::Output { rule, output: None } => rule.clone(),
            Self::Output {
                rule,
                output: Some(output),
            } => format!("{}.{}", rule, output),
        }
    }
}

impl From<PatternNode> for RuleInput {
    fn from(pattern: PatternNode) -> Self {
        Self::Pattern(pattern)
    }
}

impl From<FilledNode> for RuleInput {
    fn from(paths: FilledNode) -> Self {
        Self::Paths(paths)
    }
}

/// How the external engine runs a rule. The planner never interprets it.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// An independently versioned adapter script, called with the rule's
    /// named inputs and outputs plus an optional free-form parameter string.
    Adapter {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<String>,
    },
    /// A shell command template.
    Shell(String),
    /// A transform implemented by this crate (e.g. `libsize_table`).
    Delegate(String),
}

impl Directive {
    pub fn adapter(id: impl Into<String>) -> Self {
        Self::Adapter {
            id: id.into(),
            params: None,
        }
    }

    pub fn adapter_with_params(id: impl Into<String>, params: impl Into<String>) -> Self {
        Self::Adapter {
            id: id.into(),
            params: Some(params.into()),
        }
    }

    /// Short label for listings.
    pub fn label(&self) -> String {
        match self {
            Self::Adapter { id, .. } => id.clone(),
            Self::Shell(cmd) => format!("shell: {}", cmd),
            Self::Delegate(name) => format!("builtin: {}", name),
        }
    }
}

/// A rule declaration, before references are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Unique rule name
    pub name: String,

    /// Named inputs, in declaration order
    pub inputs: Vec<(String, RuleInput)>,

    /// Named outputs, filled against the parameter set at build time
    pub outputs: Vec<(String, PatternNode)>,

    /// Execution slots the engine should reserve while the rule runs
    pub threads: usize,

    pub directive: Directive,
}

impl Rule {
    /// Creates a rule with no inputs or outputs and a thread hint of 1.
    ///
    /// # Example
    ///
    /// ```
    /// use seqplan::workflow::{Directive, PatternNode, Rule, RuleInput};
    ///
    /// let rule = Rule::new("align_reads", Directive::adapter("bio/aligner"))
    ///     .with_input("reads", RuleInput::output("trim_reads", "reads"))
    ///     .with_output("bam", PatternNode::leaf("{sample_dir}/{sample}/{sample}.bam"))
    ///     .with_threads(8);
    /// assert_eq!(rule.threads, 8);
    /// ```
    pub fn new(name: impl Into<String>, directive: Directive) -> Self {
        Self {
            name: name.into().trim().to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            threads: 1,
            directive,
        }
    }

    /// Adds a named input.
    pub fn with_input(mut self, name: impl Into<String>, input: impl Into<RuleInput>) -> Self {
        self.inputs.push((name.into(), input.into()));
        self
    }

    /// Adds a named output.
    pub fn with_output(mut self, name: impl Into<String>, output: impl Into<PatternNode>) -> Self {
        self.outputs.push((name.into(), output.into()));
        self
    }

    /// Sets the thread hint for this rule.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new(" trim ", Directive::adapter("bio/trimmer"))
            .with_input("reads", PatternNode::leaf("{d}/{sample}.fastq.gz"))
            .with_output("reads", "{d}/{sample}.trimmed.fastq.gz")
            .with_threads(4);

        assert_eq!(rule.name, "trim");
        assert_eq!(rule.threads, 4);
        assert_eq!(rule.inputs.len(), 1);
        assert_eq!(rule.outputs[0].0, "reads");
    }

    #[test]
    fn test_default_threads() {
        let rule = Rule::new("r", Directive::Shell("true".to_string()));
        assert_eq!(rule.threads, 1);
    }

    #[test]
    fn test_inputs_keep_declaration_order() {
        let rule = Rule::new("report", Directive::adapter("bio/report"))
            .with_input("qc", RuleInput::rule("fastqc"))
            .with_input("cfg", FilledNode::Leaf(vec!["cfg.yaml".to_string()]))
            .with_input("logs", RuleInput::output("trim", "log"));

        let names: Vec<_> = rule.inputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["qc", "cfg", "logs"]);
        assert!(matches!(rule.inputs[1].1, RuleInput::Paths(_)));
    }

    #[test]
    fn test_input_describe() {
        assert_eq!(RuleInput::rule("trim").describe(), "trim");
        assert_eq!(RuleInput::output("trim", "log").describe(), "trim.log");
    }

    #[test]
    fn test_directive_serialization() {
        let json =
            serde_json::to_value(Directive::adapter_with_params("bio/trim", "-q 20")).unwrap();
        assert_eq!(json["adapter"]["id"], "bio/trim");
        assert_eq!(json["adapter"]["params"], "-q 20");

        let json =
            serde_json::to_value(Directive::Delegate("libsize_table".to_string())).unwrap();
        assert_eq!(json["delegate"], "libsize_table");
    }

    #[test]
    fn test_directive_label() {
        assert_eq!(Directive::adapter("bio/x").label(), "bio/x");
        assert_eq!(
            Directive::Delegate("libsize_table".to_string()).label(),
            "builtin: libsize_table"
        );
    }
}
