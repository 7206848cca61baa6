//! Error Types
//!
//! Every failure the planner can surface. Structural errors (placeholders,
//! references, cycles) abort graph construction; artifact parse errors are
//! reported per file by the aggregation transforms.

use thiserror::Error;

/// Errors raised while filling patterns, building the rule graph or
/// aggregating artifacts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A template uses a placeholder with no supplied value.
    #[error("template '{template}' uses placeholder '{{{name}}}' but no value was supplied for it")]
    MissingPlaceholder { template: String, name: String },

    /// A rule input names a rule or output that was never declared.
    #[error("rule '{rule}': input '{input}' references undeclared output '{reference}'")]
    DanglingReference {
        rule: String,
        input: String,
        reference: String,
    },

    /// The same concrete path is declared as output of two rules.
    #[error("'{path}' is declared as an output of both '{first}' and '{second}'")]
    AmbiguousOutput {
        path: String,
        first: String,
        second: String,
    },

    /// The dependency edges do not form a DAG.
    #[error("rules depend on each other in a loop: {}", .rules.join(", "))]
    Cycle { rules: Vec<String> },

    /// A single-value artifact could not be parsed.
    #[error("cannot parse '{path}': {reason}")]
    ArtifactParse { path: String, reason: String },

    #[error("rule '{0}' is declared more than once")]
    DuplicateRule(String),

    /// One rule fills two outputs to the same path.
    #[error("rule '{rule}' declares output '{path}' more than once")]
    OutputCollision { rule: String, path: String },

    #[error("unknown artifact kind '{0}'")]
    UnknownKind(String),

    #[error("no rule produces requested target '{0}'")]
    UnknownTarget(String),

    #[error("no library-size records could be parsed")]
    EmptyAggregation,

    /// Malformed pipeline definition or configuration.
    #[error("invalid pipeline definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_placeholder_display() {
        let err = PipelineError::MissingPlaceholder {
            template: "{root}/{sample}.bam".to_string(),
            name: "root".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("{root}/{sample}.bam"));
        assert!(msg.contains("'{root}'"));
    }

    #[test]
    fn test_cycle_display_lists_rules() {
        let err = PipelineError::Cycle {
            rules: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "rules depend on each other in a loop: a, b");
    }

    #[test]
    fn test_dangling_reference_names_missing_output() {
        let err = PipelineError::DanglingReference {
            rule: "align".to_string(),
            input: "reads".to_string(),
            reference: "trim.reads".to_string(),
        };
        assert!(err.to_string().contains("trim.reads"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
