//! Workflow Definition Module
//!
//! Provides the data structures that turn path templates and a sample list
//! into a resolved, ordered rule graph.
//!
//! # Structure
//!
//! - [`template`]: Placeholder detection and substitution
//! - [`pattern`]: Pattern trees and the artifact-kind registry
//! - [`fill`]: Parameter filling and flattening
//! - [`model`]: Rule declarations (Rule, RuleInput, Directive)
//! - [`graph`]: Reference resolution and dependency ordering
//! - [`planner`]: Target-driven build planning
//! - [`parser`]: YAML definitions and declaration export

pub mod fill;
pub mod graph;
pub mod model;
pub mod parser;
pub mod pattern;
pub mod planner;
pub mod template;

pub use fill::{fill, fill_template, flatten, FilledNode, ParameterSet};
pub use graph::{ResolvedInput, ResolvedRule, RuleGraph, RuleGraphBuilder};
pub use model::{Directive, Rule, RuleInput};
pub use parser::{export_declarations, load_pipeline, parse_pipeline};
pub use pattern::{PatternNode, PatternRegistry};
pub use planner::{BuildPlan, PlannedRule};
