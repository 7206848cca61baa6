//! seqplan - Pattern-Driven Pipeline Planner
//!
//! Expands a small set of path templates, a sample list and a directory
//! configuration into the full set of concrete artifacts a sequencing
//! pipeline must produce, resolves the rules that produce them into an
//! ordered graph, and folds per-sample outputs into cross-sample summaries.
//! Running the rules is left to an external engine.
//!
//! # Architecture
//!
//! - [`workflow`]: Patterns, filling, rule declarations and the rule graph
//! - [`aggregate`]: Library-size table and multi-report input assembly
//! - [`pipeline`]: The built-in RNA-seq pipeline and its terminal targets
//! - [`config`]: Run configuration and sample tables
//! - [`error`]: Error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use seqplan::config::PipelineConfig;
//! use seqplan::pipeline::Pipeline;
//! use seqplan::workflow::BuildPlan;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::load("config.yaml")?;
//!     let params = config.parameters(&config.load_samples()?);
//!
//!     let pipeline = Pipeline::rnaseq()?;
//!     let graph = pipeline.build_graph(&params)?;
//!     let targets = pipeline.terminal_targets(&params)?;
//!
//!     let plan = BuildPlan::for_targets(&graph, &targets, config.max_threads())?;
//!     for planned in plan.rules() {
//!         println!("{} ({} threads)", planned.rule.name, planned.threads);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod workflow;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use workflow::{fill, flatten, ParameterSet, PatternNode, PatternRegistry, RuleGraph};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "seqplan";
