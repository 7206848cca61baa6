//! seqplan CLI Entry Point
//!
//! Provides the command-line interface for resolving and aggregating a
//! pipeline run.
//!
//! # Usage
//!
//! ```bash
//! # List every artifact the run must produce
//! seqplan targets
//!
//! # Show the rules needed for the full run, in dependency order
//! seqplan plan
//!
//! # Only what one sample's counts need
//! seqplan plan work/s1/s1.counts.tsv
//!
//! # Hand the resolved rules to the execution engine
//! seqplan export --output rules.json
//!
//! # Build the library-size table once the count files exist
//! seqplan --config run.yaml libsize-table
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};

use seqplan::aggregate::libsize::run_libsize_rule;
use seqplan::aggregate::report::MultiReport;
use seqplan::config::PipelineConfig;
use seqplan::pipeline::{Pipeline, LIBSIZE_DELEGATE};
use seqplan::workflow::{export_declarations, load_pipeline, BuildPlan, Directive, RuleGraph};
use seqplan::{ParameterSet, PipelineError, APP_NAME, VERSION};

/// Default configuration file used when none is specified.
const DEFAULT_CONFIG: &str = "config.yaml";

/// Name of the built-in combined report rule.
const REPORT_RULE: &str = "multiqc";

#[derive(Parser, Debug)]
#[clap(name = "seqplan", version, about = "Pattern-driven planner for sequencing pipelines")]
struct Cli {
    /// Run configuration file
    #[clap(long, short, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Enable debug logging
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the terminal target set, one path per line
    Targets,

    /// Print the rules needed for the given targets (default: all terminal targets)
    Plan {
        targets: Vec<String>,
    },

    /// Write resolved rule declarations for the execution engine
    Export {
        /// Output file; `.json` writes JSON, anything else YAML
        #[clap(long, short)]
        output: PathBuf,
    },

    /// Aggregate per-sample library sizes into a table and report metadata
    LibsizeTable,

    /// Print the deduplicated input list of the combined report
    ReportInputs {
        /// Report rule name
        #[clap(long, default_value = REPORT_RULE)]
        rule: String,
    },
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Everything a subcommand needs, loaded once.
struct Session {
    config: PipelineConfig,
    samples: Vec<String>,
    params: ParameterSet,
    pipeline: Pipeline,
}

impl Session {
    fn load(path: &Path) -> Result<Self, PipelineError> {
        let config = PipelineConfig::load(path)?;
        let samples = config.load_samples()?;
        let params = config.parameters(&samples);

        let pipeline = match &config.definition {
            Some(definition) => load_pipeline(definition)?,
            None => {
                info!("Using built-in RNA-seq pipeline");
                Pipeline::rnaseq()?
            }
        };

        Ok(Self {
            config,
            samples,
            params,
            pipeline,
        })
    }

    fn graph(&self) -> Result<RuleGraph, PipelineError> {
        self.pipeline.build_graph(&self.params)
    }
}

fn print_targets(session: &Session) -> Result<(), PipelineError> {
    for path in session.pipeline.terminal_targets(&session.params)? {
        println!("{}", path);
    }
    Ok(())
}

fn print_plan(session: &Session, targets: Vec<String>) -> Result<(), PipelineError> {
    let graph = session.graph()?;
    let targets = if targets.is_empty() {
        session.pipeline.terminal_targets(&session.params)?
    } else {
        targets
    };

    let plan = BuildPlan::for_targets(&graph, &targets, session.config.max_threads())?;

    println!();
    println!(
        "{} {} rules for {} targets ({} samples, max {} threads)",
        "Plan:".bold(),
        plan.len(),
        targets.len(),
        session.samples.len(),
        plan.max_threads()
    );
    println!();

    for (i, planned) in plan.rules().iter().enumerate() {
        let rule = planned.rule;
        let label = match &rule.directive {
            Directive::Delegate(_) => rule.directive.label().yellow(),
            _ => rule.directive.label().cyan(),
        };
        println!(
            "{:>3}. {} [{}] {}",
            i + 1,
            rule.name.green().bold(),
            format!("{} threads", planned.threads).dimmed(),
            label
        );
        if !rule.dependencies.is_empty() {
            println!("     after: {}", rule.dependencies.join(", "));
        }
        println!("     outputs: {}", rule.output_paths().len());
    }

    println!();
    println!("Total thread hints: {}", plan.total_threads());
    Ok(())
}

fn export(session: &Session, output: &Path) -> Result<(), PipelineError> {
    let graph = session.graph()?;
    let targets = session.pipeline.terminal_targets(&session.params)?;
    export_declarations(&graph, &targets, output)
}

fn libsize_table(session: &Session) -> Result<(), PipelineError> {
    let graph = session.graph()?;
    let rule = graph
        .rules()
        .iter()
        .find(|r| r.directive == Directive::Delegate(LIBSIZE_DELEGATE.to_string()))
        .ok_or_else(|| {
            PipelineError::Definition(format!(
                "no rule delegates to '{}' in this pipeline",
                LIBSIZE_DELEGATE
            ))
        })?;

    let aggregation = run_libsize_rule(rule, &session.samples)?;

    if !aggregation.failures.is_empty() {
        warn!(
            "{} library-size files could not be parsed; their cells are empty",
            aggregation.failures.len()
        );
    }
    println!(
        "{} {} samples × {} stages",
        "Library sizes:".bold(),
        aggregation.table.samples().len(),
        aggregation.table.stages().len()
    );
    Ok(())
}

fn report_inputs(session: &Session, rule: &str) -> Result<(), PipelineError> {
    let graph = session.graph()?;
    let rule = graph
        .rule(rule)
        .ok_or_else(|| PipelineError::Definition(format!("no rule named '{}'", rule)))?;

    let report = MultiReport::from_rule(rule)?;
    info!("Report configuration: {}", report.config);
    info!("Report output: {}", report.output);
    report.write_file_list(std::io::stdout().lock())
}

/// Main application entry point.
fn run(cli: Cli) -> Result<(), PipelineError> {
    info!("{} v{}", APP_NAME, VERSION);

    let session = Session::load(&cli.config)?;

    match cli.command {
        Command::Targets => print_targets(&session),
        Command::Plan { targets } => print_plan(&session, targets),
        Command::Export { output } => export(&session, &output),
        Command::LibsizeTable => libsize_table(&session),
        Command::ReportInputs { rule } => report_inputs(&session, &rule),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
