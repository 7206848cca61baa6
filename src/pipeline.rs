//! Pipeline Definitions
//!
//! A [`Pipeline`] bundles the three things a run is built from: the pattern
//! registry, the rule declarations and the artifact kinds that make up the
//! terminal target set. [`Pipeline::rnaseq`] is the built-in RNA-seq
//! definition; other definitions are loaded from YAML by
//! [`crate::workflow::parser`].

use log::info;

use crate::aggregate::report::union_paths;
use crate::error::Result;
use crate::workflow::{
    fill, Directive, FilledNode, ParameterSet, PatternNode, PatternRegistry, Rule, RuleGraph,
    RuleGraphBuilder, RuleInput,
};

/// Name of the delegate directive handled by [`crate::aggregate::libsize`].
pub const LIBSIZE_DELEGATE: &str = "libsize_table";

/// Everything needed to expand a pipeline for a parameter set.
#[derive(Debug)]
pub struct Pipeline {
    registry: PatternRegistry,
    rules: RuleGraphBuilder,
    targets: Vec<String>,
}

impl Pipeline {
    /// # Arguments
    ///
    /// * `registry` - Artifact-kind patterns
    /// * `rules` - Rule declarations (unresolved)
    /// * `targets` - Kind paths whose filled paths form the terminal target set
    pub fn new(registry: PatternRegistry, rules: RuleGraphBuilder, targets: Vec<String>) -> Self {
        Self {
            registry,
            rules,
            targets,
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn declarations(&self) -> &RuleGraphBuilder {
        &self.rules
    }

    pub fn target_kinds(&self) -> &[String] {
        &self.targets
    }

    /// Fills one artifact kind (or dotted sub-kind).
    pub fn fill_kind(&self, kind: &str, params: &ParameterSet) -> Result<FilledNode> {
        fill(self.registry.lookup(kind)?, params)
    }

    /// The union of all target kinds' paths, first occurrence kept.
    pub fn terminal_targets(&self, params: &ParameterSet) -> Result<Vec<String>> {
        let filled = self
            .targets
            .iter()
            .map(|kind| self.fill_kind(kind, params))
            .collect::<Result<Vec<_>>>()?;
        let targets = union_paths(&filled);
        info!(
            "Terminal target set: {} paths from {} kinds",
            targets.len(),
            self.targets.len()
        );
        Ok(targets)
    }

    /// Resolves the declarations into a rule graph.
    pub fn build_graph(&self, params: &ParameterSet) -> Result<RuleGraph> {
        self.rules.build(params)
    }

    /// The built-in RNA-seq pipeline: trimming, alignment, quantification,
    /// read QC at three stages, library sizes and a combined report.
    ///
    /// Expects the parameters `sample_dir`, `aggregation_dir`,
    /// `reference_index` and `report_config`.
    pub fn rnaseq() -> Result<Self> {
        let registry = rnaseq_patterns()?;
        let p = |kind: &str| -> Result<PatternNode> { Ok(registry.lookup(kind)?.clone()) };

        let mut rules = RuleGraphBuilder::new();
        rules
            .declare(
                Rule::new(
                    "trim_reads",
                    Directive::adapter_with_params("bio/cutadapt/se", "-q 20 -m 20"),
                )
                .with_input("reads", p("reads")?)
                .with_output("reads", p("trimmed")?)
                .with_output("log", p("logs.trim")?)
                .with_threads(4),
            )
            .declare(
                Rule::new("align_reads", Directive::adapter("bio/star/align"))
                    .with_input("reads", RuleInput::output("trim_reads", "reads"))
                    .with_input("index", p("reference_index")?)
                    .with_output("bam", p("bam")?)
                    .with_output("log", p("logs.align")?)
                    .with_threads(8),
            )
            .declare(
                Rule::new(
                    "quantify",
                    Directive::adapter_with_params("bio/subread/featurecounts", "-s 0"),
                )
                .with_input("bam", RuleInput::output("align_reads", "bam"))
                .with_output("counts", p("counts")?)
                .with_output("log", p("logs.quant")?)
                .with_threads(4),
            )
            .declare(
                Rule::new("fastqc_raw", Directive::adapter("bio/fastqc"))
                    .with_input("reads", p("reads")?)
                    .with_output("zip", p("fastqc.raw")?),
            )
            .declare(
                Rule::new("fastqc_trimmed", Directive::adapter("bio/fastqc"))
                    .with_input("reads", RuleInput::output("trim_reads", "reads"))
                    .with_output("zip", p("fastqc.trimmed")?),
            )
            .declare(
                Rule::new("fastqc_aligned", Directive::adapter("bio/fastqc"))
                    .with_input("bam", RuleInput::output("align_reads", "bam"))
                    .with_output("zip", p("fastqc.aligned")?),
            )
            .declare(
                Rule::new("libsize_raw", Directive::Shell(FASTQ_COUNT.to_string()))
                    .with_input("reads", p("reads")?)
                    .with_output("count", p("libsize.raw")?),
            )
            .declare(
                Rule::new("libsize_trimmed", Directive::Shell(FASTQ_COUNT.to_string()))
                    .with_input("reads", RuleInput::output("trim_reads", "reads"))
                    .with_output("count", p("libsize.trimmed")?),
            )
            .declare(
                Rule::new("libsize_aligned", Directive::Shell(BAM_COUNT.to_string()))
                    .with_input("bam", RuleInput::output("align_reads", "bam"))
                    .with_output("count", p("libsize.aligned")?),
            )
            .declare(
                // Edges to the libsize_* rules come from matching their outputs.
                Rule::new(LIBSIZE_DELEGATE, Directive::Delegate(LIBSIZE_DELEGATE.to_string()))
                    .with_input("counts", p("libsize")?)
                    .with_output("table", p("aggregate.libsize_table")?)
                    .with_output("meta", p("aggregate.libsize_meta")?),
            )
            .declare(
                Rule::new("multiqc", Directive::adapter("bio/multiqc"))
                    .with_input("qc", p("fastqc")?)
                    .with_input("logs", p("logs")?)
                    .with_input("alignment", RuleInput::output("align_reads", "log"))
                    .with_input("counts", RuleInput::output("quantify", "counts"))
                    .with_input("libsize", RuleInput::output(LIBSIZE_DELEGATE, "meta"))
                    .with_input("config", p("report_config")?)
                    .with_output("report", p("aggregate.report")?),
            );

        let targets = vec!["counts".to_string(), "aggregate".to_string()];

        Ok(Self::new(registry, rules, targets))
    }
}

const FASTQ_COUNT: &str = "echo $(( $(zcat {input} | wc -l) / 4 )) > {output}";
const BAM_COUNT: &str = "samtools view -c -F 0x904 {input} > {output}";

fn rnaseq_patterns() -> Result<PatternRegistry> {
    const SAMPLE_ROOT: &str = "{sample_dir}/{sample}";

    let per_sample = |suffix: &str| PatternNode::leaf(format!("{}/{}", SAMPLE_ROOT, suffix));

    PatternRegistry::builder()
        .register("reads", per_sample("{sample}.fastq.gz"))
        .register("trimmed", per_sample("{sample}.trimmed.fastq.gz"))
        .register("bam", per_sample("{sample}.bam"))
        .register("counts", per_sample("{sample}.counts.tsv"))
        .register(
            "logs",
            PatternNode::node([
                ("trim", per_sample("logs/{sample}.trim.log")),
                ("align", per_sample("logs/{sample}.align.log")),
                ("quant", per_sample("logs/{sample}.quant.log")),
            ]),
        )
        .register(
            "fastqc",
            PatternNode::node([
                ("raw", per_sample("fastqc/{sample}_fastqc.zip")),
                ("trimmed", per_sample("fastqc/{sample}.trimmed_fastqc.zip")),
                ("aligned", per_sample("fastqc/{sample}.aligned_fastqc.zip")),
            ]),
        )
        .register(
            "libsize",
            PatternNode::node([
                ("raw", per_sample("{sample}.raw.libsize")),
                ("trimmed", per_sample("{sample}.trimmed.libsize")),
                ("aligned", per_sample("{sample}.aligned.libsize")),
            ]),
        )
        .register(
            "aggregate",
            PatternNode::node([
                ("libsize_table", PatternNode::leaf("{aggregation_dir}/libsize_table.tsv")),
                ("libsize_meta", PatternNode::leaf("{aggregation_dir}/libsize_table_mqc.yaml")),
                ("report", PatternNode::leaf("{aggregation_dir}/multiqc_report.html")),
            ]),
        )
        .register("reference_index", "{reference_index}")
        .register("report_config", "{report_config}")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::report::dedup_paths;
    use crate::workflow::BuildPlan;

    fn params() -> ParameterSet {
        ParameterSet::new(["s1", "s2", "s3"])
            .with_root("sample_dir", "work")
            .with_root("aggregation_dir", "agg")
            .with_root("reference_index", "ref/genome")
            .with_root("report_config", "config/multiqc.yaml")
    }

    #[test]
    fn test_rnaseq_graph_builds() {
        let pipeline = Pipeline::rnaseq().unwrap();
        let graph = pipeline.build_graph(&params()).unwrap();

        assert_eq!(graph.len(), 11);
        assert_eq!(graph.rules()[0].name, "trim_reads");
        assert_eq!(graph.rules().last().unwrap().name, "multiqc");
    }

    #[test]
    fn test_libsize_table_depends_on_all_count_rules() {
        let graph = Pipeline::rnaseq().unwrap().build_graph(&params()).unwrap();
        let deps = graph.dependencies(LIBSIZE_DELEGATE).unwrap();

        assert_eq!(deps.len(), 3);
        for name in ["libsize_raw", "libsize_trimmed", "libsize_aligned"] {
            assert!(deps.iter().any(|d| d == name), "missing {}", name);
        }
    }

    #[test]
    fn test_terminal_targets() {
        let pipeline = Pipeline::rnaseq().unwrap();
        let targets = pipeline.terminal_targets(&params()).unwrap();

        assert_eq!(targets.len(), 3 + 3);
        assert_eq!(targets[0], "work/s1/s1.counts.tsv");
        assert!(targets.contains(&"agg/libsize_table.tsv".to_string()));
        assert!(targets.contains(&"agg/libsize_table_mqc.yaml".to_string()));
        assert!(targets.contains(&"agg/multiqc_report.html".to_string()));
    }

    #[test]
    fn test_full_target_plan_covers_every_rule() {
        let pipeline = Pipeline::rnaseq().unwrap();
        let params = params();
        let graph = pipeline.build_graph(&params).unwrap();
        let targets = pipeline.terminal_targets(&params).unwrap();

        let plan = BuildPlan::for_targets(&graph, &targets, 8).unwrap();
        assert_eq!(plan.len(), graph.len());
    }

    #[test]
    fn test_count_target_skips_report_rules() {
        let pipeline = Pipeline::rnaseq().unwrap();
        let graph = pipeline.build_graph(&params()).unwrap();

        let plan =
            BuildPlan::for_targets(&graph, &["work/s2/s2.counts.tsv".to_string()], 8).unwrap();
        let names: Vec<_> = plan.rules().iter().map(|p| p.rule.name.as_str()).collect();
        assert_eq!(names, vec!["trim_reads", "align_reads", "quantify"]);
    }

    #[test]
    fn test_missing_root_fails_graph() {
        let pipeline = Pipeline::rnaseq().unwrap();
        let params = ParameterSet::new(["s1"]).with_root("sample_dir", "work");
        assert!(pipeline.build_graph(&params).is_err());
    }

    #[test]
    fn test_report_inputs_contain_duplicates_before_dedup() {
        let graph = Pipeline::rnaseq().unwrap().build_graph(&params()).unwrap();
        let report = graph.rule("multiqc").unwrap();
        let all = report.input_paths();
        let unique = dedup_paths(all.clone());

        // align logs arrive through both the logs pattern and align_reads.log
        assert_eq!(all.len() - unique.len(), 3);
    }
}
