//! Library-Size Table
//!
//! Folds per-sample, per-stage count files into a sample × stage table and
//! a metadata document the report generator renders as a table section.
//!
//! Field derivation is by naming convention, for a count file
//! `<sample_dir>/<sample>/<sample>.<stage>.libsize`:
//! - the sample is the parent directory name
//! - the stage is the file name minus its first `.`-delimited segment and a
//!   known suffix
//! - the value is the file's single count divided by one million
//!
//! Stage names containing further dots are kept whole (`a.b`); nothing
//! beyond the first segment and the suffix is stripped.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::{PipelineError, Result};
use crate::workflow::ResolvedRule;

/// Suffixes stripped from count-file names when deriving the stage label.
pub const LIBSIZE_SUFFIXES: &[&str] = &[".libsize"];

/// Counts are reported in millions of reads.
pub const SCALE: f64 = 1_000_000.0;

/// Identifier of the metadata document's report section.
pub const TABLE_ID: &str = "libsize_table";

/// One parsed count file.
#[derive(Debug, Clone, PartialEq)]
pub struct LibsizeRecord {
    pub sample: String,
    pub stage: String,
    /// Count in millions
    pub value: f64,
}

/// Derives `(sample, stage)` from a count-file path.
///
/// # Example
/// ```
/// use seqplan::aggregate::libsize::parse_libsize_path;
///
/// let (sample, stage) = parse_libsize_path("work/s1/s1.trimmed.libsize").unwrap();
/// assert_eq!(sample, "s1");
/// assert_eq!(stage, "trimmed");
/// ```
pub fn parse_libsize_path(path: &str) -> Result<(String, String)> {
    let parse_error = |reason: &str| PipelineError::ArtifactParse {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let p = Path::new(path);
    let sample = p
        .parent()
        .and_then(|d| d.file_name())
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_error("no parent directory to take the sample name from"))?;

    let file_name = p
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| parse_error("no file name"))?;

    let (_, rest) = file_name
        .split_once('.')
        .ok_or_else(|| parse_error("file name has no '.'-delimited stage"))?;

    let stage = LIBSIZE_SUFFIXES
        .iter()
        .find_map(|suffix| rest.strip_suffix(suffix))
        .unwrap_or(rest);

    if stage.is_empty() {
        return Err(parse_error("empty stage label"));
    }

    Ok((sample.to_string(), stage.to_string()))
}

/// Parses the content of a count file into millions.
///
/// The file holds one non-negative integer read count.
pub fn parse_libsize_value(path: &str, content: &str) -> Result<f64> {
    let text = content.trim();
    if text.is_empty() {
        return Err(PipelineError::ArtifactParse {
            path: path.to_string(),
            reason: "file is empty".to_string(),
        });
    }

    let count: u64 = text.parse().map_err(|_| PipelineError::ArtifactParse {
        path: path.to_string(),
        reason: format!("expected a single integer count, found '{}'", text),
    })?;

    Ok(count as f64 / SCALE)
}

/// Reads and parses one count file.
pub fn read_libsize_record(path: &str) -> Result<LibsizeRecord> {
    let (sample, stage) = parse_libsize_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| PipelineError::ArtifactParse {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let value = parse_libsize_value(path, &content)?;

    Ok(LibsizeRecord {
        sample,
        stage,
        value,
    })
}

/// Sample × stage pivot of library sizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibsizeTable {
    samples: Vec<String>,
    stages: Vec<String>,
    cells: HashMap<(String, String), f64>,
}

impl LibsizeTable {
    /// Pivots records into a table.
    ///
    /// Rows follow `sample_order`; samples missing from it come after, in
    /// first-seen order. Columns follow first-seen stage order. A repeated
    /// `(sample, stage)` pair keeps its first value.
    pub fn from_records(records: &[LibsizeRecord], sample_order: &[String]) -> Self {
        let mut stages: Vec<String> = Vec::new();
        let mut seen_samples: Vec<String> = Vec::new();
        let mut cells = HashMap::new();

        for record in records {
            if !stages.contains(&record.stage) {
                stages.push(record.stage.clone());
            }
            if !seen_samples.contains(&record.sample) {
                seen_samples.push(record.sample.clone());
            }

            let key = (record.sample.clone(), record.stage.clone());
            if cells.contains_key(&key) {
                warn!(
                    "Duplicate library size for sample '{}' stage '{}', keeping the first",
                    record.sample, record.stage
                );
                continue;
            }
            cells.insert(key, record.value);
        }

        let mut samples: Vec<String> = sample_order
            .iter()
            .filter(|s| seen_samples.contains(s))
            .cloned()
            .collect();
        for sample in seen_samples {
            if !samples.contains(&sample) {
                samples.push(sample);
            }
        }

        Self {
            samples,
            stages,
            cells,
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// The cell for a pair, `None` if that pair was never observed.
    pub fn value(&self, sample: &str, stage: &str) -> Option<f64> {
        self.cells
            .get(&(sample.to_string(), stage.to_string()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Writes the table tab-delimited with a `sample` header column.
    /// Unobserved cells are left empty.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        let mut header = vec!["sample".to_string()];
        header.extend(self.stages.iter().cloned());
        wtr.write_record(&header)?;

        for sample in &self.samples {
            let mut row = vec![sample.clone()];
            row.extend(
                self.stages
                    .iter()
                    .map(|stage| self.value(sample, stage).map(format_value).unwrap_or_default()),
            );
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// The report metadata document for this table.
    pub fn metadata(&self) -> LibsizeMetadata {
        let mut data = Mapping::new();
        for sample in &self.samples {
            let mut row = Mapping::new();
            for stage in &self.stages {
                if let Some(v) = self.value(sample, stage) {
                    row.insert(Value::String(stage.clone()), Value::Number(v.into()));
                }
            }
            data.insert(Value::String(sample.clone()), Value::Mapping(row));
        }

        LibsizeMetadata {
            id: TABLE_ID.to_string(),
            section_name: "Library sizes".to_string(),
            description: "Number of reads (millions) per sample at each processing stage"
                .to_string(),
            plot_type: "table".to_string(),
            data,
        }
    }
}

/// Renders a value with at least one decimal place (`1.0`, `0.45`).
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Structured description of the table for the report generator.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LibsizeMetadata {
    pub id: String,
    pub section_name: String,
    pub description: String,
    pub plot_type: String,
    /// sample → stage → value, in table order
    pub data: Mapping,
}

/// Outcome of one aggregation run.
#[derive(Debug)]
pub struct LibsizeAggregation {
    pub table: LibsizeTable,
    /// Files that could not be parsed; their cells stay empty
    pub failures: Vec<PipelineError>,
}

/// Reads every count file and pivots what parses.
///
/// A file that fails to parse only costs its own cell.
pub fn aggregate_libsizes(paths: &[String], sample_order: &[String]) -> LibsizeAggregation {
    let mut records = Vec::with_capacity(paths.len());
    let mut failures = Vec::new();

    for path in paths {
        match read_libsize_record(path) {
            Ok(record) => {
                debug!(
                    "{}: sample '{}' stage '{}' = {}",
                    path, record.sample, record.stage, record.value
                );
                records.push(record);
            }
            Err(e) => {
                warn!("Skipping library size: {}", e);
                failures.push(e);
            }
        }
    }

    info!(
        "Parsed {} of {} library-size files",
        records.len(),
        paths.len()
    );

    LibsizeAggregation {
        table: LibsizeTable::from_records(&records, sample_order),
        failures,
    }
}

/// Writes the delimited table and then the metadata document.
///
/// A table without a single parsed record fails with
/// [`PipelineError::EmptyAggregation`] and writes nothing. Both documents
/// are rendered before either file is touched.
pub fn write_libsize_outputs(
    table: &LibsizeTable,
    table_path: &Path,
    meta_path: &Path,
) -> Result<()> {
    if table.is_empty() {
        return Err(PipelineError::EmptyAggregation);
    }

    let yaml = serde_yaml::to_string(&table.metadata())?;
    let mut tsv = Vec::new();
    table.write_tsv(&mut tsv)?;

    for path in [table_path, meta_path] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(table_path, tsv)?;
    info!("Wrote library-size table: {}", table_path.display());

    fs::write(meta_path, yaml)?;
    info!("Wrote library-size metadata: {}", meta_path.display());

    Ok(())
}

/// Runs the library-size delegate for its resolved rule.
///
/// Count files come from the rule's `counts` input; the table and metadata
/// go to its `table` and `meta` outputs.
pub fn run_libsize_rule(
    rule: &ResolvedRule,
    sample_order: &[String],
) -> Result<LibsizeAggregation> {
    let counts = rule
        .inputs
        .iter()
        .find(|i| i.name == "counts")
        .ok_or_else(|| {
            PipelineError::Definition(format!("rule '{}' has no 'counts' input", rule.name))
        })?;

    let single_output = |name: &str| -> Result<String> {
        match rule.outputs.get(name).map(|n| n.paths()).as_deref() {
            Some([path]) => Ok(path.clone()),
            _ => Err(PipelineError::Definition(format!(
                "rule '{}' needs exactly one '{}' output path",
                rule.name, name
            ))),
        }
    };
    let table_path = single_output("table")?;
    let meta_path = single_output("meta")?;

    let aggregation = aggregate_libsizes(&counts.paths, sample_order);
    write_libsize_outputs(
        &aggregation.table,
        Path::new(&table_path),
        Path::new(&meta_path),
    )?;

    Ok(aggregation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, LIBSIZE_DELEGATE};
    use crate::workflow::{Directive, FilledNode, ParameterSet, ResolvedInput};
    use tempfile::tempdir;

    fn samples() -> Vec<String> {
        vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]
    }

    fn write_counts(root: &Path, values: &[(&str, &str, &str)]) -> Vec<String> {
        values
            .iter()
            .map(|(sample, stage, content)| {
                let dir = root.join(sample);
                fs::create_dir_all(&dir).unwrap();
                let path = dir.join(format!("{}.{}.libsize", sample, stage));
                fs::write(&path, content).unwrap();
                path.to_str().unwrap().to_string()
            })
            .collect()
    }

    fn example_paths(root: &Path) -> Vec<String> {
        write_counts(
            root,
            &[
                ("s1", "raw", "1000000\n"),
                ("s2", "raw", "2000000\n"),
                ("s3", "raw", "500000\n"),
                ("s1", "trimmed", "900000\n"),
                ("s2", "trimmed", "1800000\n"),
                ("s3", "trimmed", "450000\n"),
            ],
        )
    }

    #[test]
    fn test_parse_libsize_path() {
        let (sample, stage) = parse_libsize_path("work/s1/s1.raw.libsize").unwrap();
        assert_eq!(sample, "s1");
        assert_eq!(stage, "raw");
    }

    #[test]
    fn test_parse_libsize_path_keeps_embedded_dots() {
        let (_, stage) = parse_libsize_path("work/s1/s1.aligned.dedup.libsize").unwrap();
        assert_eq!(stage, "aligned.dedup");
    }

    #[test]
    fn test_parse_libsize_path_strips_only_first_segment() {
        // A dotted sample name is split at its first dot.
        let (sample, stage) = parse_libsize_path("work/s.1/s.1.raw.libsize").unwrap();
        assert_eq!(sample, "s.1");
        assert_eq!(stage, "1.raw");
    }

    #[test]
    fn test_parse_libsize_path_errors() {
        assert!(parse_libsize_path("s1.raw.libsize").is_err());
        assert!(parse_libsize_path("work/s1/nodots").is_err());
        assert!(parse_libsize_path("work/s1/s1.libsize").is_err());
    }

    #[test]
    fn test_parse_libsize_value() {
        assert_eq!(parse_libsize_value("f", "1000000\n").unwrap(), 1.0);
        assert_eq!(parse_libsize_value("f", " 450000 ").unwrap(), 0.45);
    }

    #[test]
    fn test_parse_libsize_value_errors() {
        for bad in ["", "  \n", "many reads", "12 34", "-5", "NaN", "1.5", "1e6"] {
            match parse_libsize_value("f.libsize", bad) {
                Err(PipelineError::ArtifactParse { path, .. }) => assert_eq!(path, "f.libsize"),
                other => panic!("expected ArtifactParse for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_example_table() {
        let dir = tempdir().unwrap();
        let paths = example_paths(dir.path());

        let aggregation = aggregate_libsizes(&paths, &samples());
        assert!(aggregation.failures.is_empty());

        let table = aggregation.table;
        assert_eq!(table.samples().to_vec(), samples());
        assert_eq!(table.stages().to_vec(), vec!["raw", "trimmed"]);

        assert_eq!(table.value("s1", "raw"), Some(1.0));
        assert_eq!(table.value("s2", "raw"), Some(2.0));
        assert_eq!(table.value("s3", "raw"), Some(0.5));
        assert_eq!(table.value("s1", "trimmed"), Some(0.9));
        assert_eq!(table.value("s2", "trimmed"), Some(1.8));
        assert_eq!(table.value("s3", "trimmed"), Some(0.45));
    }

    #[test]
    fn test_example_tsv() {
        let dir = tempdir().unwrap();
        let paths = example_paths(dir.path());
        let table = aggregate_libsizes(&paths, &samples()).table;

        let mut buf = Vec::new();
        table.write_tsv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "sample\traw\ttrimmed\ns1\t1.0\t0.9\ns2\t2.0\t1.8\ns3\t0.5\t0.45\n"
        );
    }

    #[test]
    fn test_rows_follow_sample_order() {
        let record = |sample: &str| LibsizeRecord {
            sample: sample.to_string(),
            stage: "raw".to_string(),
            value: 1.0,
        };
        let records = vec![record("b"), record("c"), record("a")];
        let order = vec!["a".to_string(), "b".to_string()];
        let table = LibsizeTable::from_records(&records, &order);
        assert_eq!(table.samples().to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_cell_left_empty() {
        let dir = tempdir().unwrap();
        let mut paths = write_counts(
            dir.path(),
            &[("s1", "raw", "100"), ("s2", "raw", "200"), ("s1", "trimmed", "50")],
        );
        paths.extend(write_counts(dir.path(), &[("s2", "trimmed", "not a number")]));

        let aggregation = aggregate_libsizes(&paths, &samples());
        assert_eq!(aggregation.failures.len(), 1);
        assert!(aggregation.table.value("s2", "trimmed").is_none());

        let mut buf = Vec::new();
        aggregation.table.write_tsv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(2), Some("s2\t0.0002\t"));
    }

    #[test]
    fn test_missing_file_is_a_parse_failure() {
        let paths = vec!["/nonexistent/s1/s1.raw.libsize".to_string()];
        let aggregation = aggregate_libsizes(&paths, &samples());
        assert_eq!(aggregation.failures.len(), 1);
        assert!(aggregation.table.is_empty());
    }

    #[test]
    fn test_metadata_document() {
        let dir = tempdir().unwrap();
        let paths = example_paths(dir.path());
        let table = aggregate_libsizes(&paths, &samples()).table;

        let meta = table.metadata();
        assert_eq!(meta.id, "libsize_table");
        assert_eq!(meta.plot_type, "table");

        let keys: Vec<_> = meta.data.keys().map(|k| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["s1", "s2", "s3"]);

        let yaml = serde_yaml::to_string(&meta).unwrap();
        let parsed: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed["data"]["s3"]["trimmed"].as_f64(), Some(0.45));
        assert_eq!(parsed["section_name"].as_str(), Some("Library sizes"));
    }

    #[test]
    fn test_write_outputs() {
        let dir = tempdir().unwrap();
        let paths = example_paths(&dir.path().join("work"));
        let table = aggregate_libsizes(&paths, &samples()).table;

        let table_path = dir.path().join("agg/libsize_table.tsv");
        let meta_path = dir.path().join("agg/libsize_table_mqc.yaml");
        write_libsize_outputs(&table, &table_path, &meta_path).unwrap();

        assert!(table_path.exists());
        assert!(meta_path.exists());
    }

    #[test]
    fn test_write_outputs_empty_fails() {
        let dir = tempdir().unwrap();
        let table_path = dir.path().join("t.tsv");
        let meta_path = dir.path().join("m.yaml");

        let result = write_libsize_outputs(&LibsizeTable::default(), &table_path, &meta_path);
        assert!(matches!(result, Err(PipelineError::EmptyAggregation)));
        assert!(!table_path.exists());
        assert!(!meta_path.exists());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0), "1.0");
        assert_eq!(format_value(0.45), "0.45");
        assert_eq!(format_value(12.0), "12.0");
    }

    fn rnaseq_params(root: &Path) -> ParameterSet {
        ParameterSet::new(samples())
            .with_root("sample_dir", root.join("work").to_str().unwrap())
            .with_root("aggregation_dir", root.join("agg").to_str().unwrap())
            .with_root("reference_index", "ref/genome")
            .with_root("report_config", "config/multiqc.yaml")
    }

    fn delegate_rule(inputs: Vec<ResolvedInput>, table: &[&str]) -> ResolvedRule {
        let table: Vec<String> = table.iter().map(|p| p.to_string()).collect();
        ResolvedRule {
            name: LIBSIZE_DELEGATE.to_string(),
            inputs,
            outputs: FilledNode::Node(vec![
                ("table".to_string(), FilledNode::from(table)),
                (
                    "meta".to_string(),
                    FilledNode::Leaf(vec!["agg/meta.yaml".to_string()]),
                ),
            ]),
            threads: 1,
            directive: Directive::Delegate(LIBSIZE_DELEGATE.to_string()),
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_run_libsize_rule_on_rnaseq_graph() {
        let dir = tempdir().unwrap();
        let graph = Pipeline::rnaseq()
            .unwrap()
            .build_graph(&rnaseq_params(dir.path()))
            .unwrap();
        let rule = graph.rule(LIBSIZE_DELEGATE).unwrap();
        example_paths(&dir.path().join("work"));

        let aggregation = run_libsize_rule(rule, &samples()).unwrap();
        // aligned counts were never produced
        assert_eq!(aggregation.failures.len(), 3);

        let tsv = fs::read_to_string(dir.path().join("agg/libsize_table.tsv")).unwrap();
        assert_eq!(
            tsv,
            "sample\traw\ttrimmed\ns1\t1.0\t0.9\ns2\t2.0\t1.8\ns3\t0.5\t0.45\n"
        );

        let yaml = fs::read_to_string(dir.path().join("agg/libsize_table_mqc.yaml")).unwrap();
        assert!(yaml.starts_with("id: libsize_table\n"));
        let doc: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc["plot_type"].as_str(), Some("table"));
        assert_eq!(doc["data"]["s2"]["raw"].as_f64(), Some(2.0));
        assert_eq!(doc["data"]["s3"]["trimmed"].as_f64(), Some(0.45));
        assert!(doc["data"]["s1"].get("aligned").is_none());
    }

    #[test]
    fn test_run_libsize_rule_requires_counts_input() {
        let rule = delegate_rule(Vec::new(), &["agg/table.tsv"]);
        match run_libsize_rule(&rule, &samples()) {
            Err(PipelineError::Definition(msg)) => assert!(msg.contains("'counts'")),
            other => panic!("expected Definition, got {:?}", other),
        }
    }

    #[test]
    fn test_run_libsize_rule_requires_single_table_path() {
        let counts = ResolvedInput {
            name: "counts".to_string(),
            paths: Vec::new(),
            from_rule: None,
        };
        let rule = delegate_rule(vec![counts], &["agg/a.tsv", "agg/b.tsv"]);
        match run_libsize_rule(&rule, &samples()) {
            Err(PipelineError::Definition(msg)) => assert!(msg.contains("'table'")),
            other => panic!("expected Definition, got {:?}", other),
        }
    }
}
