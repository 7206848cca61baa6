//! Path Template Placeholders
//!
//! A template is a path string with `{name}` substitution points:
//! - Detects whether a string carries placeholders at all
//! - Extracts placeholder names in first-appearance order
//! - Substitutes concrete values for a placeholder

/// Name of the placeholder expanded once per sample.
pub const SAMPLE: &str = "sample";

/// Checks if a string contains placeholder syntax.
pub fn has_placeholders(text: &str) -> bool {
    !extract_placeholders(text).is_empty()
}

/// Extracts placeholder names from a template.
///
/// Names are returned in the order they first appear; a name used twice is
/// reported once.
///
/// # Example
/// ```
/// use seqplan::workflow::template::extract_placeholders;
///
/// let names = extract_placeholders("{sample_dir}/{sample}/{sample}.bam");
/// assert_eq!(names, vec!["sample_dir", "sample"]);
/// ```
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut in_placeholder = false;
    let mut current_name = String::new();

    for ch in template.chars() {
        match ch {
            '{' => {
                in_placeholder = true;
                current_name.clear();
            }
            '}' => {
                if in_placeholder && !current_name.is_empty() && !names.contains(&current_name) {
                    names.push(current_name.clone());
                }
                current_name.clear();
                in_placeholder = false;
            }
            _ => {
                if in_placeholder {
                    current_name.push(ch);
                }
            }
        }
    }

    names
}

/// Substitutes every occurrence of `{name}` in `text` with `value`.
pub fn substitute(text: &str, name: &str, value: &str) -> String {
    text.replace(&format!("{{{}}}", name), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_placeholders() {
        assert!(has_placeholders("{sample}.fastq"));
        assert!(has_placeholders("output/{id}.txt"));
        assert!(!has_placeholders("regular_file.txt"));
        assert!(!has_placeholders("empty{}braces"));
    }

    #[test]
    fn test_extract_placeholders() {
        let names = extract_placeholders("reads/{sample}.fastq");
        assert_eq!(names, vec!["sample"]);

        let names = extract_placeholders("{id}_{replicate}.txt");
        assert_eq!(names, vec!["id", "replicate"]);
    }

    #[test]
    fn test_extract_placeholders_dedups_in_order() {
        let names = extract_placeholders("{root}/{sample}/{sample}.{stage}.libsize");
        assert_eq!(names, vec!["root", "sample", "stage"]);
    }

    #[test]
    fn test_extract_placeholders_unclosed() {
        assert!(extract_placeholders("reads/{sample.fastq").is_empty());
    }

    #[test]
    fn test_substitute_all_occurrences() {
        let result = substitute("{sample}/{sample}.bam", SAMPLE, "s1");
        assert_eq!(result, "s1/s1.bam");
    }

    #[test]
    fn test_substitute_leaves_other_placeholders() {
        let result = substitute("{root}/{sample}.bam", "root", "/data");
        assert_eq!(result, "/data/{sample}.bam");
    }
}
