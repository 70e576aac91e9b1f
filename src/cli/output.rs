//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::aggregator::IngestReport;
use crate::annotation::AnnotationOutcome;
use crate::cli::args::{OutputFormat, RetinaArgs};
use crate::engine::SearchResults;
use crate::error::Result;
use crate::feedback::FeedbackOutcome;
use crate::store::StoreStats;

/// A command result that can be shown to a person as well as serialized.
pub trait HumanReadable: Serialize {
    /// Multi-line text for the terminal.
    fn to_human(&self) -> String;
}

/// Output a result in the requested format.
pub fn output_result<T: HumanReadable>(message: &str, result: &T, args: &RetinaArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
                println!();
            }
            print!("{}", result.to_human());
            Ok(())
        }
        OutputFormat::Json => {
            println!("{}", to_json(result, args.pretty)?);
            Ok(())
        }
    }
}

/// Serialize `result` as JSON.
pub fn to_json<T: Serialize>(result: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    Ok(json)
}

impl HumanReadable for SearchResults {
    fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Terms:    {}", self.core_terms.join(", "));
        if !self.expanded_terms.is_empty() {
            let _ = writeln!(out, "Synonyms: {}", self.expanded_terms.join(", "));
        }
        if !self.excluded_terms.is_empty() {
            let _ = writeln!(out, "Excluded: {} (not applied)", self.excluded_terms.join(", "));
        }
        let _ = writeln!(out);

        if self.hits.is_empty() {
            let _ = writeln!(out, "No matching images.");
            return out;
        }
        for (i, hit) in self.hits.iter().enumerate() {
            let _ = writeln!(out, "{:>3}. {:<40} {:.4}", i + 1, hit.filename, hit.score);
        }
        out
    }
}

impl HumanReadable for IngestReport {
    fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Batch:    {}", self.batch_id);
        let _ = writeln!(out, "Indexed:  {} image(s)", self.indexed.len());
        let _ = writeln!(
            out,
            "Rows:     {} inserted, {} replaced, {} skipped",
            self.rows_inserted, self.rows_replaced, self.rows_skipped
        );
        let _ = writeln!(out, "Elapsed:  {} ms", self.elapsed.as_millis());
        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failures:");
            for failure in &self.failures {
                let _ = writeln!(out, "  {}: {}", failure.filename, failure.error);
            }
        }
        out
    }
}

impl HumanReadable for FeedbackOutcome {
    fn to_human(&self) -> String {
        let mut out = String::new();
        if self.is_noop() {
            let _ = writeln!(out, "No features of {} matched the query.", self.filename);
            return out;
        }
        let _ = writeln!(out, "{} feedback for {}:", self.feedback, self.filename);
        for change in &self.changes {
            let _ = writeln!(
                out,
                "  {:<24} {:.4} -> {:.4}",
                change.feature_value, change.old, change.new
            );
        }
        out
    }
}

impl HumanReadable for AnnotationOutcome {
    fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} now has {} sentence(s).",
            self.filename, self.sentences
        );
        if self.recomputed {
            let _ = writeln!(out, "Keywords:");
            for keyword in &self.keywords {
                let _ = writeln!(out, "  {:<24} {:.4}", keyword.term, keyword.score);
            }
        }
        out
    }
}

impl HumanReadable for StoreStats {
    fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Images:       {}", self.images);
        let _ = writeln!(out, "Rows:         {}", self.rows);
        let _ = writeln!(out, "Annotations:  {}", self.annotations);
        let _ = writeln!(out, "WAL records:  {}", self.wal_records);
        if !self.rows_by_type.is_empty() {
            let _ = writeln!(out, "Rows by type:");
            for (feature_type, count) in &self.rows_by_type {
                let _ = writeln!(out, "  {feature_type:<24} {count}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::Feedback;
    use crate::vsm::ScoredImage;

    #[test]
    fn test_search_results_human() {
        let results = SearchResults {
            hits: vec![ScoredImage {
                filename: "a.jpg".to_string(),
                score: 0.9,
            }],
            core_terms: vec!["car".to_string()],
            expanded_terms: vec!["auto".to_string()],
            excluded_terms: vec!["tree".to_string()],
        };

        let text = results.to_human();
        assert!(text.contains("Synonyms: auto"));
        assert!(text.contains("Excluded: tree"));
        assert!(text.contains("a.jpg"));
        assert!(text.contains("0.9000"));
    }

    #[test]
    fn test_empty_search_results_human() {
        let text = SearchResults::default().to_human();
        assert!(text.contains("No matching images."));
    }

    #[test]
    fn test_noop_feedback_human() {
        let outcome = FeedbackOutcome {
            filename: "img.jpg".to_string(),
            feedback: Feedback::Positive,
            changes: Vec::new(),
        };
        assert!(outcome.to_human().contains("No features of img.jpg"));
    }

    #[test]
    fn test_to_json() {
        let stats = StoreStats::default();
        let json = to_json(&stats, false).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"rows\":0"));
        assert!(to_json(&stats, true).unwrap().contains('\n'));
    }
}
