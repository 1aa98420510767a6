use crate::aggregate::{
    aggregate_class_means, aggregate_reports, aggregate_runs, AggregateReport, RunSummary,
};
use crate::config::EvalConfig;
use crate::confusion::{aggregate_confusions, ConfusionAggregate};
use crate::datastructure::{SentenceBoundary, TokenSequence};
use crate::error::{EvalError, Result};
use crate::reporter::Reporter;
use crate::score::{CorpusReport, LabelSet};
use serde::{Deserialize, Serialize};

/// A prediction file left out of a batch and the reason why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_id: String,
    pub reason: String,
}

/// Results of many prediction files scored against one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Report of every file that could be scored, in input order.
    pub reports: Vec<(String, CorpusReport)>,
    pub skipped: Vec<SkippedFile>,
    /// Mean sentence match percentage of every scored file.
    pub runs: Vec<(String, f64)>,
    pub run_summary: RunSummary,
    /// Recombined classification table. `None` when no file could be scored.
    pub aggregate: Option<AggregateReport>,
    /// Unweighted per-class means across files. `None` when no file could be scored.
    pub class_means: Option<Reporter>,
    /// Summed confusion matrices. `None` when no file could be scored.
    pub confusion: Option<ConfusionAggregate>,
}

/// Evaluates every prediction file against the same reference. A file that fails is recorded in
/// `skipped` and the batch goes on with the others.
///
/// * `reference`: Gold tokens
/// * `boundaries`: Word count of every sentence of the reference
/// * `predictions`: File identifier and predicted tokens of every file
/// * `labels`: Tags a prediction may legitimately carry
/// * `config`: Evaluation settings, shared by every file
pub fn evaluate_batch(
    reference: &TokenSequence,
    boundaries: &SentenceBoundary,
    predictions: &[(String, TokenSequence)],
    labels: &LabelSet,
    config: &EvalConfig,
) -> Result<BatchReport> {
    if predictions.is_empty() {
        return Err(EvalError::empty("prediction files"));
    }
    let mut reports = Vec::with_capacity(predictions.len());
    let mut skipped = Vec::new();
    for (file_id, prediction) in predictions {
        match crate::evaluate(reference, prediction, boundaries, labels, config) {
            Ok(report) => reports.push((file_id.clone(), report)),
            Err(e) => {
                log::warn!("skipping prediction file {}: {}", file_id, e);
                skipped.push(SkippedFile {
                    file_id: file_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let runs: Vec<(String, f64)> = reports
        .iter()
        .map(|(file_id, report)| (file_id.clone(), report.match_summary().mean))
        .collect();
    let run_summary = aggregate_runs(&runs);
    let (aggregate, class_means, confusion) = if reports.is_empty() {
        (None, None, None)
    } else {
        let tables: Vec<_> = reports.iter().map(|(_, r)| r.report.clone()).collect();
        let matrices: Vec<_> = reports.iter().map(|(_, r)| r.confusion.clone()).collect();
        (
            Some(aggregate_reports(&tables)?),
            Some(aggregate_class_means(&tables)?),
            Some(aggregate_confusions(
                &matrices,
                config.zero_division,
                config.parallel,
            )?),
        )
    };
    log::info!(
        "evaluated {} prediction files, skipped {}",
        reports.len(),
        skipped.len()
    );
    Ok(BatchReport {
        reports,
        skipped,
        runs,
        run_summary,
        aggregate,
        class_means,
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{AlignmentMode, UnmatchedPolicy};
    use crate::reporter::OverallAverage;

    fn sequence(tokens: &[(&str, &str)]) -> TokenSequence {
        tokens.iter().copied().collect()
    }

    #[test]
    fn test_batch_skips_empty_predictions() {
        let reference = sequence(&[("casa", "NOUN"), ("es", "VERB"), ("bon", "ADJ")]);
        let labels = LabelSet::from_reference(&reference, false);
        let boundaries = SentenceBoundary::from_lengths(vec![3]);
        let predictions = vec![
            (
                String::from("run_a"),
                sequence(&[("casa", "NOUN"), ("es", "VERB"), ("bon", "ADJ")]),
            ),
            (String::from("run_b"), TokenSequence::default()),
            (
                String::from("run_c"),
                sequence(&[("casa", "NOUN"), ("es", "ADJ"), ("bon", "ADJ")]),
            ),
        ];
        let config = EvalConfig::new(AlignmentMode::KeyBased(UnmatchedPolicy::Drop));
        let batch = evaluate_batch(&reference, &boundaries, &predictions, &labels, &config).unwrap();
        assert_eq!(batch.reports.len(), 2);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].file_id, "run_b");
        assert!(batch.skipped[0].reason.contains("prediction"));
        assert_eq!(batch.runs[0].1, 100.0);
        assert!((batch.runs[1].1 - 200.0 / 3.0).abs() < 1e-9);
        assert!((batch.run_summary.mean - 250.0 / 3.0).abs() < 1e-9);
        let confusion = batch.confusion.unwrap();
        assert_eq!(confusion.merged, 2);
        assert!((confusion.overall_accuracy - 5.0 / 6.0).abs() < 1e-12);
        let aggregate = batch.aggregate.unwrap();
        let micro = aggregate.report.overall(OverallAverage::Micro).unwrap();
        assert!((micro.recall - 5.0 / 6.0).abs() < 1e-12);
        let verb = batch.class_means.unwrap().class("VERB").unwrap();
        assert_eq!((verb.recall, verb.support), (0.5, 2));
    }

    #[test]
    fn test_batch_where_every_file_fails() {
        let reference = sequence(&[("casa", "NOUN")]);
        let labels = LabelSet::from_reference(&reference, false);
        let predictions = vec![(String::from("run_a"), TokenSequence::default())];
        let batch = evaluate_batch(
            &reference,
            &SentenceBoundary::from_lengths(vec![1]),
            &predictions,
            &labels,
            &EvalConfig::new(AlignmentMode::Positional),
        )
        .unwrap();
        assert!(batch.reports.is_empty());
        assert!(batch.aggregate.is_none());
        assert!(batch.class_means.is_none());
        assert!(batch.confusion.is_none());
        assert_eq!(batch.run_summary, RunSummary::default());
    }

    #[test]
    fn test_batch_without_files() {
        let reference = sequence(&[("casa", "NOUN")]);
        let res = evaluate_batch(
            &reference,
            &SentenceBoundary::from_lengths(vec![1]),
            &[],
            &LabelSet::from_reference(&reference, false),
            &EvalConfig::new(AlignmentMode::Positional),
        );
        assert_eq!(res, Err(EvalError::EmptyInput(String::from("prediction files"))));
    }
}
