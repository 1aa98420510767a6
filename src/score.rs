/**
This module scores an aligned pair: token and sentence accuracy, per-sentence match percentages,
the per-class table with its averages, the confusion matrix and the most frequent
misclassifications. Tokens are scored only when both their gold and their predicted tag are in
the label set. The others are reported and kept out of precision, recall, f-score and accuracy.
*/
use crate::aggregate::RunSummary;
use crate::config::EvalConfig;
use crate::confusion::ConfusionMatrix;
use crate::datastructure::{AlignedPair, AlignedTag, LengthMismatch, TokenSequence};
use crate::error::{EvalError, Result};
use crate::metrics::{
    accuracy, balanced_accuracy, precision_recall_fscore_support, safe_ratio, ItemArrayExt,
};
use crate::reporter::{Accuracy, Average, ClassMetricsInner, OverallAverage, Reporter};
use ahash::{random_state::RandomState, HashMap as AHashMap};
use enum_iterator::all;
use itertools::Itertools;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Closed set of tags a prediction is scored against, kept in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LabelSet {
    labels: BTreeSet<String>,
}

impl LabelSet {
    /// Tags observed in the reference sequence. With `drop_missing`, the `missing` sentinel is
    /// not a label even if the reference contains it, and reference tokens tagged `missing` are
    /// then left out of scoring by `score`.
    ///
    /// This only looks at the reference. A label set built from the reference tokens whose
    /// *prediction* is not `missing` can be collected with `FromIterator` instead. Predictions
    /// tagged `missing` are unknown tags whenever `missing` is not a label, so they are never
    /// scored in either case.
    pub fn from_reference(reference: &TokenSequence, drop_missing: bool) -> Self {
        reference
            .iter()
            .filter(|t| !(drop_missing && t.is_missing()))
            .map(|t| t.tag.clone())
            .collect()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.labels.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    fn to_vec(&self) -> Vec<String> {
        self.labels.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Share of correctly tagged tokens in one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentenceScore {
    pub sentence_id: usize,
    pub tokens: usize,
    pub correct: usize,
    /// `correct / tokens`, in percent.
    pub match_percentage: f64,
}

impl SentenceScore {
    /// A sentence without any aligned tag matches at 0%.
    fn from_tags(sentence_id: usize, tags: &[AlignedTag]) -> Self {
        let correct = tags.iter().filter(|t| t.is_correct()).count();
        let match_percentage = if tags.is_empty() {
            0.0
        } else {
            correct as f64 / tags.len() as f64 * 100.0
        };
        Self {
            sentence_id,
            tokens: tags.len(),
            correct,
            match_percentage,
        }
    }

    /// Every token is correct. False for a sentence without any aligned tag.
    pub fn is_fully_correct(&self) -> bool {
        self.tokens > 0 && self.correct == self.tokens
    }
}

/// A (gold, predicted) pair of distinct tags and how often it occurs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Misclassification {
    pub gold: String,
    pub predicted: String,
    pub count: usize,
}

/// Everything measured on one prediction file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusReport {
    /// Tokens in the aligned pair.
    pub aligned_tokens: usize,
    /// Aligned tokens left once unknown predicted tags and gold tags outside the label set are
    /// excluded.
    pub scored_tokens: usize,
    /// Correct tokens over all aligned tokens, unknown predictions included.
    pub token_accuracy: f64,
    /// Share of sentences whose tokens are all correct.
    pub sentence_accuracy: f64,
    /// One score per sentence of the boundaries, in order.
    pub sentences: Vec<SentenceScore>,
    /// Accuracy over the scored tokens.
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub report: Reporter,
    pub confusion: ConfusionMatrix,
    pub top_errors: Vec<Misclassification>,
    pub unknown_tags: BTreeSet<String>,
    pub unknown_count: usize,
    /// Gold tags that are not labels, such as `missing` once dropped from the label set.
    pub unlabelled_gold_tags: BTreeSet<String>,
    /// Tokens left out because of their gold tag. Not counted in `unknown_count`.
    pub unlabelled_gold_count: usize,
    pub length_mismatch: Option<LengthMismatch>,
    pub unmatched_reference: usize,
    pub unmatched_prediction: usize,
}

impl CorpusReport {
    /// Mean and population standard deviation of the per-sentence match percentages.
    pub fn match_summary(&self) -> RunSummary {
        let values: Array1<f64> = self.sentences.iter().map(|s| s.match_percentage).collect();
        RunSummary::from_values(&values)
    }
}

/// Scores an aligned pair against a label set.
///
/// * `aligned`: Output of `align`
/// * `labels`: Tags a prediction may legitimately carry, usually the reference tags
/// * `config`: Division by zero strategy, number of misclassifications kept and parallelism
pub fn score(aligned: &AlignedPair, labels: &LabelSet, config: &EvalConfig) -> Result<CorpusReport> {
    if labels.is_empty() {
        return Err(EvalError::empty("label set"));
    }
    let strat = config.zero_division;
    let label_vec = labels.to_vec();
    let all_pairs = || {
        aligned
            .iter()
            .map(|t| (t.gold.as_str(), t.predicted.as_deref()))
    };

    let mut unknown_tags = BTreeSet::new();
    let mut unknown_count = 0;
    let mut unlabelled_gold_tags = BTreeSet::new();
    let mut unlabelled_gold_count = 0;
    let mut known = Vec::with_capacity(aligned.len());
    for (gold, predicted) in all_pairs() {
        match predicted {
            _ if !labels.contains(gold) => {
                unlabelled_gold_count += 1;
                unlabelled_gold_tags.insert(String::from(gold));
            }
            Some(p) if !labels.contains(p) => {
                unknown_count += 1;
                unknown_tags.insert(String::from(p));
            }
            _ => known.push((gold, predicted)),
        }
    }
    if unknown_count > 0 {
        log::info!(
            "excluded {} tokens with unknown predicted tags: {:?}",
            unknown_count,
            unknown_tags
        );
    }
    if unlabelled_gold_count > 0 {
        log::info!(
            "excluded {} tokens whose gold tag is not a label: {:?}",
            unlabelled_gold_count,
            unlabelled_gold_tags
        );
    }

    let sentences: Vec<SentenceScore> = aligned
        .iter_sentences()
        .enumerate()
        .map(|(sentence_id, tags)| SentenceScore::from_tags(sentence_id, tags))
        .collect();
    let fully_correct = sentences.iter().filter(|s| s.is_fully_correct()).count();

    let accuracy_value = accuracy(known.iter().copied(), strat);
    let report = class_report(&known, &label_vec, accuracy_value, config)?;

    let top_errors = all_pairs()
        .filter_map(|(gold, predicted)| predicted.map(|p| (gold, p)))
        .filter(|(gold, predicted)| gold != predicted)
        .fold(
            AHashMap::with_capacity_and_hasher(label_vec.len(), RandomState::new()),
            |mut counts: AHashMap<(&str, &str), usize>, pair| {
                *counts.entry(pair).or_default() += 1;
                counts
            },
        )
        .into_iter()
        .sorted_by(|(a, count_a), (b, count_b)| count_b.cmp(count_a).then_with(|| a.cmp(b)))
        .take(config.top_k)
        .map(|((gold, predicted), count)| Misclassification {
            gold: String::from(gold),
            predicted: String::from(predicted),
            count,
        })
        .collect();

    log::debug!(
        "scored {} of {} aligned tokens over {} sentences",
        known.len(),
        aligned.len(),
        sentences.len()
    );
    Ok(CorpusReport {
        aligned_tokens: aligned.len(),
        scored_tokens: known.len(),
        token_accuracy: accuracy(all_pairs(), strat),
        sentence_accuracy: safe_ratio(fully_correct, sentences.len(), strat),
        sentences,
        accuracy: accuracy_value,
        balanced_accuracy: balanced_accuracy(known.iter().copied(), strat),
        report,
        confusion: ConfusionMatrix::from_pairs(all_pairs(), &label_vec),
        top_errors,
        unknown_tags,
        unknown_count,
        unlabelled_gold_tags,
        unlabelled_gold_count,
        length_mismatch: aligned.length_mismatch(),
        unmatched_reference: aligned.unmatched_reference(),
        unmatched_prediction: aligned.unmatched_prediction(),
    })
}

/// Per-class rows, the three overall averages and the accuracy row.
fn class_report(
    pairs: &[(&str, Option<&str>)],
    labels: &[String],
    accuracy_value: f64,
    config: &EvalConfig,
) -> Result<Reporter> {
    let mut reporter = Reporter::default();
    let (precision, recall, fscore, support) = precision_recall_fscore_support(
        pairs.iter().copied(),
        labels,
        Average::None,
        config.zero_division,
        config.parallel,
    )?;
    for (i, label) in labels.iter().enumerate() {
        reporter.insert(ClassMetricsInner::new_class(
            label.as_str(),
            precision[i],
            recall[i],
            fscore[i],
            support[i],
        ));
    }
    for average in all::<OverallAverage>() {
        let (p, r, f, s) = precision_recall_fscore_support(
            pairs.iter().copied(),
            labels,
            average.into(),
            config.zero_division,
            config.parallel,
        )?;
        reporter.insert(ClassMetricsInner::new_overall(
            average,
            p.item()?,
            r.item()?,
            f.item()?,
            s.item()?,
        ));
    }
    reporter.set_accuracy(Some(Accuracy {
        value: accuracy_value,
        support: pairs.len(),
    }));
    Ok(reporter)
}
