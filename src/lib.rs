/*!
This library evaluates part-of-speech taggers against a hand-annotated reference, sentence by
sentence. It was written for historical Occitan texts, where the predicted and the reference
tokens are produced independently and do not always agree on tokenization, but nothing in it is
specific to a language or a tag set.

# Pipeline
* `segment` reads the sentence boundaries: one sentence per line, its length being its number of
    whitespace-separated words.
* `align` pairs the predicted tokens with the reference tokens, sentence by sentence, by
    position, by exact token string or by token string similarity. The mode is always explicit.
* `score` computes the token and sentence accuracies, the per-class precision, recall, f-score
    and support with their micro, macro and weighted averages, the accuracy, the balanced
    accuracy, the confusion matrix and the most frequent misclassifications.
* `aggregate_runs`, `aggregate_reports`, `aggregate_class_means` and `aggregate_confusions`
    combine the results of many prediction files. `evaluate_batch` runs the whole pipeline over many files.

# Terminology
* A label (or tag) is a part-of-speech class such as `NOUN` or `VERB`. The label set is usually
    the set of tags observed in the reference.
* An unknown tag is a predicted tag outside the label set. Tokens carrying one are reported and
    left out of precision, recall, f-score and accuracy, and out of the confusion matrix.
* A gold tag outside the label set leaves its token out of scoring too. It is reported apart
    from the unknown predicted tags.
* The support of a label is its number of occurrences in the reference tokens that were scored.
* `missing` is the tag written by the tagging client when it could not tag a word. It is an
    ordinary label unless it is not part of the label set.
*/

mod aggregate;
mod align;
mod batch;
mod config;
mod confusion;
mod datastructure;
mod error;
mod metrics;
mod reporter;
mod score;
mod segment;

// The public api starts here
pub use aggregate::{
    aggregate_class_means, aggregate_reports, aggregate_runs, AggregateReport, RunSummary,
};

pub use align::{align, AlignmentMode, UnmatchedPolicy, DEFAULT_FUZZY_THRESHOLD};

pub use batch::{evaluate_batch, BatchReport, SkippedFile};

pub use config::{EvalConfig, EvalConfigBuilder, DEFAULT_TOP_K};

pub use confusion::{aggregate_confusions, ConfusionAggregate, ConfusionMatrix, SkippedMatrix};

pub use datastructure::{
    AlignedPair, AlignedTag, LengthMismatch, SentenceBoundary, SentencesIter, Token,
    TokenSequence,
};

pub use error::{EvalError, Result};

pub use metrics::{
    accuracy, balanced_accuracy, precision_recall_fscore_support, DivByZeroStrat,
    PrecisionRecallFScoreTrueSum,
};

pub use reporter::{Accuracy, Average, ClassMetrics, OverallAverage, ReportRow, Reporter};

pub use score::{score, CorpusReport, LabelSet, Misclassification, SentenceScore};

pub use segment::segment;

/// Main entrypoint of the library. Aligns the prediction on the reference with the mode of
/// `config`, then scores the aligned pair against `labels`.
///
/// * `reference`: Gold tokens
/// * `prediction`: Predicted tokens
/// * `boundaries`: Word count of every sentence, see `segment`
/// * `labels`: Tags a prediction may legitimately carry
/// * `config`: Evaluation settings
///
/// # Example
/// ```rust
/// use tageval::{evaluate, segment, AlignmentMode, EvalConfig, LabelSet, TokenSequence};
///
/// let reference = TokenSequence::from(vec![("casa", "NOUN"), ("es", "VERB"), ("bon", "ADJ")]);
/// let prediction = TokenSequence::from(vec![("casa", "NOUN"), ("es", "AUX"), ("bon", "ADJ")]);
/// let boundaries = segment("casa es bon\n").unwrap();
/// let labels: LabelSet = ["NOUN", "VERB", "ADJ", "AUX"].into_iter().collect();
/// let config = EvalConfig::new(AlignmentMode::Positional);
///
/// let report = evaluate(&reference, &prediction, &boundaries, &labels, &config).unwrap();
/// assert!((report.token_accuracy - 2.0 / 3.0).abs() < 1e-12);
/// assert_eq!(report.sentence_accuracy, 0.0);
/// assert_eq!(report.top_errors[0].gold, "VERB");
/// ```
pub fn evaluate(
    reference: &TokenSequence,
    prediction: &TokenSequence,
    boundaries: &SentenceBoundary,
    labels: &LabelSet,
    config: &EvalConfig,
) -> Result<CorpusReport> {
    let aligned = align(reference, prediction, boundaries, config.mode())?;
    score(&aligned, labels, config)
}
