/**
This module computes the classification metrics (precision, recall, f-score, support, accuracy and
balanced accuracy) of gold tags against predicted tags, over an explicit ordered list of labels.
*/
use crate::error::{EvalError, Result};
use crate::reporter::Average;
use ahash::{random_state::RandomState, HashMap as AHashMap};
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_stats::SummaryStatisticsExt;
use num::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNotUniqueOrEmpty(usize);

impl Display for ArrayNotUniqueOrEmpty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "This array contains more than one element or is empty. It has length: {} Cannot call `item` on it", self.0
        )
    }
}
impl std::error::Error for ArrayNotUniqueOrEmpty {}

pub(crate) trait ItemArrayExt<Output> {
    /// Returns the element out of a one-element array.
    fn item(&self) -> std::result::Result<Output, ArrayNotUniqueOrEmpty>;
}

impl<F: Clone> ItemArrayExt<F> for Array1<F> {
    fn item(&self) -> std::result::Result<F, ArrayNotUniqueOrEmpty> {
        match self.len() {
            1 => Ok(self[0].clone()),
            n => Err(ArrayNotUniqueOrEmpty(n)),
        }
    }
}

impl From<ArrayNotUniqueOrEmpty> for EvalError {
    fn from(value: ArrayNotUniqueOrEmpty) -> Self {
        EvalError::ShapeMismatch {
            expected: String::from("a single value"),
            found: format!("{} values", value.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
/// Value of a ratio whose denominator is zero, e.g. the precision of a label that was never
/// predicted. Neither strategy ever produces an error or a NaN.
pub enum DivByZeroStrat {
    /// The ratio is 0. This is what the evaluation scripts of the corpus use.
    #[default]
    ReplaceBy0,
    /// The ratio is 1.
    ReplaceBy1,
}

impl DivByZeroStrat {
    fn fill_value(self) -> f64 {
        match self {
            Self::ReplaceBy0 => 0.0,
            Self::ReplaceBy1 => 1.0,
        }
    }
}

impl Display for DivByZeroStrat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for DivByZeroStrat {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_ref() {
            "replaceby0" | "replacebyzero" | "0" | "zero" => Ok(DivByZeroStrat::ReplaceBy0),
            "replaceby1" | "replacebyone" | "1" | "one" => Ok(DivByZeroStrat::ReplaceBy1),
            _ => Err(EvalError::parse("`DivByZeroStrat`", s)),
        }
    }
}

/// Divides two counts. A zero denominator yields the value chosen by `zero_division`.
pub(crate) fn safe_ratio<N: ToPrimitive>(
    numerator: N,
    denominator: N,
    zero_division: DivByZeroStrat,
) -> f64 {
    let d = denominator.to_f64().unwrap_or(0.0);
    if d == 0.0 {
        return zero_division.fill_value();
    }
    numerator.to_f64().unwrap_or(0.0) / d
}

/// Element-wise division, synchronous or with rayon.
fn prf_divide(
    numerator: &Array1<f64>,
    denominator: &Array1<f64>,
    parallel: bool,
    zero_division: DivByZeroStrat,
) -> Array1<f64> {
    let fill = zero_division.fill_value();
    let zip = Zip::from(numerator).and(denominator);
    let divide = |n: &f64, d: &f64| if *d == 0.0 { fill } else { n / d };
    if parallel {
        zip.par_map_collect(divide)
    } else {
        zip.map_collect(divide)
    }
}

/// Harmonic mean of precision and recall. Zero when both are zero.
fn f1_score(precision: &Array1<f64>, recall: &Array1<f64>) -> Array1<f64> {
    Zip::from(precision).and(recall).map_collect(|p, r| {
        let denom = p + r;
        if denom == 0.0 {
            0.0
        } else {
            2.0 * p * r / denom
        }
    })
}

/// predicted sum, true positive sum and true sum
type PredTpTrue = (Array1<usize>, Array1<usize>, Array1<usize>);

/// Counts, for every label of `labels`, the predictions, the correct predictions and the gold
/// occurrences. Gold or predicted tags outside `labels` are not counted for that side; a missing
/// prediction (`None`) is never a prediction of any label.
fn extract_pred_tp_true<'a, I>(pairs: I, labels: &[String]) -> PredTpTrue
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut index: AHashMap<&str, usize> =
        AHashMap::with_capacity_and_hasher(labels.len(), RandomState::new());
    for (i, label) in labels.iter().enumerate() {
        index.insert(label.as_str(), i);
    }
    let mut pred_sum = Array1::<usize>::zeros(labels.len());
    let mut tp_sum = Array1::<usize>::zeros(labels.len());
    let mut true_sum = Array1::<usize>::zeros(labels.len());
    for (gold, predicted) in pairs {
        let gold_index = index.get(gold).copied();
        let predicted_index = predicted.and_then(|p| index.get(p).copied());
        if let Some(g) = gold_index {
            true_sum[g] += 1;
        }
        if let Some(p) = predicted_index {
            pred_sum[p] += 1;
        }
        if let (Some(g), Some(p)) = (gold_index, predicted_index) {
            if g == p {
                tp_sum[g] += 1;
            }
        }
    }
    (pred_sum, tp_sum, true_sum)
}

/// Type alias for the output of `precision_recall_fscore_support`: precision, recall, f-score
/// and support. With `Average::None` every array has one entry per label, otherwise each array
/// holds a single value.
pub type PrecisionRecallFScoreTrueSum = (Array1<f64>, Array1<f64>, Array1<f64>, Array1<usize>);

/// Computes the precision, recall, f1-score and support of every label, or one of their
/// averages.
///
/// * `pairs`: Gold tag and predicted tag of every scored token
/// * `labels`: Labels to report on, in order
/// * `average`: What type of average to use
/// * `zero_division`: Value of precision/recall when their denominator is 0
/// * `parallel`: Can we use multiple cores for the element-wise divisions?
pub fn precision_recall_fscore_support<'a, I>(
    pairs: I,
    labels: &[String],
    average: Average,
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<PrecisionRecallFScoreTrueSum>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    if labels.is_empty() {
        return Err(EvalError::empty("labels"));
    }
    let (mut pred_sum, mut tp_sum, mut true_sum) = extract_pred_tp_true(pairs, labels);
    if matches!(average, Average::Micro) {
        tp_sum = array![tp_sum.sum()];
        pred_sum = array![pred_sum.sum()];
        true_sum = array![true_sum.sum()];
    }
    let tp = tp_sum.mapv(|x| x as f64);
    let precision = prf_divide(&tp, &pred_sum.mapv(|x| x as f64), parallel, zero_division);
    let recall = prf_divide(&tp, &true_sum.mapv(|x| x as f64), parallel, zero_division);
    let f_score = f1_score(&precision, &recall);
    match average {
        Average::None | Average::Micro => Ok((precision, recall, f_score, true_sum)),
        Average::Macro => {
            let total = true_sum.sum();
            Ok((
                array![precision.mean().unwrap_or(0.0)],
                array![recall.mean().unwrap_or(0.0)],
                array![f_score.mean().unwrap_or(0.0)],
                array![total],
            ))
        }
        Average::Weighted => {
            let total = true_sum.sum();
            if total == 0 {
                return Ok((array![0.0], array![0.0], array![0.0], array![0]));
            }
            let weights = true_sum.mapv(|x| x as f64);
            Ok((
                array![precision.weighted_mean(&weights)?],
                array![recall.weighted_mean(&weights)?],
                array![f_score.weighted_mean(&weights)?],
                array![total],
            ))
        }
    }
}

/// Share of pairs whose predicted tag equals the gold tag.
pub fn accuracy<'a, I>(pairs: I, zero_division: DivByZeroStrat) -> f64
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let (correct, total) = pairs
        .into_iter()
        .fold((0usize, 0usize), |(correct, total), (gold, predicted)| {
            (correct + usize::from(predicted == Some(gold)), total + 1)
        });
    safe_ratio(correct, total, zero_division)
}

/// Mean of the recall of every gold label that occurs in `pairs`. Labels that are only ever
/// predicted have no recall and are left out.
pub fn balanced_accuracy<'a, I>(pairs: I, zero_division: DivByZeroStrat) -> f64
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    // BTreeMap keeps the summation order stable from one run to the next.
    let mut per_label: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for (gold, predicted) in pairs {
        let entry = per_label.entry(gold).or_default();
        entry.1 += 1;
        if predicted == Some(gold) {
            entry.0 += 1;
        }
    }
    let recalls: Array1<f64> = per_label
        .values()
        .map(|(tp, total)| safe_ratio(*tp, *total, zero_division))
        .collect();
    recalls.mean().unwrap_or(0.0)
}
