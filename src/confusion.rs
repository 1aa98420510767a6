/**
Label x label count grids: building them from aligned tags, normalising them and summing many of
them into one.
*/
use crate::error::{EvalError, Result};
use crate::metrics::{safe_ratio, DivByZeroStrat};
use ahash::{random_state::RandomState, HashMap as AHashMap};
use ndarray::prelude::*;
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Count grid indexed by `(gold, predicted)`. Rows and columns follow the order of `labels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    /// Wraps a count grid. Fails if the grid is not square or does not have one row per label.
    pub fn new(labels: Vec<String>, counts: Array2<usize>) -> Result<Self> {
        let matrix = Self { labels, counts };
        matrix.check_shape()?;
        Ok(matrix)
    }

    /// Counts every pair whose gold and predicted tags are both in `labels`. Other pairs are left
    /// out of the grid.
    pub(crate) fn from_pairs<'a, I>(pairs: I, labels: &[String]) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut index: AHashMap<&str, usize> =
            AHashMap::with_capacity_and_hasher(labels.len(), RandomState::new());
        for (i, label) in labels.iter().enumerate() {
            index.insert(label.as_str(), i);
        }
        let mut counts = Array2::<usize>::zeros((labels.len(), labels.len()));
        for (gold, predicted) in pairs {
            let cell = index
                .get(gold)
                .zip(predicted.and_then(|p| index.get(p)));
            if let Some((g, p)) = cell {
                counts[[*g, *p]] += 1;
            }
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    fn check_shape(&self) -> Result<()> {
        let (rows, cols) = self.counts.dim();
        if rows != cols || rows != self.labels.len() {
            return Err(EvalError::ShapeMismatch {
                expected: format!("{n}x{n} grid", n = self.labels.len()),
                found: format!("{rows}x{cols} grid"),
            });
        }
        Ok(())
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        other.check_shape()?;
        if self.labels != other.labels {
            return Err(EvalError::ShapeMismatch {
                expected: format!("labels {:?}", self.labels),
                found: format!("labels {:?}", other.labels),
            });
        }
        Ok(())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn counts(&self) -> ArrayView2<'_, usize> {
        self.counts.view()
    }

    /// Count of `(gold, predicted)`, if both labels are axes of the grid.
    pub fn get(&self, gold: &str, predicted: &str) -> Option<usize> {
        let g = self.labels.iter().position(|l| l == gold)?;
        let p = self.labels.iter().position(|l| l == predicted)?;
        self.counts.get([g, p]).copied()
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn trace(&self) -> usize {
        self.counts.diag().sum()
    }

    /// Every row divided by its sum, in percent. Rows without any count stay at 0.
    pub fn row_percentages(&self) -> Array2<f64> {
        let mut percentages = self.counts.mapv(|c| c as f64);
        for mut row in percentages.rows_mut() {
            let sum = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|c| c / sum * 100.0);
            }
        }
        percentages
    }

    /// Trace over total.
    pub fn overall_accuracy(&self, zero_division: DivByZeroStrat) -> f64 {
        safe_ratio(self.trace(), self.total(), zero_division)
    }

    /// Diagonal cell over row sum, one value per label.
    pub fn per_class_accuracy(&self, zero_division: DivByZeroStrat) -> Array1<f64> {
        Zip::from(self.counts.diag())
            .and(self.counts.sum_axis(Axis(1)).view())
            .map_collect(|tp, total| safe_ratio(*tp, *total, zero_division))
    }

    /// Adds `other` to this grid, cell by cell. Both grids must share the same labels in the same
    /// order.
    pub fn try_merge(&mut self, other: &Self, parallel: bool) -> Result<()> {
        self.check_compatible(other)?;
        let zip = Zip::from(&mut self.counts).and(&other.counts);
        if parallel {
            zip.par_for_each(|a, b| *a += *b);
        } else {
            zip.for_each(|a, b| *a += *b);
        }
        Ok(())
    }
}

/// A matrix left out of an aggregation and the reason why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedMatrix {
    /// Position of the matrix in the input.
    pub index: usize,
    pub reason: String,
}

/// Sum of many confusion matrices and the accuracies read off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionAggregate {
    pub matrix: ConfusionMatrix,
    pub overall_accuracy: f64,
    pub per_class_accuracy: Array1<f64>,
    /// Number of matrices summed into `matrix`.
    pub merged: usize,
    pub skipped: Vec<SkippedMatrix>,
}

/// Sums equally labelled confusion matrices. The first well-formed matrix sets the labels,
/// matrices that are not square or whose labels differ are skipped and recorded. Fails only when
/// no matrix is left to sum.
///
/// * `matrices`: Per-file confusion matrices
/// * `zero_division`: Value of an accuracy whose denominator is 0
/// * `parallel`: Can we use multiple cores for the element-wise sums?
pub fn aggregate_confusions(
    matrices: &[ConfusionMatrix],
    zero_division: DivByZeroStrat,
    parallel: bool,
) -> Result<ConfusionAggregate> {
    let mut sum: Option<ConfusionMatrix> = None;
    let mut merged = 0;
    let mut skipped = Vec::new();
    for (index, matrix) in matrices.iter().enumerate() {
        let outcome = if let Some(acc) = sum.as_mut() {
            acc.try_merge(matrix, parallel)
        } else {
            let shape = matrix.check_shape();
            if shape.is_ok() {
                sum = Some(matrix.clone());
            }
            shape
        };
        match outcome {
            Ok(()) => merged += 1,
            Err(e) => {
                log::warn!("skipping confusion matrix {}: {}", index, e);
                skipped.push(SkippedMatrix {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }
    let matrix = sum.ok_or_else(|| EvalError::empty("confusion matrices"))?;
    log::debug!(
        "summed {} confusion matrices over {} labels",
        merged,
        matrix.labels.len()
    );
    Ok(ConfusionAggregate {
        overall_accuracy: matrix.overall_accuracy(zero_division),
        per_class_accuracy: matrix.per_class_accuracy(zero_division),
        matrix,
        merged,
        skipped,
    })
}
