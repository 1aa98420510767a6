/**
This modules holds the per-class classification table of a prediction file (or of an aggregate of
many files) and a few tools to prettyprint it or exchange it as rows.
*/
use crate::error::EvalError;
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;

/// The reporter holds the metrics of every class, the overall averages and, when known, the
/// accuracy. It can be displayed as if it was collected into a dataframe and can be consumed to
/// obtain a `HashSet` of `ClassMetrics`.
///
/// # Example
///
/// ```rust
/// use tageval::{ReportRow, Reporter};
///
/// let reporter = Reporter::from_rows(vec![
///     ReportRow::new("NOUN", 0.8, 0.5, 0.6153846, 100),
///     ReportRow::new("VERB", 1.0, 0.25, 0.4, 40),
///     ReportRow::new("accuracy", 0.75, 0.75, 0.75, 140),
/// ]);
///
/// let expected_report = "Class, Precision, Recall, Fscore, Support
/// Accuracy, 0.75, 0.75, 0.75, 140
/// VERB, 1, 0.25, 0.4, 40
/// NOUN, 0.8, 0.5, 0.6153846, 100\n";
///
/// assert_eq!(expected_report, reporter.to_string());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, PartialOrd, Default)]
pub struct Reporter {
    pub(crate) classes: BTreeSet<ClassMetricsInner>,
    pub(crate) accuracy: Option<Accuracy>,
}

/// By converting the reporter into a `HashSet` of `ClassMetrics`, you lose the ordering and the
/// accuracy row. If you mean to consume the per-class data without prettypriting it, this is not
/// a problem.
impl From<Reporter> for HashSet<ClassMetrics> {
    fn from(value: Reporter) -> Self {
        value.classes.into_iter().map(ClassMetrics::from).collect()
    }
}

impl Reporter {
    pub(crate) fn insert(&mut self, metrics: ClassMetricsInner) -> bool {
        self.classes.replace(metrics).is_none()
    }

    pub(crate) fn set_accuracy(&mut self, accuracy: Option<Accuracy>) {
        self.accuracy = accuracy;
    }

    /// Metrics of every class (rows without an average), ordered by class name.
    pub fn classes(&self) -> impl Iterator<Item = ClassMetrics> + '_ {
        self.classes
            .iter()
            .filter(|c| c.average == Average::None)
            .cloned()
            .map(ClassMetrics::from)
    }

    /// Metrics of a single class.
    pub fn class(&self, class: &str) -> Option<ClassMetrics> {
        self.classes
            .iter()
            .find(|c| c.average == Average::None && c.class == class)
            .cloned()
            .map(ClassMetrics::from)
    }

    pub fn overall(&self, average: OverallAverage) -> Option<ClassMetrics> {
        let average = Average::from(average);
        self.classes
            .iter()
            .find(|c| c.average == average)
            .cloned()
            .map(ClassMetrics::from)
    }

    /// Accuracy row, if the table has one.
    pub fn accuracy(&self) -> Option<Accuracy> {
        self.accuracy
    }

    /// Builds a table out of exchanged rows. The `accuracy` row (any case) becomes the accuracy,
    /// read from its precision column. Average rows (`micro avg`, `Weighted Avg`,
    /// `Overall_Macro`, ...) become overall rows. Every other row is a class.
    pub fn from_rows<I: IntoIterator<Item = ReportRow>>(rows: I) -> Self {
        let mut reporter = Reporter::default();
        for row in rows {
            let label = row.label.trim();
            if label.eq_ignore_ascii_case("accuracy") {
                reporter.accuracy = Some(Accuracy {
                    value: row.precision,
                    support: row.support,
                });
                continue;
            }
            let metrics = match label.parse::<OverallAverage>() {
                Ok(avg) => ClassMetricsInner::new_overall(
                    avg,
                    row.precision,
                    row.recall,
                    row.f1,
                    row.support,
                ),
                Err(_) => ClassMetricsInner {
                    class: String::from(label),
                    average: Average::None,
                    precision: row.precision,
                    recall: row.recall,
                    fscore: row.f1,
                    support: row.support,
                },
            };
            if !reporter.insert(metrics) {
                log::warn!("duplicated row `{}` in classification table, keeping the last one", label);
            }
        }
        reporter
    }

    /// The table as rows: classes first, then the averages, then the accuracy.
    pub fn rows(&self) -> Vec<ReportRow> {
        let mut rows: Vec<ReportRow> = self.classes.iter().map(ReportRow::from).collect();
        if let Some(acc) = self.accuracy {
            rows.push(ReportRow::new(
                "accuracy",
                acc.value,
                acc.value,
                acc.value,
                acc.support,
            ));
        }
        rows
    }
}

/// The Reporter struct acts as a dataframe when displayed.
impl Display for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Class, Precision, Recall, Fscore, Support")?;
        if let Some(acc) = self.accuracy {
            writeln!(
                f,
                "Accuracy, {}, {}, {}, {}",
                acc.value, acc.value, acc.value, acc.support
            )?;
        }
        for v in self.classes.iter().rev() {
            //Must call `.rev()` because the iter is in ascending order
            writeln!(f, "{}", v)?
        }
        Ok(())
    }
}

/// Share of correctly tagged tokens and the number of tokens it was computed on.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Accuracy {
    pub value: f64,
    pub support: usize,
}

/// One row of an exchanged classification table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(alias = "POS Tag", alias = "Class", alias = "class")]
    pub label: String,
    #[serde(alias = "Precision")]
    pub precision: f64,
    #[serde(alias = "Recall")]
    pub recall: f64,
    #[serde(rename = "f1-score", alias = "F1 Score", alias = "f1", alias = "fscore")]
    pub f1: f64,
    #[serde(alias = "Support")]
    pub support: usize,
}

impl ReportRow {
    pub fn new(label: impl Into<String>, precision: f64, recall: f64, f1: f64, support: usize) -> Self {
        Self {
            label: label.into(),
            precision,
            recall,
            f1,
            support,
        }
    }
}

impl From<&ClassMetricsInner> for ReportRow {
    fn from(value: &ClassMetricsInner) -> Self {
        Self::new(
            value.class.clone(),
            value.precision,
            value.recall,
            value.fscore,
            value.support,
        )
    }
}

#[derive(Debug, Clone)]
/// Datastructure holding metrics about a given class.
pub struct ClassMetrics {
    /// The class, such as "NOUN", "VERB", "Overall_Macro", etc.
    pub class: String,
    /// The average used to compute this class' metrics
    pub average: Average,
    /// Precision metric
    pub precision: f64,
    /// Recall metric
    pub recall: f64,
    /// Fscore metric
    pub fscore: f64,
    /// Support metric
    pub support: usize,
}

impl Hash for ClassMetrics {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.class.hash(state);
        self.average.hash(state)
    }
}

impl PartialEq for ClassMetrics {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetrics {}

impl From<ClassMetricsInner> for ClassMetrics {
    fn from(value: ClassMetricsInner) -> Self {
        Self {
            class: value.class,
            average: value.average,
            precision: value.precision,
            recall: value.recall,
            fscore: value.fscore,
            support: value.support,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// ClassMetricsInner hold the metrics for a single class. They implement a special version of the
/// `Display` trait, allowing them to be treated as the line of a dataframe, and are ordered by
/// average first and class name second.
pub(crate) struct ClassMetricsInner {
    pub(crate) class: String,
    pub(crate) average: Average,
    pub(crate) precision: f64,
    pub(crate) recall: f64,
    pub(crate) fscore: f64,
    pub(crate) support: usize,
}
impl PartialEq for ClassMetricsInner {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.average == other.average
    }
}
impl Eq for ClassMetricsInner {}

#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for ClassMetricsInner {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match self.average.cmp(&other.average) {
            std::cmp::Ordering::Equal => self.class.partial_cmp(&other.class),
            v => Some(v),
        }
    }
}

impl Ord for ClassMetricsInner {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.average.cmp(&other.average) {
            std::cmp::Ordering::Equal => self.class.cmp(&other.class),
            v => v,
        }
    }
}

impl ClassMetricsInner {
    pub(crate) fn new_class(
        class: impl Into<String>,
        precision: f64,
        recall: f64,
        fscore: f64,
        support: usize,
    ) -> Self {
        ClassMetricsInner {
            class: class.into(),
            average: Average::None,
            precision,
            recall,
            fscore,
            support,
        }
    }

    pub(crate) fn new_overall(
        average: OverallAverage,
        precision: f64,
        recall: f64,
        fscore: f64,
        support: usize,
    ) -> Self {
        let class = average.to_string();
        ClassMetricsInner {
            class,
            average: average.into(),
            precision,
            recall,
            fscore,
            support,
        }
    }
}

/// The Classmetrics struct acts as a line in a dataframe when displayed.
impl Display for ClassMetricsInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}",
            self.class, self.precision, self.recall, self.fscore, self.support
        )
    }
}

/// Enumeration of the different types of averaging supported by this crate. &str can be parsed
/// to create an `Average`.
#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Average {
    None,
    Micro,
    Macro,
    Weighted,
}
impl Display for Average {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
impl FromStr for Average {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Average::None),
            "micro" => Ok(Average::Micro),
            "macro" => Ok(Average::Macro),
            "weighted" => Ok(Average::Weighted),
            _ => Err(EvalError::parse("`Average`", s)),
        }
    }
}

/// Average implements partial ordering. This is used during the
/// reporting to represent the ClassMetrics with an `average` other
/// than `None` as `Greater` than those with `None`.
#[allow(clippy::non_canonical_partial_ord_impl)]
impl PartialOrd for Average {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Average {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::None, Self::None) => std::cmp::Ordering::Equal,
            (Self::None, _) => std::cmp::Ordering::Less,
            (_, Self::None) => std::cmp::Ordering::Greater,
            _ => std::cmp::Ordering::Equal,
        }
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone, Serialize, Deserialize, Sequence)]
pub enum OverallAverage {
    Micro,
    Macro,
    Weighted,
}

impl Display for OverallAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str_content = match self {
            Self::Micro => "Overall_Micro",
            Self::Macro => "Overall_Macro",
            Self::Weighted => "Overall_Weighted",
        };
        write!(f, "{}", str_content)
    }
}

/// Parses the average rows written by this crate (`Overall_Micro`) and by the usual
/// classification report exports (`micro avg`, `Macro Avg`).
impl FromStr for OverallAverage {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let name = lowered
            .strip_prefix("overall_")
            .or_else(|| lowered.strip_suffix(" avg"))
            .unwrap_or(lowered.as_str());
        match name.trim() {
            "micro" => Ok(Self::Micro),
            "macro" => Ok(Self::Macro),
            "weighted" => Ok(Self::Weighted),
            _ => Err(EvalError::parse("`OverallAverage`", s)),
        }
    }
}

impl From<OverallAverage> for Average {
    fn from(value: OverallAverage) -> Self {
        match value {
            OverallAverage::Micro => Average::Micro,
            OverallAverage::Macro => Average::Macro,
            OverallAverage::Weighted => Average::Weighted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("micro avg", OverallAverage::Micro)]
    #[case("Macro Avg", OverallAverage::Macro)]
    #[case("Overall_Weighted", OverallAverage::Weighted)]
    #[case("weighted", OverallAverage::Weighted)]
    fn test_parse_overall(#[case] input: &str, #[case] expected: OverallAverage) {
        assert_eq!(input.parse::<OverallAverage>(), Ok(expected));
    }

    #[test]
    fn test_parse_overall_rejects_classes() {
        assert!("NOUN".parse::<OverallAverage>().is_err());
        assert!("macro-avg".parse::<OverallAverage>().is_err());
    }

    #[test]
    fn test_from_rows_sorts_rows_out() {
        let reporter = Reporter::from_rows(vec![
            ReportRow::new("NOUN", 0.8, 0.5, 0.6, 100),
            ReportRow::new("macro avg", 0.7, 0.6, 0.65, 140),
            ReportRow::new("Accuracy", 0.75, 0.75, 0.75, 140),
            ReportRow::new("VERB", 0.6, 0.7, 0.65, 40),
        ]);
        let classes: Vec<_> = reporter.classes().map(|c| c.class).collect();
        assert_eq!(classes, vec!["NOUN", "VERB"]);
        assert_eq!(
            reporter.accuracy(),
            Some(Accuracy {
                value: 0.75,
                support: 140
            })
        );
        let macro_row = reporter.overall(OverallAverage::Macro).unwrap();
        assert_eq!(macro_row.class, "Overall_Macro");
        assert_eq!(macro_row.support, 140);
        assert!(reporter.overall(OverallAverage::Micro).is_none());
    }

    #[test]
    fn test_rows_round_trip_through_from_rows() {
        let mut reporter = Reporter::default();
        reporter.insert(ClassMetricsInner::new_class("ADJ", 0.5, 1.0, 2.0 / 3.0, 1));
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Weighted,
            0.5,
            1.0,
            2.0 / 3.0,
            1,
        ));
        reporter.set_accuracy(Some(Accuracy {
            value: 1.0,
            support: 1,
        }));
        let rebuilt = Reporter::from_rows(reporter.rows());
        assert_eq!(rebuilt, reporter);
        assert_eq!(rebuilt.rows().len(), 3);
    }

    #[test]
    fn test_duplicated_rows_keep_the_last() {
        let reporter = Reporter::from_rows(vec![
            ReportRow::new("NOUN", 0.8, 0.5, 0.6, 100),
            ReportRow::new("NOUN", 0.1, 0.1, 0.1, 10),
        ]);
        assert_eq!(reporter.class("NOUN").unwrap().support, 10);
    }

    #[test]
    fn test_display_puts_averages_first() {
        let mut reporter = Reporter::default();
        reporter.insert(ClassMetricsInner::new_class("NOUN", 1.0, 0.5, 0.5, 2));
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Macro,
            1.0,
            0.5,
            0.5,
            2,
        ));
        let expected = "Class, Precision, Recall, Fscore, Support
Overall_Macro, 1, 0.5, 0.5, 2
NOUN, 1, 0.5, 0.5, 2\n";
        assert_eq!(reporter.to_string(), expected);
    }

    #[test]
    fn test_report_row_reads_exported_columns() {
        let row: ReportRow = serde_json::from_str(
            r#"{"POS Tag": "NOUN", "Precision": 0.8, "Recall": 0.5, "F1 Score": 0.6, "Support": 100}"#,
        )
        .unwrap();
        assert_eq!(row, ReportRow::new("NOUN", 0.8, 0.5, 0.6, 100));
    }
}
