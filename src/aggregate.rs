/**
Corpus-level aggregation of per-file results. `aggregate_runs` summarises per-file match
percentages, `aggregate_reports` recombines per-file classification tables using only their
precision, recall, f-score and support columns. `aggregate_class_means` averages the same columns
without any weighting.
*/
use crate::error::{EvalError, Result};
use crate::metrics::{safe_ratio, DivByZeroStrat};
use crate::reporter::{Accuracy, ClassMetricsInner, OverallAverage, Reporter};
use ndarray::prelude::*;
use ndarray_stats::SummaryStatisticsExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean and population standard deviation of a series of percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub mean: f64,
    pub std: f64,
    pub runs: usize,
}

impl RunSummary {
    pub(crate) fn from_values(values: &Array1<f64>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        Self {
            mean: values.mean().unwrap_or(0.0),
            std: values.std(0.0),
            runs: values.len(),
        }
    }
}

/// Mean and population standard deviation of per-file match percentages. An empty input
/// summarises to zeros.
///
/// * `runs`: File identifier and match percentage of every file
pub fn aggregate_runs(runs: &[(String, f64)]) -> RunSummary {
    let values: Array1<f64> = runs.iter().map(|(_, value)| *value).collect();
    let summary = RunSummary::from_values(&values);
    log::debug!(
        "{} runs: mean {:.4}, std {:.4}",
        summary.runs,
        summary.mean,
        summary.std
    );
    summary
}

/// Classification table recombined from many per-file tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub report: Reporter,
    /// Labels that occur in the inputs only with a support of 0. They are not part of `report`.
    pub zero_support_labels: Vec<String>,
    /// Number of tables aggregated.
    pub files: usize,
}

/// Per label: precision, recall, f-score and support, one entry per file reporting the label.
type LabelColumns = (Vec<f64>, Vec<f64>, Vec<f64>, Vec<usize>);

/// Recombines per-file classification tables.
///
/// Every label is the support-weighted mean of the files that report it, files without the label
/// contribute nothing to it. The macro average is the plain mean of those labels, the weighted
/// average their support-weighted mean and the micro average the pooled true positives
/// (`recall * support`) over the pooled support. The accuracy is only rebuilt when every table
/// carries an accuracy row: pooling only the tables that have one would weigh an accuracy over
/// fewer files against class rows over all of them.
pub fn aggregate_reports(reports: &[Reporter]) -> Result<AggregateReport> {
    if reports.is_empty() {
        return Err(EvalError::empty("classification reports"));
    }
    let mut columns: BTreeMap<String, LabelColumns> = BTreeMap::new();
    for class in reports.iter().flat_map(|r| r.classes()) {
        let entry = columns.entry(class.class).or_default();
        entry.0.push(class.precision);
        entry.1.push(class.recall);
        entry.2.push(class.fscore);
        entry.3.push(class.support);
    }

    let mut reporter = Reporter::default();
    let mut zero_support_labels = Vec::new();
    let n_labels = columns.len();
    let mut precision = Vec::with_capacity(n_labels);
    let mut recall = Vec::with_capacity(n_labels);
    let mut fscore = Vec::with_capacity(n_labels);
    let mut support = Vec::with_capacity(n_labels);
    for (label, (p, r, f, s)) in columns {
        let total: usize = s.iter().sum();
        if total == 0 {
            zero_support_labels.push(label);
            continue;
        }
        let weights: Array1<f64> = s.iter().map(|v| *v as f64).collect();
        let label_p = Array1::from(p).weighted_mean(&weights)?;
        let label_r = Array1::from(r).weighted_mean(&weights)?;
        let label_f = Array1::from(f).weighted_mean(&weights)?;
        reporter.insert(ClassMetricsInner::new_class(
            label, label_p, label_r, label_f, total,
        ));
        precision.push(label_p);
        recall.push(label_r);
        fscore.push(label_f);
        support.push(total);
    }
    if !zero_support_labels.is_empty() {
        log::warn!(
            "left labels without support out of the aggregate: {:?}",
            zero_support_labels
        );
    }

    if !support.is_empty() {
        let precision = Array1::from(precision);
        let recall = Array1::from(recall);
        let fscore = Array1::from(fscore);
        let total: usize = support.iter().sum();
        let weights: Array1<f64> = support.iter().map(|v| *v as f64).collect();
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Macro,
            precision.mean().unwrap_or(0.0),
            recall.mean().unwrap_or(0.0),
            fscore.mean().unwrap_or(0.0),
            total,
        ));
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Weighted,
            precision.weighted_mean(&weights)?,
            recall.weighted_mean(&weights)?,
            fscore.weighted_mean(&weights)?,
            total,
        ));
        // Single-label tagging: pooled precision, recall and f-score are all tp / support.
        let micro = safe_ratio(
            (&recall * &weights).sum(),
            total as f64,
            DivByZeroStrat::ReplaceBy0,
        );
        reporter.insert(ClassMetricsInner::new_overall(
            OverallAverage::Micro,
            micro,
            micro,
            micro,
            total,
        ));
    }
    reporter.set_accuracy(aggregate_accuracy(reports));

    Ok(AggregateReport {
        report: reporter,
        zero_support_labels,
        files: reports.len(),
    })
}

/// Unweighted mean of every label across tables: each file counts once, whatever its support.
/// Rows with a support of 0 take part in the mean. The support of a label is the sum of its
/// supports. Only class rows are produced.
pub fn aggregate_class_means(reports: &[Reporter]) -> Result<Reporter> {
    if reports.is_empty() {
        return Err(EvalError::empty("classification reports"));
    }
    let mut columns: BTreeMap<String, LabelColumns> = BTreeMap::new();
    for class in reports.iter().flat_map(|r| r.classes()) {
        let entry = columns.entry(class.class).or_default();
        entry.0.push(class.precision);
        entry.1.push(class.recall);
        entry.2.push(class.fscore);
        entry.3.push(class.support);
    }
    let mut reporter = Reporter::default();
    for (label, (p, r, f, s)) in columns {
        reporter.insert(ClassMetricsInner::new_class(
            label,
            Array1::from(p).mean().unwrap_or(0.0),
            Array1::from(r).mean().unwrap_or(0.0),
            Array1::from(f).mean().unwrap_or(0.0),
            s.iter().sum(),
        ));
    }
    log::debug!("averaged {} tables without weights", reports.len());
    Ok(reporter)
}

/// Support-weighted accuracy across tables, when every table has an accuracy row.
fn aggregate_accuracy(reports: &[Reporter]) -> Option<Accuracy> {
    let accuracies: Option<Vec<Accuracy>> = reports.iter().map(Reporter::accuracy).collect();
    let Some(accuracies) = accuracies else {
        log::debug!("some tables have no accuracy row, the accuracy is left out");
        return None;
    };
    let support: usize = accuracies.iter().map(|a| a.support).sum();
    if support == 0 {
        return None;
    }
    let correct: f64 = accuracies
        .iter()
        .map(|a| a.value * a.support as f64)
        .sum();
    Some(Accuracy {
        value: correct / support as f64,
        support,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ReportRow;
    use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};
    use rstest::rstest;

    fn table(rows: &[(&str, f64, f64, f64, usize)]) -> Reporter {
        Reporter::from_rows(
            rows.iter()
                .map(|(label, p, r, f, s)| ReportRow::new(*label, *p, *r, *f, *s)),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[rstest]
    #[case(vec![], 0.0, 0.0, 0)]
    #[case(vec![50.0], 50.0, 0.0, 1)]
    #[case(vec![80.0, 60.0, 70.0], 70.0, (200.0f64 / 3.0).sqrt(), 3)]
    fn test_aggregate_runs(
        #[case] values: Vec<f64>,
        #[case] mean: f64,
        #[case] std: f64,
        #[case] runs: usize,
    ) {
        let input: Vec<(String, f64)> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (format!("run_{i}"), v))
            .collect();
        let summary = aggregate_runs(&input);
        assert!(close(summary.mean, mean));
        assert!(close(summary.std, std));
        assert_eq!(summary.runs, runs);
    }

    #[test]
    fn test_class_means_ignore_support() {
        let res = aggregate_class_means(&[
            table(&[("NOUN", 0.8, 0.5, 0.6, 100), ("VERB", 0.0, 0.0, 0.0, 0)]),
            table(&[("NOUN", 0.6, 0.2, 0.3, 50), ("VERB", 1.0, 0.5, 0.5, 4)]),
        ])
        .unwrap();
        let noun = res.class("NOUN").unwrap();
        assert!(close(noun.precision, 0.7));
        assert!(close(noun.recall, 0.35));
        assert!(close(noun.fscore, 0.45));
        assert_eq!(noun.support, 150);
        let verb = res.class("VERB").unwrap();
        assert!(close(verb.precision, 0.5));
        assert_eq!(verb.support, 4);
        assert!(res.overall(OverallAverage::Macro).is_none());
        assert!(res.accuracy().is_none());
    }

    #[test]
    fn test_class_means_empty() {
        assert_eq!(
            aggregate_class_means(&[]),
            Err(EvalError::EmptyInput(String::from("classification reports")))
        );
    }

    #[test]
    fn test_label_weighted_by_support() {
        let res = aggregate_reports(&[
            table(&[("NOUN", 0.8, 0.5, 0.6, 100)]),
            table(&[("NOUN", 0.6, 0.2, 0.3, 50)]),
        ])
        .unwrap();
        let noun = res.report.class("NOUN").unwrap();
        assert!(close(noun.precision, (0.8 * 100.0 + 0.6 * 50.0) / 150.0));
        assert!(close(noun.recall, 0.4));
        assert_eq!(noun.support, 150);
    }

    #[test]
    fn test_missing_label_contributes_nothing() {
        let res = aggregate_reports(&[
            table(&[("NOUN", 0.8, 0.5, 0.6, 100), ("VERB", 0.4, 0.5, 0.2, 10)]),
            table(&[("NOUN", 0.6, 0.5, 0.6, 50)]),
        ])
        .unwrap();
        let verb = res.report.class("VERB").unwrap();
        assert!(close(verb.precision, 0.4));
        assert_eq!(verb.support, 10);
        let macro_avg = res.report.overall(OverallAverage::Macro).unwrap();
        let noun_precision = (0.8 * 100.0 + 0.6 * 50.0) / 150.0;
        assert!(close(macro_avg.precision, (noun_precision + 0.4) / 2.0));
        let weighted = res.report.overall(OverallAverage::Weighted).unwrap();
        assert!(close(weighted.precision, (noun_precision * 150.0 + 0.4 * 10.0) / 160.0));
        assert_eq!(weighted.support, 160);
        let micro = res.report.overall(OverallAverage::Micro).unwrap();
        assert!(close(micro.recall, 0.5));
        assert!(close(micro.precision, micro.recall));
    }

    #[test]
    fn test_zero_support_labels_are_listed() {
        let res = aggregate_reports(&[
            table(&[("NOUN", 1.0, 1.0, 1.0, 3), ("X", 0.0, 0.0, 0.0, 0)]),
            table(&[("X", 0.0, 0.0, 0.0, 0)]),
        ])
        .unwrap();
        assert_eq!(res.zero_support_labels, vec![String::from("X")]);
        assert!(res.report.class("X").is_none());
        let macro_avg = res.report.overall(OverallAverage::Macro).unwrap();
        assert_eq!(macro_avg.precision, 1.0);
    }

    #[test]
    fn test_accuracy_needs_every_table() {
        let with_accuracy = vec![
            table(&[("NOUN", 0.8, 0.5, 0.6, 100), ("accuracy", 0.9, 0.9, 0.9, 100)]),
            table(&[("NOUN", 0.6, 0.5, 0.6, 50), ("accuracy", 0.6, 0.6, 0.6, 50)]),
        ];
        let res = aggregate_reports(&with_accuracy).unwrap();
        let acc = res.report.accuracy().unwrap();
        assert!(close(acc.value, 0.8));
        assert_eq!(acc.support, 150);

        let mut partial = with_accuracy.clone();
        partial.push(table(&[("NOUN", 0.6, 0.5, 0.6, 50)]));
        assert_eq!(aggregate_reports(&partial).unwrap().report.accuracy(), None);
    }

    #[test]
    fn test_aggregate_reports_empty() {
        assert_eq!(
            aggregate_reports(&[]),
            Err(EvalError::EmptyInput(String::from("classification reports")))
        );
    }

    #[test]
    fn test_equal_supports_make_weighted_and_macro_agree() {
        let res = aggregate_reports(&[
            table(&[("ADJ", 0.2, 0.4, 0.3, 20), ("NOUN", 0.8, 0.6, 0.7, 20)]),
            table(&[("ADJ", 0.6, 0.8, 0.7, 20), ("NOUN", 0.4, 0.2, 0.3, 20)]),
        ])
        .unwrap();
        let adj = res.report.class("ADJ").unwrap();
        assert!(close(adj.precision, 0.4));
        let macro_avg = res.report.overall(OverallAverage::Macro).unwrap();
        let weighted = res.report.overall(OverallAverage::Weighted).unwrap();
        assert!(close(macro_avg.precision, weighted.precision));
        assert!(close(macro_avg.recall, weighted.recall));
        assert!(close(macro_avg.fscore, weighted.fscore));
    }

    #[derive(Debug, Clone, Copy)]
    enum LabelsToTest {
        Noun,
        Verb,
        Adj,
        Det,
    }

    impl From<LabelsToTest> for &'static str {
        fn from(value: LabelsToTest) -> Self {
            match value {
                LabelsToTest::Noun => "NOUN",
                LabelsToTest::Verb => "VERB",
                LabelsToTest::Adj => "ADJ",
                LabelsToTest::Det => "DET",
            }
        }
    }

    impl Arbitrary for LabelsToTest {
        fn arbitrary(g: &mut Gen) -> Self {
            let values = [
                LabelsToTest::Noun,
                LabelsToTest::Verb,
                LabelsToTest::Adj,
                LabelsToTest::Det,
            ];
            *g.choose(&values).unwrap()
        }
    }

    #[derive(Debug, Clone)]
    struct TableToTest(Reporter);

    impl Arbitrary for TableToTest {
        fn arbitrary(g: &mut Gen) -> Self {
            let rows: Vec<(LabelsToTest, u8, u8, u8, u8)> = Arbitrary::arbitrary(g);
            let rows = rows.into_iter().map(|(label, p, r, f, s)| {
                ReportRow::new(
                    <&str>::from(label),
                    p as f64 / 255.0,
                    r as f64 / 255.0,
                    f as f64 / 255.0,
                    s as usize,
                )
            });
            TableToTest(Reporter::from_rows(rows))
        }
    }

    fn tables_are_close(a: &Reporter, b: &Reporter) -> bool {
        let (rows_a, rows_b) = (a.rows(), b.rows());
        rows_a.len() == rows_b.len()
            && rows_a.iter().zip(&rows_b).all(|(x, y)| {
                x.label == y.label
                    && x.support == y.support
                    && close(x.precision, y.precision)
                    && close(x.recall, y.recall)
                    && close(x.f1, y.f1)
            })
    }

    #[test]
    fn test_aggregate_reports_is_commutative() {
        fn commutes(a: TableToTest, b: TableToTest) -> TestResult {
            let ab = aggregate_reports(&[a.0.clone(), b.0.clone()]).unwrap();
            let ba = aggregate_reports(&[b.0, a.0]).unwrap();
            TestResult::from_bool(
                tables_are_close(&ab.report, &ba.report)
                    && ab.zero_support_labels == ba.zero_support_labels,
            )
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(commutes as fn(TableToTest, TableToTest) -> TestResult)
    }

    #[test]
    fn test_aggregating_one_table_keeps_its_classes() {
        fn keeps_classes(a: TableToTest) -> TestResult {
            let res = aggregate_reports(std::slice::from_ref(&a.0)).unwrap();
            let unchanged = a.0.classes().filter(|c| c.support > 0).all(|c| {
                res.report.class(&c.class).is_some_and(|agg| {
                    close(agg.precision, c.precision)
                        && close(agg.recall, c.recall)
                        && close(agg.fscore, c.fscore)
                        && agg.support == c.support
                })
            });
            TestResult::from_bool(unchanged)
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(keeps_classes as fn(TableToTest) -> TestResult)
    }
}
