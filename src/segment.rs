use crate::datastructure::SentenceBoundary;
use crate::error::{EvalError, Result};

/// Reads the sentence boundaries out of a boundary-definition text: one sentence per line, the
/// length of a sentence is its number of whitespace-separated words. Blank lines are kept as
/// sentences of length 0 so that sentence ids stay equal to line numbers.
///
/// This does not look at any token sequence, the aligner deals with sequences that are shorter
/// or longer than the boundaries.
///
/// * `boundary_text`: Raw text, one sentence per line.
pub fn segment(boundary_text: &str) -> Result<SentenceBoundary> {
    let lengths: Vec<usize> = boundary_text
        .lines()
        .map(|line| line.split_whitespace().count())
        .collect();
    if lengths.is_empty() {
        return Err(EvalError::empty("boundary text"));
    }
    log::debug!(
        "segmented {} sentences covering {} words",
        lengths.len(),
        lengths.iter().sum::<usize>()
    );
    Ok(SentenceBoundary::from_lengths(lengths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("casa es bon", vec![3])]
    #[case("casa es bon\n", vec![3])]
    #[case("Lo metge  dis\tque\nla febre es cauda .\n", vec![4, 5])]
    #[case("una\n\ndoas paraulas\r\n", vec![1, 0, 2])]
    #[case("   \n", vec![0])]
    fn test_segment(#[case] text: &str, #[case] expected: Vec<usize>) {
        let actual = segment(text).unwrap();
        assert_eq!(actual.lengths(), expected.as_slice());
    }

    #[test]
    fn test_segment_empty_text() {
        assert_eq!(
            segment(""),
            Err(EvalError::EmptyInput(String::from("boundary text")))
        );
    }
}
