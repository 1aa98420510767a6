use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// A word (or lemma) and its part-of-speech tag. The tag is either drawn from the tag set of the
/// corpus or is the `missing` sentinel written by the tagging client when it could not tag a word.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    #[serde(alias = "word", alias = "Lemma", alias = "lemma")]
    pub token: String,
    #[serde(alias = "upos", alias = "POS", alias = "pos")]
    pub tag: String,
}

impl Token {
    /// Tag emitted by the tagging client for words it did not manage to tag.
    pub const MISSING: &'static str = "missing";

    pub fn new(token: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            tag: tag.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.tag == Self::MISSING
    }
}

impl<S: Into<String>, T: Into<String>> From<(S, T)> for Token {
    fn from(value: (S, T)) -> Self {
        Token::new(value.0, value.1)
    }
}

/// Ordered tokens of a corpus, one per corpus position. A reference and a prediction sequence are
/// built independently and may differ in length and in tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenSequence {
    tokens: Box<[Token]>,
}

impl TokenSequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.tag.as_str())
    }

    pub(crate) fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    /// Clamped slice: never reaches past the end of the sequence.
    pub(crate) fn window(&self, start: usize, len: usize) -> &[Token] {
        let start = start.min(self.tokens.len());
        let end = start.saturating_add(len).min(self.tokens.len());
        &self.tokens[start..end]
    }
}

impl<T: Into<Token>> FromIterator<T> for TokenSequence {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Token>> From<Vec<T>> for TokenSequence {
    fn from(value: Vec<T>) -> Self {
        value.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a TokenSequence {
    type Item = &'a Token;
    type IntoIter = Iter<'a, Token>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Word count of every sentence of the boundary-definition text, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SentenceBoundary {
    lengths: Box<[usize]>,
}

impl SentenceBoundary {
    pub fn from_lengths(lengths: Vec<usize>) -> Self {
        Self {
            lengths: lengths.into_boxed_slice(),
        }
    }

    /// Number of sentences (lines) in the boundary text.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Number of words implied by the boundaries.
    pub fn total_words(&self) -> usize {
        self.lengths.iter().sum()
    }

    /// Sentence id of every corpus position covered by the boundaries, in order.
    pub fn sentence_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.lengths
            .iter()
            .enumerate()
            .flat_map(|(id, len)| std::iter::repeat(id).take(*len))
    }
}

impl From<Vec<usize>> for SentenceBoundary {
    fn from(value: Vec<usize>) -> Self {
        Self::from_lengths(value)
    }
}

/// Disagreement between the number of words implied by the sentence boundaries and the length of
/// the token sequences. Alignment never fails on it, it clamps every slice and records this
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LengthMismatch {
    pub boundary_words: usize,
    pub reference_len: usize,
    pub prediction_len: usize,
}

impl LengthMismatch {
    pub(crate) fn check(
        boundary_words: usize,
        reference_len: usize,
        prediction_len: usize,
    ) -> Option<Self> {
        if boundary_words == reference_len && boundary_words == prediction_len {
            None
        } else {
            Some(Self {
                boundary_words,
                reference_len,
                prediction_len,
            })
        }
    }

    /// Words implied by the boundaries that at least one of the sequences cannot provide.
    pub fn shortfall(&self) -> usize {
        self.boundary_words
            .saturating_sub(self.reference_len.min(self.prediction_len))
    }

    /// Trailing tokens of the longer sequence that lie beyond the last sentence.
    pub fn surplus(&self) -> usize {
        self.reference_len
            .max(self.prediction_len)
            .saturating_sub(self.boundary_words)
    }
}

/// A gold tag and the tag predicted for the same corpus position. `predicted` is `None` when a
/// key-based alignment kept an unmatched reference token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignedTag {
    pub gold: String,
    pub predicted: Option<String>,
    pub sentence_id: usize,
}

impl AlignedTag {
    pub fn is_correct(&self) -> bool {
        self.predicted.as_deref() == Some(self.gold.as_str())
    }
}

/// Output of the aligner. Tags are stored flat and grouped by sentence with an offset table. Every
/// sentence of the boundaries has an entry, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AlignedPair {
    pub(crate) tags: Box<[AlignedTag]>,
    pub(crate) indices: Box<[usize]>,
    pub(crate) length_mismatch: Option<LengthMismatch>,
    pub(crate) unmatched_reference: usize,
    pub(crate) unmatched_prediction: usize,
}

impl AlignedPair {
    /// Builds the pair from per-sentence groups, one group per sentence id.
    pub(crate) fn from_sentences(sentences: Vec<Vec<AlignedTag>>) -> Self {
        let length: usize = sentences.iter().map(|v| v.len()).sum();
        let mut tags = Vec::with_capacity(length);
        let mut indices = Vec::with_capacity(sentences.len() + 1);
        indices.push(0);
        for sentence in sentences {
            tags.extend(sentence);
            indices.push(tags.len());
        }
        Self {
            tags: tags.into_boxed_slice(),
            indices: indices.into_boxed_slice(),
            ..Default::default()
        }
    }

    pub(crate) fn with_length_mismatch(mut self, mismatch: Option<LengthMismatch>) -> Self {
        self.length_mismatch = mismatch;
        self
    }

    pub(crate) fn with_unmatched(mut self, reference: usize, prediction: usize) -> Self {
        self.unmatched_reference = reference;
        self.unmatched_prediction = prediction;
        self
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, AlignedTag> {
        self.tags.iter()
    }

    /// Number of sentences, empty ones included.
    pub fn sentence_count(&self) -> usize {
        self.indices.len().saturating_sub(1)
    }

    /// Iterates over the aligned sentences in sentence order. The n-th slice holds the tags of
    /// sentence n and is empty when nothing of that sentence could be aligned.
    pub fn iter_sentences(&self) -> SentencesIter<'_> {
        SentencesIter {
            pair: self,
            position: 0,
        }
    }

    pub fn length_mismatch(&self) -> Option<LengthMismatch> {
        self.length_mismatch
    }

    /// Reference tokens a key-based alignment could not match.
    pub fn unmatched_reference(&self) -> usize {
        self.unmatched_reference
    }

    /// Prediction tokens a key-based alignment could not match.
    pub fn unmatched_prediction(&self) -> usize {
        self.unmatched_prediction
    }
}

impl<'a> IntoIterator for &'a AlignedPair {
    type Item = &'a AlignedTag;
    type IntoIter = Iter<'a, AlignedTag>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct SentencesIter<'a> {
    pair: &'a AlignedPair,
    position: usize,
}

impl<'a> Iterator for SentencesIter<'a> {
    type Item = &'a [AlignedTag];
    fn next(&mut self) -> Option<Self::Item> {
        let start = *self.pair.indices.get(self.position)?;
        let end = *self.pair.indices.get(self.position + 1)?;
        self.position += 1;
        self.pair.tags.get(start..end)
    }
}
