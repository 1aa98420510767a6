/*!
Alignment of a reference and a prediction token sequence into a common index space.

Both sequences are cut into sentences with the same [`SentenceBoundary`] cursor. Two modes exist
and the caller always picks one explicitly:

* [`AlignmentMode::Positional`]: the i-th token of a sentence in the reference is paired with the
    i-th token of the same sentence in the prediction, whatever the two tokens are.
* [`AlignmentMode::KeyBased`]: inside a sentence, a reference token is paired with a prediction
    token carrying the exact same string. Each prediction token is used at most once.
* [`AlignmentMode::Fuzzy`]: inside a sentence, a reference token is paired with the unused
    prediction token whose string is the most similar to its own (normalised Levenshtein
    similarity), provided the similarity reaches the threshold. This absorbs tokenization
    differences such as `cauda.` against `cauda` `.`.

Neither mode ever reads past the end of a sequence. When the boundaries imply more (or fewer)
words than a sequence holds, slices are clamped: the last sentences silently get shorter and a
[`LengthMismatch`] is recorded on the [`AlignedPair`].
*/
use crate::datastructure::{
    AlignedPair, AlignedTag, LengthMismatch, SentenceBoundary, Token, TokenSequence,
};
use crate::error::{EvalError, Result};
use ahash::{random_state::RandomState, HashMap as AHashMap};
use enum_iterator::Sequence;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use std::collections::VecDeque;
use std::fmt::Display;
use std::str::FromStr;

/// Similarity threshold of the fuzzy join unless told otherwise.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.5;

/// What happens to reference tokens the key-based or fuzzy join could not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Sequence)]
pub enum UnmatchedPolicy {
    /// Inner join: unmatched tokens are left out of the aligned pair, which lowers the support.
    Drop,
    /// Unmatched reference tokens are kept without a prediction and scored as errors.
    CountAsIncorrect,
}

impl Display for UnmatchedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::CountAsIncorrect => write!(f, "count-as-incorrect"),
        }
    }
}

impl FromStr for UnmatchedPolicy {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "count-as-incorrect" | "countasincorrect" | "incorrect" => Ok(Self::CountAsIncorrect),
            _ => Err(EvalError::parse("`UnmatchedPolicy`", s)),
        }
    }
}

/// How the prediction is paired with the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// Pair tokens by their position inside each sentence.
    Positional,
    /// Pair tokens by exact string equality inside each sentence.
    KeyBased(UnmatchedPolicy),
    /// Pair tokens by string similarity inside each sentence. `threshold` lies in `[0, 1]`.
    Fuzzy {
        threshold: f64,
        unmatched: UnmatchedPolicy,
    },
}

impl AlignmentMode {
    fn check(&self) -> Result<()> {
        match self {
            Self::Fuzzy { threshold, .. } if !(0.0..=1.0).contains(threshold) => {
                Err(EvalError::InvalidThreshold(*threshold))
            }
            _ => Ok(()),
        }
    }
}

impl Display for AlignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::KeyBased(policy) => write!(f, "key-based:{}", policy),
            Self::Fuzzy {
                threshold,
                unmatched,
            } => write!(f, "fuzzy:{}:{}", threshold, unmatched),
        }
    }
}

/// Parses `positional`, `key-based` (dropping unmatched tokens), `key-based:<policy>`, `fuzzy`
/// (threshold 0.5, dropping unmatched tokens), `fuzzy:<threshold>` or
/// `fuzzy:<threshold>:<policy>`.
impl FromStr for AlignmentMode {
    type Err = EvalError;
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        let mut parts = lowered.split(':');
        let mode = parts.next().unwrap_or_default();
        let rest: Vec<&str> = parts.collect();
        let parsed = match (mode, rest.as_slice()) {
            ("positional", []) => Self::Positional,
            ("key-based" | "keybased" | "key", []) => Self::KeyBased(UnmatchedPolicy::Drop),
            ("key-based" | "keybased" | "key", [policy]) => Self::KeyBased(policy.parse()?),
            ("fuzzy", []) => Self::Fuzzy {
                threshold: DEFAULT_FUZZY_THRESHOLD,
                unmatched: UnmatchedPolicy::Drop,
            },
            ("fuzzy", [threshold]) => Self::Fuzzy {
                threshold: parse_threshold(threshold)?,
                unmatched: UnmatchedPolicy::Drop,
            },
            ("fuzzy", [threshold, policy]) => Self::Fuzzy {
                threshold: parse_threshold(threshold)?,
                unmatched: policy.parse()?,
            },
            _ => return Err(EvalError::parse("`AlignmentMode`", s)),
        };
        parsed.check()?;
        Ok(parsed)
    }
}

fn parse_threshold(value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| EvalError::parse("similarity threshold", value))
}

/// Aligns `prediction` on `reference` sentence by sentence.
///
/// * `reference`: Gold tokens
/// * `prediction`: Predicted tokens
/// * `boundaries`: Word count of every sentence
/// * `mode`: Pairing strategy
pub fn align(
    reference: &TokenSequence,
    prediction: &TokenSequence,
    boundaries: &SentenceBoundary,
    mode: AlignmentMode,
) -> Result<AlignedPair> {
    if reference.is_empty() {
        return Err(EvalError::empty("reference"));
    }
    if prediction.is_empty() {
        return Err(EvalError::empty("prediction"));
    }
    if boundaries.is_empty() {
        return Err(EvalError::empty("sentence boundaries"));
    }
    mode.check()?;
    let mismatch = LengthMismatch::check(
        boundaries.total_words(),
        reference.len(),
        prediction.len(),
    );
    if let Some(m) = mismatch {
        log::warn!(
            "sentence boundaries cover {} words but the reference has {} and the prediction {} tokens; slices are clamped",
            m.boundary_words,
            m.reference_len,
            m.prediction_len
        );
    }
    let pair = match mode {
        AlignmentMode::Positional => {
            AlignedPair::from_sentences(align_positional(reference, prediction, boundaries))
        }
        AlignmentMode::KeyBased(policy) => {
            join_by_sentence(reference, prediction, boundaries, policy, ExactMatcher::new)
        }
        AlignmentMode::Fuzzy {
            threshold,
            unmatched,
        } => join_by_sentence(reference, prediction, boundaries, unmatched, |tokens| {
            FuzzyMatcher::new(tokens, threshold)
        }),
    };
    log::debug!("aligned {} tokens in {} mode", pair.len(), mode);
    Ok(pair.with_length_mismatch(mismatch))
}

fn align_positional(
    reference: &TokenSequence,
    prediction: &TokenSequence,
    boundaries: &SentenceBoundary,
) -> Vec<Vec<AlignedTag>> {
    let mut cursor = 0usize;
    boundaries
        .lengths()
        .iter()
        .enumerate()
        .map(|(sentence_id, &length)| {
            let reference_slice = reference.window(cursor, length);
            let prediction_slice = prediction.window(cursor, length);
            cursor = cursor.saturating_add(length);
            reference_slice
                .iter()
                .zip(prediction_slice)
                .map(|(r, p)| AlignedTag {
                    gold: r.tag.clone(),
                    predicted: Some(p.tag.clone()),
                    sentence_id,
                })
                .collect()
        })
        .collect()
}

/// Groups the tokens of a sequence by sentence id. Tokens beyond the last sentence are ignored.
fn group_by_sentence<'a>(
    sequence: &'a TokenSequence,
    boundaries: &SentenceBoundary,
) -> Vec<Vec<&'a Token>> {
    let mut groups: Vec<Vec<&Token>> = boundaries
        .lengths()
        .iter()
        .map(|l| Vec::with_capacity(*l))
        .collect();
    for (sentence_id, token) in boundaries.sentence_ids().zip(sequence.as_slice()) {
        groups[sentence_id].push(token);
    }
    groups
}

/// Hands out the prediction tokens of one sentence to the reference tokens asking for them. A
/// prediction token is handed out at most once.
trait TokenMatcher<'a> {
    fn take(&mut self, reference: &Token) -> Option<&'a Token>;
}

/// First unused prediction token with the same string.
struct ExactMatcher<'a> {
    candidates: AHashMap<&'a str, VecDeque<&'a Token>>,
}

impl<'a> ExactMatcher<'a> {
    fn new(tokens: Vec<&'a Token>) -> Self {
        let mut candidates: AHashMap<&str, VecDeque<&Token>> =
            AHashMap::with_capacity_and_hasher(tokens.len(), RandomState::new());
        for token in tokens {
            candidates
                .entry(token.token.as_str())
                .or_default()
                .push_back(token);
        }
        Self { candidates }
    }
}

impl<'a> TokenMatcher<'a> for ExactMatcher<'a> {
    fn take(&mut self, reference: &Token) -> Option<&'a Token> {
        self.candidates
            .get_mut(reference.token.as_str())
            .and_then(|queue| queue.pop_front())
    }
}

/// Most similar unused prediction token, if it reaches the threshold. Ties go to the earliest
/// token and a similarity of 0 never matches.
struct FuzzyMatcher<'a> {
    tokens: Vec<&'a Token>,
    used: Vec<bool>,
    threshold: f64,
}

impl<'a> FuzzyMatcher<'a> {
    fn new(tokens: Vec<&'a Token>, threshold: f64) -> Self {
        let used = vec![false; tokens.len()];
        Self {
            tokens,
            used,
            threshold,
        }
    }
}

impl<'a> TokenMatcher<'a> for FuzzyMatcher<'a> {
    fn take(&mut self, reference: &Token) -> Option<&'a Token> {
        let mut best: Option<(usize, f64)> = None;
        for (i, candidate) in self.tokens.iter().enumerate() {
            if self.used[i] {
                continue;
            }
            let similarity = normalized_levenshtein(&reference.token, &candidate.token);
            let best_so_far = best.map_or(0.0, |(_, s)| s);
            if similarity > best_so_far && similarity >= self.threshold {
                best = Some((i, similarity));
            }
        }
        let (i, similarity) = best?;
        if similarity < 1.0 {
            log::trace!(
                "fuzzy match {} -> {} ({:.3})",
                reference.token,
                self.tokens[i].token,
                similarity
            );
        }
        self.used[i] = true;
        Some(self.tokens[i])
    }
}

/// Joins the reference and the prediction sentence by sentence, asking a fresh matcher built
/// from the prediction tokens of every sentence.
fn join_by_sentence<'a, M, F>(
    reference: &'a TokenSequence,
    prediction: &'a TokenSequence,
    boundaries: &SentenceBoundary,
    policy: UnmatchedPolicy,
    new_matcher: F,
) -> AlignedPair
where
    M: TokenMatcher<'a>,
    F: Fn(Vec<&'a Token>) -> M,
{
    let reference_groups = group_by_sentence(reference, boundaries);
    let prediction_groups = group_by_sentence(prediction, boundaries);
    let mut unmatched_reference = 0;
    let mut unmatched_prediction = 0;
    let mut sentences = Vec::with_capacity(reference_groups.len());
    for (sentence_id, (reference_tokens, prediction_tokens)) in reference_groups
        .into_iter()
        .zip(prediction_groups)
        .enumerate()
    {
        let available = prediction_tokens.len();
        let mut matcher = new_matcher(prediction_tokens);
        let mut matched = 0;
        let mut sentence = Vec::with_capacity(reference_tokens.len());
        for token in reference_tokens {
            match (matcher.take(token), policy) {
                (Some(p), _) => {
                    matched += 1;
                    sentence.push(AlignedTag {
                        gold: token.tag.clone(),
                        predicted: Some(p.tag.clone()),
                        sentence_id,
                    });
                }
                (None, UnmatchedPolicy::CountAsIncorrect) => {
                    unmatched_reference += 1;
                    sentence.push(AlignedTag {
                        gold: token.tag.clone(),
                        predicted: None,
                        sentence_id,
                    });
                }
                (None, UnmatchedPolicy::Drop) => unmatched_reference += 1,
            }
        }
        unmatched_prediction += available - matched;
        sentences.push(sentence);
    }
    if unmatched_reference > 0 || unmatched_prediction > 0 {
        log::debug!(
            "join left {} reference and {} prediction tokens unmatched ({})",
            unmatched_reference,
            unmatched_prediction,
            policy
        );
    }
    AlignedPair::from_sentences(sentences).with_unmatched(unmatched_reference, unmatched_prediction)
}
