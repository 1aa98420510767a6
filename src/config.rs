/*
 * This modules contains the `EvalConfig` struct and its builder. The config is passed to
 * `evaluate`, `score` and `evaluate_batch` to simplify their arguments.
*/
use crate::align::AlignmentMode;
use crate::metrics::DivByZeroStrat;
use either::Either as LeftOrRight;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Number of misclassification pairs kept in a report unless told otherwise.
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
/// Settings of an evaluation. The alignment mode has no default: it must be chosen by the caller.
pub struct EvalConfig {
    pub(crate) mode: AlignmentMode,
    pub(crate) zero_division: DivByZeroStrat,
    pub(crate) top_k: usize,
    pub(crate) parallel: bool,
}

impl EvalConfig {
    /// Config with every setting but the alignment mode left at its default.
    pub fn new(mode: AlignmentMode) -> Self {
        EvalConfigBuilder::<DivByZeroStrat>::new(mode).build()
    }

    pub fn mode(&self) -> AlignmentMode {
        self.mode
    }

    pub fn zero_division(&self) -> DivByZeroStrat {
        self.zero_division
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }
}

impl<ZeroDiv> From<EvalConfigBuilder<ZeroDiv>> for EvalConfig
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    fn from(value: EvalConfigBuilder<ZeroDiv>) -> Self {
        Self {
            mode: value.mode,
            zero_division: value.zero_division.either_into(),
            top_k: value.top_k,
            parallel: value.parallel,
        }
    }
}

impl Display for EvalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Alignment mode: {}\n Strategy when encountering a division by zero: {}\n Misclassification pairs reported: {}\n Using parallel computations: {}",
            self.mode, self.zero_division, self.top_k, self.parallel
        )
    }
}

/// This builder can be used to build and customize an `EvalConfig` stucture.
pub struct EvalConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    mode: AlignmentMode,
    zero_division: LeftOrRight<ZeroDiv, DivByZeroStrat>,
    top_k: usize,
    parallel: bool,
}

impl<ZeroDiv> EvalConfigBuilder<ZeroDiv>
where
    ZeroDiv: Into<DivByZeroStrat>,
{
    pub fn new(mode: AlignmentMode) -> Self {
        Self {
            mode,
            zero_division: LeftOrRight::Right(DivByZeroStrat::ReplaceBy0),
            top_k: DEFAULT_TOP_K,
            parallel: false,
        }
    }
    pub fn mode(mut self, mode: AlignmentMode) -> Self {
        self.mode = mode;
        self
    }
    pub fn division_by_zero(mut self, division_by_zero: ZeroDiv) -> Self {
        self.zero_division = LeftOrRight::Left(division_by_zero);
        self
    }
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn build(self) -> EvalConfig {
        EvalConfig::from(self)
    }
}
