//! Match acceptance policies.
//!
//! [`ErrorSummation`] turns two per-row positional errors into the largest
//! separation that still counts as a match. [`MultiJoinType`] decides, per
//! table, whether a matched group is reported given which tables have a row
//! in it. [`PairMode`] selects which pairs a two-table match keeps.

use std::fmt;
use std::str::FromStr;

use crate::{MatchError, Result};

/// How two independent errors combine into a match threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorSummation {
    /// Arithmetic sum, `a + b`.
    #[default]
    Simple,
    /// Root sum of squares, `sqrt(a² + b²)`.
    Quadrature,
}

impl ErrorSummation {
    pub const ALL: [ErrorSummation; 2] = [ErrorSummation::Simple, ErrorSummation::Quadrature];

    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            ErrorSummation::Simple => a + b,
            ErrorSummation::Quadrature => (a * a + b * b).sqrt(),
        }
    }

    /// Square of [`combine`](Self::combine), computed without the square
    /// root where possible.
    pub fn combine_squared(self, a: f64, b: f64) -> f64 {
        match self {
            ErrorSummation::Simple => {
                let sum = a + b;
                sum * sum
            }
            ErrorSummation::Quadrature => a * a + b * b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorSummation::Simple => "simple",
            ErrorSummation::Quadrature => "quadrature",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorSummation::Simple => "Threshold is the sum of the two errors",
            ErrorSummation::Quadrature => {
                "Threshold is the square root of the sum of the squared errors"
            }
        }
    }
}

impl fmt::Display for ErrorSummation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorSummation {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MatchError::Config(format!("unknown error summation '{s}'")))
    }
}

/// Per-table constraint on whether a matched group is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MultiJoinType {
    /// The table must have a row in the group.
    Match,
    /// The table must not have a row in the group.
    NoMatch,
    /// Any group with a row from this table is reported.
    Always,
    /// No constraint.
    #[default]
    Default,
}

impl MultiJoinType {
    pub const ALL: [MultiJoinType; 4] = [
        MultiJoinType::Match,
        MultiJoinType::NoMatch,
        MultiJoinType::Always,
        MultiJoinType::Default,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MultiJoinType::Match => "match",
            MultiJoinType::NoMatch => "nomatch",
            MultiJoinType::Always => "always",
            MultiJoinType::Default => "default",
        }
    }

    /// Decide whether a group with the given per-table presence is
    /// reported.
    ///
    /// A present table flagged [`Always`](Self::Always) accepts the group
    /// outright. Otherwise the group is rejected if a [`Match`](Self::Match)
    /// table is absent or a [`NoMatch`](Self::NoMatch) table is present.
    /// Slices of different lengths are a configuration error.
    pub fn accept(types: &[MultiJoinType], present: &[bool]) -> Result<bool> {
        if types.len() != present.len() {
            return Err(MatchError::Config(format!(
                "{} join types given for {} tables",
                types.len(),
                present.len()
            )));
        }
        let pairs = || types.iter().zip(present.iter());
        if pairs().any(|(t, &p)| *t == MultiJoinType::Always && p) {
            return Ok(true);
        }
        Ok(pairs().all(|(t, &p)| match t {
            MultiJoinType::Match => p,
            MultiJoinType::NoMatch => !p,
            MultiJoinType::Always | MultiJoinType::Default => true,
        }))
    }
}

impl fmt::Display for MultiJoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MultiJoinType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MatchError::Config(format!("unknown join type '{s}'")))
    }
}

/// Which pairs a two-table match reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PairMode {
    /// Every matching pair.
    All,
    /// Best pairs overall, each row in at most one pair.
    #[default]
    Best,
    /// For each row of the first table, its best partner in the second.
    Best1,
    /// For each row of the second table, its best partner in the first.
    Best2,
    /// Pairs whose rows are each other's best partner.
    Symmetric,
}

impl PairMode {
    pub const ALL: [PairMode; 5] = [
        PairMode::All,
        PairMode::Best,
        PairMode::Best1,
        PairMode::Best2,
        PairMode::Symmetric,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PairMode::All => "all",
            PairMode::Best => "best",
            PairMode::Best1 => "best1",
            PairMode::Best2 => "best2",
            PairMode::Symmetric => "symmetric",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PairMode::All => "All matches",
            PairMode::Best => "Best match, symmetric, each row used at most once",
            PairMode::Best1 => "Best match for each row of table 1",
            PairMode::Best2 => "Best match for each row of table 2",
            PairMode::Symmetric => "Pairs that are the best match for both of their rows",
        }
    }
}

impl fmt::Display for PairMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PairMode {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MatchError::Config(format!("unknown pair mode '{s}'")))
    }
}
