//! Per-game loss and blunder statistics derived from `[%eval ...]` annotations.
//!
//! Evaluations are read in pawn units from White's perspective. The loss of a
//! ply is the absolute change between consecutive evaluations, and it is
//! charged to the side that just moved.

use regex::Regex;
use shakmaty::Color;
use smallvec::SmallVec;
use std::sync::LazyLock;

use crate::error::ChessError;

/// Pawn-to-centipawn conversion applied to average losses.
pub const CENTIPAWNS_PER_PAWN: f64 = 100.0;

static EVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\beval\s+([+-]?\d+(?:\.\d+)?)").unwrap());

pub type EvaluationSequence = SmallVec<[f64; 128]>;
pub type LossSequence = SmallVec<[f64; 128]>;

/// Returns every annotated evaluation in order of appearance.
///
/// Only signed decimal scores are read. Mate scores such as `[%eval #3]` are
/// skipped, so a mate annotation mid-game shifts every later loss onto the
/// other side.
pub fn extract_evaluations(movetext: &str) -> EvaluationSequence {
    EVAL_RE
        .captures_iter(movetext)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

pub fn has_evaluations(movetext: &str) -> bool {
    EVAL_RE.is_match(movetext)
}

pub fn loss_sequence(evals: &[f64]) -> LossSequence {
    evals.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

/// Assigns loss indices to sides.
///
/// With `start_parity = 0` Black owns indices 0, 2, 4, ... and White owns
/// 1, 3, 5, ...: the first loss is the swing caused by Black's first reply
/// to an annotated White move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SideSplit {
    start_parity: usize,
}

impl SideSplit {
    pub const fn new(start_parity: usize) -> Self {
        Self { start_parity }
    }

    fn first_index(self, color: Color) -> usize {
        match color {
            Color::White => self.start_parity + 1,
            Color::Black => self.start_parity,
        }
    }

    pub fn side_losses(self, losses: &[f64], color: Color) -> impl Iterator<Item = f64> + '_ {
        losses
            .iter()
            .skip(self.first_index(color))
            .step_by(2)
            .copied()
    }
}

/// Loss above which a move counts as a blunder, in pawns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlunderThreshold(f64);

impl BlunderThreshold {
    pub fn new(pawns: f64) -> Result<Self, ChessError> {
        if pawns.is_finite() && pawns > 0.0 {
            Ok(Self(pawns))
        } else {
            Err(ChessError::InvalidThreshold { value: pawns })
        }
    }

    pub fn pawns(self) -> f64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossMetrics {
    /// `None` when the side has no attributed losses.
    pub acpl_white: Option<f64>,
    pub acpl_black: Option<f64>,
    /// Half the loss count, rounded down. A game ending on an odd number of
    /// annotated plies is one move short.
    pub num_moves: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Blunders {
    pub white: usize,
    pub black: usize,
}

impl Blunders {
    pub fn get(&self, color: Color) -> usize {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn acpl(losses: &[f64], split: SideSplit, color: Color) -> Option<f64> {
    mean(split.side_losses(losses, color)).map(|m| m * CENTIPAWNS_PER_PAWN)
}

fn count_blunders(
    losses: &[f64],
    split: SideSplit,
    color: Color,
    threshold: BlunderThreshold,
) -> usize {
    split
        .side_losses(losses, color)
        .filter(|&loss| loss > threshold.pawns())
        .count()
}

fn loss_metrics_from_losses(losses: &[f64], split: SideSplit) -> LossMetrics {
    LossMetrics {
        acpl_white: acpl(losses, split, Color::White),
        acpl_black: acpl(losses, split, Color::Black),
        num_moves: losses.len() / 2,
    }
}

fn blunders_from_losses(losses: &[f64], split: SideSplit, threshold: BlunderThreshold) -> Blunders {
    Blunders {
        white: count_blunders(losses, split, Color::White, threshold),
        black: count_blunders(losses, split, Color::Black, threshold),
    }
}

pub fn compute_loss_metrics(movetext: &str, split: SideSplit) -> LossMetrics {
    let evals = extract_evaluations(movetext);
    loss_metrics_from_losses(&loss_sequence(&evals), split)
}

pub fn compute_blunders(movetext: &str, threshold: BlunderThreshold, split: SideSplit) -> Blunders {
    let evals = extract_evaluations(movetext);
    blunders_from_losses(&loss_sequence(&evals), split, threshold)
}

/// Everything derived from one game's movetext in a single scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GameMetrics {
    pub num_evals: usize,
    pub loss: LossMetrics,
    pub blunders: Blunders,
}

impl GameMetrics {
    pub fn compute(movetext: &str, threshold: BlunderThreshold, split: SideSplit) -> Self {
        Self {
            num_evals: extract_evaluations(movetext).len(),
            loss: compute_loss_metrics(movetext, split),
            blunders: compute_blunders(movetext, threshold, split),
        }
    }

    pub fn acpl(&self, color: Color) -> Option<f64> {
        match color {
            Color::White => self.loss.acpl_white,
            Color::Black => self.loss.acpl_black,
        }
    }

    /// Blunders per move; undefined for games shorter than one full move.
    pub fn blunder_rate(&self, color: Color) -> Option<f64> {
        let moves = self.loss.num_moves;
        (moves > 0).then(|| self.blunders.get(color) as f64 / moves as f64)
    }
}
