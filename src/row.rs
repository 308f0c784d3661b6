use shakmaty::Color;

use crate::config::{BLACK_RATING_TAG, RATING_TAGS, ScanOptions, WHITE_RATING_TAG};
use crate::error::ErrorAccumulator;
use crate::log;
use crate::metrics::{GameMetrics, has_evaluations};
use crate::movetext::count_mainline_plies;
use crate::types::GameRecord;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagColumnKind {
    Varchar,
    Integer,
}

impl TagColumnKind {
    pub fn for_tag(tag: &str) -> Self {
        if RATING_TAGS.contains(&tag) {
            Self::Integer
        } else {
            Self::Varchar
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Varchar(Option<String>),
    Integer(Option<i32>),
}

/// One output row of `read_pgn_metrics`.
#[derive(Clone, Debug, PartialEq)]
pub struct GameRow {
    pub tags: Vec<TagValue>,
    pub moves: Option<String>,
    pub num_plies: Option<u32>,
    pub metrics: Option<GameMetrics>,
    pub rating_diff: Option<i32>,
    pub parse_error: Option<String>,
}

impl GameRow {
    pub fn blunder_rate(&self, color: Color) -> Option<f64> {
        self.metrics.as_ref().and_then(|m| m.blunder_rate(color))
    }
}

/// Whether a record passes the `annotated_only` filter.
pub fn is_selected(record: &GameRecord, options: &ScanOptions) -> bool {
    if !options.annotated_only {
        return true;
    }
    // A record without movetext is kept so the error surfaces in `parse_error`.
    record.moves().map(has_evaluations).unwrap_or(true)
}

fn rating_or_report(
    record: &GameRecord,
    tag: &str,
    parse_error: &mut ErrorAccumulator,
) -> Option<i32> {
    match record.rating(tag) {
        Ok(rating) => rating,
        Err(err) => {
            let msg = err.to_string();
            log::warn(&msg);
            parse_error.push(&msg);
            None
        }
    }
}

pub fn build_row(record: &GameRecord, options: &ScanOptions) -> GameRow {
    let mut parse_error = ErrorAccumulator::default();

    let tags: Vec<TagValue> = options
        .tags
        .iter()
        .map(|tag| match TagColumnKind::for_tag(tag) {
            TagColumnKind::Varchar => TagValue::Varchar(record.get(tag).map(str::to_string)),
            TagColumnKind::Integer => {
                TagValue::Integer(rating_or_report(record, tag, &mut parse_error))
            }
        })
        .collect();

    let rating_of = |tag: &str| {
        let idx = options.tags.iter().position(|t| t == tag)?;
        match &tags[idx] {
            TagValue::Integer(rating) => *rating,
            TagValue::Varchar(_) => None,
        }
    };
    let rating_diff = rating_of(WHITE_RATING_TAG)
        .zip(rating_of(BLACK_RATING_TAG))
        .and_then(|(white, black)| white.checked_sub(black));

    let (moves, num_plies, metrics) = match record.moves() {
        Ok(moves) => (
            Some(moves.to_string()),
            count_mainline_plies(moves),
            Some(GameMetrics::compute(moves, options.threshold, options.split)),
        ),
        Err(err) => {
            let msg = err.to_string();
            log::warn(&msg);
            parse_error.push(&msg);
            (None, None, None)
        }
    };

    GameRow {
        tags,
        moves,
        num_plies,
        metrics,
        rating_diff,
        parse_error: parse_error.take(),
    }
}
