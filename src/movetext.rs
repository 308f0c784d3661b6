use duckdb::{
    Result,
    core::{DataChunkHandle, LogicalTypeHandle, LogicalTypeId},
    vscalar::{ScalarFunctionSignature, VScalar},
    vtab::arrow::WritableVector,
};
use pgn_reader::{Nag, RawComment, Reader, SanPlus, Skip, Visitor};
use std::error::Error;
use std::io;
use std::ops::ControlFlow;

use crate::duckdb_impl::scalar::invoke_unary_varchar_to_u64_nullable;

macro_rules! pgn_visitor_skip_variations {
    () => {
        fn nag(&mut self, _: &mut Self::Movetext, _: Nag) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn partial_comment(
            &mut self,
            _: &mut Self::Movetext,
            _: RawComment<'_>,
        ) -> ControlFlow<Self::Output> {
            ControlFlow::Continue(())
        }

        fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
            ControlFlow::Continue(Skip(true))
        }
    };
}

/// Counts mainline half-moves with pgn-reader. Variations, comments and NAGs
/// are skipped.
#[derive(Default)]
struct PlyCounter {
    plies: u32,
}

impl Visitor for PlyCounter {
    type Tags = ();
    type Movetext = ();
    type Output = u32;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        self.plies = 0;
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn san(
        &mut self,
        _movetext: &mut Self::Movetext,
        _san_plus: SanPlus,
    ) -> ControlFlow<Self::Output> {
        self.plies += 1;
        ControlFlow::Continue(())
    }

    pgn_visitor_skip_variations!();

    fn end_game(&mut self, _movetext: Self::Movetext) -> Self::Output {
        self.plies
    }
}

/// Number of half-moves played on the mainline, or `None` when the text is
/// not movetext.
///
/// Compared against the evaluation count this shows whether every ply of a
/// game carries an annotation.
pub fn count_mainline_plies(movetext: &str) -> Option<u32> {
    if movetext.trim().is_empty() {
        return Some(0);
    }

    let mut reader = Reader::new(io::Cursor::new(movetext.as_bytes()));
    let mut visitor = PlyCounter::default();

    match reader.read_game(&mut visitor) {
        Ok(Some(plies)) => Some(plies),
        Ok(None) | Err(_) => None,
    }
}

pub struct ChessPlyCountScalar;

impl VScalar for ChessPlyCountScalar {
    type State = ();

    unsafe fn invoke(
        _state: &Self::State,
        input: &mut DataChunkHandle,
        output: &mut dyn WritableVector,
    ) -> Result<(), Box<dyn Error>> {
        invoke_unary_varchar_to_u64_nullable(input, output, |movetext| {
            count_mainline_plies(movetext).map(u64::from)
        })
    }

    fn signatures() -> Vec<ScalarFunctionSignature> {
        vec![ScalarFunctionSignature::exact(
            vec![LogicalTypeHandle::from(LogicalTypeId::Varchar)],
            LogicalTypeHandle::from(LogicalTypeId::UBigint),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_plies_through_annotations() {
        let movetext = "1. e4 { [%eval 0.17] [%clk 0:05:00] } 1... c5 { [%eval 0.19] } \
                        2. Nf3 { [%eval 0.25] } 1-0";
        assert_eq!(count_mainline_plies(movetext), Some(3));
    }

    #[test]
    fn test_variations_and_nags_are_not_counted() {
        let movetext = "1. e4! (1. d4 d5 2. c4) e5?? $2 2. Nf3 Nc6 *";
        assert_eq!(count_mainline_plies(movetext), Some(4));
    }

    #[test]
    fn test_blank_movetext_has_no_plies() {
        assert_eq!(count_mainline_plies(""), Some(0));
        assert_eq!(count_mainline_plies("  \t"), Some(0));
    }

    #[test]
    fn test_sample_game_ply_count() {
        let pgn = include_str!("../test/pgn_files/sample_annotated.pgn");
        let movetext = pgn
            .lines()
            .find(|line| line.starts_with("1. "))
            .expect("sample has a movetext line");
        assert_eq!(count_mainline_plies(movetext), Some(26));
    }
}
