//! Line-oriented PGN block reader.
//!
//! Every game is a run of `[Key "Value"]` lines followed by exactly one
//! movetext line. The movetext line closes the block, so records can be
//! yielded as soon as it is read without looking ahead.

use regex::Regex;
use std::io::BufRead;
use std::mem;
use std::sync::LazyLock;

use crate::config::TagAllowList;
use crate::error::ChessError;
use crate::log;
use crate::types::GameRecord;

const UTF8_BOM: char = '\u{feff}';

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\[([^\s\]"]+)\s+"(.*)"\s*\]$"#).unwrap());

#[derive(Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    Tag { key: &'a str, value: &'a str },
    Moves(&'a str),
}

/// Classifies one input line. Blank lines yield `Ok(None)`.
pub fn classify_line(line: &str, line_number: usize) -> Result<Option<LineKind<'_>>, ChessError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(caps) = TAG_RE.captures(line)
        && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
    {
        return Ok(Some(LineKind::Tag {
            key: key.as_str(),
            value: value.as_str(),
        }));
    }

    if line.starts_with('[') {
        return Err(ChessError::MalformedTag {
            line_number,
            line: line.to_string(),
        });
    }

    Ok(Some(LineKind::Moves(line)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExtractorState {
    Accumulating,
    Exhausted,
}

/// Streaming iterator over the games of one PGN source.
///
/// After the first error the iterator is exhausted.
pub struct GameRecords<R> {
    input: R,
    allow_list: TagAllowList,
    state: ExtractorState,
    current: GameRecord,
    pending_header_lines: usize,
    line_number: usize,
    line_buf: Vec<u8>,
}

impl<R: BufRead> GameRecords<R> {
    pub fn new(input: R, allow_list: TagAllowList) -> Self {
        Self {
            input,
            allow_list,
            state: ExtractorState::Accumulating,
            current: GameRecord::default(),
            pending_header_lines: 0,
            line_number: 0,
            line_buf: Vec::with_capacity(1024),
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn read_line(&mut self) -> Result<Option<String>, ChessError> {
        self.line_buf.clear();
        let read = self.input.read_until(b'\n', &mut self.line_buf)?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let mut line = String::from_utf8_lossy(&self.line_buf).into_owned();
        if self.line_number == 1 && line.starts_with(UTF8_BOM) {
            line.drain(..UTF8_BOM.len_utf8());
        }
        Ok(Some(line))
    }

    fn finish(&mut self) {
        self.state = ExtractorState::Exhausted;
        if self.pending_header_lines > 0 {
            log::warn(format!(
                "Dropping {} trailing tag line(s) without movetext at end of input (line {})",
                self.pending_header_lines, self.line_number
            ));
        }
        self.current = GameRecord::default();
        self.pending_header_lines = 0;
    }

    fn next_record(&mut self) -> Result<Option<GameRecord>, ChessError> {
        while let Some(line) = self.read_line()? {
            match classify_line(&line, self.line_number)? {
                None => {}
                Some(LineKind::Tag { key, value }) => {
                    self.pending_header_lines += 1;
                    if self.allow_list.contains(key) {
                        self.current.set_tag(key, value);
                    }
                }
                Some(LineKind::Moves(moves)) => {
                    self.current.set_moves(moves);
                    self.pending_header_lines = 0;
                    return Ok(Some(mem::take(&mut self.current)));
                }
            }
        }
        Ok(None)
    }
}

impl<R: BufRead> Iterator for GameRecords<R> {
    type Item = Result<GameRecord, ChessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ExtractorState::Exhausted {
            return None;
        }

        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(err) => {
                self.state = ExtractorState::Exhausted;
                Some(Err(err))
            }
        }
    }
}
