use indexmap::IndexMap;

use crate::error::ChessError;

/// Key under which the raw movetext of a game is exposed.
pub const MOVES_KEY: &str = "Moves";

/// One game as read from a PGN block: the allow-listed header tags plus the
/// raw move-and-annotation line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameRecord {
    tags: IndexMap<String, String>,
    moves: Option<String>,
}

impl GameRecord {
    /// Stores a tag value. A repeated tag overwrites the earlier value.
    pub fn set_tag(&mut self, key: &str, value: &str) {
        self.tags.insert(key.to_string(), value.to_string());
    }

    pub fn set_moves(&mut self, moves: &str) {
        self.moves = Some(moves.to_string());
    }

    /// Looks up a field by name; `"Moves"` resolves to the movetext.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == MOVES_KEY {
            self.moves.as_deref()
        } else {
            self.tags.get(key).map(String::as_str)
        }
    }

    pub fn moves(&self) -> Result<&str, ChessError> {
        self.moves.as_deref().ok_or(ChessError::MissingMoves)
    }

    /// Coerces a rating tag to an integer. An absent tag is `Ok(None)`;
    /// a present but non-numeric value is a conversion error.
    pub fn rating(&self, tag: &str) -> Result<Option<i32>, ChessError> {
        let Some(raw) = self.tags.get(tag) else {
            return Ok(None);
        };

        let s = raw.trim();
        s.parse::<i32>()
            .map(Some)
            .map_err(|_| ChessError::InvalidRating {
                tag: tag.to_string(),
                value: s.to_string(),
            })
    }
}
