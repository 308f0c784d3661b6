use std::io;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ChessError {
    #[display("Malformed tag line {line_number}: '{line}' is not a [Key \"Value\"] tag")]
    MalformedTag { line_number: usize, line: String },
    #[display("I/O error while reading PGN input: {source}")]
    Io { source: io::Error },
    #[display("Game record has no Moves field")]
    MissingMoves,
    #[display("Conversion error: {tag}='{value}'")]
    InvalidRating { tag: String, value: String },
    #[display("Invalid blunder threshold {value}: must be a positive finite number of pawns")]
    InvalidThreshold { value: f64 },
    #[display("Invalid {name} value '{value}'. Supported values: {expected}")]
    InvalidOption {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl From<io::Error> for ChessError {
    fn from(source: io::Error) -> Self {
        Self::Io { source }
    }
}

/// Collects non-fatal per-row diagnostics for the `parse_error` column.
#[derive(Debug, Clone, Default)]
pub struct ErrorAccumulator(Option<String>);

impl ErrorAccumulator {
    pub fn push(&mut self, msg: &str) {
        match &mut self.0 {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(msg);
            }
            None => {
                self.0 = Some(msg.to_string());
            }
        }
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}
