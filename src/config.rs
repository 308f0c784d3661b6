use crate::duckdb_impl::bind_info_ffi::NamedParameterVarchar;
use crate::error::ChessError;
use crate::metrics::{BlunderThreshold, SideSplit};

pub const DEFAULT_TAGS: [&str; 4] = ["WhiteElo", "BlackElo", "TimeControl", "ECO"];
pub const DEFAULT_BLUNDER_THRESHOLD: f64 = 1.5;

pub const WHITE_RATING_TAG: &str = "WhiteElo";
pub const BLACK_RATING_TAG: &str = "BlackElo";

/// Tags whose values are coerced to integers in the output table.
pub const RATING_TAGS: [&str; 2] = [WHITE_RATING_TAG, BLACK_RATING_TAG];

/// Fixed output columns of `read_pgn_metrics`. DuckDB matches column names
/// case-insensitively, so a tag may not reuse any of them in any case.
pub const RESERVED_COLUMNS: [&str; 13] = [
    "Moves",
    "num_evals",
    "num_plies",
    "num_moves",
    "acpl_white",
    "acpl_black",
    "blunders_white",
    "blunders_black",
    "blunder_rate_white",
    "blunder_rate_black",
    "rating_diff",
    "parse_error",
    "Source",
];

fn is_reserved_column(tag: &str) -> bool {
    RESERVED_COLUMNS
        .iter()
        .any(|column| column.eq_ignore_ascii_case(tag))
}

/// Ordered set of header tags kept by the extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagAllowList(Vec<String>);

impl TagAllowList {
    /// Builds the list, dropping blanks and repeats while keeping first
    /// occurrence order.
    pub fn new(tags: impl IntoIterator<Item = String>) -> Self {
        let mut kept: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.trim();
            if !tag.is_empty() && !kept.iter().any(|t| t == tag) {
                kept.push(tag.to_string());
            }
        }
        Self(kept)
    }

    /// Parses a comma separated list such as `"WhiteElo, BlackElo"`.
    pub fn parse(raw: &str) -> Result<Self, ChessError> {
        let list = Self::new(raw.split(',').map(str::to_string));
        if list.0.is_empty() {
            return Err(ChessError::InvalidOption {
                name: NamedParameters::TAGS,
                value: raw.to_string(),
                expected: "a comma separated list of PGN tag names",
            });
        }
        if let Some(tag) = list.iter().find(|tag| is_reserved_column(tag)) {
            return Err(ChessError::InvalidOption {
                name: NamedParameters::TAGS,
                value: tag.to_string(),
                expected: "PGN tag names that are not fixed output columns",
            });
        }
        Ok(list)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for TagAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_TAGS.iter().map(|t| t.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CompressionMode {
    #[default]
    Plain,
    Zstd,
}

impl CompressionMode {
    pub fn parse(raw: &str) -> Result<Self, ChessError> {
        let normalized = raw.trim();
        if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else {
            Err(ChessError::InvalidOption {
                name: NamedParameters::COMPRESSION,
                value: normalized.to_string(),
                expected: "'zstd' or NULL/omitted",
            })
        }
    }
}

/// Options of one `read_pgn_metrics` scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOptions {
    pub tags: TagAllowList,
    pub threshold: BlunderThreshold,
    pub split: SideSplit,
    pub compression: CompressionMode,
    pub annotated_only: bool,
}

/// Raw named parameters as read from the bind callback.
#[derive(Debug)]
pub struct NamedParameters {
    pub tags: NamedParameterVarchar,
    pub blunder_threshold: NamedParameterVarchar,
    pub start_parity: NamedParameterVarchar,
    pub compression: NamedParameterVarchar,
    pub annotated_only: NamedParameterVarchar,
}

impl NamedParameters {
    pub const TAGS: &'static str = "tags";
    pub const BLUNDER_THRESHOLD: &'static str = "blunder_threshold";
    pub const START_PARITY: &'static str = "start_parity";
    pub const COMPRESSION: &'static str = "compression";
    pub const ANNOTATED_ONLY: &'static str = "annotated_only";
}

fn provided(param: &NamedParameterVarchar) -> Option<&str> {
    match param {
        NamedParameterVarchar::Missing | NamedParameterVarchar::Null => None,
        NamedParameterVarchar::Value(raw) => {
            let raw = raw.trim();
            (!raw.eq_ignore_ascii_case("null")).then_some(raw)
        }
    }
}

fn resolve_threshold(param: &NamedParameterVarchar) -> Result<BlunderThreshold, ChessError> {
    let Some(raw) = provided(param) else {
        return BlunderThreshold::new(DEFAULT_BLUNDER_THRESHOLD);
    };

    let pawns = raw.parse::<f64>().map_err(|_| ChessError::InvalidOption {
        name: NamedParameters::BLUNDER_THRESHOLD,
        value: raw.to_string(),
        expected: "a positive number of pawns, e.g. 1.5",
    })?;
    BlunderThreshold::new(pawns)
}

fn resolve_start_parity(param: &NamedParameterVarchar) -> Result<SideSplit, ChessError> {
    let Some(raw) = provided(param) else {
        return Ok(SideSplit::default());
    };

    raw.parse::<usize>()
        .map(SideSplit::new)
        .map_err(|_| ChessError::InvalidOption {
            name: NamedParameters::START_PARITY,
            value: raw.to_string(),
            expected: "a non-negative integer (0 when the first annotation follows White's move)",
        })
}

fn resolve_bool(
    param: &NamedParameterVarchar,
    name: &'static str,
    default: bool,
) -> Result<bool, ChessError> {
    let Some(raw) = provided(param) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(ChessError::InvalidOption {
            name,
            value: raw.to_string(),
            expected: "true or false",
        }),
    }
}

impl ScanOptions {
    pub fn resolve(params: &NamedParameters) -> Result<Self, ChessError> {
        let tags = match provided(&params.tags) {
            Some(raw) => TagAllowList::parse(raw)?,
            None => TagAllowList::default(),
        };

        let compression = match provided(&params.compression) {
            Some(raw) => CompressionMode::parse(raw)?,
            None => CompressionMode::Plain,
        };

        Ok(Self {
            tags,
            threshold: resolve_threshold(&params.blunder_threshold)?,
            split: resolve_start_parity(&params.start_parity)?,
            compression,
            annotated_only: resolve_bool(
                &params.annotated_only,
                NamedParameters::ANNOTATED_ONLY,
                true,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NamedParameters {
        NamedParameters {
            tags: NamedParameterVarchar::Missing,
            blunder_threshold: NamedParameterVarchar::Missing,
            start_parity: NamedParameterVarchar::Missing,
            compression: NamedParameterVarchar::Missing,
            annotated_only: NamedParameterVarchar::Missing,
        }
    }

    fn value(raw: &str) -> NamedParameterVarchar {
        NamedParameterVarchar::Value(raw.to_string())
    }

    #[test]
    fn test_defaults_when_parameters_omitted() {
        let options = ScanOptions::resolve(&params()).unwrap();
        assert_eq!(
            options.tags.iter().collect::<Vec<_>>(),
            vec!["WhiteElo", "BlackElo", "TimeControl", "ECO"]
        );
        assert_eq!(options.threshold.pawns(), 1.5);
        assert_eq!(options.split, SideSplit::new(0));
        assert_eq!(options.compression, CompressionMode::Plain);
        assert!(options.annotated_only);
    }

    #[test]
    fn test_null_parameters_fall_back_to_defaults() {
        let mut p = params();
        p.tags = NamedParameterVarchar::Null;
        p.compression = value("NULL");
        p.blunder_threshold = NamedParameterVarchar::Null;
        let options = ScanOptions::resolve(&p).unwrap();
        assert_eq!(options, ScanOptions::resolve(&params()).unwrap());
    }

    #[test]
    fn test_tag_list_parsing() {
        let tags = TagAllowList::parse(" WhiteElo, ,Event,WhiteElo ,ECO").unwrap();
        assert_eq!(
            tags.iter().collect::<Vec<_>>(),
            vec!["WhiteElo", "Event", "ECO"]
        );
        assert!(tags.contains("Event"));
        assert!(!tags.contains("Moves"));
    }

    #[test]
    fn test_tag_list_rejects_fixed_column_names() {
        for raw in ["WhiteElo,Moves", "Source", "ECO, num_evals", "moves", "PARSE_ERROR"] {
            let err = TagAllowList::parse(raw).unwrap_err();
            assert!(
                matches!(err, ChessError::InvalidOption { name: "tags", .. }),
                "{raw} should be rejected"
            );
        }

        let err = TagAllowList::parse("WhiteElo,Moves,Source")
            .unwrap_err()
            .to_string();
        assert!(err.starts_with("Invalid tags value 'Moves'"));

        let mut p = params();
        p.tags = value("WhiteElo,Source");
        assert!(ScanOptions::resolve(&p).is_err());
    }

    #[test]
    fn test_tag_list_rejects_blank() {
        let err = TagAllowList::parse(" , ").unwrap_err().to_string();
        assert!(err.contains("Invalid tags value"));
    }

    #[test]
    fn test_threshold_and_parity_parsing() {
        let mut p = params();
        p.blunder_threshold = value("2.0");
        p.start_parity = value("1");
        p.annotated_only = value("false");
        let options = ScanOptions::resolve(&p).unwrap();

        assert_eq!(options.threshold.pawns(), 2.0);
        assert_eq!(options.split, SideSplit::new(1));
        assert!(!options.annotated_only);
    }

    #[test]
    fn test_threshold_must_be_positive() {
        let mut p = params();
        p.blunder_threshold = value("-0.5");
        assert!(matches!(
            ScanOptions::resolve(&p),
            Err(ChessError::InvalidThreshold { .. })
        ));

        p.blunder_threshold = value("lots");
        let err = ScanOptions::resolve(&p).unwrap_err().to_string();
        assert!(err.contains("Invalid blunder_threshold value 'lots'"));
    }

    #[test]
    fn test_start_parity_rejects_negative() {
        let mut p = params();
        p.start_parity = value("-1");
        let err = ScanOptions::resolve(&p).unwrap_err().to_string();
        assert!(err.contains("Invalid start_parity value '-1'"));
    }

    #[test]
    fn test_annotated_only_rejects_garbage() {
        let mut p = params();
        p.annotated_only = value("sometimes");
        assert!(ScanOptions::resolve(&p).is_err());
    }

    #[test]
    fn test_parse_compression_mode_zstd_case_insensitive() {
        assert_eq!(
            CompressionMode::parse("zstd").unwrap(),
            CompressionMode::Zstd
        );
        assert_eq!(
            CompressionMode::parse(" ZsTd ").unwrap(),
            CompressionMode::Zstd
        );
    }

    #[test]
    fn test_parse_compression_mode_rejects_unsupported_value() {
        let err = CompressionMode::parse("gzip").unwrap_err().to_string();
        assert_eq!(
            err,
            "Invalid compression value 'gzip'. Supported values: 'zstd' or NULL/omitted"
        );

        let mut p = params();
        p.compression = value("   ");
        assert!(ScanOptions::resolve(&p).is_err());
    }
}
