use duckdb::{
    core::{DataChunkHandle, Inserter, LogicalTypeHandle, LogicalTypeId},
    vtab::{BindInfo, InitInfo, TableFunctionInfo, VTab},
};
use shakmaty::Color;
use std::borrow::Cow;
use std::ffi::CString;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::config::{CompressionMode, NamedParameters, ScanOptions};
use crate::duckdb_impl::bind_info_ffi::read_named_parameters;
use crate::error::ErrorAccumulator;
use crate::extractor::GameRecords;
use crate::log;
use crate::row::{GameRow, TagColumnKind, TagValue, build_row, is_selected};

pub type PgnInput = Box<dyn Read + Send>;

#[repr(C)]
pub struct ReadPgnMetricsBindData {
    paths: Vec<PathBuf>,
    options: ScanOptions,
}

#[repr(C)]
pub struct ReadPgnMetricsInitData {
    state: Mutex<SharedState>,
}

pub struct ReadPgnMetricsVTab;

struct SharedState {
    next_path_idx: usize,
    available_readers: Vec<MetricsReaderState>,
}

struct MetricsReaderState {
    records: GameRecords<BufReader<PgnInput>>,
    path_idx: usize,
    games_emitted: usize,
    games_skipped: usize,
}

impl MetricsReaderState {
    fn new(input: PgnInput, path_idx: usize, options: &ScanOptions) -> Self {
        Self {
            records: GameRecords::new(BufReader::new(input), options.tags.clone()),
            path_idx,
            games_emitted: 0,
            games_skipped: 0,
        }
    }
}

const PATH_PATTERN_PARAM_INDEX: u64 = 0;
const ROWS_PER_CHUNK: usize = 2048;
const METRIC_COLUMN_COUNT: usize = 13;

/// Fixed columns that follow the per-tag columns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MetricColumn {
    Moves = 0,
    NumEvals = 1,
    NumPlies = 2,
    NumMoves = 3,
    AcplWhite = 4,
    AcplBlack = 5,
    BlundersWhite = 6,
    BlundersBlack = 7,
    BlunderRateWhite = 8,
    BlunderRateBlack = 9,
    RatingDiff = 10,
    ParseError = 11,
    Source = 12,
}

impl MetricColumn {
    const fn offset(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        METRIC_COLUMNS[self.offset()].name
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ReadPgnLogicalType {
    Varchar,
    Integer,
    UInteger,
    Double,
}

impl ReadPgnLogicalType {
    fn to_handle(self) -> LogicalTypeHandle {
        match self {
            Self::Varchar => LogicalTypeHandle::from(LogicalTypeId::Varchar),
            Self::Integer => LogicalTypeHandle::from(LogicalTypeId::Integer),
            Self::UInteger => LogicalTypeHandle::from(LogicalTypeId::UInteger),
            Self::Double => LogicalTypeHandle::from(LogicalTypeId::Double),
        }
    }
}

impl From<TagColumnKind> for ReadPgnLogicalType {
    fn from(kind: TagColumnKind) -> Self {
        match kind {
            TagColumnKind::Varchar => Self::Varchar,
            TagColumnKind::Integer => Self::Integer,
        }
    }
}

struct ColumnDef {
    name: &'static str,
    logical_type: ReadPgnLogicalType,
}

const METRIC_COLUMNS: [ColumnDef; METRIC_COLUMN_COUNT] = [
    ColumnDef {
        name: "Moves",
        logical_type: ReadPgnLogicalType::Varchar,
    },
    ColumnDef {
        name: "num_evals",
        logical_type: ReadPgnLogicalType::UInteger,
    },
    ColumnDef {
        name: "num_plies",
        logical_type: ReadPgnLogicalType::UInteger,
    },
    ColumnDef {
        name: "num_moves",
        logical_type: ReadPgnLogicalType::UInteger,
    },
    ColumnDef {
        name: "acpl_white",
        logical_type: ReadPgnLogicalType::Double,
    },
    ColumnDef {
        name: "acpl_black",
        logical_type: ReadPgnLogicalType::Double,
    },
    ColumnDef {
        name: "blunders_white",
        logical_type: ReadPgnLogicalType::UInteger,
    },
    ColumnDef {
        name: "blunders_black",
        logical_type: ReadPgnLogicalType::UInteger,
    },
    ColumnDef {
        name: "blunder_rate_white",
        logical_type: ReadPgnLogicalType::Double,
    },
    ColumnDef {
        name: "blunder_rate_black",
        logical_type: ReadPgnLogicalType::Double,
    },
    ColumnDef {
        name: "rating_diff",
        logical_type: ReadPgnLogicalType::Integer,
    },
    ColumnDef {
        name: "parse_error",
        logical_type: ReadPgnLogicalType::Varchar,
    },
    ColumnDef {
        name: "Source",
        logical_type: ReadPgnLogicalType::Varchar,
    },
];

/// Output schema: one column per allow-listed tag, then the metric columns.
fn result_columns(options: &ScanOptions) -> Vec<(String, ReadPgnLogicalType)> {
    options
        .tags
        .iter()
        .map(|tag| (tag.to_string(), TagColumnKind::for_tag(tag).into()))
        .chain(
            METRIC_COLUMNS
                .iter()
                .map(|column| (column.name.to_string(), column.logical_type)),
        )
        .collect()
}

fn resolve_paths(pattern: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    if pattern.contains('*') || pattern.contains('?') {
        let paths: Vec<PathBuf> = glob::glob(pattern)?
            .filter_map(|entry| entry.ok())
            .collect();
        if paths.is_empty() {
            log::warn(format!("No files match pattern '{}'", pattern));
        }
        Ok(paths)
    } else {
        Ok(vec![PathBuf::from(pattern)])
    }
}

fn open_input_stream(path: &Path, compression: CompressionMode) -> Result<PgnInput, String> {
    let file =
        File::open(path).map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

    match compression {
        CompressionMode::Plain => Ok(Box::new(file)),
        CompressionMode::Zstd => ZstdDecoder::new(file)
            .map(|decoder| Box::new(decoder) as PgnInput)
            .map_err(|e| {
                format!(
                    "Failed to initialize zstd decoder for '{}': {}",
                    path.display(),
                    e
                )
            }),
    }
}

fn sanitize_for_cstring<'a>(
    value: &'a str,
    field_name: &str,
    parse_error: &mut ErrorAccumulator,
) -> Cow<'a, str> {
    if value.contains('\0') {
        parse_error.push(&format!("Sanitized interior NUL in {}", field_name));
        Cow::Owned(value.replace('\0', " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn sanitize_for_cstring_silent(value: &str) -> Cow<'_, str> {
    if value.contains('\0') {
        Cow::Owned(value.replace('\0', " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

struct ChunkWriter<'a> {
    output: &'a mut DataChunkHandle,
    tag_names: Vec<&'a str>,
    row_count: usize,
}

impl<'a> ChunkWriter<'a> {
    fn new(output: &'a mut DataChunkHandle, options: &'a ScanOptions) -> Self {
        Self {
            output,
            tag_names: options.tags.iter().collect(),
            row_count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.row_count >= ROWS_PER_CHUNK
    }

    fn metric_index(&self, column: MetricColumn) -> usize {
        self.tag_names.len() + column.offset()
    }

    fn write_row(&mut self, row: &GameRow, source: &str) -> Result<(), Box<dyn std::error::Error>> {
        let row_idx = self.row_count;
        let mut row_parse_error = ErrorAccumulator::default();
        if let Some(parse_error) = row.parse_error.as_deref() {
            row_parse_error.push(parse_error);
        }

        for (col_idx, value) in row.tags.iter().enumerate() {
            let name = self.tag_names[col_idx];
            match value {
                TagValue::Varchar(text) => {
                    self.write_optional_varchar(
                        col_idx,
                        name,
                        row_idx,
                        text.as_deref(),
                        &mut row_parse_error,
                    )?;
                }
                TagValue::Integer(number) => self.write_optional_integer(col_idx, row_idx, *number),
            }
        }

        let metrics = row.metrics.as_ref();
        self.write_optional_varchar(
            self.metric_index(MetricColumn::Moves),
            MetricColumn::Moves.name(),
            row_idx,
            row.moves.as_deref(),
            &mut row_parse_error,
        )?;
        self.write_optional_uinteger(
            MetricColumn::NumEvals,
            row_idx,
            metrics.map(|m| to_u32(m.num_evals)),
        );
        self.write_optional_uinteger(MetricColumn::NumPlies, row_idx, row.num_plies);
        self.write_optional_uinteger(
            MetricColumn::NumMoves,
            row_idx,
            metrics.map(|m| to_u32(m.loss.num_moves)),
        );
        self.write_optional_double(
            MetricColumn::AcplWhite,
            row_idx,
            metrics.and_then(|m| m.acpl(Color::White)),
        );
        self.write_optional_double(
            MetricColumn::AcplBlack,
            row_idx,
            metrics.and_then(|m| m.acpl(Color::Black)),
        );
        self.write_optional_uinteger(
            MetricColumn::BlundersWhite,
            row_idx,
            metrics.map(|m| to_u32(m.blunders.white)),
        );
        self.write_optional_uinteger(
            MetricColumn::BlundersBlack,
            row_idx,
            metrics.map(|m| to_u32(m.blunders.black)),
        );
        self.write_optional_double(
            MetricColumn::BlunderRateWhite,
            row_idx,
            row.blunder_rate(Color::White),
        );
        self.write_optional_double(
            MetricColumn::BlunderRateBlack,
            row_idx,
            row.blunder_rate(Color::Black),
        );
        let rating_diff_idx = self.metric_index(MetricColumn::RatingDiff);
        self.write_optional_integer(rating_diff_idx, row_idx, row.rating_diff);
        self.write_optional_varchar(
            self.metric_index(MetricColumn::Source),
            MetricColumn::Source.name(),
            row_idx,
            Some(source),
            &mut row_parse_error,
        )?;

        let mut parse_error_vec = self
            .output
            .flat_vector(self.metric_index(MetricColumn::ParseError));
        if row_parse_error.is_empty() {
            parse_error_vec.set_null(row_idx);
        } else {
            let parse_error = row_parse_error.take().unwrap_or_default();
            let parse_error = sanitize_for_cstring_silent(parse_error.as_str());
            parse_error_vec.insert(row_idx, CString::new(parse_error.as_ref())?);
        }

        self.row_count += 1;
        Ok(())
    }

    fn set_output_len(&mut self) {
        self.output.set_len(self.row_count);
    }

    fn write_optional_varchar(
        &mut self,
        col_idx: usize,
        name: &str,
        row_idx: usize,
        value: Option<&str>,
        parse_error: &mut ErrorAccumulator,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut vector = self.output.flat_vector(col_idx);
        if let Some(value) = value {
            let sanitized = sanitize_for_cstring(value, name, parse_error);
            vector.insert(row_idx, CString::new(sanitized.as_ref())?);
        } else {
            vector.set_null(row_idx);
        }
        Ok(())
    }

    fn write_optional_integer(&mut self, col_idx: usize, row_idx: usize, value: Option<i32>) {
        let mut vector = self.output.flat_vector(col_idx);
        if let Some(value) = value {
            vector.as_mut_slice::<i32>()[row_idx] = value;
        } else {
            vector.set_null(row_idx);
        }
    }

    fn write_optional_uinteger(&mut self, column: MetricColumn, row_idx: usize, value: Option<u32>) {
        let mut vector = self.output.flat_vector(self.metric_index(column));
        if let Some(value) = value {
            vector.as_mut_slice::<u32>()[row_idx] = value;
        } else {
            vector.set_null(row_idx);
        }
    }

    fn write_optional_double(&mut self, column: MetricColumn, row_idx: usize, value: Option<f64>) {
        let mut vector = self.output.flat_vector(self.metric_index(column));
        match value {
            Some(value) if value.is_finite() => vector.as_mut_slice::<f64>()[row_idx] = value,
            _ => vector.set_null(row_idx),
        }
    }
}

fn acquire_reader(
    init_data: &ReadPgnMetricsInitData,
    bind_data: &ReadPgnMetricsBindData,
) -> Result<Option<MetricsReaderState>, Box<dyn std::error::Error>> {
    loop {
        let path_idx = {
            let mut state = init_data
                .state
                .lock()
                .map_err(|_| "read_pgn_metrics shared state poisoned")?;

            if let Some(reader) = state.available_readers.pop() {
                return Ok(Some(reader));
            }

            if state.next_path_idx < bind_data.paths.len() {
                let path_idx = state.next_path_idx;
                state.next_path_idx += 1;
                path_idx
            } else {
                return Ok(None);
            }
        };

        let path = &bind_data.paths[path_idx];
        match open_input_stream(path, bind_data.options.compression) {
            Ok(input_stream) => {
                return Ok(Some(MetricsReaderState::new(
                    input_stream,
                    path_idx,
                    &bind_data.options,
                )));
            }
            Err(err_msg) => {
                if bind_data.paths.len() == 1 {
                    return Err(err_msg.into());
                }

                log::warn(&err_msg);
            }
        }
    }
}

enum ReadNextGameOutcome {
    GameReady(Box<GameRow>),
    ReaderFinished,
}

/// Pulls records until one passes the annotation filter. Extraction errors
/// abort the whole scan.
fn read_next_game(
    reader: &mut MetricsReaderState,
    options: &ScanOptions,
    source_path: &Path,
) -> Result<ReadNextGameOutcome, Box<dyn std::error::Error>> {
    while let Some(record) = reader.records.next() {
        let line_number = reader.records.line_number();
        let record = record.map_err(|err| {
            let msg = format!(
                "Extraction error: file='{}'; game_index={}; line={}; error={}",
                source_path.display(),
                reader.games_emitted + reader.games_skipped + 1,
                line_number,
                err
            );
            log::error(&msg);
            msg
        })?;

        if !is_selected(&record, options) {
            reader.games_skipped += 1;
            continue;
        }

        reader.games_emitted += 1;
        return Ok(ReadNextGameOutcome::GameReady(Box::new(build_row(
            &record, options,
        ))));
    }

    log::info(format!(
        "Finished '{}': {} game(s) emitted, {} without evaluations skipped",
        source_path.display(),
        reader.games_emitted,
        reader.games_skipped
    ));
    Ok(ReadNextGameOutcome::ReaderFinished)
}

fn finalize_chunk(
    init_data: &ReadPgnMetricsInitData,
    current_reader_state: Option<MetricsReaderState>,
    chunk_writer: &mut ChunkWriter<'_>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(reader) = current_reader_state {
        let mut state = init_data
            .state
            .lock()
            .map_err(|_| "read_pgn_metrics shared state poisoned")?;
        state.available_readers.push(reader);
    }

    chunk_writer.set_output_len();
    Ok(())
}

impl VTab for ReadPgnMetricsVTab {
    type InitData = ReadPgnMetricsInitData;
    type BindData = ReadPgnMetricsBindData;

    fn bind(bind: &BindInfo) -> Result<Self::BindData, Box<dyn std::error::Error>> {
        let pattern = bind.get_parameter(PATH_PATTERN_PARAM_INDEX).to_string();
        let options = ScanOptions::resolve(&read_named_parameters(bind)?)?;
        let paths = resolve_paths(&pattern)?;

        for (name, logical_type) in result_columns(&options) {
            bind.add_result_column(&name, logical_type.to_handle());
        }

        Ok(ReadPgnMetricsBindData { paths, options })
    }

    fn init(_: &InitInfo) -> Result<Self::InitData, Box<dyn std::error::Error>> {
        Ok(ReadPgnMetricsInitData {
            state: Mutex::new(SharedState {
                next_path_idx: 0,
                available_readers: Vec::new(),
            }),
        })
    }

    fn func(
        func: &TableFunctionInfo<Self>,
        output: &mut DataChunkHandle,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let init_data = func.get_init_data();
        let bind_data = func.get_bind_data();
        let mut chunk_writer = ChunkWriter::new(output, &bind_data.options);
        let mut current_reader_state: Option<MetricsReaderState> = None;

        while !chunk_writer.is_full() {
            if current_reader_state.is_none() {
                current_reader_state = acquire_reader(init_data, bind_data)?;
                if current_reader_state.is_none() {
                    break;
                }
            }

            if let Some(mut reader) = current_reader_state.take() {
                let source_path = &bind_data.paths[reader.path_idx];
                match read_next_game(&mut reader, &bind_data.options, source_path)? {
                    ReadNextGameOutcome::GameReady(row) => {
                        let source = source_path.to_string_lossy();
                        chunk_writer.write_row(&row, source.as_ref())?;
                        current_reader_state = Some(reader);
                    }
                    ReadNextGameOutcome::ReaderFinished => {
                        // Dropped here; the next iteration picks up another file.
                    }
                }
            }
        }

        finalize_chunk(init_data, current_reader_state, &mut chunk_writer)
    }

    fn parameters() -> Option<Vec<LogicalTypeHandle>> {
        Some(vec![
            LogicalTypeHandle::from(LogicalTypeId::Varchar), // path pattern (required)
        ])
    }

    fn named_parameters() -> Option<Vec<(String, LogicalTypeHandle)>> {
        Some(vec![
            (
                NamedParameters::TAGS.to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ),
            (
                NamedParameters::BLUNDER_THRESHOLD.to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Double),
            ),
            (
                NamedParameters::START_PARITY.to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Integer),
            ),
            (
                NamedParameters::COMPRESSION.to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Varchar),
            ),
            (
                NamedParameters::ANNOTATED_ONLY.to_string(),
                LogicalTypeHandle::from(LogicalTypeId::Boolean),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RESERVED_COLUMNS;
    use crate::duckdb_impl::bind_info_ffi::NamedParameterVarchar;
    use std::io::Write;

    fn options(tags: &str, annotated_only: bool) -> ScanOptions {
        ScanOptions::resolve(&NamedParameters {
            tags: NamedParameterVarchar::Value(tags.to_string()),
            blunder_threshold: NamedParameterVarchar::Missing,
            start_parity: NamedParameterVarchar::Missing,
            compression: NamedParameterVarchar::Missing,
            annotated_only: NamedParameterVarchar::Value(annotated_only.to_string()),
        })
        .unwrap()
    }

    fn reader_for(pgn: &str, options: &ScanOptions) -> MetricsReaderState {
        let input: PgnInput = Box::new(std::io::Cursor::new(pgn.as_bytes().to_vec()));
        MetricsReaderState::new(input, 0, options)
    }

    fn collect_rows(
        reader: &mut MetricsReaderState,
        options: &ScanOptions,
    ) -> Result<Vec<GameRow>, Box<dyn std::error::Error>> {
        let path = PathBuf::from("games.pgn");
        let mut rows = Vec::new();
        while let ReadNextGameOutcome::GameReady(row) = read_next_game(reader, options, &path)? {
            rows.push(*row);
        }
        Ok(rows)
    }

    #[test]
    fn test_metric_columns_match_contract() {
        let expected: [(&str, ReadPgnLogicalType); METRIC_COLUMN_COUNT] = [
            ("Moves", ReadPgnLogicalType::Varchar),
            ("num_evals", ReadPgnLogicalType::UInteger),
            ("num_plies", ReadPgnLogicalType::UInteger),
            ("num_moves", ReadPgnLogicalType::UInteger),
            ("acpl_white", ReadPgnLogicalType::Double),
            ("acpl_black", ReadPgnLogicalType::Double),
            ("blunders_white", ReadPgnLogicalType::UInteger),
            ("blunders_black", ReadPgnLogicalType::UInteger),
            ("blunder_rate_white", ReadPgnLogicalType::Double),
            ("blunder_rate_black", ReadPgnLogicalType::Double),
            ("rating_diff", ReadPgnLogicalType::Integer),
            ("parse_error", ReadPgnLogicalType::Varchar),
            ("Source", ReadPgnLogicalType::Varchar),
        ];

        for (idx, column) in METRIC_COLUMNS.iter().enumerate() {
            assert_eq!(column.name, expected[idx].0);
            assert_eq!(column.logical_type, expected[idx].1);
        }
        assert_eq!(MetricColumn::Source.offset(), METRIC_COLUMN_COUNT - 1);
        assert_eq!(MetricColumn::ParseError.name(), "parse_error");
    }

    #[test]
    fn test_reserved_columns_cover_metric_columns() {
        let names: Vec<&str> = METRIC_COLUMNS.iter().map(|column| column.name).collect();
        assert_eq!(names, RESERVED_COLUMNS.to_vec());
    }

    #[test]
    fn test_result_column_names_are_unique() {
        let columns = result_columns(&options("WhiteElo,Event,Site,BlackElo", false));
        let mut names: Vec<String> = columns
            .iter()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), columns.len());
    }

    #[test]
    fn test_result_columns_start_with_tags() {
        let columns = result_columns(&options("WhiteElo,TimeControl,BlackElo", true));
        assert_eq!(columns.len(), 3 + METRIC_COLUMN_COUNT);
        assert_eq!(
            columns[0],
            ("WhiteElo".to_string(), ReadPgnLogicalType::Integer)
        );
        assert_eq!(
            columns[1],
            ("TimeControl".to_string(), ReadPgnLogicalType::Varchar)
        );
        assert_eq!(
            columns[2],
            ("BlackElo".to_string(), ReadPgnLogicalType::Integer)
        );
        assert_eq!(columns[3].0, "Moves");
        assert_eq!(columns.last().unwrap().0, "Source");
    }

    #[test]
    fn test_rows_per_chunk_constant_matches_contract() {
        assert_eq!(ROWS_PER_CHUNK, 2048);
    }

    #[test]
    fn test_sanitize_for_cstring_replaces_interior_nul_and_records_error() {
        let mut parse_error = ErrorAccumulator::default();
        let clean = sanitize_for_cstring("normal text", "ECO", &mut parse_error);
        assert_eq!(clean.as_ref(), "normal text");
        assert!(parse_error.is_empty());

        let sanitized = sanitize_for_cstring("A\0B", "ECO", &mut parse_error);
        assert_eq!(sanitized.as_ref(), "A B");
        let message = parse_error.take().expect("expected parse_error message");
        assert!(message.contains("Sanitized interior NUL in ECO"));
    }

    #[test]
    fn test_resolve_paths_single_file_is_not_globbed() {
        let paths = resolve_paths("games/lichess_2013.pgn").unwrap();
        assert_eq!(paths, vec![PathBuf::from("games/lichess_2013.pgn")]);
    }

    #[test]
    fn test_open_missing_file_reports_path() {
        let err = open_input_stream(Path::new("/nonexistent/none.pgn"), CompressionMode::Plain)
            .err()
            .unwrap();
        assert!(err.contains("Failed to open file '/nonexistent/none.pgn'"));
    }

    #[test]
    fn test_zstd_input_is_decoded() {
        let pgn = include_str!("../test/pgn_files/sample_annotated.pgn");
        let compressed = zstd::encode_all(pgn.as_bytes(), 3).unwrap();

        let path = std::env::temp_dir().join(format!(
            "pgn_metrics_zstd_test_{}.pgn.zst",
            std::process::id()
        ));
        File::create(&path)
            .unwrap()
            .write_all(&compressed)
            .unwrap();

        let opts = options("WhiteElo,BlackElo", true);
        let input = open_input_stream(&path, CompressionMode::Zstd).unwrap();
        let mut reader = MetricsReaderState::new(input, 0, &opts);
        let rows = collect_rows(&mut reader, &opts).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rating_diff, Some(100));
    }

    #[test]
    fn test_unannotated_games_are_skipped() {
        let pgn = r#"[WhiteElo "1500"]
[BlackElo "1400"]

1. e4 e5 2. Nf3 1-0

[WhiteElo "1600"]
[BlackElo "1700"]

1. d4 { [%eval 0.1] } 1... d5 { [%eval 0.12] } 2. c4 { [%eval 0.2] } 0-1
"#;
        let opts = options("WhiteElo,BlackElo", true);
        let mut reader = reader_for(pgn, &opts);
        let rows = collect_rows(&mut reader, &opts).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rating_diff, Some(-100));
        assert_eq!(reader.games_emitted, 1);
        assert_eq!(reader.games_skipped, 1);

        let opts = options("WhiteElo,BlackElo", false);
        let mut reader = reader_for(pgn, &opts);
        assert_eq!(collect_rows(&mut reader, &opts).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_tag_aborts_scan() {
        let pgn = "[WhiteElo \"1500\"]\n1. e4 { [%eval 0.1] } *\n[BlackElo 1400]\n1. d4 *\n";
        let opts = options("WhiteElo", true);
        let mut reader = reader_for(pgn, &opts);

        let err = collect_rows(&mut reader, &opts).unwrap_err().to_string();
        assert!(err.contains("file='games.pgn'"));
        assert!(err.contains("game_index=2"));
        assert!(err.contains("Malformed tag line 3"));
    }

    #[test]
    fn test_shared_state_initialization() {
        let init_data = ReadPgnMetricsInitData {
            state: Mutex::new(SharedState {
                next_path_idx: 0,
                available_readers: Vec::new(),
            }),
        };
        let state = init_data.state.lock().unwrap();
        assert_eq!(state.next_path_idx, 0);
        assert!(state.available_readers.is_empty());
    }
}
