mod config;
mod duckdb_impl;
mod error;
mod extractor;
mod json;
mod log;
mod metrics;
mod movetext;
mod reader;
mod row;
mod types;

use duckdb::{Connection, Result};
use duckdb_ext_macros::duckdb_extension;
use json::{ChessEvalsJsonScalar, ChessMetricsJsonScalar};
use movetext::ChessPlyCountScalar;
use reader::ReadPgnMetricsVTab;
use std::error::Error;

#[duckdb_extension(name = "pgn_metrics", api_version = "v1.0.0")]
pub unsafe fn extension_entrypoint(con: Connection) -> Result<(), Box<dyn Error>> {
    // Table functions
    con.register_table_function::<ReadPgnMetricsVTab>("read_pgn_metrics")?;

    // Scalar functions
    con.register_scalar_function::<ChessEvalsJsonScalar>("chess_evals_json")?;
    con.register_scalar_function::<ChessMetricsJsonScalar>("chess_metrics_json")?;
    con.register_scalar_function::<ChessPlyCountScalar>("chess_ply_count")?;

    Ok(())
}
