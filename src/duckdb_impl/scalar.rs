//! Shared DuckDB scalar invoke helpers.
//!
//! They take care of flat vector access, per-row NULL checks, string decoding
//! and output validity so the scalar functions only map values.
//!
//! # Safety
//! Only call these from within a DuckDB scalar `invoke()` while the vectors are valid.
//! Input and output logical types are checked against the helper before any row is read.

use std::error::Error;
use std::ffi::CString;

use duckdb::{
    Result,
    core::{DataChunkHandle, FlatVector, Inserter, LogicalTypeId},
    vtab::arrow::WritableVector,
};
use libduckdb_sys::duckdb_string_t;

use super::string::decode_duckdb_string;

fn ensure_type(
    vec: &FlatVector,
    expected: LogicalTypeId,
    label: &str,
) -> Result<(), Box<dyn Error>> {
    let actual = vec.logical_type().id();
    if actual != expected {
        return Err(format!(
            "scalar helper type mismatch: {label} expected {expected:?}, got {actual:?}"
        )
        .into());
    }
    Ok(())
}

/// Invoke a unary `VARCHAR -> VARCHAR` scalar. NULL rows stay NULL.
pub fn invoke_unary_varchar_to_varchar<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str) -> Result<String, Box<dyn Error>>,
{
    let len = input.len();
    let input_vec = input.flat_vector(0);
    ensure_type(&input_vec, LogicalTypeId::Varchar, "input[0]")?;
    let input_slice = input_vec.as_slice::<duckdb_string_t>();
    let mut output_vec = output.flat_vector();
    ensure_type(&output_vec, LogicalTypeId::Varchar, "output")?;

    for (i, s) in input_slice.iter().take(len).enumerate() {
        if input_vec.row_is_null(i as u64) {
            output_vec.set_null(i);
            continue;
        }

        // SAFETY: Row nullability is checked above.
        let val = unsafe { decode_duckdb_string(s) };
        output_vec.insert(i, CString::new(f(&val)?)?);
    }

    Ok(())
}

/// Invoke a unary `VARCHAR -> UBIGINT` scalar.
///
/// Outputs NULL when the input row is NULL or when `f` returns `None`.
pub fn invoke_unary_varchar_to_u64_nullable<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str) -> Option<u64>,
{
    let len = input.len();
    let input_vec = input.flat_vector(0);
    ensure_type(&input_vec, LogicalTypeId::Varchar, "input[0]")?;
    let input_slice = input_vec.as_slice::<duckdb_string_t>();
    let mut output_vec = output.flat_vector();
    ensure_type(&output_vec, LogicalTypeId::UBigint, "output")?;

    for (i, s) in input_slice.iter().take(len).enumerate() {
        if input_vec.row_is_null(i as u64) {
            output_vec.set_null(i);
            continue;
        }

        // SAFETY: Row nullability is checked above.
        let val = unsafe { decode_duckdb_string(s) };
        match f(&val) {
            Some(v) => output_vec.as_mut_slice::<u64>()[i] = v,
            None => output_vec.set_null(i),
        }
    }

    Ok(())
}

/// Invoke a `VARCHAR, DOUBLE -> VARCHAR` scalar that outputs NULL when either input is NULL.
pub fn invoke_binary_varchar_double_to_varchar<F>(
    input: &DataChunkHandle,
    output: &mut dyn WritableVector,
    mut f: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnMut(&str, f64) -> Result<String, Box<dyn Error>>,
{
    let len = input.len();
    let text_vec = input.flat_vector(0);
    let number_vec = input.flat_vector(1);
    ensure_type(&text_vec, LogicalTypeId::Varchar, "input[0]")?;
    ensure_type(&number_vec, LogicalTypeId::Double, "input[1]")?;
    let text_slice = text_vec.as_slice::<duckdb_string_t>();
    let number_slice = number_vec.as_slice::<f64>();
    let mut output_vec = output.flat_vector();
    ensure_type(&output_vec, LogicalTypeId::Varchar, "output")?;

    for (i, (s, number)) in text_slice
        .iter()
        .take(len)
        .zip(number_slice.iter().copied())
        .enumerate()
    {
        if text_vec.row_is_null(i as u64) || number_vec.row_is_null(i as u64) {
            output_vec.set_null(i);
            continue;
        }

        // SAFETY: Both input rows are checked non-NULL above.
        let text = unsafe { decode_duckdb_string(s) };
        output_vec.insert(i, CString::new(f(&text, number)?)?);
    }

    Ok(())
}
