use duckdb::vtab::BindInfo;
use libduckdb_sys::{
    duckdb_bind_get_named_parameter, duckdb_bind_info, duckdb_destroy_value, duckdb_free,
    duckdb_get_varchar, duckdb_is_null_value,
};
use std::ffi::{CStr, CString};
use std::os::raw::c_void;

use crate::config::NamedParameters;

/// A named parameter rendered as text, keeping "not passed" apart from an
/// explicit SQL NULL.
#[derive(Debug, Eq, PartialEq)]
pub enum NamedParameterVarchar {
    Missing,
    Null,
    Value(String),
}

/// Reads a named parameter of any logical type through DuckDB's VARCHAR cast.
pub(crate) fn get_named_parameter_varchar(
    bind: &BindInfo,
    name: &str,
) -> Result<NamedParameterVarchar, Box<dyn std::error::Error>> {
    let name_cstr = CString::new(name)?;

    // SAFETY: The returned value is owned by us and valid for this bind callback.
    let mut value =
        unsafe { duckdb_bind_get_named_parameter(bind_info_ptr(bind), name_cstr.as_ptr()) };
    if value.is_null() {
        return Ok(NamedParameterVarchar::Missing);
    }

    // SAFETY: `value` is a valid `duckdb_value` handle and is destroyed exactly once below.
    let result = unsafe {
        if duckdb_is_null_value(value) {
            Ok(NamedParameterVarchar::Null)
        } else {
            let varchar = duckdb_get_varchar(value);
            if varchar.is_null() {
                Err(format!("Failed to read named parameter '{}' as VARCHAR", name).into())
            } else {
                let text = CStr::from_ptr(varchar).to_string_lossy().into_owned();
                duckdb_free(varchar as *mut c_void);
                Ok(NamedParameterVarchar::Value(text))
            }
        }
    };

    // SAFETY: `value` has not been destroyed yet and must be released once.
    unsafe {
        duckdb_destroy_value(&mut value);
    }

    result
}

pub(crate) fn read_named_parameters(
    bind: &BindInfo,
) -> Result<NamedParameters, Box<dyn std::error::Error>> {
    Ok(NamedParameters {
        tags: get_named_parameter_varchar(bind, NamedParameters::TAGS)?,
        blunder_threshold: get_named_parameter_varchar(bind, NamedParameters::BLUNDER_THRESHOLD)?,
        start_parity: get_named_parameter_varchar(bind, NamedParameters::START_PARITY)?,
        compression: get_named_parameter_varchar(bind, NamedParameters::COMPRESSION)?,
        annotated_only: get_named_parameter_varchar(bind, NamedParameters::ANNOTATED_ONLY)?,
    })
}

fn bind_info_ptr(bind: &BindInfo) -> duckdb_bind_info {
    // SAFETY: `duckdb::vtab::BindInfo` wraps a single `duckdb_bind_info` field and exposes
    // no raw accessor or NULL-aware named-parameter getter, so the cast is needed to tell an
    // omitted parameter from an explicit NULL. Re-check the wrapper layout on duckdb-rs
    // upgrades.
    unsafe { *(bind as *const BindInfo as *const duckdb_bind_info) }
}
