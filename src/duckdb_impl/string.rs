use libduckdb_sys::duckdb_string_t;

/// Decode a DuckDB string value into an owned `String`, replacing invalid
/// UTF-8 sequences.
///
/// # Safety
///
/// `s` must come from a non-NULL row of a `VARCHAR` vector that DuckDB keeps
/// alive for the current scalar invocation.
pub unsafe fn decode_duckdb_string(s: &duckdb_string_t) -> String {
    // SAFETY: All string representations start with the length field.
    let inlined_len = unsafe { s.value.inlined.length };

    let bytes = if inlined_len <= 12 {
        let len = inlined_len as usize;
        // SAFETY: `len <= 12` bytes are stored inline.
        let inlined = unsafe { &s.value.inlined.inlined };
        // SAFETY: `inlined` has `len` initialized bytes.
        unsafe { std::slice::from_raw_parts(inlined.as_ptr() as *const u8, len) }
    } else {
        // SAFETY: Strings longer than 12 bytes use the pointer representation.
        let (ptr, len) = unsafe { (s.value.pointer.ptr, s.value.pointer.length as usize) };
        // SAFETY: DuckDB keeps `len` bytes behind `ptr` for this vector.
        unsafe { std::slice::from_raw_parts(ptr as *const u8, len) }
    };

    String::from_utf8_lossy(bytes).into_owned()
}
