//! FFI bindings for Ultrahuman Flux
//!
//! This module provides C-compatible functions so a host platform written in
//! another language can run extraction and projection in-process. All functions
//! take null-terminated C strings and return allocated strings that must be
//! freed by the caller using `uhflux_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::ComputeError;
use crate::extractor::{extract_str, parse_date};
use crate::inference::infer;
use crate::projector::build_entities;
use crate::types::{CanonicalMapping, EntityDescriptor, EntityState};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Convert a C string argument, recording an error naming `what` on failure
unsafe fn arg(ptr: *const c_char, what: &str) -> Option<String> {
    if ptr.is_null() {
        set_last_error(&format!("Invalid {what} string pointer"));
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            set_last_error(&format!("{what} is not valid UTF-8"));
            None
        }
    }
}

/// Hand a result back across the boundary: the string on success, NULL and
/// a recorded error otherwise
fn finish(result: Result<String, ComputeError>) -> *mut c_char {
    match result.and_then(|s| {
        CString::new(s).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }) {
        Ok(cstr) => cstr.into_raw(),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn parse_mapping(json: &str) -> Result<CanonicalMapping, ComputeError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    CanonicalMapping::from_json(value)
        .ok_or_else(|| ComputeError::ParseError("Mapping must be a JSON object".to_string()))
}

// ============================================================================
// Pipeline
// ============================================================================

/// Extract the canonical mapping for `date` (YYYY-MM-DD) from a raw daily
/// metrics payload. Returns the mapping as a JSON object.
///
/// # Safety
/// - `json` and `date` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `uhflux_free_string`.
/// - Returns NULL on error; call `uhflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn uhflux_extract(json: *const c_char, date: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(json_str) = arg(json, "JSON") else {
        return ptr::null_mut();
    };
    let Some(date_str) = arg(date, "date") else {
        return ptr::null_mut();
    };

    finish(
        parse_date(&date_str)
            .and_then(|date| extract_str(&json_str, date))
            .and_then(|mapping| serde_json::to_string(&mapping).map_err(Into::into)),
    )
}

/// Build entity descriptors from a mapping JSON object. Returns a JSON array.
///
/// # Safety
/// - `mapping_json` and `entry_id` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `uhflux_free_string`.
/// - Returns NULL on error; call `uhflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn uhflux_build_entities(
    mapping_json: *const c_char,
    entry_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(mapping_str) = arg(mapping_json, "mapping") else {
        return ptr::null_mut();
    };
    let Some(entry_str) = arg(entry_id, "entry_id") else {
        return ptr::null_mut();
    };

    finish(parse_mapping(&mapping_str).and_then(|mapping| {
        let entities = build_entities(&entry_str, &mapping);
        serde_json::to_string(&entities).map_err(Into::into)
    }))
}

/// Read entity states: `entities_json` is the array returned by
/// `uhflux_build_entities`, `mapping_json` the latest mapping. Returns a JSON
/// array of states in entity order.
///
/// # Safety
/// - `entities_json` and `mapping_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `uhflux_free_string`.
/// - Returns NULL on error; call `uhflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn uhflux_read_states(
    entities_json: *const c_char,
    mapping_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(entities_str) = arg(entities_json, "entities") else {
        return ptr::null_mut();
    };
    let Some(mapping_str) = arg(mapping_json, "mapping") else {
        return ptr::null_mut();
    };

    finish((|| -> Result<String, ComputeError> {
        let entities: Vec<EntityDescriptor> = serde_json::from_str(&entities_str)?;
        let mapping = parse_mapping(&mapping_str)?;
        let states: Vec<EntityState> = entities.iter().map(|e| e.state(&mapping)).collect();
        Ok(serde_json::to_string(&states)?)
    })())
}

/// Infer the schema of a metric name. Returns a JSON object.
///
/// # Safety
/// - `name` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `uhflux_free_string`.
/// - Returns NULL on error; call `uhflux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn uhflux_infer(name: *const c_char) -> *mut c_char {
    clear_last_error();

    let Some(name_str) = arg(name, "name") else {
        return ptr::null_mut();
    };

    finish(serde_json::to_string(&infer(&name_str)).map_err(Into::into))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by an `uhflux_*` function.
///
/// # Safety
/// - `ptr` must be a pointer returned by an `uhflux_*` function, or NULL.
/// - Must not be called twice on the same pointer.
#[no_mangle]
pub unsafe extern "C" fn uhflux_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `uhflux_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn uhflux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn uhflux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        uhflux_free_string(ptr);
        s
    }

    fn sample_payload() -> CString {
        CString::new(
            r#"{
                "data": { "metrics": { "2024-01-15": [
                    { "type": "hr", "object": { "values": [{ "value": 60 }, { "value": 80 }] } },
                    { "type": "steps", "object": { "value": 8500 } }
                ] } }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_extract_project_read() {
        let payload = sample_payload();
        let date = CString::new("2024-01-15").unwrap();
        let entry = CString::new("entry").unwrap();

        unsafe {
            let mapping = take(uhflux_extract(payload.as_ptr(), date.as_ptr()));
            let parsed: serde_json::Value = serde_json::from_str(&mapping).unwrap();
            assert_eq!(parsed["heart_rate_avg"], 70.0);
            assert_eq!(parsed["steps"], 8500);

            let mapping_c = CString::new(mapping).unwrap();
            let entities = take(uhflux_build_entities(mapping_c.as_ptr(), entry.as_ptr()));
            let parsed: serde_json::Value = serde_json::from_str(&entities).unwrap();
            assert_eq!(parsed.as_array().unwrap().len(), 4);
            assert_eq!(parsed[0]["unique_id"], "entry_heart_rate_avg");

            let entities_c = CString::new(entities).unwrap();
            let states = take(uhflux_read_states(entities_c.as_ptr(), mapping_c.as_ptr()));
            let parsed: serde_json::Value = serde_json::from_str(&states).unwrap();
            assert_eq!(parsed[3]["name"], "Ultrahuman Steps");
            assert_eq!(parsed[3]["value"], 8500);
        }
    }

    #[test]
    fn test_ffi_errors() {
        let bad = CString::new("not json").unwrap();
        let date = CString::new("2024-01-15").unwrap();

        unsafe {
            let result = uhflux_extract(bad.as_ptr(), date.as_ptr());
            assert!(result.is_null());
            let err = uhflux_last_error();
            assert!(!err.is_null());

            let result = uhflux_extract(ptr::null(), date.as_ptr());
            assert!(result.is_null());
            let msg = CStr::from_ptr(uhflux_last_error()).to_str().unwrap();
            assert!(msg.contains("JSON"));

            let array = CString::new("[1, 2]").unwrap();
            let entry = CString::new("entry").unwrap();
            assert!(uhflux_build_entities(array.as_ptr(), entry.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_ffi_infer() {
        let name = CString::new("total_distance").unwrap();
        unsafe {
            let schema = take(uhflux_infer(name.as_ptr()));
            let parsed: serde_json::Value = serde_json::from_str(&schema).unwrap();
            assert_eq!(parsed["device_class"], "distance");
            assert_eq!(parsed["unit"], "m");
            assert_eq!(parsed["aggregation"], "total_increasing");
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = CStr::from_ptr(uhflux_version()).to_str().unwrap();
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        }
    }
}
