//! FFI bindings for Poise
//!
//! C-compatible functions for driving the synchronous signal processor from
//! other languages. Observations and snapshots cross the boundary as JSON.
//! Returned strings are allocated here and must be freed with
//! `poise_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::{AnalyzerConfig, DEFAULT_SMOOTHING_WINDOW};
use crate::pipeline::SignalProcessor;
use crate::replay::replay_records;
use crate::report::ReportEncoder;
use crate::schema::FrameRecordAdapter;

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Caller frees with `poise_free_string`
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay an NDJSON (or JSON array) recording and return the report JSON.
///
/// # Safety
/// - `records` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `poise_free_string`.
/// - Returns NULL on error; call `poise_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn poise_replay_ndjson(records: *const c_char) -> *mut c_char {
    clear_last_error();

    let input = match cstr_to_string(records) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records string pointer");
            return ptr::null_mut();
        }
    };

    let result = FrameRecordAdapter::parse(&input)
        .and_then(|records| replay_records(&records, &AnalyzerConfig::default()))
        .and_then(|output| ReportEncoder::new().encode_to_json(&output.recorder));

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a SignalProcessor
pub struct PoiseProcessorHandle {
    processor: SignalProcessor,
}

/// Create a new processor with the given smoothing window (samples).
///
/// # Safety
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `poise_processor_free`.
#[no_mangle]
pub unsafe extern "C" fn poise_processor_new(smoothing_window: i32) -> *mut PoiseProcessorHandle {
    clear_last_error();

    let window = if smoothing_window <= 0 {
        DEFAULT_SMOOTHING_WINDOW
    } else {
        smoothing_window as usize
    };

    let processor = SignalProcessor::with_smoothing_window(window);
    Box::into_raw(Box::new(PoiseProcessorHandle { processor }))
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `poise_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn poise_processor_free(processor: *mut PoiseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Fold one observation (JSON) into the session and return the snapshot JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `poise_processor_new`.
/// - `observation` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `poise_free_string`.
/// - Returns NULL on error; call `poise_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn poise_processor_process(
    processor: *mut PoiseProcessorHandle,
    observation: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json = match cstr_to_string(observation) {
        Some(s) => s,
        None => {
            set_last_error("Invalid observation string pointer");
            return ptr::null_mut();
        }
    };

    match handle.processor.process_json(&json) {
        Ok(snapshot) => string_to_cstr(&snapshot),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Reset the processor at a question boundary.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `poise_processor_new`.
/// - Returns 0 on success, -1 on a NULL processor.
#[no_mangle]
pub unsafe extern "C" fn poise_processor_reset(processor: *mut PoiseProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    (*processor).processor.reset();
    0
}

/// Latest snapshot JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `poise_processor_new`.
/// - Returns a newly allocated string that must be freed with `poise_free_string`.
/// - Returns NULL on error; call `poise_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn poise_processor_latest(processor: *const PoiseProcessorHandle) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    match serde_json::to_string(&handle.processor.latest()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Poise functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Poise function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn poise_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Poise function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn poise_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Poise library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn poise_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
