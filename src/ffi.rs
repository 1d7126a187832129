//! `malloc` family exported with C linkage, so that the `cdylib` can be
//! linked or preloaded in place of the system allocator.
//!
//! The statistics table is printed when the process exits, registered with
//! `atexit` on the first allocation.
//!
//! Test builds keep the names mangled, so the test harness itself still
//! runs on the system allocator.

use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_void, size_t};

use crate::global;

static REPORTER_REGISTERED: AtomicBool = AtomicBool::new(false);

extern "C" fn report_at_exit() {
  global::print_statistics();
}

fn register_reporter() {
  // `atexit` may itself allocate, so the flag is set before calling it.
  if !REPORTER_REGISTERED.swap(true, Ordering::Relaxed) {
    unsafe { libc::atexit(report_at_exit) };
  }
}

#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn malloc(size: size_t) -> *mut c_void {
  register_reporter();
  global::malloc(size).cast()
}

/// # Safety
///
/// `ptr` must be null or a pointer returned by this allocator.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
  unsafe { global::free(ptr.cast()) }
}

/// # Safety
///
/// `ptr` must be null or a pointer returned by this allocator.
#[cfg_attr(not(test), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(
  ptr: *mut c_void,
  size: size_t,
) -> *mut c_void {
  register_reporter();
  unsafe { global::realloc(ptr.cast(), size).cast() }
}

#[cfg_attr(not(test), unsafe(no_mangle))]
pub extern "C" fn calloc(
  count: size_t,
  size: size_t,
) -> *mut c_void {
  register_reporter();
  global::calloc(count, size).cast()
}
