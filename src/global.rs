//! The process-wide heap behind the C-style entry points.
//!
//! It is created on first use, lives until the process exits and grows the
//! program break with [`Sbrk`]. The lock serialises callers but does not
//! make the heap reentrant: allocating from inside a heap operation (for
//! example from a logger that allocates) deadlocks.

use std::ptr::{self, NonNull};

use spin::Mutex;

use crate::{
  fit::Fit,
  grow::Sbrk,
  heap::Heap,
  stats::{self, Stats},
};

static HEAP: Mutex<Heap<Sbrk>> = Mutex::new(Heap::new(Sbrk::new(), Fit::DEFAULT));

fn into_raw(payload: Option<NonNull<u8>>) -> *mut u8 {
  payload.map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Allocates `size` bytes, null when `size` is zero or memory is exhausted.
pub fn malloc(size: usize) -> *mut u8 {
  into_raw(HEAP.lock().allocate(size))
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn free(ptr: *mut u8) {
  unsafe { HEAP.lock().release(ptr) }
}

/// # Safety
///
/// `ptr` must be null or a live pointer returned by this module.
pub unsafe fn realloc(
  ptr: *mut u8,
  size: usize,
) -> *mut u8 {
  into_raw(unsafe { HEAP.lock().reallocate(ptr, size) })
}

/// Allocates `count * size` zeroed bytes, null on overflow or exhaustion.
pub fn calloc(
  count: usize,
  size: usize,
) -> *mut u8 {
  into_raw(HEAP.lock().zero_allocate(count, size))
}

/// Snapshot of the global heap counters.
pub fn statistics() -> Stats {
  HEAP.lock().stats()
}

/// Placement policy of the global heap.
pub fn fit() -> Fit {
  HEAP.lock().fit()
}

/// Prints the statistics table to standard output without allocating.
pub fn print_statistics() {
  stats::write_report(&statistics());
}
