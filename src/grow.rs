//! Sources of fresh address space.

use std::{
  alloc::{self, Layout},
  io,
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};
use snafu::{ResultExt, Snafu};

use crate::align::ALIGNMENT;

/// Errors raised when the heap cannot be extended.
#[derive(Debug, Snafu)]
pub enum GrowError {
  #[snafu(display("the operating system refused to extend the heap by {requested} bytes"))]
  Exhausted {
    requested: usize,
    source: io::Error,
  },
  #[snafu(display("a heap extension of {requested} bytes does not fit in a single request"))]
  TooLarge { requested: usize },
  #[snafu(display("the program break moved while extending the heap by {requested} bytes"))]
  BreakMoved { requested: usize },
  #[snafu(display("arena has {remaining} bytes left, {requested} requested"))]
  ArenaFull { requested: usize, remaining: usize },
}

/// Something that can hand out more contiguous memory on request.
///
/// # Safety
///
/// A successful `grow(bytes)` must return a region that is aligned to
/// [`ALIGNMENT`], valid for reads and writes of `bytes` bytes, not handed
/// out before, and located above every region returned earlier.
pub unsafe trait Grower {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError>;
}

/// Grows the data segment with `sbrk(2)`.
///
/// The allocator assumes it owns the program break. Other `sbrk` users in
/// the same process only cause gaps between blocks, which are never merged.
#[derive(Debug, Default)]
pub struct Sbrk;

impl Sbrk {
  pub const fn new() -> Self {
    Sbrk
  }
}

fn sbrk_failed(address: *mut c_void) -> bool {
  address as usize == usize::MAX
}

/// Bytes to skip at `address` to reach the next [`ALIGNMENT`] boundary.
fn padding_for(address: usize) -> usize {
  address.wrapping_neg() & (ALIGNMENT - 1)
}

/// Offset of an aligned `bytes`-sized region inside `reserved` bytes
/// starting at `address`, if it fits.
fn aligned_start(
  address: usize,
  reserved: usize,
  bytes: usize,
) -> Option<usize> {
  let padding = padding_for(address);
  (padding.checked_add(bytes)? <= reserved).then_some(padding)
}

unsafe impl Grower for Sbrk {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let current = unsafe { sbrk(0) };
    if sbrk_failed(current) {
      return Err(io::Error::last_os_error()).context(ExhaustedSnafu { requested: bytes });
    }

    let reserved = bytes
      .checked_add(padding_for(current as usize))
      .ok_or(GrowError::TooLarge { requested: bytes })?;
    let increment =
      intptr_t::try_from(reserved).map_err(|_| GrowError::TooLarge { requested: bytes })?;

    let previous = unsafe { sbrk(increment) };
    if sbrk_failed(previous) {
      return Err(io::Error::last_os_error()).context(ExhaustedSnafu { requested: bytes });
    }

    // Someone else may have moved the break since the probe.
    let padding = aligned_start(previous as usize, reserved, bytes)
      .ok_or(GrowError::BreakMoved { requested: bytes })?;

    log::trace!(
      "sbrk({}) moved the program break from {:?} to {:?}",
      increment,
      previous,
      unsafe { sbrk(0) }
    );

    let start = unsafe { previous.cast::<u8>().add(padding) };
    NonNull::new(start).ok_or(GrowError::TooLarge { requested: bytes })
  }
}

/// A fixed-capacity region handed out front to back.
///
/// Useful where `sbrk` is unavailable or unwanted, and to get a private,
/// deterministic address range in tests.
pub struct Arena {
  base: NonNull<u8>,
  layout: Layout,
  used: usize,
}

impl Arena {
  /// Reserves `capacity` bytes from the system allocator.
  pub fn new(capacity: usize) -> Self {
    let layout = Layout::from_size_align(capacity.max(1), 16).unwrap_or_else(|_| {
      panic!("arena capacity {capacity} is not a valid allocation size");
    });
    let base = unsafe { alloc::alloc(layout) };
    let Some(base) = NonNull::new(base) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      base,
      layout,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.used
  }

  /// Whether `address` lies inside the arena.
  pub fn contains(
    &self,
    address: *const u8,
  ) -> bool {
    let start = self.base.as_ptr() as usize;
    (start..start + self.capacity()).contains(&(address as usize))
  }
}

unsafe impl Grower for Arena {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, GrowError> {
    let remaining = self.remaining();
    let padded = crate::align::align_up(bytes).ok_or(GrowError::TooLarge { requested: bytes })?;
    if padded > remaining {
      return ArenaFullSnafu {
        requested: bytes,
        remaining,
      }
      .fail();
    }

    let start = unsafe { self.base.add(self.used) };
    self.used += padded;
    Ok(start)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}

unsafe impl Send for Arena {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_hands_out_consecutive_regions() {
    let mut arena = Arena::new(128);

    let first = arena.grow(24).unwrap();
    let second = arena.grow(40).unwrap();

    assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(unsafe { first.add(24) }, second);
    assert_eq!(arena.remaining(), 128 - 64);
    assert!(arena.contains(second.as_ptr()));
  }

  #[test]
  fn test_arena_exhaustion() {
    let mut arena = Arena::new(64);

    arena.grow(60).unwrap();
    let err = arena.grow(8).unwrap_err();

    assert!(matches!(
      err,
      GrowError::ArenaFull {
        requested: 8,
        remaining: 4
      }
    ));
    assert_eq!(arena.remaining(), 4);
    assert!(arena.grow(4).is_ok());
  }

  #[test]
  fn test_arena_rejects_overflowing_request() {
    let mut arena = Arena::new(64);

    assert!(matches!(
      arena.grow(usize::MAX),
      Err(GrowError::TooLarge { .. })
    ));
  }

  #[test]
  fn test_sbrk_rejects_oversized_request() {
    let mut sbrk = Sbrk::new();

    assert!(matches!(
      sbrk.grow(usize::MAX),
      Err(GrowError::TooLarge { .. })
    ));
  }

  #[test]
  fn test_aligned_start_follows_actual_break() {
    assert_eq!(aligned_start(0x1000, 64, 64), Some(0));
    assert_eq!(aligned_start(0x1001, 67, 64), Some(3));
    assert_eq!(aligned_start(0x1003, 67, 64), Some(1));
    // Reserved for an aligned break, but the break moved to a misaligned one.
    assert_eq!(aligned_start(0x1002, 64, 64), None);
    assert_eq!(aligned_start(0x1001, 66, 64), None);
  }

  #[test]
  fn test_grow_error_display() {
    let err = GrowError::ArenaFull {
      requested: 32,
      remaining: 8,
    };

    assert_eq!(err.to_string(), "arena has 8 bytes left, 32 requested");
  }
}
