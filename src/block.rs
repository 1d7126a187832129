//! Block headers and the raw pointer arithmetic around them.
//!
//! Every pointer cast between a header and its payload lives in this module.
//! The rest of the crate only moves `*mut Block` handles around.

use std::{
  marker::PhantomData,
  mem,
  ptr::{self, NonNull},
};

use crate::align::ALIGNMENT;

/// Header written in front of every payload.
///
/// Packed to the alignment unit so that a header placed right after a
/// payload of any aligned size is itself properly aligned.
#[repr(C, packed(4))]
pub struct Block {
  pub size: usize,
  pub next: *mut Block,
  pub is_free: bool,
}

/// Bytes taken by a [`Block`] header in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest payload a split is allowed to leave behind.
pub const MIN_FRAGMENT: usize = ALIGNMENT;

const _: () = assert!(mem::align_of::<Block>() == ALIGNMENT);
const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);

impl Block {
  pub const fn new(
    size: usize,
    is_free: bool,
    next: *mut Block,
  ) -> Self {
    Self { size, next, is_free }
  }

  /// Writes a fresh in-use header of `size` payload bytes at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be aligned to [`ALIGNMENT`] and valid for writes of
  /// `HEADER_SIZE + size` bytes.
  pub unsafe fn format(
    at: NonNull<u8>,
    size: usize,
  ) -> *mut Block {
    let block = at.as_ptr().cast::<Block>();
    unsafe { block.write(Block::new(size, false, ptr::null_mut())) };
    block
  }

  /// One byte past the end of the block's payload.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *mut Block) -> *mut u8 {
    unsafe { block.cast::<u8>().add(HEADER_SIZE + (*block).size) }
  }

  /// Whether `next` starts exactly where `block`'s payload ends.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn is_contiguous(
    block: *mut Block,
    next: *mut Block,
  ) -> bool {
    unsafe { Block::end(block) == next.cast::<u8>() }
  }

  /// Shrinks `block` to `size` payload bytes and turns the tail into a new
  /// free block linked right after it. Returns the new block.
  ///
  /// ```text
  ///   before:  [hdr | ............ size + rest ............ ] -> next
  ///   after:   [hdr | size ] -> [hdr | rest, free ] -> next
  /// ```
  ///
  /// # Safety
  ///
  /// `block` must point to a live header with
  /// `(*block).size >= size + HEADER_SIZE` and `size` must be aligned.
  pub unsafe fn split(
    block: *mut Block,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let original = (*block).size;
      debug_assert!(original >= size + HEADER_SIZE);

      let remainder = block.cast::<u8>().add(HEADER_SIZE + size).cast::<Block>();
      remainder.write(Block::new(
        original - size - HEADER_SIZE,
        true,
        (*block).next,
      ));

      (*block).size = size;
      (*block).next = remainder;

      remainder
    }
  }

  /// Folds the block after `block` into it: header and payload of the
  /// successor become payload of `block`. Returns the absorbed header,
  /// which must not be used afterwards except for identity comparisons.
  ///
  /// # Safety
  ///
  /// `block` and its successor must be live headers.
  pub unsafe fn absorb_next(block: *mut Block) -> *mut Block {
    unsafe {
      let absorbed = (*block).next;
      debug_assert!(!absorbed.is_null());

      (*block).size += HEADER_SIZE + (*absorbed).size;
      (*block).next = (*absorbed).next;

      absorbed
    }
  }
}

/// Recovers the header of a payload pointer previously handed out.
///
/// # Safety
///
/// `payload` must have been returned by [`payload_of`]. Anything else is a
/// contract violation that is not detected.
pub unsafe fn header_of(payload: NonNull<u8>) -> *mut Block {
  unsafe { payload.as_ptr().sub(HEADER_SIZE).cast::<Block>() }
}

/// The first payload byte of `block`.
///
/// # Safety
///
/// `block` must point to a live header.
pub unsafe fn payload_of(block: *mut Block) -> NonNull<u8> {
  unsafe { NonNull::new_unchecked(block.cast::<u8>().add(HEADER_SIZE)) }
}

/// Walks a block list in `next` order.
pub struct Blocks<'a> {
  current: *mut Block,
  _list: PhantomData<&'a Block>,
}

impl Blocks<'_> {
  /// # Safety
  ///
  /// Every block reachable from `first` must stay live and unmodified while
  /// the iterator is in use.
  pub unsafe fn new(first: *mut Block) -> Self {
    Self {
      current: first,
      _list: PhantomData,
    }
  }
}

impl Iterator for Blocks<'_> {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = unsafe { (*block).next };
    Some(block)
  }
}
