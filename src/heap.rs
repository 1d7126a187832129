use std::ptr::{self, NonNull};

use snafu::{Snafu, ensure};

use crate::{
  align::align_up,
  block::{Block, Blocks, HEADER_SIZE, MIN_FRAGMENT, header_of, payload_of},
  fit::Fit,
  grow::Grower,
  stats::Stats,
};

/// Largest payload the heap will try to serve. Anything above cannot be
/// expressed as a single `sbrk` increment together with its header.
const MAX_REQUEST: usize = isize::MAX as usize - HEADER_SIZE;

/// A broken heap invariant found by [`Heap::validate`].
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum HeapError {
  #[snafu(display("block list does not terminate after {limit} blocks"))]
  Unterminated { limit: usize },
  #[snafu(display("block at {block:#x} is not above the end of its predecessor ({end:#x})"))]
  OutOfOrder { block: usize, end: usize },
  #[snafu(display("contiguous blocks at {first:#x} and {second:#x} are both free"))]
  Uncoalesced { first: usize, second: usize },
  #[snafu(display("tail pointer does not reference the last block"))]
  StaleTail,
  #[snafu(display("next-fit cursor does not reference a live block"))]
  StaleCursor,
  #[snafu(display("block counter says {counted} but the list holds {found}"))]
  CountMismatch { counted: usize, found: usize },
}

/// Read-only view of one block, as returned by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address handed to the caller for this block.
  pub payload: NonNull<u8>,
  /// Usable bytes, excluding the header.
  pub size: usize,
  pub is_free: bool,
}

/// A heap threading an address-ordered block list through the memory
/// returned by its [`Grower`].
///
/// ```text
///   first                                                   last
///     │                                                       │
///     ▼                                                       ▼
///   ┌─────┬─────────┐ ┌─────┬────┐ ┌─────┬──────────────┐ ┌─────┬───────┐
///   │ hdr │ in use  │→│ hdr │free│→│ hdr │    in use    │→│ hdr │ free  │→ null
///   └─────┴─────────┘ └─────┴────┘ └─────┴──────────────┘ └─────┴───────┘
///                        ▲
///                        └── cursor (next-fit only)
/// ```
///
/// List order is address order, and neighbours in the list are contiguous
/// in memory unless something else moved the program break in between.
/// No two contiguous blocks are ever both free.
pub struct Heap<G> {
  first: *mut Block,
  last: *mut Block,
  cursor: *mut Block,
  fit: Fit,
  grower: G,
  stats: Stats,
}

unsafe impl<G: Send> Send for Heap<G> {}

impl<G: Grower> Heap<G> {
  pub const fn new(
    grower: G,
    fit: Fit,
  ) -> Self {
    Self {
      first: ptr::null_mut(),
      last: ptr::null_mut(),
      cursor: ptr::null_mut(),
      fit,
      grower,
      stats: Stats::new(),
    }
  }

  pub fn fit(&self) -> Fit {
    self.fit
  }

  pub fn stats(&self) -> Stats {
    self.stats
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  /// Iterates over every block, free or in use, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    unsafe { Blocks::new(self.first) }.map(|block| unsafe {
      BlockInfo {
        payload: payload_of(block),
        size: (*block).size,
        is_free: (*block).is_free,
      }
    })
  }

  /// Usable size of a live allocation.
  ///
  /// # Safety
  ///
  /// `payload` must be a live pointer returned by this heap.
  pub unsafe fn usable_size(
    &self,
    payload: NonNull<u8>,
  ) -> usize {
    unsafe { (*header_of(payload)).size }
  }

  /// Returns at least `size` bytes, or `None` for a zero-sized request or
  /// when the heap cannot grow any more.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let size = align_up(size).filter(|&size| size <= MAX_REQUEST)?;
    if size == 0 {
      return None;
    }

    let block = unsafe { self.fit.search(self.first, self.cursor, size) };
    if !block.is_null() {
      self.cursor = block;
    }

    self.stats.requested += size;

    let block = if block.is_null() {
      self.grow(size)?
    } else {
      log::debug!(
        "reusing {} byte block at {:?} for {} bytes",
        unsafe { (*block).size },
        block,
        size
      );
      self.stats.reuses += 1;
      unsafe { self.split_if_oversized(block, size) };
      block
    };

    unsafe { (*block).is_free = false };
    self.stats.allocations += 1;

    Some(unsafe { payload_of(block) })
  }

  /// Releases an allocation and merges it with free neighbours.
  /// A null pointer is ignored.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this heap.
  /// Releasing anything else, or releasing twice, is undefined behavior.
  pub unsafe fn release(
    &mut self,
    payload: *mut u8,
  ) {
    let Some(payload) = NonNull::new(payload) else {
      return;
    };

    unsafe {
      let block = header_of(payload);
      (*block).is_free = true;
      self.stats.releases += 1;

      self.coalesce(block);
    }
  }

  /// Resizes an allocation, moving it when it cannot be satisfied in place.
  ///
  /// A null `payload` behaves as [`Heap::allocate`]; a zero `size` releases
  /// the allocation and returns `None`. When growing fails the original
  /// allocation is left untouched and `None` is returned.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a live pointer returned by this heap.
  pub unsafe fn reallocate(
    &mut self,
    payload: *mut u8,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(payload) = NonNull::new(payload) else {
      return self.allocate(size);
    };

    if size == 0 {
      unsafe { self.release(payload.as_ptr()) };
      return None;
    }

    let aligned = align_up(size).filter(|&size| size <= MAX_REQUEST)?;

    unsafe {
      let block = header_of(payload);
      let current = (*block).size;

      if current >= aligned {
        self.stats.requested += aligned;
        if let Some(remainder) = self.split_if_oversized(block, aligned) {
          self.merge_forward(remainder);
        }
        return Some(payload);
      }

      let moved = self.allocate(size)?;
      ptr::copy_nonoverlapping(payload.as_ptr(), moved.as_ptr(), current);
      self.release(payload.as_ptr());

      Some(moved)
    }
  }

  /// Allocates room for `count` elements of `size` bytes with every payload
  /// byte set to zero. Returns `None` when the total overflows.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let total = count.checked_mul(size)?;
    let payload = self.allocate(total)?;

    unsafe {
      let usable = self.usable_size(payload);
      ptr::write_bytes(payload.as_ptr(), 0, usable);
    }

    Some(payload)
  }

  /// Checks every structural invariant of the block list.
  pub fn validate(&self) -> Result<(), HeapError> {
    let limit = self.stats.blocks;
    let mut found = 0;
    let mut previous: *mut Block = ptr::null_mut();
    let mut cursor_seen = self.cursor.is_null();

    unsafe {
      for block in Blocks::new(self.first) {
        found += 1;
        ensure!(found <= limit, UnterminatedSnafu { limit });

        if !previous.is_null() {
          let end = Block::end(previous);
          ensure!(
            block.cast::<u8>() >= end,
            OutOfOrderSnafu {
              block: block as usize,
              end: end as usize
            }
          );
          ensure!(
            !((*previous).is_free && (*block).is_free && Block::is_contiguous(previous, block)),
            UncoalescedSnafu {
              first: previous as usize,
              second: block as usize
            }
          );
        }

        cursor_seen |= block == self.cursor;
        previous = block;
      }
    }

    ensure!(previous == self.last, StaleTailSnafu);
    ensure!(cursor_seen, StaleCursorSnafu);
    ensure!(
      found == limit,
      CountMismatchSnafu {
        counted: limit,
        found
      }
    );

    Ok(())
  }

  /// Extends the heap by one in-use block of `size` payload bytes and links
  /// it after the current tail.
  fn grow(
    &mut self,
    size: usize,
  ) -> Option<*mut Block> {
    let bytes = HEADER_SIZE + size;
    let region = match self.grower.grow(bytes) {
      Ok(region) => region,
      Err(err) => {
        log::warn!("cannot grow heap for a {size} byte block: {err}");
        return None;
      }
    };

    unsafe {
      let block = Block::format(region, size);

      if self.last.is_null() {
        self.first = block;
      } else {
        (*self.last).next = block;
      }
      self.last = block;

      log::trace!("grew heap by {bytes} bytes, new block at {block:?}");

      self.stats.grows += 1;
      self.stats.blocks += 1;
      self.stats.heap_size += bytes;

      Some(block)
    }
  }

  /// Splits `block` down to `size` bytes when the rest is large enough to
  /// form a block of its own. Returns the free remainder, if any.
  unsafe fn split_if_oversized(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> Option<*mut Block> {
    unsafe {
      if (*block).size < size + HEADER_SIZE + MIN_FRAGMENT {
        return None;
      }

      let remainder = Block::split(block, size);
      if self.last == block {
        self.last = remainder;
      }

      let rest = (*remainder).size;
      log::trace!("split block at {block:?}: {size} bytes kept, {rest} bytes free at {remainder:?}");

      self.stats.splits += 1;
      self.stats.blocks += 1;
      self.stats.heap_size += HEADER_SIZE;

      Some(remainder)
    }
  }

  /// Merges a freshly released block with its free predecessor, then the
  /// result with its free successor.
  unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let mut current = block;

      let previous = self.predecessor(block);
      if !previous.is_null() && (*previous).is_free && Block::is_contiguous(previous, block) {
        self.merge_next(previous);
        current = previous;
      }

      self.merge_forward(current);
    }
  }

  /// Absorbs the successor of `block` if it is free and contiguous.
  unsafe fn merge_forward(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next;
      if !next.is_null() && (*next).is_free && Block::is_contiguous(block, next) {
        self.merge_next(block);
      }
    }
  }

  unsafe fn merge_next(
    &mut self,
    survivor: *mut Block,
  ) {
    let absorbed = unsafe { Block::absorb_next(survivor) };

    if self.last == absorbed {
      self.last = survivor;
    }
    if self.cursor == absorbed {
      self.cursor = survivor;
    }

    log::trace!("coalesced block at {absorbed:?} into {survivor:?}");

    self.stats.coalesces += 1;
    self.stats.blocks -= 1;
    self.stats.heap_size -= HEADER_SIZE;
  }

  /// The block whose `next` is `block`, or null for the head.
  unsafe fn predecessor(
    &self,
    block: *mut Block,
  ) -> *mut Block {
    unsafe {
      Blocks::new(self.first)
        .find(|&candidate| {
          let next = (*candidate).next;
          next == block
        })
        .unwrap_or(ptr::null_mut())
    }
  }
}
