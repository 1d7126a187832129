//! # brkmalloc - A Free-List Memory Allocator on top of `sbrk`
//!
//! This crate provides a replacement for the `malloc`, `free`, `realloc` and
//! `calloc` primitives. Memory is obtained by moving the program break with
//! `sbrk(2)` and managed through a list of blocks threaded through the heap
//! itself.
//!
//! ## Overview
//!
//! Every allocation is a block: a small header followed by the payload handed
//! to the caller. Blocks are never returned to the operating system; released
//! blocks are marked free and reused by later requests.
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │   ┌─────┬──────┬─────┬────┬─────┬────────────┬─────┬──────┐          │
//!   │   │ hdr │  A1  │ hdr │ F  │ hdr │     A3     │ hdr │  F   │          │
//!   │   └─────┴──────┴─────┴────┴─────┴────────────┴─────┴──────┘          │
//!   │            ▲                                               ▲         │
//!   │            │                                               │         │
//!   │     Pointer returned                                    Program      │
//!   │        to caller                                         Break       │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   List order is address order. F = free block.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkmalloc
//!   ├── align      - Alignment unit and the align! macro
//!   ├── block      - Block header and header/payload pointer arithmetic (internal)
//!   ├── fit        - Placement policies: first, best, worst and next fit
//!   ├── grow       - Grower trait, Sbrk and Arena growers
//!   ├── heap       - Heap: allocate, release, reallocate, zero_allocate
//!   ├── stats      - Usage counters and their report
//!   ├── global     - The process-wide heap
//!   └── ffi        - C ABI malloc family (feature "interpose")
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkmalloc::{Arena, Fit, Heap};
//!
//! let mut heap = Heap::new(Arena::new(64 * 1024), Fit::Best);
//!
//! let ptr = heap.allocate(13).unwrap();
//! unsafe {
//!     assert_eq!(heap.usable_size(ptr), 16);
//!     ptr.cast::<u64>().write_unaligned(42);
//!     heap.release(ptr.as_ptr());
//! }
//!
//! assert_eq!(heap.stats().allocations, 1);
//! assert!(heap.validate().is_ok());
//! ```
//!
//! ## How It Works
//!
//! ```text
//!   allocate(n)
//!     │
//!     ├─ align n up to a multiple of 4
//!     ├─ search the list with the heap's Fit policy
//!     │    ├─ found, oversized ──► split, remainder stays free
//!     │    ├─ found           ──► reuse as is
//!     │    └─ not found       ──► grow the heap, link the block at the tail
//!     └─ mark in use, return payload
//!
//!   release(p)
//!     ├─ mark free
//!     ├─ merge into the previous block if it is free
//!     └─ merge the next block in if it is free
//! ```
//!
//! Each block carries a header:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next: null/ptr  │  │  │                          │  │
//!   │  │ is_free: false  │  │  │   N bytes usable (N%4=0) │  │
//!   │  └─────────────────┘  │  │                          │  │
//!   │  20 bytes on 64 bit   │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! ## Placement policy
//!
//! [`Fit::DEFAULT`] is chosen at build time through the `first-fit`
//! (default), `best-fit`, `worst-fit` and `next-fit` cargo features, and is
//! what the process-wide heap in [`global`] uses. A [`Heap`] built by hand
//! takes its policy as a constructor argument.
//!
//! ## Limitations
//!
//! - **Not reentrant**: the global heap is behind a spin lock only
//! - **Grows only**: memory is never given back to the operating system
//! - **4 byte alignment**: payloads are not suitable for over-aligned types
//! - **No hardening**: invalid or double frees are undefined behavior
//! - **Unix-only**: requires `libc` and `sbrk`

pub mod align;
mod block;
#[cfg(feature = "interpose")]
mod ffi;
pub mod fit;
pub mod global;
pub mod grow;
pub mod heap;
pub mod stats;

pub use block::{HEADER_SIZE, MIN_FRAGMENT};
pub use fit::{Fit, ParseFitError};
pub use grow::{Arena, GrowError, Grower, Sbrk};
pub use heap::{BlockInfo, Heap, HeapError};
pub use stats::Stats;
