//! Placement policies used to pick a free block for a request.

use std::{fmt, ptr, str::FromStr};

use cfg_if::cfg_if;
use snafu::Snafu;

use crate::block::{Block, Blocks};

/// How a free block is chosen among those large enough for a request.
///
/// A heap is built with one policy and keeps it for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
  /// Lowest-addressed free block that is large enough.
  First,
  /// Smallest free block that is large enough, earliest one on ties.
  Best,
  /// Largest free block that is large enough, earliest one on ties.
  Worst,
  /// Like `First`, but resumes after the block returned by the previous
  /// search and wraps around to the head.
  Next,
}

cfg_if! {
  if #[cfg(feature = "next-fit")] {
    const BUILD_FIT: Fit = Fit::Next;
  } else if #[cfg(feature = "best-fit")] {
    const BUILD_FIT: Fit = Fit::Best;
  } else if #[cfg(feature = "worst-fit")] {
    const BUILD_FIT: Fit = Fit::Worst;
  } else {
    const BUILD_FIT: Fit = Fit::First;
  }
}

impl Fit {
  /// Policy picked by the `*-fit` cargo features, first-fit if none is set.
  pub const DEFAULT: Fit = BUILD_FIT;

  /// Looks for a free block with at least `size` payload bytes in the list
  /// starting at `first`. Returns null when nothing fits.
  ///
  /// `cursor` is only read by [`Fit::Next`]; it is the block returned by the
  /// previous successful search, or null.
  ///
  /// # Safety
  ///
  /// `first` must start a well formed, null terminated block list and
  /// `cursor` must be null or one of its blocks.
  pub(crate) unsafe fn search(
    self,
    first: *mut Block,
    cursor: *mut Block,
    size: usize,
  ) -> *mut Block {
    unsafe {
      match self {
        Fit::First => first_fit(first, size),
        Fit::Best => extreme_fit(first, size, |candidate, chosen| candidate < chosen),
        Fit::Worst => extreme_fit(first, size, |candidate, chosen| candidate > chosen),
        Fit::Next => next_fit(first, cursor, size),
      }
    }
  }
}

impl Default for Fit {
  fn default() -> Self {
    Fit::DEFAULT
  }
}

impl fmt::Display for Fit {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let name = match self {
      Fit::First => "first-fit",
      Fit::Best => "best-fit",
      Fit::Worst => "worst-fit",
      Fit::Next => "next-fit",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Snafu)]
#[snafu(display("unknown placement policy {name:?}, expected first, best, worst or next"))]
pub struct ParseFitError {
  name: String,
}

impl FromStr for Fit {
  type Err = ParseFitError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim_end_matches("-fit") {
      "first" => Ok(Fit::First),
      "best" => Ok(Fit::Best),
      "worst" => Ok(Fit::Worst),
      "next" => Ok(Fit::Next),
      _ => ParseFitSnafu { name: s }.fail(),
    }
  }
}

unsafe fn fits(
  block: *mut Block,
  size: usize,
) -> bool {
  unsafe { (*block).is_free && (*block).size >= size }
}

unsafe fn first_fit(
  first: *mut Block,
  size: usize,
) -> *mut Block {
  unsafe {
    Blocks::new(first)
      .find(|&block| fits(block, size))
      .unwrap_or(ptr::null_mut())
  }
}

/// Full scan keeping the candidate for which `better(candidate, chosen)`
/// holds against every other one. Strict comparisons keep the earliest
/// block on ties.
unsafe fn extreme_fit(
  first: *mut Block,
  size: usize,
  better: fn(usize, usize) -> bool,
) -> *mut Block {
  let mut chosen: *mut Block = ptr::null_mut();

  unsafe {
    for block in Blocks::new(first) {
      if fits(block, size) && (chosen.is_null() || better((*block).size, (*chosen).size)) {
        chosen = block;
      }
    }
  }

  chosen
}

unsafe fn next_fit(
  first: *mut Block,
  cursor: *mut Block,
  size: usize,
) -> *mut Block {
  unsafe {
    if cursor.is_null() {
      return first_fit(first, size);
    }

    // From just after the cursor up to the tail.
    if let Some(block) = Blocks::new((*cursor).next).find(|&block| fits(block, size)) {
      return block;
    }

    // Wrap around: from the head back to the cursor, inclusive.
    for block in Blocks::new(first) {
      if fits(block, size) {
        return block;
      }
      if block == cursor {
        break;
      }
    }

    ptr::null_mut()
  }
}
