//! Usage counters kept by the heap.

use std::fmt;

use arrayvec::ArrayString;

/// Counters updated by every public heap operation.
///
/// They are diagnostics only and never influence allocation decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
  /// Successful allocations.
  pub allocations: usize,
  /// Releases of non-null pointers.
  pub releases: usize,
  /// Allocations served from an existing free block.
  pub reuses: usize,
  /// Successful heap extensions.
  pub grows: usize,
  pub splits: usize,
  pub coalesces: usize,
  /// Blocks currently in the list, free or not.
  pub blocks: usize,
  /// Sum of aligned request sizes.
  pub requested: usize,
  /// Running size estimate: grows with every extension and split, shrinks
  /// by one header per coalesce. Despite being reported as "max heap" it
  /// is not a high-water mark.
  pub heap_size: usize,
}

impl Stats {
  pub const fn new() -> Self {
    Self {
      allocations: 0,
      releases: 0,
      reuses: 0,
      grows: 0,
      splits: 0,
      coalesces: 0,
      blocks: 0,
      requested: 0,
      heap_size: 0,
    }
  }
}

impl fmt::Display for Stats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "\nheap management statistics")?;
    writeln!(f, "mallocs:\t{}", self.allocations)?;
    writeln!(f, "frees:\t\t{}", self.releases)?;
    writeln!(f, "reuses:\t\t{}", self.reuses)?;
    writeln!(f, "grows:\t\t{}", self.grows)?;
    writeln!(f, "splits:\t\t{}", self.splits)?;
    writeln!(f, "coalesces:\t{}", self.coalesces)?;
    writeln!(f, "blocks:\t\t{}", self.blocks)?;
    writeln!(f, "requested:\t{}", self.requested)?;
    writeln!(f, "max heap:\t{}", self.heap_size)
  }
}

/// Upper bound of the rendered table, with every counter at `usize::MAX`.
const REPORT_CAPACITY: usize = 512;

/// Writes the statistics table to standard output without allocating.
pub(crate) fn write_report(stats: &Stats) {
  use std::fmt::Write as _;

  let mut report = ArrayString::<REPORT_CAPACITY>::new();
  let _ = write!(report, "{stats}");

  let bytes = report.as_bytes();
  let mut written = 0;
  while written < bytes.len() {
    let result = unsafe {
      libc::write(
        libc::STDOUT_FILENO,
        bytes[written..].as_ptr().cast(),
        bytes.len() - written,
      )
    };
    if result <= 0 {
      break;
    }
    written += result as usize;
  }
}
