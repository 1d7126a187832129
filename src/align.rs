/// Every payload size handed out by the heap is a multiple of this many bytes.
pub const ALIGNMENT: usize = 4;

const _: () = assert!(ALIGNMENT.is_power_of_two());

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// The expression is not overflow checked, use [`align_up`] for sizes that
/// come straight from a caller.
///
/// # Examples
///
/// ```rust
/// use brkmalloc::align;
///
/// assert_eq!(align!(1), 4);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Overflow-checked version of [`align!`].
///
/// Returns `None` when rounding up would wrap around `usize`.
pub const fn align_up(size: usize) -> Option<usize> {
  match size.checked_add(ALIGNMENT - 1) {
    Some(value) => Some(value & !(ALIGNMENT - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), align_up(size));
      }
    }
  }

  #[test]
  fn test_align_zero() {
    assert_eq!(align!(0usize), 0);
    assert_eq!(align_up(0), Some(0));
  }

  #[test]
  fn test_align_up_overflow() {
    assert_eq!(align_up(usize::MAX), None);
    assert_eq!(align_up(usize::MAX - 2), None);
    assert_eq!(align_up(usize::MAX - 3), Some(usize::MAX - 3));
  }
}
