use core::fmt;

use getset::CopyGetters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
  /// Never handed out since construction (or folded back by `collect`).
  Untouched,
  Free,
  Allocated,
}

/// One contiguous address range reported by the diagnostic walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Span {
  start: usize,
  end: usize,
  size: usize,
  status: SpanStatus,
}

impl Span {
  pub const fn new(start: usize, size: usize, status: SpanStatus) -> Self {
    Self {
      start,
      end: start + size,
      size,
      status,
    }
  }

  pub const fn contains(&self, addr: usize) -> bool {
    addr >= self.start && addr < self.end
  }

  pub const fn overlaps(&self, other: &Span) -> bool {
    self.start < other.end && other.start < self.end
  }
}

impl fmt::Display for Span {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let status = match self.status {
      SpanStatus::Untouched => "untouched",
      SpanStatus::Free => "free",
      SpanStatus::Allocated => "allocated",
    };
    write!(
      f,
      "{:#x}..{:#x} {:>10} bytes {}",
      self.start, self.end, self.size, status
    )
  }
}
