use core::ptr::NonNull;

use getset::CopyGetters;

pub const GUARD_BAND: usize = 4;
pub const RESERVE_DESCRIPTORS: usize = 1;

pub const NO_MANS_LAND_FILL: u8 = 0xFD;
pub const ALIGN_FILL: u8 = 0xED;
pub const DEAD_FILL: u8 = 0xDD;
pub const CLEAN_FILL: u8 = 0xCD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
  /// Guard bands around a live allocation.
  NoMansLand,
  /// Padding introduced by alignment.
  Align,
  /// Memory that was freed.
  Dead,
  /// Freshly handed out user memory.
  Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Fill {
  no_mans_land: u8,
  align: u8,
  dead: u8,
  clean: u8,
}

impl Fill {
  pub const fn new(no_mans_land: u8, align: u8, dead: u8, clean: u8) -> Self {
    Self {
      no_mans_land,
      align,
      dead,
      clean,
    }
  }

  pub const fn byte(&self, pattern: Pattern) -> u8 {
    match pattern {
      Pattern::NoMansLand => self.no_mans_land,
      Pattern::Align => self.align,
      Pattern::Dead => self.dead,
      Pattern::Clean => self.clean,
    }
  }
}

impl Default for Fill {
  fn default() -> Self {
    Self::new(NO_MANS_LAND_FILL, ALIGN_FILL, DEAD_FILL, CLEAN_FILL)
  }
}

/// Per-allocator knobs. Passed by value to every constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Config {
  guard_band: usize,
  fill: Fill,
  stamping: bool,
  reserve_descriptors: usize,
}

impl Config {
  pub const fn debug() -> Self {
    Self {
      guard_band: GUARD_BAND,
      fill: Fill::new(NO_MANS_LAND_FILL, ALIGN_FILL, DEAD_FILL, CLEAN_FILL),
      stamping: true,
      reserve_descriptors: RESERVE_DESCRIPTORS,
    }
  }

  pub const fn release() -> Self {
    Self {
      guard_band: 0,
      fill: Fill::new(NO_MANS_LAND_FILL, ALIGN_FILL, DEAD_FILL, CLEAN_FILL),
      stamping: false,
      reserve_descriptors: RESERVE_DESCRIPTORS,
    }
  }

  pub const fn with_guard_band(mut self, guard_band: usize) -> Self {
    self.guard_band = guard_band;
    self
  }

  pub const fn with_fill(mut self, fill: Fill) -> Self {
    self.fill = fill;
    self
  }

  pub const fn with_stamping(mut self, stamping: bool) -> Self {
    self.stamping = stamping;
    self
  }

  pub const fn with_reserve_descriptors(mut self, reserve_descriptors: usize) -> Self {
    self.reserve_descriptors = reserve_descriptors;
    self
  }

  /// Fills `len` bytes at `at` with `pattern`. No-op with stamping off.
  ///
  /// # Safety
  ///
  /// `at..at + len` must be writable.
  #[inline]
  pub unsafe fn stamp(&self, at: NonNull<u8>, len: usize, pattern: Pattern) {
    if !self.stamping || len == 0 {
      return;
    }
    unsafe { at.as_ptr().write_bytes(self.fill.byte(pattern), len) };
  }

  /// Returns the address of the first byte not matching `pattern`.
  ///
  /// # Safety
  ///
  /// `at..at + len` must be readable.
  pub unsafe fn scan(&self, at: NonNull<u8>, len: usize, pattern: Pattern) -> Option<usize> {
    if !self.stamping || len == 0 {
      return None;
    }

    let expected = self.fill.byte(pattern);
    let bytes = unsafe { core::slice::from_raw_parts(at.as_ptr(), len) };
    bytes
      .iter()
      .position(|byte| *byte != expected)
      .map(|index| at.as_ptr() as usize + index)
  }

  /// Length of the run of `pattern` bytes starting at `at`, at most `len`.
  /// Zero with stamping off.
  ///
  /// # Safety
  ///
  /// `at..at + len` must be readable.
  pub unsafe fn leading(&self, at: NonNull<u8>, len: usize, pattern: Pattern) -> usize {
    if !self.stamping {
      return 0;
    }

    let expected = self.fill.byte(pattern);
    let bytes = unsafe { core::slice::from_raw_parts(at.as_ptr(), len) };
    bytes.iter().take_while(|byte| **byte == expected).count()
  }

  /// Length of the run of `pattern` bytes ending at `at + len`.
  ///
  /// # Safety
  ///
  /// `at..at + len` must be readable.
  pub unsafe fn trailing(&self, at: NonNull<u8>, len: usize, pattern: Pattern) -> usize {
    if !self.stamping {
      return 0;
    }

    let expected = self.fill.byte(pattern);
    let bytes = unsafe { core::slice::from_raw_parts(at.as_ptr(), len) };
    bytes.iter().rev().take_while(|byte| **byte == expected).count()
  }
}

impl Default for Config {
  fn default() -> Self {
    if cfg!(debug_assertions) {
      Self::debug()
    } else {
      Self::release()
    }
  }
}
