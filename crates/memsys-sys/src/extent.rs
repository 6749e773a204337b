use core::{
  mem::ManuallyDrop,
  ops::Range,
  ptr::NonNull,
};

use crate::{
  GLOBAL_SYSTEM,
  system::SysError,
};

#[derive(Debug)]
pub enum ExtentError {
  SystemError(SysError),
  OutOfBounds,
}

pub type ExtentResult<T> = Result<T, ExtentError>;

/// One reservation obtained from [`GLOBAL_SYSTEM`], released on drop.
pub struct Extent {
  slice: &'static mut [u8],
}

impl Extent {
  pub fn new(size: usize) -> ExtentResult<Extent> {
    let slice = unsafe { GLOBAL_SYSTEM.alloc(size) }.map_err(ExtentError::SystemError)?;

    Ok(Extent { slice })
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.slice.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.slice.is_empty()
  }

  #[inline(always)]
  pub fn base(&self) -> NonNull<u8> {
    NonNull::from(&*self.slice).cast()
  }

  pub fn check(&self, range: &Range<usize>) -> ExtentResult<()> {
    if range.start > range.end || range.end > self.slice.len() {
      return Err(ExtentError::OutOfBounds);
    }
    Ok(())
  }

  /// Hands out a sub-range with the lifetime of the reservation.
  ///
  /// # Safety
  ///
  /// Ranges handed out must not overlap each other, and none of them may be
  /// used after the extent is dropped.
  pub unsafe fn carve(&self, range: Range<usize>) -> ExtentResult<&'static mut [u8]> {
    self.check(&range)?;
    let start = unsafe { self.base().as_ptr().add(range.start) };
    Ok(unsafe { core::slice::from_raw_parts_mut(start, range.end - range.start) })
  }

  /// Gives up ownership without unmapping. Used when live allocations may
  /// still point into the reservation.
  pub fn leak(self) -> &'static mut [u8] {
    let mut this = ManuallyDrop::new(self);
    core::mem::take(&mut this.slice)
  }
}

impl AsRef<[u8]> for Extent {
  fn as_ref(&self) -> &[u8] {
    self.slice
  }
}

impl AsMut<[u8]> for Extent {
  fn as_mut(&mut self) -> &mut [u8] {
    self.slice
  }
}

impl Drop for Extent {
  fn drop(&mut self) {
    let _ = unsafe { GLOBAL_SYSTEM.dealloc(self.slice) };
  }
}
