use core::ptr::NonNull;

/// A `(pointer, length)` pair that outlives the borrow it was made from.
///
/// Used for storage carved out of an arena where the owner, not the borrow
/// checker, keeps the memory alive.
#[derive(Debug)]
pub struct UnsafeStore<T> {
  ptr: NonNull<T>,
  len: usize,
}

impl<T> From<&mut [T]> for UnsafeStore<T> {
  fn from(slice: &mut [T]) -> Self {
    Self {
      ptr: NonNull::from(&mut *slice).cast(),
      len: slice.len(),
    }
  }
}

impl<T> UnsafeStore<T> {
  /// # Safety
  ///
  /// `ptr` must be valid for reads and writes of `len` initialized values for
  /// as long as the store is used.
  pub const unsafe fn from_raw(ptr: NonNull<T>, len: usize) -> Self {
    Self { ptr, len }
  }

  #[inline(always)]
  pub const fn as_non_null(&self) -> NonNull<T> {
    self.ptr
  }

  #[inline(always)]
  pub const fn len(&self) -> usize {
    self.len
  }

  #[inline(always)]
  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_slice(&self) -> &[T] {
    unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }
}
