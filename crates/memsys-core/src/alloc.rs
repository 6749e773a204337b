use core::ptr::NonNull;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// No region large enough for the request.
  OutOfMemory,
  /// A split or carve needed a descriptor and none could be produced.
  OutOfDescriptors,
  InvalidAlignment,
  /// The pointer lies outside the allocator's span.
  NotOwned,
  /// The pointer is inside the span but is not a live allocation.
  NotAllocated,
  /// A guard band or dead fill was overwritten.
  Corrupted { addr: usize },
}

pub type AllocResult<T> = Result<T, AllocError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownError {
  Leak { outstanding: usize },
}

pub type TeardownResult<T> = Result<T, TeardownError>;

pub fn check_align(align: usize) -> AllocResult<()> {
  if !align.is_power_of_two() {
    return Err(AllocError::InvalidAlignment);
  }
  Ok(())
}

/// Capability shared by every allocator in the workspace.
///
/// Pointers passed to `contains` and `is_allocated` may be arbitrary; they
/// are only compared, never dereferenced.
pub trait Allocator {
  fn alloc(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>>;

  fn free(&mut self, ptr: NonNull<u8>) -> AllocResult<()>;

  /// Merges whatever free space can be merged. Never called implicitly.
  fn collect(&mut self) {}

  fn contains(&self, ptr: *const u8) -> bool;

  fn is_allocated(&self, ptr: *const u8) -> bool;

  /// True when no allocation is live.
  fn is_empty(&self) -> bool;

  /// Largest `size` for which `alloc(size, align)` succeeds right now.
  fn largest_free_block(&self, align: usize) -> usize;

  fn for_each_free(&self, f: &mut dyn FnMut(Span));

  fn for_each_outstanding(&self, f: &mut dyn FnMut(Span));

  fn verify(&self) -> AllocResult<()> {
    Ok(())
  }

  fn show_free_blocks(&self) {
    self.for_each_free(&mut |span| log::info!("{span}"));
  }

  fn show_outstanding_allocations(&self) {
    self.for_each_outstanding(&mut |span| log::info!("{span}"));
  }

  fn create<T>(&mut self, value: T) -> AllocResult<NonNull<T>>
  where
    Self: Sized,
  {
    let size = core::mem::size_of::<T>().max(1);
    let ptr = self.alloc(size, core::mem::align_of::<T>())?.cast::<T>();
    unsafe { ptr.write(value) };
    Ok(ptr)
  }

  /// Drops the value in place and releases its storage.
  ///
  /// # Safety
  ///
  /// `ptr` must come from `create` on this allocator and must not be used
  /// afterwards.
  unsafe fn destroy_value<T>(&mut self, ptr: NonNull<T>) -> AllocResult<()>
  where
    Self: Sized,
  {
    if !self.is_allocated(ptr.as_ptr() as *const u8) {
      return Err(AllocError::NotAllocated);
    }
    unsafe { ptr.drop_in_place() };
    self.free(ptr.cast())
  }
}
