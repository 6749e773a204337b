#[cfg(any(target_os = "linux", target_os = "macos"))]
use crate::unix::UNIX_SYSTEM;

#[derive(Debug, PartialEq)]
pub enum SysError {
  Unsupported,
  OutOfMemory,
  InvalidArgument,
}

pub type SysResult<T> = Result<T, SysError>;

/// Source of the arena memory. The allocators never call it themselves; the
/// router reserves one span through it and carves everything from that.
///
/// # Safety
///
/// Implementors must ensure that:
/// - `alloc` returns valid, page-aligned memory of exactly `size` bytes
/// - `dealloc` only operates on memory obtained from `alloc`
/// - memory is not accessed after `dealloc` is called
pub unsafe trait System
where
  Self: Send + Sync,
{
  /// Maps `size` readable and writable bytes.
  ///
  /// # Safety
  ///
  /// `size` must be page-aligned. The memory must be released with `dealloc`
  /// on the same system.
  unsafe fn alloc<'mem>(&self, size: usize) -> SysResult<&'mem mut [u8]> {
    _ = size;
    Err(SysError::Unsupported)
  }

  /// Releases a reservation.
  ///
  /// # Safety
  ///
  /// `slice` must come from `alloc` on this system, still be mapped, and not
  /// be accessed afterwards.
  unsafe fn dealloc(&self, slice: &[u8]) -> SysResult<()> {
    _ = slice;
    Err(SysError::Unsupported)
  }
}

pub struct UnsupportedSystem {}
unsafe impl System for UnsupportedSystem {}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub static GLOBAL_SYSTEM: &dyn System = &UNIX_SYSTEM;

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub static GLOBAL_SYSTEM: &dyn System = &UnsupportedSystem {};
