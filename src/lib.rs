#![cfg_attr(not(test), no_std)]

use core::{
  alloc::{
    GlobalAlloc,
    Layout,
  },
  ptr::{
    self,
    NonNull,
  },
};

use memsys_alloc::{
  HeapManager,
  ManagerConfig,
  ManagerResult,
};
use memsys_core::alloc::Allocator;
use spin::Mutex;

pub mod prelude {
  pub use memsys_alloc::{
    HeapManager,
    ManagerConfig,
    ManagerError,
    ManagerResult,
    PoolSpec,
  };
  pub use memsys_core::prelude::*;
  pub use memsys_sys::prelude::*;

  pub use super::MemSys;
}

/// Process-wide front end over a lazily built `HeapManager`.
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: MemSys = MemSys::new();
/// ```
///
/// Every call takes one spin lock. The manager is created on first use from
/// `config` and lives until `teardown`.
pub struct MemSys {
  manager: Mutex<Option<HeapManager>>,
  config: fn() -> ManagerConfig,
}

impl MemSys {
  pub const fn new() -> Self {
    Self::with(ManagerConfig::default)
  }

  pub const fn with(config: fn() -> ManagerConfig) -> Self {
    Self {
      manager: Mutex::new(None),
      config,
    }
  }

  /// Runs `f` against the manager, building it first if needed. Returns
  /// `None` when the manager cannot be built.
  pub fn with_manager<R>(&self, f: impl FnOnce(&mut HeapManager) -> R) -> Option<R> {
    let mut guard = self.manager.lock();
    if guard.is_none() {
      match HeapManager::new((self.config)()) {
        Ok(manager) => *guard = Some(manager),
        Err(err) => {
          log::error!("memsys: manager init failed: {:?}", err);
          return None;
        }
      }
    }
    guard.as_mut().map(f)
  }

  pub fn is_initialized(&self) -> bool {
    self.manager.lock().is_some()
  }

  pub fn outstanding(&self) -> usize {
    self
      .manager
      .lock()
      .as_ref()
      .map_or(0, |manager| manager.outstanding())
  }

  pub fn collect(&self) {
    if let Some(manager) = self.manager.lock().as_mut() {
      manager.collect();
    }
  }

  pub fn show_free_blocks(&self) {
    if let Some(manager) = self.manager.lock().as_ref() {
      manager.show_free_blocks();
    }
  }

  pub fn show_outstanding_allocations(&self) {
    if let Some(manager) = self.manager.lock().as_ref() {
      manager.show_outstanding_allocations();
    }
  }

  /// Destroys the manager. A later allocation builds a fresh one.
  pub fn teardown(&self) -> ManagerResult<()> {
    match self.manager.lock().take() {
      Some(manager) => manager.destroy(),
      None => Ok(()),
    }
  }
}

impl Default for MemSys {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl GlobalAlloc for MemSys {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    let result = self.with_manager(|manager| {
      match manager.malloc_aligned(layout.size(), layout.align()) {
        Ok(ptr) => Ok(ptr),
        Err(_) => {
          manager.collect();
          manager.malloc_aligned(layout.size(), layout.align())
        }
      }
    });

    match result {
      Some(Ok(ptr)) => ptr.as_ptr(),
      _ => ptr::null_mut(),
    }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
    _ = layout;
    let Some(ptr) = NonNull::new(ptr) else {
      return;
    };

    if let Some(manager) = self.manager.lock().as_mut() {
      if let Err(err) = manager.free(ptr) {
        log::warn!("memsys: dealloc of {:p} failed: {:?}", ptr, err);
      }
    }
  }
}
