use core::{
  mem::MaybeUninit,
  ops::Range,
  ptr::NonNull,
};

use heapless::Vec;
use memsys_core::{
  alloc::{
    AllocError,
    AllocResult,
    Allocator,
    TeardownError,
    check_align,
  },
  span::Span,
};
use memsys_fixed::{
  FixedError,
  FixedSizeAllocator,
};
use memsys_heap::HeapAllocator;
use memsys_sys::{
  extent::{
    Extent,
    ExtentError,
  },
  math::align_up,
  prim::{
    PrimError,
    min_align,
    page_align,
  },
};

use crate::config::{
  DEFAULT_ALIGN,
  MAX_POOLS,
  ManagerConfig,
  PoolSpec,
};

#[derive(Debug)]
pub enum ManagerError {
  Extent(ExtentError),
  Prim(PrimError),
  Fixed(FixedError),
  Alloc(AllocError),
  TooManyPools,
  Leak { outstanding: usize },
}

pub type ManagerResult<T> = Result<T, ManagerError>;

type Pool = FixedSizeAllocator<'static>;

/// Routes requests between a set of block pools and a general heap, all
/// carved from one reservation.
///
/// ```text
/// | heap | pool 0 | pool 1 | ... |
/// ```
///
/// Pool structs and their bitmaps live inside the heap.
pub struct HeapManager {
  pools: Vec<NonNull<Pool>, MAX_POOLS>,
  heap: HeapAllocator<'static>,
  /// Live heap allocations owned by the pools themselves.
  bookkeeping: usize,
  torn_down: bool,
  // Declared last so it is unmapped after the heap has been dropped.
  extent: Option<Extent>,
}

unsafe impl Send for HeapManager {}

impl HeapManager {
  pub fn new(config: ManagerConfig) -> ManagerResult<Self> {
    let (regions, total) = Self::layout(&config)?;
    let extent = Extent::new(total).map_err(ManagerError::Extent)?;

    let heap_memory = unsafe { extent.carve(0..config.heap_size()) }.map_err(ManagerError::Extent)?;
    let heap = HeapAllocator::new(heap_memory, config.allocator());

    let mut memories: Vec<&'static mut [u8], MAX_POOLS> = Vec::new();
    for region in regions {
      let memory = unsafe { extent.carve(region) }.map_err(ManagerError::Extent)?;
      memories
        .push(memory)
        .map_err(|_| ManagerError::TooManyPools)?;
    }

    let mut manager = Self {
      pools: Vec::new(),
      heap,
      bookkeeping: 0,
      torn_down: false,
      extent: Some(extent),
    };

    for (spec, memory) in config.pools().iter().zip(memories) {
      manager.add_pool(spec, memory, &config)?;
    }

    log::debug!(
      "manager: {} bytes reserved, heap {} bytes, {} pools",
      total,
      config.heap_size(),
      manager.pools.len()
    );
    Ok(manager)
  }

  /// Offsets of every pool region and the page-aligned total.
  fn layout(config: &ManagerConfig) -> ManagerResult<(Vec<Range<usize>, MAX_POOLS>, usize)> {
    let mut regions = Vec::new();
    let mut offset = config.heap_size();

    for spec in config.pools() {
      let start = align_up(offset, min_align()).ok_or(ManagerError::Prim(PrimError::Overflow))?;
      let end = spec
        .bytes()
        .and_then(|bytes| start.checked_add(bytes))
        .ok_or(ManagerError::Prim(PrimError::Overflow))?;
      regions
        .push(start..end)
        .map_err(|_| ManagerError::TooManyPools)?;
      offset = end;
    }

    let total = page_align(offset).map_err(ManagerError::Prim)?;
    Ok((regions, total))
  }

  fn add_pool(
    &mut self,
    spec: &PoolSpec,
    memory: &'static mut [u8],
    config: &ManagerConfig,
  ) -> ManagerResult<()> {
    if self.pools.is_full() {
      return Err(ManagerError::TooManyPools);
    }

    let before = self.heap.outstanding();
    let slot = self
      .heap
      .create(MaybeUninit::<Pool>::uninit())
      .map_err(ManagerError::Alloc)?;
    let pool = match FixedSizeAllocator::create(
      memory,
      spec.block_size(),
      &mut self.heap,
      config.allocator(),
    ) {
      Ok(pool) => pool,
      Err(err) => {
        let _ = unsafe { self.heap.destroy_value(slot) };
        return Err(ManagerError::Fixed(err));
      }
    };

    let slot = slot.cast::<Pool>();
    unsafe { slot.write(pool) };
    self.bookkeeping += self.heap.outstanding() - before;
    if self.pools.push(slot).is_err() {
      return Err(ManagerError::TooManyPools);
    }
    Ok(())
  }

  #[inline(always)]
  fn pool(&self, index: usize) -> &Pool {
    unsafe { self.pools[index].as_ref() }
  }

  #[inline(always)]
  fn pool_mut(&mut self, index: usize) -> &mut Pool {
    unsafe { self.pools[index].as_mut() }
  }

  fn owner(&self, ptr: *const u8) -> Option<usize> {
    (0..self.pools.len()).find(|index| self.pool(*index).contains(ptr))
  }

  pub fn heap(&self) -> &HeapAllocator<'static> {
    &self.heap
  }

  pub fn pools(&self) -> impl Iterator<Item = &FixedSizeAllocator<'static>> + '_ {
    (0..self.pools.len()).map(|index| self.pool(index))
  }

  pub fn malloc(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
    self.malloc_aligned(size, DEFAULT_ALIGN)
  }

  /// Tries the first pool whose blocks can hold `size`, then the heap.
  pub fn malloc_aligned(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
    check_align(align)?;

    let candidate = (0..self.pools.len()).find(|index| self.pool(*index).fits(size));
    if let Some(index) = candidate {
      match self.pool_mut(index).alloc(size, align) {
        Ok(ptr) => return Ok(ptr),
        Err(err) => log::trace!("manager: pool {} refused {} bytes: {:?}", index, size, err),
      }
    }

    self.heap.alloc(size, align)
  }

  /// Heap allocations holding the pools' own state.
  pub fn bookkeeping(&self) -> usize {
    self.bookkeeping
  }

  /// Live allocations made through the manager, excluding pool bookkeeping.
  pub fn outstanding(&self) -> usize {
    let pooled: usize = self.pools().map(|pool| pool.outstanding()).sum();
    pooled + self.heap.outstanding().saturating_sub(self.bookkeeping)
  }

  /// Tears everything down. With live allocations the reservation is left
  /// mapped and `ManagerError::Leak` is returned.
  pub fn destroy(mut self) -> ManagerResult<()> {
    self.teardown()
  }

  fn teardown(&mut self) -> ManagerResult<()> {
    if self.torn_down {
      return Ok(());
    }
    self.torn_down = true;

    let mut outstanding = 0;
    while let Some(slot) = self.pools.pop() {
      let before = self.heap.outstanding();
      let pool = unsafe { slot.read() };
      match pool.destroy(&mut self.heap) {
        Ok(()) => {}
        Err(FixedError::Teardown(TeardownError::Leak { outstanding: live })) => outstanding += live,
        Err(err) => log::error!("manager: pool teardown failed: {:?}", err),
      }

      let slot = slot.cast::<MaybeUninit<Pool>>();
      if let Err(err) = unsafe { self.heap.destroy_value(slot) } {
        log::error!("manager: pool slot release failed: {:?}", err);
      }
      let released = before.saturating_sub(self.heap.outstanding());
      self.bookkeeping = self.bookkeeping.saturating_sub(released);
    }

    outstanding += self.heap.outstanding();
    if outstanding > 0 {
      if let Some(extent) = self.extent.take() {
        let leaked = extent.leak();
        log::error!(
          "manager: {} live allocations at teardown, leaving {} bytes at {:p} mapped",
          outstanding,
          leaked.len(),
          leaked.as_ptr()
        );
      }
      return Err(ManagerError::Leak { outstanding });
    }

    log::debug!("manager: torn down");
    Ok(())
  }
}

impl Allocator for HeapManager {
  fn alloc(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
    self.malloc_aligned(size, align)
  }

  fn free(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
    match self.owner(ptr.as_ptr()) {
      Some(index) => self.pool_mut(index).free(ptr),
      None => self.heap.free(ptr),
    }
  }

  fn collect(&mut self) {
    self.heap.collect();
  }

  fn contains(&self, ptr: *const u8) -> bool {
    self.owner(ptr).is_some() || self.heap.contains(ptr)
  }

  fn is_allocated(&self, ptr: *const u8) -> bool {
    match self.owner(ptr) {
      Some(index) => self.pool(index).is_allocated(ptr),
      None => self.heap.is_allocated(ptr),
    }
  }

  fn is_empty(&self) -> bool {
    self.outstanding() == 0
  }

  fn largest_free_block(&self, align: usize) -> usize {
    self
      .pools()
      .map(|pool| pool.largest_free_block(align))
      .fold(self.heap.largest_free_block(align), usize::max)
  }

  fn for_each_free(&self, f: &mut dyn FnMut(Span)) {
    self.heap.for_each_free(f);
    for pool in self.pools() {
      pool.for_each_free(f);
    }
  }

  fn for_each_outstanding(&self, f: &mut dyn FnMut(Span)) {
    self.heap.for_each_outstanding(f);
    for pool in self.pools() {
      pool.for_each_outstanding(f);
    }
  }

  fn verify(&self) -> AllocResult<()> {
    self.heap.verify()?;
    self.pools().try_for_each(|pool| pool.verify())
  }
}

impl Drop for HeapManager {
  fn drop(&mut self) {
    let _ = self.teardown();
  }
}
