use core::{
  marker::PhantomData,
  ptr::NonNull,
};

use getset::CopyGetters;
use memsys_bitmap::{
  Bitmap,
  BitmapError,
};
use memsys_core::{
  alloc::{
    AllocError,
    AllocResult,
    Allocator,
    TeardownError,
    check_align,
  },
  config::{
    Config,
    Pattern,
  },
  span::{
    Span,
    SpanStatus,
  },
};
use memsys_sys::math::align_up;

#[derive(Debug, PartialEq)]
pub enum FixedError {
  InvalidBlockSize,
  Bitmap(BitmapError),
  Teardown(TeardownError),
}

pub type FixedResult<T> = Result<T, FixedError>;

/// Pool of equally sized blocks over a borrowed region.
///
/// Block `i` spans `[i * block_size, (i + 1) * block_size)`. A set bit in the
/// bitmap marks a free block. Bytes past the last whole block are unused.
#[derive(CopyGetters)]
pub struct FixedSizeAllocator<'mem> {
  memory: NonNull<u8>,
  #[getset(get_copy = "pub")]
  block_size: usize,
  #[getset(get_copy = "pub")]
  block_count: usize,
  bitmap: Bitmap,
  #[getset(get_copy = "pub")]
  config: Config,
  _marker: PhantomData<&'mem mut [u8]>,
}

unsafe impl Send for FixedSizeAllocator<'_> {}

impl<'mem> FixedSizeAllocator<'mem> {
  /// Builds a pool over `memory`; the bitmap is allocated from `backing`.
  pub fn create(
    memory: &'mem mut [u8],
    block_size: usize,
    backing: &mut dyn Allocator,
    config: Config,
  ) -> FixedResult<Self> {
    if block_size == 0 {
      return Err(FixedError::InvalidBlockSize);
    }

    let block_count = memory.len() / block_size;
    let bitmap = Bitmap::create(block_count, backing).map_err(FixedError::Bitmap)?;
    let memory = NonNull::from(&mut *memory).cast::<u8>();

    let pool = Self {
      memory,
      block_size,
      block_count,
      bitmap,
      config,
      _marker: PhantomData,
    };
    unsafe { config.stamp(memory, pool.span(), Pattern::Dead) };

    log::debug!(
      "fixed: {} blocks of {} bytes at {:p}",
      block_count,
      block_size,
      memory
    );
    Ok(pool)
  }

  /// Bytes covered by whole blocks.
  #[inline(always)]
  pub fn span(&self) -> usize {
    self.block_count * self.block_size
  }

  /// True when a request of `size` bytes could ever fit in one block.
  pub fn fits(&self, size: usize) -> bool {
    size
      .max(1)
      .checked_add(self.config.guard_band() * 2)
      .is_some_and(|need| need <= self.block_size)
  }

  pub fn outstanding(&self) -> usize {
    self.block_count - self.bitmap.count_set()
  }

  /// Returns the bitmap storage to `backing`. Live blocks are reported, not
  /// reclaimed.
  pub fn destroy(self, backing: &mut dyn Allocator) -> FixedResult<()> {
    let outstanding = self.outstanding();
    self.bitmap.destroy(backing).map_err(FixedError::Bitmap)?;

    if outstanding > 0 {
      log::error!("fixed: destroyed with {} live blocks", outstanding);
      return Err(FixedError::Teardown(TeardownError::Leak { outstanding }));
    }
    Ok(())
  }

  #[inline(always)]
  fn base(&self) -> usize {
    self.memory.as_ptr() as usize
  }

  #[inline(always)]
  fn block(&self, index: usize) -> NonNull<u8> {
    unsafe { self.memory.add(index * self.block_size) }
  }

  fn index_of(&self, ptr: *const u8) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.base())?;
    if offset >= self.span() {
      return None;
    }
    Some(offset / self.block_size)
  }

  fn block_is_free(&self, index: usize) -> bool {
    self.bitmap.is_set(index).unwrap_or(false)
  }

  /// User address inside block `index` for `size` bytes, if it fits.
  fn place(&self, index: usize, size: usize, align: usize) -> Option<usize> {
    let guard = self.config.guard_band();
    let block = self.block(index).as_ptr() as usize;
    let user = align_up(block.checked_add(guard)?, align)?;
    let end = user.checked_add(size)?.checked_add(guard)?;
    if end > block + self.block_size {
      return None;
    }
    Some(user)
  }

  fn stamp_live(&self, index: usize, user: usize, size: usize) {
    let guard = self.config.guard_band();
    let block = self.block(index);
    let lead = user - guard - block.as_ptr() as usize;
    let tail = lead + guard * 2 + size;
    unsafe {
      self.config.stamp(block, lead, Pattern::Align);
      self.config.stamp(block.add(lead), guard, Pattern::NoMansLand);
      self.config.stamp(block.add(lead + guard), size, Pattern::Clean);
      self
        .config
        .stamp(block.add(lead + guard + size), guard, Pattern::NoMansLand);
      self
        .config
        .stamp(block.add(tail), self.block_size - tail, Pattern::Align);
    }
  }

  /// First overwritten guard byte of live block `index`, locating both
  /// guards past the alignment fill around them.
  fn broken_guard(&self, index: usize) -> Option<usize> {
    let guard = self.config.guard_band();
    let block = self.block(index);
    let room = self.block_size.checked_sub(guard * 2)?;

    unsafe {
      let lead = self.config.leading(block, room, Pattern::Align);
      let body = lead + guard * 2;
      let pad = self
        .config
        .trailing(block.add(body), self.block_size - body, Pattern::Align);

      self
        .config
        .scan(block.add(lead), guard, Pattern::NoMansLand)
        .or_else(|| {
          self.config.scan(
            block.add(self.block_size - pad - guard),
            guard,
            Pattern::NoMansLand,
          )
        })
    }
  }

  fn walk(&self, free: bool, f: &mut dyn FnMut(Span)) {
    let status = if free {
      SpanStatus::Free
    } else {
      SpanStatus::Allocated
    };

    for index in 0..self.block_count {
      if self.block_is_free(index) == free {
        let start = self.block(index).as_ptr() as usize;
        f(Span::new(start, self.block_size, status));
      }
    }
  }
}

impl Allocator for FixedSizeAllocator<'_> {
  fn alloc(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
    check_align(align)?;

    let size = size.max(1);
    if !self.fits(size) {
      return Err(AllocError::OutOfMemory);
    }

    let index = self.bitmap.find_fs().ok_or(AllocError::OutOfMemory)?;
    let user = self
      .place(index, size, align)
      .ok_or(AllocError::OutOfMemory)?;
    self
      .bitmap
      .clear(index)
      .map_err(|_| AllocError::OutOfMemory)?;
    self.stamp_live(index, user, size);

    log::trace!("fixed: alloc block {} at {:#x}", index, user);
    NonNull::new(user as *mut u8).ok_or(AllocError::OutOfMemory)
  }

  fn free(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
    let Some(index) = self.index_of(ptr.as_ptr()) else {
      log::warn!("fixed: free of foreign pointer {:p}", ptr);
      return Err(AllocError::NotOwned);
    };

    if self.block_is_free(index) {
      log::warn!("fixed: double free of {:p} (block {})", ptr, index);
      return Err(AllocError::NotAllocated);
    }

    unsafe {
      self
        .config
        .stamp(self.block(index), self.block_size, Pattern::Dead)
    };
    self
      .bitmap
      .set(index)
      .map_err(|_| AllocError::NotAllocated)?;

    log::trace!("fixed: free block {} ({:p})", index, ptr);
    Ok(())
  }

  fn contains(&self, ptr: *const u8) -> bool {
    self.index_of(ptr).is_some()
  }

  fn is_allocated(&self, ptr: *const u8) -> bool {
    self
      .index_of(ptr)
      .is_some_and(|index| !self.block_is_free(index))
  }

  fn is_empty(&self) -> bool {
    self.bitmap.all_set()
  }

  fn largest_free_block(&self, align: usize) -> usize {
    if check_align(align).is_err() {
      return 0;
    }

    let guard = self.config.guard_band();
    let Some(index) = self.bitmap.find_fs() else {
      return 0;
    };
    let block = self.block(index).as_ptr() as usize;
    let Some(user) = block.checked_add(guard).and_then(|at| align_up(at, align)) else {
      return 0;
    };

    (block + self.block_size)
      .checked_sub(guard)
      .and_then(|high| high.checked_sub(user))
      .unwrap_or(0)
  }

  fn for_each_free(&self, f: &mut dyn FnMut(Span)) {
    self.walk(true, f);
  }

  fn for_each_outstanding(&self, f: &mut dyn FnMut(Span)) {
    self.walk(false, f);
  }

  fn verify(&self) -> AllocResult<()> {
    for index in 0..self.block_count {
      if !self.block_is_free(index) {
        if let Some(addr) = self.broken_guard(index) {
          log::error!("fixed: guard of block {} overwritten at {:#x}", index, addr);
          return Err(AllocError::Corrupted { addr });
        }
        continue;
      }
      let dead = unsafe {
        self
          .config
          .scan(self.block(index), self.block_size, Pattern::Dead)
      };
      if let Some(addr) = dead {
        log::error!("fixed: freed block {} written at {:#x}", index, addr);
        return Err(AllocError::Corrupted { addr });
      }
    }
    Ok(())
  }
}
