use core::{
  marker::PhantomData,
  ptr::NonNull,
};

use memsys_core::{
  alloc::{
    AllocError,
    AllocResult,
    Allocator,
    TeardownError,
    TeardownResult,
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
use memsys_list::{
  List,
  NodeIndex,
  Nodes,
};
use memsys_sys::math::{
  align_down,
  align_offset,
  align_up,
};

use crate::{
  block::Block,
  table::{
    DESCRIPTOR_SIZE,
    Table,
  },
};

/// First-fit allocator over a single borrowed arena.
///
/// Layout, by offset from the origin:
///
/// ```text
/// 0          top            end                       len
/// | table -> |   untouched   | <- user blocks / free    |
/// ```
///
/// Descriptors are carved upward from offset zero, user blocks downward from
/// the end. Every byte in `[end, len)` belongs to exactly one block, either
/// on the outstanding chain (sorted by address) or on the free chain (real
/// ranges sorted by address, spare descriptors interleaved).
pub struct HeapAllocator<'mem> {
  origin: NonNull<u8>,
  len: usize,
  table: Table,
  end: usize,
  free: List,
  outstanding: List,
  sentinels: usize,
  config: Config,
  _marker: PhantomData<&'mem mut [u8]>,
}

unsafe impl Send for HeapAllocator<'_> {}

impl<'mem> HeapAllocator<'mem> {
  pub fn new(memory: &'mem mut [u8], config: Config) -> Self {
    let raw = memory.len();
    let start = NonNull::from(&mut *memory).cast::<u8>();
    let skew = align_offset(start.as_ptr() as usize, core::mem::align_of::<Block>())
      .unwrap_or(raw)
      .min(raw);
    let origin = unsafe { start.add(skew) };
    let len = raw - skew;

    log::debug!(
      "heap: {} bytes at {:p}, guard {} stamping {}",
      len,
      origin,
      config.guard_band(),
      config.stamping()
    );

    Self {
      origin,
      len,
      table: Table::new(origin.cast()),
      end: len,
      free: List::new(),
      outstanding: List::new(),
      sentinels: 0,
      config,
      _marker: PhantomData,
    }
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline(always)]
  pub fn config(&self) -> Config {
    self.config
  }

  /// Descriptors currently carved out of the arena.
  #[inline(always)]
  pub fn descriptors(&self) -> usize {
    self.table.count()
  }

  /// Bytes between the descriptor table and the lowest user block.
  #[inline(always)]
  pub fn untouched(&self) -> usize {
    self.end - self.table.top()
  }

  pub fn outstanding(&self) -> usize {
    self.outstanding.len(&self.table)
  }

  /// Tears the heap down, refusing when allocations are still live.
  pub fn destroy(self) -> TeardownResult<()> {
    let outstanding = self.outstanding();
    core::mem::forget(self);

    if outstanding > 0 {
      log::error!("heap: destroyed with {} live allocations", outstanding);
      return Err(TeardownError::Leak { outstanding });
    }
    Ok(())
  }

  #[inline(always)]
  fn origin_addr(&self) -> usize {
    self.origin.as_ptr() as usize
  }

  #[inline(always)]
  fn at(&self, offset: usize) -> NonNull<u8> {
    unsafe { self.origin.add(offset) }
  }

  fn align_down_at(&self, offset: usize, align: usize) -> Option<usize> {
    align_down(self.origin_addr() + offset, align)?.checked_sub(self.origin_addr())
  }

  fn align_up_at(&self, offset: usize, align: usize) -> Option<usize> {
    align_up(self.origin_addr().checked_add(offset)?, align)?.checked_sub(self.origin_addr())
  }

  fn owned_offset(&self, ptr: *const u8) -> Option<usize> {
    (ptr as usize)
      .checked_sub(self.origin_addr())
      .filter(|offset| *offset >= self.table.top() && *offset < self.len)
  }

  fn find_outstanding(&self, user: usize) -> Option<(Option<NodeIndex>, NodeIndex)> {
    let guard = self.config.guard_band();
    self
      .outstanding
      .find(&self.table, |block| block.base() + guard == user)
  }

  /// Next real range on the free chain after `after`, with its predecessor.
  fn next_range(&self, after: Option<NodeIndex>) -> Option<(Option<NodeIndex>, NodeIndex)> {
    let mut prev = after;
    let mut cursor = match after {
      Some(index) => List::next_of(&self.table, index),
      None => self.free.head(),
    };

    while let Some(index) = cursor {
      if !self.table.node(index).is_sentinel() {
        return Some((prev, index));
      }
      prev = Some(index);
      cursor = List::next_of(&self.table, index);
    }
    None
  }

  fn descriptor_available(&self) -> bool {
    self.sentinels > 0 || self.table.top() + DESCRIPTOR_SIZE <= self.end
  }

  fn acquire_descriptor(&mut self) -> Option<NodeIndex> {
    if self.sentinels > 0 {
      let index = self.free.remove_first(&mut self.table, Block::is_sentinel)?;
      self.sentinels -= 1;
      return Some(index);
    }
    self.table.carve(self.end)
  }

  fn retire(&mut self, index: NodeIndex) {
    self.table.node_mut(index).assign(0, 0);
    self.free.push_front(&mut self.table, index);
    self.sentinels += 1;
  }

  /// User offset for `size` bytes placed as high as possible in `[base, end)`.
  fn fit(&self, base: usize, end: usize, size: usize, align: usize) -> Option<usize> {
    let guard = self.config.guard_band();
    let high = end.checked_sub(size.checked_add(guard)?)?;
    let user = self.align_down_at(high, align)?;
    if user < base.checked_add(guard)? {
      return None;
    }
    Some(user)
  }

  fn first_fit(&mut self, size: usize, align: usize, need: usize) -> Option<(NodeIndex, usize)> {
    let guard = self.config.guard_band();
    let can_split = self.descriptor_available();

    let mut found = None;
    for (prev, index) in self.free.iter(&self.table) {
      let block = self.table.node(index);
      if block.is_sentinel() || block.size() < need {
        continue;
      }
      let Some(user) = self.fit(block.base(), block.end(), size, align) else {
        continue;
      };
      let whole = user - guard == block.base();
      if whole || can_split {
        found = Some((prev, index, user, whole));
        break;
      }
    }

    let (prev, index, user, whole) = found?;
    if whole {
      self.free.unlink(&mut self.table, prev, index);
      return Some((index, user));
    }

    let split = self.acquire_descriptor()?;
    let start = user - guard;
    let block = self.table.node_mut(index);
    let end = block.end();
    block.size = start - block.base();
    self.table.node_mut(split).assign(start, end - start);
    Some((split, user))
  }

  fn carve_top(&mut self, size: usize, align: usize) -> AllocResult<(NodeIndex, usize)> {
    let guard = self.config.guard_band();
    let cost = if self.sentinels > 0 { 0 } else { DESCRIPTOR_SIZE };
    let top = self.table.top() + cost;
    if top > self.end {
      return Err(AllocError::OutOfDescriptors);
    }

    let floor = self
      .config
      .reserve_descriptors()
      .checked_mul(DESCRIPTOR_SIZE)
      .and_then(|reserve| reserve.checked_add(top))
      .and_then(|floor| floor.checked_add(guard))
      .ok_or(AllocError::OutOfMemory)?;
    let user = self
      .fit(floor - guard, self.end, size, align)
      .ok_or(AllocError::OutOfMemory)?;

    let index = self
      .acquire_descriptor()
      .ok_or(AllocError::OutOfDescriptors)?;
    let start = user - guard;
    let span = self.end - start;
    self.table.node_mut(index).assign(start, span);
    self.end = start;
    Ok((index, user))
  }

  fn insert_outstanding(&mut self, index: NodeIndex) {
    let base = self.table.node(index).base();
    let mut at = None;
    for (_, current) in self.outstanding.iter(&self.table) {
      if self.table.node(current).base() > base {
        break;
      }
      at = Some(current);
    }
    self.outstanding.insert_after(&mut self.table, at, index);
  }

  fn commit(&mut self, index: NodeIndex, user: usize, size: usize) {
    self.insert_outstanding(index);

    let guard = self.config.guard_band();
    let block = *self.table.node(index);
    let tail = user + size + guard;
    unsafe {
      self.config.stamp(self.at(block.base()), guard, Pattern::NoMansLand);
      self.config.stamp(self.at(user), size, Pattern::Clean);
      self.config.stamp(self.at(user + size), guard, Pattern::NoMansLand);
      self.config.stamp(self.at(tail), block.end() - tail, Pattern::Align);
    }
  }

  /// Puts a block back on the free chain in address order, merging it with
  /// the ranges directly below and above.
  fn release(&mut self, index: NodeIndex) {
    let block = *self.table.node(index);

    let mut below = None;
    let mut above = None;
    for (prev, current) in self.free.iter(&self.table) {
      let node = self.table.node(current);
      if node.is_sentinel() {
        continue;
      }
      if node.base() < block.base() {
        below = Some(current);
      } else {
        above = Some((prev, current));
        break;
      }
    }

    let merge_below = below.filter(|low| self.table.node(*low).end() == block.base());
    let merge_above = above.filter(|(_, high)| self.table.node(*high).base() == block.end());

    match (merge_below, merge_above) {
      (Some(low), Some((prev, high))) => {
        let end = self.table.node(high).end();
        let low_block = self.table.node_mut(low);
        low_block.size = end - low_block.base();
        self.free.unlink(&mut self.table, prev, high);
        self.retire(high);
        self.retire(index);
      }
      (Some(low), None) => {
        self.table.node_mut(low).size += block.size();
        self.retire(index);
      }
      (None, Some((_, high))) => {
        let high_block = self.table.node_mut(high);
        let end = high_block.end();
        high_block.assign(block.base(), end - block.base());
        self.retire(index);
      }
      (None, None) => self.free.insert_after(&mut self.table, below, index),
    }
  }

  fn sweep(&mut self) -> usize {
    let Some((_, mut current)) = self.next_range(None) else {
      return 0;
    };

    let mut spare = List::new();
    let mut merged = 0;
    while let Some((prev, next)) = self.next_range(Some(current)) {
      let next_block = *self.table.node(next);
      if self.table.node(current).end() != next_block.base() {
        current = next;
        continue;
      }

      self.table.node_mut(current).size += next_block.size();
      self.free.unlink(&mut self.table, prev, next);
      self.table.node_mut(next).assign(0, 0);
      spare.push_front(&mut self.table, next);
      merged += 1;
    }

    self.free.splice_front(&mut self.table, &mut spare);
    self.sentinels += merged;
    merged
  }

  fn fold(&mut self) -> usize {
    let Some((prev, lowest)) = self.next_range(None) else {
      return 0;
    };

    let block = *self.table.node(lowest);
    if block.base() != self.end {
      return 0;
    }

    self.free.unlink(&mut self.table, prev, lowest);
    self.end = block.end();
    self.retire(lowest);
    block.size()
  }

  fn shrink_table(&mut self) -> usize {
    let mut released = 0;
    while let Some(last) = self.table.last() {
      if !self.table.node(last).is_sentinel() {
        break;
      }
      let Some((prev, _)) = self
        .free
        .iter(&self.table)
        .find(|(_, index)| *index == last)
      else {
        break;
      };

      self.free.unlink(&mut self.table, prev, last);
      self.table.release_last();
      self.sentinels -= 1;
      unsafe {
        self
          .config
          .stamp(self.at(self.table.top()), DESCRIPTOR_SIZE, Pattern::Dead)
      };
      released += 1;
    }
    released
  }

  fn untouched_capacity(&self, align: usize) -> Option<usize> {
    let guard = self.config.guard_band();
    let cost = if self.sentinels > 0 { 0 } else { DESCRIPTOR_SIZE };
    let top = self.table.top() + cost;
    if top > self.end {
      return None;
    }

    let floor = self
      .config
      .reserve_descriptors()
      .checked_mul(DESCRIPTOR_SIZE)?
      .checked_add(top)?
      .checked_add(guard)?;
    let user = self.align_up_at(floor, align)?;
    self.end.checked_sub(guard)?.checked_sub(user)
  }
}

impl Allocator for HeapAllocator<'_> {
  fn alloc(&mut self, size: usize, align: usize) -> AllocResult<NonNull<u8>> {
    check_align(align)?;

    let size = size.max(1);
    let need = self
      .config
      .guard_band()
      .checked_mul(2)
      .and_then(|guards| guards.checked_add(size))
      .ok_or(AllocError::OutOfMemory)?;

    let (index, user) = match self.first_fit(size, align, need) {
      Some(found) => found,
      None => self.carve_top(size, align)?,
    };
    self.commit(index, user, size);

    let ptr = self.at(user);
    log::trace!("heap: alloc {} bytes align {} at {:p}", size, align, ptr);
    Ok(ptr)
  }

  fn free(&mut self, ptr: NonNull<u8>) -> AllocResult<()> {
    let Some(user) = self.owned_offset(ptr.as_ptr()) else {
      log::warn!("heap: free of foreign pointer {:p}", ptr);
      return Err(AllocError::NotOwned);
    };

    let Some((prev, index)) = self.find_outstanding(user) else {
      log::warn!("heap: free of {:p} which is not a live allocation", ptr);
      return Err(AllocError::NotAllocated);
    };

    self.outstanding.unlink(&mut self.table, prev, index);
    let block = *self.table.node(index);
    unsafe {
      self
        .config
        .stamp(self.at(block.base()), block.size(), Pattern::Dead)
    };
    self.release(index);

    log::trace!("heap: free {:p} ({} byte block)", ptr, block.size());
    Ok(())
  }

  fn collect(&mut self) {
    let merged = self.sweep();
    let folded = self.fold();
    let released = self.shrink_table();
    log::debug!(
      "heap: collect merged {} ranges, folded {} bytes, released {} descriptors",
      merged,
      folded,
      released
    );
  }

  fn contains(&self, ptr: *const u8) -> bool {
    self.owned_offset(ptr).is_some()
  }

  fn is_allocated(&self, ptr: *const u8) -> bool {
    self
      .owned_offset(ptr)
      .and_then(|user| self.find_outstanding(user))
      .is_some()
  }

  fn is_empty(&self) -> bool {
    self.outstanding.is_empty()
  }

  fn largest_free_block(&self, align: usize) -> usize {
    if check_align(align).is_err() {
      return 0;
    }

    let guard = self.config.guard_band();
    let can_split = self.descriptor_available();
    let mut best = self.untouched_capacity(align).unwrap_or(0);

    for (_, index) in self.free.iter(&self.table) {
      let block = self.table.node(index);
      if block.is_sentinel() {
        continue;
      }
      let Some(user) = self.align_up_at(block.base() + guard, align) else {
        continue;
      };
      if user - guard != block.base() && !can_split {
        continue;
      }
      if let Some(fit) = block
        .end()
        .checked_sub(guard)
        .and_then(|high| high.checked_sub(user))
      {
        best = best.max(fit);
      }
    }
    best
  }

  fn for_each_free(&self, f: &mut dyn FnMut(Span)) {
    let top = self.table.top();
    if self.end > top {
      f(Span::new(
        self.origin_addr() + top,
        self.end - top,
        SpanStatus::Untouched,
      ));
    }

    for (_, index) in self.free.iter(&self.table) {
      let block = self.table.node(index);
      if !block.is_sentinel() {
        f(Span::new(
          self.origin_addr() + block.base(),
          block.size(),
          SpanStatus::Free,
        ));
      }
    }
  }

  fn for_each_outstanding(&self, f: &mut dyn FnMut(Span)) {
    for (_, index) in self.outstanding.iter(&self.table) {
      let block = self.table.node(index);
      f(Span::new(
        self.origin_addr() + block.base(),
        block.size(),
        SpanStatus::Allocated,
      ));
    }
  }

  fn verify(&self) -> AllocResult<()> {
    let guard = self.config.guard_band();

    for (_, index) in self.outstanding.iter(&self.table) {
      let block = self.table.node(index);
      let body = block.base() + guard * 2;
      let pad = unsafe {
        self
          .config
          .trailing(self.at(body), block.end() - body, Pattern::Align)
      };

      for at in [block.base(), block.end() - pad - guard] {
        let broken = unsafe { self.config.scan(self.at(at), guard, Pattern::NoMansLand) };
        if let Some(addr) = broken {
          log::error!("heap: guard overwritten at {:#x}", addr);
          return Err(AllocError::Corrupted { addr });
        }
      }
    }

    for (_, index) in self.free.iter(&self.table) {
      let block = self.table.node(index);
      let dead = unsafe {
        self
          .config
          .scan(self.at(block.base()), block.size(), Pattern::Dead)
      };
      if let Some(addr) = dead {
        log::error!("heap: freed memory written at {:#x}", addr);
        return Err(AllocError::Corrupted { addr });
      }
    }

    Ok(())
  }
}

impl Drop for HeapAllocator<'_> {
  fn drop(&mut self) {
    if !self.outstanding.is_empty() {
      log::error!(
        "heap: dropped with {} live allocations",
        self.outstanding.len(&self.table)
      );
    }
  }
}
