use core::ptr::NonNull;

use memsys_list::{
  NodeIndex,
  Nodes,
};

use crate::block::Block;

pub const DESCRIPTOR_SIZE: usize = core::mem::size_of::<Block>();

/// Descriptor storage growing upward from offset zero of the arena. Entries
/// are never moved, only appended or dropped from the top.
pub(crate) struct Table {
  base: NonNull<Block>,
  count: usize,
}

impl Table {
  pub const fn new(base: NonNull<Block>) -> Self {
    Self { base, count: 0 }
  }

  #[inline(always)]
  pub const fn count(&self) -> usize {
    self.count
  }

  /// First byte above the table.
  #[inline(always)]
  pub const fn top(&self) -> usize {
    self.count * DESCRIPTOR_SIZE
  }

  /// Appends a sentinel descriptor if the table stays at or below `limit`.
  pub fn carve(&mut self, limit: usize) -> Option<NodeIndex> {
    if self.count >= u32::MAX as usize {
      return None;
    }

    let top = self.top().checked_add(DESCRIPTOR_SIZE)?;
    if top > limit {
      return None;
    }

    let index = NodeIndex::new(self.count as u32);
    unsafe { self.base.as_ptr().add(self.count).write(Block::sentinel()) };
    self.count += 1;
    Some(index)
  }

  pub fn last(&self) -> Option<NodeIndex> {
    self
      .count
      .checked_sub(1)
      .map(|index| NodeIndex::new(index as u32))
  }

  pub fn release_last(&mut self) {
    debug_assert!(self.count > 0);
    self.count = self.count.saturating_sub(1);
  }
}

impl Nodes for Table {
  type Node = Block;

  #[inline(always)]
  fn node(&self, index: NodeIndex) -> &Block {
    debug_assert!(index.get() < self.count);
    unsafe { &*self.base.as_ptr().add(index.get()) }
  }

  #[inline(always)]
  fn node_mut(&mut self, index: NodeIndex) -> &mut Block {
    debug_assert!(index.get() < self.count);
    unsafe { &mut *self.base.as_ptr().add(index.get()) }
  }
}
