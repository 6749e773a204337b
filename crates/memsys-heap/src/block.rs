use getset::CopyGetters;
use memsys_list::{
  HasLink,
  Link,
};

/// Descriptor of one range of the arena, stored in the descriptor table.
///
/// `base` is an offset from the arena origin. A descriptor with `size == 0`
/// describes nothing and waits on the free chain to be reused.
#[repr(C)]
#[derive(Debug, Clone, Copy, CopyGetters)]
pub struct Block {
  #[getset(get_copy = "pub")]
  pub(crate) base: usize,
  #[getset(get_copy = "pub")]
  pub(crate) size: usize,
  link: Link,
}

impl Block {
  pub const fn sentinel() -> Self {
    Self {
      base: 0,
      size: 0,
      link: Link::new(),
    }
  }

  #[inline(always)]
  pub const fn is_sentinel(&self) -> bool {
    self.size == 0
  }

  #[inline(always)]
  pub const fn end(&self) -> usize {
    self.base + self.size
  }

  #[inline(always)]
  pub(crate) fn assign(&mut self, base: usize, size: usize) {
    self.base = base;
    self.size = size;
  }
}

impl HasLink for Block {
  fn link(&self) -> &Link {
    &self.link
  }

  fn link_mut(&mut self) -> &mut Link {
    &mut self.link
  }
}
