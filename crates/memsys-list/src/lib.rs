#![cfg_attr(not(test), no_std)]

//! Singly linked chains threaded through a table of nodes.
//!
//! Links are indices rather than pointers, so a chain stays valid when the
//! table lives inside an arena that is addressed by offsets. The list only
//! owns its head; every operation borrows the table that holds the nodes.

use getset::{
  CopyGetters,
  Setters,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
  pub const fn new(index: u32) -> Self {
    Self(index)
  }

  #[inline(always)]
  pub const fn get(self) -> usize {
    self.0 as usize
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, CopyGetters, Setters)]
pub struct Link {
  #[getset(get_copy = "pub", set = "pub")]
  next: Option<NodeIndex>,
}

impl Link {
  pub const fn new() -> Self {
    Self { next: None }
  }
}

pub trait HasLink {
  fn link(&self) -> &Link;
  fn link_mut(&mut self) -> &mut Link;
}

pub trait Nodes {
  type Node: HasLink;

  fn node(&self, index: NodeIndex) -> &Self::Node;
  fn node_mut(&mut self, index: NodeIndex) -> &mut Self::Node;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct List {
  head: Option<NodeIndex>,
}

impl List {
  pub const fn new() -> Self {
    Self { head: None }
  }

  #[inline(always)]
  pub const fn head(&self) -> Option<NodeIndex> {
    self.head
  }

  #[inline(always)]
  pub const fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  #[inline(always)]
  pub fn next_of<N>(nodes: &N, index: NodeIndex) -> Option<NodeIndex>
  where
    N: Nodes + ?Sized,
  {
    nodes.node(index).link().next()
  }

  pub fn push_front<N>(&mut self, nodes: &mut N, item: NodeIndex)
  where
    N: Nodes + ?Sized,
  {
    nodes.node_mut(item).link_mut().set_next(self.head);
    self.head = Some(item);
  }

  pub fn pop_front<N>(&mut self, nodes: &mut N) -> Option<NodeIndex>
  where
    N: Nodes + ?Sized,
  {
    let item = self.head?;
    self.head = Self::next_of(&*nodes, item);
    nodes.node_mut(item).link_mut().set_next(None);
    Some(item)
  }

  /// Links `item` behind `at`, or at the front when `at` is `None`.
  pub fn insert_after<N>(&mut self, nodes: &mut N, at: Option<NodeIndex>, item: NodeIndex)
  where
    N: Nodes + ?Sized,
  {
    match at {
      None => self.push_front(nodes, item),
      Some(at) => {
        let next = Self::next_of(&*nodes, at);
        nodes.node_mut(item).link_mut().set_next(next);
        nodes.node_mut(at).link_mut().set_next(Some(item));
      }
    }
  }

  /// Unlinks `item`, whose predecessor is `prev` (`None` for the head).
  pub fn unlink<N>(&mut self, nodes: &mut N, prev: Option<NodeIndex>, item: NodeIndex)
  where
    N: Nodes + ?Sized,
  {
    let next = Self::next_of(&*nodes, item);
    match prev {
      None => {
        debug_assert_eq!(self.head, Some(item));
        self.head = next;
      }
      Some(prev) => {
        debug_assert_eq!(Self::next_of(&*nodes, prev), Some(item));
        nodes.node_mut(prev).link_mut().set_next(next);
      }
    }
    nodes.node_mut(item).link_mut().set_next(None);
  }

  /// Walks the chain yielding `(predecessor, index)` pairs.
  pub fn iter<'n, N>(&self, nodes: &'n N) -> ListIter<'n, N>
  where
    N: Nodes + ?Sized,
  {
    ListIter {
      nodes,
      prev: None,
      next: self.head,
    }
  }

  pub fn find<N, F>(&self, nodes: &N, mut pred: F) -> Option<(Option<NodeIndex>, NodeIndex)>
  where
    N: Nodes + ?Sized,
    F: FnMut(&N::Node) -> bool,
  {
    self.iter(nodes).find(|(_, index)| pred(nodes.node(*index)))
  }

  pub fn remove_first<N, F>(&mut self, nodes: &mut N, pred: F) -> Option<NodeIndex>
  where
    N: Nodes + ?Sized,
    F: FnMut(&N::Node) -> bool,
  {
    let (prev, item) = self.find(&*nodes, pred)?;
    self.unlink(nodes, prev, item);
    Some(item)
  }

  /// Moves every node of `other` to the front of `self`, keeping its order.
  pub fn splice_front<N>(&mut self, nodes: &mut N, other: &mut List)
  where
    N: Nodes + ?Sized,
  {
    let Some(first) = other.head.take() else {
      return;
    };

    let mut tail = first;
    while let Some(next) = Self::next_of(&*nodes, tail) {
      tail = next;
    }

    nodes.node_mut(tail).link_mut().set_next(self.head);
    self.head = Some(first);
  }

  pub fn len<N>(&self, nodes: &N) -> usize
  where
    N: Nodes + ?Sized,
  {
    self.iter(nodes).count()
  }
}

pub struct ListIter<'n, N>
where
  N: Nodes + ?Sized,
{
  nodes: &'n N,
  prev: Option<NodeIndex>,
  next: Option<NodeIndex>,
}

impl<N> Iterator for ListIter<'_, N>
where
  N: Nodes + ?Sized,
{
  type Item = (Option<NodeIndex>, NodeIndex);

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.next?;
    let prev = self.prev;
    self.next = List::next_of(self.nodes, current);
    self.prev = Some(current);
    Some((prev, current))
  }
}
