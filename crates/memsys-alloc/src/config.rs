use getset::{
  CopyGetters,
  Getters,
};
use heapless::Vec;
use memsys_core::config::Config;

pub const MAX_POOLS: usize = 8;
pub const HEAP_SIZE: usize = 1 << 20;
/// Alignment used by `HeapManager::malloc`.
pub const DEFAULT_ALIGN: usize = 4;

pub const DEFAULT_POOLS: [PoolSpec; 3] = [
  PoolSpec::new(64, 16384),
  PoolSpec::new(128, 8192),
  PoolSpec::new(256, 4096),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct PoolSpec {
  block_size: usize,
  block_count: usize,
}

impl PoolSpec {
  pub const fn new(block_size: usize, block_count: usize) -> Self {
    Self {
      block_size,
      block_count,
    }
  }

  pub const fn bytes(&self) -> Option<usize> {
    self.block_size.checked_mul(self.block_count)
  }
}

/// Shape of the arena reserved by `HeapManager::new`.
#[derive(Debug, Clone, CopyGetters, Getters)]
pub struct ManagerConfig {
  #[getset(get_copy = "pub")]
  heap_size: usize,
  #[getset(get = "pub")]
  pools: Vec<PoolSpec, MAX_POOLS>,
  #[getset(get_copy = "pub")]
  allocator: Config,
}

impl ManagerConfig {
  /// A heap of `heap_size` bytes and no pools.
  pub fn new(heap_size: usize, allocator: Config) -> Self {
    Self {
      heap_size,
      pools: Vec::new(),
      allocator,
    }
  }

  pub fn with_heap_size(mut self, heap_size: usize) -> Self {
    self.heap_size = heap_size;
    self
  }

  pub fn with_allocator(mut self, allocator: Config) -> Self {
    self.allocator = allocator;
    self
  }

  /// Adds a pool, keeping pools ordered by ascending block size. Returns
  /// `None` once `MAX_POOLS` pools are configured.
  pub fn with_pool(mut self, spec: PoolSpec) -> Option<Self> {
    let at = self
      .pools
      .iter()
      .position(|pool| pool.block_size() > spec.block_size())
      .unwrap_or(self.pools.len());
    self.pools.insert(at, spec).ok()?;
    Some(self)
  }

  pub fn without_pools(mut self) -> Self {
    self.pools.clear();
    self
  }
}

impl Default for ManagerConfig {
  fn default() -> Self {
    let mut pools = Vec::new();
    for spec in DEFAULT_POOLS {
      let _ = pools.push(spec);
    }

    Self {
      heap_size: HEAP_SIZE,
      pools,
      allocator: Config::default(),
    }
  }
}
