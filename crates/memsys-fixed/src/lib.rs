#![cfg_attr(not(test), no_std)]

pub mod pool;

pub use pool::{
  FixedError,
  FixedResult,
  FixedSizeAllocator,
};

#[cfg(test)]
mod tests;
