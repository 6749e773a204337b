#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod manager;

pub use config::{
  ManagerConfig,
  PoolSpec,
};
pub use manager::{
  HeapManager,
  ManagerError,
  ManagerResult,
};
