#![cfg_attr(not(test), no_std)]

mod block;
mod heap;
mod table;

pub use block::Block;
pub use heap::HeapAllocator;
pub use table::DESCRIPTOR_SIZE;
