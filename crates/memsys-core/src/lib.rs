#![cfg_attr(not(test), no_std)]

pub mod alloc;
pub mod config;
pub mod span;

pub mod prelude {
  pub use super::{
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
      Fill,
      Pattern,
    },
    span::{
      Span,
      SpanStatus,
    },
  };
}
