use core::ptr::NonNull;

use memsys_bitmap::BitmapError;
use memsys_core::{
  alloc::{
    AllocError,
    Allocator,
    TeardownError,
  },
  config::Config,
  span::{
    Span,
    SpanStatus,
  },
};
use memsys_heap::HeapAllocator;
use rand::{
  Rng,
  SeedableRng,
  rngs::StdRng,
};

use crate::{
  FixedError,
  FixedSizeAllocator,
};

fn addr(ptr: NonNull<u8>) -> usize {
  ptr.as_ptr() as usize
}

fn spans(pool: &FixedSizeAllocator, free: bool) -> Vec<Span> {
  let mut spans = Vec::new();
  if free {
    pool.for_each_free(&mut |span| spans.push(span));
  } else {
    pool.for_each_outstanding(&mut |span| spans.push(span));
  }
  spans
}

#[test]
fn test_exhaustion_and_reuse() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 16 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  assert_eq!(pool.block_count(), 16);
  assert!(pool.is_empty());

  let ptrs: Vec<_> = (0..16).map(|_| pool.alloc(16, 4).unwrap()).collect();
  assert!(!pool.is_empty());
  assert_eq!(pool.alloc(16, 4), Err(AllocError::OutOfMemory));
  assert_eq!(pool.largest_free_block(4), 0);

  let mut blocks: Vec<_> = ptrs.iter().map(|ptr| (addr(*ptr) - addr(ptrs[0])) / 64).collect();
  blocks.dedup();
  assert_eq!(blocks.len(), 16);

  pool.free(ptrs[5]).unwrap();
  assert!(!pool.is_allocated(ptrs[5].as_ptr()));
  assert_eq!(pool.alloc(16, 4), Ok(ptrs[5]));

  for ptr in ptrs {
    pool.free(ptr).unwrap();
  }
  assert!(pool.is_empty());
  pool.destroy(&mut backing).unwrap();
  assert!(backing.is_empty());
}

#[test]
fn test_request_larger_than_block() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 4 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  assert!(pool.fits(56));
  assert!(!pool.fits(57));
  assert_eq!(pool.alloc(57, 1), Err(AllocError::OutOfMemory));
  assert!(pool.is_empty());

  let mut memory = vec![0u8; 4 * 64];
  let mut bare = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::release()).unwrap();
  assert!(bare.fits(64));
  let ptr = bare.alloc(64, 1).unwrap();
  bare.free(ptr).unwrap();
  bare.destroy(&mut backing).unwrap();
  pool.destroy(&mut backing).unwrap();
}

#[test]
fn test_alignment_inside_block() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 8 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  for align in [1usize, 2, 4, 8, 16, 32] {
    let ptr = pool.alloc(8, align).unwrap();
    assert_eq!(addr(ptr) % align, 0);
  }
  assert_eq!(pool.alloc(8, 3), Err(AllocError::InvalidAlignment));
}

#[test]
fn test_invalid_frees() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 4 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  let ptr = pool.alloc(16, 8).unwrap();
  let mut local = 0u8;
  assert_eq!(pool.free(NonNull::from(&mut local)), Err(AllocError::NotOwned));

  let interior = unsafe { ptr.add(3) };
  assert!(pool.contains(interior.as_ptr()));
  assert!(pool.is_allocated(interior.as_ptr()));

  pool.free(ptr).unwrap();
  assert_eq!(pool.free(ptr), Err(AllocError::NotAllocated));
  assert!(pool.contains(ptr.as_ptr()));
  assert!(!pool.is_allocated(ptr.as_ptr()));
  assert!(pool.is_empty());
}

#[test]
fn test_trailing_bytes_are_not_owned() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 3 * 64 + 10];
  let base = memory.as_ptr() as usize;
  let pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  assert_eq!(pool.block_count(), 3);
  assert_eq!(pool.span(), 192);
  assert!(pool.contains((base + 191) as *const u8));
  assert!(!pool.contains((base + 192) as *const u8));
}

#[test]
fn test_spans_are_ascending() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 8 * 32];
  let mut pool = FixedSizeAllocator::create(&mut memory, 32, &mut backing, Config::debug()).unwrap();

  let a = pool.alloc(8, 4).unwrap();
  let b = pool.alloc(8, 4).unwrap();
  let c = pool.alloc(8, 4).unwrap();
  pool.free(b).unwrap();

  let live = spans(&pool, false);
  assert_eq!(live.len(), 2);
  assert!(live[0].contains(addr(a)));
  assert!(live[1].contains(addr(c)));
  assert!(live.iter().all(|span| span.status() == SpanStatus::Allocated));

  let free = spans(&pool, true);
  assert_eq!(free.len(), 6);
  assert!(free[0].contains(addr(b)));
  for pair in free.windows(2) {
    assert!(pair[0].end() <= pair[1].start());
  }
}

#[test]
fn test_largest_free_block_is_exact() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 4 * 128];
  let mut pool = FixedSizeAllocator::create(&mut memory, 128, &mut backing, Config::debug()).unwrap();

  for align in [1usize, 4, 16, 64] {
    let largest = pool.largest_free_block(align);
    assert!(largest > 0 && largest <= 120);
    assert!(pool.alloc(largest + 1, align).is_err());
    let ptr = pool.alloc(largest, align).unwrap();
    pool.free(ptr).unwrap();
  }
}

#[test]
fn test_stamping() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 2 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  let ptr = pool.alloc(16, 1).unwrap();
  let view = |from: isize, len: usize| unsafe {
    core::slice::from_raw_parts(ptr.as_ptr().offset(from), len).to_vec()
  };
  assert_eq!(view(-4, 4), vec![0xFD; 4]);
  assert_eq!(view(0, 16), vec![0xCD; 16]);
  assert_eq!(view(16, 4), vec![0xFD; 4]);
  assert_eq!(view(20, 4), vec![0xED; 4]);

  pool.free(ptr).unwrap();
  assert_eq!(view(-4, 64), vec![0xDD; 64]);
  assert!(pool.verify().is_ok());
}

#[test]
fn test_verify_detects_use_after_free() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 2 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  let ptr = pool.alloc(16, 8).unwrap();
  pool.free(ptr).unwrap();
  unsafe { ptr.as_ptr().write(0) };
  assert_eq!(pool.verify(), Err(AllocError::Corrupted { addr: addr(ptr) }));
}

#[test]
fn test_verify_checks_live_guards() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 4 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  let ptr = pool.alloc(13, 16).unwrap();
  unsafe { ptr.as_ptr().write_bytes(0xED, 13) };
  assert!(pool.verify().is_ok());

  unsafe { ptr.as_ptr().sub(1).write(0) };
  assert_eq!(pool.verify(), Err(AllocError::Corrupted { addr: addr(ptr) - 1 }));
  unsafe { ptr.as_ptr().sub(1).write(0xFD) };

  unsafe { ptr.as_ptr().add(13).write(0) };
  assert_eq!(pool.verify(), Err(AllocError::Corrupted { addr: addr(ptr) + 13 }));
  unsafe { ptr.as_ptr().add(13).write(0xFD) };

  assert!(pool.verify().is_ok());
  pool.free(ptr).unwrap();
  pool.destroy(&mut backing).unwrap();
}

#[test]
fn test_create_errors() {
  let mut backing_memory = vec![0u8; 256];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());

  let mut memory = vec![0u8; 64];
  assert!(matches!(
    FixedSizeAllocator::create(&mut memory, 0, &mut backing, Config::debug()),
    Err(FixedError::InvalidBlockSize)
  ));

  let mut memory = vec![0u8; 1 << 16];
  assert!(matches!(
    FixedSizeAllocator::create(&mut memory, 1, &mut backing, Config::debug()),
    Err(FixedError::Bitmap(BitmapError::Alloc(AllocError::OutOfMemory)))
  ));
  assert!(backing.is_empty());
}

#[test]
fn test_destroy_reports_live_blocks() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 4 * 64];
  let mut pool = FixedSizeAllocator::create(&mut memory, 64, &mut backing, Config::debug()).unwrap();

  pool.alloc(8, 8).unwrap();
  assert_eq!(pool.outstanding(), 1);
  assert_eq!(
    pool.destroy(&mut backing),
    Err(FixedError::Teardown(TeardownError::Leak { outstanding: 1 }))
  );
  assert!(backing.is_empty());
}

#[test]
fn test_random_workload() {
  let mut backing_memory = vec![0u8; 4096];
  let mut backing = HeapAllocator::new(&mut backing_memory, Config::debug());
  let mut memory = vec![0u8; 64 * 48];
  let mut pool = FixedSizeAllocator::create(&mut memory, 48, &mut backing, Config::debug()).unwrap();
  let mut rng = StdRng::seed_from_u64(0xF1ED);

  let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
  for _ in 0..5000 {
    if live.is_empty() || rng.random_bool(0.5) {
      let size = rng.random_range(1..=40);
      match pool.alloc(size, 1) {
        Ok(ptr) => {
          let tag = rng.random::<u8>();
          unsafe { ptr.as_ptr().write_bytes(tag, size) };
          live.push((ptr, size, tag));
        }
        Err(err) => {
          assert_eq!(err, AllocError::OutOfMemory);
          assert_eq!(live.len(), pool.block_count());
        }
      }
    } else {
      let (ptr, size, tag) = live.swap_remove(rng.random_range(0..live.len()));
      let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), size) };
      assert!(bytes.iter().all(|byte| *byte == tag));
      pool.free(ptr).unwrap();
    }

    assert_eq!(pool.outstanding(), live.len());
    assert_eq!(pool.is_empty(), live.is_empty());
  }

  assert!(pool.verify().is_ok());
  for (ptr, _, _) in live {
    pool.free(ptr).unwrap();
  }
  assert!(pool.is_empty());
  pool.destroy(&mut backing).unwrap();
}
