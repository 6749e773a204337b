use super::*;
use memsys_core::{
  alloc::Allocator,
  config::Config,
};
use memsys_heap::HeapAllocator;

fn store(words: &mut [usize]) -> UnsafeStore<usize> {
  UnsafeStore::from(words)
}

#[test]
fn test_multi_word_operations() {
  let mut storage = [0usize; 2];
  let bits = storage.len() * usize::BITS as usize;
  let mut bitmap = Bitmap::zero(store(&mut storage), bits).unwrap();

  bitmap.set(0).unwrap();
  bitmap.set(63).unwrap();
  bitmap.set(64).unwrap();
  bitmap.set(99).unwrap();

  assert!(bitmap.get(0).unwrap());
  assert!(bitmap.get(63).unwrap());
  assert!(bitmap.get(64).unwrap());
  assert!(bitmap.get(99).unwrap());
  assert!(!bitmap.get(32).unwrap());
  assert!(bitmap.is_clear(96).unwrap());
  assert_eq!(bitmap.count_set(), 4);
}

#[test]
fn test_bulk_operations() {
  let mut storage = [0usize; 3];
  let bits = storage.len() * usize::BITS as usize;
  let mut bitmap = Bitmap::zero(store(&mut storage), bits).unwrap();

  bitmap.set(5).unwrap();
  bitmap.set(35).unwrap();
  bitmap.set(65).unwrap();

  bitmap.clear_all();
  assert!(!bitmap.get(5).unwrap());
  assert!(!bitmap.get(35).unwrap());
  assert!(!bitmap.get(65).unwrap());
  assert!(bitmap.all_clear());

  bitmap.set_all();
  assert!(bitmap.get(0).unwrap());
  assert!(bitmap.get(64).unwrap());
  assert!(bitmap.get(bits - 1).unwrap());
  assert!(bitmap.all_set());
}

#[test]
fn test_search_operations() {
  let mut storage = [0usize; 2];
  let bits = storage.len() * usize::BITS as usize;
  let mut bitmap = Bitmap::zero(store(&mut storage), bits).unwrap();

  assert_eq!(bitmap.find_fs(), None);
  assert_eq!(bitmap.find_fc(), Some(0));

  bitmap.set(5).unwrap();
  bitmap.set(65).unwrap();

  assert_eq!(bitmap.find_fs(), Some(5));
  assert_eq!(bitmap.find_fc(), Some(0));

  bitmap.set(0).unwrap();
  assert_eq!(bitmap.find_fc(), Some(1));

  bitmap.clear(0).unwrap();
  bitmap.clear(5).unwrap();
  assert_eq!(bitmap.find_fs(), Some(65));

  bitmap.set_all();
  assert_eq!(bitmap.find_fc(), None);
  assert_eq!(bitmap.find_fs(), Some(0));
}

#[test]
fn test_error_handling() {
  let mut storage = [0usize; 1];
  let bits = storage.len() * usize::BITS as usize;
  let err = Bitmap::zero(store(&mut storage), bits + 1);
  assert!(matches!(
    err,
    Err(BitmapError::InsufficientSize { have, need }) if have < need
  ));

  let mut bitmap = Bitmap::zero(store(&mut storage), bits).unwrap();

  assert!(bitmap.set(bits - 1).is_ok());
  assert_eq!(
    bitmap.set(bits),
    Err(BitmapError::OutOfBounds {
      index: bits,
      size: bits
    })
  );
  assert!(bitmap.get(bits).is_err());
  assert!(bitmap.clear(bits).is_err());
  assert!(bitmap.is_set(bits).is_err());
}

#[test]
fn test_partial_word_masks() {
  let mut storage = [0usize; 2];
  let bits = usize::BITS as usize + 3;
  let mut bitmap = Bitmap::one(store(&mut storage), bits).unwrap();

  assert!(bitmap.all_set());
  assert_eq!(bitmap.count_set(), bits);
  assert_eq!(bitmap.find_fc(), None);

  for i in 0..bits {
    bitmap.clear(i).unwrap();
  }
  assert!(bitmap.all_clear());
  assert_eq!(bitmap.find_fs(), None);
  assert_eq!(bitmap.find_fc(), Some(0));

  bitmap.set(bits - 1).unwrap();
  assert_eq!(bitmap.find_fs(), Some(bits - 1));
  assert!(!bitmap.all_clear());
  assert!(!bitmap.all_set());
}

#[test]
fn test_zero_and_one_constructors() {
  let mut storage = [usize::MAX; 2];
  let bits = storage.len() * usize::BITS as usize;
  let bitmap_zero = Bitmap::zero(store(&mut storage), bits).unwrap();
  assert!(bitmap_zero.all_clear());
  assert_eq!(bitmap_zero.find_fs(), None);
  assert_eq!(bitmap_zero.find_fc(), Some(0));

  let mut storage2 = [0usize; 2];
  let bitmap_one = Bitmap::one(store(&mut storage2), bits).unwrap();
  assert!(bitmap_one.all_set());
  assert_eq!(bitmap_one.find_fs(), Some(0));
  assert_eq!(bitmap_one.find_fc(), None);
}

#[test]
fn test_const_functionality() {
  const WORDS_FOR_65_BITS: usize = Bitmap::words(65);
  const BYTES_FOR_64_BITS: usize = Bitmap::bytes(64);

  assert_eq!(WORDS_FOR_65_BITS, 2);
  assert_eq!(BYTES_FOR_64_BITS, core::mem::size_of::<usize>());

  let mut storage = [0usize; 1];
  let bitmap = Bitmap::zero(store(&mut storage), 64).unwrap();
  assert_eq!(bitmap.bits(), 64);
  assert_eq!(bitmap.store().len(), 1);
}

#[test]
fn test_create_from_heap() {
  let mut memory = vec![0u8; 4096];
  let mut heap = HeapAllocator::new(&mut memory, Config::debug());

  let mut bitmap = Bitmap::create(100, &mut heap).unwrap();
  assert_eq!(bitmap.store().len(), Bitmap::words(100));
  assert!(bitmap.all_set());
  assert_eq!(bitmap.count_set(), 100);
  assert!(!heap.is_empty());

  bitmap.clear(42).unwrap();
  assert_eq!(bitmap.find_fc(), Some(42));

  bitmap.destroy(&mut heap).unwrap();
  assert!(heap.is_empty());
}

#[test]
fn test_create_sizes_storage_by_ceiling() {
  let mut memory = vec![0u8; 4096];
  let mut heap = HeapAllocator::new(&mut memory, Config::debug());

  let exact = usize::BITS as usize;
  let bitmap = Bitmap::create(exact, &mut heap).unwrap();
  assert_eq!(bitmap.store().len(), 1);
  bitmap.destroy(&mut heap).unwrap();

  let bitmap = Bitmap::create(exact + 1, &mut heap).unwrap();
  assert_eq!(bitmap.store().len(), 2);
  bitmap.destroy(&mut heap).unwrap();
}

#[test]
fn test_create_fails_when_backing_exhausted() {
  let mut memory = vec![0u8; 256];
  let mut heap = HeapAllocator::new(&mut memory, Config::debug());

  let result = Bitmap::create(1 << 16, &mut heap);
  assert!(matches!(result, Err(BitmapError::Alloc(_))));
  assert!(heap.is_empty());
}
