#![cfg_attr(not(test), no_std)]

//! Fixed-width bit array over raw words.
//!
//! Bit `i` lives in word `i / usize::BITS` at position `i % usize::BITS`.
//! Storage either comes from a caller-provided store or is allocated from a
//! backing [`Allocator`] with [`Bitmap::create`] and handed back with
//! [`Bitmap::destroy`].

use core::ptr::NonNull;

use memsys_core::alloc::{
  AllocError,
  Allocator,
};
use memsys_sys::misc::UnsafeStore;

#[cfg(test)]
pub mod tests;

#[derive(Debug, PartialEq)]
pub enum BitmapError {
  InsufficientSize { have: usize, need: usize },
  OutOfBounds { index: usize, size: usize },
  Alloc(AllocError),
}

pub type BitmapResult<T> = Result<T, BitmapError>;

pub type BitmapWord = usize;

const USIZE_BITS: usize = usize::BITS as usize;

#[derive(Debug)]
pub struct Bitmap {
  store: UnsafeStore<BitmapWord>,
  bits: usize,
}

impl Bitmap {
  #[inline(always)]
  pub const fn words(fields: usize) -> usize {
    fields.div_ceil(USIZE_BITS)
  }

  #[inline(always)]
  pub const fn bytes(fields: usize) -> usize {
    Self::words(fields) * core::mem::size_of::<BitmapWord>()
  }

  #[inline(always)]
  pub fn store(&self) -> &[BitmapWord] {
    self.store.as_slice()
  }

  #[inline(always)]
  pub const fn bits(&self) -> usize {
    self.bits
  }

  const fn position(&self, index: usize) -> BitmapResult<(usize, usize)> {
    if index >= self.bits {
      return Err(BitmapError::OutOfBounds {
        index,
        size: self.bits,
      });
    }
    Ok((index / USIZE_BITS, index % USIZE_BITS))
  }

  fn over(store: UnsafeStore<BitmapWord>, bits: usize) -> BitmapResult<Self> {
    let available = store.len() * USIZE_BITS;
    if bits > available {
      return Err(BitmapError::InsufficientSize {
        have: available,
        need: bits,
      });
    }
    Ok(Self { store, bits })
  }

  pub fn zero(store: UnsafeStore<BitmapWord>, bits: usize) -> BitmapResult<Self> {
    let mut bitmap = Self::over(store, bits)?;
    bitmap.clear_all();
    Ok(bitmap)
  }

  pub fn one(store: UnsafeStore<BitmapWord>, bits: usize) -> BitmapResult<Self> {
    let mut bitmap = Self::over(store, bits)?;
    bitmap.set_all();
    Ok(bitmap)
  }

  /// Allocates `ceil(bits / usize::BITS)` words from `backing`, all bits set.
  pub fn create(bits: usize, backing: &mut dyn Allocator) -> BitmapResult<Self> {
    let words = Self::words(bits);
    let size = Self::bytes(bits).max(core::mem::size_of::<BitmapWord>());
    let ptr: NonNull<BitmapWord> = backing
      .alloc(size, core::mem::align_of::<BitmapWord>())
      .map_err(BitmapError::Alloc)?
      .cast();

    let store = unsafe { UnsafeStore::from_raw(ptr, words) };
    let bitmap = Self::one(store, bits)?;
    log::trace!("bitmap: {} bits in {} words at {:p}", bits, words, ptr);
    Ok(bitmap)
  }

  /// Hands the storage back to the allocator it came from.
  pub fn destroy(self, backing: &mut dyn Allocator) -> BitmapResult<()> {
    backing
      .free(self.store.as_non_null().cast())
      .map_err(BitmapError::Alloc)
  }

  #[inline]
  pub fn set(&mut self, index: usize) -> BitmapResult<()> {
    let (word_index, bit_index) = self.position(index)?;
    self.store.as_mut_slice()[word_index] |= 1usize << bit_index;
    Ok(())
  }

  #[inline]
  pub fn clear(&mut self, index: usize) -> BitmapResult<()> {
    let (word_index, bit_index) = self.position(index)?;
    self.store.as_mut_slice()[word_index] &= !(1usize << bit_index);
    Ok(())
  }

  #[inline]
  pub fn get(&self, index: usize) -> BitmapResult<bool> {
    let (word_index, bit_index) = self.position(index)?;
    Ok((self.store()[word_index] & (1usize << bit_index)) != 0)
  }

  #[inline]
  pub fn is_set(&self, index: usize) -> BitmapResult<bool> {
    self.get(index)
  }

  #[inline]
  pub fn is_clear(&self, index: usize) -> BitmapResult<bool> {
    self.get(index).map(|set| !set)
  }

  pub fn clear_all(&mut self) {
    self.store.as_mut_slice().fill(0);
  }

  pub fn set_all(&mut self) {
    let bits = self.bits;
    let store = self.store.as_mut_slice();
    let full_words = bits / USIZE_BITS;

    store[..full_words].fill(usize::MAX);
    store[full_words..].fill(0);

    let remaining_bits = bits % USIZE_BITS;
    if remaining_bits > 0 {
      store[full_words] = usize::MAX >> (USIZE_BITS - remaining_bits);
    }
  }

  /// Mask of the valid bits in word `word_index`.
  const fn mask(&self, word_index: usize) -> usize {
    let remaining_bits = self.bits % USIZE_BITS;
    if remaining_bits > 0 && word_index == self.bits / USIZE_BITS {
      usize::MAX >> (USIZE_BITS - remaining_bits)
    } else {
      usize::MAX
    }
  }

  fn used_words(&self) -> &[BitmapWord] {
    &self.store()[..Self::words(self.bits)]
  }

  pub fn find_fs(&self) -> Option<usize> {
    for (word_index, word) in self.used_words().iter().enumerate() {
      let value = *word & self.mask(word_index);
      if value != 0 {
        return Some(word_index * USIZE_BITS + value.trailing_zeros() as usize);
      }
    }
    None
  }

  pub fn find_fc(&self) -> Option<usize> {
    for (word_index, word) in self.used_words().iter().enumerate() {
      let inverted = !*word & self.mask(word_index);
      if inverted != 0 {
        return Some(word_index * USIZE_BITS + inverted.trailing_zeros() as usize);
      }
    }
    None
  }

  pub fn all_set(&self) -> bool {
    self
      .used_words()
      .iter()
      .enumerate()
      .all(|(word_index, word)| *word & self.mask(word_index) == self.mask(word_index))
  }

  pub fn all_clear(&self) -> bool {
    self
      .used_words()
      .iter()
      .enumerate()
      .all(|(word_index, word)| *word & self.mask(word_index) == 0)
  }

  pub fn count_set(&self) -> usize {
    self
      .used_words()
      .iter()
      .enumerate()
      .map(|(word_index, word)| (*word & self.mask(word_index)).count_ones() as usize)
      .sum()
  }
}
