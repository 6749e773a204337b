//! Power-of-two address arithmetic.
//!
//! Every helper returns `None` for a non power-of-two alignment or when the
//! result would leave the address space, so callers can chain them with `?`.

pub const fn is_aligned(value: usize, align: usize) -> Option<bool> {
  if !align.is_power_of_two() {
    return None;
  }
  Some((value & (align - 1)) == 0)
}

pub const fn align_up(value: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  let mask = align - 1;
  if let Some(sum) = value.checked_add(mask) {
    return Some(sum & !mask);
  }

  None
}

pub const fn align_down(value: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  Some(value & !(align - 1))
}

/// Bytes needed to move `addr` up to the next multiple of `align`.
pub const fn align_offset(addr: usize, align: usize) -> Option<usize> {
  match align_up(addr, align) {
    Some(aligned) => Some(aligned - addr),
    None => None,
  }
}
