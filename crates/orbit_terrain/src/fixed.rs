//! Fixed-point coordinate math.
//!
//! Positions are `I64Vec3` world coordinates multiplied by `2^scale`. At
//! planet scale the squared distance between two positions does not fit in
//! 64 bits, so distance checks go through [`is_distance_near`], which bounds
//! each axis delta first and treats anything past the bound as "far".

use glam::I64Vec3;

/// `2^exp` as an integer conversion factor.
#[inline]
pub const fn int_2pow(exp: u8) -> i64 {
  1i64 << exp
}

/// `|lhs - rhs|` without intermediate overflow for any pair of inputs.
#[inline]
pub const fn absdelta(lhs: i64, rhs: i64) -> u64 {
  let lhs_positive = lhs > 0;
  let rhs_positive = rhs > 0;
  if lhs_positive && !rhs_positive {
    return lhs as u64 + rhs.unsigned_abs();
  }
  if !lhs_positive && rhs_positive {
    return lhs.unsigned_abs() + rhs as u64;
  }
  // Same sign: the difference itself cannot overflow
  if lhs > rhs {
    (lhs - rhs) as u64
  } else {
    (rhs - lhs) as u64
  }
}

/// Largest per-axis delta whose squared sum still fits in a `u64`:
/// `sqrt(2^64) / 3`.
pub const DISTANCE_DELTA_MAX: u64 = 1_431_655_765;

/// True when `a` and `b` are within `threshold` of each other.
///
/// Any axis delta past [`DISTANCE_DELTA_MAX`] returns "far" by convention
/// instead of risking overflow in the squared sum. `threshold` must fit its
/// own square in a `u64`.
pub fn is_distance_near(a: I64Vec3, b: I64Vec3, threshold: u64) -> bool {
  let dx = absdelta(a.x, b.x);
  let dy = absdelta(a.y, b.y);
  let dz = absdelta(a.z, b.z);

  if dx > DISTANCE_DELTA_MAX || dy > DISTANCE_DELTA_MAX || dz > DISTANCE_DELTA_MAX {
    return false;
  }

  let magnitude_sqr = dx * dx + dy * dy + dz * dz;

  magnitude_sqr < threshold * threshold
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_absdelta_mixed_signs() {
    assert_eq!(absdelta(5, -3), 8);
    assert_eq!(absdelta(-5, 3), 8);
    assert_eq!(absdelta(7, 2), 5);
    assert_eq!(absdelta(2, 7), 5);
    assert_eq!(absdelta(-2, -7), 5);
    assert_eq!(absdelta(0, 0), 0);
  }

  #[test]
  fn test_absdelta_extremes() {
    // Would overflow a plain i64 subtraction
    assert_eq!(absdelta(i64::MAX, i64::MIN), u64::MAX);
    assert_eq!(absdelta(i64::MIN, i64::MAX), u64::MAX);
  }

  #[test]
  fn test_near_within_threshold() {
    let a = I64Vec3::new(0, 0, 0);
    let b = I64Vec3::new(3, 4, 0);
    assert!(is_distance_near(a, b, 6)); // |ab| = 5
    assert!(!is_distance_near(a, b, 5)); // strict
    assert!(!is_distance_near(a, b, 4));
  }

  #[test]
  fn test_far_on_axis_overflow() {
    // Each axis delta is fine by itself, but past the per-axis bound the
    // predicate must answer "far" rather than overflow
    let a = I64Vec3::new(0, 0, 0);
    let b = I64Vec3::new((DISTANCE_DELTA_MAX + 1) as i64, 0, 0);
    assert!(!is_distance_near(a, b, u32::MAX as u64));
  }

  #[test]
  fn test_planetary_scale_does_not_overflow() {
    // Two points almost 2^60 apart on every axis
    let a = I64Vec3::new(-(1 << 59), -(1 << 59), -(1 << 59));
    let b = I64Vec3::new(1 << 59, 1 << 59, 1 << 59);
    assert!(!is_distance_near(a, b, 1 << 20));
  }

  #[test]
  fn test_int_2pow() {
    assert_eq!(int_2pow(0), 1);
    assert_eq!(int_2pow(10), 1024);
  }
}
