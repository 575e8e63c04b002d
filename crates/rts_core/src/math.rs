//! Fixed-point math utilities for deterministic simulation.
//!
//! All match simulation uses fixed-point arithmetic so that two servers fed
//! the same seed and command stream produce identical state. Values only
//! leave fixed-point at the snapshot boundary.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Build a fixed-point constant from a rational `num / den`, rounded to the
/// nearest representable value.
#[must_use]
pub const fn fixed_ratio(num: i64, den: i64) -> Fixed {
    let scaled = ((num as i128) << 32) + (den as i128) / 2;
    Fixed::from_bits((scaled / den as i128) as i64)
}

/// Build a fixed-point constant from an integer.
#[must_use]
pub const fn fixed_int(n: i32) -> Fixed {
    Fixed::from_bits((n as i64) << 32)
}

/// π in fixed-point.
pub const PI: Fixed = fixed_ratio(3_141_592_653_589_793, 1_000_000_000_000_000);
/// π / 2 in fixed-point.
pub const FRAC_PI_2: Fixed = fixed_ratio(1_570_796_326_794_897, 1_000_000_000_000_000);
/// π / 4 in fixed-point.
pub const FRAC_PI_4: Fixed = fixed_ratio(785_398_163_397_448, 1_000_000_000_000_000);
/// 2π in fixed-point.
pub const TAU: Fixed = fixed_ratio(6_283_185_307_179_586, 1_000_000_000_000_000);

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Content files and wire payloads carry plain decimal numbers; they are
/// converted to fixed-point on the way in and back to `f64` on the way out.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| D::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

/// Serde support for lists of fixed-point numbers (per-age tables).
pub mod fixed_vec_serde {
    use super::Fixed;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Serialize a list of fixed-point numbers as decimals.
    pub fn serialize<S>(values: &[Fixed], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| v.to_num::<f64>()))
    }

    /// Deserialize a list of decimals into fixed-point numbers.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<f64>::deserialize(deserializer)?
            .into_iter()
            .map(|value| {
                Fixed::checked_from_num(value)
                    .ok_or_else(|| D::Error::custom(format!("{value} is out of fixed-point range")))
            })
            .collect()
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Convert from wire coordinates. Returns `None` for non-finite or
    /// out-of-range input.
    #[must_use]
    pub fn from_f64(x: f64, y: f64) -> Option<Self> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Self::new(Fixed::checked_from_num(x)?, Fixed::checked_from_num(y)?))
    }

    /// Convert to wire coordinates.
    #[must_use]
    pub fn to_f64(self) -> (f64, f64) {
        (self.x.to_num(), self.y.to_num())
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Clamp each component into `[min, max]`.
    #[must_use]
    pub fn clamp(self, min: Fixed, max: Fixed) -> Self {
        Self::new(self.x.clamp(min, max), self.y.clamp(min, max))
    }

    /// Angle of this vector in radians, in `(-π, π]`.
    #[must_use]
    pub fn angle(self) -> Fixed {
        atan2(self.y, self.x)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = (low + high) / fixed_int(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Polynomial arctangent for `|z| <= 1` (max error ~0.004 rad).
fn atan_unit(z: Fixed) -> Fixed {
    const K: Fixed = fixed_ratio(273, 1000);
    z * FRAC_PI_4 + K * z * (Fixed::ONE - z.abs())
}

/// Fixed-point `atan2`, returning an angle in `(-π, π]`.
#[must_use]
pub fn atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }
    if x.abs() >= y.abs() {
        let base = atan_unit(y / x);
        if x > Fixed::ZERO {
            base
        } else if y >= Fixed::ZERO {
            base + PI
        } else {
            base - PI
        }
    } else {
        let base = atan_unit(x / y);
        if y > Fixed::ZERO {
            FRAC_PI_2 - base
        } else {
            -FRAC_PI_2 - base
        }
    }
}

/// Wrap an angle into `[-π, π]`.
#[must_use]
pub fn normalize_angle(angle: Fixed) -> Fixed {
    let mut out = angle;
    while out > PI {
        out -= TAU;
    }
    while out < -PI {
        out += TAU;
    }
    out
}

/// Rotate `current` towards `target` by at most `max_step` radians.
#[must_use]
pub fn rotate_towards(current: Fixed, target: Fixed, max_step: Fixed) -> Fixed {
    let diff = normalize_angle(target - current);
    if diff.abs() <= max_step {
        return target;
    }
    current + max_step * diff.signum()
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Vec2Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn close(a: Fixed, b: Fixed, eps: f64) -> bool {
        (a - b).abs() < fixed(eps)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(fixed(3.0), fixed(0.0));
        let b = Vec2Fixed::new(fixed(0.0), fixed(4.0));
        assert_eq!(a.distance_squared(b), fixed(25.0));
        assert!(close(a.distance(b), fixed(5.0), 1e-6));
    }

    #[test]
    fn test_fixed_ratio_rounds_to_nearest() {
        let dt = fixed_ratio(1, 20);
        // 120 steps of 1/20 must reach 6 seconds exactly or just past it.
        let mut total = Fixed::ZERO;
        for _ in 0..120 {
            total += dt;
        }
        assert!(total >= fixed(6.0));
        assert!(close(total, fixed(6.0), 1e-6));
        assert_eq!(fixed_int(7), fixed(7.0));
    }

    #[test]
    fn test_sqrt_precision() {
        assert!(close(fixed_sqrt(fixed(2.0)), fixed(std::f64::consts::SQRT_2), 1e-6));
        assert!(close(fixed_sqrt(fixed(20_000.0)), fixed(141.421_356), 1e-4));
        assert_eq!(fixed_sqrt(fixed(-1.0)), Fixed::ZERO);
    }

    #[test]
    fn test_atan2_quadrants() {
        let cases = [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0), (0.3, 2.0), (-2.0, 0.1)];
        for (y, x) in cases {
            let expected = f64::atan2(y, x);
            let got = atan2(fixed(y), fixed(x)).to_num::<f64>();
            assert!((got - expected).abs() < 0.01, "atan2({y}, {x}) = {got}, want {expected}");
        }
        assert_eq!(atan2(Fixed::ZERO, Fixed::ZERO), Fixed::ZERO);
    }

    #[test]
    fn test_rotate_towards_wraps() {
        // From just below π to just above -π is a short hop across the seam.
        let current = fixed(3.0);
        let target = fixed(-3.0);
        let stepped = rotate_towards(current, target, fixed(0.1));
        assert!(stepped > current);
        assert_eq!(rotate_towards(fixed(0.0), fixed(0.05), fixed(0.1)), fixed(0.05));
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::new(fixed(3.0), fixed(4.0));
        let norm = v.normalize();

        let len_sq = norm.dot(norm);
        let epsilon = Fixed::ONE / fixed(10_000.0);
        assert!((len_sq - Fixed::ONE).abs() < epsilon);

        let ratio_diff = (norm.x * fixed(4.0)) - (norm.y * fixed(3.0));
        assert!(ratio_diff.abs() < epsilon, "direction not preserved: {ratio_diff:?}");
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }
}
