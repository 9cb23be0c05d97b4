//! Fixed-point price arithmetic policy
//!
//! Prices live in (0, 1) at one-hundredth-of-a-cent resolution. Every
//! arithmetic boundary rounds through `round4`; comparisons use `EPSILON`
//! instead of binary-float equality.

/// Boundary tolerance for price comparisons.
pub const EPSILON: f64 = 1e-4;

/// Round to 4 decimal places.
#[inline]
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Snap a price down to the nearest tick.
#[inline]
pub fn snap_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return round4(price);
    }
    round4((price / tick_size).floor() * tick_size)
}

/// Snap a share quantity down to 0.01 granularity.
#[inline]
pub fn snap_quantity(quantity: f64) -> f64 {
    (quantity * 100.0).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123449), 0.1234);
        assert_eq!(round4(0.123451), 0.1235);
        assert_eq!(round4(0.97), 0.97);
    }

    #[test]
    fn test_snap_to_tick() {
        assert_eq!(snap_to_tick(0.456, 0.01), 0.45);
        assert_eq!(snap_to_tick(0.456, 0.001), 0.456);
        // Degenerate tick falls back to plain rounding
        assert_eq!(snap_to_tick(0.4567, 0.0), 0.4567);
    }

    #[test]
    fn test_snap_quantity() {
        assert_eq!(snap_quantity(12.345), 12.34);
        assert_eq!(snap_quantity(12.0), 12.0);
    }
}
