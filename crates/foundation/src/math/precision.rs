//! Float comparison policy.
//!
//! Camera values travel through the engine and back as `f64`; engines round
//! them, so equality is checked within an absolute tolerance.

/// Absolute-tolerance equality. NaN equals NaN so that comparisons of
/// snapshots stay reflexive.
pub fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b || (a - b).abs() <= eps
}

#[cfg(test)]
mod tests {
    use super::approx_eq;

    #[test]
    fn approx_eq_uses_absolute_tolerance() {
        assert!(approx_eq(1.0, 1.0 + 1e-12, 1e-9));
        assert!(!approx_eq(1.0, 1.001, 1e-9));
        assert!(approx_eq(f64::NAN, f64::NAN, 0.0));
        assert!(!approx_eq(f64::NAN, 0.0, 1.0));
    }

    #[test]
    fn signed_zeros_compare_equal() {
        assert!(approx_eq(-0.0, 0.0, 0.0));
    }
}
