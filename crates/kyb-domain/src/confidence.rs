//! Confidence helpers
//!
//! Every weight, confidence and score in the system lives in [0, 1]. Values are
//! clamped rather than rejected so that arithmetic drift or adversarial inputs
//! can never push a result outside the unit interval.

/// Clamp a value into [0.0, 1.0]
///
/// `NaN` maps to `0.0` so downstream comparisons stay total.
///
/// # Examples
///
/// ```
/// use kyb_domain::clamp_unit;
///
/// assert_eq!(clamp_unit(1.7), 1.0);
/// assert_eq!(clamp_unit(-0.2), 0.0);
/// assert_eq!(clamp_unit(f64::NAN), 0.0);
/// ```
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Clamp a value into `[floor, ceiling]`, both bounds themselves clamped to [0, 1]
pub fn clamp_between(value: f64, floor: f64, ceiling: f64) -> f64 {
    let floor = clamp_unit(floor);
    let ceiling = clamp_unit(ceiling).max(floor);
    if value.is_nan() {
        return floor;
    }
    value.clamp(floor, ceiling)
}

/// Round to four decimal places
///
/// Used when scores are rendered into explanations so repeated runs produce
/// byte-identical output.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
