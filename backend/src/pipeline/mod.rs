pub mod aggregate;
pub mod classifier;
pub mod geometry;
pub mod orchestrator;

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
