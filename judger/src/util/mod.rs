pub mod async_teardown;
pub mod names;
pub mod tar;

pub use async_teardown::*;

/// Round to two decimal places, the precision reported for timings and
/// memory figures.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
