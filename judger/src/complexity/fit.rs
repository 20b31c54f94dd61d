//! Least-squares fitting of timing samples against growth-rate models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timing ratio (slowest / fastest) at or below which samples count as flat.
const FLAT_RATIO: f64 = 1.5;

/// Fewest measurements a fit is attempted on.
pub const MIN_MEASUREMENTS: usize = 3;

/// Candidate asymptotic classes, simplest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Complexity {
    #[serde(rename = "O(1)")]
    Constant,
    #[serde(rename = "O(log n)")]
    Logarithmic,
    #[serde(rename = "O(n)")]
    Linear,
    #[serde(rename = "O(n log n)")]
    Linearithmic,
    #[serde(rename = "O(n^2)")]
    Quadratic,
    #[serde(rename = "O(n^3)")]
    Cubic,
    #[serde(rename = "O(2^n)")]
    Exponential,
    Unknown,
}

impl Complexity {
    /// Fitted models, in tie-breaking order.
    pub const MODELS: [Complexity; 7] = [
        Complexity::Constant,
        Complexity::Logarithmic,
        Complexity::Linear,
        Complexity::Linearithmic,
        Complexity::Quadratic,
        Complexity::Cubic,
        Complexity::Exponential,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Complexity::Constant => "O(1)",
            Complexity::Logarithmic => "O(log n)",
            Complexity::Linear => "O(n)",
            Complexity::Linearithmic => "O(n log n)",
            Complexity::Quadratic => "O(n^2)",
            Complexity::Cubic => "O(n^3)",
            Complexity::Exponential => "O(2^n)",
            Complexity::Unknown => "Unknown",
        }
    }

    /// The regressor of this model for input size `n`. `None` for the
    /// constant model, which is fitted by its mean.
    fn transform(self, n: f64) -> Option<f64> {
        let log = n.max(1.0).ln();
        match self {
            Complexity::Logarithmic => Some(log),
            Complexity::Linear => Some(n),
            Complexity::Linearithmic => Some(n * log),
            Complexity::Quadratic => Some(n * n),
            Complexity::Cubic => Some(n * n * n),
            Complexity::Exponential => Some(n.exp2()),
            Complexity::Constant | Complexity::Unknown => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub input_size: usize,
    pub elapsed_millis: f64,
}

impl Measurement {
    pub fn new(input_size: usize, elapsed_millis: f64) -> Measurement {
        Measurement {
            input_size,
            elapsed_millis,
        }
    }
}

/// Goodness of fit of one candidate model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFit {
    pub complexity: Complexity,
    pub r_squared: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityReport {
    pub complexity: Complexity,
    /// R² of the chosen model, clamped to `[0, 1]`.
    pub confidence: f64,
    pub r_squared: f64,
    /// Samples the fit was made on, by ascending input size.
    pub measurements: Vec<Measurement>,
    /// Every model that could be fitted, in tie-breaking order.
    pub fits: Vec<ModelFit>,
}

impl ComplexityReport {
    pub fn unknown(measurements: Vec<Measurement>) -> ComplexityReport {
        ComplexityReport {
            complexity: Complexity::Unknown,
            confidence: 0.0,
            r_squared: 0.0,
            measurements,
            fits: vec![],
        }
    }
}

/// R² of `predicted` against `actual`.
fn r_squared(actual: &[f64], predicted: impl Iterator<Item = f64>) -> f64 {
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        // All timings equal: a perfect fit explains everything, anything
        // else explains nothing.
        return if ss_res.abs() < 1e-9 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Fit `y = a + b * f(n)` by ordinary least squares and return its R².
fn fit_model(model: Complexity, sizes: &[f64], times: &[f64]) -> Option<f64> {
    let mean_y = times.iter().sum::<f64>() / times.len() as f64;
    let xs = match sizes
        .iter()
        .map(|&n| model.transform(n))
        .collect::<Option<Vec<_>>>()
    {
        Some(xs) => xs,
        None => return Some(r_squared(times, times.iter().map(|_| mean_y))),
    };
    if xs.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let mean_x = xs.iter().sum::<f64>() / xs.len() as f64;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(times)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    let intercept = mean_y - slope * mean_x;

    let r2 = r_squared(times, xs.iter().map(|x| intercept + slope * x));
    if r2.is_finite() {
        Some(r2)
    } else {
        None
    }
}

/// Pick the growth-rate model that best explains `measurements`.
///
/// Ties go to the simpler model. When timings are flat (the slowest sample
/// within 1.5x of the fastest), only the constant and logarithmic models are
/// considered, since any steeper curve would be fitting noise.
pub fn fit(mut measurements: Vec<Measurement>) -> ComplexityReport {
    measurements.sort_by_key(|m| m.input_size);
    if measurements.len() < MIN_MEASUREMENTS {
        return ComplexityReport::unknown(measurements);
    }

    let sizes: Vec<f64> = measurements.iter().map(|m| m.input_size as f64).collect();
    let times: Vec<f64> = measurements.iter().map(|m| m.elapsed_millis).collect();

    let fastest = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let slowest = times.iter().cloned().fold(0f64, f64::max);
    let flat = fastest > 0.0 && slowest / fastest <= FLAT_RATIO;

    let fits: Vec<ModelFit> = Complexity::MODELS
        .iter()
        .filter_map(|&complexity| {
            fit_model(complexity, &sizes, &times).map(|r_squared| ModelFit {
                complexity,
                r_squared,
            })
        })
        .collect();

    let eligible = |c: Complexity| {
        !flat || matches!(c, Complexity::Constant | Complexity::Logarithmic)
    };
    let mut best: Option<ModelFit> = None;
    for fit in fits.iter().filter(|f| eligible(f.complexity)) {
        match best {
            Some(b) if b.r_squared >= fit.r_squared => {}
            _ => best = Some(*fit),
        }
    }

    match best {
        Some(best) => ComplexityReport {
            complexity: best.complexity,
            confidence: best.r_squared.max(0.0).min(1.0),
            r_squared: best.r_squared,
            measurements,
            fits,
        },
        None => ComplexityReport::unknown(measurements),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn samples(points: &[(usize, f64)]) -> Vec<Measurement> {
        points
            .iter()
            .map(|&(n, t)| Measurement::new(n, t))
            .collect()
    }

    #[test]
    fn linear_timing_is_linear() {
        let report = fit(samples(&[(100, 100.0), (10, 10.0), (1000, 1000.0)]));
        assert_eq!(report.complexity, Complexity::Linear);
        assert!(report.confidence >= 0.8, "{:?}", report);
        assert_eq!(
            report
                .measurements
                .iter()
                .map(|m| m.input_size)
                .collect::<Vec<_>>(),
            vec![10, 100, 1000]
        );
    }

    #[test]
    fn flat_timing_is_constant_or_logarithmic() {
        let report = fit(samples(&[(10, 5.0), (1000, 5.0), (100_000, 6.0)]));
        assert!(
            matches!(
                report.complexity,
                Complexity::Constant | Complexity::Logarithmic
            ),
            "{:?}",
            report
        );
    }

    #[test]
    fn identical_timings_prefer_constant() {
        let report = fit(samples(&[(1, 3.0), (2, 3.0), (4, 3.0), (8, 3.0)]));
        assert_eq!(report.complexity, Complexity::Constant);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn quadratic_timing_is_quadratic() {
        let points: Vec<_> = [10usize, 20, 40, 80, 160]
            .iter()
            .map(|&n| (n, 0.5 + 0.01 * (n * n) as f64))
            .collect();
        let report = fit(samples(&points));
        assert_eq!(report.complexity, Complexity::Quadratic);
        assert!(report.confidence > 0.99);
    }

    #[test]
    fn overflowing_models_are_skipped() {
        let report = fit(samples(&[(10, 1.0), (5000, 50.0), (10_000, 100.0)]));
        assert!(report
            .fits
            .iter()
            .all(|f| f.complexity != Complexity::Exponential));
        assert!(report.fits.iter().all(|f| f.r_squared.is_finite()));
    }

    #[test]
    fn too_few_measurements_is_unknown() {
        let report = fit(samples(&[(10, 1.0), (20, 2.0)]));
        assert_eq!(report.complexity, Complexity::Unknown);
        assert_eq!(report.confidence, 0.0);
        assert!(report.fits.is_empty());
    }

    #[test]
    fn serializes_labels() {
        assert_eq!(
            serde_json::to_string(&Complexity::Linearithmic).unwrap(),
            r#""O(n log n)""#
        );
        assert_eq!(
            serde_json::to_string(&Complexity::Unknown).unwrap(),
            r#""Unknown""#
        );
        assert_eq!(Complexity::Quadratic.to_string(), "O(n^2)");
    }
}
