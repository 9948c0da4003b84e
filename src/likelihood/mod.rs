//! # Likelihood-aware prediction
//!
//! Maps a linear predictor matrix (factors times loadings) onto the
//! data scale of a view, according to the likelihood the view was
//! fitted with and the requested output mode.

use ndarray::{Array2, ArrayView2};
use num_traits::Float;
use std::fmt;

/// Observation model of a single view, fixed at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Likelihood {
    Gaussian,
    Bernoulli,
    Poisson,
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Likelihood::Gaussian => write!(f, "gaussian"),
            Likelihood::Bernoulli => write!(f, "bernoulli"),
            Likelihood::Poisson => write!(f, "poisson"),
        }
    }
}

/// Output scale of a reconstruction.
///
/// - `Link`: the raw linear predictor.
/// - `Response`: the distribution mean (logistic for Bernoulli,
///   exp for Poisson, identity for Gaussian).
/// - `InRange`: the response rounded to the nearest value in the
///   distribution's support. Only integer-valued likelihoods round;
///   for Gaussian all three modes coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionMode {
    Link,
    Response,
    #[default]
    InRange,
}

/// Logistic function that does not overflow for large `|x|`.
fn logistic<T: Float>(x: T) -> T {
    if x >= T::zero() {
        T::one() / (T::one() + (-x).exp())
    } else {
        let e = x.exp();
        e / (T::one() + e)
    }
}

impl Likelihood {
    /// Map a single linear-predictor value onto the requested scale.
    pub fn predict_value<T: Float>(&self, linear: T, mode: PredictionMode) -> T {
        match (self, mode) {
            (Likelihood::Gaussian, _) => linear,
            (Likelihood::Bernoulli, PredictionMode::Link) => linear,
            (Likelihood::Bernoulli, PredictionMode::Response) => logistic(linear),
            (Likelihood::Bernoulli, PredictionMode::InRange) => logistic(linear).round(),
            (Likelihood::Poisson, PredictionMode::Link) => linear,
            (Likelihood::Poisson, PredictionMode::Response) => linear.exp(),
            (Likelihood::Poisson, PredictionMode::InRange) => linear.exp().round(),
        }
    }

    /// Map a whole linear-predictor matrix onto the requested scale.
    pub fn predict(&self, linear: ArrayView2<'_, f64>, mode: PredictionMode) -> Array2<f64> {
        linear.mapv(|l| self.predict_value(l, mode))
    }
}
