pub mod error;
pub mod impute;
pub mod likelihood;
pub mod model;
pub mod select;

pub use error::{FactorModelError, Result};
pub use impute::{ImputedView, ImputedViews, PredictedView, PredictedViews, Reconstruction};
pub use likelihood::{Likelihood, PredictionMode};
pub use model::{FactorMatrix, FactorModel, LoadingMatrix, ObservedView, ViewModel};
pub use select::Selection;
