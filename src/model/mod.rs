//! # Fitted factor model components
//!
//! Read-only stores for the pieces a trained multi-view factor model
//! delivers: the sample-by-factor matrix `Z`, one feature-by-factor
//! loading matrix `W_v` per view with its likelihood, and the observed
//! data matrices to be imputed. Training itself happens upstream; this
//! crate only consumes the result.

use ndarray::{Array2, Axis};

use crate::error::{FactorModelError, Result};
use crate::likelihood::Likelihood;
use crate::select::Selection;

fn check_unique(axis: &str, names: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(FactorModelError::inconsistent_model(format!(
                "duplicate {axis} name '{name}'"
            )));
        }
    }
    Ok(())
}

/// Latent factor matrix `Z`, samples x factors, with named axes.
#[derive(Debug, Clone)]
pub struct FactorMatrix {
    values: Array2<f64>,
    samples: Vec<String>,
    factors: Vec<String>,
}

impl FactorMatrix {
    pub fn new(values: Array2<f64>, samples: Vec<String>, factors: Vec<String>) -> Result<Self> {
        if values.nrows() != samples.len() || values.ncols() != factors.len() {
            return Err(FactorModelError::inconsistent_model(format!(
                "factor matrix is {}x{} but {} samples and {} factors were named",
                values.nrows(),
                values.ncols(),
                samples.len(),
                factors.len()
            )));
        }
        check_unique("sample", &samples)?;
        check_unique("factor", &factors)?;
        Ok(Self {
            values,
            samples,
            factors,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_factors(&self) -> usize {
        self.values.ncols()
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Restrict (and possibly reorder) the factor columns. Sample rows
    /// are preserved exactly; column order follows the request.
    pub fn select_factors(&self, selection: &Selection) -> Result<FactorMatrix> {
        let cols = selection.resolve("factor", &self.factors)?;
        Ok(FactorMatrix {
            values: self.values.select(Axis(1), &cols),
            samples: self.samples.clone(),
            factors: cols.iter().map(|&c| self.factors[c].clone()).collect(),
        })
    }
}

/// Loading matrix `W_v` of one view, features x factors, with factor
/// columns aligned to the model's factor matrix.
#[derive(Debug, Clone)]
pub struct LoadingMatrix {
    values: Array2<f64>,
    features: Vec<String>,
    factors: Vec<String>,
}

impl LoadingMatrix {
    pub fn new(values: Array2<f64>, features: Vec<String>, factors: Vec<String>) -> Result<Self> {
        if values.nrows() != features.len() || values.ncols() != factors.len() {
            return Err(FactorModelError::inconsistent_model(format!(
                "loading matrix is {}x{} but {} features and {} factors were named",
                values.nrows(),
                values.ncols(),
                features.len(),
                factors.len()
            )));
        }
        check_unique("feature", &features)?;
        check_unique("factor", &factors)?;
        Ok(Self {
            values,
            features,
            factors,
        })
    }

    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Restrict the factor columns to the exact key list a
    /// `FactorMatrix` selection resolved to, in that order. A key the
    /// loading matrix does not carry means the model pieces disagree.
    pub(crate) fn select_factors_by_name(&self, keys: &[String]) -> Result<LoadingMatrix> {
        let cols = keys
            .iter()
            .map(|key| {
                self.factors.iter().position(|f| f == key).ok_or_else(|| {
                    FactorModelError::inconsistent_model(format!(
                        "loading matrix is missing factor '{key}'"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LoadingMatrix {
            values: self.values.select(Axis(1), &cols),
            features: self.features.clone(),
            factors: keys.to_vec(),
        })
    }
}

/// One view of the fitted model: its loadings and its likelihood.
#[derive(Debug, Clone)]
pub struct ViewModel {
    name: String,
    loadings: LoadingMatrix,
    likelihood: Likelihood,
}

impl ViewModel {
    pub fn new(name: impl Into<String>, loadings: LoadingMatrix, likelihood: Likelihood) -> Self {
        Self {
            name: name.into(),
            loadings,
            likelihood,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loadings(&self) -> &LoadingMatrix {
        &self.loadings
    }

    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }
}

/// The full fitted model: factor matrix plus the views in their
/// canonical order. Immutable for the lifetime of a reconstruction.
#[derive(Debug, Clone)]
pub struct FactorModel {
    factors: FactorMatrix,
    views: Vec<ViewModel>,
}

impl FactorModel {
    /// Assemble a model from its trained pieces. Every view's factor
    /// axis must match the factor matrix exactly (same names, same
    /// order); anything else means the pieces come from different fits.
    pub fn new(factors: FactorMatrix, views: Vec<ViewModel>) -> Result<Self> {
        check_unique("view", &views.iter().map(|v| v.name.clone()).collect::<Vec<_>>())?;
        for view in &views {
            if view.loadings.factors() != factors.factors() {
                return Err(FactorModelError::inconsistent_model(format!(
                    "view '{}' has factor axis [{}] but the factor matrix has [{}]",
                    view.name,
                    view.loadings.factors().join(", "),
                    factors.factors().join(", ")
                )));
            }
        }
        Ok(Self { factors, views })
    }

    pub fn factors(&self) -> &FactorMatrix {
        &self.factors
    }

    pub fn views(&self) -> &[ViewModel] {
        &self.views
    }

    pub fn n_views(&self) -> usize {
        self.views.len()
    }

    pub fn view_names(&self) -> Vec<&str> {
        self.views.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn view(&self, name: &str) -> Option<&ViewModel> {
        self.views.iter().find(|v| v.name == name)
    }

    /// Resolve a view selection to positions in canonical view order
    /// of the request.
    pub(crate) fn resolve_views(&self, selection: &Selection) -> Result<Vec<usize>> {
        let names: Vec<String> = self.views.iter().map(|v| v.name.clone()).collect();
        selection.resolve("view", &names)
    }
}

/// Observed data of one view, features x samples, with `f64::NAN`
/// marking missing entries. Rows and columns are matched to the model
/// by name, so their order is free and the sample set may be a subset.
#[derive(Debug, Clone)]
pub struct ObservedView {
    name: String,
    values: Array2<f64>,
    features: Vec<String>,
    samples: Vec<String>,
}

impl ObservedView {
    pub fn new(
        name: impl Into<String>,
        values: Array2<f64>,
        features: Vec<String>,
        samples: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if values.nrows() != features.len() || values.ncols() != samples.len() {
            return Err(FactorModelError::inconsistent_model(format!(
                "observed view '{name}' is {}x{} but {} features and {} samples were named",
                values.nrows(),
                values.ncols(),
                features.len(),
                samples.len()
            )));
        }
        check_unique("feature", &features)?;
        check_unique("sample", &samples)?;
        Ok(Self {
            name,
            values,
            features,
            samples,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn n_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}
