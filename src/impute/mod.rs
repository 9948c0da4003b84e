//! # Reconstruction and imputation
//!
//! The orchestrating core: computes per-view linear predictors
//! `W_v * Z^T`, pushes them through the view's likelihood, and either
//! returns the predictions as-is (`predict`) or substitutes them into
//! the missing entries of the observed data (`impute`). Views are
//! independent and reconstructed in parallel; output assembly always
//! follows the model's canonical view order.

use std::collections::HashMap;

use log::{debug, trace};
use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{FactorModelError, Result};
use crate::likelihood::PredictionMode;
use crate::model::{FactorMatrix, FactorModel, ObservedView, ViewModel};
use crate::select::Selection;

/// Builder-style entry point for reconstructing views of a fitted
/// model. The model is borrowed read-only; every call produces fresh
/// output matrices owned by the caller.
pub struct Reconstruction<'a> {
    model: &'a FactorModel,
    views: Selection,
    factors: Selection,
    mode: PredictionMode,
}

impl<'a> Reconstruction<'a> {
    pub fn new(model: &'a FactorModel) -> Self {
        Self {
            model,
            views: Selection::All,
            factors: Selection::All,
            mode: PredictionMode::default(),
        }
    }

    pub fn views(mut self, views: Selection) -> Self {
        self.views = views;
        self
    }

    pub fn factors(mut self, factors: Selection) -> Self {
        self.factors = factors;
        self
    }

    pub fn mode(mut self, mode: PredictionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve both selections up front, before any arithmetic. View
    /// positions are deduplicated and returned in canonical model
    /// order; the factor matrix is restricted to the requested subset.
    fn resolve(&self) -> Result<(Vec<usize>, FactorMatrix)> {
        let mut selected = self.model.resolve_views(&self.views)?;
        selected.sort_unstable();
        selected.dedup();
        let factors = self.model.factors().select_factors(&self.factors)?;
        debug!(
            "reconstructing {}/{} views with {} factors (mode {:?})",
            selected.len(),
            self.model.n_views(),
            factors.n_factors(),
            self.mode
        );
        Ok((selected, factors))
    }

    /// Dense reconstruction of one view under the resolved factor
    /// subset, on the scale given by the prediction mode.
    fn reconstruct_view(&self, view: &ViewModel, factors: &FactorMatrix) -> Result<Array2<f64>> {
        let loadings = view.loadings().select_factors_by_name(factors.factors())?;
        let linear = loadings.values().dot(&factors.values().t());
        Ok(view.likelihood().predict(linear.view(), self.mode))
    }

    /// Full reconstruction of the selected views, ignoring
    /// observedness: every entry is the model's prediction. Views come
    /// back in canonical model order regardless of request order.
    pub fn predict(self) -> Result<PredictedViews> {
        let (selected, factors) = self.resolve()?;
        let views = selected
            .par_iter()
            .map(|&vi| {
                let view = &self.model.views()[vi];
                let values = self.reconstruct_view(view, &factors)?;
                Ok(PredictedView {
                    name: view.name().to_string(),
                    values,
                    features: view.loadings().features().to_vec(),
                    samples: self.model.factors().samples().to_vec(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictedViews { views })
    }

    /// Impute the missing entries of the observed data.
    ///
    /// `data` must carry exactly one observed matrix per model view
    /// (the result spans the full canonical view list, so pass-through
    /// views need their data too). For each selected view, every `NaN`
    /// entry is replaced by the model's prediction for that
    /// feature/sample pair; observed entries and unselected views are
    /// passed through untouched.
    pub fn impute(self, data: &[ObservedView]) -> Result<ImputedViews> {
        let (selected, factors) = self.resolve()?;
        let observed = index_observed(self.model, data)?;

        // All predictions are computed before any merge, so a failing
        // view can never leave partial output behind.
        let predictions: HashMap<usize, Array2<f64>> = selected
            .par_iter()
            .map(|&vi| {
                let values = self.reconstruct_view(&self.model.views()[vi], &factors)?;
                Ok((vi, values))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let sample_index = name_index(self.model.factors().samples());
        let mut views = Vec::with_capacity(self.model.n_views());
        for (vi, view) in self.model.views().iter().enumerate() {
            let y = observed[vi];
            let (values, n_filled) = match predictions.get(&vi) {
                Some(prediction) => fill_missing(view, y, prediction, &sample_index)?,
                None => (y.values().clone(), 0),
            };
            trace!("view '{}': filled {} missing entries", view.name(), n_filled);
            views.push(ImputedView {
                name: view.name().to_string(),
                values,
                features: y.features().to_vec(),
                samples: y.samples().to_vec(),
                n_filled,
            });
        }
        Ok(ImputedViews { views })
    }
}

/// Match the observed matrices to the model views one-to-one, in
/// canonical view order.
fn index_observed<'d>(model: &FactorModel, data: &'d [ObservedView]) -> Result<Vec<&'d ObservedView>> {
    let mut by_name: HashMap<&str, &ObservedView> = HashMap::with_capacity(data.len());
    for y in data {
        if model.view(y.name()).is_none() {
            return Err(FactorModelError::inconsistent_model(format!(
                "observed data for unknown view '{}'",
                y.name()
            )));
        }
        if by_name.insert(y.name(), y).is_some() {
            return Err(FactorModelError::inconsistent_model(format!(
                "duplicate observed data for view '{}'",
                y.name()
            )));
        }
    }
    model
        .views()
        .iter()
        .map(|view| {
            by_name.get(view.name()).copied().ok_or_else(|| {
                FactorModelError::inconsistent_model(format!(
                    "no observed data for view '{}'",
                    view.name()
                ))
            })
        })
        .collect()
}

fn name_index(names: &[String]) -> HashMap<&str, usize> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect()
}

/// Substitute predictions into the missing entries of one observed
/// view. The observed matrix keeps its own row/column layout; entries
/// are matched to the prediction by feature and sample name.
fn fill_missing(
    view: &ViewModel,
    observed: &ObservedView,
    prediction: &Array2<f64>,
    sample_index: &HashMap<&str, usize>,
) -> Result<(Array2<f64>, usize)> {
    let feature_index = name_index(view.loadings().features());

    let rows = observed
        .features()
        .iter()
        .map(|f| {
            feature_index.get(f.as_str()).copied().ok_or_else(|| {
                FactorModelError::inconsistent_model(format!(
                    "view '{}': observed feature '{f}' is not in the model",
                    view.name()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let cols = observed
        .samples()
        .iter()
        .map(|s| {
            sample_index.get(s.as_str()).copied().ok_or_else(|| {
                FactorModelError::inconsistent_model(format!(
                    "view '{}': observed sample '{s}' is not in the model",
                    view.name()
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut values = observed.values().clone();
    let mut n_filled = 0usize;
    for (i, &pi) in rows.iter().enumerate() {
        for (j, &pj) in cols.iter().enumerate() {
            if values[[i, j]].is_nan() {
                values[[i, j]] = prediction[[pi, pj]];
                n_filled += 1;
            }
        }
    }
    Ok((values, n_filled))
}

/// Full reconstruction of one view on the requested scale.
#[derive(Debug, Clone)]
pub struct PredictedView {
    name: String,
    values: Array2<f64>,
    features: Vec<String>,
    samples: Vec<String>,
}

impl PredictedView {
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
}

/// Predictions for the selected views, in canonical model order.
#[derive(Debug, Clone)]
pub struct PredictedViews {
    views: Vec<PredictedView>,
}

impl PredictedViews {
    pub fn view(&self, name: &str) -> Option<&PredictedView> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictedView> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// One imputed data matrix: identical to the observed input except at
/// entries that were missing, in the observed input's own layout.
#[derive(Debug, Clone)]
pub struct ImputedView {
    name: String,
    values: Array2<f64>,
    features: Vec<String>,
    samples: Vec<String>,
    n_filled: usize,
}

impl ImputedView {
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

    /// Number of entries that were missing and got substituted.
    pub fn n_filled(&self) -> usize {
        self.n_filled
    }
}

/// Imputation result for every view of the model, in canonical order.
/// Unselected views are passed through with their observed data.
#[derive(Debug, Clone)]
pub struct ImputedViews {
    views: Vec<ImputedView>,
}

impl ImputedViews {
    pub fn view(&self, name: &str) -> Option<&ImputedView> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImputedView> {
        self.views.iter()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::likelihood::Likelihood;
    use crate::model::{LoadingMatrix, ViewModel};
    use approx::assert_relative_eq;
    use ndarray::array;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i}")).collect()
    }

    /// Two samples, one factor, three single-feature views (one per
    /// likelihood): Z = [[1], [-1]], W = [[2]] everywhere, so the
    /// linear predictor of every view is [[2, -2]].
    fn three_view_model() -> FactorModel {
        let z = FactorMatrix::new(
            array![[1.0], [-1.0]],
            vec!["s1".into(), "s2".into()],
            vec!["LF1".into()],
        )
        .unwrap();
        let w = |feature: &str| {
            LoadingMatrix::new(array![[2.0]], vec![feature.into()], vec!["LF1".into()]).unwrap()
        };
        FactorModel::new(
            z,
            vec![
                ViewModel::new("gauss", w("g1"), Likelihood::Gaussian),
                ViewModel::new("bern", w("b1"), Likelihood::Bernoulli),
                ViewModel::new("pois", w("p1"), Likelihood::Poisson),
            ],
        )
        .unwrap()
    }

    fn full_observed(model: &FactorModel) -> Vec<ObservedView> {
        model
            .views()
            .iter()
            .map(|v| {
                ObservedView::new(
                    v.name(),
                    array![[f64::NAN, f64::NAN]],
                    v.loadings().features().to_vec(),
                    vec!["s1".into(), "s2".into()],
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_predict_gaussian_link_equals_response() {
        let model = three_view_model();
        let link = Reconstruction::new(&model)
            .views(Selection::names(["gauss"]))
            .mode(PredictionMode::Link)
            .predict()
            .unwrap();
        let response = Reconstruction::new(&model)
            .views(Selection::names(["gauss"]))
            .mode(PredictionMode::Response)
            .predict()
            .unwrap();
        let expected = array![[2.0, -2.0]];
        assert_eq!(link.view("gauss").unwrap().values(), &expected);
        assert_eq!(response.view("gauss").unwrap().values(), &expected);
    }

    #[test]
    fn test_predict_bernoulli_modes() {
        let model = three_view_model();
        let response = Reconstruction::new(&model)
            .views(Selection::names(["bern"]))
            .mode(PredictionMode::Response)
            .predict()
            .unwrap();
        let p = response.view("bern").unwrap().values();
        assert_relative_eq!(p[[0, 0]], 0.8808, epsilon = 1e-4);
        assert_relative_eq!(p[[0, 1]], 0.1192, epsilon = 1e-4);

        let in_range = Reconstruction::new(&model)
            .views(Selection::names(["bern"]))
            .mode(PredictionMode::InRange)
            .predict()
            .unwrap();
        assert_eq!(in_range.view("bern").unwrap().values(), &array![[1.0, 0.0]]);
    }

    #[test]
    fn test_predict_poisson_in_range() {
        let model = three_view_model();
        let in_range = Reconstruction::new(&model)
            .views(Selection::names(["pois"]))
            .predict()
            .unwrap();
        // round(exp([2, -2])) = round([7.389, 0.135])
        assert_eq!(in_range.view("pois").unwrap().values(), &array![[7.0, 0.0]]);
    }

    #[test]
    fn test_impute_only_replaces_missing() {
        let z = FactorMatrix::new(
            array![[1.0], [-1.0]],
            vec!["s1".into(), "s2".into()],
            vec!["LF1".into()],
        )
        .unwrap();
        let w = LoadingMatrix::new(array![[3.0]], vec!["g1".into()], vec!["LF1".into()]).unwrap();
        let model = FactorModel::new(z, vec![ViewModel::new("rna", w, Likelihood::Gaussian)]).unwrap();
        // predicted values are [[3, -3]]; only the NaN cell may change
        let y = ObservedView::new(
            "rna",
            array![[f64::NAN, 5.0]],
            vec!["g1".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap();
        let imputed = Reconstruction::new(&model).impute(&[y]).unwrap();
        let rna = imputed.view("rna").unwrap();
        assert_eq!(rna.values(), &array![[3.0, 5.0]]);
        assert_eq!(rna.n_filled(), 1);
    }

    #[test]
    fn test_unselected_views_pass_through() {
        let model = three_view_model();
        let mut data = full_observed(&model);
        data[2] = ObservedView::new(
            "pois",
            array![[4.0, f64::NAN]],
            vec!["p1".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap();
        let imputed = Reconstruction::new(&model)
            .views(Selection::names(["gauss", "bern"]))
            .impute(&data)
            .unwrap();
        // all three views appear, in canonical order
        let order: Vec<&str> = imputed.iter().map(|v| v.name()).collect();
        assert_eq!(order, vec!["gauss", "bern", "pois"]);
        // the unselected view is untouched, NaN included
        let pois = imputed.view("pois").unwrap();
        assert_eq!(pois.values()[[0, 0]], 4.0);
        assert!(pois.values()[[0, 1]].is_nan());
        assert_eq!(pois.n_filled(), 0);
        // the selected views have no residual missing entries
        assert!(imputed.view("gauss").unwrap().values().iter().all(|v| v.is_finite()));
        assert!(imputed.view("bern").unwrap().values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_output_order_ignores_request_order() {
        let model = three_view_model();
        let data = full_observed(&model);
        let imputed = Reconstruction::new(&model)
            .views(Selection::names(["pois", "gauss"]))
            .impute(&data)
            .unwrap();
        let order: Vec<&str> = imputed.iter().map(|v| v.name()).collect();
        assert_eq!(order, vec!["gauss", "bern", "pois"]);
    }

    #[test]
    fn test_in_range_outputs_stay_in_support() {
        let model = three_view_model();
        let imputed = Reconstruction::new(&model).impute(&full_observed(&model)).unwrap();
        for &v in imputed.view("bern").unwrap().values() {
            assert!(v == 0.0 || v == 1.0);
        }
        for &v in imputed.view("pois").unwrap().values() {
            assert!(v >= 0.0 && v.fract() == 0.0);
        }
    }

    #[test]
    fn test_impute_aligns_by_name_not_position() {
        let z = FactorMatrix::new(
            array![[1.0], [-1.0]],
            vec!["s1".into(), "s2".into()],
            vec!["LF1".into()],
        )
        .unwrap();
        let w = LoadingMatrix::new(
            array![[2.0], [5.0]],
            vec!["g1".into(), "g2".into()],
            vec!["LF1".into()],
        )
        .unwrap();
        let model = FactorModel::new(z, vec![ViewModel::new("rna", w, Likelihood::Gaussian)]).unwrap();
        // observed matrix permutes both axes relative to the model
        let y = ObservedView::new(
            "rna",
            array![[f64::NAN, f64::NAN], [f64::NAN, 9.0]],
            vec!["g2".into(), "g1".into()],
            vec!["s2".into(), "s1".into()],
        )
        .unwrap();
        let imputed = Reconstruction::new(&model).impute(&[y]).unwrap();
        let rna = imputed.view("rna").unwrap();
        // model predictions: g1 -> [2, -2], g2 -> [5, -5] over (s1, s2)
        assert_eq!(rna.values(), &array![[-5.0, 5.0], [-2.0, 9.0]]);
    }

    #[test]
    fn test_unknown_view_aborts_without_output() {
        let model = three_view_model();
        let err = Reconstruction::new(&model)
            .views(Selection::names(["atac"]))
            .impute(&full_observed(&model))
            .unwrap_err();
        assert!(matches!(err, FactorModelError::InvalidSelection(_)));
    }

    #[test]
    fn test_unknown_factor_aborts_without_output() {
        let model = three_view_model();
        let err = Reconstruction::new(&model)
            .factors(Selection::names(["LF99"]))
            .impute(&full_observed(&model))
            .unwrap_err();
        assert!(matches!(err, FactorModelError::InvalidSelection(_)));
    }

    #[test]
    fn test_missing_observed_data_is_inconsistent_model() {
        let model = three_view_model();
        let mut data = full_observed(&model);
        data.pop();
        let err = Reconstruction::new(&model).impute(&data).unwrap_err();
        assert!(matches!(err, FactorModelError::InconsistentModel(_)));
    }

    #[test]
    fn test_unknown_observed_sample_is_inconsistent_model() {
        let model = three_view_model();
        let mut data = full_observed(&model);
        data[0] = ObservedView::new(
            "gauss",
            array![[f64::NAN, f64::NAN]],
            vec!["g1".into()],
            vec!["s1".into(), "s99".into()],
        )
        .unwrap();
        let err = Reconstruction::new(&model).impute(&data).unwrap_err();
        assert!(matches!(err, FactorModelError::InconsistentModel(_)));
    }

    #[test]
    fn test_round_trip_matches_linear_predictor() {
        let z_values = array![[0.3, -1.2], [2.1, 0.4], [-0.7, 0.9]];
        let w_values = array![[1.5, -0.5], [0.2, 0.8], [-1.1, 0.0], [0.6, 2.2]];
        let z = FactorMatrix::new(z_values.clone(), names("s", 3), names("LF", 2)).unwrap();
        let w = LoadingMatrix::new(w_values.clone(), names("g", 4), names("LF", 2)).unwrap();
        let model = FactorModel::new(z, vec![ViewModel::new("rna", w, Likelihood::Gaussian)]).unwrap();
        let predicted = Reconstruction::new(&model)
            .mode(PredictionMode::Link)
            .predict()
            .unwrap();
        let expected = w_values.dot(&z_values.t());
        let got = predicted.view("rna").unwrap().values();
        for (a, b) in got.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_factor_subset_reconstruction() {
        // restricting to LF1 must use only the first column of Z and W
        let z = FactorMatrix::new(
            array![[1.0, 10.0], [-1.0, 10.0]],
            names("s", 2),
            names("LF", 2),
        )
        .unwrap();
        let w = LoadingMatrix::new(array![[2.0, 100.0]], names("g", 1), names("LF", 2)).unwrap();
        let model = FactorModel::new(z, vec![ViewModel::new("rna", w, Likelihood::Gaussian)]).unwrap();
        let predicted = Reconstruction::new(&model)
            .factors(Selection::names(["LF1"]))
            .predict()
            .unwrap();
        assert_eq!(predicted.view("rna").unwrap().values(), &array![[2.0, -2.0]]);
    }
}
