//! Estimators, their hyperparameters and the persisted model artifact.

use super::boosting::{BoostingFitOptions, BoostingParams, GradientBoostedTrees, Objective};
use super::split::Partition;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::ensure_parent_dir;
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Supported estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelMethod {
    Logistic,
    LinearRegression,
    DecisionTree,
    #[serde(alias = "gradient_boosting")]
    Xgboost,
}

impl ModelMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::LinearRegression => "linear_regression",
            Self::DecisionTree => "decision_tree",
            Self::Xgboost => "xgboost",
        }
    }

    /// Whether the target is a class label rather than a real value.
    pub fn is_classifier(self) -> bool {
        !matches!(self, Self::LinearRegression)
    }
}

impl std::fmt::Display for ModelMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters of `logistic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticParams {
    /// L2 penalty
    pub alpha: f64,
    pub max_iterations: u64,
    pub gradient_tolerance: f64,
    pub fit_intercept: bool,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iterations: 100,
            gradient_tolerance: 1e-4,
            fit_intercept: true,
        }
    }
}

/// Hyperparameters of `linear_regression`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearParams {
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitCriterion {
    #[default]
    Gini,
    Entropy,
}

/// Hyperparameters of `decision_tree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    pub split_quality: SplitCriterion,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            split_quality: SplitCriterion::default(),
        }
    }
}

/// Fit options for estimators that take none.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoFitOptions {}

/// An estimator with its typed hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    Logistic(LogisticParams),
    LinearRegression(LinearParams),
    DecisionTree(TreeParams),
    GradientBoosting(BoostingParams, BoostingFitOptions),
}

fn parse_section<T>(method: ModelMethod, section: &str, value: serde_yaml::Value) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_yaml::from_value(value).with_context(|| format!("invalid {section} for method '{method}'"))
}

impl ModelSpec {
    /// Interpret the `params` and `fit` sections for `method`.
    pub fn from_parts(method: ModelMethod, params: serde_yaml::Value, fit: serde_yaml::Value) -> Result<Self> {
        let spec = match method {
            ModelMethod::Logistic => Self::Logistic(parse_section(method, "params", params)?),
            ModelMethod::LinearRegression => Self::LinearRegression(parse_section(method, "params", params)?),
            ModelMethod::DecisionTree => Self::DecisionTree(parse_section(method, "params", params)?),
            ModelMethod::Xgboost => {
                return Ok(Self::GradientBoosting(
                    parse_section(method, "params", params)?,
                    parse_section(method, "fit", fit)?,
                ));
            }
        };
        let _: NoFitOptions = parse_section(method, "fit", fit)?;
        Ok(spec)
    }

    pub fn method(&self) -> ModelMethod {
        match self {
            Self::Logistic(_) => ModelMethod::Logistic,
            Self::LinearRegression(_) => ModelMethod::LinearRegression,
            Self::DecisionTree(_) => ModelMethod::DecisionTree,
            Self::GradientBoosting(..) => ModelMethod::Xgboost,
        }
    }

    fn is_classifier(&self) -> bool {
        match self {
            Self::GradientBoosting(params, _) => params.objective == Objective::BinaryLogistic,
            other => other.method().is_classifier(),
        }
    }

    /// Fit on `train`; `eval` is used as the evaluation set where the
    /// estimator supports one.
    pub fn fit(&self, train: &Partition, eval: Option<&Partition>) -> Result<TrainedModel> {
        let target = train.target.as_ref().ok_or_else(|| {
            PipelineError::Configuration("training needs a target; configure get_target".to_owned())
        })?;
        let x = feature_matrix(&train.features, self.allows_missing())?;

        let model = match self {
            Self::Logistic(params) => {
                let dataset = linfa::Dataset::new(x, class_labels(target)?);
                let model = LogisticRegression::default()
                    .alpha(params.alpha)
                    .max_iterations(params.max_iterations)
                    .gradient_tolerance(params.gradient_tolerance)
                    .with_intercept(params.fit_intercept)
                    .fit(&dataset)
                    .map_err(|e| PipelineError::Model(format!("Logistic Regression training failed: {e}")))?;
                TrainedModel::Logistic(model)
            }
            Self::LinearRegression(params) => {
                let dataset = linfa::Dataset::new(x, real_values(target)?);
                let model = LinearRegression::new()
                    .with_intercept(params.fit_intercept)
                    .fit(&dataset)
                    .map_err(|e| PipelineError::Model(format!("Linear Regression training failed: {e}")))?;
                TrainedModel::LinearRegression(model)
            }
            Self::DecisionTree(params) => {
                let dataset = linfa::Dataset::new(x, class_labels(target)?);
                let quality = match params.split_quality {
                    SplitCriterion::Gini => SplitQuality::Gini,
                    SplitCriterion::Entropy => SplitQuality::Entropy,
                };
                let model = DecisionTree::params()
                    .split_quality(quality)
                    .max_depth(params.max_depth)
                    .min_weight_split(params.min_weight_split)
                    .min_weight_leaf(params.min_weight_leaf)
                    .fit(&dataset)
                    .map_err(|e| PipelineError::Model(format!("Decision Tree training failed: {e}")))?;
                TrainedModel::DecisionTree(model)
            }
            Self::GradientBoosting(params, options) => {
                let y = real_values(target)?;
                let eval_set = match eval {
                    Some(Partition {
                        features,
                        target: Some(eval_target),
                    }) => Some((feature_matrix(features, true)?, real_values(eval_target)?)),
                    _ => None,
                };
                let model = GradientBoostedTrees::fit(
                    params,
                    options,
                    x.view(),
                    y.view(),
                    eval_set.as_ref().map(|(ex, ey)| (ex.view(), ey.view())),
                )?;
                TrainedModel::GradientBoosting(model)
            }
        };

        if eval.is_some() && !matches!(self, Self::GradientBoosting(..)) {
            tracing::debug!("{} does not use an evaluation set", self.method());
        }
        Ok(model)
    }

    fn allows_missing(&self) -> bool {
        matches!(self, Self::GradientBoosting(..))
    }

    /// Accuracy for classifiers, RMSE otherwise.
    pub fn metric_name(&self) -> &'static str {
        if self.is_classifier() { "accuracy" } else { "rmse" }
    }
}

/// Cast every feature column to `f64` and build a row-major matrix.
///
/// Nulls become NaN when `allow_missing` is set and are an error otherwise.
pub fn feature_matrix(df: &DataFrame, allow_missing: bool) -> Result<Array2<f64>> {
    if df.width() == 0 {
        return Err(PipelineError::DataProcessing("no feature columns to train on".to_owned()));
    }

    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let dtype = column.dtype();
        if !(dtype.is_primitive_numeric() || dtype.is_bool()) {
            return Err(PipelineError::DataProcessing(format!(
                "feature column '{}' has type {dtype}; encode it before training",
                column.name()
            )));
        }
        if !allow_missing && column.null_count() > 0 {
            return Err(PipelineError::DataProcessing(format!(
                "feature column '{}' has {} missing values",
                column.name(),
                column.null_count()
            )));
        }
        columns.push(column.cast(&DataType::Float64)?);
    }

    Ok(DataFrame::new(columns)?
        .to_ndarray::<Float64Type>(IndexOrder::C)
        .context("Failed to create feature matrix")?)
}

fn class_labels(target: &Series) -> Result<Array1<usize>> {
    if target.dtype().is_float() {
        let values = target.cast(&DataType::Float64)?;
        if let Some(bad) = values.f64()?.into_iter().flatten().find(|v| v.fract() != 0.0) {
            return Err(PipelineError::DataProcessing(format!(
                "target '{}' must hold integer class labels, found {bad}",
                target.name()
            )));
        }
    }
    let cast = target.cast(&DataType::UInt32)?;
    if cast.null_count() > target.null_count() {
        return Err(PipelineError::DataProcessing(format!(
            "target '{}' must hold non-negative integer class labels",
            target.name()
        )));
    }
    if cast.null_count() > 0 {
        return Err(PipelineError::DataProcessing(format!(
            "target '{}' has {} missing values",
            target.name(),
            cast.null_count()
        )));
    }
    Ok(cast.u32()?.into_no_null_iter().map(|v| v as usize).collect())
}

fn real_values(target: &Series) -> Result<Array1<f64>> {
    if target.null_count() > 0 {
        return Err(PipelineError::DataProcessing(format!(
            "target '{}' has {} missing values",
            target.name(),
            target.null_count()
        )));
    }
    Ok(target
        .cast(&DataType::Float64)?
        .f64()?
        .into_no_null_iter()
        .collect())
}

/// A fitted estimator.
#[derive(Serialize, Deserialize)]
pub enum TrainedModel {
    Logistic(FittedLogisticRegression<f64, usize>),
    LinearRegression(FittedLinearRegression<f64>),
    DecisionTree(DecisionTree<f64, usize>),
    GradientBoosting(GradientBoostedTrees),
}

impl TrainedModel {
    /// Class labels for classifiers, values for regressors.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Self::Logistic(model) => {
                let labels: Array1<usize> = model.predict(x);
                Ok(labels.mapv(|l| l as f64))
            }
            Self::LinearRegression(model) => Ok(model.predict(x)),
            Self::DecisionTree(model) => {
                let labels: Array1<usize> = model.predict(x);
                Ok(labels.mapv(|l| l as f64))
            }
            Self::GradientBoosting(model) => model.predict(x.view()),
        }
    }

    /// Positive-class probabilities.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Self::Logistic(model) => Ok(model.predict_probabilities(x)),
            Self::GradientBoosting(model) => model.predict_proba(x.view()),
            Self::LinearRegression(_) | Self::DecisionTree(_) => Err(PipelineError::Model(format!(
                "{} does not produce probabilities",
                self.method()
            ))),
        }
    }

    pub fn method(&self) -> ModelMethod {
        match self {
            Self::Logistic(_) => ModelMethod::Logistic,
            Self::LinearRegression(_) => ModelMethod::LinearRegression,
            Self::DecisionTree(_) => ModelMethod::DecisionTree,
            Self::GradientBoosting(_) => ModelMethod::Xgboost,
        }
    }

    fn allows_missing(&self) -> bool {
        matches!(self, Self::GradientBoosting(_))
    }
}

/// The persisted form of a trained model.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub method: ModelMethod,

    /// Feature columns, in the order the model expects them
    pub feature_names: Vec<String>,

    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(feature_names: Vec<String>, model: TrainedModel) -> Self {
        Self {
            method: model.method(),
            feature_names,
            model,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)
            .with_context(|| format!("Failed to create directory for {}", path.display()))?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create model file {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::ResourceMissing(format!(
                "trained model object not found: {}",
                path.display()
            )));
        }
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open model file {}", path.display()))?;
        let artifact: Self = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to decode model file {}", path.display()))?;
        tracing::debug!(
            "Loaded {} model with {} features from {}",
            artifact.method,
            artifact.feature_names.len(),
            path.display()
        );
        Ok(artifact)
    }

    /// The model's feature columns from `df`, in training order.
    pub fn features(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let missing: Vec<&str> = self
            .feature_names
            .iter()
            .filter(|name| df.column(name).is_err())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "input is missing feature column(s) the model was trained on: {}",
                missing.join(", ")
            )));
        }
        let selected = df.select(self.feature_names.iter().map(String::as_str))?;
        feature_matrix(&selected, self.model.allows_missing())
    }

    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        self.model.predict(&self.features(df)?)
    }

    pub fn predict_proba(&self, df: &DataFrame) -> Result<Array1<f64>> {
        self.model.predict_proba(&self.features(df)?)
    }
}
