//! Gradient-boosted regression trees with second-order (Newton) leaf weights.
//!
//! Each round fits a tree to the gradient and hessian of the loss at the
//! current margin. Splits maximise the regularised gain
//!
//! ```text
//! gain = G_L² / (H_L + λ) + G_R² / (H_R + λ) - G² / (H + λ)
//! ```
//!
//! and leaves take the weight `-G / (H + λ)`, shrunk by the learning rate.
//! When an evaluation set is given its loss is tracked per round, and with
//! early stopping the ensemble is cut back to the best round.

use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

const MIN_HESSIAN: f64 = 1e-16;
const LOG_LOSS_EPS: f64 = 1e-15;

/// Loss being minimised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    #[serde(alias = "binary:logistic")]
    BinaryLogistic,

    #[serde(alias = "reg:squarederror")]
    SquaredError,
}

impl Objective {
    fn metric_name(self) -> &'static str {
        match self {
            Self::BinaryLogistic => "logloss",
            Self::SquaredError => "rmse",
        }
    }
}

/// Hyperparameters of [`GradientBoostedTrees`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,

    /// Minimum hessian sum in each child
    pub min_child_weight: f64,

    /// L2 regularisation on leaf weights
    pub reg_lambda: f64,

    /// Minimum gain required to split
    pub gamma: f64,

    pub objective: Objective,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            objective: Objective::default(),
        }
    }
}

impl BoostingParams {
    fn check(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::Model("n_estimators must be positive".to_owned()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(PipelineError::Model(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.reg_lambda < 0.0 || self.min_child_weight < 0.0 || self.gamma < 0.0 {
            return Err(PipelineError::Model(
                "reg_lambda, min_child_weight and gamma must be non-negative".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Options for a single fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoostingFitOptions {
    /// Stop when the evaluation loss has not improved for this many rounds
    pub early_stopping_rounds: Option<usize>,

    /// Log the evaluation loss of every round at INFO
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    /// Missing values follow the left branch.
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { weight } => return *weight,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if value.is_nan() || value <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
}

struct BestSplit {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl TreeBuilder<'_> {
    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (
                g + self.grad.get(r).copied().unwrap_or(0.0),
                h + self.hess.get(r).copied().unwrap_or(0.0),
            )
        })
    }

    fn build(&self, rows: Vec<usize>, depth: usize) -> Node {
        let (g, h) = self.sums(&rows);
        let leaf = Node::Leaf {
            weight: -g / (h + self.params.reg_lambda) * self.params.learning_rate,
        };

        if depth >= self.params.max_depth || rows.len() < 2 {
            return leaf;
        }

        let Some(best) = self.best_split(&rows, g, h) else {
            return leaf;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| {
            let value = self.x[[r, best.feature]];
            value.is_nan() || value <= best.threshold
        });

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left_rows, depth + 1)),
            right: Box::new(self.build(right_rows, depth + 1)),
        }
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let parent = self.score(g, h);
        let min_child = self.params.min_child_weight;
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.x.ncols() {
            let column = self.x.column(feature);
            let mut ordered: Vec<(f64, usize)> = rows
                .iter()
                .map(|&r| (column[r], r))
                .filter(|(v, _)| !v.is_nan())
                .collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Rows with a missing value always go left.
            let missing: Vec<usize> = rows.iter().copied().filter(|&r| column[r].is_nan()).collect();
            let (mut gl, mut hl) = self.sums(&missing);

            for pair in ordered.windows(2) {
                let [(value, row), (next, _)] = pair else {
                    continue;
                };
                gl += self.grad[*row];
                hl += self.hess[*row];
                if value >= next {
                    continue;
                }

                let (gr, hr) = (g - gl, h - hl);
                if hl < min_child || hr < min_child {
                    continue;
                }

                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > 0.0 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        gain,
                        feature,
                        threshold: (value + next) / 2.0,
                    });
                }
            }
        }

        best
    }
}

/// Boosted ensemble of regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    base_margin: f64,
    trees: Vec<Node>,
    n_features: usize,
    best_iteration: Option<usize>,
}

fn sigmoid(m: f64) -> f64 {
    1.0 / (1.0 + (-m).exp())
}

impl GradientBoostedTrees {
    /// Fit on `x`/`y`, tracking the loss on `eval` when given.
    pub fn fit(
        params: &BoostingParams,
        options: &BoostingFitOptions,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        eval: Option<(ArrayView2<'_, f64>, ArrayView1<'_, f64>)>,
    ) -> Result<Self> {
        params.check()?;
        if x.nrows() != y.len() {
            return Err(PipelineError::Model(format!(
                "feature matrix has {} rows but the target has {}",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(PipelineError::Model("cannot fit on an empty training set".to_owned()));
        }
        if params.objective == Objective::BinaryLogistic && y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(PipelineError::Model(
                "binary_logistic needs targets of 0 and 1".to_owned(),
            ));
        }
        if let Some((ex, ey)) = &eval
            && (ex.ncols() != x.ncols() || ex.nrows() != ey.len())
        {
            return Err(PipelineError::Model(
                "evaluation set does not match the training features".to_owned(),
            ));
        }

        let mean = y.mean().unwrap_or(0.0);
        let base_margin = match params.objective {
            Objective::SquaredError => mean,
            Objective::BinaryLogistic => {
                let p = mean.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln()
            }
        };

        let mut model = Self {
            params: params.clone(),
            base_margin,
            trees: Vec::with_capacity(params.n_estimators),
            n_features: x.ncols(),
            best_iteration: None,
        };

        let mut margin = Array1::from_elem(x.nrows(), base_margin);
        let mut eval_margin = eval
            .as_ref()
            .map(|(ex, _)| Array1::from_elem(ex.nrows(), base_margin));
        let mut best: Option<(usize, f64)> = None;
        let all_rows: Vec<usize> = (0..x.nrows()).collect();

        for round in 0..params.n_estimators {
            let (grad, hess) = model.gradients(margin.view(), y);
            let tree = TreeBuilder {
                x: x.reborrow(),
                grad: &grad,
                hess: &hess,
                params,
            }
            .build(all_rows.clone(), 0);

            for (m, row) in margin.iter_mut().zip(x.rows()) {
                *m += tree.predict(row);
            }

            if let (Some((ex, ey)), Some(em)) = (&eval, eval_margin.as_mut()) {
                for (m, row) in em.iter_mut().zip(ex.rows()) {
                    *m += tree.predict(row);
                }
                let loss = model.loss(em.view(), *ey);
                if options.verbose {
                    tracing::info!("[{round}] validate-{}:{loss:.5}", params.objective.metric_name());
                } else {
                    tracing::debug!("[{round}] validate-{}:{loss:.5}", params.objective.metric_name());
                }

                if best.is_none_or(|(_, b)| loss < b) {
                    best = Some((round, loss));
                }
            }
            model.trees.push(tree);

            if let (Some(patience), Some((best_round, _))) = (options.early_stopping_rounds, best)
                && round - best_round >= patience
            {
                tracing::info!(
                    "Stopping early at round {round}; best round was {best_round}"
                );
                break;
            }
        }

        if let Some((best_round, loss)) = best {
            model.best_iteration = Some(best_round);
            if options.early_stopping_rounds.is_some() {
                model.trees.truncate(best_round + 1);
            }
            tracing::debug!(
                "Best validate-{} {loss:.5} at round {best_round}",
                params.objective.metric_name()
            );
        }

        Ok(model)
    }

    fn gradients(&self, margin: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> (Vec<f64>, Vec<f64>) {
        margin
            .iter()
            .zip(y.iter())
            .map(|(&m, &t)| match self.params.objective {
                Objective::SquaredError => (m - t, 1.0),
                Objective::BinaryLogistic => {
                    let p = sigmoid(m);
                    (p - t, (p * (1.0 - p)).max(MIN_HESSIAN))
                }
            })
            .unzip()
    }

    fn loss(&self, margin: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        let n = y.len().max(1) as f64;
        match self.params.objective {
            Objective::SquaredError => {
                let sse: f64 = margin.iter().zip(y.iter()).map(|(m, t)| (m - t).powi(2)).sum();
                (sse / n).sqrt()
            }
            Objective::BinaryLogistic => {
                let total: f64 = margin
                    .iter()
                    .zip(y.iter())
                    .map(|(&m, &t)| {
                        let p = sigmoid(m).clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
                        -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                    })
                    .sum();
                total / n
            }
        }
    }

    fn check_width(&self, x: ArrayView2<'_, f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::Model(format!(
                "model was trained on {} features but got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }

    /// Raw margin: the sum of the base margin and every tree.
    pub fn predict_margin(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>())
            .collect())
    }

    /// Positive-class probabilities (binary_logistic only).
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.params.objective != Objective::BinaryLogistic {
            return Err(PipelineError::Model(
                "probabilities are only available for binary_logistic".to_owned(),
            ));
        }
        Ok(self.predict_margin(x)?.mapv(sigmoid))
    }

    /// Class labels for binary_logistic, values for squared_error.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let margin = self.predict_margin(x)?;
        Ok(match self.params.objective {
            Objective::SquaredError => margin,
            Objective::BinaryLogistic => margin.mapv(|m| if sigmoid(m) >= 0.5 { 1.0 } else { 0.0 }),
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn objective(&self) -> Objective {
        self.params.objective
    }
}
