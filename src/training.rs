//! Model training: partitioning, estimators and the `train_model` stage.
//!
//! Four estimators are available through `train_model.method`:
//!
//! | method              | estimator                                   |
//! |---------------------|---------------------------------------------|
//! | `logistic`          | `linfa-logistic` binary logistic regression |
//! | `linear_regression` | `linfa-linear` ordinary least squares       |
//! | `decision_tree`     | `linfa-trees` CART classifier               |
//! | `xgboost`           | gradient-boosted trees ([`boosting`])       |
//!
//! Each method owns its `params` (and, for `xgboost`, `fit`) schema; these
//! are checked when the configuration is parsed. When the split produces a
//! validation partition it becomes the evaluation set of `xgboost`.

pub mod boosting;
pub mod executor;
pub mod model;
pub mod split;

pub use boosting::{BoostingFitOptions, BoostingParams, GradientBoostedTrees, Objective};
pub use executor::{TrainConfig, TrainOutcome, train_model};
pub use model::{
    LinearParams, LogisticParams, ModelArtifact, ModelMethod, ModelSpec, SplitCriterion, TrainedModel,
    TreeParams, feature_matrix,
};
pub use split::{Partition, PartitionedDataset, SplitConfig, SplitCounts, split_data};
