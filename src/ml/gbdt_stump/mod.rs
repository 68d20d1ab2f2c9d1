//! Deterministic gradient-boosted decision-stump classifier.
//!
//! This is the tree-ensemble model kind:
//! - Multi-class classification via softmax boosting.
//! - No randomness, so a given labeled set always yields the same model.
//! - Reproducible JSON model export/load through the round artifact.

mod model;
mod train;

pub use model::{GbdtStumpModel, Stump, softmax};
pub use train::{TrainOptions, train_gbdt_stump};
