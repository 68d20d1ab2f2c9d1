//! Labeled and unlabeled datasets: loading, labels, splitting and persistence.

pub mod labels;
pub mod loader;
pub mod split;
pub mod store;

pub use loader::{FeatureTable, LabelColumn, LoadError, TableFormat, load_features, load_labels};
pub use store::{LabeledSample, LabeledSet};
