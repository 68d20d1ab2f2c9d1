//! Label values and the project label space.
//!
//! Labels reach the engine from CSV cells, `.npy` arrays and JSON voting
//! results, so the same class can arrive as `2`, `2.0` or `"2"`. Every source is
//! decoded into [`LabelValue`] and rendered through [`LabelValue::canonical`]
//! before it is compared or persisted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a label does not fit the project label space.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("label {label:?} is not in the declared label space {space:?}")]
    OutsideSpace { label: String, space: Vec<String> },
    #[error("empty label")]
    Empty,
}

/// A label as it appears in an input source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl LabelValue {
    /// Decode a textual cell, recognizing integral and float spellings.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return LabelValue::Integer(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => LabelValue::Float(value),
            _ => LabelValue::Text(trimmed.to_string()),
        }
    }

    /// Stable string form used for comparison and persistence.
    pub fn canonical(&self) -> String {
        match self {
            LabelValue::Integer(value) => value.to_string(),
            LabelValue::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    value.to_string()
                }
            }
            LabelValue::Text(text) => text.trim().to_string(),
        }
    }
}

/// Canonicalize a raw textual label.
pub fn canonical_label(raw: &str) -> String {
    LabelValue::from_text(raw).canonical()
}

/// Ordered set of valid labels for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpace {
    classes: Vec<String>,
    declared: bool,
}

impl LabelSpace {
    /// Label space taken from the project configuration.
    pub fn declared(classes: Vec<String>) -> Self {
        Self {
            classes,
            declared: true,
        }
    }

    /// Label space inferred from observed labels, in sorted order.
    pub fn inferred<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let set: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: set.into_iter().map(str::to_string).collect(),
            declared: false,
        }
    }

    /// Resolve the space for a round and validate the bootstrap labels against it.
    pub fn resolve(configured: &[String], observed: &[String]) -> Result<Self, LabelError> {
        if configured.is_empty() {
            return Ok(Self::inferred(observed.iter().map(String::as_str)));
        }
        let space = Self::declared(configured.to_vec());
        for label in observed {
            space.check(label)?;
        }
        Ok(space)
    }

    /// Validate a canonical label.
    pub fn check(&self, label: &str) -> Result<(), LabelError> {
        if label.is_empty() {
            return Err(LabelError::Empty);
        }
        if self.declared && !self.classes.iter().any(|class| class == label) {
            return Err(LabelError::OutsideSpace {
                label: label.to_string(),
                space: self.classes.clone(),
            });
        }
        Ok(())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|class| class == label)
    }

    pub fn is_declared(&self) -> bool {
        self.declared
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
