use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use super::features::FeatureRow;
use super::model::ModelArtifact;
use crate::error::SignalError;
use crate::types::Action;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub action: Action,
    pub confidence: Option<f64>,
}

/// Why a pass ended up on the neutral action instead of a model prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FallbackReason {
    ModelUnavailable(String),
    ModelLoad(String),
    Prediction(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::ModelUnavailable(why) => write!(f, "no model after training attempt ({})", why),
            FallbackReason::ModelLoad(why) => write!(f, "model load failed ({})", why),
            FallbackReason::Prediction(why) => write!(f, "prediction failed ({})", why),
        }
    }
}

/// Count-based mapping for artifacts that carry no class table.
pub fn legacy_class_mapping(index: usize, n_classes: usize) -> Action {
    match (n_classes, index) {
        (3, 0) => Action::AggressiveBuy,
        (3, 1) => Action::Sell,
        (3, 2) => Action::Wait,
        (2, 0) => Action::Sell,
        (2, 1) => Action::AggressiveBuy,
        _ => Action::Unknown,
    }
}

/// Class index -> action, preferring the table stored with the artifact.
pub fn map_class(artifact: &ModelArtifact, index: usize) -> Action {
    if artifact.classes.is_empty() {
        return legacy_class_mapping(index, artifact.n_classes);
    }
    artifact.classes.get(index).copied().unwrap_or(Action::Unknown)
}

/// Score the latest feature row. The artifact is only read.
pub fn predict(artifact: &ModelArtifact, row: &FeatureRow) -> Result<Prediction, SignalError> {
    let (index, confidence) = artifact.score(row)?;
    let action = map_class(artifact, index);
    debug!("raw class {} -> {} (confidence {:?})", index, action, confidence);
    Ok(Prediction { action, confidence })
}

/// Collapse a prediction attempt into the action to act on. Any error, and
/// an `Unknown` class, become `WAIT` with the reason recorded.
pub fn resolve_action(result: Result<Prediction, SignalError>) -> (Prediction, Option<FallbackReason>) {
    match result {
        Ok(prediction) if prediction.action == Action::Unknown => {
            warn!("prediction mapped to UNKNOWN, treating as WAIT");
            (
                Prediction { action: Action::Wait, confidence: None },
                Some(FallbackReason::Prediction("unmapped class".into())),
            )
        }
        Ok(prediction) => (prediction, None),
        Err(e) => {
            let reason = match e {
                SignalError::ModelLoad(why) => FallbackReason::ModelLoad(why),
                other => FallbackReason::Prediction(other.to_string()),
            };
            (Prediction { action: Action::Wait, confidence: None }, Some(reason))
        }
    }
}

pub fn fallback(reason: FallbackReason) -> (Prediction, Option<FallbackReason>) {
    (Prediction { action: Action::Wait, confidence: None }, Some(reason))
}
