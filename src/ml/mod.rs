pub mod features;
pub mod labels;
pub mod boosting;
pub mod tuning;
pub mod model;
pub mod predictor;
pub mod persistence;

pub use features::{compute_features, FeatureParams};
pub use labels::{generate_labels, LabelPolicy};
pub use model::{ModelTrainer, TrainerConfig, TrainingStrategy};
pub use predictor::FallbackReason;
pub use persistence::{FileModelStore, ModelStore};
