use thiserror::Error;

/// Failures that can occur while running one (symbol, interval) pass.
/// None of them is fatal to a cycle: the pipeline turns each into a skip or a
/// `WAIT` fallback.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("data fetch failed: {0}")]
    DataFetch(String),

    #[error("insufficient data: need {needed} rows, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("labels collapsed to {distinct} distinct class(es), cannot train a classifier")]
    InadequateLabelDiversity { distinct: usize },

    #[error("training failed: {0}")]
    Training(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("prediction failed: {0}")]
    Prediction(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("model store error: {0}")]
    Store(String),
}

impl SignalError {
    pub fn insufficient(needed: usize, available: usize) -> Self {
        SignalError::InsufficientData { needed, available }
    }

    /// Short tag used in log lines and cycle summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalError::DataFetch(_) => "data_fetch",
            SignalError::InsufficientData { .. } => "insufficient_data",
            SignalError::InadequateLabelDiversity { .. } => "label_diversity",
            SignalError::Training(_) => "training",
            SignalError::ModelLoad(_) => "model_load",
            SignalError::Prediction(_) => "prediction",
            SignalError::Domain(_) => "domain",
            SignalError::Store(_) => "store",
        }
    }
}
